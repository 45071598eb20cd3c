//! Accumulates a single attempt's stdout/stderr (§4.E).
//!
//! Grounded on `original_source/buildlogs/recorder.go` — same
//! append-only, read-at-the-end shape, made `Sync` with an interior
//! `Mutex` since collaborators may write from a blocking task.

use std::sync::Mutex;

#[derive(Default)]
pub struct BuildLogRecorder {
    stdout: Mutex<String>,
    stderr: Mutex<String>,
}

impl BuildLogRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stdout(&self, data: &str) {
        self.stdout.lock().unwrap().push_str(data);
    }

    pub fn add_stderr(&self, data: &str) {
        self.stderr.lock().unwrap().push_str(data);
    }

    pub fn logs(&self) -> String {
        format!("{}{}", self.stdout.lock().unwrap(), self.stderr.lock().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_stdout_then_stderr() {
        let recorder = BuildLogRecorder::new();
        recorder.add_stdout("building...\n");
        recorder.add_stderr("warning: unused variable\n");
        assert_eq!(recorder.logs(), "building...\nwarning: unused variable\n");
    }
}
