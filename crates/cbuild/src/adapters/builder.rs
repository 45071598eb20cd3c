//! Default [`FirmwareBuilder`]: shells out to `podman`.
//!
//! Grounded on `original_source/firmware/podman.go`'s `PodmanBuilder` —
//! pull the image, run the build inside it bind-mounting the checked-out
//! source, read back the produced binary. The container runtime itself is
//! a non-goal; this is the thinnest adapter over the `podman` CLI, not a
//! reimplementation of its build pipeline.

use async_trait::async_trait;
use cbuild_driver::{BuildLogRecorder, FirmwareBuilder};

pub struct PodmanFirmwareBuilder {
    /// Must be the same directory `GitSourceDownloader` checks the source
    /// out into — the build mounts it read-write at `/build` in-container.
    pub workdir: std::path::PathBuf,
}

impl PodmanFirmwareBuilder {
    /// The first `*.bin` or `*.uf2` file under the output directory,
    /// matching the original's extension-sniffing rename step (§5).
    async fn find_artifact(&self) -> Result<std::path::PathBuf, String> {
        let mut entries = tokio::fs::read_dir(&self.workdir)
            .await
            .map_err(|error| format!("failed to list build output: {error}"))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|error| format!("failed to read build output entry: {error}"))?
        {
            let path = entry.path();
            match path.extension().and_then(|ext| ext.to_str()) {
                Some("bin") | Some("uf2") => return Ok(path),
                _ => continue,
            }
        }
        Err("no .bin or .uf2 artifact produced by the build".to_string())
    }
}

#[async_trait]
impl FirmwareBuilder for PodmanFirmwareBuilder {
    async fn pull_image(&self, container_image: &str) -> Result<(), String> {
        let output = tokio::process::Command::new("podman")
            .args(["pull", container_image])
            .output()
            .await
            .map_err(|error| format!("failed to spawn podman pull: {error}"))?;
        if !output.status.success() {
            return Err(format!(
                "podman pull exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }
        Ok(())
    }

    async fn build(
        &self,
        container_image: &str,
        target: &str,
        extra_options: &str,
        recorder: &BuildLogRecorder,
    ) -> Result<Vec<u8>, String> {
        let mount = format!("{}:/build:rw", self.workdir.display());
        let output = tokio::process::Command::new("podman")
            .args([
                "run",
                "--rm",
                "-v",
                &mount,
                "-e",
                &format!("EXTRA_OPTIONS={extra_options}"),
                container_image,
                target,
            ])
            .output()
            .await
            .map_err(|error| format!("failed to spawn podman run: {error}"))?;
        recorder.add_stdout(&String::from_utf8_lossy(&output.stdout));
        recorder.add_stderr(&String::from_utf8_lossy(&output.stderr));
        if !output.status.success() {
            return Err(format!("podman run exited with {}", output.status));
        }

        let artifact_path = self.find_artifact().await?;
        tokio::fs::read(&artifact_path)
            .await
            .map_err(|error| format!("failed to read build artifact: {error}"))
    }
}
