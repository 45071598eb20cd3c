//! Default [`RemoteShaResolver`]: shells out to `git ls-remote`.
//!
//! Grounded on `original_source/targets/remote_sha.go`'s use of the VCS
//! client to turn a tag/branch ref into a commit sha — the VCS client
//! itself is a non-goal, so this is the thinnest adapter that satisfies
//! the trait, not a vendored git implementation.

use async_trait::async_trait;
use cbuild_catalog::RemoteShaResolver;

pub struct GitRemoteShaResolver {
    pub repository: String,
}

#[async_trait]
impl RemoteShaResolver for GitRemoteShaResolver {
    async fn fetch(&self, release_ref: &str) -> Result<String, String> {
        let output = tokio::process::Command::new("git")
            .args(["ls-remote", &self.repository, release_ref])
            .output()
            .await
            .map_err(|error| format!("failed to spawn git: {error}"))?;

        if !output.status.success() {
            return Err(format!(
                "git ls-remote exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        stdout
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().next())
            .map(|sha| sha.to_string())
            .ok_or_else(|| format!("no ref matching {release_ref} on {}", self.repository))
    }
}
