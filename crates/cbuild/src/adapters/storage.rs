//! Default [`ArtifactStorage`] variants: local filesystem and S3-compatible
//! (§6.3). The object-storage backend's full semantics (credential
//! signing, multipart upload) are a non-goal; these cover the shapes the
//! original supports (`storage/local.go`, `storage/s3.go`) without
//! vendoring an AWS SDK.

use async_trait::async_trait;
use cbuild_driver::ArtifactStorage;

pub struct FileSystemArtifactStorage {
    pub root: std::path::PathBuf,
}

#[async_trait]
impl ArtifactStorage for FileSystemArtifactStorage {
    async fn upload(&self, data: &[u8], filename: &str) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|error| format!("failed to create storage root: {error}"))?;
        tokio::fs::write(self.root.join(filename), data)
            .await
            .map_err(|error| format!("failed to write artifact: {error}"))
    }
}

/// PUTs the object directly to an S3-compatible endpoint with a
/// `public-read` ACL, matching the original's `PutObject` call. No request
/// signing: suitable for anonymous-write buckets (e.g. local MinIO during
/// development), not a production AWS deployment.
pub struct S3ArtifactStorage {
    pub endpoint: String,
    pub bucket: String,
    pub client: reqwest::Client,
}

#[async_trait]
impl ArtifactStorage for S3ArtifactStorage {
    async fn upload(&self, data: &[u8], filename: &str) -> Result<(), String> {
        let url = format!("{}/{}/{}", self.endpoint, self.bucket, filename);
        let response = self
            .client
            .put(&url)
            .header("x-amz-acl", "public-read")
            .body(data.to_vec())
            .send()
            .await
            .map_err(|error| format!("failed to PUT artifact: {error}"))?;
        if !response.status().is_success() {
            return Err(format!("S3 PUT returned {}", response.status()));
        }
        Ok(())
    }
}
