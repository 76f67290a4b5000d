use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(full_path, data).await?;
        Ok(())
    }
}

#[cfg(feature = "lambda")]
pub use s3::S3Storage;

#[cfg(feature = "lambda")]
mod s3 {
    use super::*;
    use crate::utils::error::PmsError;
    use aws_sdk_s3::error::DisplayErrorContext;
    use aws_sdk_s3::Client as S3Client;

    /// 夜審報表與視圖寫入 S3；prefix 之下的 key 與本地路徑相同
    #[derive(Debug, Clone)]
    pub struct S3Storage {
        client: S3Client,
        bucket: String,
        prefix: String,
    }

    impl S3Storage {
        pub fn new(client: S3Client, bucket: String, prefix: String) -> Self {
            Self {
                client,
                bucket,
                prefix: prefix.trim_end_matches('/').to_string(),
            }
        }

        fn key(&self, path: &str) -> String {
            if self.prefix.is_empty() {
                path.to_string()
            } else {
                format!("{}/{}", self.prefix, path)
            }
        }
    }

    impl Storage for S3Storage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(self.key(path))
                .send()
                .await
                .map_err(|e| PmsError::ProcessingError {
                    message: format!("Failed to read s3://{}/{}: {}", self.bucket, self.key(path), DisplayErrorContext(&e)),
                })?;

            let data = resp.body.collect().await.map_err(|e| PmsError::ProcessingError {
                message: format!("Failed to collect S3 data: {}", e),
            })?;

            Ok(data.into_bytes().to_vec())
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let key = self.key(path);
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&key)
                .body(data.to_vec().into())
                .send()
                .await
                .map_err(|e| PmsError::ProcessingError {
                    message: format!("Failed to write s3://{}/{}: {}", self.bucket, key, DisplayErrorContext(&e)),
                })?;

            tracing::debug!("☁️ Uploaded {} bytes to s3://{}/{}", data.len(), self.bucket, key);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file("night_audit/hotel-a/report.json", b"{}")
            .await
            .unwrap();

        let data = storage.read_file("night_audit/hotel-a/report.json").await.unwrap();
        assert_eq!(data, b"{}");
        assert!(storage.read_file("missing.json").await.is_err());
    }
}
