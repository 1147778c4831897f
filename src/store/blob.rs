//! Blob store seam.
//!
//! Documents and news articles arrive as opaque blobs referenced by queue
//! messages. The store is injected so tests and local runs use a directory
//! tree while deployments bind an object store.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::StoreError;

/// Opaque blob storage keyed by `(bucket, key)`.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;
}

/// Decode a URL-encoded blob key (`%XX` escapes, `+` as space).
///
/// Keys arrive URL-encoded in queue payloads and must be decoded before any
/// store operation.
pub fn decode_key(key: &str) -> String {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                let hex = bytes.get(i + 1..i + 3);
                match hex.and_then(|h| std::str::from_utf8(h).ok()) {
                    Some(h) => match u8::from_str_radix(h, 16) {
                        Ok(b) => {
                            out.push(b);
                            i += 3;
                        }
                        Err(_) => {
                            out.push(b'%');
                            i += 1;
                        }
                    },
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Directory-backed blob store; buckets map to subdirectories.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, bucket: &str, key: &str) -> PathBuf {
        self.root.join(bucket).join(decode_key(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(bucket, key);
        tokio::fs::read(&path)
            .await
            .map_err(|_| StoreError::BlobNotFound(format!("{bucket}/{key}")))
    }

    async fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(bucket, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Persistence(e.to_string()))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StoreError::Persistence(e.to_string()))
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(bucket, key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Persistence(e.to_string())),
        }
    }
}
