use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use crate::services::encryption::{CipherError, DocumentCipher};

/// Get/put access to uploaded document bytes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Location recorded on the job as `fileUrl`.
    fn url_for(&self, key: &str) -> String;
}

/// Cloudflare R2 (S3-compatible) store. Objects are sealed with
/// [`DocumentCipher`] before upload and opened after download.
pub struct R2Client {
    bucket: Box<Bucket>,
    cipher: DocumentCipher,
}

impl R2Client {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        cipher: DocumentCipher,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket, cipher })
    }
}

#[async_trait]
impl ObjectStore for R2Client {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self
            .bucket
            .get_object(key)
            .await
            .map_err(|e| classify(key, e))?;

        match response.status_code() {
            200..=299 => {}
            404 => return Err(StorageError::NotFound(key.to_string())),
            code => return Err(status_error(key, code)),
        }

        let sealed = response.to_vec();
        Ok(self.cipher.open(key, &sealed)?)
    }

    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        let sealed = self.cipher.seal(key, data)?;
        let response = self
            .bucket
            .put_object_with_content_type(key, &sealed, content_type)
            .await
            .map_err(|e| classify(key, e))?;

        match response.status_code() {
            200..=299 => Ok(()),
            code => Err(status_error(key, code)),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        match self.bucket.head_object(key).await {
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) if (200..300).contains(&code) => Ok(true),
            Ok((_, code)) => Err(status_error(key, code)),
            Err(e) => match classify(key, e) {
                StorageError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.bucket.url(), key)
    }
}

fn classify(key: &str, err: S3Error) -> StorageError {
    match err {
        S3Error::HttpFailWithBody(404, _) => StorageError::NotFound(key.to_string()),
        S3Error::HttpFailWithBody(code, body) if code < 500 && code != 429 => {
            StorageError::Rejected(format!("{code}: {body}"))
        }
        other => StorageError::Unavailable(other.to_string()),
    }
}

fn status_error(key: &str, code: u16) -> StorageError {
    if code >= 500 || code == 429 {
        StorageError::Unavailable(format!("{key}: HTTP {code}"))
    } else {
        StorageError::Rejected(format!("{key}: HTTP {code}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Network failure, timeout or 5xx. Worth retrying.
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    #[error("Object store rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Cipher(#[from] CipherError),

    #[error("Storage configuration error: {0}")]
    Config(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}
