//! Product image hosting.
//!
//! Images are uploaded to Cloudinary with a signed request; only the
//! returned `secure_url` is persisted.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::config::CloudinaryConfig;

/// Cloudinary upload API base URL.
const CLOUDINARY_API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Folder product images are uploaded into.
const UPLOAD_FOLDER: &str = "merkato/products";

/// Errors from the image host.
#[derive(Debug, Error)]
pub enum UploadError {
    /// HTTP request failed.
    #[error("image upload request failed: {0}")]
    Request(String),

    /// The host rejected the upload.
    #[error("image host error: {0}")]
    Api(String),

    /// Failed to parse response.
    #[error("image host response error: {0}")]
    Response(String),
}

/// One image file taken from a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Stores images and returns their public URL.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload(&self, image: ImageUpload) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    error: Option<UploadErrorBody>,
}

#[derive(Debug, Deserialize)]
struct UploadErrorBody {
    message: String,
}

/// Cloudinary upload client.
#[derive(Clone)]
pub struct CloudinaryClient {
    client: Client,
    cloud_name: String,
    api_key: String,
    api_secret: SecretString,
}

impl std::fmt::Debug for CloudinaryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryClient")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl CloudinaryClient {
    #[must_use]
    pub fn new(config: &CloudinaryConfig) -> Self {
        Self {
            client: Client::new(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    /// Sign upload parameters: sorted `key=value` pairs joined by `&`,
    /// followed by the API secret, hashed with SHA-256.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(to_sign.as_bytes());
        hasher.update(self.api_secret.expose_secret().as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl ImageStore for CloudinaryClient {
    #[instrument(skip(self, image), fields(file = %image.file_name, size = image.bytes.len()))]
    async fn upload(&self, image: ImageUpload) -> Result<String, UploadError> {
        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign(&[("folder", UPLOAD_FOLDER), ("timestamp", &timestamp)]);

        let mut file = Part::bytes(image.bytes).file_name(image.file_name);
        if let Some(content_type) = &image.content_type {
            file = file
                .mime_str(content_type)
                .map_err(|e| UploadError::Request(e.to_string()))?;
        }

        let form = Form::new()
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("folder", UPLOAD_FOLDER)
            .text("signature_algorithm", "sha256")
            .text("signature", signature)
            .part("file", file);

        let response = self
            .client
            .post(format!(
                "{CLOUDINARY_API_BASE}/{}/image/upload",
                self.cloud_name
            ))
            .multipart(form)
            .send()
            .await
            .map_err(|e| UploadError::Request(e.to_string()))?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::Response(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(UploadError::Api(error.message));
        }
        let url = body
            .secure_url
            .ok_or_else(|| UploadError::Response("missing secure_url".to_string()))?;

        debug!(url = %url, "Image uploaded");
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> CloudinaryClient {
        CloudinaryClient::new(&CloudinaryConfig {
            cloud_name: "demo".to_string(),
            api_key: "1234".to_string(),
            api_secret: SecretString::from("abcd"),
        })
    }

    #[test]
    fn test_signature_is_order_independent() {
        let client = client();
        let a = client.sign(&[("timestamp", "1700000000"), ("folder", "x")]);
        let b = client.sign(&[("folder", "x"), ("timestamp", "1700000000")]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_signature_depends_on_secret() {
        let mut other = client();
        other.api_secret = SecretString::from("efgh");
        let params = [("timestamp", "1700000000")];
        assert_ne!(client().sign(&params), other.sign(&params));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let debug = format!("{:?}", client());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("abcd"));
    }
}
