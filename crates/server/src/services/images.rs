//! Third-party image host client.
//!
//! Product photos are pushed to the host as multipart uploads; the host
//! answers with the public URL that gets stored on the product.

use reqwest::{
    Client,
    multipart::{Form, Part},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, instrument};

use crate::config::ImageHostConfig;

/// Largest accepted image, in bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Errors from image uploads.
#[derive(Debug, Error)]
pub enum ImageHostError {
    /// No image host is configured.
    #[error("image uploads are not configured")]
    NotConfigured,

    /// The file is not an acceptable image.
    #[error("invalid image: {0}")]
    InvalidFile(String),

    /// The HTTP request failed.
    #[error("image host request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The host answered with a non-success status.
    #[error("image host returned HTTP {0}")]
    Status(u16),

    /// The host's answer carried no URL.
    #[error("image host response had no URL")]
    MissingUrl,
}

/// A file received from the dashboard, ready to upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    /// Check the file looks like an image of acceptable size.
    ///
    /// # Errors
    ///
    /// Returns `ImageHostError::InvalidFile` describing the problem.
    pub fn validate(&self) -> Result<(), ImageHostError> {
        if !self.content_type.starts_with("image/") {
            return Err(ImageHostError::InvalidFile(format!(
                "{} is not an image ({})",
                self.file_name, self.content_type
            )));
        }
        if self.bytes.is_empty() {
            return Err(ImageHostError::InvalidFile(format!(
                "{} is empty",
                self.file_name
            )));
        }
        if self.bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageHostError::InvalidFile(format!(
                "{} is larger than {} MB",
                self.file_name,
                MAX_IMAGE_BYTES / (1024 * 1024)
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl UploadResponse {
    fn into_url(self) -> Option<String> {
        self.secure_url.or(self.url).filter(|u| !u.is_empty())
    }
}

/// Client for the image host.
#[derive(Clone)]
pub struct ImageHostClient {
    client: Client,
    upload_url: String,
    api_key: SecretString,
}

impl std::fmt::Debug for ImageHostClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageHostClient")
            .field("upload_url", &self.upload_url)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl ImageHostClient {
    /// Create a new client.
    #[must_use]
    pub fn new(config: &ImageHostConfig) -> Self {
        Self {
            client: Client::new(),
            upload_url: config.upload_url.clone(),
            api_key: config.api_key.clone(),
        }
    }

    /// Upload one image and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the host rejects the file.
    #[instrument(skip(self, upload), fields(file = %upload.file_name, bytes = upload.bytes.len()))]
    pub async fn upload(&self, upload: ImageUpload) -> Result<String, ImageHostError> {
        let part = Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .bearer_auth(self.api_key.expose_secret())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            error!(status = %status, "Image host rejected upload");
            return Err(ImageHostError::Status(status.as_u16()));
        }

        let url = response
            .json::<UploadResponse>()
            .await?
            .into_url()
            .ok_or(ImageHostError::MissingUrl)?;

        debug!(url = %url, "Image uploaded");
        Ok(url)
    }

    /// Upload files one at a time, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first upload error; no URLs are returned in that case.
    pub async fn upload_all(&self, uploads: Vec<ImageUpload>) -> Result<Vec<String>, ImageHostError> {
        for upload in &uploads {
            upload.validate()?;
        }

        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            urls.push(self.upload(upload).await?);
        }
        Ok(urls)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn upload(content_type: &str, bytes: usize) -> ImageUpload {
        ImageUpload {
            file_name: "mug.jpg".to_string(),
            content_type: content_type.to_string(),
            bytes: vec![0; bytes],
        }
    }

    #[test]
    fn test_validate() {
        assert!(upload("image/jpeg", 10).validate().is_ok());
        assert!(upload("text/plain", 10).validate().is_err());
        assert!(upload("image/png", 0).validate().is_err());
        assert!(upload("image/png", MAX_IMAGE_BYTES + 1).validate().is_err());
    }

    #[test]
    fn test_response_prefers_secure_url() {
        let response: UploadResponse = serde_json::from_str(
            r#"{"secure_url":"https://cdn.example/a.jpg","url":"http://cdn.example/a.jpg"}"#,
        )
        .unwrap();
        assert_eq!(response.into_url().unwrap(), "https://cdn.example/a.jpg");

        let response: UploadResponse =
            serde_json::from_str(r#"{"url":"http://cdn.example/b.jpg"}"#).unwrap();
        assert_eq!(response.into_url().unwrap(), "http://cdn.example/b.jpg");

        let response: UploadResponse = serde_json::from_str("{}").unwrap();
        assert!(response.into_url().is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let client = ImageHostClient::new(&ImageHostConfig {
            upload_url: "https://img.example/upload".to_string(),
            api_key: SecretString::from("super-secret".to_string()),
        });
        let debug = format!("{client:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
