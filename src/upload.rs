use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub const UPLOAD_PREFIX_DEFAULT: &str = "uploads/";
pub const UPLOAD_URL_EXPIRATION: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload_url: String,
    pub key: String,
}

/// Validated `?filename=&filetype=` of an upload URL request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub filename: String,
    pub filetype: String,
}

impl UploadRequest {
    pub fn new(filename: Option<&str>, filetype: Option<&str>) -> Result<Self, UploadError> {
        let filename = filename
            .map(str::trim)
            .filter(|val| !val.is_empty())
            .ok_or(UploadError::MissingParameter("filename"))?;
        let filetype = filetype
            .map(str::trim)
            .filter(|val| !val.is_empty())
            .ok_or(UploadError::MissingParameter("filetype"))?;

        if filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
            return Err(UploadError::InvalidFilename(filename.into()));
        }
        if !filetype.starts_with("image/") {
            return Err(UploadError::UnsupportedType(filetype.into()));
        }

        Ok(Self {
            filename: filename.into(),
            filetype: filetype.into(),
        })
    }

    /// `<prefix><epoch millis>_<filename>`
    pub fn object_key(&self, prefix: &str, now: DateTime<Utc>) -> String {
        format!("{prefix}{}_{}", now.timestamp_millis(), self.filename)
    }
}
