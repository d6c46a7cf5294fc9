use formats::DecodeError;

use crate::config::UploadEncoding;

/// One POST to the depth backend, independent of the HTTP client that sends
/// it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    pub url: String,
    pub encoding: UploadEncoding,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub accept: &'static str,
}

impl UploadRequest {
    /// Multipart form field carrying the file.
    pub const FILE_FIELD: &'static str = "file";

    /// `Content-Type` of the request body for raw uploads.
    pub const RAW_CONTENT_TYPE: &'static str = "application/octet-stream";
}

/// The request did not produce a usable response body.
///
/// Every variant displays the same generic message; details are for logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    Status(u16),
    Network(String),
    EmptyFile,
}

impl TransferError {
    pub fn detail(&self) -> String {
        match self {
            TransferError::Status(code) => format!("backend answered HTTP {code}"),
            TransferError::Network(msg) => format!("network error: {msg}"),
            TransferError::EmptyFile => "refused to upload an empty file".to_string(),
        }
    }
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "processing failed")
    }
}

impl std::error::Error for TransferError {}

#[derive(Debug)]
pub enum UploadError {
    Transfer(TransferError),
    Decode(DecodeError),
}

impl UploadError {
    /// The one line shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            UploadError::Transfer(e) => format!("Upload failed: {e}"),
            UploadError::Decode(e) => format!("Could not read depth data: {e}"),
        }
    }
}

impl std::fmt::Display for UploadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadError::Transfer(e) => write!(f, "transfer error: {}", e.detail()),
            UploadError::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UploadError::Transfer(e) => Some(e),
            UploadError::Decode(e) => Some(e),
        }
    }
}

impl From<TransferError> for UploadError {
    fn from(value: TransferError) -> Self {
        UploadError::Transfer(value)
    }
}

impl From<DecodeError> for UploadError {
    fn from(value: DecodeError) -> Self {
        UploadError::Decode(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_errors_hide_details_from_users() {
        for e in [
            TransferError::Status(500),
            TransferError::Network("connection refused".to_string()),
            TransferError::EmptyFile,
        ] {
            let msg = UploadError::from(e.clone()).user_message();
            assert_eq!(msg, "Upload failed: processing failed");
        }
        assert_eq!(
            UploadError::from(TransferError::Status(502)).to_string(),
            "transfer error: backend answered HTTP 502"
        );
    }

    #[test]
    fn decode_errors_are_descriptive() {
        let e = UploadError::from(DecodeError::LengthMismatch {
            expected: 16,
            actual: 12,
        });
        assert!(e.user_message().starts_with("Could not read depth data: "));
        assert!(e.user_message().contains("16"));
    }
}
