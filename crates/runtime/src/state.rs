use std::sync::Arc;

use foundation::{DepthBuffer, RequestGeneration};

use crate::config::UploadPolicy;

/// Everything the UI renders from. Replaced as a whole on every event, never
/// patched field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewerState {
    /// Generation of the most recently started upload.
    pub generation: RequestGeneration,
    pub loading: bool,
    pub buffer: Option<Arc<DepthBuffer>>,
    pub error: Option<String>,
}

impl ViewerState {
    /// State right after upload `generation` was issued.
    pub fn started(&self, generation: RequestGeneration, policy: UploadPolicy) -> Self {
        let buffer = match policy {
            UploadPolicy::ClearOnStart => None,
            UploadPolicy::RetainUntilReplaced => self.buffer.clone(),
        };
        Self {
            generation,
            loading: true,
            buffer,
            error: None,
        }
    }

    pub fn succeeded(&self, buffer: Arc<DepthBuffer>) -> Self {
        Self {
            generation: self.generation,
            loading: false,
            buffer: Some(buffer),
            error: None,
        }
    }

    /// Keeps whatever buffer the current state holds.
    pub fn failed(&self, message: impl Into<String>) -> Self {
        Self {
            generation: self.generation,
            loading: false,
            buffer: self.buffer.clone(),
            error: Some(message.into()),
        }
    }

    /// Same state with `message` shown; loading and buffer are untouched.
    pub fn with_error(&self, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..self.clone()
        }
    }

    pub fn has_buffer(&self) -> bool {
        self.buffer.is_some()
    }
}
