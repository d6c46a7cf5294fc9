use std::env;

use foundation::Channel;
use formats::{DecoderOptions, ResponseFormat, DEFAULT_LUMA16_SCALE};
use scene::{MeshOptions, SamplePolicy};
use serde::{Deserialize, Serialize};

pub const BACKEND_ORIGIN_ENV: &str = "DEPTH_BACKEND_ORIGIN";
pub const DEFAULT_BACKEND_ORIGIN: &str = "http://localhost:5000";
pub const DEFAULT_UPLOAD_PATH: &str = "/upload";

/// How the image bytes are put on the wire.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadEncoding {
    /// `multipart/form-data` with a single `file` part.
    #[default]
    Multipart,
    /// The file bytes as `application/octet-stream`.
    Raw,
}

impl UploadEncoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "multipart" | "form" => Some(UploadEncoding::Multipart),
            "raw" | "octet-stream" => Some(UploadEncoding::Raw),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisualMode {
    #[default]
    Overlay,
    Mesh,
}

/// What happens to the displayed buffer while a new upload is in flight.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPolicy {
    /// Drop the buffer as soon as the upload starts.
    #[default]
    ClearOnStart,
    /// Keep showing the old buffer until a new one is decoded.
    RetainUntilReplaced,
}

#[derive(Debug)]
pub enum ConfigError {
    Json(serde_json::Error),
    InvalidOrigin(String),
    InvalidScale(f32),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Json(e) => write!(f, "invalid viewer config: {e}"),
            ConfigError::InvalidOrigin(o) => {
                write!(f, "backend origin must be an http(s) URL, got {o:?}")
            }
            ConfigError::InvalidScale(s) => write!(f, "luma16 scale must be positive, got {s}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        ConfigError::Json(value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub backend_origin: String,
    pub upload_path: String,
    pub format: ResponseFormat,
    pub encoding: UploadEncoding,
    #[serde(with = "channel_name")]
    pub channel: Channel,
    pub luma16_scale: f32,
    pub mode: VisualMode,
    pub sampling: SamplePolicy,
    pub policy: UploadPolicy,
    /// Suffix for physical depth labels, e.g. `"ft"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub mesh: MeshOptions,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            backend_origin: DEFAULT_BACKEND_ORIGIN.to_string(),
            upload_path: DEFAULT_UPLOAD_PATH.to_string(),
            format: ResponseFormat::default(),
            encoding: UploadEncoding::default(),
            channel: Channel::default(),
            luma16_scale: DEFAULT_LUMA16_SCALE,
            mode: VisualMode::default(),
            sampling: SamplePolicy::default(),
            policy: UploadPolicy::default(),
            unit: None,
            mesh: MeshOptions::default(),
        }
    }
}

impl ViewerConfig {
    /// Defaults, with the backend origin taken from `DEPTH_BACKEND_ORIGIN`
    /// when set.
    pub fn from_env() -> Self {
        let backend_origin =
            env::var(BACKEND_ORIGIN_ENV).unwrap_or_else(|_| DEFAULT_BACKEND_ORIGIN.to_string());
        Self {
            backend_origin,
            ..Self::default()
        }
    }

    /// Parses a (possibly partial) JSON config; missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let origin = self.backend_origin.trim();
        if !(origin.starts_with("http://") || origin.starts_with("https://")) {
            return Err(ConfigError::InvalidOrigin(self.backend_origin.clone()));
        }
        if !(self.luma16_scale.is_finite() && self.luma16_scale > 0.0) {
            return Err(ConfigError::InvalidScale(self.luma16_scale));
        }
        Ok(())
    }

    /// `{backend_origin}{upload_path}` with exactly one slash between them.
    pub fn endpoint_url(&self) -> String {
        let origin = self.backend_origin.trim().trim_end_matches('/');
        let path = self.upload_path.trim().trim_start_matches('/');
        format!("{origin}/{path}")
    }

    pub fn decoder_options(&self) -> DecoderOptions {
        DecoderOptions {
            channel: self.channel,
            luma16_scale: self.luma16_scale,
        }
    }
}

mod channel_name {
    use foundation::Channel;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(channel: &Channel, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(channel.name())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Channel, D::Error> {
        let name = String::deserialize(d)?;
        Channel::parse(&name).ok_or_else(|| D::Error::custom(format!("unknown channel {name:?}")))
    }
}
