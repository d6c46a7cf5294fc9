//! Stand-in for the depth estimation backend.
//!
//! `POST /upload` accepts an image (multipart `file` field or raw body) and
//! answers with a synthetic depth map in the configured [`ResponseFormat`].
//! Depth is derived from luminance: brighter pixels are nearer.

use std::env;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use formats::{
    encode_compressed_float, encode_image_channel, encode_luma16, encode_normalized, EncodeError,
    ResponseFormat, DEFAULT_LUMA16_SCALE,
};
use foundation::Channel;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub const MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq)]
pub struct MockConfig {
    pub format: ResponseFormat,
    /// Depth assigned to a black pixel; white maps to 0.
    pub depth_scale: f32,
    pub channel: Channel,
    pub luma16_scale: f32,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            format: ResponseFormat::NormalizedByte,
            depth_scale: 10.0,
            channel: Channel::Red,
            luma16_scale: DEFAULT_LUMA16_SCALE,
        }
    }
}

impl MockConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let format = match env::var("MOCK_FORMAT") {
            Ok(name) => ResponseFormat::parse(&name).unwrap_or_else(|| {
                warn!("unknown MOCK_FORMAT {name:?}, using {}", defaults.format);
                defaults.format
            }),
            Err(_) => defaults.format,
        };
        let channel = env::var("MOCK_CHANNEL")
            .ok()
            .and_then(|v| Channel::parse(&v))
            .unwrap_or(defaults.channel);
        Self {
            format,
            depth_scale: env_var_f32("MOCK_DEPTH_SCALE", defaults.depth_scale),
            channel,
            luma16_scale: env_var_f32("MOCK_LUMA16_SCALE", defaults.luma16_scale),
        }
    }
}

fn env_var_f32(key: &str, default: f32) -> f32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|v: &f32| v.is_finite())
        .unwrap_or(default)
}

#[derive(Debug)]
pub enum MockError {
    EmptyUpload,
    MissingFileField,
    Body(String),
    Image(image::ImageError),
    Encode(EncodeError),
    Json(serde_json::Error),
}

impl MockError {
    pub fn status(&self) -> StatusCode {
        match self {
            MockError::EmptyUpload | MockError::MissingFileField | MockError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            MockError::Image(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MockError::Encode(_) | MockError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for MockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MockError::EmptyUpload => write!(f, "empty upload"),
            MockError::MissingFileField => write!(f, "multipart body has no `file` field"),
            MockError::Body(msg) => write!(f, "unreadable request body: {msg}"),
            MockError::Image(err) => write!(f, "not a decodable image: {err}"),
            MockError::Encode(err) => write!(f, "{err}"),
            MockError::Json(err) => write!(f, "json encoding failed: {err}"),
        }
    }
}

impl std::error::Error for MockError {}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// A fully encoded `/upload` response body.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthBody {
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// Row-major depth grid from image luminance: `(1 - luma / 255) * scale`.
pub fn synthesize_depth(image_bytes: &[u8], depth_scale: f32) -> Result<(u32, u32, Vec<f32>), MockError> {
    if image_bytes.is_empty() {
        return Err(MockError::EmptyUpload);
    }
    let luma = image::load_from_memory(image_bytes)
        .map_err(MockError::Image)?
        .to_luma8();
    let (width, height) = luma.dimensions();
    let depths = luma
        .pixels()
        .map(|p| (1.0 - p.0[0] as f32 / 255.0) * depth_scale)
        .collect();
    Ok((width, height, depths))
}

/// Encodes the synthetic depth of `image_bytes` in the configured format.
pub fn respond(config: &MockConfig, image_bytes: &[u8]) -> Result<DepthBody, MockError> {
    let (width, height, depths) = synthesize_depth(image_bytes, config.depth_scale)?;
    let content_type = config.format.content_type();
    let bytes = match config.format {
        ResponseFormat::ImageChannel => {
            encode_image_channel(width, height, &depths, config.channel).map_err(MockError::Encode)?
        }
        ResponseFormat::Luma16 => {
            encode_luma16(width, height, &depths, config.luma16_scale).map_err(MockError::Encode)?
        }
        ResponseFormat::CompressedFloat => {
            let body = encode_compressed_float(width, height, &depths).map_err(MockError::Encode)?;
            serde_json::to_vec(&body).map_err(MockError::Json)?
        }
        ResponseFormat::NormalizedByte => {
            let body = encode_normalized(width, height, &depths).map_err(MockError::Encode)?;
            serde_json::to_vec(&body).map_err(MockError::Json)?
        }
    };
    Ok(DepthBody {
        content_type,
        bytes,
    })
}

pub fn router(config: MockConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

    Router::new()
        .route("/healthz", get(healthz))
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(config))
}

/// Serves [`router`] on an already bound listener until the task is dropped.
pub async fn serve(listener: tokio::net::TcpListener, config: MockConfig) -> std::io::Result<()> {
    axum::serve(listener, router(config)).await
}

async fn healthz() -> Response {
    (StatusCode::OK, "ok").into_response()
}

async fn upload(State(config): State<Arc<MockConfig>>, request: Request) -> Response {
    let image_bytes = match read_image(request).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!("upload rejected: {err}");
            return err.into_response();
        }
    };

    match respond(&config, &image_bytes) {
        Ok(body) => {
            debug!(
                format = %config.format,
                bytes = body.bytes.len(),
                "depth response encoded"
            );
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, body.content_type)],
                body.bytes,
            )
                .into_response()
        }
        Err(err) => {
            warn!("upload failed: {err}");
            err.into_response()
        }
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"))
}

async fn read_image(request: Request) -> Result<Bytes, MockError> {
    if !is_multipart(request.headers()) {
        return Bytes::from_request(request, &())
            .await
            .map_err(|e| MockError::Body(e.body_text()));
    }

    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|e| MockError::Body(e.body_text()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MockError::Body(e.body_text()))?
    {
        if field.name() == Some("file") {
            return field.bytes().await.map_err(|e| MockError::Body(e.body_text()));
        }
    }
    Err(MockError::MissingFileField)
}
