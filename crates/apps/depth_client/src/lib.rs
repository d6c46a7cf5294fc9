use std::path::Path;
use std::sync::Arc;

use foundation::DepthBuffer;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use runtime::{TransferError, UploadEncoding, UploadOutcome, UploadRequest, Viewer};
use scene::{DisplaySize, Pointer};
use tracing::{debug, error};

/// Sends [`UploadRequest`]s with `reqwest`.
#[derive(Clone, Debug, Default)]
pub struct HttpUploader {
    client: Client,
}

impl HttpUploader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// One POST, no retries. Returns the raw response body of a 2xx answer.
    pub async fn send(&self, request: UploadRequest) -> Result<Vec<u8>, TransferError> {
        if request.bytes.is_empty() {
            return Err(TransferError::EmptyFile);
        }

        let builder = self
            .client
            .post(&request.url)
            .header(ACCEPT, request.accept);
        let builder = match request.encoding {
            UploadEncoding::Multipart => {
                let part = Part::bytes(request.bytes)
                    .file_name(request.file_name)
                    .mime_str(&request.content_type)
                    .map_err(network)?;
                builder.multipart(Form::new().part(UploadRequest::FILE_FIELD, part))
            }
            UploadEncoding::Raw => builder
                .header(CONTENT_TYPE, UploadRequest::RAW_CONTENT_TYPE)
                .body(request.bytes),
        };

        let resp = builder.send().await.map_err(network)?;
        let status = resp.status();
        if !status.is_success() {
            error!("upload to {} failed: {status}", request.url);
            return Err(TransferError::Status(status.as_u16()));
        }

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.map_err(network)?);
        }
        debug!("received {} bytes from {}", body.len(), request.url);
        Ok(body)
    }
}

fn network(err: reqwest::Error) -> TransferError {
    TransferError::Network(err.to_string())
}

#[derive(Debug)]
pub enum ClientError {
    Io(std::io::Error),
    /// The upload finished with the given user-facing message.
    Upload(String),
    Export(std::io::Error),
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Io(err) => write!(f, "could not read image: {err}"),
            ClientError::Upload(msg) => write!(f, "{msg}"),
            ClientError::Export(err) => write!(f, "could not write mesh: {err}"),
        }
    }
}

impl std::error::Error for ClientError {}

/// Runs one upload through `viewer` and returns the buffer it now shows.
pub async fn upload_bytes(
    viewer: &mut Viewer,
    uploader: &HttpUploader,
    file_name: &str,
    content_type: &str,
    bytes: Vec<u8>,
) -> Result<Arc<DepthBuffer>, ClientError> {
    let request = match viewer.upload_request(file_name, content_type, bytes) {
        Ok(request) => request,
        Err(err) => return Err(ClientError::Upload(runtime::UploadError::from(err).user_message())),
    };
    let pending = viewer.begin_upload();
    let body = uploader.send(request).await;

    match viewer.finish_upload(pending, body) {
        UploadOutcome::Applied => viewer
            .buffer()
            .cloned()
            .ok_or_else(|| ClientError::Upload("no depth buffer".to_string())),
        UploadOutcome::Failed | UploadOutcome::Discarded => Err(ClientError::Upload(
            viewer
                .state()
                .error
                .clone()
                .unwrap_or_else(|| "upload was superseded".to_string()),
        )),
    }
}

pub async fn upload_file(
    viewer: &mut Viewer,
    uploader: &HttpUploader,
    path: &Path,
) -> Result<Arc<DepthBuffer>, ClientError> {
    let bytes = tokio::fs::read(path).await.map_err(ClientError::Io)?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("image")
        .to_string();
    upload_bytes(viewer, uploader, &file_name, content_type_for(path), bytes).await
}

/// Guesses the image MIME type from the file extension.
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => UploadRequest::RAW_CONTENT_TYPE,
    }
}

/// `X,Y` in display pixels.
pub fn parse_point(s: &str) -> Result<Pointer, String> {
    let (x, y) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got {s:?}"))?;
    let x: f64 = x.trim().parse().map_err(|e| format!("bad x {x:?}: {e}"))?;
    let y: f64 = y.trim().parse().map_err(|e| format!("bad y {y:?}: {e}"))?;
    Ok(Pointer::new(x, y))
}

/// `WxH` in display pixels.
pub fn parse_size(s: &str) -> Result<DisplaySize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w: f64 = w.trim().parse().map_err(|e| format!("bad width {w:?}: {e}"))?;
    let h: f64 = h.trim().parse().map_err(|e| format!("bad height {h:?}: {e}"))?;
    let size = DisplaySize::new(w, h);
    if !size.is_drawable() {
        return Err(format!("display size must be positive, got {s:?}"));
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::{encode_image_channel, ResponseFormat};
    use foundation::Channel;
    use mock_backend::MockConfig;
    use pretty_assertions::assert_eq;
    use runtime::{ViewerConfig, VisualMode};

    async fn spawn_backend(config: MockConfig) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(mock_backend::serve(listener, config));
        format!("http://{addr}")
    }

    // Left half black (far), right half white (near).
    fn fixture_png() -> Vec<u8> {
        let depths = [0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0];
        encode_image_channel(4, 2, &depths, Channel::Red).unwrap()
    }

    fn viewer_for(origin: &str, format: ResponseFormat, encoding: UploadEncoding) -> Viewer {
        Viewer::new(ViewerConfig {
            backend_origin: origin.to_string(),
            format,
            encoding,
            ..ViewerConfig::default()
        })
    }

    #[tokio::test]
    async fn every_format_round_trips_through_the_backend() {
        let uploader = HttpUploader::new();
        for format in ResponseFormat::ALL {
            let origin = spawn_backend(MockConfig {
                format,
                ..MockConfig::default()
            })
            .await;
            for encoding in [UploadEncoding::Multipart, UploadEncoding::Raw] {
                let mut viewer = viewer_for(&origin, format, encoding);
                let buffer = upload_bytes(&mut viewer, &uploader, "f.png", "image/png", fixture_png())
                    .await
                    .unwrap_or_else(|e| panic!("{format} {encoding:?}: {e}"));

                assert_eq!((buffer.width(), buffer.height()), (4, 2));
                assert!(!viewer.state().loading);
                assert_eq!(viewer.state().error, None);
                let near = buffer.depth(0, 0).unwrap();
                let far = buffer.depth(3, 1).unwrap();
                assert!(near != far, "{format}: {near} vs {far}");
            }
        }
    }

    #[tokio::test]
    async fn normalized_bytes_rescale_to_backend_units() {
        let origin = spawn_backend(MockConfig::default()).await;
        let mut viewer = viewer_for(&origin, ResponseFormat::NormalizedByte, UploadEncoding::Multipart);
        let buffer = upload_bytes(&mut viewer, &HttpUploader::new(), "f.png", "image/png", fixture_png())
            .await
            .unwrap();
        assert_eq!(buffer.depth_bounds(), Some((0.0, 10.0)));
    }

    #[tokio::test]
    async fn non_success_status_is_a_transfer_error() {
        let origin = spawn_backend(MockConfig::default()).await;
        let mut viewer = viewer_for(&origin, ResponseFormat::NormalizedByte, UploadEncoding::Raw);
        let request = viewer
            .upload_request("junk.png", "image/png", b"not an image".to_vec())
            .unwrap();
        assert_eq!(
            HttpUploader::new().send(request).await,
            Err(TransferError::Status(422))
        );

        let err = upload_bytes(
            &mut viewer,
            &HttpUploader::new(),
            "junk.png",
            "image/png",
            b"not an image".to_vec(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Upload failed: processing failed");
        assert!(!viewer.state().loading);
        assert!(viewer.buffer().is_none());
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_network_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let viewer = viewer_for(
            &format!("http://{addr}"),
            ResponseFormat::NormalizedByte,
            UploadEncoding::Multipart,
        );
        let request = viewer.upload_request("f.png", "image/png", fixture_png()).unwrap();
        let result = HttpUploader::new().send(request).await;
        assert!(matches!(result, Err(TransferError::Network(_))), "{result:?}");
    }

    #[tokio::test]
    async fn mesh_mode_builds_a_mesh_from_the_upload() {
        let origin = spawn_backend(MockConfig::default()).await;
        let mut viewer = Viewer::new(ViewerConfig {
            backend_origin: origin,
            mode: VisualMode::Mesh,
            ..ViewerConfig::default()
        });
        upload_bytes(&mut viewer, &HttpUploader::new(), "f.png", "image/png", fixture_png())
            .await
            .unwrap();
        let mesh = viewer.mesh().unwrap();
        assert_eq!(mesh.vertex_count(), 8);
        assert!(mesh.to_obj().contains("\nl 1 2\n"));
    }

    #[test]
    fn parses_points_and_sizes() {
        assert_eq!(parse_point("3, 4.5"), Ok(Pointer::new(3.0, 4.5)));
        assert!(parse_point("3;4").is_err());
        assert_eq!(parse_size("640x480"), Ok(DisplaySize::new(640.0, 480.0)));
        assert!(parse_size("0x480").is_err());
        assert!(parse_size("640").is_err());
    }

    #[test]
    fn content_type_follows_extension() {
        assert_eq!(content_type_for(Path::new("a/b.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("photo.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }
}
