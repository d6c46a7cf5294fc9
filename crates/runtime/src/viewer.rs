use std::sync::Arc;

use formats::{DecoderOptions, ResponseFormat};
use foundation::{DepthBuffer, RequestGeneration};
use scene::{sample_at, CursorSample, DisplaySize, HeightMesh, OverlayPlan, Pointer};
use tracing::{debug, info, warn};

use crate::config::{ViewerConfig, VisualMode};
use crate::event_bus::{EventBus, EventKind};
use crate::state::ViewerState;
use crate::upload::{TransferError, UploadError, UploadRequest};

/// Handle for one in-flight upload. Consumed when its response is applied.
///
/// Carries the response format the request asked for, so a configuration
/// change while it is in flight does not alter how its body is decoded.
#[derive(Debug, PartialEq)]
#[must_use]
pub struct PendingUpload {
    generation: RequestGeneration,
    format: ResponseFormat,
    options: DecoderOptions,
}

impl PendingUpload {
    pub fn generation(&self) -> RequestGeneration {
        self.generation
    }

    pub fn format(&self) -> ResponseFormat {
        self.format
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Applied,
    Failed,
    /// A newer upload was started meanwhile; state was not touched.
    Discarded,
}

/// Upload lifecycle and pointer handling for one viewer surface.
///
/// Single-threaded: every method is one event and replaces the state
/// snapshot at most once.
#[derive(Debug)]
pub struct Viewer {
    config: ViewerConfig,
    state: ViewerState,
    mesh: Option<Arc<HeightMesh>>,
    last_pointer: Option<(Pointer, DisplaySize)>,
    events: EventBus,
}

impl Viewer {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            state: ViewerState::default(),
            mesh: None,
            last_pointer: None,
            events: EventBus::new(),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Takes effect for the next upload; the shown buffer is kept.
    pub fn set_config(&mut self, config: ViewerConfig) {
        self.config = config;
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn buffer(&self) -> Option<&Arc<DepthBuffer>> {
        self.state.buffer.as_ref()
    }

    /// Present only in mesh mode, after a successful upload.
    pub fn mesh(&self) -> Option<&Arc<HeightMesh>> {
        self.mesh.as_ref()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Builds the POST for `bytes` from the current configuration.
    pub fn upload_request(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadRequest, TransferError> {
        if bytes.is_empty() {
            return Err(TransferError::EmptyFile);
        }
        let accept = self.config.format.content_type();
        let content_type = if content_type.trim().is_empty() {
            UploadRequest::RAW_CONTENT_TYPE
        } else {
            content_type
        };
        Ok(UploadRequest {
            url: self.config.endpoint_url(),
            encoding: self.config.encoding,
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
            accept,
        })
    }

    /// Issues a new generation and enters the loading state.
    pub fn begin_upload(&mut self) -> PendingUpload {
        let generation = self.state.generation.next();
        self.state = self.state.started(generation, self.config.policy);
        if self.state.buffer.is_none() {
            self.mesh = None;
            self.last_pointer = None;
        }
        self.events
            .emit(generation, EventKind::UploadStarted, self.config.endpoint_url());
        debug!(%generation, url = %self.config.endpoint_url(), "upload started");
        PendingUpload {
            generation,
            format: self.config.format,
            options: self.config.decoder_options(),
        }
    }

    /// Reports an upload that was refused before any request went out.
    /// The shown buffer and any in-flight upload are left alone.
    pub fn reject(&mut self, err: TransferError) {
        let err = UploadError::from(err);
        warn!(error = %err, "upload refused");
        self.events
            .emit(self.state.generation, EventKind::UploadFailed, err.to_string());
        self.state = self.state.with_error(err.user_message());
    }

    /// Decodes a response body in the format the upload asked for, then
    /// applies it.
    pub fn finish_upload(
        &mut self,
        pending: PendingUpload,
        body: Result<Vec<u8>, TransferError>,
    ) -> UploadOutcome {
        if self.is_stale(&pending) {
            return self.discard(pending);
        }
        let (format, options) = (pending.format, pending.options);
        let decoded = body.map_err(UploadError::from).and_then(|bytes| {
            format.decode(options, &bytes).map_err(UploadError::from)
        });
        self.apply(pending, decoded)
    }

    /// Applies a finished upload if it is still the latest one.
    pub fn apply(
        &mut self,
        pending: PendingUpload,
        result: Result<DepthBuffer, UploadError>,
    ) -> UploadOutcome {
        if self.is_stale(&pending) {
            return self.discard(pending);
        }
        let generation = pending.generation;
        match result {
            Ok(buffer) => {
                let buffer = Arc::new(buffer);
                info!(
                    %generation,
                    width = buffer.width(),
                    height = buffer.height(),
                    "depth buffer ready"
                );
                self.events.emit(
                    generation,
                    EventKind::UploadApplied,
                    format!("{}x{}", buffer.width(), buffer.height()),
                );
                self.mesh = match self.config.mode {
                    VisualMode::Mesh => {
                        let mesh = HeightMesh::from_buffer(&buffer, &self.config.mesh);
                        self.events.emit(
                            generation,
                            EventKind::MeshBuilt,
                            format!("{} vertices", mesh.vertex_count()),
                        );
                        Some(Arc::new(mesh))
                    }
                    VisualMode::Overlay => None,
                };
                self.last_pointer = None;
                self.state = self.state.succeeded(buffer);
                UploadOutcome::Applied
            }
            Err(err) => {
                warn!(%generation, error = %err, "upload failed");
                self.events
                    .emit(generation, EventKind::UploadFailed, err.to_string());
                self.state = self.state.failed(err.user_message());
                UploadOutcome::Failed
            }
        }
    }

    /// Samples the shown buffer under `pointer`. Remembers the position only
    /// when it produced a sample.
    pub fn pointer_move(&mut self, pointer: Pointer, display: DisplaySize) -> Option<CursorSample> {
        let buffer = self.state.buffer.as_ref()?;
        let sample = sample_at(buffer, pointer, display, self.config.sampling);
        self.last_pointer = sample.map(|_| (pointer, display));
        sample
    }

    /// Crosshair and label for `pointer`, or `None` when there is nothing to
    /// draw (no buffer, mesh mode, or pointer off the image).
    pub fn overlay_at(&mut self, pointer: Pointer, display: DisplaySize) -> Option<OverlayPlan> {
        if self.config.mode != VisualMode::Overlay {
            return None;
        }
        let sample = self.pointer_move(pointer, display)?;
        Some(OverlayPlan::for_sample(
            &sample,
            display,
            self.config.unit.as_deref(),
        ))
    }

    pub fn pointer_leave(&mut self) {
        self.last_pointer = None;
    }

    /// Last position that produced a sample, for redrawing the overlay.
    pub fn last_pointer(&self) -> Option<(Pointer, DisplaySize)> {
        self.last_pointer
    }

    fn is_stale(&self, pending: &PendingUpload) -> bool {
        pending.generation != self.state.generation
    }

    fn discard(&mut self, pending: PendingUpload) -> UploadOutcome {
        debug!(
            generation = %pending.generation,
            latest = %self.state.generation,
            "discarding stale upload response"
        );
        self.events.emit(
            pending.generation,
            EventKind::UploadDiscarded,
            format!("superseded by {}", self.state.generation),
        );
        UploadOutcome::Discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{UploadEncoding, UploadPolicy};
    use formats::{encode_normalized, ResponseFormat};
    use pretty_assertions::assert_eq;

    fn normalized_body(width: u32, height: u32, depths: &[f32]) -> Vec<u8> {
        let response = encode_normalized(width, height, depths).unwrap();
        serde_json::to_vec(&response).unwrap()
    }

    fn viewer(policy: UploadPolicy) -> Viewer {
        Viewer::new(ViewerConfig {
            policy,
            ..ViewerConfig::default()
        })
    }

    #[test]
    fn successful_upload_shows_buffer_and_clears_loading() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        assert!(v.state().loading);

        let body = normalized_body(2, 1, &[0.0, 10.0]);
        assert_eq!(v.finish_upload(p, Ok(body)), UploadOutcome::Applied);

        let state = v.state();
        assert!(!state.loading);
        assert_eq!(state.error, None);
        let buffer = state.buffer.as_ref().unwrap();
        assert_eq!((buffer.width(), buffer.height()), (2, 1));
        assert_eq!(buffer.depth(1, 0), Some(10.0));
    }

    #[test]
    fn transfer_error_keeps_previous_buffer_when_retaining() {
        let mut v = viewer(UploadPolicy::RetainUntilReplaced);
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(1, 1, &[3.0])));
        let before = v.state().buffer.clone().unwrap();

        let p = v.begin_upload();
        assert_eq!(
            v.finish_upload(p, Err(TransferError::Status(500))),
            UploadOutcome::Failed
        );
        let state = v.state();
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("Upload failed: processing failed"));
        assert!(Arc::ptr_eq(state.buffer.as_ref().unwrap(), &before));
    }

    #[test]
    fn second_upload_clears_buffer_when_clearing_on_start() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(1, 1, &[3.0])));
        assert!(v.state().has_buffer());

        let p = v.begin_upload();
        assert!(!v.state().has_buffer());
        v.finish_upload(p, Err(TransferError::Network("reset".to_string())));
        assert!(!v.state().has_buffer());
        assert!(v.state().error.is_some());
    }

    #[test]
    fn decode_failure_surfaces_message() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        assert_eq!(
            v.finish_upload(p, Ok(b"not json".to_vec())),
            UploadOutcome::Failed
        );
        let msg = v.state().error.clone().unwrap();
        assert!(msg.starts_with("Could not read depth data"), "{msg}");
        assert!(!v.state().loading);
    }

    #[test]
    fn older_response_arriving_late_is_discarded() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let first = v.begin_upload();
        let second = v.begin_upload();

        assert_eq!(
            v.finish_upload(second, Ok(normalized_body(1, 1, &[7.0]))),
            UploadOutcome::Applied
        );
        let applied = v.state().clone();
        assert!(!applied.loading);

        // The first request resolves afterwards: nothing changes.
        assert_eq!(
            v.finish_upload(first, Err(TransferError::Status(500))),
            UploadOutcome::Discarded
        );
        assert_eq!(v.state(), &applied);
        assert_eq!(v.events().count(EventKind::UploadApplied), 1);
        assert_eq!(v.events().count(EventKind::UploadDiscarded), 1);
    }

    #[test]
    fn loading_stays_on_until_the_latest_upload_finishes() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let first = v.begin_upload();
        let second = v.begin_upload();

        v.finish_upload(first, Ok(normalized_body(1, 1, &[1.0])));
        assert!(v.state().loading);
        assert!(!v.state().has_buffer());

        v.finish_upload(second, Ok(normalized_body(1, 1, &[2.0])));
        assert!(!v.state().loading);
    }

    #[test]
    fn pointer_sampling_is_inert_without_buffer() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let display = DisplaySize::new(10.0, 10.0);
        assert_eq!(v.pointer_move(Pointer::new(1.0, 1.0), display), None);

        let _pending = v.begin_upload();
        assert_eq!(v.pointer_move(Pointer::new(1.0, 1.0), display), None);
        assert_eq!(v.last_pointer(), None);
    }

    #[test]
    fn overlay_plan_follows_pointer_and_unit() {
        let mut v = Viewer::new(ViewerConfig {
            unit: Some("ft".to_string()),
            ..ViewerConfig::default()
        });
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(2, 2, &[0.0, 10.0, 10.0, 10.0])));

        let display = DisplaySize::new(4.0, 4.0);
        let plan = v.overlay_at(Pointer::new(1.0, 1.0), display).unwrap();
        assert_eq!(plan.label.text, "Depth: 0.00 ft");
        assert_eq!(v.last_pointer(), Some((Pointer::new(1.0, 1.0), display)));

        assert_eq!(v.overlay_at(Pointer::new(9.0, 1.0), display), None);
        assert_eq!(v.last_pointer(), None);
    }

    #[test]
    fn mesh_mode_builds_mesh_once_per_upload() {
        let mut v = Viewer::new(ViewerConfig {
            mode: VisualMode::Mesh,
            ..ViewerConfig::default()
        });
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(3, 2, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0])));
        assert_eq!(v.mesh().unwrap().vertex_count(), 6);
        assert_eq!(v.events().count(EventKind::MeshBuilt), 1);
        // No crosshair in mesh mode.
        assert_eq!(
            v.overlay_at(Pointer::new(0.5, 0.5), DisplaySize::new(3.0, 2.0)),
            None
        );

        let _p = v.begin_upload();
        assert!(v.mesh().is_none());
    }

    #[test]
    fn failed_upload_after_clearing_leaves_nothing_to_render() {
        let mut v = Viewer::new(ViewerConfig {
            mode: VisualMode::Mesh,
            ..ViewerConfig::default()
        });
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(2, 1, &[0.0, 1.0])));
        assert!(v.mesh().is_some());

        let p = v.begin_upload();
        assert!(v.buffer().is_none());
        assert!(v.mesh().is_none());
        assert_eq!(
            v.finish_upload(p, Err(TransferError::Status(502))),
            UploadOutcome::Failed
        );
        assert!(v.buffer().is_none());
        assert!(v.mesh().is_none());
    }

    #[test]
    fn refused_empty_file_surfaces_message_and_keeps_buffer() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        v.finish_upload(p, Ok(normalized_body(1, 1, &[3.0])));
        let before = v.state().clone();

        let err = v.upload_request("empty.png", "image/png", Vec::new()).unwrap_err();
        assert_eq!(err, TransferError::EmptyFile);
        v.reject(err);

        let state = v.state();
        assert_eq!(state.error.as_deref(), Some("Upload failed: processing failed"));
        assert!(!state.loading);
        assert_eq!(state.generation, before.generation);
        assert_eq!(state.buffer, before.buffer);
        assert_eq!(v.events().count(EventKind::UploadFailed), 1);
    }

    #[test]
    fn refusal_during_an_upload_keeps_it_loading() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        v.reject(TransferError::EmptyFile);
        assert!(v.state().loading);
        assert!(v.state().error.is_some());

        assert_eq!(
            v.finish_upload(p, Ok(normalized_body(1, 1, &[2.0]))),
            UploadOutcome::Applied
        );
        assert_eq!(v.state().error, None);
    }

    #[test]
    fn response_decodes_with_the_format_it_was_requested_in() {
        let mut v = viewer(UploadPolicy::ClearOnStart);
        let p = v.begin_upload();
        assert_eq!(p.format(), ResponseFormat::NormalizedByte);

        let switched = ViewerConfig {
            format: ResponseFormat::ImageChannel,
            ..v.config().clone()
        };
        v.set_config(switched);
        assert_eq!(
            v.finish_upload(p, Ok(normalized_body(2, 1, &[0.0, 4.0]))),
            UploadOutcome::Applied
        );
        assert_eq!(v.buffer().unwrap().depth(1, 0), Some(4.0));

        let p = v.begin_upload();
        assert_eq!(p.format(), ResponseFormat::ImageChannel);
    }

    #[test]
    fn upload_request_uses_config() {
        let v = Viewer::new(ViewerConfig {
            format: ResponseFormat::ImageChannel,
            encoding: UploadEncoding::Raw,
            ..ViewerConfig::default()
        });
        let req = v.upload_request("a.jpg", "image/jpeg", vec![1, 2, 3]).unwrap();
        assert_eq!(req.url, "http://localhost:5000/upload");
        assert_eq!(req.accept, "image/png");
        assert_eq!(req.encoding, UploadEncoding::Raw);
        assert_eq!(req.content_type, "image/jpeg");

        assert_eq!(
            v.upload_request("empty.png", "image/png", Vec::new()),
            Err(TransferError::EmptyFile)
        );
    }
}
