use console_error_panic_hook::set_once;
use gloo_net::http::Request;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::Clamped;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::{JsFuture, spawn_local};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, ImageData};

use runtime::{
    CancelToken, PendingUpload, RenderLoop, TransferError, UploadEncoding, UploadOutcome,
    UploadRequest, Viewer, ViewerConfig, VisualMode,
};
use scene::{
    DisplaySize, Label, OrbitCamera, OverlayPainter, Pointer, Segment, base_rgba, paint_overlay,
};
mod wgpu;
use wgpu::{
    WgpuContext, clear_height_mesh, init_wgpu_from_canvas_id, render_mesh, resize_wgpu,
    set_height_mesh,
};

const IMAGE_CANVAS_ID: &str = "depth-canvas";
const MESH_CANVAS_ID: &str = "depth-canvas-3d";
const STATUS_ELEMENT_ID: &str = "depth-status";

struct WebState {
    viewer: Viewer,
    camera: OrbitCamera,
    canvas_width: f64,
    canvas_height: f64,
    wgpu: Option<WgpuContext>,
    render_loop: RenderLoop,
    /// Unannotated image, restored before every overlay repaint.
    base_image: Option<ImageData>,
}

thread_local! {
    static STATE: RefCell<WebState> = RefCell::new(WebState {
        viewer: Viewer::new(ViewerConfig::default()),
        camera: OrbitCamera::default(),
        canvas_width: 1280.0,
        canvas_height: 720.0,
        wgpu: None,
        render_loop: RenderLoop::new(),
        base_image: None,
    });
}

fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

fn log_error(msg: &str) {
    web_sys::console::error_1(&JsValue::from_str(msg));
}

fn document() -> Result<web_sys::Document, JsValue> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| JsValue::from_str("document missing"))
}

fn image_canvas() -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), JsValue> {
    let canvas = document()?
        .get_element_by_id(IMAGE_CANVAS_ID)
        .ok_or_else(|| JsValue::from_str("depth canvas missing"))?
        .dyn_into::<HtmlCanvasElement>()?;
    let ctx = canvas
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2d context unavailable"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    Ok((canvas, ctx))
}

/// Mirrors loading/error into the status element, if the page has one.
fn show_status() {
    let text = STATE.with(|state| {
        let s = state.borrow();
        let v = s.viewer.state();
        if v.loading {
            "Processing…".to_string()
        } else if let Some(err) = &v.error {
            err.clone()
        } else {
            String::new()
        }
    });
    if let Some(el) = document()
        .ok()
        .and_then(|d| d.get_element_by_id(STATUS_ELEMENT_ID))
    {
        el.set_text_content(Some(&text));
    }
}

/// Draws onto the 2D canvas, whose backing store has the buffer's size.
struct CanvasPainter<'a> {
    ctx: CanvasRenderingContext2d,
    base: &'a ImageData,
    scale_x: f64,
    scale_y: f64,
}

impl CanvasPainter<'_> {
    fn to_canvas(&self, p: [f64; 2]) -> (f64, f64) {
        (p[0] * self.scale_x, p[1] * self.scale_y)
    }
}

impl OverlayPainter for CanvasPainter<'_> {
    fn restore_base(&mut self) {
        if let Err(err) = self.ctx.put_image_data(self.base, 0.0, 0.0) {
            log_error(&format!("restore failed: {err:?}"));
        }
    }

    fn segment(&mut self, segment: &Segment) {
        let (x0, y0) = self.to_canvas(segment.from);
        let (x1, y1) = self.to_canvas(segment.to);
        self.ctx.set_stroke_style_str("rgba(255, 64, 64, 0.9)");
        self.ctx.set_line_width(1.0);
        self.ctx.begin_path();
        self.ctx.move_to(x0, y0);
        self.ctx.line_to(x1, y1);
        self.ctx.stroke();
    }

    fn label(&mut self, label: &Label) {
        let (x, y) = self.to_canvas([label.x, label.y]);
        self.ctx.set_font("14px sans-serif");
        self.ctx.set_text_baseline("top");
        self.ctx.set_fill_style_str("rgba(0, 0, 0, 0.6)");
        if let Ok(metrics) = self.ctx.measure_text(&label.text) {
            self.ctx.fill_rect(x - 2.0, y - 2.0, metrics.width() + 4.0, 18.0);
        }
        self.ctx.set_fill_style_str("#ffffff");
        if let Err(err) = self.ctx.fill_text(&label.text, x, y) {
            log_error(&format!("label failed: {err:?}"));
        }
    }
}

fn render_scene() -> Result<(), JsValue> {
    STATE.with(|state_ref| {
        let state = state_ref.borrow();
        match &state.wgpu {
            Some(ctx) => {
                let view_proj = state
                    .camera
                    .view_proj(state.canvas_width, state.canvas_height);
                render_mesh(ctx, view_proj)
            }
            None => Ok(()),
        }
    })
}

fn request_animation_frame(callback: &Closure<dyn FnMut()>) {
    if let Some(window) = web_sys::window() {
        if let Err(err) = window.request_animation_frame(callback.as_ref().unchecked_ref()) {
            log_error(&format!("requestAnimationFrame failed: {err:?}"));
        }
    }
}

/// Re-renders the mesh every frame until `token` is cancelled.
fn run_render_loop(token: CancelToken) {
    let callback: Rc<RefCell<Option<Closure<dyn FnMut()>>>> = Rc::new(RefCell::new(None));
    let next = callback.clone();

    *callback.borrow_mut() = Some(Closure::new(move || {
        if token.is_cancelled() {
            // Drop our own closure to break the Rc cycle.
            let _ = next.borrow_mut().take();
            return;
        }
        if let Err(err) = render_scene() {
            log_error(&format!("render failed: {err:?}"));
        }
        if let Some(cb) = next.borrow().as_ref() {
            request_animation_frame(cb);
        }
    }));

    if let Some(cb) = callback.borrow().as_ref() {
        request_animation_frame(cb);
    }
}

fn start_render_loop() {
    let token = STATE.with(|state| state.borrow_mut().render_loop.start());
    run_render_loop(token);
}

fn stop_render_loop() {
    STATE.with(|state| state.borrow_mut().render_loop.stop());
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    set_once();
    Ok(())
}

/// Replaces the viewer configuration with a (possibly partial) JSON object.
#[wasm_bindgen]
pub fn configure(json: &str) -> Result<(), JsValue> {
    let config = ViewerConfig::from_json(json).map_err(|e| JsValue::from_str(&e.to_string()))?;
    if config.mode == VisualMode::Overlay {
        stop_render_loop();
    }
    STATE.with(|state| state.borrow_mut().viewer.set_config(config));
    Ok(())
}

/// Current viewer state as JSON: generation, loading, error and buffer size.
#[wasm_bindgen]
pub fn viewer_state() -> String {
    STATE.with(|state| {
        let s = state.borrow();
        let v = s.viewer.state();
        serde_json::json!({
            "generation": v.generation.get(),
            "loading": v.loading,
            "error": v.error,
            "width": v.buffer.as_ref().map(|b| b.width()),
            "height": v.buffer.as_ref().map(|b| b.height()),
        })
        .to_string()
    })
}

#[wasm_bindgen]
pub fn init_wgpu() {
    spawn_local(async move {
        if let Err(err) = init_wgpu_inner().await {
            log_error(&format!("wgpu init error: {err:?}"));
        }
    });
}

#[wasm_bindgen]
pub fn set_canvas_sizes(width: f64, height: f64) {
    STATE.with(|state| {
        let mut s = state.borrow_mut();
        s.canvas_width = width;
        s.canvas_height = height;
        if let Some(ctx) = &mut s.wgpu {
            resize_wgpu(ctx, width as u32, height as u32);
        }
    });
}

/// Uploads a user-selected file and shows the resulting depth map.
#[wasm_bindgen]
pub fn upload_file(file: web_sys::File) {
    spawn_local(async move {
        if let Err(err) = upload_file_inner(file).await {
            log_error(&format!("upload error: {err:?}"));
        }
    });
}

async fn upload_file_inner(file: web_sys::File) -> Result<(), JsValue> {
    let buf = JsFuture::from(file.array_buffer()).await?;
    let bytes = js_sys::Uint8Array::new(&buf).to_vec();

    let started: Result<(UploadRequest, PendingUpload), TransferError> = STATE.with(|state| {
        let mut s = state.borrow_mut();
        let request = s.viewer.upload_request(&file.name(), &file.type_(), bytes)?;
        let pending = s.viewer.begin_upload();
        Ok((request, pending))
    });
    let (request, pending) = match started {
        Ok(started) => started,
        Err(err) => {
            log_error(&format!("upload refused: {}", err.detail()));
            STATE.with(|state| state.borrow_mut().viewer.reject(err));
            show_status();
            return Ok(());
        }
    };
    drop_cleared_output();
    show_status();
    log(&format!(
        "uploading {} to {} (generation {})",
        file.name(),
        request.url,
        pending.generation()
    ));

    let body = send(request).await;
    if let Err(err) = &body {
        log_error(&format!("transfer failed: {}", err.detail()));
    }

    let outcome = STATE.with(|state| state.borrow_mut().viewer.finish_upload(pending, body));
    show_status();
    match outcome {
        UploadOutcome::Applied => present_buffer(),
        UploadOutcome::Failed => {
            drop_cleared_output();
            Ok(())
        }
        UploadOutcome::Discarded => {
            log("discarded a response from an older upload");
            Ok(())
        }
    }
}

async fn send(request: UploadRequest) -> Result<Vec<u8>, TransferError> {
    let network = |e: JsValue| TransferError::Network(format!("{e:?}"));
    let builder = Request::post(&request.url).header("Accept", request.accept);
    let req = match request.encoding {
        UploadEncoding::Multipart => {
            let parts = js_sys::Array::of1(&js_sys::Uint8Array::from(request.bytes.as_slice()));
            let bag = web_sys::BlobPropertyBag::new();
            bag.set_type(&request.content_type);
            let blob = web_sys::Blob::new_with_u8_array_sequence_and_options(&parts, &bag)
                .map_err(network)?;
            let form = web_sys::FormData::new().map_err(network)?;
            form.append_with_blob_and_filename(
                UploadRequest::FILE_FIELD,
                &blob,
                &request.file_name,
            )
            .map_err(network)?;
            builder.body(form)
        }
        UploadEncoding::Raw => builder
            .header("Content-Type", UploadRequest::RAW_CONTENT_TYPE)
            .body(js_sys::Uint8Array::from(request.bytes.as_slice())),
    }
    .map_err(|e| TransferError::Network(e.to_string()))?;

    let resp = req
        .send()
        .await
        .map_err(|e| TransferError::Network(e.to_string()))?;
    if !resp.ok() {
        return Err(TransferError::Status(resp.status()));
    }
    resp.binary()
        .await
        .map_err(|e| TransferError::Network(e.to_string()))
}

/// Takes down whatever the viewer no longer holds: the 2D image once the
/// buffer is gone, the wireframe and its render loop once the mesh is gone.
fn drop_cleared_output() {
    let (has_buffer, has_mesh) = STATE.with(|state| {
        let s = state.borrow();
        (s.viewer.buffer().is_some(), s.viewer.mesh().is_some())
    });
    if !has_mesh {
        stop_render_loop();
        STATE.with(|state| {
            if let Some(ctx) = &mut state.borrow_mut().wgpu {
                clear_height_mesh(ctx);
            }
        });
    }
    if !has_buffer {
        STATE.with(|state| state.borrow_mut().base_image = None);
        // Mesh-only pages have no 2D canvas.
        if let Ok((canvas, ctx)) = image_canvas() {
            ctx.clear_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);
        }
    }
}

/// Shows the freshly applied buffer in the configured visual mode.
fn present_buffer() -> Result<(), JsValue> {
    let mode = STATE.with(|state| state.borrow().viewer.config().mode);
    match mode {
        VisualMode::Overlay => {
            stop_render_loop();
            draw_base_image()
        }
        VisualMode::Mesh => {
            STATE.with(|state| {
                let mut s = state.borrow_mut();
                let s = &mut *s;
                if let (Some(ctx), Some(mesh)) = (&mut s.wgpu, s.viewer.mesh()) {
                    set_height_mesh(ctx, mesh);
                }
                s.camera = OrbitCamera::default();
            });
            start_render_loop();
            Ok(())
        }
    }
}

fn draw_base_image() -> Result<(), JsValue> {
    let Some(buffer) = STATE.with(|state| state.borrow().viewer.buffer().cloned()) else {
        return Ok(());
    };
    let (canvas, ctx) = image_canvas()?;
    canvas.set_width(buffer.width());
    canvas.set_height(buffer.height());

    let pixels = base_rgba(&buffer);
    let image =
        ImageData::new_with_u8_clamped_array_and_sh(Clamped(pixels.as_ref()), buffer.width(), buffer.height())?;
    ctx.put_image_data(&image, 0.0, 0.0)?;
    STATE.with(|state| state.borrow_mut().base_image = Some(image));
    Ok(())
}

fn repaint_overlay(plan: Option<&scene::OverlayPlan>, display: DisplaySize) -> Result<(), JsValue> {
    let Some(base) = STATE.with(|state| state.borrow().base_image.clone()) else {
        return Ok(());
    };
    let (canvas, ctx) = image_canvas()?;
    let (scale_x, scale_y) = if display.is_drawable() {
        (
            canvas.width() as f64 / display.width,
            canvas.height() as f64 / display.height,
        )
    } else {
        (1.0, 1.0)
    };
    let mut painter = CanvasPainter {
        ctx,
        base: &base,
        scale_x,
        scale_y,
    };
    paint_overlay(&mut painter, plan);
    Ok(())
}

/// Pointer moved over the depth image.
///
/// `x`, `y` are relative to the element's top-left corner and
/// `display_width`/`display_height` its rendered size, all in CSS pixels.
/// Returns the label text, or `undefined` when nothing is under the pointer.
#[wasm_bindgen]
pub fn pointer_move(
    x: f64,
    y: f64,
    display_width: f64,
    display_height: f64,
) -> Result<Option<String>, JsValue> {
    let display = DisplaySize::new(display_width, display_height);
    let plan = STATE.with(|state| {
        state
            .borrow_mut()
            .viewer
            .overlay_at(Pointer::new(x, y), display)
    });
    repaint_overlay(plan.as_ref(), display)?;
    Ok(plan.map(|p| p.label.text))
}

#[wasm_bindgen]
pub fn pointer_leave() -> Result<(), JsValue> {
    STATE.with(|state| state.borrow_mut().viewer.pointer_leave());
    repaint_overlay(None, DisplaySize::new(0.0, 0.0))
}

/// Redraws the overlay at the last sampled position, e.g. after a resize.
#[wasm_bindgen]
pub fn refresh_overlay() -> Result<(), JsValue> {
    match STATE.with(|state| state.borrow().viewer.last_pointer()) {
        Some((pointer, display)) => pointer_move(pointer.x, pointer.y, display.width, display.height)
            .map(|_| ()),
        None => repaint_overlay(None, DisplaySize::new(0.0, 0.0)),
    }
}

#[wasm_bindgen]
pub fn camera_reset() -> Result<(), JsValue> {
    STATE.with(|state| {
        state.borrow_mut().camera = OrbitCamera::default();
    });
    render_scene()
}

/// Orbit around the mesh.
///
/// Intended usage: call with pointer delta in pixels.
#[wasm_bindgen]
pub fn camera_orbit(delta_x_px: f64, delta_y_px: f64) -> Result<(), JsValue> {
    STATE.with(|state| state.borrow_mut().camera.orbit(delta_x_px, delta_y_px));
    render_scene()
}

/// Zoom (dolly) in/out.
///
/// Intended usage: call with wheel deltaY.
#[wasm_bindgen]
pub fn camera_zoom(wheel_delta_y: f64) -> Result<(), JsValue> {
    STATE.with(|state| state.borrow_mut().camera.zoom(wheel_delta_y));
    render_scene()
}

async fn init_wgpu_inner() -> Result<(), JsValue> {
    let ctx = init_wgpu_from_canvas_id(MESH_CANVAS_ID).await?;

    let has_mesh = STATE.with(|state| {
        let mut s = state.borrow_mut();
        let s = &mut *s;
        let mut ctx = ctx;
        let has_mesh = match s.viewer.mesh() {
            Some(mesh) => {
                set_height_mesh(&mut ctx, mesh);
                true
            }
            None => false,
        };
        s.wgpu = Some(ctx);
        has_mesh
    });

    if has_mesh {
        start_render_loop();
    }
    render_scene()
}
