use std::cell::Cell;
use std::rc::Rc;

/// Shared flag checked by a per-frame callback before it reschedules itself.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Rc<Cell<bool>>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Owns the single active animation loop.
///
/// `start` cancels whatever loop was running, so at most one callback chain
/// keeps rescheduling itself.
#[derive(Debug, Default)]
pub struct RenderLoop {
    active: Option<CancelToken>,
    started: u64,
}

impl RenderLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) -> CancelToken {
        self.stop();
        let token = CancelToken::new();
        self.active = Some(token.clone());
        self.started += 1;
        token
    }

    pub fn stop(&mut self) {
        if let Some(token) = self.active.take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Number of loops started so far.
    pub fn started(&self) -> u64 {
        self.started
    }
}
