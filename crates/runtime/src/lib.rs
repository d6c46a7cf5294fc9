pub mod config;
pub mod event_bus;
pub mod render_loop;
pub mod state;
pub mod upload;
pub mod viewer;

pub use config::*;
pub use event_bus::*;
pub use render_loop::*;
pub use state::*;
pub use upload::*;
pub use viewer::*;
