pub mod camera;
pub mod mesh;
pub mod overlay;
pub mod picking;
pub mod preview;

pub use camera::*;
pub use mesh::*;
pub use overlay::*;
pub use picking::*;
pub use preview::*;
