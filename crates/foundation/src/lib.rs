pub mod depth;
pub mod ids;

// Foundation crate: small, well-tested primitives only.
pub use depth::*;
pub use ids::*;
