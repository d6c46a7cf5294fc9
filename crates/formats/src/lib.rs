pub mod decode;
pub mod encode;
pub mod response;

pub use decode::*;
pub use encode::*;
pub use response::*;
