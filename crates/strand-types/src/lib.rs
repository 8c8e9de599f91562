pub mod chunk;
pub mod message;
pub mod tool;

pub use chunk::*;
pub use message::*;
pub use tool::*;
