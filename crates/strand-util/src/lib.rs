pub mod logging;

pub use logging::{init_tracing, LogHandle, LogLevel};
