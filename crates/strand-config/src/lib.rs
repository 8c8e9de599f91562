pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigLoader, CONFIG_CONTENT_ENV, CONFIG_ENV};
pub use schema::{Config, ProviderConfig, SessionConfig, WireFormat};
