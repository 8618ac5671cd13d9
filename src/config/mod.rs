//! Configuration
//!
//! Built-in defaults, an optional YAML file, and environment overrides,
//! merged by [`ConfigLoader`].

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::{ConfigLoader, parse_namespace};
pub use schema::{Config, ControllerKindsConfig};
