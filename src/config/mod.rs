//! Configuration management

mod settings;

pub use settings::{DaemonConfig, CONFIG_VERSION, DEFAULT_SOCKET_PATH};
