pub mod config_manager;
pub mod dispatcher_config;
pub mod marker_config;

pub use config_manager::{Config, ConfigManager};
pub use dispatcher_config::DispatcherConfig;
pub use marker_config::{BlockColorEntry, MarkerConfig};
