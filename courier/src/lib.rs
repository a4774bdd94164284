pub mod config;
pub mod controller;

pub use config::find_config_file;
pub use controller::{Courier, SHUTDOWN_BROADCAST, Service};
