//! Configuration management for fieldqueue.
//!
//! This module handles loading and saving configuration from `~/.fieldqueue/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{
    ColorSetting, Config, DeliveryConfig, GeneralConfig, LoggingConfig, QueueSettings,
    ReplaySettings,
};
