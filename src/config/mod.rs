// Configuration for the feeder daemon

pub mod loader;
pub mod settings;

pub use loader::{default_config_path, default_state_path, load_settings};
pub use settings::{DeviceSettings, GeneralSettings, OperatorSettings, Settings};
