pub mod constants;
pub mod settings;

pub use settings::{EngineSettings, SettingsError};
