/// Configuration structures and TOML loading
pub mod settings;

pub use settings::{Config, ProcessManagerConfig, TargetConfig, TimingConfig};
