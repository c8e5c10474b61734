mod settings;

pub use settings::{ApnConfig, FailureSinkConfig, LoggingConfig, OtelConfig, Settings};
