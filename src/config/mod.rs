pub mod error;
pub mod load;
pub mod settings;

pub use error::ConfigError;
pub use load::{load_settings, resolve_config_path, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use settings::{
    default_handlers, ExecutorSettings, LogSettings, Settings, ValidationOptions, WorkerSettings,
    DEFAULT_DATA_FOLDER, DEFAULT_EXECUTOR_PATH,
};
