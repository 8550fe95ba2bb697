mod settings;

pub use settings::{
    mask_url_password, DatabaseConfig, LoggingConfig, OtelConfig, ServerConfig, Settings,
};
