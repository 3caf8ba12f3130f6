pub mod config;
pub mod datasource;
pub mod error;
pub mod secret;
pub mod vault;

pub use config::Environment;
pub use datasource::{DataSource, DataSourceConfiguration, PoolOptions, init_data_source};
pub use error::DataSourceError;
pub use secret::DbParameter;
pub use vault::{SecretStore, SecretStoreProvider, SecretValue, VaultError};
