use crate::vault::VaultError;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum DataSourceError {
    #[error("Missing required configuration key: {key}")]
    MissingConfiguration { key: String },

    #[error("Invalid value for configuration key {key}: {value}")]
    InvalidConfiguration { key: String, value: String },

    #[error("Failed to retrieve secret {secret_name}")]
    SecretRetrievalFailure {
        secret_name: String,
        #[source]
        source: Option<VaultError>,
    },

    #[error("Malformed secret payload: {0}")]
    MalformedSecret(#[from] serde_json::Error),

    #[error("Invalid datasource URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: SqlxError,
    },

    #[error("Datasource verification failed: {0}")]
    Verification(#[source] SqlxError),
}

impl DataSourceError {
    pub fn missing(key: impl Into<String>) -> Self {
        DataSourceError::MissingConfiguration { key: key.into() }
    }

    pub(crate) fn retrieval(secret_name: impl Into<String>, source: Option<VaultError>) -> Self {
        DataSourceError::SecretRetrievalFailure {
            secret_name: secret_name.into(),
            source,
        }
    }
}
