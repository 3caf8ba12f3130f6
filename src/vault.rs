//! Secret store access.
//!
//! `SecretStore` is the seam the resolver talks to; `AwsSecretsManager` is the
//! production implementation backed by the AWS SDK.

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_secretsmanager::Client;
use aws_sdk_secretsmanager::config::Region;
use aws_sdk_secretsmanager::error::ProvideErrorMetadata;
use aws_sdk_secretsmanager::operation::get_secret_value::GetSecretValueError;
use thiserror::Error as ThisError;
use tracing::debug;

#[derive(Debug, ThisError)]
pub enum VaultError {
    #[error("The requested secret {0} was not found")]
    SecretNotFound(String),

    #[error("The request was invalid due to: {0}")]
    InvalidRequest(String),

    #[error("The request had invalid params: {0}")]
    InvalidParameter(String),

    #[error("Secret store error: {0}")]
    Service(String),
}

/// Raw secret as returned by the store. Exactly one of the payloads is
/// normally populated.
#[derive(Debug, Clone, Default)]
pub struct SecretValue {
    pub secret_string: Option<String>,
    pub secret_binary: Option<Vec<u8>>,
}

/// Where the store lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultEndpoint {
    pub endpoint: String,
    pub region: String,
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret_value(&self, secret_id: &str) -> Result<SecretValue, VaultError>;
}

/// Builds a store client scoped to one endpoint and region.
#[async_trait]
pub trait SecretStoreProvider: Send + Sync {
    async fn connect(&self, endpoint: &VaultEndpoint)
    -> Result<Box<dyn SecretStore>, VaultError>;
}

pub struct AwsSecretsManager {
    client: Client,
}

impl AwsSecretsManager {
    /// Credentials come from the default AWS provider chain.
    pub async fn new(endpoint: &VaultEndpoint) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(endpoint.region.clone()))
            .endpoint_url(endpoint.endpoint.as_str())
            .load()
            .await;
        Self {
            client: Client::new(&sdk_config),
        }
    }
}

#[async_trait]
impl SecretStore for AwsSecretsManager {
    async fn get_secret_value(&self, secret_id: &str) -> Result<SecretValue, VaultError> {
        debug!(secret_id, "requesting secret value");
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(|e| map_sdk_error(secret_id, e.into_service_error()))?;

        Ok(SecretValue {
            secret_string: output.secret_string().map(str::to_string),
            secret_binary: output.secret_binary().map(|b| b.clone().into_inner()),
        })
    }
}

fn map_sdk_error(secret_id: &str, err: GetSecretValueError) -> VaultError {
    let message = err.message().unwrap_or_default().to_string();
    match err {
        GetSecretValueError::ResourceNotFoundException(_) => {
            VaultError::SecretNotFound(secret_id.to_string())
        }
        GetSecretValueError::InvalidRequestException(_) => VaultError::InvalidRequest(message),
        GetSecretValueError::InvalidParameterException(_) => VaultError::InvalidParameter(message),
        other => VaultError::Service(other.to_string()),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AwsSecretsManagerProvider;

#[async_trait]
impl SecretStoreProvider for AwsSecretsManagerProvider {
    async fn connect(
        &self,
        endpoint: &VaultEndpoint,
    ) -> Result<Box<dyn SecretStore>, VaultError> {
        Ok(Box::new(AwsSecretsManager::new(endpoint).await))
    }
}
