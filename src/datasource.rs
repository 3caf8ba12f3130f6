//! Datasource resolution.
//!
//! Credentials come either from a vault secret (`aws.secret.enabled = true`)
//! or straight from `spring.datasource.*`. Either way exactly one pool is
//! built and probed with a single connection before it is handed out.

use crate::config::Environment;
use crate::error::DataSourceError;
use crate::secret::DbParameter;
use crate::vault::{AwsSecretsManagerProvider, SecretStoreProvider, VaultEndpoint};
use secrecy::{ExposeSecret, SecretString};
use sqlx::MySqlPool;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use std::time::Duration;
use tracing::{error, info};

pub const SECRET_ENABLED_KEY: &str = "aws.secret.enabled";
pub const SECRET_NAME_KEY: &str = "aws.secret.name";
pub const SECRET_ENDPOINTS_KEY: &str = "aws.secret.endpoints";
pub const SECRET_REGION_KEY: &str = "aws.secret.region";
pub const DATASOURCE_URL_KEY: &str = "spring.datasource.url";
pub const DATASOURCE_USERNAME_KEY: &str = "spring.datasource.username";
pub const DATASOURCE_PASSWORD_KEY: &str = "spring.datasource.password";
pub const MAX_CONNECTIONS_KEY: &str = "spring.datasource.pool.max_connections";
pub const CONNECTION_TIMEOUT_KEY: &str = "spring.datasource.pool.connection_timeout_ms";
pub const FAIL_FAST_KEY: &str = "spring.datasource.pool.fail_fast_on_verify";

const MYSQL_PORT: u16 = 3306;
const DATABASE_NAME: &str = "order-service";

/// Connection URL for a vault-provided host. Port and database are fixed.
pub fn jdbc_url(host: &str) -> String {
    format!("jdbc:mysql://{host}:{MYSQL_PORT}/{DATABASE_NAME}")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_connections: u32,
    pub connection_timeout: Duration,
    /// Return an error instead of the pool when the probe connection fails.
    pub fail_fast_on_verify: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            connection_timeout: Duration::from_secs(30),
            fail_fast_on_verify: false,
        }
    }
}

impl PoolOptions {
    pub fn from_environment(env: &Environment) -> Result<Self, DataSourceError> {
        let defaults = Self::default();
        let max_connections = env
            .property_as::<u32>(MAX_CONNECTIONS_KEY)?
            .unwrap_or(defaults.max_connections);
        let connection_timeout = env
            .property_as::<u64>(CONNECTION_TIMEOUT_KEY)?
            .map(Duration::from_millis)
            .unwrap_or(defaults.connection_timeout);
        let fail_fast_on_verify = env
            .property_as::<bool>(FAIL_FAST_KEY)?
            .unwrap_or(defaults.fail_fast_on_verify);
        Ok(Self {
            max_connections,
            connection_timeout,
            fail_fast_on_verify,
        })
    }
}

struct ConnectionSettings {
    url: String,
    username: String,
    password: SecretString,
}

impl ConnectionSettings {
    fn from_secret(secret: DbParameter) -> Self {
        let (host, username, password) = secret.into_parts();
        Self {
            url: jdbc_url(&host),
            username,
            password,
        }
    }

    fn from_environment(env: &Environment) -> Result<Self, DataSourceError> {
        let username = env.required_property(DATASOURCE_USERNAME_KEY)?;
        let password = env.required_property(DATASOURCE_PASSWORD_KEY)?;
        let url = env.required_property(DATASOURCE_URL_KEY)?;
        Ok(Self {
            url,
            username,
            password: SecretString::from(password),
        })
    }

    fn connect_options(&self) -> Result<MySqlConnectOptions, DataSourceError> {
        let url = self.url.strip_prefix("jdbc:").unwrap_or(&self.url);
        let options = url
            .parse::<MySqlConnectOptions>()
            .map_err(|source| DataSourceError::InvalidUrl {
                url: self.url.clone(),
                source,
            })?;
        Ok(options
            .username(&self.username)
            .password(self.password.expose_secret()))
    }
}

/// A built pool together with what it was built from.
#[derive(Debug, Clone)]
pub struct DataSource {
    pool: MySqlPool,
    url: String,
    username: String,
}

impl DataSource {
    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!(url = %self.url, "datasource closed");
    }
}

pub struct DataSourceConfiguration<P = AwsSecretsManagerProvider> {
    provider: P,
    options: PoolOptions,
}

impl<P: SecretStoreProvider> DataSourceConfiguration<P> {
    pub fn new(provider: P, options: PoolOptions) -> Self {
        Self { provider, options }
    }

    pub fn from_environment(provider: P, env: &Environment) -> Result<Self, DataSourceError> {
        Ok(Self::new(provider, PoolOptions::from_environment(env)?))
    }

    /// Build the pool, sourcing credentials from the vault when
    /// `secret_enabled` is set and from `spring.datasource.*` otherwise.
    pub async fn data_source(
        &self,
        secret_enabled: bool,
        env: &Environment,
    ) -> Result<DataSource, DataSourceError> {
        info!(secret_enabled, "initializing datasource");

        let settings = if secret_enabled {
            ConnectionSettings::from_secret(self.get_secret(env).await?)
        } else {
            ConnectionSettings::from_environment(env)?
        };

        let pool = MySqlPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(self.options.connection_timeout)
            .connect_lazy_with(settings.connect_options()?);

        self.verify(&pool, &settings.url).await?;

        Ok(DataSource {
            pool,
            url: settings.url,
            username: settings.username,
        })
    }

    /// Fetch and decode the datasource secret named by `aws.secret.name`.
    pub async fn get_secret(&self, env: &Environment) -> Result<DbParameter, DataSourceError> {
        let secret_name = env.required_property(SECRET_NAME_KEY)?;
        let endpoint = VaultEndpoint {
            endpoint: env.required_property(SECRET_ENDPOINTS_KEY)?,
            region: env.required_property(SECRET_REGION_KEY)?,
        };

        let store = match self.provider.connect(&endpoint).await {
            Ok(store) => store,
            Err(e) => {
                error!(
                    endpoint = %endpoint.endpoint,
                    region = %endpoint.region,
                    error = %e,
                    "failed to build secret store client"
                );
                return Err(DataSourceError::retrieval(secret_name, Some(e)));
            }
        };

        let value = match store.get_secret_value(&secret_name).await {
            Ok(value) => value,
            Err(e) => {
                error!(secret_name = %secret_name, error = %e, "secret lookup failed");
                return Err(DataSourceError::retrieval(secret_name, Some(e)));
            }
        };

        let Some(payload) = value.secret_string else {
            error!(secret_name = %secret_name, "secret has no string payload");
            return Err(DataSourceError::retrieval(secret_name, None));
        };

        let secret = DbParameter::from_secret_string(&payload).inspect_err(|e| {
            error!(secret_name = %secret_name, error = %e, "failed to parse secret payload");
        })?;

        info!(host = %secret.host(), username = %secret.username(), "resolved datasource secret");
        Ok(secret)
    }

    async fn verify(&self, pool: &MySqlPool, url: &str) -> Result<(), DataSourceError> {
        match pool.acquire().await {
            Ok(conn) => {
                info!(url, "datasource verified");
                drop(conn);
                Ok(())
            }
            Err(e) if self.options.fail_fast_on_verify => {
                error!(url, error = %e, "datasource verification failed");
                Err(DataSourceError::Verification(e))
            }
            Err(e) => {
                error!(
                    url,
                    error = %e,
                    "datasource verification failed; continuing with unverified pool"
                );
                Ok(())
            }
        }
    }
}

/// Read `aws.secret.enabled`.
pub fn secret_enabled(env: &Environment) -> Result<bool, DataSourceError> {
    env.required_property_as::<bool>(SECRET_ENABLED_KEY)
}

/// Resolve the process datasource with the AWS Secrets Manager client.
pub async fn init_data_source(env: &Environment) -> Result<DataSource, DataSourceError> {
    let enabled = secret_enabled(env)?;
    DataSourceConfiguration::from_environment(AwsSecretsManagerProvider, env)?
        .data_source(enabled, env)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::{
        Figment,
        providers::{Format, Toml},
    };

    #[test]
    fn url_template_is_fixed() {
        assert_eq!(
            jdbc_url("db.example.com"),
            "jdbc:mysql://db.example.com:3306/order-service"
        );
    }

    #[test]
    fn jdbc_and_plain_urls_parse() {
        for url in [
            "jdbc:mysql://localhost:3306/order-service?useSSL=false",
            "mysql://localhost:3306/order-service",
        ] {
            let settings = ConnectionSettings {
                url: url.to_string(),
                username: "root".to_string(),
                password: SecretString::from("pw".to_string()),
            };
            assert!(settings.connect_options().is_ok(), "{url}");
        }
    }

    #[test]
    fn garbage_url_is_rejected() {
        let settings = ConnectionSettings {
            url: "not a url".to_string(),
            username: "root".to_string(),
            password: SecretString::from("pw".to_string()),
        };
        assert!(matches!(
            settings.connect_options(),
            Err(DataSourceError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn pool_options_read_overrides() {
        let env = Environment::from_figment(Figment::from(Toml::string(
            r#"
            [spring.datasource.pool]
            max_connections = 4
            connection_timeout_ms = 250
            fail_fast_on_verify = true
            "#,
        )));
        let options = PoolOptions::from_environment(&env).unwrap();
        assert_eq!(
            options,
            PoolOptions {
                max_connections: 4,
                connection_timeout: Duration::from_millis(250),
                fail_fast_on_verify: true,
            }
        );
    }

    #[test]
    fn pool_options_default_when_absent() {
        let env = Environment::from_figment(Figment::new());
        assert_eq!(PoolOptions::from_environment(&env).unwrap(), PoolOptions::default());
    }
}
