//! Layered configuration access.
//!
//! Properties are addressed by dotted keys (`spring.datasource.url`). Sources,
//! lowest precedence first:
//! - `config.toml` (or the file named by `APP_CONFIG_FILE`)
//! - `APP_`-prefixed environment variables, nested with `__`
//!   (`APP_AWS__SECRET__ENABLED=true` sets `aws.secret.enabled`)

use crate::error::DataSourceError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde_json::Value;
use std::str::FromStr;

pub const CONFIG_FILE_VAR: &str = "APP_CONFIG_FILE";
const DEFAULT_CONFIG_FILE: &str = "config.toml";
const ENV_PREFIX: &str = "APP_";

/// Read-only view over the merged configuration sources.
#[derive(Debug, Clone)]
pub struct Environment {
    figment: Figment,
}

impl Environment {
    /// Merge the config file and the process environment.
    pub fn load() -> Self {
        let path =
            std::env::var(CONFIG_FILE_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let figment = Figment::new().merge(Toml::file(path));
        Self {
            figment: merge_env(figment, ENV_PREFIX),
        }
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    /// Scalar value at `key`, rendered as a string. Tables and arrays are not
    /// properties and read as absent.
    pub fn property(&self, key: &str) -> Option<String> {
        let value = self.figment.find_value(key).ok()?;
        match value.deserialize::<Value>().ok()? {
            Value::String(s) => Some(s),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn required_property(&self, key: &str) -> Result<String, DataSourceError> {
        self.property(key)
            .ok_or_else(|| DataSourceError::missing(key))
    }

    pub fn property_as<T: FromStr>(&self, key: &str) -> Result<Option<T>, DataSourceError> {
        self.property(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|_| DataSourceError::InvalidConfiguration {
                        key: key.to_string(),
                        value: raw.clone(),
                    })
            })
            .transpose()
    }

    pub fn required_property_as<T: FromStr>(&self, key: &str) -> Result<T, DataSourceError> {
        self.property_as(key)?
            .ok_or_else(|| DataSourceError::missing(key))
    }
}

/// Environment values are kept verbatim as strings; `Env` alone would parse
/// `007` into the number 7 and `[abc]` into an array.
fn merge_env(figment: Figment, prefix: &str) -> Figment {
    Env::prefixed(prefix)
        .ignore(&["config_file"])
        .split("__")
        .iter()
        .fold(figment, |figment, (key, value)| {
            figment.merge(Serialized::default(&key.as_str().to_ascii_lowercase(), value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn env(toml: &str) -> Environment {
        Environment::from_figment(Figment::from(Toml::string(toml)))
    }

    #[test]
    fn scalars_render_as_strings() {
        let env = env(r#"
            [spring.datasource]
            url = "jdbc:mysql://localhost:3306/order-service"
            password = 123456

            [aws.secret]
            enabled = true
        "#);

        assert_eq!(
            env.property("spring.datasource.url").as_deref(),
            Some("jdbc:mysql://localhost:3306/order-service")
        );
        assert_eq!(env.property("spring.datasource.password").as_deref(), Some("123456"));
        assert_eq!(env.property_as::<bool>("aws.secret.enabled").unwrap(), Some(true));
    }

    #[test]
    fn tables_are_not_properties() {
        let env = env("[spring.datasource]\nurl = \"x\"");
        assert!(env.property("spring.datasource").is_none());
    }

    #[test]
    fn missing_key_names_the_key() {
        let env = env("");
        match env.required_property("spring.datasource.url") {
            Err(DataSourceError::MissingConfiguration { key }) => {
                assert_eq!(key, "spring.datasource.url")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn unparsable_value_is_invalid() {
        let env = env("[aws.secret]\nenabled = \"sometimes\"");
        assert!(matches!(
            env.required_property_as::<bool>("aws.secret.enabled"),
            Err(DataSourceError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn env_values_are_kept_verbatim() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                "[spring.datasource]\npassword = \"from-file\"\n[aws.secret]\nenabled = true",
            )?;
            jail.set_env("APP_SPRING__DATASOURCE__PASSWORD", "007");
            jail.set_env("APP_SPRING__DATASOURCE__USERNAME", "1.50");
            jail.set_env("APP_SPRING__DATASOURCE__URL", "[abc]");
            jail.set_env("APP_AWS__SECRET__ENABLED", "false");

            let env = Environment::load();
            assert_eq!(env.property("spring.datasource.password").as_deref(), Some("007"));
            assert_eq!(env.property("spring.datasource.username").as_deref(), Some("1.50"));
            assert_eq!(env.property("spring.datasource.url").as_deref(), Some("[abc]"));
            assert!(!env.required_property_as::<bool>("aws.secret.enabled").unwrap());
            Ok(())
        });
    }
}
