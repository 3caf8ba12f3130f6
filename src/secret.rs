use secrecy::SecretString;
use serde::Deserialize;

/// Database credentials carried by a vault secret.
///
/// The payload is a JSON object with string fields `host`, `username` and
/// `password`; any other fields in it are ignored.
#[derive(Debug, Deserialize)]
pub struct DbParameter {
    host: String,
    username: String,
    password: SecretString,
}

impl DbParameter {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    pub fn from_secret_string(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub fn into_parts(self) -> (String, String, SecretString) {
        (self.host, self.username, self.password)
    }
}
