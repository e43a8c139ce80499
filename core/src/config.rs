//! Client configuration.

use std::env;
use std::fmt;
use std::path::PathBuf;

use crate::error::{AcsError, Result};

/// Production endpoint of the ACS REST API.
pub const DEFAULT_BASE_URI: &str = "https://api.cloud.appcelerator.com/v1";

pub const ENV_APP_KEY: &str = "ACS_APP_KEY";
pub const ENV_USERNAME: &str = "ACS_USERNAME";
pub const ENV_PASSWORD: &str = "ACS_PASSWORD";
pub const ENV_BASE_URI: &str = "ACS_BASE_URI";
pub const ENV_RETURN_HEADERS: &str = "ACS_RETURN_HEADERS";
pub const ENV_COOKIE_DIR: &str = "ACS_COOKIE_DIR";

/// Credentials and endpoint settings for `AcsClient`.
///
/// `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub app_key: String,
    pub username: String,
    pub password: String,
    pub base_uri: String,
    /// Hand response headers back alongside the body.
    pub return_headers: bool,
    /// Directory in which cookie files are allocated.
    pub cookie_dir: PathBuf,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Fails with `Configuration` if the app key, username or password is
    /// empty. `AcsClient::connect` runs this before anything else.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("app key", &self.app_key),
            ("username", &self.username),
            ("password", &self.password),
        ];
        match fields.iter().find(|(_, value)| value.is_empty()) {
            Some((field, _)) => Err(missing(field)),
            None => Ok(()),
        }
    }

    /// Read the configuration from `ACS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut builder = ClientConfig::builder();
        if let Ok(v) = env::var(ENV_APP_KEY) {
            builder = builder.app_key(v);
        }
        if let Ok(v) = env::var(ENV_USERNAME) {
            builder = builder.username(v);
        }
        if let Ok(v) = env::var(ENV_PASSWORD) {
            builder = builder.password(v);
        }
        if let Ok(v) = env::var(ENV_BASE_URI) {
            builder = builder.base_uri(v);
        }
        if let Ok(v) = env::var(ENV_RETURN_HEADERS) {
            builder = builder.return_headers(parse_flag(&v));
        }
        if let Ok(v) = env::var(ENV_COOKIE_DIR) {
            builder = builder.cookie_dir(v);
        }
        builder.build()
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_key", &self.app_key)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("base_uri", &self.base_uri)
            .field("return_headers", &self.return_headers)
            .field("cookie_dir", &self.cookie_dir)
            .finish()
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

#[derive(Default)]
pub struct ClientConfigBuilder {
    app_key: Option<String>,
    username: Option<String>,
    password: Option<String>,
    base_uri: Option<String>,
    return_headers: bool,
    cookie_dir: Option<PathBuf>,
}

impl ClientConfigBuilder {
    pub fn app_key(mut self, app_key: impl Into<String>) -> Self {
        self.app_key = Some(app_key.into());
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn return_headers(mut self, return_headers: bool) -> Self {
        self.return_headers = return_headers;
        self
    }

    pub fn cookie_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cookie_dir = Some(dir.into());
        self
    }

    /// Fails with `Configuration` if the app key, username or password is
    /// missing or empty.
    pub fn build(self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            app_key: required("app key", self.app_key)?,
            username: required("username", self.username)?,
            password: required("password", self.password)?,
            base_uri: self
                .base_uri
                .map(|uri| uri.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URI.to_string()),
            return_headers: self.return_headers,
            cookie_dir: self.cookie_dir.unwrap_or_else(env::temp_dir),
        })
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(missing(field)),
    }
}

fn missing(field: &str) -> AcsError {
    AcsError::Configuration(format!("ACS app key, username, and password are required ({field} missing)"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ClientConfigBuilder {
        ClientConfig::builder()
            .app_key("key")
            .username("admin")
            .password("secret")
    }

    #[test]
    fn defaults_applied() {
        let config = complete().build().unwrap();
        assert_eq!(config.base_uri, DEFAULT_BASE_URI);
        assert!(!config.return_headers);
        assert_eq!(config.cookie_dir, env::temp_dir());
    }

    #[test]
    fn validate_rejects_empty_literal_fields() {
        let mut config = complete().build().unwrap();
        assert!(config.validate().is_ok());
        config.password.clear();
        assert!(matches!(config.validate(), Err(AcsError::Configuration(msg)) if msg.contains("password")));
    }

    #[test]
    fn each_required_field_is_checked() {
        let missing_key = ClientConfig::builder().username("u").password("p").build();
        let missing_user = ClientConfig::builder().app_key("k").password("p").build();
        let missing_pass = ClientConfig::builder().app_key("k").username("u").build();
        for result in [missing_key, missing_user, missing_pass] {
            assert!(matches!(result, Err(AcsError::Configuration(_))));
        }
    }

    #[test]
    fn empty_values_count_as_missing() {
        let err = complete().password("").build().unwrap_err();
        assert!(err.to_string().contains("password missing"));
    }

    #[test]
    fn base_uri_trailing_slash_is_stripped() {
        let config = complete().base_uri("http://localhost:3000/v1/").build().unwrap();
        assert_eq!(config.base_uri, "http://localhost:3000/v1");
    }

    #[test]
    fn debug_redacts_password() {
        let rendered = format!("{:?}", complete().build().unwrap());
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn flags_parse_loosely() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(!parse_flag("0"));
        assert!(!parse_flag(""));
    }
}
