use crate::extract::ExtractionProfile;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const ENV_CONTROL_URL: &str = "CONTROL_URL";
pub const ENV_TIMEOUT_MS: &str = "TIMEOUT_MS";
pub const ENV_PORT: &str = "PORT";
pub const ENV_CONTROL_AUTH_TOKEN: &str = "CONTROL_AUTH_TOKEN";
pub const ENV_EXTRACTION_VARIANT: &str = "EXTRACTION_VARIANT";

const DEFAULT_TIMEOUT_MS: u64 = 5000;
const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Control URL is not configured (set control.url or CONTROL_URL)")]
    MissingControlUrl,

    #[error("Control URL must use http or https, got {0}")]
    UnsupportedControlScheme(String),

    #[error("Timeout must be greater than 0")]
    InvalidTimeout,

    #[error("Body limit must be greater than 0")]
    InvalidBodyLimit,

    #[error("Extraction profile has no {0} candidates")]
    EmptyCandidates(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// Relay configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for notifications and health checks
    #[serde(default)]
    pub listener: Listener,
    /// Decision service settings
    #[serde(default)]
    pub control: ControlConfig,
    /// Maximum accepted size of a notification body
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
    /// Where to find the extracted fields in a notification
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            control: ControlConfig::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            extraction: ExtractionConfig::default(),
        }
    }
}

fn default_body_limit() -> usize {
    DEFAULT_BODY_LIMIT_BYTES
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.control.validate()?;

        if self.body_limit_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        let profile = self.extraction.profile();
        if profile.order_id.is_empty() {
            return Err(ValidationError::EmptyCandidates("order_id"));
        }
        if profile.tracking_token.is_empty() {
            return Err(ValidationError::EmptyCandidates("tracking_token"));
        }

        Ok(())
    }

    /// Overrides file settings with deployment environment variables.
    ///
    /// `lookup` resolves a variable name to its value, typically `std::env::var`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_CONTROL_URL) {
            let url = Url::parse(&raw).map_err(|e| ValidationError::InvalidEnv {
                name: ENV_CONTROL_URL,
                reason: e.to_string(),
            })?;
            self.control.url = Some(url);
        }

        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.control.timeout_ms =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ValidationError::InvalidEnv {
                        name: ENV_TIMEOUT_MS,
                        reason: e.to_string(),
                    })?;
        }

        if let Some(raw) = lookup(ENV_PORT) {
            self.listener.port =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ValidationError::InvalidEnv {
                        name: ENV_PORT,
                        reason: e.to_string(),
                    })?;
        }

        if let Some(token) = lookup(ENV_CONTROL_AUTH_TOKEN).filter(|t| !t.is_empty()) {
            self.control.auth_token = Some(token);
        }

        if let Some(raw) = lookup(ENV_EXTRACTION_VARIANT) {
            self.extraction = match raw.trim() {
                "cid" => ExtractionConfig::Cid,
                "ref_token" => ExtractionConfig::RefToken,
                other => {
                    return Err(ValidationError::InvalidEnv {
                        name: ENV_EXTRACTION_VARIANT,
                        reason: format!("unknown variant {other:?}, expected cid or ref_token"),
                    });
                }
            };
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8080,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, PartialEq)]
pub struct ControlConfig {
    pub url: Option<Url>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Sent as a bearer token on every decision request
    pub auth_token: Option<String>,
}

impl Default for ControlConfig {
    fn default() -> Self {
        ControlConfig {
            url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth_token: None,
        }
    }
}

// Keeps the token out of logs and `check-config` output.
impl std::fmt::Debug for ControlConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlConfig")
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("timeout_ms", &self.timeout_ms)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ControlConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let url = self.url.as_ref().ok_or(ValidationError::MissingControlUrl)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::UnsupportedControlScheme(
                url.scheme().to_string(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Field extraction variant used by a deployment
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum ExtractionConfig {
    #[default]
    Cid,
    RefToken,
    Custom(ExtractionProfile),
}

impl ExtractionConfig {
    pub fn profile(&self) -> ExtractionProfile {
        match self {
            ExtractionConfig::Cid => ExtractionProfile::cid(),
            ExtractionConfig::RefToken => ExtractionProfile::ref_token(),
            ExtractionConfig::Custom(profile) => profile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::FieldPath;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    fn valid_config() -> Config {
        Config {
            control: ControlConfig {
                url: Some(Url::parse("https://decisions.internal/verdict").unwrap()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "127.0.0.1"
    port: 3000
control:
    url: "https://decisions.internal/verdict"
    timeout_ms: 2500
    auth_token: "anon-key"
body_limit_bytes: 2048
extraction:
    variant: ref_token
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.control.timeout(), Duration::from_millis(2500));
        assert_eq!(config.control.auth_token.as_deref(), Some("anon-key"));
        assert_eq!(config.body_limit_bytes, 2048);
        assert_eq!(config.extraction, ExtractionConfig::RefToken);
    }

    #[test]
    fn test_defaults() {
        let config: Config =
            serde_yaml::from_str("control: {url: 'http://decider:9000/'}").unwrap();
        assert!(config.validate().is_ok());

        assert_eq!(config.listener, Listener::default());
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.control.timeout_ms, 5000);
        assert_eq!(config.control.auth_token, None);
        assert_eq!(config.body_limit_bytes, 1024 * 1024);
        assert_eq!(config.extraction, ExtractionConfig::Cid);
    }

    #[test]
    fn test_custom_extraction() {
        let yaml = r#"
control: {url: "https://decisions.internal/"}
extraction:
    variant: custom
    order_id: [payload.id]
    tracking_token: [payload.click_id]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let profile = config.extraction.profile();
        assert_eq!(profile.order_id, vec![FieldPath::parse("payload.id").unwrap()]);
        assert_eq!(
            profile.tracking_token,
            vec![FieldPath::parse("payload.click_id").unwrap()]
        );
    }

    #[test]
    fn test_validation_errors() {
        let mut config = valid_config();
        config.listener.port = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidPort
        ));

        let mut config = valid_config();
        config.control.url = None;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::MissingControlUrl
        ));

        let mut config = valid_config();
        config.control.url = Some(Url::parse("ftp://decisions.internal/").unwrap());
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::UnsupportedControlScheme(_)
        ));

        let mut config = valid_config();
        config.control.timeout_ms = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidTimeout
        ));

        let mut config = valid_config();
        config.body_limit_bytes = 0;
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::InvalidBodyLimit
        ));

        let mut config = valid_config();
        let mut profile = ExtractionProfile::cid();
        profile.tracking_token.clear();
        config.extraction = ExtractionConfig::Custom(profile);
        assert!(matches!(
            config.validate().unwrap_err(),
            ValidationError::EmptyCandidates("tracking_token")
        ));
    }

    #[test]
    fn test_deserialization_errors() {
        // Invalid URL
        assert!(serde_yaml::from_str::<Config>("control: {url: 'not-a-url'}").is_err());

        // Unknown extraction variant
        assert!(serde_yaml::from_str::<Config>("extraction: {variant: magic}").is_err());

        // Invalid port type
        assert!(
            serde_yaml::from_str::<Config>("listener: {host: '0.0.0.0', port: 'eighty'}").is_err()
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = valid_config();
        config
            .apply_env(env(&[
                ("CONTROL_URL", "http://control.local:7000/decide"),
                ("TIMEOUT_MS", "750"),
                ("PORT", "9090"),
                ("CONTROL_AUTH_TOKEN", "token-1"),
                ("EXTRACTION_VARIANT", "ref_token"),
            ]))
            .unwrap();

        assert_eq!(
            config.control.url.as_ref().map(Url::as_str),
            Some("http://control.local:7000/decide")
        );
        assert_eq!(config.control.timeout_ms, 750);
        assert_eq!(config.listener.port, 9090);
        assert_eq!(config.control.auth_token.as_deref(), Some("token-1"));
        assert_eq!(config.extraction, ExtractionConfig::RefToken);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_absent_keeps_file_values() {
        let mut config = valid_config();
        config.control.auth_token = Some("from-file".into());
        config.apply_env(env(&[("CONTROL_AUTH_TOKEN", "")])).unwrap();

        assert_eq!(config, {
            let mut expected = valid_config();
            expected.control.auth_token = Some("from-file".into());
            expected
        });
    }

    #[test]
    fn test_env_invalid_values() {
        for (name, value) in [
            ("CONTROL_URL", "::not a url"),
            ("TIMEOUT_MS", "soon"),
            ("PORT", "70000"),
            ("EXTRACTION_VARIANT", "sub1"),
        ] {
            let mut config = valid_config();
            let err = config.apply_env(env(&[(name, value)])).unwrap_err();
            assert!(
                matches!(err, ValidationError::InvalidEnv { name: n, .. } if n == name),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn test_debug_redacts_token() {
        let mut config = valid_config();
        config.control.auth_token = Some("super-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
