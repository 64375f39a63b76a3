use std::collections::HashMap;
use std::time::Duration;

use crate::client::pagination::DEFAULT_PAGE_SIZE;
use crate::error::{Error, Result};
use crate::url::Endpoints;

pub const DEFAULT_NAMESPACE: &str = "pm/v2";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_IMPORT_DELAY_MS: u64 = 100;

/// Environment variable holding the application password.
pub const APP_PASSWORD_ENV: &str = "WP_APP_PASSWORD";

/// A setting that may be stored with `config set`.
pub struct ConfigKey {
    pub name: &'static str,
    pub env: &'static str,
    pub help: &'static str,
}

pub const KEYS: &[ConfigKey] = &[
    ConfigKey {
        name: "site_url",
        env: "WP_SITE_URL",
        help: "WordPress site root, e.g. https://example.com",
    },
    ConfigKey {
        name: "username",
        env: "WP_USERNAME",
        help: "WordPress user owning the application password",
    },
    ConfigKey {
        name: "api_namespace",
        env: "WPPM_API_NAMESPACE",
        help: "REST namespace of the Project Manager plugin",
    },
    ConfigKey {
        name: "page_size",
        env: "WPPM_PAGE_SIZE",
        help: "Records per page when listing",
    },
    ConfigKey {
        name: "request_timeout_secs",
        env: "WPPM_REQUEST_TIMEOUT_SECS",
        help: "Per-request timeout in seconds",
    },
    ConfigKey {
        name: "import_delay_ms",
        env: "WPPM_IMPORT_DELAY_MS",
        help: "Pause between import calls in milliseconds",
    },
];

pub fn find_key(name: &str) -> Option<&'static ConfigKey> {
    KEYS.iter().find(|k| k.name == name)
}

/// Check a value before it is stored. Returns the value to store.
pub fn validate(key: &str, value: &str) -> Result<String> {
    if find_key(key).is_none() {
        let known: Vec<&str> = KEYS.iter().map(|k| k.name).collect();
        return Err(Error::Config(format!(
            "unknown config key: {key} (known: {})",
            known.join(", ")
        )));
    }
    let value = value.trim();
    match key {
        "site_url" => Ok(Endpoints::new(value, DEFAULT_NAMESPACE)?.site().to_string()),
        "api_namespace" => {
            let ns = value.trim_matches('/');
            if ns.is_empty() {
                return Err(Error::Config("api_namespace cannot be empty".into()));
            }
            Ok(ns.to_string())
        }
        "page_size" => parse_positive(key, value).map(|n| n.to_string()),
        "request_timeout_secs" => parse_positive(key, value).map(|n| n.to_string()),
        "import_delay_ms" => value
            .parse::<u64>()
            .map(|n| n.to_string())
            .map_err(|_| Error::Config(format!("{key} must be a whole number, got '{value}'"))),
        _ => Ok(value.to_string()),
    }
}

fn parse_positive(key: &str, value: &str) -> Result<u64> {
    match value.parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(Error::Config(format!(
            "{key} must be a positive whole number, got '{value}'"
        ))),
    }
}

/// Values given on the command line. Each one beats the environment and
/// the store.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub site_url: Option<String>,
    pub username: Option<String>,
    pub api_namespace: Option<String>,
    pub page_size: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub import_delay_ms: Option<u64>,
}

/// Fully resolved connection settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub site_url: Option<String>,
    pub username: Option<String>,
    pub api_namespace: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub import_delay: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            site_url: None,
            username: None,
            api_namespace: DEFAULT_NAMESPACE.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            import_delay: Duration::from_millis(DEFAULT_IMPORT_DELAY_MS),
        }
    }
}

impl Settings {
    /// Resolve every key as flag > environment > stored value > default.
    pub fn resolve(
        overrides: &Overrides,
        stored: &HashMap<String, String>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let lookup = |name: &str| -> Option<String> {
            let key = find_key(name)?;
            env(key.env)
                .filter(|v| !v.trim().is_empty())
                .or_else(|| stored.get(name).cloned())
                .map(|v| v.trim().to_string())
        };
        let number = |name: &str| -> Result<Option<u64>> {
            lookup(name)
                .map(|v| {
                    v.parse::<u64>().map_err(|_| {
                        Error::Config(format!("{name} must be a whole number, got '{v}'"))
                    })
                })
                .transpose()
        };

        let defaults = Settings::default();
        let page_size = match overrides.page_size {
            Some(n) => n,
            None => number("page_size")?
                .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                .unwrap_or(defaults.page_size),
        };
        let timeout_secs = match overrides.request_timeout_secs {
            Some(n) => n,
            None => number("request_timeout_secs")?.unwrap_or(DEFAULT_TIMEOUT_SECS),
        };
        let delay_ms = match overrides.import_delay_ms {
            Some(n) => n,
            None => number("import_delay_ms")?.unwrap_or(DEFAULT_IMPORT_DELAY_MS),
        };

        Ok(Self {
            site_url: overrides.site_url.clone().or_else(|| lookup("site_url")),
            username: overrides.username.clone().or_else(|| lookup("username")),
            api_namespace: overrides
                .api_namespace
                .clone()
                .or_else(|| lookup("api_namespace"))
                .unwrap_or(defaults.api_namespace),
            page_size: page_size.max(1),
            request_timeout: Duration::from_secs(timeout_secs.max(1)),
            import_delay: Duration::from_millis(delay_ms),
        })
    }

    /// Resolve against the process environment.
    pub fn from_env(overrides: &Overrides, stored: &HashMap<String, String>) -> Result<Self> {
        Self::resolve(overrides, stored, |name| std::env::var(name).ok())
    }

    pub fn endpoints(&self) -> Result<Endpoints> {
        let site = self.site_url.as_deref().ok_or_else(|| {
            Error::Config(
                "site_url is not set. Run: wppm config set site_url https://your-site.example".into(),
            )
        })?;
        Endpoints::new(site, &self.api_namespace)
    }
}
