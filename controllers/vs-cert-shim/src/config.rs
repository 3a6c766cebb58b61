//! Controller configuration.
//!
//! Read once at startup from environment variables:
//!
//! | Variable | Default |
//! |---|---|
//! | `DEFAULT_ISSUER_NAME` | empty (every VirtualServer must name an issuer) |
//! | `DEFAULT_ISSUER_KIND` | `Issuer` |
//! | `DEFAULT_ISSUER_GROUP` | `cert-manager.io` |
//! | `WATCH_NAMESPACE` | all namespaces |
//! | `WORKERS` | `2` |
//! | `BACKOFF_BASE_SECONDS` | `5` |
//! | `BACKOFF_MAX_SECONDS` | `300` |
//! | `ENFORCE_OWNERSHIP` | `false` |
//! | `METRICS_PORT` | `5000` |

use crate::backoff::{DEFAULT_BASE, DEFAULT_MAX, ExponentialBackoff};
use crate::error::ControllerError;
use crate::reconciler::{IssuerDefaults, OwnershipPolicy};
use std::str::FromStr;
use std::time::Duration;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Issuer used when a VirtualServer does not name one
    pub issuer_defaults: IssuerDefaults,
    /// `None` watches every namespace
    pub namespace: Option<String>,
    /// Number of reconcile workers
    pub workers: usize,
    /// Requeue delays for failed keys
    pub backoff: ExponentialBackoff,
    /// Whether Certificates controlled by something else are left alone
    pub ownership_policy: OwnershipPolicy,
    /// Port of the metrics and health server
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            issuer_defaults: IssuerDefaults::default(),
            namespace: None,
            workers: 2,
            backoff: ExponentialBackoff::default(),
            ownership_policy: OwnershipPolicy::Advisory,
            metrics_port: 5000,
        }
    }
}

fn parse<T: FromStr>(name: &str, value: &str) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ControllerError::InvalidConfig(format!("{name}={value:?}: {e}")))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`; unset and empty variables take defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let mut issuer_defaults = defaults.issuer_defaults;
        if let Some(name) = get("DEFAULT_ISSUER_NAME") {
            issuer_defaults.name = name;
        }
        if let Some(kind) = get("DEFAULT_ISSUER_KIND") {
            issuer_defaults.kind = kind;
        }
        if let Some(group) = get("DEFAULT_ISSUER_GROUP") {
            issuer_defaults.group = group;
        }

        let workers = match get("WORKERS") {
            Some(value) => parse::<usize>("WORKERS", &value)?,
            None => defaults.workers,
        };
        if workers == 0 {
            return Err(ControllerError::InvalidConfig("WORKERS must be at least 1".to_string()));
        }

        let base = match get("BACKOFF_BASE_SECONDS") {
            Some(value) => Duration::from_secs(parse("BACKOFF_BASE_SECONDS", &value)?),
            None => DEFAULT_BASE,
        };
        let max = match get("BACKOFF_MAX_SECONDS") {
            Some(value) => Duration::from_secs(parse("BACKOFF_MAX_SECONDS", &value)?),
            None => DEFAULT_MAX,
        };
        if base.is_zero() || base > max {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff base ({}s) must be positive and not exceed max ({}s)",
                base.as_secs(),
                max.as_secs()
            )));
        }

        let ownership_policy = match get("ENFORCE_OWNERSHIP") {
            Some(value) if parse::<bool>("ENFORCE_OWNERSHIP", &value)? => OwnershipPolicy::Enforce,
            _ => OwnershipPolicy::Advisory,
        };

        let metrics_port = match get("METRICS_PORT") {
            Some(value) => parse("METRICS_PORT", &value)?,
            None => defaults.metrics_port,
        };

        Ok(Self {
            issuer_defaults,
            namespace: get("WATCH_NAMESPACE"),
            workers,
            backoff: ExponentialBackoff::new(base, max),
            ownership_policy,
            metrics_port,
        })
    }
}
