//! Runtime configuration
//!
//! Resolution order: a configuration installed with [`set_config`], then the
//! `IRBIND_*` environment variables, then defaults.

use serde::{Deserialize, Serialize};
use std::env;
use std::sync::{PoisonError, RwLock};

pub const ENV_GLOBAL_DISPOSE: &str = "IRBIND_GLOBAL_DISPOSE";
pub const ENV_WARN_ON_ORPHAN: &str = "IRBIND_WARN_ON_ORPHAN";

/// What disposing the process-wide context does
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum GlobalDisposePolicy {
    /// Fail with `ScopeError::GlobalContext`
    #[default]
    Reject,
    /// Log and do nothing
    Ignore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub global_dispose: GlobalDisposePolicy,
    /// Warn when an owned handle is disposed after its ancestor already
    /// freed the native object.
    pub warn_on_orphan: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            global_dispose: GlobalDisposePolicy::Reject,
            warn_on_orphan: true,
        }
    }
}

impl Config {
    /// Parse a JSON document. Missing fields take their defaults.
    ///
    /// # Example
    /// ```
    /// use irbind::config::{Config, GlobalDisposePolicy};
    ///
    /// let cfg = Config::from_json(r#"{ "global_dispose": "ignore" }"#).unwrap();
    /// assert_eq!(cfg.global_dispose, GlobalDisposePolicy::Ignore);
    /// assert!(cfg.warn_on_orphan);
    /// ```
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Defaults overridden by the `IRBIND_*` environment variables.
    pub fn detect() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Config::default();
        if let Some(value) = lookup(ENV_GLOBAL_DISPOSE) {
            let parsed: Result<GlobalDisposePolicy, strum::ParseError> = value.trim().parse();
            match parsed {
                Ok(policy) => cfg.global_dispose = policy,
                Err(err) => log::warn!(
                    "invalid {} value '{}' ({}), expected 'reject' or 'ignore'; using {}",
                    ENV_GLOBAL_DISPOSE,
                    value,
                    err,
                    cfg.global_dispose
                ),
            }
        }
        if let Some(value) = lookup(ENV_WARN_ON_ORPHAN) {
            match value.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => cfg.warn_on_orphan = true,
                "0" | "false" | "no" | "off" => cfg.warn_on_orphan = false,
                _ => log::warn!(
                    "invalid {} value '{}', expected 0 or 1",
                    ENV_WARN_ON_ORPHAN,
                    value
                ),
            }
        }
        cfg
    }
}

lazy_static::lazy_static! {
    static ref ACTIVE: RwLock<Option<Config>> = RwLock::new(None);
}

/// Install `cfg`, taking precedence over the environment.
pub fn set_config(cfg: Config) {
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(cfg);
}

/// Drop any installed configuration and go back to environment/defaults.
pub fn reset_config() {
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// The configuration currently in effect.
pub fn config() -> Config {
    let active = ACTIVE.read().unwrap_or_else(PoisonError::into_inner);
    match active.as_ref() {
        Some(cfg) => cfg.clone(),
        None => Config::detect(),
    }
}
