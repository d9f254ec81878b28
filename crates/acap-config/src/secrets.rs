//! Single source of truth for runtime secret resolution.
//!
//! Config YAML stores only **env var NAMES** (e.g. `"ACAP_DATABASE_URL"`).
//! At startup, callers invoke [`resolve_secrets`] once and pass the result
//! into constructors; never scatter `std::env::var` calls across the
//! codebase. `Debug` impls redact values, and error messages reference the
//! env var NAME, never the value.
//!
//! # Enforcement
//! - The database connection string is always required — there is no mode
//!   in which the scheduler runs without its Store.
//! - A Recorder API key/token is optional: the deterministic mock Recorder
//!   used in tests and local development needs no credentials.

use anyhow::{bail, Result};
use serde_json::Value;

#[derive(Clone)]
pub struct ResolvedSecrets {
    /// Postgres connection string. `None` if the named env var was absent
    /// or empty.
    pub database_url: Option<String>,
    /// Bearer token for a real HTTP Recorder collaborator, if configured.
    pub recorder_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field("database_url", &self.database_url.as_ref().map(|_| "<REDACTED>"))
            .field(
                "recorder_api_key",
                &self.recorder_api_key.as_ref().map(|_| "<REDACTED>"),
            )
            .finish()
    }
}

struct SecretEnvNames {
    database_url_var: String,
    recorder_api_key_var: Option<String>,
}

fn read_str_at(config: &Value, pointer: &str) -> Option<String> {
    let s = config.pointer(pointer)?.as_str()?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn resolve_env(var_name: &str) -> Option<String> {
    match std::env::var(var_name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn parse_env_names(config_json: &Value) -> SecretEnvNames {
    SecretEnvNames {
        database_url_var: read_str_at(config_json, "/secrets/database_url_env")
            .unwrap_or_else(|| "ACAP_DATABASE_URL".to_string()),
        recorder_api_key_var: read_str_at(config_json, "/secrets/recorder_api_key_env"),
    }
}

/// Resolve required and optional secrets from the process environment.
///
/// # Errors
/// Returns `Err` naming the env var NAME (never the value) if the database
/// URL variable is unset or empty.
pub fn resolve_secrets(config_json: &Value) -> Result<ResolvedSecrets> {
    let names = parse_env_names(config_json);

    let database_url = resolve_env(&names.database_url_var);
    if database_url.is_none() {
        bail!(
            "SECRETS_MISSING: required env var '{}' (database connection string) is not set or empty",
            names.database_url_var,
        );
    }

    let recorder_api_key = names.recorder_api_key_var.as_deref().and_then(resolve_env);

    Ok(ResolvedSecrets {
        database_url,
        recorder_api_key,
    })
}
