//! Field policy configuration.
//!
//! A [`FieldPolicy`] is registered once per model and never changes
//! afterwards. It is produced from a [`PolicyConfig`], either built in code or
//! deserialised from JSON, and validated eagerly so that a bad registration
//! fails before any query can run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::path::{is_same_or_nested, is_valid_path};
use crate::VERSION_KEY;

/// Default and maximum page size for `list`.
pub const DEFAULT_LIMIT: u32 = 100;

/// Characters reserved by the cache key format.
const RESERVED_NAME_CHARS: [char; 3] = [':', '#', '*'];

/// Raw policy options as supplied at registration time.
///
/// Every field is optional here so that missing values can be reported as
/// configuration errors rather than deserialisation failures.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub model_name: Option<String>,
    pub common_fields: Option<Vec<String>>,
    pub secret_fields: Option<Vec<String>>,
    pub read_only_fields: Option<Vec<String>>,
    pub limit: Option<u32>,
    /// Default cache TTL in seconds. Zero disables caching.
    pub cache: Option<u64>,
    pub lean: Option<bool>,
}

impl PolicyConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: Some(model_name.into()),
            ..Default::default()
        }
    }

    /// Fields included in every read.
    pub fn with_common_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.common_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Fields excluded from every read. Replaces the default `["__v"]`.
    pub fn with_secret_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secret_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Fields `patch` never writes.
    pub fn with_read_only_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.read_only_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Default cache TTL. Stored in whole seconds; a sub-second remainder
    /// rounds up so a non-zero TTL never disables caching.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        self.cache = Some(secs);
        self
    }

    pub fn with_lean(mut self, lean: bool) -> Self {
        self.lean = Some(lean);
        self
    }

    /// Validate and freeze into a [`FieldPolicy`].
    pub fn build(self) -> Result<FieldPolicy, ConfigError> {
        let model_name = self.model_name.ok_or_else(|| ConfigError::MissingRequired {
            field: "model_name".to_string(),
        })?;
        validate_model_name(&model_name)?;

        let common_fields =
            validate_fields("common_fields", self.common_fields.unwrap_or_default())?;
        let secret_fields = validate_fields(
            "secret_fields",
            self.secret_fields
                .unwrap_or_else(|| vec![VERSION_KEY.to_string()]),
        )?;
        let read_only_fields =
            validate_fields("read_only_fields", self.read_only_fields.unwrap_or_default())?;

        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limit".to_string(),
                value: limit.to_string(),
                reason: "limit must be greater than 0".to_string(),
            });
        }

        Ok(FieldPolicy {
            model_name,
            common_fields,
            secret_fields,
            read_only_fields,
            limit,
            cache: self
                .cache
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            lean: self.lean.unwrap_or(true),
        })
    }
}

fn validate_model_name(name: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "model_name".to_string(),
            value: name.to_string(),
            reason: "model_name must not be empty".to_string(),
        });
    }
    if name.contains(RESERVED_NAME_CHARS) {
        return Err(ConfigError::InvalidValue {
            field: "model_name".to_string(),
            value: name.to_string(),
            reason: "model_name must not contain ':', '#' or '*'".to_string(),
        });
    }
    Ok(())
}

fn validate_fields(field: &str, values: Vec<String>) -> Result<Vec<String>, ConfigError> {
    let mut unique: Vec<String> = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        if !is_valid_path(&value) {
            return Err(ConfigError::InvalidValue {
                field: format!("{field}[{index}]"),
                value,
                reason: "field names must be non-empty dotted paths".to_string(),
            });
        }
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    Ok(unique)
}

/// Immutable per-model field policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    model_name: String,
    common_fields: Vec<String>,
    secret_fields: Vec<String>,
    read_only_fields: Vec<String>,
    limit: u32,
    cache: Option<Duration>,
    lean: bool,
}

impl FieldPolicy {
    /// Start a code-based registration for `model_name`.
    pub fn builder(model_name: impl Into<String>) -> PolicyConfig {
        PolicyConfig::new(model_name)
    }

    /// Parse and validate a JSON policy document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PolicyConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed {
                reason: e.to_string(),
            })?;
        config.build()
    }

    /// Validate a JSON value already parsed by the host.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: PolicyConfig =
            serde_json::from_value(value).map_err(|e| ConfigError::Malformed {
                reason: e.to_string(),
            })?;
        config.build()
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn common_fields(&self) -> &[String] {
        &self.common_fields
    }

    pub fn secret_fields(&self) -> &[String] {
        &self.secret_fields
    }

    pub fn read_only_fields(&self) -> &[String] {
        &self.read_only_fields
    }

    /// Maximum and default page size.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Default cache TTL, `None` when caching is off by default.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache
    }

    /// Whether reads return detached plain snapshots by default.
    pub fn lean(&self) -> bool {
        self.lean
    }

    /// Whether `field` (or a field it is nested under) is read-only.
    pub fn is_read_only(&self, field: &str) -> bool {
        self.read_only_fields
            .iter()
            .any(|read_only| is_same_or_nested(field, read_only))
    }

    /// Whether `field` (or a field it is nested under) is secret.
    pub fn is_secret(&self, field: &str) -> bool {
        self.secret_fields
            .iter()
            .any(|secret| is_same_or_nested(field, secret))
    }
}

// =============================================================================
// TESTS
// =============================================================================
