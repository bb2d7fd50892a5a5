//! File-based transition bindings.
//!
//! Bindings can be declared in TOML instead of code:
//!
//! ```toml
//! [engine]
//! endpoint = "http://localhost:8080/engine-rest"
//! token = "${ENGINE_TOKEN}"
//!
//! [aggregates.Order]
//! mark_paid = "order-paid"
//! mark_in_preparation = "order-prepared"
//! ```
//!
//! Each `[aggregates.<Type>]` table maps method names to transition names for
//! the aggregate whose `AGGREGATE_TYPE` is `<Type>`. Sections are applied per
//! type with [`TransitionRegistryBuilder::apply_bindings`].

use std::collections::BTreeMap;
use std::env;
use std::path::Path;

use serde::Deserialize;

use crate::aggregate::Aggregate;
use crate::error::ProcessError;
use crate::registry::TransitionRegistryBuilder;

/// Parsed bindings file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BindingsConfig {
    /// Connection settings for a remote engine, if any.
    pub engine: Option<EngineConfig>,
    /// Method-to-transition tables keyed by aggregate type tag.
    pub aggregates: BTreeMap<String, BTreeMap<String, String>>,
}

/// `[engine]` section of a bindings file.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the engine's REST API.
    pub endpoint: String,
    /// Bearer token, possibly containing `${VAR}` references.
    #[serde(default)]
    pub token: Option<String>,
}

impl EngineConfig {
    /// The bearer token with `${VAR}` references expanded.
    ///
    /// Returns an empty string when no token is configured.
    pub fn resolved_token(&self) -> String {
        self.token
            .as_deref()
            .map(expand_env_vars)
            .unwrap_or_default()
    }
}

impl BindingsConfig {
    /// Parse a bindings document.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Config`] if `content` is not valid TOML or
    /// does not match the bindings layout.
    pub fn from_toml_str(content: &str) -> Result<Self, ProcessError> {
        toml::from_str(content).map_err(|e| ProcessError::Config(e.to_string()))
    }

    /// Read and parse the bindings file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError::Config`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProcessError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to read bindings file");
            ProcessError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&content).map_err(|e| {
            tracing::warn!(path = %path.display(), error = %e, "failed to parse bindings file");
            e
        })
    }

    /// Bindings declared for the aggregate type tagged `aggregate_type`.
    pub fn bindings_for(&self, aggregate_type: &str) -> Option<&BTreeMap<String, String>> {
        self.aggregates.get(aggregate_type)
    }
}

impl TransitionRegistryBuilder {
    /// Bind every entry of `config`'s `[aggregates.<A::AGGREGATE_TYPE>]`
    /// section.
    ///
    /// A missing section is a no-op and does not create a configuration for
    /// `A`. Entries override earlier code-first bindings of the same method.
    ///
    /// # Returns
    ///
    /// `self` for method chaining.
    pub fn apply_bindings<A: Aggregate>(&mut self, config: &BindingsConfig) -> &mut Self {
        let Some(section) = config.bindings_for(A::AGGREGATE_TYPE) else {
            tracing::debug!(
                aggregate_type = A::AGGREGATE_TYPE,
                "no bindings section in config"
            );
            return self;
        };

        let type_config = self.configuration_for::<A>();
        for (method, transition) in section {
            type_config.bind(method.as_str(), transition.as_str());
        }
        tracing::debug!(
            aggregate_type = A::AGGREGATE_TYPE,
            bindings = section.len(),
            "applied bindings from config"
        );
        self
    }
}

/// Replace `${VAR}` references with the value of the environment variable.
///
/// Unset variables expand to the empty string; an unclosed `${` is kept
/// verbatim.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
