//! # Engine Configuration
//!
//! Loaded from TOML; every key is optional.
//!
//! ```text
//! [renderer]
//! default_view = "application"
//! view_paths = ["app/views"]
//! escape_html = true
//! empty_on_read_violation = false
//!
//! [policy]
//! invalidate_decisions_between_requests = true
//! globals = { admin_id = 1 }
//!
//! [pusher]
//! channel_prefix = "/data/update/"
//! auto_push = false
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tessera_core::Value;
use tessera_security::{Globals, PolicyConfig};
use tessera_view::RendererConfig;

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Template lookup and output.
    pub renderer: RendererSection,
    /// Policy checking.
    pub policy: PolicySection,
    /// Incremental updates.
    pub pusher: PusherSection,
}

/// `[renderer]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererSection {
    /// View used when none is named.
    pub default_view: String,
    /// Template directories, relative to `root`.
    pub view_paths: Vec<String>,
    /// Application root.
    pub root: String,
    /// Escape leaf output for HTML.
    pub escape_html: bool,
    /// Bypass the content cache.
    pub no_content_cache: bool,
    /// Bypass the file cache.
    pub no_file_cache: bool,
    /// Bypass the template cache.
    pub no_template_cache: bool,
    /// Denied reads render empty instead of failing.
    pub empty_on_read_violation: bool,
}

impl Default for RendererSection {
    fn default() -> Self {
        let base = RendererConfig::default();
        Self {
            default_view: base.default_view,
            view_paths: base.view_paths,
            root: base.root,
            escape_html: base.escape_html,
            no_content_cache: base.no_content_cache,
            no_file_cache: base.no_file_cache,
            no_template_cache: base.no_template_cache,
            empty_on_read_violation: false,
        }
    }
}

impl RendererSection {
    /// Renderer settings of this section.
    #[must_use]
    pub fn to_renderer_config(&self) -> RendererConfig {
        RendererConfig {
            default_view: self.default_view.clone(),
            view_paths: self.view_paths.clone(),
            root: self.root.clone(),
            escape_html: self.escape_html,
            no_content_cache: self.no_content_cache,
            no_file_cache: self.no_file_cache,
            no_template_cache: self.no_template_cache,
        }
    }
}

/// `[policy]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// Clear cached read decisions between requests.
    pub invalidate_decisions_between_requests: bool,
    /// Never cache read decisions.
    pub no_decision_cache: bool,
    /// Values visible to every rule.
    pub globals: toml::Table,
}

impl Default for PolicySection {
    fn default() -> Self {
        let base = PolicyConfig::default();
        Self {
            invalidate_decisions_between_requests: base.invalidate_decisions_between_requests,
            no_decision_cache: base.no_decision_cache,
            globals: toml::Table::new(),
        }
    }
}

impl PolicySection {
    /// Policy settings of this section.
    ///
    /// # Errors
    ///
    /// Fails if a global is a table, which rules cannot see.
    pub fn to_policy_config(&self) -> EngineResult<PolicyConfig> {
        let mut globals = Globals::new();
        for (name, value) in &self.globals {
            globals.insert(name.clone(), to_value(name, value)?);
        }
        Ok(PolicyConfig {
            invalidate_decisions_between_requests: self.invalidate_decisions_between_requests,
            no_decision_cache: self.no_decision_cache,
            globals,
        })
    }
}

/// `[pusher]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PusherSection {
    /// Push channel prefix; the client's auth token follows.
    pub channel_prefix: String,
    /// Push to every affected client right after each notification.
    pub auto_push: bool,
    /// Wrap tracked nodes in delimiter tags.
    pub delimit_nodes: bool,
    /// Capacity of the default outbox; 0 means unbounded.
    pub buffer_capacity_hint: usize,
}

impl Default for PusherSection {
    fn default() -> Self {
        Self {
            channel_prefix: tessera_shared::PUSH_CHANNEL_PREFIX.to_owned(),
            auto_push: false,
            delimit_nodes: true,
            buffer_capacity_hint: 0,
        }
    }
}

impl EngineConfig {
    /// Parses TOML text.
    ///
    /// # Errors
    ///
    /// Syntax errors, type mismatches and unsupported globals.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.policy.to_policy_config()?;
        Ok(config)
    }

    /// Reads and parses a TOML file.
    ///
    /// # Errors
    ///
    /// I/O failures, plus everything [`EngineConfig::from_toml_str`] rejects.
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

fn to_value(name: &str, value: &toml::Value) -> EngineResult<Value> {
    Ok(match value {
        toml::Value::String(s) => Value::Str(s.clone()),
        toml::Value::Integer(i) => Value::Int(*i),
        toml::Value::Float(f) => Value::Float(*f),
        toml::Value::Boolean(b) => Value::Bool(*b),
        toml::Value::Datetime(d) => Value::Str(d.to_string()),
        toml::Value::Array(items) => Value::List(
            items
                .iter()
                .map(|v| to_value(name, v))
                .collect::<EngineResult<_>>()?,
        ),
        toml::Value::Table(_) => {
            return Err(EngineError::InvalidGlobal {
                name: name.to_owned(),
                reason: "tables are not supported",
            })
        }
    })
}
