//! Typed configuration for the prefix-driven render plugins.
//!
//! Plugin options are stored as a flat string map. Each plugin gets a parser
//! here that applies its defaults, validates every option, and produces a
//! typed config. A config that fails to parse means the plugin is not
//! configured and should do nothing.

pub mod filter_graph;
pub mod header;
pub mod merger;
pub mod renamer;

use odr_prefix_core::{CoreError, PrefixPath};
use std::collections::BTreeMap;
use thiserror::Error;

pub use filter_graph::FilterGraphConfig;
pub use header::{HeaderConfig, NewlineStyle};
pub use merger::{MergeGroup, MergerConfig};
pub use renamer::{FieldDirectory, FilenamePart, RenamerConfig, TargetExtension};

/// Option name → stored value.
pub type PluginOptions = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("option `{option}` is missing or empty")]
    Missing { option: &'static str },

    #[error("option `{option}`: {message}")]
    Invalid {
        option: &'static str,
        message: String,
    },

    #[error("option `{option}` has a bad prefix: {source}")]
    Prefix {
        option: &'static str,
        #[source]
        source: CoreError,
    },
}

impl ConfigError {
    fn invalid(option: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            option,
            message: message.into(),
        }
    }
}

/// Trimmed option value; `None` when absent.
fn option<'a>(options: &'a PluginOptions, name: &str) -> Option<&'a str> {
    options.get(name).map(|v| v.trim())
}

/// Trimmed option value that must be present and non-empty.
fn required<'a>(options: &'a PluginOptions, name: &'static str) -> Result<&'a str, ConfigError> {
    match option(options, name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing { option: name }),
    }
}

/// `yes`/`no` option; anything other than `yes` is false.
fn flag(options: &PluginOptions, name: &str, default: bool) -> bool {
    option(options, name).map_or(default, |v| v == "yes")
}

fn parse_prefix(option: &'static str, raw: &str) -> Result<PrefixPath, ConfigError> {
    PrefixPath::parse(raw).map_err(|source| ConfigError::Prefix { option, source })
}

#[cfg(test)]
pub(crate) fn options(pairs: &[(&str, &str)]) -> PluginOptions {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
