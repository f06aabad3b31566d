//! Filter graph options.
//!
//! `plugin_config` is `prefix,primary_file_field,secondary_file_field` with
//! the secondary field optional (left blank). `filter_config` lists the
//! datafields whose filters start out hidden.

use crate::{option, parse_prefix, ConfigError, PluginOptions};
use odr_prefix_core::{FieldId, PrefixPath};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGraphConfig {
    pub prefix: PrefixPath,
    pub primary_file_field: FieldId,
    pub secondary_file_field: Option<FieldId>,
    #[serde(default)]
    pub hidden_fields: Vec<FieldId>,
}

impl FilterGraphConfig {
    pub fn from_options(options: &PluginOptions) -> Result<Self, ConfigError> {
        let plugin_config = option(options, "plugin_config").unwrap_or_default();
        if plugin_config.is_empty() {
            return Err(ConfigError::Missing { option: "plugin_config" });
        }

        let parts: Vec<&str> = plugin_config.split(',').collect();
        let [prefix, primary, secondary] = parts[..] else {
            return Err(ConfigError::invalid(
                "plugin_config",
                format!("expected 3 comma-separated entries, found {}", parts.len()),
            ));
        };

        let prefix = parse_prefix("plugin_config", prefix.trim())?;
        let primary_file_field = field_id("plugin_config", primary)?;
        let secondary_file_field = match secondary.trim() {
            "" => None,
            raw => Some(field_id("plugin_config", raw)?),
        };

        let mut hidden_fields = Vec::new();
        if let Some(raw) = option(options, "filter_config").filter(|s| !s.is_empty()) {
            for entry in raw.split(',') {
                let field = field_id("filter_config", entry)?;
                if !hidden_fields.contains(&field) {
                    hidden_fields.push(field);
                }
            }
        }

        Ok(Self {
            prefix,
            primary_file_field,
            secondary_file_field,
            hidden_fields,
        })
    }

    /// The file fields to check, primary first.
    pub fn file_fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        std::iter::once(self.primary_file_field).chain(self.secondary_file_field)
    }

    pub fn is_hidden(&self, field: FieldId) -> bool {
        self.hidden_fields.contains(&field)
    }
}

fn field_id(option: &'static str, raw: &str) -> Result<FieldId, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .map(FieldId::new)
        .map_err(|_| ConfigError::invalid(option, format!("`{}` is not a datafield id", raw.trim())))
}
