//! File renamer options.
//!
//! `field_list` holds the prefix on its first line; every following line is
//! either the uuid of a datafield whose value goes into the filename, or a
//! string constant copied verbatim.

use crate::{flag, option, parse_prefix, ConfigError, PluginOptions};
use odr_prefix_core::{FieldId, PrefixPath};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SEPARATOR: &str = "__";
pub const DEFAULT_PERIOD_SUBSTITUTE: &str = "-";

/// Looks up datafields by uuid.
pub trait FieldDirectory {
    fn field_by_uuid(&self, uuid: &str) -> Option<FieldId>;
}

impl FieldDirectory for std::collections::BTreeMap<String, FieldId> {
    fn field_by_uuid(&self, uuid: &str) -> Option<FieldId> {
        self.get(uuid).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetExtension {
    /// Keep each file's current extension.
    Auto,
    Fixed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenamePart {
    Field(FieldId),
    Constant(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenamerConfig {
    pub prefix: PrefixPath,
    /// Raw `field_list` entries after the prefix line.
    pub entries: Vec<String>,
    pub separator: String,
    pub period_substitute: String,
    pub extension: TargetExtension,
    pub append_file_uuid: bool,
    pub delete_invalid_characters: bool,
}

impl RenamerConfig {
    pub fn from_options(options: &PluginOptions) -> Result<Self, ConfigError> {
        let field_list = option(options, "field_list")
            .ok_or(ConfigError::Missing { option: "field_list" })?
            .replace('\r', "");
        let mut lines = field_list.split('\n');

        let prefix_line = lines.next().unwrap_or_default().trim();
        if prefix_line.is_empty() {
            return Err(ConfigError::Missing { option: "field_list" });
        }
        let prefix = parse_prefix("field_list", prefix_line)?;

        let entries: Vec<String> = lines.map(str::to_string).collect();
        if entries.is_empty() {
            return Err(ConfigError::invalid("field_list", "no fields or constants listed"));
        }

        let separator = option(options, "separator").unwrap_or(DEFAULT_SEPARATOR);
        if separator.is_empty() {
            return Err(ConfigError::Missing { option: "separator" });
        }
        let period_substitute =
            option(options, "period_substitute").unwrap_or(DEFAULT_PERIOD_SUBSTITUTE);

        let extension = match option(options, "file_extension").unwrap_or("auto") {
            "" => return Err(ConfigError::Missing { option: "file_extension" }),
            "auto" => TargetExtension::Auto,
            ext if ext.ends_with('.') => {
                return Err(ConfigError::invalid("file_extension", "must not end with a period"))
            }
            ext => TargetExtension::Fixed(ext.to_string()),
        };

        Ok(Self {
            prefix,
            entries,
            separator: separator.to_string(),
            period_substitute: period_substitute.to_string(),
            extension,
            append_file_uuid: flag(options, "append_file_uuid", true),
            delete_invalid_characters: flag(options, "delete_invalid_characters", true),
        })
    }

    /// Classify each entry as a datafield or a constant.
    pub fn parts(&self, directory: &dyn FieldDirectory) -> Vec<FilenamePart> {
        self.entries
            .iter()
            .map(|entry| match directory.field_by_uuid(entry) {
                Some(field) => FilenamePart::Field(field),
                None => FilenamePart::Constant(entry.clone()),
            })
            .collect()
    }

    /// Datafields referenced by the config, in listed order without repeats.
    pub fn field_ids(&self, directory: &dyn FieldDirectory) -> Vec<FieldId> {
        let mut out = Vec::new();
        for part in self.parts(directory) {
            if let FilenamePart::Field(field) = part {
                if !out.contains(&field) {
                    out.push(field);
                }
            }
        }
        out
    }
}
