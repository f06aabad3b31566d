//! File header inserter options.

use crate::{parse_prefix, required, ConfigError, PluginOptions};
use odr_prefix_core::{FieldId, PrefixPath};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewlineStyle {
    Windows,
    Linux,
}

impl NewlineStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            NewlineStyle::Windows => "\r\n",
            NewlineStyle::Linux => "\n",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderConfig {
    pub prefix: PrefixPath,
    pub comment_prefix: String,
    pub allowed_extensions: Vec<String>,
    pub placeholder: String,
    pub newline: NewlineStyle,
    /// Datafields referenced in the template, in first-seen order.
    pub fields: Vec<FieldId>,
    /// Header text without comment prefixes; may be empty.
    pub template: String,
}

impl HeaderConfig {
    pub fn from_options(options: &PluginOptions) -> Result<Self, ConfigError> {
        let comment_prefix = required(options, "comment_prefix")?;
        let allowed_extensions = required(options, "allowed_extensions")?;
        let placeholder = required(options, "placeholder")?;
        let newline = match required(options, "newline_separator")? {
            "windows" => NewlineStyle::Windows,
            _ => NewlineStyle::Linux,
        };

        let mut header_data = required(options, "header_data")?.to_string();
        if newline == NewlineStyle::Linux {
            header_data = header_data.replace('\r', "");
        }

        // First line is the prefix, the remainder is the header template.
        let (prefix_line, template) = match header_data.split_once(newline.as_str()) {
            Some((prefix, rest)) => (prefix.to_string(), rest.to_string()),
            None => (header_data.clone(), String::new()),
        };
        let prefix = parse_prefix("header_data", prefix_line.trim())?;
        let fields = placeholder_fields(&template, placeholder)?;

        Ok(Self {
            prefix,
            comment_prefix: comment_prefix.to_string(),
            allowed_extensions: allowed_extensions.split(',').map(str::to_string).collect(),
            placeholder: placeholder.to_string(),
            newline,
            fields,
            template,
        })
    }

    pub fn allows_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.iter().any(|allowed| allowed == ext)
    }
}

/// Distinct field ids written as `placeholder` followed by digits.
pub fn placeholder_fields(template: &str, placeholder: &str) -> Result<Vec<FieldId>, ConfigError> {
    let pattern = Regex::new(&format!(r"{}(\d+)", regex::escape(placeholder)))
        .map_err(|err| ConfigError::invalid("placeholder", err.to_string()))?;

    let mut out = Vec::new();
    for caps in pattern.captures_iter(template) {
        let Some(raw) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let field = FieldId::new(raw);
        if !out.contains(&field) {
            out.push(field);
        }
    }
    Ok(out)
}
