//! New filenames built from field values of related records.
//!
//! The base name joins the configured parts with the separator, replaces
//! periods, and is then cleaned up (or refused) so that it is a legal
//! filename on both Linux and Windows. Each file gets the base name, an
//! optional `separator + file uuid`, and an extension.

use crate::pipeline::{AvailableFields, ResolutionContext};
use crate::{PluginError, PluginResult};
use odr_prefix_config::{
    FieldDirectory, FilenamePart, PluginOptions, RenamerConfig, TargetExtension,
};
use odr_prefix_core::{
    CollectRules, DatatypeId, DescendantPolicy, FallbackPolicy, FieldId, RecordId, SchemaGraph,
    StoredFile,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

const RESERVED_NAMES: &[&str] = &[
    ".", "..", "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6",
    "COM7", "COM8", "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8",
    "LPT9",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFilename {
    pub file: u32,
    pub filename: String,
    /// Set when the configured extension replaces the file's own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_ext: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilenameRejection {
    InvalidCharacters,
    ReservedName,
    LeadingDash,
}

impl fmt::Display for FilenameRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilenameRejection::InvalidCharacters => write!(f, "contains invalid characters"),
            FilenameRejection::ReservedName => write!(f, "is a reserved name"),
            FilenameRejection::LeadingDash => write!(f, "starts with a dash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RenameOutcome {
    /// No original files or images to rename.
    NoFiles,
    Renamed { files: Vec<NewFilename> },
    /// The record's ancestors could not be found; nothing is renamed.
    Skipped { reason: String },
    /// The computed name is not a usable filename; nothing is renamed.
    Refused {
        filename: String,
        reason: FilenameRejection,
    },
}

#[derive(Debug, Clone)]
pub struct FileRenamer {
    config: RenamerConfig,
    parts: Vec<FilenamePart>,
    fields: Vec<FieldId>,
}

impl FileRenamer {
    pub fn new(config: RenamerConfig, directory: &dyn FieldDirectory) -> Self {
        let parts = config.parts(directory);
        let fields = config.field_ids(directory);
        Self {
            config,
            parts,
            fields,
        }
    }

    /// `None` when the options don't describe a usable configuration.
    pub fn from_options(options: &PluginOptions, directory: &dyn FieldDirectory) -> Option<Self> {
        match RenamerConfig::from_options(options) {
            Ok(config) => Some(Self::new(config, directory)),
            Err(err) => {
                tracing::info!(error = %err, "file renamer is not configured");
                None
            }
        }
    }

    pub fn config(&self) -> &RenamerConfig {
        &self.config
    }

    /// Prefixes and field datatypes offered when configuring the renamer on
    /// `datatype`. A filename takes one value per field, so nothing below a
    /// multiple-allowed edge is offered.
    pub fn available_fields(
        graph: &SchemaGraph,
        datatype: DatatypeId,
        names: &BTreeMap<DatatypeId, String>,
    ) -> AvailableFields {
        AvailableFields::for_datatype(graph, datatype, names, DescendantPolicy::SingleOnly)
    }

    /// New names for `files`, which belong to a field of `record`.
    pub fn new_filenames(
        &self,
        ctx: &ResolutionContext<'_>,
        record: RecordId,
        files: &[StoredFile],
    ) -> PluginResult<RenameOutcome> {
        let files: Vec<&StoredFile> = files.iter().filter(|f| f.is_original).collect();
        if files.is_empty() {
            return Ok(RenameOutcome::NoFiles);
        }

        let lookup = match ctx.lookup(
            &self.config.prefix,
            record,
            &self.fields,
            &CollectRules::filename(),
            FallbackPolicy::BlankWhenOffChain,
        ) {
            Ok(lookup) => lookup,
            Err(PluginError::Core(err)) if err.is_recoverable() => {
                tracing::info!(record = %record, error = %err, "not renaming files");
                return Ok(RenameOutcome::Skipped {
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        };
        let values = lookup.values.strict()?;

        let base = match self.base_filename(&values) {
            Ok(base) => base,
            Err((filename, reason)) => {
                tracing::info!(record = %record, filename = %filename, %reason, "refusing to rename files");
                return Ok(RenameOutcome::Refused { filename, reason });
            }
        };

        let renamed = files
            .into_iter()
            .map(|file| self.filename_for(&base, file))
            .collect();
        Ok(RenameOutcome::Renamed { files: renamed })
    }

    /// Join the parts, substitute periods and validate the result.
    pub fn base_filename(
        &self,
        values: &BTreeMap<FieldId, String>,
    ) -> Result<String, (String, FilenameRejection)> {
        let pieces: Vec<&str> = self
            .parts
            .iter()
            .map(|part| match part {
                FilenamePart::Field(field) => values.get(field).map(String::as_str).unwrap_or(""),
                FilenamePart::Constant(text) => text.as_str(),
            })
            .collect();

        let joined = pieces
            .join(&self.config.separator)
            .replace('.', &self.config.period_substitute);

        let cleaned = if self.config.delete_invalid_characters {
            joined.chars().filter(|&c| !is_invalid_char(c)).collect()
        } else if joined.chars().any(is_invalid_char) {
            return Err((joined, FilenameRejection::InvalidCharacters));
        } else {
            joined
        };

        let trimmed = cleaned.trim().to_string();
        if RESERVED_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(&trimmed))
        {
            return Err((trimmed, FilenameRejection::ReservedName));
        }
        if trimmed.starts_with('-') {
            return Err((trimmed, FilenameRejection::LeadingDash));
        }
        Ok(trimmed)
    }

    fn filename_for(&self, base: &str, file: &StoredFile) -> NewFilename {
        let mut filename = base.to_string();
        if self.config.append_file_uuid {
            filename.push_str(&self.config.separator);
            filename.push_str(&file.unique_id);
        }

        let new_ext = match &self.config.extension {
            TargetExtension::Auto => {
                filename.push('.');
                filename.push_str(&file.ext);
                None
            }
            TargetExtension::Fixed(ext) => {
                filename.push('.');
                filename.push_str(ext);
                Some(ext.clone())
            }
        };

        NewFilename {
            file: file.id,
            filename,
            new_ext,
        }
    }
}

/// Path separators, characters Windows forbids, and ASCII control characters.
fn is_invalid_char(c: char) -> bool {
    c.is_ascii_control() || matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}
