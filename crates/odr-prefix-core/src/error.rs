//! Error values shared by every stage of prefix resolution.

use crate::{DatatypeId, FieldId, RecordId};
use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The stored prefix string doesn't parse.
    #[error("malformed prefix `{input}`: {reason}")]
    MalformedPrefix { input: String, reason: String },

    /// The prefix parsed, but the schema no longer has one of its edges.
    #[error("prefix `{path}` is not a path of the current schema: no edge {ancestor} -> {descendant}")]
    InvalidPrefix {
        path: String,
        ancestor: DatatypeId,
        descendant: DatatypeId,
    },

    #[error("schema integrity error: {detail}")]
    SchemaIntegrity { detail: String },

    /// No chain of records realizes the prefix from this record.
    #[error("Unable to find the correct ancestors for datarecord {record}...the expected records might not be linked")]
    Unsatisfiable { record: RecordId },

    /// More than one chain realizes the prefix; the plugin is configured wrong.
    #[error("Multiple possible ancestors ({count}) for datarecord {record}...the plugin is likely configured wrong")]
    Ambiguous { record: RecordId, count: usize },

    /// Several values for one field survived disambiguation.
    #[error("Found multiple values for datafield {field}")]
    AmbiguousField { field: FieldId },

    #[error("no record of datatype {datatype} to splice into")]
    MissingIntermediate { datatype: DatatypeId },

    /// The splice destination spans several records and this one has no
    /// known origin among them.
    #[error("no single destination for datarecord {record} of datatype {datatype}")]
    AmbiguousDestination { datatype: DatatypeId, record: RecordId },
}

impl CoreError {
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPrefix {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Whether a caller should quietly skip the current record rather than
    /// surface the error to an administrator.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CoreError::MalformedPrefix { .. } | CoreError::Unsatisfiable { .. }
        )
    }
}
