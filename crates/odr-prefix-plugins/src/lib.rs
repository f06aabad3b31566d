//! Render plugins built on datatype prefix resolution.
//!
//! - [`renamer`]: compute new filenames from field values of related records
//! - [`header`]: build a comment header for text files and splice it in
//! - [`merger`]: merge records reachable through several links into one place
//! - [`filter_graph`]: collect graphable files and the filters that select them
//!
//! All of them share [`pipeline::ResolutionContext`], which walks a prefix
//! from a record to its ultimate ancestor, loads the tree beneath it and
//! reduces field values to one per field.

pub mod filter_graph;
pub mod header;
pub mod merger;
pub mod pipeline;
pub mod renamer;

use odr_prefix_config::ConfigError;
use odr_prefix_core::{CoreError, RecordId};
use std::path::PathBuf;
use thiserror::Error;

pub use filter_graph::{FilterGraphView, FilterIndex, GraphFile, ReducedFilters};
pub use header::{
    build_header, find_header_offset, replace_header, rewrite_file_header, HeaderRewrite,
};
pub use merger::{merge_candidates, merge_linked_descendants, MergeCandidate};
pub use pipeline::{AvailableFields, FieldLookup, ResolutionContext};
pub use renamer::{FileRenamer, FilenameRejection, NewFilename, RenameOutcome};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("record {record} could not be loaded")]
    MissingRecord { record: RecordId },

    #[error("{reason}")]
    NoEligibleFiles { reason: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type PluginResult<T> = Result<T, PluginError>;
