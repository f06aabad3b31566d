//! Datatype prefix resolution for ODR render plugins
//!
//! Several plugins (file renaming, file header insertion, filter graphs and
//! linked descendant merging) are configured with a *prefix*: a path of
//! datatype ids fixed at configuration time, e.g. `"1_3_2"`. At render time
//! the plugin is handed an arbitrary record of the path's last datatype and
//! has to work back up to the record at the root end of the path, load the
//! tree beneath it, and pick out the field values that actually belong to
//! this record.
//!
//! Pipeline:
//! 1. [`SchemaGraph`]: datatype relationship graph (parent/child and link edges)
//! 2. [`PrefixPath`]: parse, enumerate and validate prefixes
//! 3. [`PathResolver`]: prefix + start record -> concrete record chain
//! 4. [`RecordTreeLoader`]: collaborator that supplies the nested records
//! 5. [`collect`]: gather candidate field values from the tree
//! 6. [`reduce`]: narrow candidates to one value per field
//! 7. [`splicer`]: move record subtrees between positions in a tree
//!
//! Everything here is synchronous and request scoped. Nothing is cached
//! between calls.

pub mod collector;
pub mod disambiguator;
pub mod error;
pub mod prefix;
pub mod record_tree;
pub mod resolver;
pub mod schema_graph;
pub mod splicer;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use collector::{collect, CollectRules, FieldValueCandidate};
pub use disambiguator::{
    reduce, reduce_with, substitute_placeholders, DisambiguatedValue, Disambiguation,
    FallbackPolicy,
};
pub use error::{CoreError, CoreResult};
pub use prefix::{DestinationPolicy, PrefixChoice, PrefixPath, PREFIX_SEPARATOR};
pub use record_tree::{
    AscendingRecordId, ByRecordName, ChoiceOption, FieldCategory, FieldValue, InMemoryRecords,
    Record, RecordOrdering, RecordTreeLoader, StoredFile,
};
pub use resolver::{PathResolver, RecordLinks, ResolutionState, ResolvedChain};
pub use schema_graph::{DescendantPolicy, Edge, IntegrityIssue, SchemaGraph};

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident, $tag:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(raw: u32) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl $name {
            /// Short debugging label, e.g. `dt#3`.
            pub fn label(self) -> String {
                format!(concat!($tag, "#{}"), self.0)
            }
        }
    };
}

id_type!(
    /// Identifier of a datatype (a node of the [`SchemaGraph`]).
    DatatypeId,
    "dt"
);
id_type!(
    /// Identifier of a datarecord.
    RecordId,
    "dr"
);
id_type!(
    /// Identifier of a datafield.
    FieldId,
    "df"
);
