//! Comment headers for uploaded text files.
//!
//! A header is a block of lines at the very top of a file, each starting
//! with the configured comment prefix. Rebuilding a header replaces that
//! block and leaves the rest of the file untouched.

use crate::pipeline::{AvailableFields, ResolutionContext};
use crate::{PluginError, PluginResult};
use odr_prefix_config::HeaderConfig;
use odr_prefix_core::{
    substitute_placeholders, CollectRules, DatatypeId, DescendantPolicy, FallbackPolicy, RecordId,
    SchemaGraph, StoredFile,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderRewrite {
    /// The file already starts with the wanted header.
    Unchanged,
    Replaced,
}

/// Prefixes and field datatypes offered when configuring a header on
/// `datatype`, including descendants below multiple-allowed edges.
pub fn available_fields(
    graph: &SchemaGraph,
    datatype: DatatypeId,
    names: &BTreeMap<DatatypeId, String>,
) -> AvailableFields {
    AvailableFields::for_datatype(graph, datatype, names, DescendantPolicy::IncludeMultiple)
}

/// The header for files uploaded to a field of `record`.
///
/// Fails when there are no files, or none with an allowed extension.
pub fn build_header(
    ctx: &ResolutionContext<'_>,
    config: &HeaderConfig,
    record: RecordId,
    files: &[StoredFile],
) -> PluginResult<String> {
    if files.is_empty() {
        return Err(PluginError::NoEligibleFiles {
            reason: format!("record {record} has no uploaded files"),
        });
    }
    if !files.iter().any(|f| config.allows_extension(&f.ext)) {
        return Err(PluginError::NoEligibleFiles {
            reason: format!(
                "none of the files on record {record} have an allowed extension ({})",
                config.allowed_extensions.join(", ")
            ),
        });
    }
    if config.template.is_empty() {
        return Ok(String::new());
    }

    let lookup = ctx.lookup(
        &config.prefix,
        record,
        &config.fields,
        &CollectRules::header(),
        FallbackPolicy::FirstByRecordId,
    )?;
    let values = lookup.values.lenient();
    let text = substitute_placeholders(&config.template, &config.placeholder, &values);

    Ok(comment_lines(&text, &config.comment_prefix, config.newline.as_str()))
}

/// Prefix every line with `comment_prefix` and end with a newline.
fn comment_lines(text: &str, comment_prefix: &str, newline: &str) -> String {
    let mut out = text
        .split(newline)
        .map(|line| format!("{comment_prefix}{line}"))
        .collect::<Vec<_>>()
        .join(newline);
    out.push_str(newline);
    out
}

/// Byte offset of the first line that doesn't start with `comment_prefix`.
///
/// Lines are split on `\n`, so `\r\n` files work too. A header that runs to
/// the end of the file without a final newline covers the whole file.
pub fn find_header_offset(content: &[u8], comment_prefix: &str) -> usize {
    let prefix = comment_prefix.as_bytes();
    if prefix.is_empty() {
        return 0;
    }

    let mut pos = 0;
    while content[pos..].starts_with(prefix) {
        match content[pos..].iter().position(|&b| b == b'\n') {
            Some(end) => pos += end + 1,
            None => return content.len(),
        }
    }
    pos
}

/// `content` with its leading comment block swapped for `new_header`.
pub fn replace_header(content: &[u8], new_header: &str, comment_prefix: &str) -> Vec<u8> {
    let offset = find_header_offset(content, comment_prefix);
    let mut out = Vec::with_capacity(new_header.len() + content.len() - offset);
    out.extend_from_slice(new_header.as_bytes());
    out.extend_from_slice(&content[offset..]);
    out
}

/// Rewrite the file at `path` so it starts with `new_header`.
///
/// The new content goes to a sibling `<name>.new` file which is then renamed
/// over the original.
pub fn rewrite_file_header(
    path: &Path,
    new_header: &str,
    comment_prefix: &str,
) -> PluginResult<HeaderRewrite> {
    let content = fs::read(path).map_err(|source| io_error(path, source))?;
    let offset = find_header_offset(&content, comment_prefix);
    if &content[..offset] == new_header.as_bytes() {
        tracing::debug!(path = %path.display(), "header already up to date");
        return Ok(HeaderRewrite::Unchanged);
    }

    let staging = staging_path(path);
    let rewritten = replace_header(&content, new_header, comment_prefix);
    fs::write(&staging, rewritten).map_err(|source| io_error(&staging, source))?;
    fs::rename(&staging, path).map_err(|source| io_error(path, source))?;

    tracing::info!(path = %path.display(), old_len = offset, new_len = new_header.len(), "replaced file header");
    Ok(HeaderRewrite::Replaced)
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
}

fn io_error(path: &Path, source: std::io::Error) -> PluginError {
    PluginError::Io {
        path: path.to_path_buf(),
        source,
    }
}
