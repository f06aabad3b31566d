//! odr-prefix CLI
//!
//! Drives datatype prefix resolution and the render plugins over a JSON
//! fixture (schema edges plus nested records):
//! - Enumerating and resolving prefixes
//! - Looking up field values for a record
//! - Building file headers, merging linked descendants, filter graphs

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use odr_prefix_config::{FilterGraphConfig, HeaderConfig, MergerConfig, PluginOptions};
use odr_prefix_core::{
    AscendingRecordId, ByRecordName, CollectRules, DatatypeId, DescendantPolicy,
    DestinationPolicy, FallbackPolicy, FieldId, PrefixPath, RecordId, RecordOrdering,
    RecordTreeLoader, StoredFile,
};
use odr_prefix_plugins::{
    build_header, merge_candidates, merge_linked_descendants, rewrite_file_header,
    FilterGraphView, ResolutionContext,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod fixture;

use fixture::{Fixture, Loaded};

#[derive(Parser)]
#[command(name = "odr-prefix")]
#[command(author, version, about = "Datatype prefix resolution for ODR render plugins")]
struct Cli {
    /// JSON fixture with datatypes, edges, records and links.
    #[arg(short, long, global = true, default_value = "fixture.json")]
    fixture: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every prefix that ends at a datatype.
    Paths {
        #[arg(long)]
        target: u32,
    },

    /// Walk a prefix from a record up to its ultimate ancestor.
    Resolve {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        record: u32,
    },

    /// Look up field values for a record through a prefix.
    Values {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        record: u32,
        /// Comma separated datafield ids.
        #[arg(long, value_delimiter = ',', required = true)]
        fields: Vec<u32>,
        /// Also read fields below multiple-allowed edges.
        #[arg(long)]
        include_multiple: bool,
    },

    /// Build the comment header for a file uploaded to a record.
    Header {
        #[arg(long)]
        prefix: String,
        #[arg(long)]
        record: u32,
        /// Header text; `\n` separates lines.
        #[arg(long)]
        template: String,
        #[arg(long, default_value = "?:")]
        placeholder: String,
        #[arg(long, default_value = "#")]
        comment_prefix: String,
        #[arg(long, default_value = "txt,csv")]
        allowed_extensions: String,
        /// Rewrite this file's header in place instead of printing it.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Datatypes reachable from a root through several paths.
    Candidates {
        #[arg(long)]
        root: u32,
        /// Allow destinations longer than two datatypes.
        #[arg(long)]
        unrestricted: bool,
    },

    /// Merge linked descendants of a top-level record.
    Merge {
        #[arg(long)]
        record: u32,
        /// Merge groups, e.g. `1_2_3,1_3:1_3|1_4,1_5_4:1_4`.
        #[arg(long)]
        config: String,
        /// How moved records are ordered at their destination.
        #[arg(long, value_enum, default_value_t = MergeOrder::Id)]
        order: MergeOrder,
    },

    /// Graphable files and their filters for a set of records.
    FilterGraph {
        /// Comma separated top-level record ids.
        #[arg(long, value_delimiter = ',', required = true)]
        records: Vec<u32>,
        /// `prefix,primary_field,secondary_field`
        #[arg(long)]
        config: String,
        /// Comma separated datafield ids whose filters start hidden.
        #[arg(long, default_value = "")]
        hidden: String,
        /// Date used to decide whether files are public (defaults to today).
        #[arg(long)]
        today: Option<NaiveDate>,
    },

    /// Print problems found in the fixture's schema.
    Check,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MergeOrder {
    /// Ascending record id.
    Id,
    /// Record name, unnamed records last.
    Name,
}

impl MergeOrder {
    fn ordering(self) -> &'static dyn RecordOrdering {
        match self {
            MergeOrder::Id => &AscendingRecordId,
            MergeOrder::Name => &ByRecordName,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("{} {err:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let loaded = Fixture::read(&cli.fixture)?.load();

    match cli.command {
        Commands::Paths { target } => cmd_paths(&loaded, target),
        Commands::Resolve { prefix, record } => cmd_resolve(&loaded, &prefix, record),
        Commands::Values {
            prefix,
            record,
            fields,
            include_multiple,
        } => cmd_values(&loaded, &prefix, record, &fields, include_multiple),
        Commands::Header {
            prefix,
            record,
            template,
            placeholder,
            comment_prefix,
            allowed_extensions,
            file,
        } => {
            let options = plugin_options(&[
                ("comment_prefix", comment_prefix),
                ("allowed_extensions", allowed_extensions),
                ("placeholder", placeholder),
                ("newline_separator", "linux".to_string()),
                ("header_data", format!("{prefix}\n{}", template.replace("\\n", "\n"))),
            ]);
            cmd_header(&loaded, &options, record, file.as_deref())
        }
        Commands::Candidates { root, unrestricted } => {
            let policy = if unrestricted {
                DestinationPolicy::unrestricted()
            } else {
                DestinationPolicy::default()
            };
            let candidates =
                merge_candidates(&loaded.graph, DatatypeId::new(root), &loaded.names, policy);
            print_json(&candidates)
        }
        Commands::Merge {
            record,
            config,
            order,
        } => cmd_merge(&loaded, record, &config, order.ordering()),
        Commands::FilterGraph {
            records,
            config,
            hidden,
            today,
        } => {
            let options =
                plugin_options(&[("plugin_config", config), ("filter_config", hidden)]);
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            cmd_filter_graph(&loaded, &records, &options, today)
        }
        Commands::Check => cmd_check(&loaded),
    }
}

fn plugin_options(pairs: &[(&str, String)]) -> PluginOptions {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_prefix(raw: &str) -> Result<PrefixPath> {
    PrefixPath::parse(raw).with_context(|| format!("invalid prefix `{raw}`"))
}

// ============================================================================
// Commands
// ============================================================================

fn cmd_paths(loaded: &Loaded, target: u32) -> Result<()> {
    let target = DatatypeId::new(target);
    if !loaded.graph.contains(target) {
        bail!("datatype {target} is not part of the schema");
    }
    print_json(&PrefixPath::choices_to(&loaded.graph, target, &loaded.names))
}

fn cmd_resolve(loaded: &Loaded, prefix: &str, record: u32) -> Result<()> {
    let prefix = parse_prefix(prefix)?;
    let ctx = ResolutionContext::in_memory(&loaded.graph, &loaded.store);
    let chain = ctx.resolve(&prefix, RecordId::new(record))?;
    print_json(&chain.records())
}

fn cmd_values(
    loaded: &Loaded,
    prefix: &str,
    record: u32,
    fields: &[u32],
    include_multiple: bool,
) -> Result<()> {
    let prefix = parse_prefix(prefix)?;
    let policy = DescendantPolicy::from(include_multiple);
    let rules = CollectRules::header().within(prefix.allowed_datatypes(&loaded.graph, policy));
    let fields: Vec<FieldId> = fields.iter().copied().map(FieldId::new).collect();

    let ctx = ResolutionContext::in_memory(&loaded.graph, &loaded.store);
    let lookup = ctx.lookup(
        &prefix,
        RecordId::new(record),
        &fields,
        &rules,
        FallbackPolicy::default(),
    )?;
    print_json(&lookup.values)
}

fn cmd_header(
    loaded: &Loaded,
    options: &PluginOptions,
    record: u32,
    file: Option<&Path>,
) -> Result<()> {
    let config = HeaderConfig::from_options(options)?;
    let ctx = ResolutionContext::in_memory(&loaded.graph, &loaded.store);

    let Some(path) = file else {
        // Without a file, assume one with the first allowed extension.
        let ext = config.allowed_extensions.first().cloned().unwrap_or_default();
        let header = build_header(&ctx, &config, RecordId::new(record), &[stored_file(ext)])?;
        print!("{header}");
        return Ok(());
    };

    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .ok_or_else(|| anyhow!("{} has no extension", path.display()))?;
    let header = build_header(&ctx, &config, RecordId::new(record), &[stored_file(ext.into())])?;
    let outcome = rewrite_file_header(path, &header, &config.comment_prefix)?;
    eprintln!(
        "{} {} ({})",
        "header".green().bold(),
        path.display().to_string().bold(),
        serde_json::to_string(&outcome)?
    );
    Ok(())
}

fn stored_file(ext: String) -> StoredFile {
    StoredFile {
        id: 0,
        unique_id: String::new(),
        original_name: format!("upload.{ext}"),
        ext,
        public_date: None,
        is_original: true,
    }
}

fn cmd_merge(
    loaded: &Loaded,
    record: u32,
    config: &str,
    ordering: &dyn RecordOrdering,
) -> Result<()> {
    let config = MergerConfig::parse(config)?;
    for (group, reason) in &config.skipped {
        eprintln!("{} skipping `{group}`: {reason}", "warning:".yellow().bold());
    }

    let record = RecordId::new(record);
    let tree = loaded
        .store
        .load_tree(record)
        .ok_or_else(|| anyhow!("record {record} is not in the fixture"))?;
    let merged = merge_linked_descendants(&loaded.graph, &tree, &config, ordering)?;
    print_json(&merged)
}

fn cmd_filter_graph(
    loaded: &Loaded,
    records: &[u32],
    options: &PluginOptions,
    today: NaiveDate,
) -> Result<()> {
    let config = FilterGraphConfig::from_options(options)?;
    let trees = records
        .iter()
        .map(|&id| {
            let id = RecordId::new(id);
            loaded
                .store
                .load_tree(id)
                .ok_or_else(|| anyhow!("record {id} is not in the fixture"))
        })
        .collect::<Result<Vec<_>>>()?;

    let view = FilterGraphView::build(&loaded.graph, &trees, &config, today);
    print_json(&view)
}

fn cmd_check(loaded: &Loaded) -> Result<()> {
    let issues = loaded.graph.issues();
    if issues.is_empty() {
        println!(
            "{} {} datatypes, {} edges",
            "ok".green().bold(),
            loaded.graph.datatypes().len(),
            loaded.graph.edges().len()
        );
        return Ok(());
    }

    for issue in issues {
        println!("{} {issue}", "issue:".yellow().bold());
    }
    bail!("{} schema issue(s) found", issues.len())
}
