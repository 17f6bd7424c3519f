//! ShieldBlock CLI
//!
//! CLI tool for compiling filter lists, inspecting snapshots and checking
//! URLs against a filter set.

mod check;
mod snapshot;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;

use sb_compiler::serialize_index;
use sb_core::lists::{self, ListCategory, ListDescriptor, ListFormat};
use sb_core::{FilterIndex, FilterTable};

use check::{cmd_check, CheckOptions, FilterSource};
use snapshot::{compile_snapshot_bytes, load_index, write_snapshot};

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(about = "ShieldBlock filter list compiler and tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile filter lists into an SBX snapshot
    Compile {
        /// Input filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Output snapshot file
        #[arg(short, long, default_value = "out.dat")]
        output: PathBuf,

        /// Registry UUID the inputs were downloaded for; host lists are
        /// converted to filters
        #[arg(short, long)]
        uuid: Option<String>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Validate an SBX snapshot
    Validate {
        /// Snapshot file to validate
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Dump snapshot info
    Info {
        /// Snapshot file to inspect
        #[arg(short, long)]
        input: PathBuf,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },

    /// Check URLs against a filter set
    Check {
        /// URL to check
        #[arg(long)]
        location: Option<String>,

        /// Host of the page making the request
        #[arg(long)]
        host: Option<String>,

        /// Request type (script, image, sub_frame, ...)
        #[arg(short = 'O', long = "type", default_value = "other")]
        request_type: String,

        /// A single filter rule
        #[arg(long, group = "filters")]
        filter: Option<String>,

        /// Filter list file
        #[arg(long, group = "filters")]
        filter_path: Option<PathBuf>,

        /// Compiled snapshot
        #[arg(long, group = "filters")]
        dat: Option<PathBuf>,

        /// Print the filters responsible for each decision
        #[arg(long)]
        discover: bool,

        /// File with one URL per line
        #[arg(long)]
        list: Option<PathBuf>,

        /// Enable the result cache
        #[arg(long)]
        cache: bool,
    },

    /// Show the filter list registry
    Lists {
        /// Only this category (default, malware, regional)
        #[arg(long)]
        category: Option<String>,

        /// Regional list for a language code
        #[arg(long)]
        language: Option<String>,

        /// Print JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compile {
            input,
            output,
            uuid,
            verbose,
        } => cmd_compile(&input, &output, uuid.as_deref(), verbose),
        Commands::Validate { input } => cmd_validate(&input),
        Commands::Info { input, json } => cmd_info(&input, json),
        Commands::Check {
            location,
            host,
            request_type,
            filter,
            filter_path,
            dat,
            discover,
            list,
            cache,
        } => {
            let source = match (&filter, &filter_path, &dat) {
                (Some(text), _, _) => Ok(FilterSource::Text(text)),
                (_, Some(path), _) => Ok(FilterSource::Path(path)),
                (_, _, Some(path)) => Ok(FilterSource::Snapshot(path)),
                _ => Err("One of --filter, --filter-path or --dat is required".to_string()),
            };
            source.and_then(|source| {
                cmd_check(&CheckOptions {
                    source,
                    location: location.as_deref(),
                    host: host.as_deref(),
                    request_type: &request_type,
                    list: list.as_deref(),
                    discover,
                    cache,
                })
            })
        }
        Commands::Lists {
            category,
            language,
            json,
        } => cmd_lists(category.as_deref(), language.as_deref(), json),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn cmd_compile(
    inputs: &[String],
    output: &Path,
    uuid: Option<&str>,
    verbose: bool,
) -> Result<(), String> {
    let list = uuid
        .map(lists::by_uuid)
        .transpose()
        .map_err(|e| e.to_string())?;

    let (bytes, stats) = compile_snapshot_bytes(inputs, list, verbose)?;
    write_snapshot(output, &bytes)?;

    println!("Compiled {} filter lists to '{}'", inputs.len(), output.display());
    println!("  Lines:       {}", stats.lines);
    println!(
        "  Filters:     {} ({} exceptions, {} duplicates dropped)",
        stats.filters, stats.exceptions, stats.duplicates
    );
    println!(
        "  Skipped:     {} comments, {} cosmetic, {} html, {} unsupported, {} malformed",
        stats.comments, stats.cosmetic, stats.html, stats.unsupported, stats.malformed
    );
    println!("  Size:        {} bytes ({:.1} KB)", stats.bytes, stats.bytes as f64 / 1024.0);
    println!("  Time:        {:.1}ms", stats.total_ms);

    Ok(())
}

fn cmd_validate(input: &Path) -> Result<(), String> {
    let (index, bytes) = load_index(input)?;

    if serialize_index(&index) != bytes {
        return Err(format!(
            "Snapshot '{}' loads but does not re-serialize identically",
            input.display()
        ));
    }

    println!("Snapshot '{}' is valid", input.display());
    println!("  Filters:     {}", index.len());
    println!("  Size:        {} bytes", bytes.len());

    Ok(())
}

#[derive(Serialize)]
struct TableInfo {
    host_keys: usize,
    buckets: usize,
    fallback: usize,
    filters: usize,
}

impl From<&FilterTable> for TableInfo {
    fn from(table: &FilterTable) -> Self {
        Self {
            host_keys: table.host_anchored.len(),
            buckets: table.buckets.len(),
            fallback: table.fallback.len(),
            filters: table.len(),
        }
    }
}

#[derive(Serialize)]
struct SnapshotInfo {
    bytes: usize,
    num_filters: u32,
    num_exception_filters: u32,
    num_host_anchored_filters: u32,
    num_fallback_filters: u32,
    num_cosmetic_filters: u32,
    num_html_filters: u32,
    num_unsupported_filters: u32,
    num_duplicate_filters: u32,
    blocking: TableInfo,
    exceptions: TableInfo,
}

impl SnapshotInfo {
    fn new(index: &FilterIndex, bytes: usize) -> Self {
        let stats = &index.stats;
        Self {
            bytes,
            num_filters: stats.num_filters,
            num_exception_filters: stats.num_exception_filters,
            num_host_anchored_filters: stats.num_host_anchored_filters,
            num_fallback_filters: stats.num_fallback_filters,
            num_cosmetic_filters: stats.num_cosmetic_filters,
            num_html_filters: stats.num_html_filters,
            num_unsupported_filters: stats.num_unsupported_filters,
            num_duplicate_filters: stats.num_duplicate_filters,
            blocking: (&index.blocking).into(),
            exceptions: (&index.exceptions).into(),
        }
    }
}

fn cmd_info(input: &Path, json: bool) -> Result<(), String> {
    let (index, bytes) = load_index(input)?;
    let info = SnapshotInfo::new(&index, bytes.len());

    if json {
        let out = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
        println!("{out}");
        return Ok(());
    }

    println!("Snapshot: {}", input.display());
    println!("  Magic:       SBX1");
    println!("  Total size:  {} bytes ({:.1} KB)", info.bytes, info.bytes as f64 / 1024.0);
    println!();
    println!("Parsing stats:");
    println!("  Filters:         {}", info.num_filters);
    println!("  Exceptions:      {}", info.num_exception_filters);
    println!("  Host-anchored:   {}", info.num_host_anchored_filters);
    println!("  Fallback:        {}", info.num_fallback_filters);
    println!("  Cosmetic:        {}", info.num_cosmetic_filters);
    println!("  HTML:            {}", info.num_html_filters);
    println!("  Unsupported:     {}", info.num_unsupported_filters);
    println!("  Duplicates:      {}", info.num_duplicate_filters);
    println!();
    for (name, table) in [("Blocking", &info.blocking), ("Exception", &info.exceptions)] {
        println!(
            "{name} table: {} filters, {} host keys, {} buckets, {} fallback",
            table.filters, table.host_keys, table.buckets, table.fallback
        );
    }

    Ok(())
}

#[derive(Serialize)]
struct ListInfo {
    uuid: &'static str,
    title: &'static str,
    category: &'static str,
    list_url: &'static str,
    support_url: &'static str,
    languages: &'static [&'static str],
    host_list: bool,
}

impl From<&ListDescriptor> for ListInfo {
    fn from(list: &ListDescriptor) -> Self {
        Self {
            uuid: list.uuid,
            title: list.title,
            category: list.category.as_str(),
            list_url: list.list_url,
            support_url: list.support_url,
            languages: list.languages,
            host_list: matches!(list.format, ListFormat::HostList { .. }),
        }
    }
}

fn cmd_lists(category: Option<&str>, language: Option<&str>, json: bool) -> Result<(), String> {
    let selected: Vec<&ListDescriptor> = match (category, language) {
        (_, Some(language)) => vec![lists::regional_for_language(language)
            .ok_or_else(|| format!("No regional list for language '{language}'"))?],
        (Some(name), None) => {
            let category = ListCategory::ALL
                .into_iter()
                .find(|c| c.as_str().eq_ignore_ascii_case(name))
                .ok_or_else(|| format!("Unknown category '{name}'"))?;
            lists::by_category(category).iter().collect()
        }
        (None, None) => lists::all().collect(),
    };

    if json {
        let infos: Vec<ListInfo> = selected.into_iter().map(ListInfo::from).collect();
        let out = serde_json::to_string_pretty(&infos).map_err(|e| e.to_string())?;
        println!("{out}");
        return Ok(());
    }

    for list in selected {
        let languages = if list.languages.is_empty() {
            String::new()
        } else {
            format!(" [{}]", list.languages.join(","))
        };
        println!(
            "{:<9} {}  {}{}",
            list.category.as_str(),
            list.uuid,
            list.title,
            languages
        );
    }

    Ok(())
}
