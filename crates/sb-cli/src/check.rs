//! `check` command: match URLs against a filter set and report.

use std::fs;
use std::path::Path;

use log::{debug, warn};

use sb_compiler::{compile_filter_lists, parse_line, Rejected};
use sb_core::url::extract_host;
use sb_core::{
    Engine, EngineConfig, FilterIndex, MatchRequest, Matcher, MatchingStats, ResourceType,
};

use crate::snapshot::load_index;

/// Where the filters for a check come from.
pub enum FilterSource<'a> {
    Text(&'a str),
    Path(&'a Path),
    Snapshot(&'a Path),
}

pub struct CheckOptions<'a> {
    pub source: FilterSource<'a>,
    pub location: Option<&'a str>,
    pub host: Option<&'a str>,
    pub request_type: &'a str,
    pub list: Option<&'a Path>,
    pub discover: bool,
    pub cache: bool,
}

pub fn cmd_check(opts: &CheckOptions<'_>) -> Result<(), String> {
    let index = load_filters(&opts.source)?;
    debug!("Checking against {} filters", index.len());

    let urls: Vec<String> = match (opts.list, opts.location) {
        (Some(path), _) => fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect(),
        (None, Some(location)) => vec![location.to_string()],
        (None, None) => return Err("Either --location or --list is required".to_string()),
    };

    let resource_type = ResourceType::from_request_type(opts.request_type);
    let config = if opts.cache {
        EngineConfig::default()
    } else {
        EngineConfig::no_cache()
    };
    let engine = Engine::with_index(index, config);

    let mut blocked = 0usize;
    for url in &urls {
        // Without --host each URL is checked as a first-party load of itself
        let source = opts.host.or_else(|| extract_host(url)).unwrap_or("");
        let req = MatchRequest::new(url, resource_type, source);

        let is_blocked = engine.matches(&req);
        if is_blocked {
            blocked += 1;
        }
        println!("{} {}", if is_blocked { "BLOCK" } else { "ALLOW" }, url);

        if opts.discover {
            let index = engine.index();
            let (filter, exception) = Matcher::new(&index).find_matching_filters(&req);
            if let Some(filter) = filter {
                println!("  blocking filter:  {}", filter.text);
            }
            if let Some(exception) = exception {
                println!("  exception filter: {}", exception.text);
            }
        }
    }

    println!();
    println!("Checked {} URLs, {} blocked", urls.len(), blocked);
    print_matching_stats(&engine.matching_stats());
    if opts.cache {
        println!("  Cached results:             {}", engine.cache_len());
    }

    Ok(())
}

fn load_filters(source: &FilterSource<'_>) -> Result<FilterIndex, String> {
    match source {
        FilterSource::Text(text) => {
            let text = *text;
            if let Err(reason) = parse_line(text) {
                if reason != Rejected::Blank {
                    warn!("Filter {:?} produces no network filter: {}", text, reason);
                }
            }
            Ok(compile_filter_lists(&[text]))
        }
        FilterSource::Path(path) => {
            let content = fs::read_to_string(path)
                .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
            Ok(compile_filter_lists(&[&content]))
        }
        FilterSource::Snapshot(path) => load_index(path).map(|(index, _)| index),
    }
}

fn print_matching_stats(stats: &MatchingStats) {
    println!("Matching stats:");
    println!("  Hash set saves:             {}", stats.num_hash_set_saves);
    println!("  Exception hash set saves:   {}", stats.num_exception_hash_set_saves);
    println!("  False positives:            {}", stats.num_false_positives);
    println!("  Exception false positives:  {}", stats.num_exception_false_positives);
}
