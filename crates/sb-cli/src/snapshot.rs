use std::fs;
use std::path::Path;
use std::time::Instant;

use log::info;
use serde::Serialize;

use sb_compiler::{parse_filter_list, serialize_index, IndexBuilder};
use sb_core::lists::ListDescriptor;
use sb_core::snapshot::deserialize;
use sb_core::FilterIndex;

#[derive(Debug, Clone, Serialize)]
pub struct CompileStats {
    pub lines: usize,
    pub filters: u32,
    pub exceptions: u32,
    pub duplicates: u32,
    pub comments: u32,
    pub cosmetic: u32,
    pub html: u32,
    pub unsupported: u32,
    pub malformed: u32,
    pub bytes: usize,
    pub total_ms: f64,
}

/// Parse, build and serialize the given list files. When `list` is set,
/// each body is first converted according to that registry entry's format.
pub fn compile_snapshot_bytes(
    inputs: &[String],
    list: Option<&ListDescriptor>,
    verbose: bool,
) -> Result<(Vec<u8>, CompileStats), String> {
    if inputs.is_empty() {
        return Err("No input files specified".to_string());
    }

    let start = Instant::now();
    let mut builder = IndexBuilder::new();
    let mut lines = 0usize;
    let mut comments = 0u32;
    let mut malformed = 0u32;

    for (list_id, path) in inputs.iter().enumerate() {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let source = match list {
            Some(descriptor) => descriptor.prepare_source(&content),
            None => content.as_str().into(),
        };

        let line_count = source.lines().count();
        lines += line_count;

        let parsed = parse_filter_list(&source);
        comments += parsed.num_comments;
        malformed += parsed.num_malformed;

        if verbose {
            println!(
                "  [{}] {} - {} lines, {} filters",
                list_id,
                Path::new(path).file_name().unwrap_or_default().to_string_lossy(),
                line_count,
                parsed.filters.len()
            );
        }

        builder.add_list(parsed);
    }

    let index = builder.build();
    let bytes = serialize_index(&index);

    deserialize(&bytes).map_err(|e| format!("Generated snapshot failed validation: {}", e))?;

    let stats = CompileStats {
        lines,
        filters: index.stats.num_filters,
        exceptions: index.stats.num_exception_filters,
        duplicates: index.stats.num_duplicate_filters,
        comments,
        cosmetic: index.stats.num_cosmetic_filters,
        html: index.stats.num_html_filters,
        unsupported: index.stats.num_unsupported_filters,
        malformed,
        bytes: bytes.len(),
        total_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    info!("Compiled {} lists in {:.1}ms", inputs.len(), stats.total_ms);

    Ok((bytes, stats))
}

pub fn write_snapshot(path: &Path, bytes: &[u8]) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    fs::write(path, bytes)
        .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Result<Vec<u8>, String> {
    fs::read(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))
}

/// Read and decode a snapshot file.
pub fn load_index(path: &Path) -> Result<(FilterIndex, Vec<u8>), String> {
    let bytes = read_snapshot(path)?;
    let index = deserialize(&bytes).map_err(|e| format!("Invalid snapshot: {}", e))?;
    Ok((index, bytes))
}
