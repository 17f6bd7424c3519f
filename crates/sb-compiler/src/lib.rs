//! ShieldBlock Filter List Compiler
//!
//! This crate parses Adblock Plus filter lists, builds the candidate index
//! used by `sb-core` and writes it out as an SBX snapshot.

pub mod builder;
pub mod parser;
pub mod reload;

pub use builder::{build_index, compile_filter_lists, serialize_index, IndexBuilder};
pub use parser::{parse_filter_list, parse_line, ParsedList, Rejected};
pub use reload::{rebuild, reload_snapshot, ReloadError};
