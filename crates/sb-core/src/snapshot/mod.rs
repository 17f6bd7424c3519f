//! SBX snapshot format and loader
//!
//! The writer lives in the compiler crate; this side only decodes.

mod format;
mod loader;

pub use format::*;
pub use loader::*;
