//! Tool catalog and role-based capability control.
//!
//! - `ToolCatalog`: every tool the broker can run, keyed by dot-namespaced name
//! - `RoleCapabilityMap`: which of those tools each agent role may call
//! - `files`: the sandboxed file service and its built-in `files.*` tools

mod catalog;
mod descriptor;
pub mod files;
mod roles;
pub mod scanner;

pub use catalog::*;
pub use descriptor::*;
pub use files::{register_file_tools, FileService, PROJECT_ROOT_ENV};
pub use roles::*;
pub use scanner::{LexicalScanner, OutlineEntry, ScannerRegistry, SymbolKind};
