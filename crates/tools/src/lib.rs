//! Built-in tool implementations for Ancient.
//!
//! Tools give the agent the ability to interact with the workspace it was
//! started in. Relative paths resolve against the invocation's working
//! directory.

pub mod file_read;
pub mod file_write;

use std::path::{Path, PathBuf};

use ancient_core::tool::ToolRegistry;

/// Create a default tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(file_read::FileReadTool::new()));
    registry.register(Box::new(file_write::FileWriteTool::new()));
    registry
}

/// Resolve a tool path argument against the working directory.
pub(crate) fn resolve_path(cwd: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
