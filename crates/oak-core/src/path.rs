use std::path::PathBuf;

use crate::{Error, Result};

/// Resolve the daemon's workspace directory, which holds the relational
/// store file and the vector store subtree:
/// 1. Explicit path (with tilde expansion)
/// 2. `OAK_PATH` environment variable (with tilde expansion)
/// 3. System data directory (recommended default)
/// 4. `~/.oak-ci` (fallback for systems without a standard data directory)
pub fn resolve_workspace_path(explicit_path: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        return Ok(expand_tilde(path));
    }

    if let Ok(env_path) = std::env::var("OAK_PATH") {
        return Ok(expand_tilde(&env_path));
    }

    if let Some(data_dir) = dirs::data_dir() {
        return Ok(data_dir.join("oak-ci"));
    }

    if let Some(home) = std::env::var_os("HOME") {
        return Ok(PathBuf::from(home).join(".oak-ci"));
    }

    Err(Error::Config(
        "could not determine workspace path: no HOME directory or system data directory found"
            .to_string(),
    ))
}

/// The vector store lives under `<workspace>/vectors`, one subtree per
/// collection.
pub fn vector_store_dir(workspace: &std::path::Path) -> PathBuf {
    workspace.join("vectors")
}

/// Backups are named `<machine_id>.sql` and live under a directory that can
/// be overridden by `OAK_BACKUP_DIR`, falling back to `<workspace>/backups`.
pub fn backup_dir(workspace: &std::path::Path) -> PathBuf {
    if let Ok(env_dir) = std::env::var("OAK_BACKUP_DIR") {
        return expand_tilde(&env_dir);
    }
    workspace.join("backups")
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(stripped);
    }
    PathBuf::from(path)
}

/// Discover the project root a hook event belongs to:
/// 1. explicit_project_root (passed on the hook payload)
/// 2. `OAK_PROJECT_ROOT` environment variable
/// 3. Current working directory
pub fn discover_project_root(explicit_project_root: Option<&str>) -> Result<PathBuf> {
    if let Some(root) = explicit_project_root {
        return Ok(PathBuf::from(root));
    }

    if let Ok(env_root) = std::env::var("OAK_PROJECT_ROOT") {
        return Ok(PathBuf::from(env_root));
    }

    Ok(std::env::current_dir()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_substitutes_home() {
        unsafe {
            std::env::set_var("HOME", "/home/tester");
        }
        assert_eq!(expand_tilde("~/oak"), PathBuf::from("/home/tester/oak"));
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
    }

    #[test]
    fn explicit_path_wins_over_env() {
        unsafe {
            std::env::set_var("OAK_PATH", "/env/path");
        }
        let resolved = resolve_workspace_path(Some("/explicit/path")).unwrap();
        unsafe {
            std::env::remove_var("OAK_PATH");
        }
        assert_eq!(resolved, PathBuf::from("/explicit/path"));
    }

    #[test]
    fn vector_store_dir_nests_under_workspace() {
        let ws = PathBuf::from("/tmp/oak-ws");
        assert_eq!(vector_store_dir(&ws), PathBuf::from("/tmp/oak-ws/vectors"));
    }

    #[test]
    fn backup_dir_defaults_under_workspace() {
        unsafe {
            std::env::remove_var("OAK_BACKUP_DIR");
        }
        let ws = PathBuf::from("/tmp/oak-ws");
        assert_eq!(backup_dir(&ws), PathBuf::from("/tmp/oak-ws/backups"));
    }

    #[test]
    fn discover_project_root_explicit_wins() {
        let result = discover_project_root(Some("/explicit/project")).unwrap();
        assert_eq!(result, PathBuf::from("/explicit/project"));
    }
}
