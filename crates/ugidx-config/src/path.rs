//! Path helpers shared by the binary and the indexer.

use std::path::{Path, PathBuf};

/// Directory name used for global and project configuration.
pub const CONFIG_DIR: &str = ".ugidx";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// Global config path: ~/.ugidx/config.toml
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Project config path: .ugidx/config.toml relative to the working directory
pub fn project_config_path() -> PathBuf {
    Path::new(CONFIG_DIR).join(CONFIG_FILE)
}

/// Normalize path, falling back to the original if canonicalization fails.
///
/// This is useful when the path might not exist and that's acceptable.
pub fn normalize_or_original(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Render `target` relative to `base` for log and report lines.
///
/// Returns `.` for the base itself and the unchanged target when it lies
/// outside `base`.
pub fn display_relative(base: impl AsRef<Path>, target: impl AsRef<Path>) -> PathBuf {
    let target = target.as_ref();
    match target.strip_prefix(base.as_ref()) {
        Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
        Ok(rel) => rel.to_path_buf(),
        Err(_) => target.to_path_buf(),
    }
}
