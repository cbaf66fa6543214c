use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;

/// Resolve the data directory for hush files (`hush.db`, `hush.key`).
///
/// Priority:
/// 1. an explicit path (CLI flag)
/// 2. `HUSH_DATA_DIR` environment variable
/// 3. Platform-specific app data dir (`~/.local/share/hush/`, etc.)
pub fn data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    let path = match explicit {
        Some(p) => p.to_owned(),
        None => match std::env::var("HUSH_DATA_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => ProjectDirs::from("", "", "hush")
                .context("could not determine platform data directory")?
                .data_dir()
                .to_owned(),
        },
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("create data dir: {}", path.display()))?;
    Ok(path)
}
