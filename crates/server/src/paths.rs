//! Central path resolution for viewdeck data files.
//!
//! Resolved once at startup from: CLI `--data-dir` > `VIEWDECK_DATA_DIR` env > `~/.viewdeck`.
//! All callsites use these helpers instead of constructing paths from `HOME`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

static DATA_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Initialize the global data directory. Returns the resolved path.
///
/// Priority: `explicit` arg > `VIEWDECK_DATA_DIR` env > `~/.viewdeck` default.
pub fn init_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    let dir = if let Some(p) = explicit {
        p.to_path_buf()
    } else if let Ok(env_val) = std::env::var("VIEWDECK_DATA_DIR") {
        PathBuf::from(env_val)
    } else {
        dirs::home_dir()
            .ok_or_else(|| anyhow::anyhow!("HOME directory not found; pass --data-dir"))?
            .join(".viewdeck")
    };

    let mut guard = DATA_DIR.write().unwrap_or_else(PoisonError::into_inner);
    *guard = Some(dir.clone());
    Ok(dir)
}

/// Return the current data directory, or `None` before `init_data_dir`.
pub fn data_dir() -> Option<PathBuf> {
    DATA_DIR
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

fn resolved() -> io::Result<PathBuf> {
    data_dir().ok_or_else(|| io::Error::other("data dir used before init_data_dir()"))
}

pub fn db_path() -> io::Result<PathBuf> {
    Ok(resolved()?.join("viewdeck.db"))
}

pub fn log_dir() -> io::Result<PathBuf> {
    Ok(resolved()?.join("logs"))
}

/// Create all required subdirectories under the data dir.
pub fn ensure_dirs() -> io::Result<()> {
    let base = resolved()?;
    std::fs::create_dir_all(&base)?;
    std::fs::create_dir_all(base.join("logs"))?;
    Ok(())
}
