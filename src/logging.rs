use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "install.log";

/// Sends `tracing` output to `<dir>/install.log` (level from `RUST_LOG`,
/// `info` by default). Falls back to warnings on stderr when the file
/// cannot be created. Returns the log file path either way so errors can
/// point at it.
pub fn init(dir: &Path) -> PathBuf {
    let path = dir.join(LOG_FILE);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match open_log(dir, &path) {
        Ok(file) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file))
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::new("warn"))
                .with_writer(std::io::stderr)
                .try_init();
            tracing::warn!(path = %path.display(), error = %e, "log file unavailable, logging to stderr");
        }
    }
    path
}

fn open_log(dir: &Path, path: &Path) -> std::io::Result<File> {
    fs::create_dir_all(dir)?;
    fs::OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_created_in_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("archinstall");
        let file = open_log(&nested, &nested.join(LOG_FILE)).unwrap();
        drop(file);
        assert!(nested.join(LOG_FILE).is_file());
    }
}
