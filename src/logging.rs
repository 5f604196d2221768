use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

const LOG_DIR_NAME: &str = "imgcull";
const LOG_FILE_NAME: &str = "imgcull.log";
const BOOTSTRAP_LEVEL: &str = "info";

pub enum LogTarget {
    Stderr,
    /// Needed while the terminal UI owns the screen.
    File(PathBuf),
}

pub fn default_log_file() -> Result<PathBuf> {
    let cache_dir = dirs::cache_dir().context("No cache dir found")?;
    Ok(cache_dir.join(LOG_DIR_NAME).join(LOG_FILE_NAME))
}

/// Call once near the start of `main`. `RUST_LOG` wins over `level`.
/// Keep the returned guard alive until exit or buffered file lines are lost.
pub fn init(level: &str, target: LogTarget) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{}'", level))?,
    };

    match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .try_init()
                .map_err(|e| anyhow!("Failed to install logger: {}", e))?;
            Ok(None)
        }
        LogTarget::File(path) => {
            let dir = path.parent().unwrap_or(Path::new("."));
            fs::create_dir_all(dir).with_context(|| format!("Cannot create log dir {:?}", dir))?;
            let file_name = path.file_name().map(|s| s.to_os_string()).unwrap_or_else(|| LOG_FILE_NAME.into());

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow!("Failed to install logger: {}", e))?;
            Ok(Some(guard))
        }
    }
}

/// Runs `f` under a temporary stderr logger. For work that happens before
/// `init` can be called, such as loading the config that names the level.
pub fn with_bootstrap<T>(f: impl FnOnce() -> T) -> T {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(BOOTSTRAP_LEVEL));
    with_writer(filter, std::io::stderr, f)
}

fn with_writer<W, T>(filter: EnvFilter, writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false)
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use crate::config::Config;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_config_creation_is_logged_before_init() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imgcull.conf");
        let capture = Capture::default();

        let cfg = with_writer(EnvFilter::new("info"), capture.clone(), || Config::load_from(&path)).unwrap();
        assert_eq!(cfg, Config::default());

        let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("creating new one"), "Nothing logged: {:?}", text);
    }
}
