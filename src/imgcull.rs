use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use tracing::info;

use imgcull::config::Config;
use imgcull::cull::{self, trasher_for};
use imgcull::logging::{self, LogTarget};
use imgcull::record::format_size;
use imgcull::scanner;
use imgcull::state::Session;
use imgcull::ui::TuiApp;

// --- CLI Definition ---

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
enum ProcessMode {
    /// Keep the selected images, trash the rest
    Keep,
    /// Trash the selected images
    Trash,
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Steps through a directory of images and culls them.", long_about = None)]
struct Cli {
    /// Directory to scan
    #[arg(required_unless_present = "about")]
    dir: Option<PathBuf>,

    /// Print the sorted scan instead of opening the viewer
    #[arg(long)]
    list: bool,

    /// Apply a process action without the viewer. With no --select,
    /// `keep` trashes every image and `trash` trashes none
    #[arg(long, value_enum)]
    process: Option<ProcessMode>,

    /// 1-based indices (as printed by --list) to select before processing
    #[arg(long, num_args = 1.., value_name = "N", requires = "process")]
    select: Vec<usize>,

    /// Delete files instead of moving them to the trash
    #[arg(long)]
    permanent: bool,

    /// Worker threads for decoding and trashing
    #[arg(long)]
    threads: Option<usize>,

    /// Print version, git hash and linked crates
    #[arg(long)]
    about: bool,
}

impl Cli {
    fn validate(&self) -> Result<(), String> {
        if self.list && self.process.is_some() {
            return Err("--list and --process cannot be combined.".to_string());
        }
        if let Some(0) = self.threads {
            return Err("--threads must be at least 1.".to_string());
        }
        if self.select.contains(&0) {
            return Err("--select indices start at 1.".to_string());
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct DepInfo {
    name: String,
    version: String,
}

fn print_about() -> Result<()> {
    println!("{} v{} ({})", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), env!("APP_GIT_HASH"));
    let deps: Vec<DepInfo> = serde_json::from_str(include_str!(env!("DEPS_INFO_PATH")))
        .context("Embedded dependency list is corrupt")?;
    println!("\nLinked crates ({}):", deps.len());
    for dep in deps {
        println!("  {} {}", dep.name, dep.version);
    }
    Ok(())
}

fn list(dir: &Path, config: &Config) -> Result<()> {
    let records = scanner::scan_with(dir, &config.scan, None)?;
    for (i, rec) in records.iter().enumerate() {
        let shown = rec.path.strip_prefix(dir).unwrap_or(&rec.path);
        println!(
            "{:>5}  {:>9}  {:>11}  {}  {}",
            i + 1,
            format_size(rec.bytes),
            format!("{}x{}", rec.dimensions.0, rec.dimensions.1),
            rec.modified.format("%Y-%m-%d %H:%M"),
            shown.display()
        );
    }
    println!("\n{} images.", records.len());
    Ok(())
}

fn process(dir: &Path, config: &Config, mode: ProcessMode, select: &[usize]) -> Result<bool> {
    let mut records = scanner::scan_with(dir, &config.scan, None)?;
    if records.is_empty() {
        println!("No images were found in the selected directory.");
        return Ok(true);
    }
    for &n in select {
        let Some(rec) = records.get_mut(n - 1) else {
            bail!("Index {} is out of range (1-{})", n, records.len());
        };
        rec.selected = true;
    }

    let trasher = trasher_for(config.cull.use_trash);
    let report = cull::process(&mut records, mode == ProcessMode::Keep, trasher.as_ref());

    println!("Successfully {} {} files.", trasher.verb(), report.moved);
    for e in &report.errors {
        eprintln!("Error: {}", e);
    }
    if report.remaining == 0 {
        println!("{}", trasher.all_gone_message());
    } else {
        println!("{} images remain.", report.remaining);
    }
    Ok(report.errors.is_empty())
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if args.about {
        return print_about();
    }
    let Some(dir) = args.dir.clone() else {
        bail!("No directory given");
    };

    let mut config = logging::with_bootstrap(Config::load)?;
    if args.permanent {
        config.cull.use_trash = false;
    }
    if args.threads.is_some() {
        config.workers.threads = args.threads;
    }

    let use_tui = !args.list && args.process.is_none();
    let target = if use_tui {
        match &config.logging.file {
            Some(path) => LogTarget::File(path.clone()),
            None => LogTarget::File(logging::default_log_file()?),
        }
    } else {
        LogTarget::Stderr
    };
    let _guard = logging::init(&config.logging.level, target)?;
    info!("Starting {} v{} on {:?}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), dir);

    if args.list {
        return list(&dir, &config);
    }
    if let Some(mode) = args.process {
        if !process(&dir, &config, mode, &args.select)? {
            std::process::exit(1);
        }
        return Ok(());
    }

    let session = Session::new(dir, &config, trasher_for(config.cull.use_trash))
        .context("Failed to start worker threads")?;
    let mut app = TuiApp::new(session);
    app.run().context("Terminal UI failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_process_without_select_is_accepted() {
        let args = Cli::try_parse_from(["imgcull", "/pics", "--process", "keep"]).unwrap();
        assert_eq!(args.process, Some(ProcessMode::Keep));
        assert!(args.select.is_empty());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_select_needs_process() {
        assert!(Cli::try_parse_from(["imgcull", "/pics", "--select", "1"]).is_err());
        let args = Cli::try_parse_from(["imgcull", "/pics", "--process", "trash", "--select", "0"]).unwrap();
        assert!(args.validate().is_err(), "Indices are 1-based");
    }
}
