mod error;

use crate::error::{ErrorKind, Result};
use clap::{Parser, Subcommand};
use exn::ResultExt;
use memorix_config::Config;
use memorix_media::{Extractor, MediaRecord, RecordStore, Scanner, ingest};
use memorix_storage::Dispatcher;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "memorix", version, about = "Scan media libraries and upload files to storage targets")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON) layered over the user configuration.
    #[arg(short, long, global = true, env = "MEMORIX_CONFIG")]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan a directory (or a single file) and print one JSON record per line.
    Scan { root: PathBuf },
    /// Upload a file to a configured storage target.
    Upload {
        file: PathBuf,
        /// Name of the `[storage.<name>]` target.
        #[arg(short, long)]
        target: String,
        /// Destination name relative to the target's base path. Defaults to
        /// the file's own name.
        #[arg(short, long)]
        name: Option<String>,
    },
}

/// Writes each record as a line of JSON.
struct JsonLines<W: Write> {
    writer: W,
}

impl<W: Write> RecordStore for JsonLines<W> {
    fn save(&mut self, record: &MediaRecord) -> memorix_media::error::Result<()> {
        let store_error = || memorix_media::error::ErrorKind::Store(record.path.clone());
        serde_json::to_writer(&mut self.writer, record).or_raise(store_error)?;
        self.writer.write_all(b"\n").or_raise(store_error)?;
        Ok(())
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn scan(config: &Config, root: PathBuf) -> Result<()> {
    let mut extractor = Extractor::new().with_probe_timeout(config.scan.probe_timeout());
    if let Some(ffprobe) = &config.scan.ffprobe {
        extractor = extractor.with_ffprobe(ffprobe);
    }
    let scanner = Scanner::new(extractor);
    let mut store = JsonLines {
        writer: std::io::stdout().lock(),
    };
    let report = ingest(&scanner, &root, &mut store).or_raise(|| ErrorKind::Scan)?;
    tracing::info!(
        records = report.saved,
        warnings = report.warnings.len(),
        failures = report.failures.len(),
        "Scanned {}",
        root.display()
    );
    Ok(())
}

fn destination_name(file: &Path, name: Option<String>) -> Result<String> {
    match name {
        Some(name) => Ok(name),
        None => match file.file_name() {
            Some(name) => Ok(name.to_string_lossy().into_owned()),
            None => exn::bail!(ErrorKind::Input(file.display().to_string())),
        },
    }
}

async fn upload(config: &Config, file: PathBuf, target: &str, name: Option<String>) -> Result<()> {
    let target = config.storage(target).or_raise(|| ErrorKind::Config)?;
    let name = destination_name(&file, name)?;
    let source = tokio::fs::File::open(&file)
        .await
        .or_raise(|| ErrorKind::Input(file.display().to_string()))?;
    let written = Dispatcher::new()
        .dispatch(Box::new(source), &name, target)
        .await
        .or_raise(|| ErrorKind::Upload)?;
    tracing::info!(storage = %target.name, destination = %name, bytes = written, "Uploaded {}", file.display());
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    match cli.command {
        Command::Scan { root } => {
            // Scanning is blocking filesystem work.
            tokio::task::spawn_blocking(move || scan(&config, root))
                .await
                .or_raise(|| ErrorKind::Task)?
        },
        Command::Upload { file, target, name } => upload(&config, file, &target, name).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memorix_media::{MediaMetadata, PhotoMetadata};

    #[test]
    fn test_cli_parses_upload() {
        let cli = Cli::try_parse_from(["memorix", "-vv", "upload", "a.jpg", "--target", "nas", "--name", "2024/a.jpg"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        let Command::Upload { file, target, name } = cli.command else {
            panic!("expected upload command");
        };
        assert_eq!(file, PathBuf::from("a.jpg"));
        assert_eq!(target, "nas");
        assert_eq!(name.as_deref(), Some("2024/a.jpg"));
    }

    #[test]
    fn test_cli_requires_target() {
        assert!(Cli::try_parse_from(["memorix", "upload", "a.jpg"]).is_err());
    }

    #[test]
    fn test_destination_name_defaults_to_file_name() {
        assert_eq!(destination_name(Path::new("/photos/a.jpg"), None).unwrap(), "a.jpg");
        assert_eq!(destination_name(Path::new("a.jpg"), Some("x/b.jpg".to_string())).unwrap(), "x/b.jpg");
        assert!(destination_name(Path::new("/"), None).is_err());
    }

    #[test]
    fn test_json_lines_store() {
        let record = MediaRecord {
            name: "a.jpg".to_string(),
            path: PathBuf::from("/photos/a.jpg"),
            size: 3,
            modified: time::OffsetDateTime::UNIX_EPOCH,
            created: None,
            metadata: MediaMetadata::Photo(PhotoMetadata::default()),
        };
        let mut store = JsonLines { writer: Vec::new() };
        store.save(&record).unwrap();
        store.save(&record).unwrap();
        let output = String::from_utf8(store.writer).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: MediaRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, record);
    }
}
