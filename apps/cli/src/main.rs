//! capystore command-line client entry point.

mod config;
mod history;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use capystore_uploader::{HttpStorageClient, StaticIdentity, UploadPipeline};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::CliConfig;
use crate::history::JsonlHistory;

#[derive(Debug, Parser)]
#[command(name = "capystore", version, about = "Upload files and directories to capystore")]
struct Cli {
    /// Configuration file (defaults to the platform config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the API base URL from the configuration.
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Enables debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Uploads a file or directory and prints its content hash.
    Upload {
        path: PathBuf,

        /// Asks the service to import the uploaded archive as a directory.
        #[arg(long)]
        import_as_archive: bool,

        /// Disables the progress bar.
        #[arg(long)]
        no_progress: bool,
    },
    /// Lists recent uploads, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Prints the effective configuration.
    Config,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config_path = match cli.config {
        Some(p) => p,
        None => config::config_path()?,
    };
    let mut cfg = CliConfig::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if cfg.ensure_uid() {
        cfg.save_to(&config_path)?;
        tracing::info!(path = %config_path.display(), "generated user id");
    }
    if let Some(url) = cli.api_url {
        cfg.api_url = url;
    }

    match cli.command {
        Command::Upload {
            path,
            import_as_archive,
            no_progress,
        } => upload(&cfg, &config_path, path, import_as_archive, no_progress).await,
        Command::History { limit } => {
            let history = JsonlHistory::new(config::history_path(&config_path));
            for entry in history.read_recent(limit)? {
                let r = &entry.record;
                println!(
                    "{}  {}  {}{}  {} bytes{}",
                    entry.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
                    r.content_hash,
                    r.name,
                    if r.is_directory { "/" } else { "" },
                    r.size,
                    r.short_url
                        .as_deref()
                        .map(|u| format!("  {u}"))
                        .unwrap_or_default(),
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            println!("# {}", config_path.display());
            print!("{}", toml::to_string_pretty(&cfg)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn upload(
    cfg: &CliConfig,
    config_path: &std::path::Path,
    path: PathBuf,
    import_as_archive: bool,
    no_progress: bool,
) -> anyhow::Result<ExitCode> {
    let upload_config = cfg.upload_config();
    let client = HttpStorageClient::new(&cfg.api_url, upload_config.request_timeout)
        .context("building HTTP client")?;
    let history = JsonlHistory::new(config::history_path(config_path));

    let mut pipeline = UploadPipeline::new(
        Arc::new(client),
        Arc::new(StaticIdentity::new(cfg.uid.clone())),
        upload_config,
    )
    .with_history(Arc::new(history));

    let events = pipeline
        .take_events()
        .context("pipeline events already taken")?;
    let renderer = tokio::spawn(progress::render(events, no_progress));

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling upload");
            cancel.cancel();
        }
    });

    let result = pipeline.upload(&path, import_as_archive).await;
    // Closes the event channel so the renderer stops even without a terminal event.
    drop(pipeline);
    let _ = renderer.await;

    match result {
        Some(result) => {
            println!("{}", result.content_hash);
            if let Some(url) = result.short_url {
                println!("{url}");
            }
            Ok(ExitCode::SUCCESS)
        }
        None => Ok(ExitCode::FAILURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload() {
        let cli = Cli::try_parse_from([
            "capystore",
            "--api-url",
            "http://h/api",
            "upload",
            "site",
            "--import-as-archive",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://h/api"));
        match cli.command {
            Command::Upload {
                path,
                import_as_archive,
                no_progress,
            } => {
                assert_eq!(path, PathBuf::from("site"));
                assert!(import_as_archive);
                assert!(!no_progress);
            }
            other => panic!("expected Upload, got {other:?}"),
        }
    }

    #[test]
    fn history_limit_default() {
        let cli = Cli::try_parse_from(["capystore", "history"]).unwrap();
        assert!(matches!(cli.command, Command::History { limit: 20 }));
    }

    #[test]
    fn upload_requires_path() {
        assert!(Cli::try_parse_from(["capystore", "upload"]).is_err());
    }
}
