/// # remd CLI Interface (Module)
///
/// Command parsing, credential lookup, cancellation wiring and output writing
/// for the `remd` binary.
///
/// All conversion logic lives in the [`remd-core`] crate; this module only
/// translates flags, environment and the optional config file into a
/// [`ConvertRequest`] and decides where the document goes.
///
/// ## How To Use
/// - Command line: `remd convert <URL> [--filter ...] [--output FILE | --output-dir DIR]`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`remd-core`]: ../../remd-core/
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remd_core::cancel::CancellationToken;
use remd_core::config::ConvertOptions;
use remd_core::contract::{ConversionReport, Credential, HostKind, Progress};
use remd_core::convert::{convert, ConvertRequest};
use remd_core::error::ConvertError;
use remd_core::url_parser;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const GITHUB_TOKEN_VAR: &str = "GITHUB_TOKEN";
pub const AZURE_DEVOPS_PAT_VAR: &str = "AZURE_DEVOPS_PAT";

/// Exit status for a run stopped by Ctrl+C.
pub const EXIT_CANCELLED: u8 = 130;

/// CLI for remd: turn a remote repository into one Markdown document.
#[derive(Parser, Debug)]
#[clap(
    name = "remd",
    version,
    about = "Convert a GitHub or Azure DevOps repository into a single Markdown document"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Convert one repository, writing the document to stdout or a file
    Convert {
        /// Repository URL, e.g. https://github.com/owner/repo or
        /// https://dev.azure.com/org/project/_git/repo
        url: String,
        /// Comma-separated regular expressions; a file is kept when any matches its path
        #[clap(long)]
        filter: Option<String>,
        /// Skip files larger than this many bytes (0 disables the limit)
        #[clap(long)]
        max_file_size: Option<u64>,
        /// Access token; defaults to $GITHUB_TOKEN or $AZURE_DEVOPS_PAT depending on the host
        #[clap(long)]
        token: Option<String>,
        /// Optional YAML file with defaults for filter, max_file_size and output_dir
        #[clap(long)]
        config: Option<PathBuf>,
        /// Write the document to this file
        #[clap(long, conflicts_with = "output_dir")]
        output: Option<PathBuf>,
        /// Write the document to {owner}_{repo}.md inside this directory
        #[clap(long)]
        output_dir: Option<PathBuf>,
        /// Print the conversion report as JSON on stderr
        #[clap(long)]
        report_json: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Convert {
            url,
            filter,
            max_file_size,
            token,
            config,
            output,
            output_dir,
            report_json,
        } => {
            let config = match config {
                Some(path) => load_config(path)?,
                None => CliConfig::default(),
            };
            let defaults = ConvertOptions::default();
            let options = ConvertOptions {
                filter: filter
                    .or(config.convert.filter)
                    .unwrap_or(defaults.filter),
                max_file_size: max_file_size
                    .or(config.convert.max_file_size)
                    .unwrap_or(defaults.max_file_size),
            };
            let request = ConvertRequest {
                credential: resolve_credential(token, &url),
                url,
                options,
            };
            info!(
                command = "convert",
                url = %request.url,
                authenticated = request.credential.is_some(),
                "Starting conversion"
            );

            let cancel = CancellationToken::new();
            let interrupt = cancel.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, cancelling conversion");
                    interrupt.cancel();
                }
            });

            let result = convert(&request, report_progress, &cancel).await;
            watcher.abort();
            let report = result?;

            for skipped in &report.files_skipped {
                warn!(path = %skipped.path, reason = %skipped.reason, "Skipped file");
            }
            info!(
                command = "convert",
                repository = %report.repository,
                reference = %report.reference,
                total = report.files_total,
                included = report.files_included,
                skipped = report.files_skipped.len(),
                "Conversion complete"
            );

            write_document(&report, output, output_dir.or(config.convert.output_dir))?;
            if report_json {
                eprintln!("{}", serde_json::to_string_pretty(&report)?);
            }
            Ok(())
        }
    }
}

/// Process exit status for a failed run: 130 for cancellation, 1 otherwise.
pub fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<ConvertError>() {
        Some(e) if e.is_cancelled() => EXIT_CANCELLED,
        _ => 1,
    }
}

/// `--token` wins; otherwise the host's environment variable. Blank values mean anonymous.
pub fn resolve_credential(flag: Option<String>, url: &str) -> Option<Credential> {
    if let Some(token) = flag {
        return Credential::new(token);
    }
    let var = match url_parser::parse(url).map(|r| r.host) {
        Ok(HostKind::AzureDevOps) => AZURE_DEVOPS_PAT_VAR,
        _ => GITHUB_TOKEN_VAR,
    };
    std::env::var(var).ok().and_then(Credential::new)
}

/// `owner/repo` → `owner_repo.md`.
pub fn output_file_name(repository: &str) -> String {
    format!("{}.md", repository.replace('/', "_"))
}

fn report_progress(progress: Progress) {
    info!(
        completed = progress.completed,
        total = progress.total,
        path = %progress.path,
        "[FETCH] Progress"
    );
}

fn write_document(
    report: &ConversionReport,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    match (output, output_dir) {
        (Some(path), _) => write_file(&path, &report.document),
        (None, Some(dir)) => {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create output directory {dir:?}"))?;
            write_file(&dir.join(output_file_name(&report.repository)), &report.document)
        }
        (None, None) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(report.document.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

fn write_file(path: &Path, document: &str) -> Result<()> {
    std::fs::write(path, document)
        .with_context(|| format!("Failed to write document to {path:?}"))?;
    info!(path = ?path, bytes = document.len(), "Document written");
    Ok(())
}
