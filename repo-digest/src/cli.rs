/// # repo-digest CLI Interface (Module)
///
/// This module implements the CLI for repo-digest: command parsing, argument validation and
/// the async entrypoint shared by `main` and the integration tests.
///
/// All pipeline logic lives in the [`repo-digest-core`] crate. This module is strictly CLI glue.
///
/// ## Features
/// - [`Cli`] defines the user-facing options and subcommands.
/// - `run` downloads, extracts and serializes every configured repository.
/// - `serialize` turns one local directory into a document.
///
/// [`repo-digest-core`]: ../../repo-digest-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use repo_digest_core::contract::{RepositoryLister, StaticLister};
use repo_digest_core::document;
use repo_digest_core::pipeline::{self, PipelineReport, RepositoryFailure};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// CLI for repo-digest: flatten a user's repositories into context documents.
#[derive(Parser)]
#[clap(
    name = "repo-digest",
    version,
    about = "Download a user's repositories and flatten each into a single context document"
)]
pub struct Cli {
    /// Log at debug level
    #[clap(long, short, global = true)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download, extract and serialize every repository in the config file
    Run {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Override the number of concurrent downloads
        #[clap(long)]
        concurrency: Option<usize>,
        /// Print the summary as JSON
        #[clap(long)]
        json: bool,
    },
    /// Serialize one local project directory into a document
    Serialize {
        /// Project directory to walk
        #[clap(long)]
        root: PathBuf,
        /// Where to write the document
        #[clap(long)]
        output: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct RunSummary<'a> {
    documents: Vec<PathBuf>,
    failures: &'a [RepositoryFailure],
}

impl<'a> RunSummary<'a> {
    fn new(report: &'a PipelineReport, scope: &Path) -> Self {
        Self {
            documents: report
                .documents
                .iter()
                .map(|d| scope.join(format!("{}.md", d.name)))
                .collect(),
            failures: &report.failures,
        }
    }
}

/// Async CLI entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Run {
            config,
            concurrency,
            json,
        } => {
            let file = load_config(&config)?;
            let mut pipeline_config = file.pipeline_config();
            if let Some(concurrency) = concurrency {
                pipeline_config.concurrency = concurrency;
            }
            pipeline_config
                .validate()
                .context("Invalid command line override")?;
            pipeline_config.trace_loaded();

            let lister = StaticLister::new(&file.download.user, file.download.repositories.clone());
            let references = lister
                .list_repositories(&file.download.user, file.download.visibility)
                .await
                .context("Failed to list repositories")?;
            tracing::info!(command = "run", repositories = references.len(), "Starting digest");

            let report = pipeline::run_config(&pipeline_config, &references).await?;
            let scope = pipeline_config.user_scope_dir();
            let summary = RunSummary::new(&report, &scope);

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!(
                    "Digest complete: {} documents, {} failed.",
                    summary.documents.len(),
                    summary.failures.len()
                );
                for path in &summary.documents {
                    println!("  {}", path.display());
                }
                for failure in summary.failures {
                    println!(
                        "  [FAILED] {} ({}): {}",
                        failure.name, failure.stage, failure.reason
                    );
                }
            }
            tracing::info!(
                command = "run",
                completed = report.documents.len(),
                failed = report.failures.len(),
                "Digest complete"
            );
            Ok(())
        }
        Commands::Serialize { root, output } => {
            let document = document::serialize(&root, &output)
                .with_context(|| format!("Failed to serialize {}", root.display()))?;
            println!(
                "Wrote {} ({} text files embedded, {} assets skipped).",
                output.display(),
                document.embedded_files,
                document.skipped_assets
            );
            Ok(())
        }
    }
}
