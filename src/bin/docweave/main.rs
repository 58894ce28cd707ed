//! docweave CLI tool
//!
//! Command-line interface for building and checking documentation projects.
//!
//! ## Commands
//!
//! - `build <source>`: build the project, writing web and/or single-document output
//! - `check <source>`: run every stage and report diagnostics without writing output
//!
//! ## Exit status
//!
//! - `0`: every volume built without diagnostics
//! - `1`: diagnostics were reported or a volume failed
//! - `2`: an unexpected fault aborted the build (bad configuration, unreadable dictionary,
//!   dependency cycle, ...)

use clap::{Parser, Subcommand};
use docweave::{
    build::Builder,
    render::{DocumentBackend, WebBackend},
    report::{BuildReport, TracingReporter},
    BuildError,
};
use std::{path::PathBuf, process::ExitCode};

#[derive(Parser)]
#[command(name = "docweave")]
#[command(author, version, about = "Build multi-format documentation with cross-page references and diagnostics", long_about = None)]
struct Cli {
    /// Run as if started in this directory
    #[arg(short = 'C', long = "directory", global = true)]
    directory: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a project and write its outputs
    Build {
        /// Project root (holding docweave.toml, or the pages themselves)
        #[arg(default_value = ".")]
        source: PathBuf,

        /// Output directory for one HTML file per page
        #[arg(long)]
        web: Option<PathBuf>,

        /// Output directory for one combined HTML document per volume
        #[arg(long)]
        document: Option<PathBuf>,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process a project and report diagnostics without writing anything
    Check {
        /// Project root (holding docweave.toml, or the pages themselves)
        #[arg(default_value = ".")]
        source: PathBuf,

        /// Print the build report as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(report) if report.is_success() && report.issue_count() == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(1),
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
    }
}

fn run(cli: Cli) -> Result<BuildReport, BuildError> {
    if let Some(directory) = cli.directory.as_ref() {
        std::env::set_current_dir(directory)?;
    }

    let (source, json, builder) = match cli.command {
        Commands::Build {
            source,
            web,
            document,
            json,
        } => {
            let mut builder = Builder::new().with_reporter(TracingReporter);
            if let Some(web) = web {
                builder = builder.with_target(WebBackend, web);
            }
            if let Some(document) = document {
                builder = builder.with_target(DocumentBackend, document);
            }
            if builder.targets().is_empty() {
                tracing::warn!("No output requested (--web / --document); only checking");
            }
            (source, json, builder)
        }
        Commands::Check { source, json } => {
            (source, json, Builder::new().with_reporter(TracingReporter))
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(async {
        let project = builder.load_project(&source)?;
        builder.build(project).await
    })?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{report}");
    }
    Ok(report)
}
