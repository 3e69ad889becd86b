//! COE Import CLI - preview and commit course offering, course mapping and exam registration files
//!
//! # Main Commands
//!
//! ```bash
//! coe-import serve                                  # Start HTTP server (port 3001)
//! coe-import preview offerings.xlsx                 # Resolve and validate, print preview JSON
//! coe-import import offerings.xlsx --commit         # Preview, then save the valid rows
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! coe-import parse offerings.csv                    # Just parse the file to JSON rows
//! ```

use clap::{Args, Parser, Subcommand};
use coe_import::{
    parse_file, preview_file, Committer, ImportKind, MyJkknClient, PipelineError, PreviewReport,
    ReferenceCache, RestBackend, Settings,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "coe-import")]
#[command(about = "Bulk import course offerings, course mappings and exam registrations", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Overrides for values otherwise read from the environment.
#[derive(Args)]
struct ConnectionArgs {
    /// MyJKKN API base URL [env: MYJKKN_API_URL]
    #[arg(long, global = true)]
    myjkkn_url: Option<String>,

    /// MyJKKN API key [env: MYJKKN_API_KEY]
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// COE backend base URL [env: COE_API_URL]
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// Request timeout in seconds [env: COE_REQUEST_TIMEOUT_SECS]
    #[arg(long, global = true)]
    timeout: Option<u64>,
}

impl ConnectionArgs {
    fn settings(&self) -> Settings {
        let mut settings = Settings::from_env();
        if let Some(url) = &self.myjkkn_url {
            settings.myjkkn_api_url = url.clone();
        }
        if let Some(key) = &self.api_key {
            settings.myjkkn_api_key = Some(key.clone());
        }
        if let Some(url) = &self.backend_url {
            settings.coe_api_url = url.clone();
        }
        if let Some(secs) = self.timeout {
            settings.request_timeout = Duration::from_secs(secs);
        }
        settings
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse an import file and output its rows as JSON
    Parse {
        /// Input file (.xlsx, .xls, .csv, .json)
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Resolve and validate every row without saving anything
    Preview {
        /// Input file (.xlsx, .xls, .csv, .json)
        input: PathBuf,

        /// course-offering, course-mapping or exam-registration
        #[arg(short, long, default_value = "course-offering")]
        kind: ImportKind,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the preview table as CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },

    /// Preview a file, then save its valid rows
    Import {
        /// Input file (.xlsx, .xls, .csv, .json)
        input: PathBuf,

        /// course-offering, course-mapping or exam-registration
        #[arg(short, long, default_value = "course-offering")]
        kind: ImportKind,

        /// Actually save the valid rows (without it this is a dry run)
        #[arg(long)]
        commit: bool,

        /// Output file for the upload summary (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Start HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3001")]
        port: u16,
    },
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = cli.connection.settings();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),

        Commands::Preview {
            input,
            kind,
            output,
            csv,
        } => cmd_preview(&settings, &input, kind, output.as_deref(), csv).await,

        Commands::Import {
            input,
            kind,
            commit,
            output,
        } => cmd_import(&settings, &input, kind, commit, output.as_deref()).await,

        Commands::Serve { port } => coe_import::server::start_server(port, &settings).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> CliResult {
    eprintln!("📄 Parsing: {}", input.display());

    let result = parse_file(input)?;
    eprintln!("   Format: {:?}", result.format);
    if let Some(encoding) = &result.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    eprintln!("   Columns: {}", result.headers.join(", "));
    eprintln!("✅ Parsed {} rows", result.rows.len());

    let json = serde_json::to_string_pretty(&result.rows)?;
    write_output(&json, output)
}

async fn run_preview(
    settings: &Settings,
    input: &Path,
    kind: ImportKind,
) -> Result<(PreviewReport, Arc<RestBackend>), PipelineError> {
    let backend = Arc::new(RestBackend::from_settings(settings));
    let remote = Arc::new(MyJkknClient::from_settings(settings)?);
    let cache = ReferenceCache::new(remote, backend.clone());

    eprintln!("📄 Processing {}: {}", kind, input.display());
    let report = preview_file(&cache, input, kind).await?;
    print_preview_summary(&report);
    Ok((report, backend))
}

fn print_preview_summary(report: &PreviewReport) {
    eprintln!("\n✔️  Preview:");
    eprintln!("   ✅ Valid: {}", report.valid_count());
    if report.error_count() == 0 {
        return;
    }
    eprintln!("   ❌ Errors: {}", report.error_count());
    for outcome in report.outcomes.iter().filter(|o| !o.is_valid()).take(5) {
        eprintln!("\n   Row {}:", outcome.row_number());
        for err in outcome.errors().iter().take(3) {
            eprintln!("     - {}", err);
        }
    }
}

async fn cmd_preview(
    settings: &Settings,
    input: &Path,
    kind: ImportKind,
    output: Option<&Path>,
    csv: bool,
) -> CliResult {
    let (report, _) = run_preview(settings, input, kind).await?;

    let content = if csv {
        coe_import::pipeline::preview_csv_string(&report.outcomes)?
    } else {
        serde_json::to_string_pretty(&report.preview_rows())?
    };
    write_output(&content, output)
}

async fn cmd_import(
    settings: &Settings,
    input: &Path,
    kind: ImportKind,
    commit: bool,
    output: Option<&Path>,
) -> CliResult {
    let (report, backend) = run_preview(settings, input, kind).await?;

    if !commit {
        eprintln!("\nℹ️  Dry run: pass --commit to save {} valid row(s)", report.valid_count());
        return Ok(());
    }
    if report.valid_count() == 0 {
        return Err(PipelineError::NothingToCommit.into());
    }

    eprintln!("\n💾 Saving {} row(s) to {}", report.valid_count(), settings.coe_api_url);
    let summary = Committer::new(backend.as_ref(), kind)
        .commit(&report.outcomes)
        .await;

    eprintln!("\n📊 Results: {} saved, {} failed", summary.success, summary.failed);
    for err in summary.errors.iter().take(5) {
        eprintln!("   Row {} ({}): {}", err.row, err.label, err.message);
    }

    let json = serde_json::to_string_pretty(&summary)?;
    write_output(&json, output)?;

    if summary.failed > 0 {
        std::process::exit(1);
    }
    eprintln!("\n✨ Done!");
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> CliResult {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
