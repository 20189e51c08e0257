//! Astra CLI
//!
//! Evidence aggregation and composite risk scoring for emails, domains, URLs
//! and extracted image metadata.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use futures::stream::{self, StreamExt};
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use astra_core::{ExifBundle, ProvenanceStatus, Subject, SubjectReport};
use astra_runtime::{AstraConfig, Engine, ScanLog};
use astra_sources::describe_adapters;

#[derive(Parser)]
#[command(name = "astra")]
#[command(author, version, about = "Astra: evidence aggregation and composite risk scoring", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1", global = true)]
    verbose: u8,

    /// TOML config file with [engine], [sources] and [scoring] sections
    #[arg(short, long, env = "ASTRA_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Overall deadline per subject in milliseconds
    #[arg(long, global = true)]
    deadline_ms: Option<u64>,

    /// Timeout for each source in milliseconds
    #[arg(long, global = true)]
    source_timeout_ms: Option<u64>,

    /// Extra attempts on transient source failures
    #[arg(long, global = true)]
    retries: Option<u32>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Write the JSON report(s) to this file
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Investigate an email address, domain or URL
    Check {
        /// The value to investigate
        value: String,

        /// Treat the value as this kind instead of guessing
        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Score metadata already extracted from an image (exiftool -json output)
    Image {
        /// Path to the metadata JSON
        #[arg(short, long)]
        metadata: PathBuf,
    },

    /// Investigate one subject per line of a file
    Batch {
        /// Input file; blank lines and lines starting with # are skipped
        #[arg(short, long)]
        input: PathBuf,

        /// Subjects investigated at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },

    /// List shipped source adapters and whether they are registered
    Sources,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Email,
    Domain,
    Url,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = load_config(&cli)?;

    match &cli.command {
        Commands::Check { value, kind } => {
            let subject = parse_subject(value, *kind)?;
            let engine = Engine::from_config(&config)?;
            let report = engine.investigate(&subject).await;
            emit(&cli, std::slice::from_ref(&report), false)?;
        }
        Commands::Image { metadata } => {
            let raw = fs::read_to_string(metadata)
                .with_context(|| format!("Failed to read {}", metadata.display()))?;
            let bundle = ExifBundle::from_exiftool_json(&raw)
                .with_context(|| format!("{} is not exiftool JSON", metadata.display()))?;
            let engine = Engine::from_config(&config)?;
            let report = engine.investigate(&Subject::image_metadata(bundle)).await;
            emit(&cli, std::slice::from_ref(&report), false)?;
        }
        Commands::Batch { input, concurrency } => {
            run_batch(&cli, &config, input, *concurrency).await?;
        }
        Commands::Sources => {
            list_sources(&cli, &config)?;
        }
    }

    Ok(())
}

/// Config file (or defaults) overlaid with command-line flags
fn load_config(cli: &Cli) -> Result<AstraConfig> {
    let mut config = match &cli.config {
        Some(path) => AstraConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AstraConfig::default(),
    };

    if let Some(deadline_ms) = cli.deadline_ms {
        config.engine.deadline_ms = deadline_ms;
    }
    if let Some(source_timeout_ms) = cli.source_timeout_ms {
        config.engine.source_timeout_ms = source_timeout_ms;
    }
    if let Some(retries) = cli.retries {
        config.engine.retry.retries = retries;
    }

    config.validate()?;
    Ok(config)
}

fn parse_subject(value: &str, kind: Option<KindArg>) -> Result<Subject> {
    let subject = match kind {
        Some(KindArg::Email) => Subject::email(value)?,
        Some(KindArg::Domain) => Subject::domain(value)?,
        Some(KindArg::Url) => Subject::url(value)?,
        None => Subject::detect(value)?,
    };
    Ok(subject)
}

/// Parse a batch file, keeping line numbers of entries that did not parse
fn read_batch(content: &str) -> (Vec<Subject>, Vec<(usize, String)>) {
    let mut subjects = Vec::new();
    let mut rejected = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Subject::detect(line) {
            Ok(subject) => subjects.push(subject),
            Err(e) => rejected.push((idx + 1, e.to_string())),
        }
    }

    (subjects, rejected)
}

async fn run_batch(cli: &Cli, config: &AstraConfig, input: &Path, concurrency: usize) -> Result<()> {
    let content = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let (subjects, rejected) = read_batch(&content);

    for (line, reason) in &rejected {
        warn!("Skipping line {}: {}", line, reason);
    }
    if subjects.is_empty() {
        anyhow::bail!("No valid subjects in {}", input.display());
    }

    let engine = Engine::from_config(config)?;
    let engine = &engine;

    let reports: Vec<SubjectReport> = stream::iter(subjects)
        .map(|subject| async move { engine.investigate(&subject).await })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    emit(cli, &reports, true)?;

    if !cli.json {
        let mut log = ScanLog::new();
        for report in &reports {
            log.record(report);
        }
        println!("\n📊 Recent scans ({} of {}):", log.len(), reports.len());
        for entry in log.entries() {
            println!(
                "   {:<6} {:>3}/100  {} {}",
                entry.level.to_string(),
                entry.score,
                entry.subject_kind,
                entry.subject
            );
        }
        if !rejected.is_empty() {
            println!("⚠️  {} line(s) skipped", rejected.len());
        }
    }

    Ok(())
}

fn list_sources(cli: &Cli, config: &AstraConfig) -> Result<()> {
    let adapters = describe_adapters(&config.sources);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&adapters)?);
        return Ok(());
    }

    for adapter in &adapters {
        let status = if adapter.registered() {
            "✅"
        } else {
            "❌"
        };
        let accepts = adapter
            .accepts
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        println!("{} {:<14} {:<20} [{}]", status, adapter.id, adapter.name, accepts);
        if !adapter.configured {
            if let Some(key) = adapter.required_key {
                println!("   missing {}", key);
            }
        }
        if !adapter.enabled {
            println!("   disabled in config");
        }
    }

    Ok(())
}

/// JSON export: a batch is always an array, even with one subject
fn export_json(reports: &[SubjectReport], batch: bool) -> Result<String> {
    let json = match reports {
        [single] if !batch => single.to_json()?,
        many => serde_json::to_string_pretty(many)?,
    };
    Ok(json)
}

/// Print reports and write them to `--output` when given
fn emit(cli: &Cli, reports: &[SubjectReport], batch: bool) -> Result<()> {
    let json = export_json(reports, batch)?;

    if cli.json {
        println!("{}", json);
    } else {
        for report in reports {
            println!("{}", render(report));
        }
    }

    if let Some(path) = &cli.output {
        fs::write(path, &json)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !cli.json {
            println!("📄 Report saved to: {}", path.display());
        }
    }

    Ok(())
}

fn render(report: &SubjectReport) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\n🔍 {} ({})\n",
        report.subject, report.subject_kind
    ));
    out.push_str(&format!(
        "   Risk: {} ({}/100)\n",
        report.risk.level, report.risk.score
    ));
    if report.insufficient_data {
        out.push_str("   ⚠️  No source returned data\n");
    }

    out.push_str("\n   Recommendations:\n");
    for recommendation in &report.risk.recommendations {
        out.push_str(&format!("   - {}\n", recommendation));
    }

    out.push_str("\n   Sources:\n");
    for provenance in report.provenance() {
        match &provenance.status {
            ProvenanceStatus::Contributed { signals } => out.push_str(&format!(
                "   ✅ {:<14} {} signal(s) in {}ms\n",
                provenance.source, signals, provenance.elapsed_ms
            )),
            ProvenanceStatus::Failed(failure) => out.push_str(&format!(
                "   ❌ {:<14} {}\n",
                provenance.source, failure
            )),
        }
    }

    out
}
