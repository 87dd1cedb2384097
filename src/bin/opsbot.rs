//! CLI binary for opsbot-extract.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ExtractionConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use opsbot_extract::pipeline::input::load_input;
use opsbot_extract::{
    inspect, render_table_debug, ContractTask, ExtractionConfig, ExtractionProfile,
    ExtractionProgressCallback, ExtractionResult, Extractor, ProgressCallback, TableStrategy,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner while stages run, switching to a
/// page counter once the document is open.
struct CliProgressCallback {
    bar: ProgressBar,
    tables: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            tables: AtomicUsize::new(0),
        })
    }

    /// Switch to the full progress-bar style once we know `total`.
    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Parsing");
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: &str) {
        if stage == "structure" {
            let spinner_style =
                ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner())
                    .tick_strings(TICKS);
            self.bar.set_style(spinner_style);
            self.bar.set_prefix("Structuring");
            self.bar.set_message("waiting for model…");
        }
    }

    fn on_document_opened(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Reading {total_pages} pages…"))
        ));
    }

    fn on_page_extracted(&self, page_num: usize, total: usize, strategy: TableStrategy) {
        let marker = match strategy {
            TableStrategy::Lines => {
                self.tables.fetch_add(1, Ordering::SeqCst);
                green("✓")
            }
            TableStrategy::None => dim("·"),
            TableStrategy::Error => red("✗"),
        };
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            marker,
            page_num,
            total,
            dim(&format!("tables: {}", strategy.as_str())),
        ));
        self.bar.inc(1);
    }

    fn on_stage_complete(&self, stage: &str, success: bool) {
        if !success {
            self.bar.finish_and_clear();
            eprintln!("{} {} stage failed", red("✘"), bold(stage));
            return;
        }
        match stage {
            "parse" => {
                let pages_with_tables = self.tables.load(Ordering::SeqCst);
                self.bar.println(format!(
                    "{} parsed  ({} page(s) with ruled tables)",
                    green("✔"),
                    bold(&pages_with_tables.to_string())
                ));
            }
            _ => {
                self.bar.finish_and_clear();
                eprintln!("{} {} complete", green("✔"), bold(stage));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Shipment fields as JSON (stdout)
  opsbot manifest.pdf

  # Full result object: text, tables and structured output
  opsbot --json manifest.pdf > result.json

  # Executive summary with a specific model
  opsbot --profile summary --model gpt-4o-mini --provider openai report.pdf

  # Extract from a URL
  opsbot https://example.com/manifests/lot-42.pdf

  # Inspect PDF metadata (no API key needed)
  opsbot --inspect-only manifest.pdf

  # Draw detected rulings and cells on page 2
  opsbot --debug-tables 2 -o page2.png manifest.pdf

  # Contract sections, then a risk review
  opsbot --sections contract.pdf
  opsbot --contract-task highlight_risks contract.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  OPSBOT_LLM_PROVIDER     Override provider (openai, anthropic, gemini, ollama)
  OPSBOT_MODEL            Override model ID (default gpt-4o)
  PDFIUM_LIB_PATH         Path to libpdfium; system library otherwise
  RUST_LOG                Log filter, e.g. opsbot_extract=debug
"#;

/// Extract structured data from PDF manifests and contracts.
#[derive(Parser, Debug)]
#[command(
    name = "opsbot",
    version,
    about = "Extract text, ruled tables and structured fields from PDF documents",
    long_about = "Extract page text and ruled tables from a PDF (local file or URL), then ask \
an LLM for shipment fields as JSON or a free-text summary. Contract documents can be split \
into sections and reviewed. Supports OpenAI, Anthropic, Google Gemini, Ollama and any \
provider edgequake-llm can reach.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// What to ask the model for: shipment (JSON fields) or summary.
    #[arg(long, env = "OPSBOT_PROFILE", default_value = "shipment")]
    profile: String,

    /// LLM model ID (e.g. gpt-4o, gpt-4o-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "OPSBOT_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "OPSBOT_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama."
    )]
    provider: Option<String>,

    /// Characters of document text sent to the model (profile default otherwise).
    #[arg(long, env = "OPSBOT_CHAR_BUDGET")]
    char_budget: Option<usize>,

    /// LLM temperature (0.0–2.0, profile default otherwise).
    #[arg(long, env = "OPSBOT_TEMPERATURE")]
    temperature: Option<f32>,

    /// Max LLM output tokens.
    #[arg(long, env = "OPSBOT_MAX_TOKENS", default_value_t = 2048)]
    max_tokens: usize,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "OPSBOT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OPSBOT_PASSWORD")]
    password: Option<String>,

    /// Print the full result object as JSON instead of the structured output.
    #[arg(long, env = "OPSBOT_JSON")]
    json: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Render PAGE (1-indexed) with detected rulings and cells as a PNG.
    #[arg(long, value_name = "PAGE")]
    debug_tables: Option<usize>,

    /// Output file for --debug-tables.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Rendering DPI for --debug-tables (72–400).
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Print the contract sections found in the document.
    #[arg(long)]
    sections: bool,

    /// Run a contract review: summary, highlight_risks or missing_fields.
    #[arg(long, env = "OPSBOT_CONTRACT_TASK")]
    contract_task: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "OPSBOT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// LLM call timeout in seconds (0 disables the timeout).
    #[arg(long, env = "OPSBOT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "OPSBOT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OPSBOT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OPSBOT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback that matters; library INFO logs
    // would tear through it.
    let extraction_mode = !cli.inspect_only
        && cli.debug_tables.is_none()
        && !cli.sections
        && cli.contract_task.is_none();
    let show_progress = extraction_mode && !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let loaded = load_input(&cli.input, cli.download_timeout)
            .await
            .context("Failed to load input")?;
        let info = inspect(&loaded.bytes, &config)
            .await
            .context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize metadata")?
            );
        } else {
            println!("File:         {}", loaded.source);
            if let Some(ref t) = info.title {
                println!("Title:        {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:       {}", a);
            }
            if let Some(ref s) = info.subject {
                println!("Subject:      {}", s);
            }
            println!("Pages:        {}", info.page_count);
            if let Some(ref v) = info.pdf_version {
                println!("PDF Version:  {}", v);
            }
            if let Some(ref p) = info.producer {
                println!("Producer:     {}", p);
            }
            if let Some(ref c) = info.creator {
                println!("Creator:      {}", c);
            }
        }
        return Ok(());
    }

    // ── Table debug render ───────────────────────────────────────────────
    if let Some(page) = cli.debug_tables {
        if page < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
        }
        let loaded = load_input(&cli.input, cli.download_timeout)
            .await
            .context("Failed to load input")?;
        let png = render_table_debug(&loaded.bytes, page - 1, &config, cli.dpi)
            .await
            .context("Failed to render table debug image")?;
        let path = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("page-{page}-tables.png")));
        tokio::fs::write(&path, &png)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        if !cli.quiet {
            eprintln!("{} wrote {}", green("✔"), bold(&path.display().to_string()));
        }
        return Ok(());
    }

    let extractor = Extractor::lenient(config).context("Failed to initialise extractor")?;

    // ── Contract sections / review ───────────────────────────────────────
    if cli.sections || cli.contract_task.is_some() {
        let task = cli
            .contract_task
            .as_deref()
            .map(str::parse::<ContractTask>)
            .transpose()
            .context("Invalid --contract-task")?;

        let loaded = load_input(&cli.input, cli.download_timeout)
            .await
            .context("Failed to load input")?;
        let extraction = extractor
            .extract_document(&loaded.bytes)
            .await
            .context("Failed to read contract")?;
        let text = extraction.plain_text();

        let (sections, review) = match task {
            Some(task) => {
                let (sections, reply) = extractor
                    .analyze_contract_text(&text, task)
                    .await
                    .context("Contract review failed")?;
                (sections, Some(reply))
            }
            None => {
                let cleaned = opsbot_extract::clean_contract_text(&text);
                (opsbot_extract::segment_contract(&cleaned), None)
            }
        };

        if cli.json {
            let value = serde_json::json!({ "sections": sections, "review": review });
            println!(
                "{}",
                serde_json::to_string_pretty(&value).context("Failed to serialise output")?
            );
        } else {
            if cli.sections || review.is_none() {
                for (kind, body) in sections.iter() {
                    println!("{}", bold(&format!("## {}", kind.as_str().to_uppercase())));
                    println!("{}\n", body.unwrap_or(opsbot_extract::analysis::NOT_PROVIDED));
                }
            }
            if let Some(review) = review {
                println!("{review}");
            }
        }
        return Ok(());
    }

    // ── Extraction ───────────────────────────────────────────────────────
    let state = extractor.run_pipeline_from_source(&cli.input).await;

    if !cli.quiet {
        for error in state.pages.iter().flat_map(|p| p.errors.iter()) {
            eprintln!("  {} {}", cyan("⚠"), error);
        }
    }

    let result = state.into_result();
    if cli.json {
        let json = serde_json::to_string_pretty(&result).context("Failed to serialise output")?;
        println!("{json}");
    }

    match result {
        ExtractionResult::Success {
            structured_output,
            tables,
            ..
        } => {
            if !cli.json {
                let stdout = io::stdout();
                let mut handle = stdout.lock();
                handle
                    .write_all(structured_output.as_bytes())
                    .context("Failed to write to stdout")?;
                if !structured_output.ends_with('\n') {
                    handle.write_all(b"\n").ok();
                }
            }
            if !cli.quiet && !cli.json {
                eprintln!(
                    "   {} table(s)  /  {} chars of output",
                    dim(&tables.len().to_string()),
                    dim(&structured_output.len().to_string()),
                );
            }
            Ok(())
        }
        ExtractionResult::Failure { error } => {
            if !cli.json {
                eprintln!("{} {}", red("✘"), error);
            }
            std::process::exit(1);
        }
    }
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let profile: ExtractionProfile = cli.profile.parse().context("Invalid --profile")?;

    let mut builder = ExtractionConfig::builder()
        .profile(profile)
        .max_tokens(cli.max_tokens)
        .download_timeout_secs(cli.download_timeout)
        .model_timeout_secs((cli.api_timeout > 0).then_some(cli.api_timeout));

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(chars) = cli.char_budget {
        builder = builder.char_budget(chars);
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
