//! CLI binary for edgequake-pdfsort.
//!
//! A thin shim over the library crate that maps CLI flags to `SortConfig`
//! and `SchedulerConfig`, queues every input and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdfsort::{
    inspect, replay, JobEvent, JobScheduler, LocalStore, ProgressCallback, SchedulerConfig,
    SortConfig, SortContext, SortOutput, SortProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
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

/// One bar per document: a spinner while classifying, then a bar over groups.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl SortProgressCallback for CliProgressCallback {
    fn on_sort_start(&self, total_pages: usize) {
        self.errors.store(0, Ordering::SeqCst);
        self.bar.set_prefix("Classifying");
        self.bar.set_message(format!("{total_pages} pages…"));
    }

    fn on_grouped(&self, total_pages: usize, total_groups: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total_pages} pages → {total_groups} documents"))
        ));
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} groups  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_length(total_groups as u64);
        self.bar.set_position(0);
        self.bar.set_prefix("Filing");
    }

    fn on_group_written(&self, _index: usize, _total: usize, path: &str) {
        self.bar.println(format!("  {} {}", green("✓"), dim(path)));
        self.bar.inc(1);
    }

    fn on_group_error(&self, _index: usize, _total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = error.chars().take(100).collect();
        self.bar.println(format!("  {} {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_sort_complete(&self, success: usize, failed: usize) {
        self.bar.set_message(String::new());
        self.bar.println(format!(
            "{} {} written{}",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&success.to_string()),
            if failed == 0 {
                String::new()
            } else {
                format!("  ({} failed)", red(&failed.to_string()))
            }
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Sort one bundle into ./sorted
  pdfsort bundle.pdf

  # Sort several bundles into a filing share
  pdfsort -o /srv/filing day1.pdf day2.pdf day3.pdf

  # Show where every document would go, without writing
  pdfsort --dry-run bundle.pdf

  # Copy an already-sorted bundle into a second tree using its manifest
  pdfsort -o /srv/filing --replay /mnt/backup bundle.pdf

  # Page count only (no API key needed)
  pdfsort --inspect-only bundle.pdf

OUTPUT LAYOUT:
  COVER/{COVER|KTKS-COVER}/<SUB>/                      BM.01 cover sheets
  LOG-FTP/<SUB>/                                       FTP log screens
  SOURCE-MESSAGES/<SUB>/                               original messages
  SERVICE-{RTP|EGC|NTX}/PROCESSED-MESSAGES[-EGC]/...   BM.02 / BM.04
  SERVICE-{RTP|EGC|NTX}/PRE-TRANSMISSION/...           BM.03
  UNCLASSIFIED/                                        everything else
  _MANIFESTS/<bundle>.json                             run manifest

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides --verbose / --quiet
"#;

/// Classify scanned station bundles and file each sub-document.
#[derive(Parser, Debug)]
#[command(
    name = "pdfsort",
    version,
    about = "Split scanned PDF bundles into sub-documents and file them by form, service and subtype",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs, processed in order.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Root of the filing tree.
    #[arg(short, long, env = "PDFSORT_OUTPUT_DIR", default_value = "./sorted")]
    output_dir: PathBuf,

    /// Folder inside the filing tree that holds run manifests.
    #[arg(long, env = "PDFSORT_MANIFEST_FOLDER", default_value = "_MANIFESTS")]
    manifest_folder: String,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, env = "PDFSORT_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: u32,

    /// Upper bound on the longest edge of a rendered page in pixels.
    #[arg(long, env = "PDFSORT_MAX_PIXELS", default_value_t = 1600)]
    max_pixels: u32,

    /// Page images per classifier call.
    #[arg(long, env = "PDFSORT_PAGES_PER_REQUEST", default_value_t = 8)]
    pages_per_request: usize,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDFSORT_PASSWORD")]
    password: Option<String>,

    /// Path to a text file containing a custom classification prompt.
    #[arg(long, env = "PDFSORT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens per classifier call.
    #[arg(long, env = "PDFSORT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDFSORT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Retries per classifier call.
    #[arg(long, env = "PDFSORT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Minimum milliseconds between the start of two classifier calls.
    #[arg(long, env = "PDFSORT_RATE_LIMIT_MS", default_value_t = 4000)]
    rate_limit_ms: u64,

    /// Attempts per document before it is marked failed.
    #[arg(long, env = "PDFSORT_MAX_ATTEMPTS", default_value_t = 3)]
    max_attempts: u32,

    /// Pause between document attempts in milliseconds.
    #[arg(long, env = "PDFSORT_RETRY_DELAY_MS", default_value_t = 5000)]
    retry_delay_ms: u64,

    /// Classify and plan only; print the folder tree instead of writing.
    #[arg(long, env = "PDFSORT_DRY_RUN")]
    dry_run: bool,

    /// Copy the already-sorted files of each input into this second tree,
    /// using the staged manifests. No classification is done.
    #[arg(long, value_name = "DEST", conflicts_with = "dry_run")]
    replay: Option<PathBuf>,

    /// Print page counts only.
    #[arg(long, conflicts_with_all = ["dry_run", "replay"])]
    inspect_only: bool,

    /// Output structured JSON instead of text.
    #[arg(long, env = "PDFSORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFSORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFSORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFSORT_QUIET")]
    quiet: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDFSORT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Per classifier call timeout in seconds.
    #[arg(long, env = "PDFSORT_API_TIMEOUT", default_value_t = 90)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        for input in &cli.inputs {
            let pages = inspect(input, cli.password.as_deref())
                .await
                .with_context(|| format!("Failed to inspect {input}"))?;
            if cli.json {
                println!("{}", serde_json::json!({ "input": input, "pages": pages }));
            } else {
                println!("{input}: {pages} pages");
            }
        }
        return Ok(());
    }

    // ── Replay mode ──────────────────────────────────────────────────────
    if let Some(ref dest) = cli.replay {
        return run_replay(&cli, dest).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn SortProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;
    let context = SortContext::from_config(config)
        .await
        .context("Failed to set up the classifier")?;

    if cli.dry_run {
        let context = context.with_rate_limit(Duration::from_millis(cli.rate_limit_ms));
        return run_preview(&cli, context).await;
    }

    // ── Queue and run ────────────────────────────────────────────────────
    let scheduler_config = SchedulerConfig {
        max_concurrency: 1,
        rate_limit_interval_ms: cli.rate_limit_ms,
        max_attempts: cli.max_attempts,
        retry_delay_ms: cli.retry_delay_ms,
    };
    let scheduler = JobScheduler::for_context(scheduler_config, context)
        .context("Invalid scheduler configuration")?;

    let events = scheduler.subscribe();
    let ids: Vec<_> = cli
        .inputs
        .iter()
        .map(|input| (input.clone(), scheduler.enqueue(input.clone())))
        .collect();
    let (done, finished) = oneshot::channel();
    let printer = (!cli.quiet && !cli.json)
        .then(|| tokio::spawn(relay_events(events, finished, |line| eprintln!("{line}"))));

    let summary = scheduler.run().await;
    let _ = done.send(());
    if let Some(printer) = printer {
        let _ = printer.await;
    }

    let mut outputs: Vec<SortOutput> = Vec::new();
    for (input, id) in &ids {
        match scheduler.take_output(*id) {
            Some(output) => outputs.push(output),
            None => {
                if let Some(state) = scheduler.state(*id) {
                    tracing::debug!("{input}: {state:?}");
                }
            }
        }
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&outputs).context("Failed to serialise output")?
        );
    } else if !cli.quiet {
        for output in &outputs {
            print_report(output);
        }
        eprintln!(
            "{}  {} sorted, {} failed",
            if summary.failed == 0 { green("✔") } else { red("✘") },
            summary.completed,
            summary.failed
        );
    }

    if summary.failed > 0 {
        anyhow::bail!("{} of {} inputs failed", summary.failed, cli.inputs.len());
    }
    Ok(())
}

fn event_line(event: &JobEvent) -> Option<String> {
    match event {
        JobEvent::Started { id, attempt } if *attempt > 1 => {
            Some(format!("{} job {id}: attempt {attempt}", cyan("↻")))
        }
        JobEvent::Retrying { id, error, .. } => Some(format!("{} job {id}: {}", cyan("⚠"), dim(error))),
        JobEvent::Failed { id, error } => Some(format!("{} job {id} failed: {}", red("✘"), red(error))),
        _ => None,
    }
}

/// Forward scheduler events to `emit` until `finished` fires, then flush
/// whatever is still buffered.
async fn relay_events(
    mut events: broadcast::Receiver<JobEvent>,
    mut finished: oneshot::Receiver<()>,
    mut emit: impl FnMut(String),
) {
    loop {
        tokio::select! {
            biased;
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(line) = event_line(&event) {
                        emit(line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
            _ = &mut finished => break,
        }
    }
    loop {
        match events.try_recv() {
            Ok(event) => {
                if let Some(line) = event_line(&event) {
                    emit(line);
                }
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => {}
            Err(_) => break,
        }
    }
}

fn print_report(output: &SortOutput) {
    println!("{}", bold(&output.source_file_name));
    for detail in &output.report.details {
        if detail.starts_with("FAILED") {
            println!("  {}", red(detail));
        } else {
            println!("  {detail}");
        }
    }
    println!(
        "  {}",
        dim(&format!(
            "{} pages, {} groups, {} classifier calls, {}ms",
            output.stats.total_pages,
            output.stats.total_groups,
            output.stats.classifier_calls,
            output.stats.total_duration_ms
        ))
    );
}

async fn run_preview(cli: &Cli, context: SortContext) -> Result<()> {
    for input in &cli.inputs {
        let preview = context
            .preview(input)
            .await
            .with_context(|| format!("Dry run failed for {input}"))?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&preview).context("Failed to serialise preview")?
            );
        } else {
            println!(
                "{}  {}",
                bold(&preview.source_file_name),
                dim(&format!(
                    "{} pages → {} files",
                    preview.pages.len(),
                    preview.artifacts.len()
                ))
            );
            print!("{}", preview.tree.render());
        }
    }
    Ok(())
}

async fn run_replay(cli: &Cli, dest: &Path) -> Result<()> {
    let source = LocalStore::new(&cli.output_dir);
    let destination = LocalStore::new(dest);
    let mut failed = 0;

    for input in &cli.inputs {
        let file_name = Path::new(input)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| input.clone());
        let report = replay(&source, &destination, &cli.manifest_folder, &file_name)
            .await
            .with_context(|| format!("Replay failed for {file_name}"))?;
        failed += report.failed;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialise report")?
            );
        } else if !cli.quiet {
            println!("{}", bold(&file_name));
            for detail in &report.details {
                println!("  {detail}");
            }
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} files could not be replayed");
    }
    Ok(())
}

/// Map CLI args to `SortConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<SortConfig> {
    let mut builder = SortConfig::builder()
        .dpi(cli.dpi)
        .max_rendered_pixels(cli.max_pixels)
        .pages_per_request(cli.pages_per_request)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .max_retries(cli.max_retries)
        .output_dir(&cli.output_dir)
        .manifest_folder(&cli.manifest_folder)
        .download_timeout_secs(cli.download_timeout)
        .api_timeout_secs(cli.api_timeout);

    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[tokio::test]
    async fn events_sent_before_the_run_ends_are_printed() {
        let (tx, rx) = broadcast::channel(16);
        let (done, finished) = oneshot::channel();
        tx.send(JobEvent::Started { id: 1, attempt: 1 }).unwrap();
        tx.send(JobEvent::Failed {
            id: 1,
            error: "classifier unreachable".into(),
        })
        .unwrap();
        done.send(()).unwrap();

        let mut lines = Vec::new();
        relay_events(rx, finished, |line| lines.push(line)).await;

        assert_eq!(lines.len(), 1, "{lines:?}");
        assert!(lines[0].contains("classifier unreachable"));
    }

    #[tokio::test]
    async fn relay_stops_when_the_scheduler_is_dropped() {
        let (tx, rx) = broadcast::channel::<JobEvent>(4);
        let (_done, finished) = oneshot::channel();
        drop(tx);

        let mut count = 0;
        relay_events(rx, finished, |_| count += 1).await;
        assert_eq!(count, 0);
    }

    #[test]
    fn defaults_match_library() {
        let cli = Cli::try_parse_from(["pdfsort", "a.pdf", "b.pdf"]).unwrap();
        assert_eq!(cli.inputs, vec!["a.pdf", "b.pdf"]);
        assert_eq!(cli.pages_per_request, SortConfig::default().pages_per_request);
        assert_eq!(cli.rate_limit_ms, SchedulerConfig::default().rate_limit_interval_ms);
        assert_eq!(cli.manifest_folder, "_MANIFESTS");
    }
}
