//! Review binary entry point.
//!
//! This binary runs the full pipeline from the command line: validate the
//! request, retrieve and deduplicate papers from arXiv, then stream a
//! structured review from the selected model. It supports both single-run
//! and interactive REPL modes, with Markdown, JSON or table output.
//!
//! # Examples
//!
//! Single review with default settings:
//! ```bash
//! review --domain "graph neural networks"
//! ```
//!
//! JSON output written to a file:
//! ```bash
//! review --domain "protein folding" --years 2021-2024 --count 8 --format json --output review.json
//! ```
//!
//! Interactive mode:
//! ```bash
//! review --interactive
//! ```

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use paper_review::{
    config::{EmbeddingBackend, Settings},
    embedding::{fastembed::FastEmbedProvider, openai::OpenAIEmbedding, EmbeddingProvider},
    generation::{openai_compat::OpenAiCompatClient, ModelChoice},
    models::{PaperRecord, ReviewDocument},
    provider::arxiv::ArxivSource,
    retrieval::Retriever,
    synthesis::Synthesizer,
    validation::validate_query,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use serde_json::json;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Wrapper enum for embedding providers to allow dynamic dispatch
enum DynamicEmbeddingProvider {
    FastEmbed(FastEmbedProvider),
    OpenAI(OpenAIEmbedding),
}

#[async_trait::async_trait]
impl EmbeddingProvider for DynamicEmbeddingProvider {
    async fn embed(&self, text: &str) -> paper_review::embedding::EmbeddingResult<Vec<f32>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed(text).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed(text).await,
        }
    }

    async fn embed_batch(
        &self,
        texts: &[&str],
    ) -> paper_review::embedding::EmbeddingResult<Vec<Vec<f32>>> {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.embed_batch(texts).await,
            DynamicEmbeddingProvider::OpenAI(p) => p.embed_batch(texts).await,
        }
    }

    fn dimension(&self) -> usize {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.dimension(),
            DynamicEmbeddingProvider::OpenAI(p) => p.dimension(),
        }
    }

    fn model_name(&self) -> &str {
        match self {
            DynamicEmbeddingProvider::FastEmbed(p) => p.model_name(),
            DynamicEmbeddingProvider::OpenAI(p) => p.model_name(),
        }
    }
}

/// Output format for the finished review
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Markdown report
    Markdown,
    /// Machine-readable JSON (papers and review)
    Json,
    /// Paper table followed by the review sections
    Table,
}

/// Language model used for synthesis
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    /// DeepSeek chat (needs DEEPSEEK_API_KEY)
    Deepseek,
    /// OpenAI GPT-4 (needs OPENAI_API_KEY)
    Gpt4,
}

impl From<ModelArg> for ModelChoice {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Deepseek => ModelChoice::DeepSeek,
            ModelArg::Gpt4 => ModelChoice::OpenAi,
        }
    }
}

/// Embedding backend used for deduplication
#[derive(Debug, Clone, Copy, ValueEnum)]
enum EmbeddingArg {
    /// Local multilingual MiniLM model
    Fastembed,
    /// OpenAI embeddings API (needs OPENAI_API_KEY)
    Openai,
}

impl From<EmbeddingArg> for EmbeddingBackend {
    fn from(arg: EmbeddingArg) -> Self {
        match arg {
            EmbeddingArg::Fastembed => EmbeddingBackend::FastEmbed,
            EmbeddingArg::Openai => EmbeddingBackend::OpenAi,
        }
    }
}

/// Review binary CLI
#[derive(Parser, Debug)]
#[command(
    name = "review",
    version,
    about = "Generate a structured literature review for a research domain",
    long_about = "Search arXiv for recent papers in a research domain, collapse near-duplicates \
                  by embedding similarity, and ask a language model for a structured review.

EXAMPLES:
  Single review:
    review --domain \"graph neural networks\"

  GPT-4 with a custom range, saved as JSON:
    review --domain \"protein folding\" --years 2021-2024 --model gpt4 --format json --output review.json

  Interactive mode:
    review --interactive

ENVIRONMENT:
  DEEPSEEK_API_KEY, OPENAI_API_KEY, DEEPSEEK_BASE_URL, OPENAI_BASE_URL,
  ARXIV_API_URL, EMBEDDING_CACHE_DIR, REVIEW_EMBEDDINGS, REVIEW_DUPLICATE_THRESHOLD
  (a .env file in the working directory is loaded first)"
)]
struct Args {
    /// Research domain (required unless --interactive)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    domain: Option<String>,

    /// Publication year range
    #[arg(long, value_name = "YYYY-YYYY", default_value = "2020-2024")]
    years: String,

    /// Number of papers to review (1-50)
    #[arg(long, value_name = "N", default_value = "5", allow_negative_numbers = true)]
    count: i64,

    /// Sampling temperature (0.1-2.0)
    #[arg(long, value_name = "T", default_value = "0.7")]
    temperature: f64,

    /// Language model
    #[arg(long, value_enum, default_value = "deepseek")]
    model: ModelArg,

    /// Output format
    #[arg(long, value_enum, default_value = "markdown")]
    format: OutputFormat,

    /// Write the review to this file instead of stdout
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Embedding backend for deduplication (overrides REVIEW_EMBEDDINGS)
    #[arg(long, value_enum)]
    embeddings: Option<EmbeddingArg>,

    /// Do not echo the model response while it streams
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL")]
    log_level: String,

    /// FastEmbed model cache directory (overrides EMBEDDING_CACHE_DIR)
    #[arg(long, value_name = "DIR")]
    cache_dir: Option<PathBuf>,
}

/// Per-run options that the REPL can change between runs
#[derive(Debug, Clone)]
struct RunOptions {
    years: String,
    count: i64,
    temperature: f64,
    model: ModelChoice,
    format: OutputFormat,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Instantiate the embedding provider selected by the settings
fn create_embedding_provider(settings: &Settings) -> Result<DynamicEmbeddingProvider> {
    match settings.embedding_backend {
        EmbeddingBackend::OpenAi => {
            let api_key = settings.openai_api_key.clone().with_context(|| {
                "OPENAI_API_KEY environment variable required for OpenAI embeddings.\n\
                 Set it with: export OPENAI_API_KEY=your-api-key"
            })?;
            let provider = OpenAIEmbedding::new(api_key, None)
                .with_context(|| "Failed to create OpenAI embedding provider")?
                .with_base_url(&settings.openai_base_url);
            info!(model = provider.model_name(), "Using OpenAI embeddings");
            Ok(DynamicEmbeddingProvider::OpenAI(provider))
        }
        EmbeddingBackend::FastEmbed => {
            let provider = FastEmbedProvider::new(None, settings.embedding_cache_dir.clone())
                .with_context(|| "Failed to create FastEmbed provider")?;
            info!(model = provider.model_name(), "Using FastEmbed embeddings");
            Ok(DynamicEmbeddingProvider::FastEmbed(provider))
        }
    }
}

/// Register a generator for every model that has an API key
fn create_synthesizer(settings: &Settings, echo: bool) -> Result<Synthesizer> {
    let mut synthesizer = Synthesizer::new();

    for choice in ModelChoice::all() {
        if let Some(api_key) = settings.api_key_for(choice) {
            let client = OpenAiCompatClient::for_model(
                choice,
                api_key,
                Some(settings.base_url_for(choice).to_string()),
            )
            .with_context(|| format!("Failed to create {} client", choice))?;
            synthesizer = synthesizer.with_generator(choice, Arc::new(client));
        }
    }

    if echo {
        synthesizer = synthesizer.with_observer(|fragment| {
            let mut stderr = std::io::stderr().lock();
            let _ = stderr.write_all(fragment.as_bytes());
            let _ = stderr.flush();
        });
    }

    Ok(synthesizer)
}

fn ensure_model_available(synthesizer: &Synthesizer, model: ModelChoice) -> Result<()> {
    if !synthesizer.available_models().contains(&model) {
        anyhow::bail!(
            "{} environment variable required for the {} model.\n\
             Set it with: export {}=your-api-key",
            Settings::api_key_var(model),
            model,
            Settings::api_key_var(model)
        );
    }
    Ok(())
}

fn retrieval_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{elapsed}] {msg}")
            .expect("Invalid spinner template"),
    );
    pb.set_message("Searching arXiv and removing duplicates...");
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Run validate -> retrieve -> synthesize for one domain
async fn execute_review<E: EmbeddingProvider>(
    retriever: &Retriever<ArxivSource, E>,
    synthesizer: &Synthesizer,
    domain: &str,
    options: &RunOptions,
) -> Result<(String, Vec<PaperRecord>, ReviewDocument)> {
    // Fail fast on every field before any network call
    let params = validate_query(domain, &options.years, options.count, options.temperature)
        .with_context(|| "Invalid review request")?;
    ensure_model_available(synthesizer, options.model)?;

    let spinner = retrieval_spinner();
    let started = Instant::now();
    let papers = retriever
        .search_papers(params.domain(), &params.years(), options.count)
        .await;
    spinner.finish_and_clear();
    let papers = papers.with_context(|| "Failed to retrieve papers")?;

    info!(
        papers = papers.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Retrieval finished"
    );

    if papers.is_empty() {
        anyhow::bail!(
            "No papers found for '{}' in {}; no review generated",
            params.domain(),
            params.years()
        );
    }
    eprintln!("{}", format_papers_table(&papers));

    eprintln!("\nGenerating review with {}...\n", options.model);
    let review = synthesizer
        .generate_review(&papers, params.domain(), options.temperature, options.model)
        .await
        .with_context(|| "Failed to generate review")?;
    eprintln!();

    Ok((params.domain().to_string(), papers, review))
}

/// Truncate to `max` characters, marking the cut with an ellipsis
fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let head: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}

/// Format papers as a pretty table
fn format_papers_table(papers: &[PaperRecord]) -> String {
    if papers.is_empty() {
        return "No papers found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    // Add header
    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
        Cell::new("Link").add_attribute(Attribute::Bold),
    ]);

    for (idx, paper) in papers.iter().enumerate() {
        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate_chars(&paper.title, 60)),
            Cell::new(truncate_chars(&paper.authors.join(", "), 40)),
            Cell::new(paper.publication_year),
            Cell::new(&paper.source_url).fg(Color::Cyan),
        ]);
    }

    table.to_string()
}

/// Render the review in the requested format
fn render_review(
    domain: &str,
    options: &RunOptions,
    papers: &[PaperRecord],
    review: &ReviewDocument,
) -> Result<String> {
    match options.format {
        OutputFormat::Markdown => Ok(review.to_markdown(domain)),
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "domain": domain,
            "years": options.years,
            "model": options.model.model_id(),
            "temperature": options.temperature,
            "papers": papers,
            "review": review,
        }))
        .with_context(|| "Failed to serialize review to JSON"),
        OutputFormat::Table => {
            let mut out = format_papers_table(&review.key_papers);
            for (heading, body) in [
                ("Overview", &review.overview),
                ("Current Trends", &review.trends),
                ("Major Challenges", &review.challenges),
                ("Future Directions", &review.future_directions),
            ] {
                out.push_str(&format!("\n\n{}\n{}\n{}", heading, "─".repeat(heading.len()), body));
            }
            out.push('\n');
            Ok(out)
        }
    }
}

fn emit(rendered: &str, output: Option<&PathBuf>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, rendered)
                .with_context(|| format!("Failed to write review to {}", path.display()))?;
            eprintln!("Review written to {}", path.display());
        }
        None => println!("{}", rendered),
    }
    Ok(())
}

/// Display detailed view of a single paper
fn display_paper_detail(paper: &PaperRecord, rank: usize) {
    println!("\n{}", "═".repeat(80));
    println!("#{}", rank);
    println!("Title: {}", paper.title);
    println!("Authors: {}", paper.authors.join(", "));
    println!("Year: {}", paper.publication_year);
    println!("Link: {}", paper.source_url);
    println!("\nAbstract:\n{}", paper.abstract_text);
    println!("{}", "═".repeat(80));
}

fn print_help() {
    println!("Commands:");
    println!("  <domain>          - Generate a review for a research domain");
    println!("  /years YYYY-YYYY  - Set the year range");
    println!("  /count N          - Set number of papers (1-50)");
    println!("  /temp T           - Set temperature (0.1-2.0)");
    println!("  /model NAME       - Use 'deepseek' or 'gpt4'");
    println!("  /format FORMAT    - Use 'markdown', 'json' or 'table' output");
    println!("  /detail N         - Show full details for paper N of the last run");
    println!("  /help             - Show this help");
    println!("  Ctrl+D or Ctrl+C  - Exit");
}

/// Run interactive REPL mode
async fn run_interactive<E: EmbeddingProvider>(
    retriever: Retriever<ArxivSource, E>,
    synthesizer: Synthesizer,
    mut options: RunOptions,
    output: Option<PathBuf>,
) -> Result<()> {
    println!("Interactive Literature Review");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;
    let mut last_papers: Vec<PaperRecord> = Vec::new();

    loop {
        let readline = rl.readline("Review> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok(); // Ignore errors from adding to history

                // Handle commands
                if line.starts_with('/') {
                    let parts: Vec<&str> = line.split_whitespace().collect();
                    match parts[0] {
                        "/help" => print_help(),
                        "/years" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /years YYYY-YYYY");
                                continue;
                            }
                            match paper_review::validation::validate_years(parts[1]) {
                                Ok(range) => {
                                    options.years = range.to_string();
                                    println!("Set year range to {}", range);
                                }
                                Err(e) => eprintln!("Invalid year range: {}", e),
                            }
                        }
                        "/count" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /count N");
                                continue;
                            }
                            match parts[1]
                                .parse::<i64>()
                                .map_err(|e| e.to_string())
                                .and_then(|n| {
                                    paper_review::validation::validate_paper_count(n)
                                        .map(|_| n)
                                        .map_err(|e| e.to_string())
                                }) {
                                Ok(n) => {
                                    options.count = n;
                                    println!("Set paper count to {}", n);
                                }
                                Err(e) => eprintln!("Invalid count: {}", e),
                            }
                        }
                        "/temp" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /temp T");
                                continue;
                            }
                            match parts[1]
                                .parse::<f64>()
                                .map_err(|e| e.to_string())
                                .and_then(|t| {
                                    paper_review::validation::validate_temperature(t)
                                        .map(|_| t)
                                        .map_err(|e| e.to_string())
                                }) {
                                Ok(t) => {
                                    options.temperature = t;
                                    println!("Set temperature to {}", t);
                                }
                                Err(e) => eprintln!("Invalid temperature: {}", e),
                            }
                        }
                        "/model" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /model [deepseek|gpt4]");
                                continue;
                            }
                            match parts[1].parse::<ModelChoice>() {
                                Ok(model) if synthesizer.available_models().contains(&model) => {
                                    options.model = model;
                                    println!("Set model to {}", model);
                                }
                                Ok(model) => eprintln!(
                                    "Model {} is not configured; set {}",
                                    model,
                                    Settings::api_key_var(model)
                                ),
                                Err(e) => eprintln!("{}", e),
                            }
                        }
                        "/format" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /format [markdown|json|table]");
                                continue;
                            }
                            match OutputFormat::from_str(parts[1], true) {
                                Ok(format) => {
                                    options.format = format;
                                    println!("Set output format to {:?}", format);
                                }
                                Err(_) => eprintln!(
                                    "Invalid format: must be 'markdown', 'json' or 'table'"
                                ),
                            }
                        }
                        "/detail" => {
                            if parts.len() != 2 {
                                eprintln!("Usage: /detail N");
                                continue;
                            }
                            match parts[1].parse::<usize>() {
                                Ok(rank) if rank > 0 && rank <= last_papers.len() => {
                                    display_paper_detail(&last_papers[rank - 1], rank);
                                }
                                Ok(rank) if rank > last_papers.len() => {
                                    eprintln!(
                                        "Paper {} out of range (last run returned {} papers)",
                                        rank,
                                        last_papers.len()
                                    );
                                }
                                _ => eprintln!("Invalid number: must be a positive integer"),
                            }
                        }
                        _ => eprintln!(
                            "Unknown command: {}. Type /help for available commands.",
                            parts[0]
                        ),
                    }
                } else {
                    match execute_review(&retriever, &synthesizer, line, &options).await {
                        Ok((domain, papers, review)) => {
                            match render_review(&domain, &options, &papers, &review) {
                                Ok(rendered) => {
                                    if let Err(e) = emit(&rendered, output.as_ref()) {
                                        eprintln!("{:#}", e);
                                    }
                                }
                                Err(e) => eprintln!("{:#}", e),
                            }
                            last_papers = papers;
                        }
                        Err(e) => eprintln!("Review failed: {:#}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);

    // Validate arguments
    if !args.interactive && args.domain.is_none() {
        anyhow::bail!(
            "Either --domain or --interactive must be specified.\n\
             Use --help for usage information."
        );
    }

    let mut settings = Settings::from_env().with_context(|| "Failed to read configuration")?;
    if let Some(cache_dir) = args.cache_dir.clone() {
        settings.embedding_cache_dir = Some(cache_dir);
    }
    if let Some(backend) = args.embeddings {
        settings.embedding_backend = backend.into();
    }
    debug!(?settings, "Loaded settings");

    let options = RunOptions {
        years: args.years.clone(),
        count: args.count,
        temperature: args.temperature,
        model: args.model.into(),
        format: args.format,
    };

    let synthesizer = create_synthesizer(&settings, !args.quiet)?;
    if !args.interactive {
        // Check inputs and credentials before loading the embedding model
        let domain = args.domain.as_deref().unwrap_or_default();
        validate_query(domain, &options.years, options.count, options.temperature)
            .with_context(|| "Invalid review request")?;
        ensure_model_available(&synthesizer, options.model)?;
    }

    let embedder = create_embedding_provider(&settings)?;
    let retriever = Retriever::new(ArxivSource::with_api_url(&settings.arxiv_api_url), embedder)
        .with_config(settings.retrieval_config());

    // Run in appropriate mode
    if args.interactive {
        run_interactive(retriever, synthesizer, options, args.output).await?;
    } else {
        let domain = args.domain.as_deref().unwrap_or_default();
        let (domain, papers, review) =
            execute_review(&retriever, &synthesizer, domain, &options).await?;
        let rendered = render_review(&domain, &options, &papers, &review)?;
        emit(&rendered, args.output.as_ref())?;
    }

    Ok(())
}
