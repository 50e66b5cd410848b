//! rustmonograph - Taxonomic Monograph Pipeline
//!
//! Each pipeline stage is a subcommand that reads the previous stage's files
//! and writes CSV output.
//!
//! ## Usage
//!
//! ```bash
//! rustmonograph treatments calamus.pdf treatments.csv
//! rustmonograph sentences treatments.csv sentences.csv
//! rustmonograph categorise sentences.csv sentences_cat.csv --appendix appendix_1.csv --appendix appendix_2.csv
//! rustmonograph extract-qualitative sentences_cat.csv appendix_2.csv app2_traits.csv --style cot
//! rustmonograph combine app1_sentences.csv app2_sentences.csv descriptions.csv
//! ```

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rustmonograph::appendix::{self, AppendixEntry, AppendixKind};
use rustmonograph::combine;
use rustmonograph::config::{LlmConfig, MonographLayout, TraitLayout, DEFAULT_HOST, DEFAULT_MODEL, DEFAULT_TIMEOUT_SECS};
use rustmonograph::description::{self, DescriptionSentence};
use rustmonograph::extraction::{self, ExtractionKind};
use rustmonograph::llm::{OllamaClient, PromptRunner, TokenUsage};
use rustmonograph::prompts::extraction::PromptStyle;
use rustmonograph::sentences::{self, CategorisedSentence, SentenceRow};
use rustmonograph::supplementary::{self, MultiValueRow};
use rustmonograph::table::{read_records, write_records, CsvRecord, Table};
use rustmonograph::treatments::{self, Treatment};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Taxonomic monograph pipeline: treatments to traits, traits to descriptions
#[derive(Parser)]
#[command(name = "rustmonograph")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Ollama host URL
    #[arg(long, global = true, env = "OLLAMA_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Ollama model name
    #[arg(long, global = true, env = "OLLAMA_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Sampling temperature
    #[arg(long, global = true, default_value = "0.0")]
    temperature: f32,

    /// Request timeout in seconds
    #[arg(long, global = true, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Maximum concurrent LLM requests
    #[arg(long, global = true, default_value = "4")]
    concurrency: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract per-taxon description paragraphs from a monograph PDF
    Treatments {
        /// Monograph PDF
        pdf: PathBuf,

        /// Output CSV (taxon_name, treatment)
        output: PathBuf,

        /// Only keep these taxa (comma separated)
        #[arg(long, value_delimiter = ',')]
        species: Vec<String>,

        /// Genus of the treated taxa
        #[arg(long, default_value = "Calamus")]
        genus: String,
    },

    /// Parse an appendix text file into a trait definition CSV
    Appendix {
        /// Appendix text file
        input: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Appendix type
        #[arg(long, default_value = "qualitative", value_parser = ["quantitative", "qualitative"])]
        kind: String,
    },

    /// Split treatment paragraphs into sentences
    Sentences {
        /// Treatments CSV
        treatments: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Assign an appendix subject to every sentence
    Categorise {
        /// Sentences CSV
        sentences: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Appendix CSV providing the subjects (repeatable)
        #[arg(long, required = true)]
        appendix: Vec<PathBuf>,
    },

    /// Extract quantitative traits (appendix 1) from categorised sentences
    ExtractQuantitative {
        /// Categorised sentences CSV
        sentences: PathBuf,

        /// Appendix 1 CSV
        appendix: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Extract qualitative traits (appendix 2) from categorised sentences
    ExtractQualitative {
        /// Categorised sentences CSV
        sentences: PathBuf,

        /// Appendix 2 CSV
        appendix: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Prompt style
        #[arg(long, default_value = "fewshot", value_parser = ["zeroshot", "fewshot", "cot", "cot-fewshot"])]
        style: String,
    },

    /// Aggregate the specimen matrix per taxon
    FormatSupplementary {
        /// Specimen matrix (.xlsx, .xls, .ods or .csv)
        input: PathBuf,

        /// Output CSV for codes with several values per taxon
        multi_output: PathBuf,

        /// Output CSV for the formatted matrix
        output: PathBuf,

        /// Genus used to expand abbreviated names
        #[arg(long, default_value = "Calamus")]
        genus: String,
    },

    /// Generate measurement sentences from appendix 1
    DescribeQuantitative {
        /// Appendix 1 CSV
        appendix: PathBuf,

        /// Formatted supplementary CSV
        data: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Generate rule sentences from appendix 2
    DescribeQualitative {
        /// Appendix 2 CSV
        appendix: PathBuf,

        /// Formatted supplementary CSV
        data: PathBuf,

        /// Multi-value CSV
        multi_value: PathBuf,

        /// Output CSV
        output: PathBuf,
    },

    /// Combine appendix 1 and 2 sentences into descriptions
    Combine {
        /// Appendix 1 sentences CSV
        app1: PathBuf,

        /// Appendix 2 sentences CSV
        app2: PathBuf,

        /// Output CSV
        output: PathBuf,

        /// Keep one row per taxon and subject
        #[arg(long)]
        subject_sentences: bool,
    },
}

impl Cli {
    fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            host: self.host.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout),
            concurrency: self.concurrency,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let llm = cli.llm_config();

    match cli.command {
        Commands::Treatments {
            pdf,
            output,
            species,
            genus,
        } => run_treatments(&pdf, &output, &species, genus),
        Commands::Appendix {
            input,
            output,
            kind,
        } => run_appendix(&input, &output, &kind),
        Commands::Sentences { treatments, output } => run_sentences(&treatments, &output),
        Commands::Categorise {
            sentences,
            output,
            appendix,
        } => run_categorise(llm, &sentences, &appendix, &output).await,
        Commands::ExtractQuantitative {
            sentences,
            appendix,
            output,
        } => run_extraction(llm, ExtractionKind::Quantitative, &sentences, &appendix, &output).await,
        Commands::ExtractQualitative {
            sentences,
            appendix,
            output,
            style,
        } => {
            let style: PromptStyle = style.parse()?;
            run_extraction(llm, ExtractionKind::Qualitative(style), &sentences, &appendix, &output).await
        }
        Commands::FormatSupplementary {
            input,
            multi_output,
            output,
            genus,
        } => run_format_supplementary(&input, &multi_output, &output, &genus),
        Commands::DescribeQuantitative {
            appendix,
            data,
            output,
        } => run_describe_quantitative(llm, &appendix, &data, &output).await,
        Commands::DescribeQualitative {
            appendix,
            data,
            multi_value,
            output,
        } => run_describe_qualitative(llm, &appendix, &data, &multi_value, &output).await,
        Commands::Combine {
            app1,
            app2,
            output,
            subject_sentences,
        } => run_combine(llm, &app1, &app2, &output, subject_sentences).await,
    }
}

// ============================================================================
// Text Stages
// ============================================================================

fn run_treatments(pdf: &Path, output: &Path, species: &[String], genus: String) -> Result<()> {
    println!("\n--- Treatments: {} ---", pdf.display());

    let layout = MonographLayout {
        genus,
        ..Default::default()
    };
    let treatments = treatments::extract_treatments(pdf, layout, species)
        .with_context(|| format!("Failed to extract treatments from {}", pdf.display()))?;

    println!("Found {} treatments.", treatments.len());
    save_csv(output, &treatments)
}

fn run_appendix(input: &Path, output: &Path, kind: &str) -> Result<()> {
    let kind = match kind {
        "quantitative" => AppendixKind::Quantitative,
        _ => AppendixKind::Qualitative,
    };
    println!("\n--- Appendix ({:?}): {} ---", kind, input.display());

    let entries = appendix::parse_appendix_file(input, kind)
        .with_context(|| format!("Failed to parse appendix {}", input.display()))?;

    println!("Parsed {} traits.", entries.len());
    save_csv(output, &entries)
}

fn run_sentences(treatments_path: &Path, output: &Path) -> Result<()> {
    println!("\n--- Sentences ---");

    let treatments: Vec<Treatment> = read_records(treatments_path)
        .with_context(|| format!("Failed to read {}", treatments_path.display()))?;
    let rows = sentences::split_treatments(&treatments);

    println!("Split {} treatments into {} sentences.", treatments.len(), rows.len());
    save_csv(output, &rows)
}

fn run_format_supplementary(input: &Path, multi_output: &Path, output: &Path, genus: &str) -> Result<()> {
    println!("\n--- Supplementary Data: {} ---", input.display());

    let raw = supplementary::read_specimen_matrix(input)
        .with_context(|| format!("Failed to read specimen matrix {}", input.display()))?;
    println!("Read {} specimens.", raw.len());

    let formatted = supplementary::format_supplementary(raw, &TraitLayout::default(), genus)
        .context("Failed to format supplementary data")?;

    println!(
        "Formatted {} taxa; {} codes with several values.",
        formatted.formatted.len(),
        formatted.multi_value.len()
    );
    save_csv(multi_output, &formatted.multi_value)?;
    formatted
        .formatted
        .write_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

// ============================================================================
// LLM Stages
// ============================================================================

fn read_appendix(path: &Path) -> Result<Vec<AppendixEntry>> {
    read_records(path).with_context(|| format!("Failed to read appendix {}", path.display()))
}

async fn run_categorise(llm: LlmConfig, sentences_path: &Path, appendix_paths: &[PathBuf], output: &Path) -> Result<()> {
    println!("\n--- Categorise Sentences ---");

    let rows: Vec<SentenceRow> = read_records(sentences_path)
        .with_context(|| format!("Failed to read {}", sentences_path.display()))?;
    let mut entries = Vec::new();
    for path in appendix_paths {
        entries.extend(read_appendix(path)?);
    }

    let client = OllamaClient::new(llm.clone())?;
    let runner = PromptRunner::new(&client, llm.concurrency);
    println!(
        "Categorising {} sentences with {} ({} concurrent requests)...",
        rows.len(),
        llm.model,
        llm.concurrency
    );

    let categorised = sentences::categorise_sentences(&runner, &rows, &entries).await;
    let assigned = categorised.iter().filter(|s| !s.subject_extract.is_empty()).count();
    println!("Categorised {} / {} sentences.", assigned, categorised.len());

    save_csv(output, &categorised)?;
    report_usage(runner.usage(), output)
}

async fn run_extraction(
    llm: LlmConfig,
    kind: ExtractionKind,
    sentences_path: &Path,
    appendix_path: &Path,
    output: &Path,
) -> Result<()> {
    println!("\n--- Trait Extraction ({:?}) ---", kind);

    let rows: Vec<CategorisedSentence> = read_records(sentences_path)
        .with_context(|| format!("Failed to read {}", sentences_path.display()))?;
    let entries = read_appendix(appendix_path)?;

    let client = OllamaClient::new(llm.clone())?;
    let runner = PromptRunner::new(&client, llm.concurrency);

    let table = extraction::extract_traits(&runner, kind, &rows, &entries)
        .await
        .context("Trait extraction failed")?;

    println!("Extracted {} columns for {} taxa.", table.headers().len().saturating_sub(1), table.len());
    table
        .write_csv(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    report_usage(runner.usage(), output)
}

async fn run_describe_quantitative(llm: LlmConfig, appendix_path: &Path, data_path: &Path, output: &Path) -> Result<()> {
    println!("\n--- Quantitative Descriptions ---");

    let entries = read_appendix(appendix_path)?;
    let data = Table::read_csv(data_path).with_context(|| format!("Failed to read {}", data_path.display()))?;

    let client = OllamaClient::new(llm.clone())?;
    let runner = PromptRunner::new(&client, llm.concurrency);

    let sentences = description::describe_quantitative(&runner, &entries, &data)
        .await
        .context("Quantitative description failed")?;

    println!("Generated {} sentences.", sentences.len());
    save_csv(output, &sentences)?;
    report_usage(runner.usage(), output)
}

async fn run_describe_qualitative(
    llm: LlmConfig,
    appendix_path: &Path,
    data_path: &Path,
    multi_path: &Path,
    output: &Path,
) -> Result<()> {
    println!("\n--- Qualitative Descriptions ---");

    let entries = read_appendix(appendix_path)?;
    let data = Table::read_csv(data_path).with_context(|| format!("Failed to read {}", data_path.display()))?;
    let multi: Vec<MultiValueRow> =
        read_records(multi_path).with_context(|| format!("Failed to read {}", multi_path.display()))?;

    let client = OllamaClient::new(llm.clone())?;
    let runner = PromptRunner::new(&client, llm.concurrency);

    let sentences = description::describe_qualitative(&runner, &entries, &data, &multi, &TraitLayout::default())
        .await
        .context("Qualitative description failed")?;

    println!("Generated {} sentences.", sentences.len());
    save_csv(output, &sentences)?;
    report_usage(runner.usage(), output)
}

async fn run_combine(llm: LlmConfig, app1: &Path, app2: &Path, output: &Path, subject_sentences: bool) -> Result<()> {
    println!("\n--- Combine Descriptions ---");

    let mut all: Vec<DescriptionSentence> =
        read_records(app1).with_context(|| format!("Failed to read {}", app1.display()))?;
    all.extend(
        read_records::<DescriptionSentence>(app2).with_context(|| format!("Failed to read {}", app2.display()))?,
    );

    let client = OllamaClient::new(llm.clone())?;
    let runner = PromptRunner::new(&client, llm.concurrency);

    let rows = combine::combine_sentences(&runner, &all)
        .await
        .context("Combining descriptions failed")?;

    if subject_sentences {
        println!("Combined into {} subject sentences.", rows.len());
        save_csv(output, &rows)?;
    } else {
        let descriptions = combine::join_by_taxon(&rows);
        println!("Combined into {} descriptions.", descriptions.len());
        save_csv(output, &descriptions)?;
    }
    report_usage(runner.usage(), output)
}

// ============================================================================
// Helpers
// ============================================================================

/// Save records; an empty result still gets a header-only file for the next stage
fn save_csv<T: CsvRecord>(path: &Path, data: &[T]) -> Result<()> {
    if data.is_empty() {
        println!("No rows for {:?}, writing header only", path);
    }
    write_records(data, path).with_context(|| format!("Failed to write {}", path.display()))
}

/// Print token usage and record it in `<output>.usage.log`
fn report_usage(usage: TokenUsage, output: &Path) -> Result<()> {
    let usage_path = output.with_extension("usage.log");
    let usage_line = format!(
        "{},{},{},{}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.total_tokens
    );
    std::fs::write(&usage_path, &usage_line).context("Failed to write token usage log")?;

    info!(
        prompt_tokens = usage.prompt_tokens,
        completion_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        "Token usage"
    );
    println!(
        "Token usage: {} prompt + {} completion = {} total",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );
    Ok(())
}
