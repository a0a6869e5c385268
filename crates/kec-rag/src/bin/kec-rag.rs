//! KEC RAG command line
//!
//! Run with: cargo run -p kec-rag --features cli -- context --docs ./docs "접지저항 계산"

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use kec_rag::generation::{parse_structured, GeneratedAnswer, ParseOutcome, PromptBuilder};
use kec_rag::retrieval::ContextOptions;
use kec_rag::{RagConfig, RagServices, ValidationContext};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "kec-rag", about = "Grounded context and answer validation for KEC documents", version)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use deterministic hashing embeddings instead of Ollama
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the assembled context for a query
    Context {
        /// Directory of .txt/.md documents
        #[arg(long)]
        docs: PathBuf,
        /// Topic profile key (e.g. lighting, grounding)
        #[arg(long)]
        topic: Option<String>,
        /// Print the full generation prompt instead of the context
        #[arg(long)]
        prompt: bool,
        /// Query text
        query: String,
    },

    /// Validate an answer and print the result as JSON
    Validate {
        /// Directory of .txt/.md documents
        #[arg(long)]
        docs: PathBuf,
        /// Question the answer responds to
        #[arg(long)]
        question: String,
        /// File holding the answer (plain text or generator JSON)
        #[arg(long)]
        answer: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kec_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => RagConfig::default(),
    };

    let services = RagServices::from_config(config, cli.offline)?;

    match cli.command {
        Command::Context {
            docs,
            topic,
            prompt,
            query,
        } => {
            ingest(&services, &docs).await?;

            let context = match topic {
                Some(topic) => services.assembler().get_context_for_agent(&query, &topic).await,
                None => {
                    let defaults = &services.config().context;
                    let options = ContextOptions {
                        top_k: defaults.default_top_k,
                        max_tokens: defaults.default_max_tokens,
                        min_score: defaults.min_score,
                        topic: None,
                    };
                    services.assembler().get_context(&query, &options).await
                }
            };

            if prompt {
                println!("{}", PromptBuilder::build_rag_prompt(&query, &context));
            } else if context.is_empty() {
                println!("No relevant context found.");
            } else {
                println!("{}", context.formatted);
                println!("\n-- {} chunks, {} tokens, sources: {}", context.results.len(), context.total_tokens, context.sources.join(", "));
            }
        }

        Command::Validate { docs, question, answer } => {
            ingest(&services, &docs).await?;

            let raw = std::fs::read_to_string(&answer)
                .with_context(|| format!("reading answer from {}", answer.display()))?;

            let (text, context) = match parse_structured::<GeneratedAnswer>(&raw) {
                ParseOutcome::Parsed { value, strategy } => {
                    tracing::info!("Answer parsed as generator JSON ({:?})", strategy);
                    let text = value.full_text();
                    let mut context = ValidationContext::new(&question);
                    if let Some(confidence) = value.confidence {
                        context = context.with_generator_confidence(confidence);
                    }
                    let claims = value.into_claims();
                    if !claims.is_empty() {
                        context = context.with_claims(claims);
                    }
                    (text, context)
                }
                ParseOutcome::Failed { .. } => (raw, ValidationContext::new(&question)),
            };

            let result = services.validator().validate(&text, &context).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}

async fn ingest(services: &RagServices, docs: &Path) -> anyhow::Result<()> {
    let report = services
        .pipeline()
        .ingest_directory(docs)
        .await
        .with_context(|| format!("ingesting {}", docs.display()))?;

    for failure in &report.failures {
        eprintln!("skipped {}: {}", failure.path.display(), failure.error);
    }
    if report.ingested.is_empty() {
        anyhow::bail!("no documents could be ingested from {}", docs.display());
    }
    Ok(())
}
