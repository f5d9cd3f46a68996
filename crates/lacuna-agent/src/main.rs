//! Lacuna — finds papers that fill research gaps.
//! Entry point for the command-line binary.

mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::broadcast;

use lacuna_common::SandboxClient;
use lacuna_discovery::aggregator::{AggregatorConfig, SearchAggregator};
use lacuna_discovery::enrich::{Enricher, HttpPageFetcher};
use lacuna_discovery::query::QueryGenerator;
use lacuna_discovery::ranker::{LlmReranker, Ranker};
use lacuna_discovery::sources::{build_adapter, SourceAdapter, SourceKind, SourceSettings};
use lacuna_discovery::store::NotionStore;
use lacuna_discovery::{GapFillOrchestrator, GapFillRequest};
use lacuna_llm::{AnthropicBackend, BackendGenerator, ChatCompletionsBackend, LlmBackend, TextGenerator};

#[derive(Parser, Debug)]
#[command(name = "lacuna", version, about = "Find papers that fill research gaps")]
struct Cli {
    /// Path to lacuna.toml (defaults to LACUNA_CONFIG, then ./lacuna.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search all enabled sources for a paper addressing a gap
    Find {
        /// Research gap description
        #[arg(long)]
        gap: String,
        /// Key concept (repeatable)
        #[arg(long = "concept")]
        concepts: Vec<String>,
        /// Title of the paper whose gap is being filled
        #[arg(long, default_value = "")]
        title: String,
        /// Enrich the selected paper and add it to the knowledge store
        #[arg(long)]
        add: bool,
        /// Enrich the selected paper without storing it
        #[arg(long)]
        enrich: bool,
    },
    /// Fetch and analyze a single paper page
    Enrich {
        url: String,
    },
    /// List the sources that would be queried
    Sources,
}

fn build_generator(config: &config::Config) -> anyhow::Result<Option<Arc<dyn TextGenerator>>> {
    let llm = &config.llm;
    let model = llm.model_or_default();
    let key = llm.api_key.clone().filter(|k| !k.trim().is_empty());
    let client = SandboxClient::with_timeout(Duration::from_secs(llm.timeout_secs))?;

    let backend: Arc<dyn LlmBackend> = match llm.backend.as_str() {
        "none" | "" => return Ok(None),
        "ollama" => Arc::new(ChatCompletionsBackend::ollama(&llm.base_url_or_default(), model, client)?),
        "openai_compatible" => Arc::new(ChatCompletionsBackend::compatible(&llm.base_url_or_default(), model, key, client)?),
        "openai" => match key {
            Some(k) => Arc::new(ChatCompletionsBackend::openai(k, model, client)),
            None => {
                tracing::warn!("OpenAI configured but no API key found (set llm.api_key or OPENAI_API_KEY)");
                return Ok(None);
            }
        },
        "anthropic" => match key {
            Some(k) => Arc::new(AnthropicBackend::new(k, model, client)),
            None => {
                tracing::warn!("Anthropic configured but no API key found (set llm.api_key or ANTHROPIC_API_KEY)");
                return Ok(None);
            }
        },
        other => {
            tracing::warn!(backend = other, "Unknown LLM backend, continuing without one");
            return Ok(None);
        }
    };

    tracing::info!(backend = %llm.backend, model = backend.model_id(), "LLM backend ready");
    Ok(Some(Arc::new(
        BackendGenerator::new(backend)
            .with_max_tokens(llm.max_tokens)
            .with_temperature(llm.temperature),
    )))
}

fn build_adapters(config: &config::Config) -> anyhow::Result<Vec<Arc<dyn SourceAdapter>>> {
    let timeout = Duration::from_secs(config.search.request_timeout_secs);
    let mut adapters = Vec::new();

    for name in &config.search.enabled {
        let kind: SourceKind = name.parse()?;
        let source = config.source(kind.as_str());
        let settings = SourceSettings {
            base_url: source.base_url,
            api_key: source.api_key,
            timeout: Some(timeout),
        };
        if kind == SourceKind::Ieee && settings.api_key.is_none() {
            tracing::warn!("IEEE Xplore enabled but no API key found (set sources.ieee.api_key or IEEE_API_KEY), skipping");
            continue;
        }
        adapters.push(build_adapter(kind, &settings)?);
    }
    Ok(adapters)
}

fn build_orchestrator(config: &config::Config) -> anyhow::Result<GapFillOrchestrator> {
    let aggregator = SearchAggregator::new(
        build_adapters(config)?,
        AggregatorConfig {
            per_source_limit: config.search.per_source_limit,
            request_timeout: Duration::from_secs(config.search.request_timeout_secs),
            deadline: Duration::from_secs(config.search.deadline_secs),
        },
    )?;

    let generator = build_generator(config)?;
    let llm_timeout = Duration::from_secs(config.llm.timeout_secs);
    let fetcher = HttpPageFetcher::new(Duration::from_secs(config.enrichment.fetch_timeout_secs))?;
    let mut enricher = Enricher::new(Arc::new(fetcher))
        .with_themes(config.enrichment.themes.clone())
        .with_analysis_timeout(llm_timeout);
    let mut queries = QueryGenerator::new().with_timeout(llm_timeout);
    let mut ranker = Ranker::new().with_timeout(llm_timeout);

    if let Some(generator) = generator {
        enricher = enricher.with_analyzer(generator.clone());
        queries = queries.with_generator(generator.clone());
        if config.llm.rerank {
            ranker = ranker.with_reranker(Arc::new(LlmReranker::new(generator)));
        }
    }

    let mut orchestrator = GapFillOrchestrator::new(aggregator, enricher)
        .with_query_generator(queries)
        .with_ranker(ranker);

    match config.store.credentials() {
        Some((key, database_id)) => {
            let store = NotionStore::new(key, database_id)?.with_version(config.store.notion_version.clone());
            orchestrator = orchestrator.with_store(Arc::new(store));
        }
        None => tracing::info!("No Notion credentials; known-paper filtering disabled"),
    }

    Ok(orchestrator)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("lacuna=debug,info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Sources => {
            let adapters = build_adapters(&config)?;
            let ids: Vec<&str> = adapters.iter().map(|a| a.id()).collect();
            print_json(&ids)?;
        }
        Command::Enrich { url } => {
            let orchestrator = build_orchestrator(&config)?;
            let record = orchestrator
                .enrich(&url)
                .await
                .with_context(|| format!("enriching {url}"))?;
            print_json(&record)?;
        }
        Command::Find { gap, concepts, title, add, enrich } => {
            let (tx, mut rx) = broadcast::channel(16);
            let orchestrator = build_orchestrator(&config)?.with_events(tx);

            let listener = tokio::spawn(async move {
                while let Ok(event) = rx.recv().await {
                    tracing::info!(
                        run_id = %event.run_id,
                        paper = %event.selected_paper.title,
                        store_url = ?event.store_url,
                        "Gap-filling paper found"
                    );
                }
            });

            let request = GapFillRequest { gap_text: gap, key_concepts: concepts, original_title: title };
            tracing::info!(sources = ?orchestrator.aggregator().source_ids(), "Starting gap-fill search");

            if add || enrich {
                let report = orchestrator.run(&request, add).await;
                print_json(&report)?;
            } else {
                let result = orchestrator.find(&request).await;
                print_json(&result)?;
            }

            // Closing the channel ends the listener.
            drop(orchestrator);
            listener.await.ok();
        }
    }

    Ok(())
}
