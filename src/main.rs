use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use lamp_core::citation::{article_url_for_source, pmcid_from_source};
use lamp_core::config::{Config, IndexConfig, ProviderKind};
use lamp_core::time::format_elapsed;
use lamp_core::{Answer, RagService, Reranker};
use lamp_gateway::GatewayServer;
use lamp_index::document::TextSplitter;
use lamp_index::{FlatIndex, IngestOutcome, IngestionPipeline, InputType, discover_files};
use lamp_llm::LlmProvider;
use lamp_llm::any::AnyProvider;
use tokio::sync::watch;

/// Retrieval-augmented question answering over `PubMed` Central articles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "LAMP_CONFIG", default_value = "config/default.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a vector index from a directory of articles
    Index(IndexArgs),
    /// Serve the HTTP query endpoint
    Serve,
    /// Answer a single question and print the cited sources
    Ask {
        question: String,
        /// Print the full answer as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Overrides for the `[index]` section.
#[derive(Args, Debug, Default)]
struct IndexArgs {
    /// Directory searched recursively for input files
    #[arg(long)]
    document_path: Option<PathBuf>,
    #[arg(long)]
    max_files: Option<usize>,
    /// Files loaded, embedded, and indexed together
    #[arg(long)]
    group_size: Option<usize>,
    #[arg(long)]
    chunk_size: Option<usize>,
    #[arg(long)]
    chunk_overlap: Option<usize>,
    /// json, md, txt, or pdf
    #[arg(long)]
    input_type: Option<InputType>,
    /// Directory the index is written to
    #[arg(long)]
    output: Option<PathBuf>,
}

impl IndexArgs {
    fn apply(&self, index: &mut IndexConfig) {
        if let Some(path) = &self.document_path {
            index.document_path = path.display().to_string();
        }
        if let Some(n) = self.max_files {
            index.max_files = n;
        }
        if let Some(n) = self.group_size {
            index.group_size = n;
        }
        if let Some(n) = self.chunk_size {
            index.chunk_size = n;
        }
        if let Some(n) = self.chunk_overlap {
            index.chunk_overlap = n;
        }
        if let Some(t) = self.input_type {
            index.input_type = t;
        }
        if let Some(path) = &self.output {
            index.path = path.display().to_string();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config = finalize_config(Config::load(&cli.config)?, &cli.command)?;
    match cli.command {
        Command::Index(_) => run_index(&config).await,
        Command::Serve => serve(&config).await,
        Command::Ask { question, json } => ask(&config, &question, json).await,
    }
}

/// Apply command-line overrides, then check only the sections the command uses.
fn finalize_config(mut config: Config, command: &Command) -> anyhow::Result<Config> {
    match command {
        Command::Index(args) => {
            args.apply(&mut config.index);
            config.validate_index()?;
        }
        Command::Serve | Command::Ask { .. } => config.validate_query()?,
    }
    Ok(config)
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run_index(config: &Config) -> anyhow::Result<()> {
    let started = Instant::now();
    let index_cfg = &config.index;

    let files = discover_files(
        Path::new(&index_cfg.document_path),
        index_cfg.input_type,
        index_cfg.max_files,
    )
    .with_context(|| format!("cannot read document path {}", index_cfg.document_path))?;

    let provider = create_provider(config)?;
    let splitter = TextSplitter::new(
        index_cfg
            .input_type
            .splitter_config(index_cfg.chunk_size, index_cfg.chunk_overlap),
    )?;
    let pipeline = IngestionPipeline::new(
        &provider,
        index_cfg.input_type.loader(),
        splitter,
        index_cfg.group_size,
    );

    let outcome = pipeline.run(&files, Path::new(&index_cfg.path)).await?;
    let report = outcome.report();
    let elapsed = format_elapsed(started.elapsed());
    match &outcome {
        IngestOutcome::Indexed { .. } => {
            tracing::info!(path = %index_cfg.path, %elapsed, "index built");
            println!(
                "Indexed {} documents ({} chunks) from {} files into {} in {elapsed}",
                report.documents_indexed,
                report.chunks_indexed,
                report.files_total,
                index_cfg.path
            );
        }
        IngestOutcome::NoIndex(_) => {
            tracing::warn!(%elapsed, "no index produced");
            println!(
                "No index produced: none of {} files yielded indexable text ({elapsed})",
                report.files_total
            );
        }
    }
    println!(
        "Groups: {} total, {} indexed, {} skipped; {} files skipped",
        report.groups_total,
        report.groups_indexed,
        report.groups_skipped,
        report.skipped_files.len()
    );
    Ok(())
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(build_service(config).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let gateway = &config.gateway;
    GatewayServer::new(&gateway.bind, gateway.port, service, shutdown_rx)?
        .with_auth(gateway.auth_token.clone())
        .with_rate_limit(gateway.rate_limit)
        .with_max_body_size(gateway.max_body_size)
        .serve()
        .await?;
    Ok(())
}

async fn ask(config: &Config, question: &str, json: bool) -> anyhow::Result<()> {
    let service = build_service(config).await?;
    let answer = service.answer(question).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
    } else {
        print!("{}", render_answer(&answer));
    }
    Ok(())
}

fn render_answer(answer: &Answer) -> String {
    use std::fmt::Write as _;

    let mut out = format!("{}\n\nReferences:\n", answer.answer.trim());
    for (i, reference) in answer.references.iter().enumerate() {
        let label = pmcid_from_source(&reference.source).unwrap_or(&reference.source);
        let _ = write!(out, "  [{}] {label} (score {:.3})", i + 1, reference.score);
        if let Some(url) = article_url_for_source(&reference.source) {
            let _ = write!(out, " {url}");
        }
        out.push('\n');
    }
    out
}

/// Load the index and models. Any failure here means the service must not start.
async fn build_service(config: &Config) -> anyhow::Result<RagService<AnyProvider>> {
    let index_path = Path::new(&config.index.path);
    let index = FlatIndex::load(index_path)
        .with_context(|| format!("failed to load index from {}", index_path.display()))?;

    let provider = create_provider(config)?;
    let reranker = create_reranker(config, &provider)?;
    let service = RagService::new(
        provider,
        Arc::new(index),
        reranker,
        config.prompt_template(),
        config.retrieval_settings(),
    );
    service
        .verify_index()
        .await
        .context("index is incompatible with the configured embedding model")?;
    Ok(service)
}

fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        #[cfg(feature = "candle")]
        ProviderKind::Candle => {
            use lamp_llm::candle_provider::CandleProvider;
            use lamp_llm::candle_provider::generate::GenerationConfig;
            use lamp_llm::candle_provider::loader::ModelSource;
            use lamp_llm::candle_provider::template::ChatTemplate;

            let candle_cfg = &config.llm.candle;
            let source = match candle_cfg.source.as_str() {
                "local" => ModelSource::Local {
                    path: PathBuf::from(&candle_cfg.local_path),
                },
                _ => ModelSource::HuggingFace {
                    repo_id: candle_cfg.repo_id.clone(),
                    filename: candle_cfg.filename.clone(),
                    tokenizer_repo: candle_cfg.tokenizer_repo.clone(),
                },
            };
            let generation = &config.llm.generation;
            let gen_config = GenerationConfig {
                temperature: generation.temperature,
                top_p: generation.top_p,
                top_k: generation.top_k,
                max_tokens: generation.capped_max_new_tokens(),
                seed: generation.seed,
                repeat_penalty: generation.repeat_penalty,
                repeat_last_n: generation.repeat_last_n,
            };
            let device = select_device(&config.llm.device)?;

            let provider = CandleProvider::new(
                &source,
                ChatTemplate::parse_str(&candle_cfg.chat_template),
                gen_config,
                &config.llm.embedding_model,
                config.llm.embedding_max_seq_len,
                device,
            )
            .context("failed to load models")?;
            tracing::info!(device = provider.device_name(), "candle models loaded");
            Ok(AnyProvider::Candle(provider))
        }
        #[cfg(feature = "mock")]
        ProviderKind::Mock => Ok(AnyProvider::Mock(lamp_llm::mock::MockProvider::default())),
        #[allow(unreachable_patterns)]
        other => bail!("LLM provider {other} not available (feature not enabled)"),
    }
}

fn create_reranker(config: &Config, provider: &AnyProvider) -> anyhow::Result<Reranker> {
    let Some(repo) = config.retrieval.reranker.as_deref() else {
        return Ok(Reranker::None);
    };
    tracing::info!(reranker = repo, "loading reranker");
    match *provider {
        #[cfg(feature = "candle")]
        AnyProvider::Candle(ref p) => {
            let scorer = p
                .load_reranker(repo)
                .with_context(|| format!("failed to load reranker {repo}"))?;
            Ok(Reranker::Model(Arc::new(scorer)))
        }
        #[cfg(feature = "mock")]
        AnyProvider::Mock(_) => Ok(Reranker::Model(Arc::new(
            lamp_llm::mock::MockScorer::default(),
        ))),
        #[allow(unreachable_patterns)]
        _ => bail!("provider {} cannot load a reranker", provider.name()),
    }
}

#[cfg(feature = "candle")]
fn select_device(preference: &str) -> anyhow::Result<lamp_llm::candle_provider::Device> {
    use lamp_llm::candle_provider::Device;

    match preference {
        "metal" => {
            #[cfg(feature = "metal")]
            return Ok(Device::new_metal(0)?);
            #[cfg(not(feature = "metal"))]
            bail!("candle compiled without metal feature");
        }
        "cuda" => {
            #[cfg(feature = "cuda")]
            return Ok(Device::new_cuda(0)?);
            #[cfg(not(feature = "cuda"))]
            bail!("candle compiled without cuda feature");
        }
        "auto" => {
            #[cfg(feature = "metal")]
            if let Ok(device) = Device::new_metal(0) {
                return Ok(device);
            }
            #[cfg(feature = "cuda")]
            if let Ok(device) = Device::new_cuda(0) {
                return Ok(device);
            }
            Ok(Device::Cpu)
        }
        other => {
            tracing::warn!("unknown device '{other}', using cpu");
            Ok(Device::Cpu)
        }
    }
}

#[cfg(test)]
mod tests {
    use lamp_core::RetrievedCandidate;

    use super::*;

    #[test]
    fn cli_parses_index_overrides() {
        let cli = Cli::try_parse_from([
            "lamp",
            "index",
            "--document-path",
            "corpus",
            "--group-size",
            "8",
            "--chunk-size",
            "50",
            "--chunk-overlap",
            "5",
            "--input-type",
            "markdown",
            "--output",
            "out/idx",
        ])
        .unwrap();
        let Command::Index(args) = cli.command else {
            panic!("expected index command");
        };

        let mut index = IndexConfig::default();
        args.apply(&mut index);
        assert_eq!(index.document_path, "corpus");
        assert_eq!(index.group_size, 8);
        assert_eq!(index.chunk_size, 50);
        assert_eq!(index.chunk_overlap, 5);
        assert_eq!(index.input_type, InputType::Md);
        assert_eq!(index.path, "out/idx");
        assert_eq!(index.max_files, 250_000);
    }

    #[test]
    fn index_flags_fix_config_before_validation() {
        let mut config = Config::default();
        config.index.chunk_size = 10;
        config.index.chunk_overlap = 20;

        let cli = Cli::try_parse_from(["lamp", "index", "--chunk-size", "100"]).unwrap();
        let config = finalize_config(config, &cli.command).unwrap();
        assert_eq!(config.index.chunk_size, 100);

        let mut broken = Config::default();
        broken.index.chunk_overlap = broken.index.chunk_size;
        let cli = Cli::try_parse_from(["lamp", "index"]).unwrap();
        assert!(finalize_config(broken, &cli.command).is_err());
    }

    #[test]
    fn query_commands_ignore_index_settings() {
        let mut config = Config::default();
        config.index.group_size = 0;
        let cli = Cli::try_parse_from(["lamp", "ask", "q"]).unwrap();
        assert!(finalize_config(config, &cli.command).is_ok());

        let mut config = Config::default();
        config.retrieval.num_docs_final = 0;
        let cli = Cli::try_parse_from(["lamp", "serve"]).unwrap();
        assert!(finalize_config(config, &cli.command).is_err());
    }

    #[test]
    fn cli_rejects_unknown_input_type() {
        assert!(Cli::try_parse_from(["lamp", "index", "--input-type", "docx"]).is_err());
    }

    #[test]
    fn cli_parses_ask_with_global_config() {
        let cli =
            Cli::try_parse_from(["lamp", "ask", "What is BRCA1?", "--config", "x.toml", "--json"])
                .unwrap();
        assert_eq!(cli.config, PathBuf::from("x.toml"));
        assert!(matches!(
            cli.command,
            Command::Ask { ref question, json: true } if question == "What is BRCA1?"
        ));
    }

    #[test]
    fn render_answer_links_pmc_sources() {
        let answer = Answer {
            query: "q".into(),
            answer: "It depends.\n".into(),
            references: vec![
                RetrievedCandidate {
                    content: "c".into(),
                    source: "data/PMC42-article.json".into(),
                    score: 0.5,
                },
                RetrievedCandidate {
                    content: "c".into(),
                    source: "notes.md".into(),
                    score: 0.25,
                },
            ],
        };
        let text = render_answer(&answer);
        assert!(text.starts_with("It depends.\n\nReferences:\n"));
        assert!(text.contains(
            "[1] PMC42 (score 0.500) https://www.ncbi.nlm.nih.gov/pmc/articles/PMC42/"
        ));
        assert!(text.contains("[2] notes.md (score 0.250)\n"));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn create_provider_mock() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Mock;
        let provider = create_provider(&config).unwrap();
        assert!(matches!(provider, AnyProvider::Mock(_)));
    }

    #[cfg(feature = "mock")]
    #[test]
    fn reranker_follows_config() {
        let mut config = Config::default();
        config.llm.provider = ProviderKind::Mock;
        let provider = create_provider(&config).unwrap();
        assert!(!create_reranker(&config, &provider).unwrap().is_enabled());

        config.retrieval.reranker = Some("cross-encoder/ms-marco-MiniLM-L-6-v2".into());
        assert!(create_reranker(&config, &provider).unwrap().is_enabled());
    }

    #[cfg(not(feature = "candle"))]
    #[test]
    fn candle_provider_unavailable_without_feature() {
        let config = Config::default();
        let err = create_provider(&config).unwrap_err();
        assert!(err.to_string().contains("not available"));
    }

    #[cfg(feature = "candle")]
    #[test]
    fn select_device_cpu_default() {
        let device = select_device("cpu").unwrap();
        assert!(matches!(device, lamp_llm::candle_provider::Device::Cpu));
    }

    #[cfg(all(feature = "candle", not(feature = "cuda")))]
    #[test]
    fn select_device_cuda_without_feature_errors() {
        let err = select_device("cuda").unwrap_err();
        assert!(err.to_string().contains("cuda feature"));
    }

    #[cfg(feature = "candle")]
    #[test]
    fn select_device_auto_fallback() {
        let device = select_device("auto").unwrap();
        assert!(matches!(
            device,
            lamp_llm::candle_provider::Device::Cpu
                | lamp_llm::candle_provider::Device::Cuda(_)
                | lamp_llm::candle_provider::Device::Metal(_)
        ));
    }
}
