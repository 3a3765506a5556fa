use anyhow::Context;
use clap::{value_parser, Arg, Command};
use futures::StreamExt;
use qa_artifact::{InMemoryArtifactStore, SuiteId};
use qa_core::{router, ApiState, PipelineConfig, WorkflowCoordinator};
use qa_generation::{DirectoryDocumentSource, GenerationEnv, OpenAiClient, RequirementsCache};
use qa_versioning::{InMemoryEventLog, InMemorySuiteStore, VersionManager};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "qa_core=info,qa_generation=info,qa_versioning=info";
const DEFAULT_LISTEN: &str = "127.0.0.1:8000";

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

/// Coordinator over in-memory stores, plus the suite store it writes to
fn build(config: &PipelineConfig) -> anyhow::Result<(WorkflowCoordinator, Arc<InMemorySuiteStore>)> {
    let client = OpenAiClient::new(&config.model).context("creating model client")?;
    let documents = DirectoryDocumentSource::new(&config.documents.blob_root, &config.documents.sessions_root);

    let suites = Arc::new(InMemorySuiteStore::new());
    let versions = VersionManager::new(
        Arc::new(InMemoryArtifactStore::new()),
        suites.clone(),
        Arc::new(InMemoryEventLog::new()),
    )
    .with_config(config.versioning.clone());
    let env = GenerationEnv::new(Arc::new(client), Arc::new(documents), versions)
        .with_config(config.generation.clone())
        .with_cache(RequirementsCache::new(config.generation.cached_suites));
    Ok((WorkflowCoordinator::new(env, config.workflow.clone()), suites))
}

async fn serve(config: PipelineConfig, listen: &str) -> anyhow::Result<()> {
    let (coordinator, suites) = build(&config)?;
    let app = router(ApiState::new(coordinator, suites));

    let addr: SocketAddr = listen.parse().with_context(|| format!("parsing listen address {listen}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("QA pipeline listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn chat(config: PipelineConfig, suite_id: SuiteId) -> anyhow::Result<()> {
    let (coordinator, suites) = build(&config)?;
    suites.create(suite_id.clone());

    tracing::info!("Chatting on suite {} with model {}", suite_id, config.model.model);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if matches!(message, "exit" | "quit") {
            break;
        }
        let mut turns = coordinator.run(message, suite_id.clone());
        while let Some(event) = turns.next().await {
            println!("{}", serde_json::to_string(&event)?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with_writer(std::io::stderr)
        .init();

    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file");

    let cli = Command::new("qa-pipeline")
        .version(qa_core::VERSION)
        .about("QA suite generation pipeline")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("chat")
                .about("Read messages from stdin and print turn events as JSON lines")
                .arg(
                    Arg::new("suite")
                        .long("suite")
                        .short('s')
                        .default_value("default")
                        .help("Suite to work on"),
                )
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("serve")
                .about("Serve /health, /run and /run/stream over HTTP")
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .short('l')
                        .default_value(DEFAULT_LISTEN)
                        .help("Address to bind"),
                )
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(config_arg),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("chat", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let suite = args
                .get_one::<String>("suite")
                .map_or_else(|| SuiteId::new("default"), |s| SuiteId::new(s.as_str()));
            chat(config, suite).await
        }
        Some(("serve", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            let listen = args
                .get_one::<String>("listen")
                .map_or(DEFAULT_LISTEN, String::as_str);
            serve(config, listen).await
        }
        Some(("config", args)) => {
            let config = load_config(args.get_one::<PathBuf>("config"))?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        _ => Ok(()),
    }
}
