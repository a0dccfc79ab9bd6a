use clap::{Parser, ValueEnum};
use research::activity::{ActivityReporter, FanoutReporter, MarkdownReporter, TracingReporter};
use research::fetch::{FetcherRegistry, HttpFetcher, SocialFetcher};
use research::knowledge::LocalKnowledgeBase;
use research::ledger::SourceKind;
use research::synth::LlmSynthesizer;
use research::{OrchestratorBuilder, ResearchTarget, Result, RunConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

/// Research a small business from its public web presence and report
/// evidence-backed AI opportunities.
#[derive(Parser, Debug)]
#[command(name = "research", version)]
struct Cli {
    /// Company website
    #[arg(long)]
    website: String,

    /// Social profile url (Instagram, Facebook); may be repeated
    #[arg(long)]
    social: Vec<String>,

    /// Any other page about the company; may be repeated
    #[arg(long)]
    url: Vec<String>,

    /// City or country used to narrow social page searches
    #[arg(long, default_value = "Singapore")]
    location: String,

    /// Question to run against the local knowledge base
    #[arg(long)]
    knowledge_query: Option<String>,

    /// Directory of .txt / .md documents to search
    #[arg(long)]
    knowledge_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 3)]
    top_k: usize,

    #[arg(long, default_value_t = 30)]
    source_timeout_secs: u64,

    #[arg(long, default_value_t = 90)]
    overall_timeout_secs: u64,

    /// Verified claims each opportunity needs to be kept
    #[arg(long, default_value_t = 1)]
    min_evidence: usize,

    #[arg(long, env = "RESEARCH_MODEL", default_value = "gpt-4o")]
    model: String,

    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,

    /// Also write a markdown activity log to this file
    #[arg(long)]
    activity_log: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,

    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn init_tracing(quiet: bool, verbose: bool) {
    let level = if quiet {
        "error"
    } else if verbose {
        "research=debug,agent=debug,info"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("RESEARCH_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn reporter(cli: &Cli, target: &ResearchTarget) -> Result<Arc<dyn ActivityReporter>> {
    let mut reporter = FanoutReporter::new().with(Arc::new(TracingReporter));
    if let Some(path) = &cli.activity_log {
        let file = std::fs::File::create(path)?;
        let name = target.primary().host_str().unwrap_or("research run");
        reporter = reporter.with(Arc::new(MarkdownReporter::new(name, file)?));
    }
    Ok(Arc::new(reporter))
}

async fn run(cli: Cli) -> Result<()> {
    let target = ResearchTarget::new(
        &cli.website,
        cli.social.iter().chain(cli.url.iter()).map(String::as_str),
    )?;

    let http = Arc::new(HttpFetcher::new()?);
    let social = SocialFetcher::new()?.with_location(&cli.location);
    let fetchers = FetcherRegistry::new(http).route(SourceKind::Social, Arc::new(social));

    let mut builder = OrchestratorBuilder::new()
        .fetchers(fetchers)
        .synthesizer(Arc::new(LlmSynthesizer::new(agent::llm::OpenAI::new(
            cli.model.clone(),
        ))))
        .reporter(reporter(&cli, &target)?)
        .config(RunConfig {
            per_source_timeout: Duration::from_secs(cli.source_timeout_secs),
            overall_timeout: Duration::from_secs(cli.overall_timeout_secs),
            min_evidence: cli.min_evidence,
            top_k: cli.top_k,
        });

    if let Some(dir) = &cli.knowledge_dir {
        builder = builder.retriever(Arc::new(LocalKnowledgeBase::load_dir(dir).await?));
    }
    let orchestrator = builder.build()?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    let report = orchestrator
        .run(target, cli.knowledge_query.as_deref(), &cancel)
        .await?;

    match cli.format {
        Format::Markdown => println!("{}", report.to_markdown()),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    if let Err(err) = run(cli).await {
        tracing::error!(error = %err, "research run failed");
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
