use anyhow::Context;
use clap::Parser;
use news_aggregator::config::{AddSourceArgs, ArticlesArgs, Cli, Command, RunArgs};
use news_aggregator::{
    build_jobs, Aggregator, AggregatorState, NotificationBus, PgBus, PgStore, ProviderRegistry, SourceService,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let store = Arc::new(
        PgStore::connect(&cli.database_url)
            .await
            .context("connecting to PostgreSQL")?,
    );
    store.migrate().await.context("running migrations")?;
    let bus: Arc<dyn NotificationBus> = Arc::new(PgBus::new(store.pool().clone()));

    match cli.command {
        Command::Run(args) => run(args, store, bus).await,
        Command::AddSource(args) => add_source(args, store, bus).await,
        Command::Articles(args) => articles(args, store, bus).await,
    }
}

async fn run(args: RunArgs, store: Arc<PgStore>, bus: Arc<dyn NotificationBus>) -> anyhow::Result<()> {
    let registry = Arc::new(ProviderRegistry::with_defaults(args.fetch.fetch_config())?);
    let jobs = build_jobs(store.as_ref(), store.clone(), &registry)
        .await
        .context("loading providers")?;

    let mut aggregator = Aggregator::new(
        jobs,
        args.aggregator_config(),
        bus,
        store.clone(),
        store,
        registry,
    );

    info!("news-aggregator starting");

    // Start-up can take a while with delayed starts, so let Ctrl+C cut it short
    let interrupted = tokio::select! {
        started = aggregator.start() => {
            started.context("starting aggregator")?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if !interrupted {
        info!("Aggregator running, press Ctrl+C to stop");
        tokio::signal::ctrl_c().await.context("listening for Ctrl+C")?;
    }

    info!("Shutdown requested");
    if aggregator.state() == AggregatorState::Running {
        aggregator.stop().await?;
        aggregator.wait().await;
    } else {
        warn!("Interrupted before the aggregator was running");
    }

    info!("news-aggregator exited cleanly");
    Ok(())
}

async fn add_source(args: AddSourceArgs, store: Arc<PgStore>, bus: Arc<dyn NotificationBus>) -> anyhow::Result<()> {
    let registry = Arc::new(ProviderRegistry::with_defaults(Default::default())?);
    let service = SourceService::new(store.clone(), store, bus, registry, args.poll_limits());

    let id = service
        .register_source(&args.provider_type, &args.label, &args.feed_url, args.poll_secs)
        .await
        .with_context(|| format!("registering `{}`", args.label))?;

    println!("{}", id);
    Ok(())
}

async fn articles(args: ArticlesArgs, store: Arc<PgStore>, bus: Arc<dyn NotificationBus>) -> anyhow::Result<()> {
    let service = SourceService::new(
        store.clone(),
        store,
        bus,
        Arc::new(ProviderRegistry::new()),
        Default::default(),
    );

    let page = service
        .articles(args.offset, args.count, &args.categories, &args.providers)
        .await
        .context("reading articles")?;

    for article in &page {
        println!("{}", serde_json::to_string(article)?);
    }
    Ok(())
}
