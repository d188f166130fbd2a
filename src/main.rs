#[macro_use]
extern crate log;

mod cli;
mod http;
mod logging;

use std::sync::Arc;

use clap::Parser;
use meterbinder::kafka::{
    ConsumerGroupLagMetric, ConsumerGroupMemberCountMetric, ConsumerGroupStatesMetric,
    NonPreferredLeadersMetric, OutOfSyncReplicasMetric, RdKafkaAdminFactory, TopicRecordCountMetric,
    TopicRetentionMetric,
};
#[cfg(feature = "postgres")]
use meterbinder::postgres::{
    AutoVacuumMetrics, DatabaseMetrics, IndexMetrics, LockMetrics, PostgresConnector,
    PostgresTemplate, QueryMetrics, QueryTemplate, SettingsMetrics, StatioMetrics, TableSizeMetrics,
    TransactionMetrics, TupleMetrics,
};
use meterbinder::{prometheus_metrics, BinderResult, MeterBinder, RefreshHandle, Scheduler};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = parse_cli_and_init_logging();

    let shutdown_token = build_shutdown_token();

    let code = match run(cli, shutdown_token).await {
        Ok(()) => exit_code::SUCCESS,
        Err(e) => {
            error!("{e}");
            exit_code::FAILURE
        },
    };

    std::process::exit(code);
}

async fn run(cli: Cli, shutdown_token: CancellationToken) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(prometheus_metrics::init(cli.tags())?);
    let scheduler = Scheduler::current(shutdown_token.clone());

    let handles = attach_binders(&cli, &registry, &scheduler).await?;
    if handles.is_empty() {
        warn!("No binder configured: set '--brokers' and/or '--postgres-url'");
    }

    if cli.once {
        // Every binder has already refreshed once, before being returned
        print!("{}", http::encode(&registry)?);
        return Ok(());
    }

    http::init(cli.listen_on(), shutdown_token.clone(), registry).await?;

    scheduler.shutdown();
    for handle in handles {
        debug!("Waiting for '{}' to terminate", handle.name());
        handle.join().await;
    }
    info!("Shutdown complete");

    Ok(())
}

/// Attaches every binder enabled on the command line.
async fn attach_binders(
    cli: &Cli,
    registry: &Arc<Registry>,
    scheduler: &Scheduler,
) -> BinderResult<Vec<RefreshHandle>> {
    let mut handles = Vec::new();

    if let Some(client_config) = cli.build_client_config() {
        let f = RdKafkaAdminFactory::new(client_config);
        let c = cli.binder_config();
        let topics = cli.topic_selector();
        let groups = &cli.consumer_groups;

        info!("Attaching Kafka binders");
        let binder = TopicRecordCountMetric::new(topics.clone(), c.clone(), f.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = TopicRetentionMetric::new(topics.clone(), c.clone(), f.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = OutOfSyncReplicasMetric::new(topics.clone(), c.clone(), f.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = NonPreferredLeadersMetric::new(topics.clone(), c.clone(), f.clone());
        handles.push(attach(binder, registry, scheduler).await?);

        if !groups.is_empty() {
            let binder = ConsumerGroupLagMetric::new(groups, topics, c.clone(), f.clone());
            handles.push(attach(binder, registry, scheduler).await?);
            let binder = ConsumerGroupMemberCountMetric::new(groups, c.clone(), f.clone());
            handles.push(attach(binder, registry, scheduler).await?);
            let binder = ConsumerGroupStatesMetric::new(groups, c, f);
            handles.push(attach(binder, registry, scheduler).await?);
        }
    }

    #[cfg(feature = "postgres")]
    if let Some(url) = &cli.postgres_url {
        let t: Arc<dyn QueryTemplate> = Arc::new(PostgresTemplate::new(PostgresConnector::new(url)));
        let c = cli.binder_config();
        let relname = cli.relname.as_str();

        info!("Attaching Postgres binders");
        let binder = TupleMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = StatioMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = TableSizeMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = TransactionMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = AutoVacuumMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = LockMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = SettingsMetrics::new(t.clone(), relname, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = IndexMetrics::new(t.clone(), relname, cli.index_min_size, c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = DatabaseMetrics::new(t.clone(), cli.database.as_str(), c.clone());
        handles.push(attach(binder, registry, scheduler).await?);
        let binder = QueryMetrics::new(t, cli.slow_query_threshold(), c);
        handles.push(attach(binder, registry, scheduler).await?);
    }

    Ok(handles)
}

async fn attach<B: MeterBinder>(
    binder: B,
    registry: &Arc<Registry>,
    scheduler: &Scheduler,
) -> BinderResult<RefreshHandle> {
    let handle = binder.attach(registry.clone(), scheduler).await?;
    debug!("Attached '{}'", handle.name());
    Ok(handle)
}

fn parse_cli_and_init_logging() -> Cli {
    // Parse command line input and initialize logging
    let cli = Cli::parse();
    logging::init(cli.verbosity_level());

    trace!("Created:\n{:#?}", cli);

    cli
}

fn build_shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();

    // Setup shutdown signal handler:
    // when it's time to shutdown, cancel the root token (and all its children).
    //
    // NOTE: This handler will be listening on its own dedicated thread.
    let handler_token = token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Shutting down...");
        handler_token.cancel();
    }) {
        error!("Failed to register signal handler: {e}");
    }

    token
}
