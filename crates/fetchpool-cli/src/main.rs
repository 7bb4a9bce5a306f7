#![doc = include_str!("../README.md")]

mod app;

use app::config::{AppConfig, CliArgs};
use app::telemetry::{init_telemetry, record_pool_stats};
use clap::Parser;
use fetchpool::{HttpTransport, PoolStats, ShutdownOutcome, Supervisor};
use futures::{StreamExt, stream::BoxStream};
use tokio::sync::watch;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Exit status after a forced abort, as if killed by SIGINT.
const ABORT_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = AppConfig::try_from(args)?;

    let providers = init_telemetry()?;
    log_startup_info(&config);

    let interrupts = interrupts()?;
    let supervisor = Supervisor::start(
        &config.pool,
        |_worker_id| HttpTransport::new(),
        config.job.clone(),
        config.delays()?,
    )?;
    tokio::spawn(observe_pool(supervisor.master().subscribe()));

    let outcome = supervisor.run(interrupts).await;
    providers.shutdown();

    match outcome? {
        ShutdownOutcome::Drained => {
            #[cfg(feature = "tracing")]
            tracing::info!("Pool shut down successfully");
            Ok(())
        }
        ShutdownOutcome::Aborted => {
            eprintln!("Aborted; in-flight requests were abandoned");
            std::process::exit(ABORT_EXIT_CODE);
        }
    }
}

fn log_startup_info(_config: &AppConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!("Starting fetch pool with full config: {:#?}", _config);
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting fetch pool with {} workers against {} [{}]",
            _config.pool.num_workers,
            _config.job.url,
            _config.job.range()
        );
    }
}

/// Forwards every pool snapshot to the metrics layer until the master exits.
async fn observe_pool(mut stats: watch::Receiver<PoolStats>) {
    let mut last = *stats.borrow_and_update();
    record_pool_stats(&PoolStats::default(), &last);

    while stats.changed().await.is_ok() {
        let next = *stats.borrow_and_update();
        record_pool_stats(&last, &next);
        last = next;
    }
}

/// One item per interrupt. On unix, `SIGTERM` counts as an interrupt too.
fn interrupts() -> anyhow::Result<BoxStream<'static, ()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        use tokio_stream::wrappers::SignalStream;

        let interrupt = SignalStream::new(signal(SignalKind::interrupt())?);
        let terminate = SignalStream::new(signal(SignalKind::terminate())?);
        Ok(futures::stream::select(interrupt, terminate).boxed())
    }

    #[cfg(not(unix))]
    {
        Ok(futures::stream::unfold((), |()| async {
            tokio::signal::ctrl_c().await.ok().map(|()| ((), ()))
        })
        .boxed())
    }
}
