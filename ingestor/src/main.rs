#![deny(clippy::all, clippy::cargo)]
#![warn(clippy::nursery, clippy::pedantic)]
#![allow(clippy::cargo_common_metadata, clippy::multiple_crate_versions)]

use config::{AppConfig, FromEnv};
use domain::policy::Policy;
use domain::repositories::{
    AvatarEnrichmentRepository, LiveFeedRepository, RankingSnapshotRepository,
};
use domain::types::epoch_millis;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cycle::RefreshCycle;
use crate::runtime_env::Env;
use crate::schedule::{run_schedule, Schedule};

mod cycle;
mod runtime_env;
mod schedule;

fn snapshot_repository_impl(
    config: &AppConfig,
) -> anyhow::Result<impl RankingSnapshotRepository + Sync> {
    use infra_store_repository_impl::GitHubContentsRepository;
    GitHubContentsRepository::try_new(
        config.snapshot_store.clone(),
        config.refresh.request_timeout(),
    )
}

fn upstream_repository_impl(
    config: &AppConfig,
) -> anyhow::Result<impl LiveFeedRepository + AvatarEnrichmentRepository + Sync> {
    use infra_upstream_repository_impl::HttpUpstreamRepository;
    HttpUpstreamRepository::try_new(
        config.live_feed.clone(),
        config.avatar_enrichment.clone(),
        config.refresh.request_timeout(),
    )
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("could not listen for ctrl-c: {e}");
            return;
        }
        tracing::info!("received ctrl-c, stopping after the current cycle");
        on_signal.cancel();
    });

    cancel
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = Env::from_env()?;

    // setup sentry
    // only send sentry events when it's not running locally
    let _sentry_guard = match env.sentry_dsn.as_deref() {
        Some(dsn) if env.reports_to_sentry() => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    traces_sample_rate: 0.1,
                    environment: Some(env.environment_name.clone().into()),
                    ..Default::default()
                },
            ));
            sentry::configure_scope(|scope| scope.set_level(Some(sentry::Level::Warning)));
            Some(guard)
        }
        _ => None,
    };

    // initialize tracing
    // see https://github.com/tokio-rs/axum/blob/79a0a54bc9f0f585c974b5e6793541baff980662/examples/tracing-aka-logging/src/main.rs
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(sentry::integrations::tracing::layer())
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(?config, "loaded config");
    if config.refresh.interval_seconds == 0 {
        return Err("REFRESH_INTERVAL_SECONDS must be positive".into());
    }

    let snapshot_repository = snapshot_repository_impl(&config)?;
    let upstream_repository = upstream_repository_impl(&config)?;

    let refresh_cycle = &RefreshCycle::new(
        &snapshot_repository,
        &upstream_repository,
        &upstream_repository,
        Policy::from(config.refresh.policy),
    );

    let schedule = Schedule {
        interval: config.refresh.interval(),
        max_run: config.refresh.max_run(),
        max_cycles: config.refresh.max_cycles,
    };

    let report = run_schedule(schedule, cancel_on_ctrl_c(), move || {
        refresh_cycle.execute_cycle(epoch_millis::now())
    })
    .await;

    tracing::info!(
        succeeded = report.succeeded,
        failed = report.failed,
        skipped_ticks = report.skipped_ticks,
        "refresh schedule finished"
    );

    Ok(())
}
