use anyhow::Context;
use chrono::Utc;
use recruitment_automation::{
    config::init_config,
    database::pool::{create_pool, run_migrations},
    routes,
    services::{
        ai_client::OpenAiClient,
        channels::{Channels, EmailSender, TelegramSender},
    },
    store::{PgStore, Stores},
    AppState, AuthSecrets,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_cron_scheduler::{Job, JobScheduler as CronScheduler};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = init_config()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;
    let stores = Stores::shared(Arc::new(PgStore::new(pool)));

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;
    let ai = Arc::new(OpenAiClient::new(
        http.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
        config.openai_base_url.clone(),
    ));
    let channels = Channels::new(
        Arc::new(TelegramSender::new(http, config.telegram_bot_token.clone())),
        Arc::new(EmailSender::new(config.smtp.clone())),
    );
    if config.smtp.is_none() {
        tracing::warn!("SMTP is not configured; email delivery will fail");
    }

    let app_state = AppState::new(
        stores,
        ai,
        channels,
        config.automation.clone(),
        AuthSecrets {
            jwt_secret: config.jwt_secret.clone(),
            cron_secret: config.cron_secret.clone(),
            telegram_secret: config.telegram_webhook_secret.clone(),
        },
    );

    // Kept alive for the lifetime of the server.
    let _cron = start_cron(
        &app_state,
        config.automation_cron.as_deref(),
        config.outreach_cron.as_deref(),
    )
    .await?;

    let app = routes::router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config
        .server_address
        .parse()
        .with_context(|| format!("parsing SERVER_ADDRESS {}", config.server_address))?;
    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// In-process triggers for deployments without an external cron. Either
/// expression may be absent.
async fn start_cron(
    state: &AppState,
    automation_cron: Option<&str>,
    outreach_cron: Option<&str>,
) -> anyhow::Result<Option<CronScheduler>> {
    if automation_cron.is_none() && outreach_cron.is_none() {
        return Ok(None);
    }
    let sched = CronScheduler::new().await.context("creating cron scheduler")?;

    if let Some(cron) = automation_cron {
        let state = state.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let state = state.clone();
            Box::pin(async move {
                state
                    .scheduler
                    .tick(Utc::now(), state.settings.job_batch_size)
                    .await;
            })
        })
        .with_context(|| format!("creating automation job for cron {cron}"))?;
        sched.add(job).await.context("adding automation job")?;
    }

    if let Some(cron) = outreach_cron {
        let state = state.clone();
        let job = Job::new_async(cron, move |_uuid, _l| {
            let state = state.clone();
            Box::pin(async move {
                state
                    .outreach
                    .tick(Utc::now(), state.settings.outreach_batch_size)
                    .await;
            })
        })
        .with_context(|| format!("creating outreach job for cron {cron}"))?;
        sched.add(job).await.context("adding outreach job")?;
    }

    sched.start().await.context("starting cron scheduler")?;
    Ok(Some(sched))
}
