use std::env;
use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tracing::info;
use tracing_appender::rolling;

use hrm_dash::auth::SessionContext;
use hrm_dash::cache::QueryCache;
use hrm_dash::config::Config;
use hrm_dash::db::init_db;
use hrm_dash::notices::NoticeHub;
use hrm_dash::notify::{FeedState, NotificationAggregator};
use hrm_dash::repo::{LeaveRequestRepository, ProfileRepository};
use hrm_dash::store::{MySqlRemoteStore, RemoteStore, StoreIdentity};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env();

    // Rolling daily log
    let file_appender = rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .pretty()
        .init();

    info!("Data layer starting...");

    let token = env::var("SESSION_TOKEN").context("SESSION_TOKEN must be set")?;
    let session = SessionContext::from_token(&token, &config.jwt_secret)
        .context("invalid session token")?;
    info!(user_id = %session.user_id(), role = ?session.role(), "session established");

    let pool = init_db(&config.database_url).await;
    let store: Arc<dyn RemoteStore> = Arc::new(MySqlRemoteStore::new(
        pool,
        StoreIdentity::new(session.user_id(), session.role()),
    ));

    let cache = Arc::new(QueryCache::new(config.cache_capacity, config.cache_ttl));
    let notices = Arc::new(NoticeHub::default());
    let profiles = Arc::new(ProfileRepository::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&notices),
    ));
    let leaves = Arc::new(LeaveRequestRepository::new(
        Arc::clone(&store),
        Arc::clone(&cache),
        Arc::clone(&notices),
    ));
    let aggregator = Arc::new(NotificationAggregator::new(
        Arc::clone(&leaves),
        Arc::clone(&cache),
    ));

    // Warm the cache so the first screen paints from memory.
    let warm_profiles = Arc::clone(&profiles);
    let warm_session = session.clone();
    tokio::spawn(async move {
        if let Err(e) = warm_profiles.own_profile(&warm_session).await {
            tracing::warn!(error = %e, "own-profile warmup failed");
        }
    });
    let warm_aggregator = Arc::clone(&aggregator);
    let warm_session = session.clone();
    tokio::spawn(async move {
        match warm_aggregator.pending_count(&warm_session).await {
            Ok(count) => info!(count, "pending leave requests at startup"),
            Err(e) => tracing::warn!(error = %e, "notification warmup failed"),
        }
    });

    // Surface mutation outcomes the way the UI would.
    let mut notice_rx = notices.subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notice_rx.recv().await {
            info!(title = %notice.title, severity = ?notice.severity, "{}", notice.body);
        }
    });

    let mut poller = aggregator.spawn_poller(session, config.poll_interval);
    loop {
        match poller.changed().await? {
            FeedState::Ready(items) => info!(pending = items.len(), "notification feed refreshed"),
            FeedState::Failed(err) => tracing::warn!(error = %err, "notification refresh failed"),
            FeedState::Loading => {}
        }
    }
}
