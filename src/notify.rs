//! Pending-count and notification-feed derivation over the leave-request
//! read. Every consumer goes through the same cache key, so the header badge
//! and the dashboard can never disagree about the count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::auth::SessionContext;
use crate::cache::{QueryCache, QueryKey};
use crate::error::{DataError, DataResult};
use crate::model::{StatusFilter, leave_type_label};
use crate::repo::LeaveRequestRepository;

/// How much of a notification description is kept for display.
const SUMMARY_MAX_CHARS: usize = 120;

/// One entry of the notification feed. `summary` is clamped for display;
/// `days` and `leave_type` stay untruncated for any further computation.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationItem {
    pub requester: String,
    pub created_at: DateTime<Utc>,
    pub summary: String,
    pub days: f64,
    pub leave_type: String,
    pub label: &'static str,
}

/// Status breakdown of the unfiltered listing, as shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LeaveStatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub total: usize,
}

/// Tri-state a polling consumer observes: not yet loaded, loaded (possibly
/// legitimately empty), or failed. "No data yet" is never conflated with
/// "failed" or "zero results".
#[derive(Debug, Clone, PartialEq)]
pub enum FeedState {
    Loading,
    Ready(Vec<NotificationItem>),
    Failed(DataError),
}

pub struct NotificationAggregator {
    leaves: Arc<LeaveRequestRepository>,
    cache: Arc<QueryCache>,
}

impl NotificationAggregator {
    pub fn new(leaves: Arc<LeaveRequestRepository>, cache: Arc<QueryCache>) -> Self {
        Self { leaves, cache }
    }

    /// Number of requests awaiting a decision. Derived from the shared
    /// `Pending` cache key, so independent call sites observe one value.
    pub async fn pending_count(&self, ctx: &SessionContext) -> DataResult<usize> {
        Ok(self.leaves.list(ctx, StatusFilter::Pending).await?.len())
    }

    /// The notification feed for the pending requests, newest first.
    pub async fn feed(&self, ctx: &SessionContext) -> DataResult<Vec<NotificationItem>> {
        let pending = self.leaves.list(ctx, StatusFilter::Pending).await?;
        Ok(pending
            .iter()
            .map(|entry| {
                let label = leave_type_label(&entry.request.leave_type);
                let description = format!(
                    "Requested {} day(s) of {}",
                    entry.request.days, label
                );
                NotificationItem {
                    requester: entry
                        .requester_name
                        .clone()
                        .unwrap_or_else(|| "Unknown User".to_string()),
                    created_at: entry.request.created_at,
                    summary: clamp(&description, SUMMARY_MAX_CHARS),
                    days: entry.request.days,
                    leave_type: entry.request.leave_type.clone(),
                    label,
                }
            })
            .collect())
    }

    /// Status breakdown of the unfiltered listing.
    pub async fn status_counts(&self, ctx: &SessionContext) -> DataResult<LeaveStatusCounts> {
        let all = self.leaves.list(ctx, StatusFilter::All).await?;
        let mut counts = LeaveStatusCounts {
            total: all.len(),
            ..Default::default()
        };
        for entry in all.iter() {
            match entry.request.status {
                crate::model::LeaveStatus::Pending => counts.pending += 1,
                crate::model::LeaveStatus::Approved => counts.approved += 1,
                crate::model::LeaveStatus::Rejected => counts.rejected += 1,
            }
        }
        Ok(counts)
    }

    /// Starts an independent polling loop for one consumer. Each tick drops
    /// the pending cache entry and refetches, so the published state tracks
    /// the store. Dropping the returned poller stops this consumer without
    /// touching cache entries other consumers still read.
    pub fn spawn_poller(&self, ctx: SessionContext, interval: Duration) -> NotificationPoller {
        let (tx, rx) = watch::channel(FeedState::Loading);
        let aggregator =
            NotificationAggregator::new(Arc::clone(&self.leaves), Arc::clone(&self.cache));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                aggregator
                    .cache
                    .invalidate(&QueryKey::LeaveRequests(StatusFilter::Pending))
                    .await;
                let state = match aggregator.feed(&ctx).await {
                    Ok(items) => FeedState::Ready(items),
                    Err(err) => {
                        tracing::warn!(error = %err, "notification refresh failed");
                        FeedState::Failed(err)
                    }
                };
                if tx.send(state).is_err() {
                    break;
                }
            }
        });

        NotificationPoller { rx, handle }
    }
}

/// Handle to one consumer's polling loop. The loop is aborted on drop.
pub struct NotificationPoller {
    rx: watch::Receiver<FeedState>,
    handle: JoinHandle<()>,
}

impl NotificationPoller {
    pub fn state(&self) -> FeedState {
        self.rx.borrow().clone()
    }

    /// Waits for the next published state.
    pub async fn changed(&mut self) -> DataResult<FeedState> {
        self.rx
            .changed()
            .await
            .map_err(|_| DataError::Internal("notification poller stopped".into()))?;
        Ok(self.rx.borrow().clone())
    }
}

impl Drop for NotificationPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn clamp(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{cut}\u{2026}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::notices::NoticeHub;
    use crate::store::{MemoryRemoteStore, RemoteStore, StoreIdentity};
    use serde_json::json;
    use uuid::Uuid;

    struct Fixture {
        store: Arc<MemoryRemoteStore>,
        aggregator: Arc<NotificationAggregator>,
        ctx: SessionContext,
        profile_id: Uuid,
    }

    fn fixture() -> Fixture {
        let user_id = Uuid::new_v4();
        let profile_id = Uuid::new_v4();
        let store = Arc::new(MemoryRemoteStore::new(StoreIdentity::new(user_id, Role::Hr)));
        store.seed(
            "profiles",
            vec![json!({
                "id": profile_id.to_string(),
                "user_id": user_id.to_string(),
                "full_name": "Jane Doe",
                "email": "jane@company.com",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z",
            })],
        );
        let cache = Arc::new(QueryCache::new(1_000, Duration::from_secs(300)));
        let leaves = Arc::new(LeaveRequestRepository::new(
            store.clone() as Arc<dyn RemoteStore>,
            Arc::clone(&cache),
            Arc::new(NoticeHub::default()),
        ));
        let aggregator = Arc::new(NotificationAggregator::new(leaves, cache));
        let ctx = SessionContext::new(user_id, "Jane Doe", Role::Hr);
        Fixture {
            store,
            aggregator,
            ctx,
            profile_id,
        }
    }

    fn seed_requests(f: &Fixture) {
        f.store.seed(
            "leave_requests",
            vec![
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "profile_id": f.profile_id.to_string(),
                    "leave_type": "vacation",
                    "days": 2.5,
                    "status": "pending",
                    "created_at": "2024-03-02T09:00:00Z",
                }),
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "profile_id": f.profile_id.to_string(),
                    "leave_type": "unpaid-sabbatical",
                    "days": 30.0,
                    "status": "pending",
                    "created_at": "2024-03-01T09:00:00Z",
                }),
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "profile_id": f.profile_id.to_string(),
                    "leave_type": "sick",
                    "days": 1.0,
                    "status": "approved",
                    "created_at": "2024-02-01T09:00:00Z",
                }),
            ],
        );
    }

    #[tokio::test]
    async fn two_consumers_observe_the_same_count_from_one_fetch() {
        let f = fixture();
        seed_requests(&f);

        // Header and dashboard read concurrently through the same key.
        let (header, dashboard) = tokio::join!(
            f.aggregator.pending_count(&f.ctx),
            f.aggregator.pending_count(&f.ctx),
        );
        assert_eq!(header.unwrap(), 2);
        assert_eq!(dashboard.unwrap(), 2);
        // One leave_requests select plus one requester-name select.
        assert_eq!(f.store.select_count(), 2);
    }

    #[tokio::test]
    async fn feed_keeps_full_values_while_clamping_the_summary() {
        let f = fixture();
        seed_requests(&f);

        let feed = f.aggregator.feed(&f.ctx).await.unwrap();
        assert_eq!(feed.len(), 2);

        let newest = &feed[0];
        assert_eq!(newest.requester, "Jane Doe");
        assert_eq!(newest.days, 2.5);
        assert_eq!(newest.label, "Annual Leave");
        assert_eq!(newest.summary, "Requested 2.5 day(s) of Annual Leave");

        // Unknown tag falls back to the generic label, never empty.
        let unknown = &feed[1];
        assert_eq!(unknown.leave_type, "unpaid-sabbatical");
        assert_eq!(unknown.label, "Leave");
        assert!(unknown.summary.chars().count() <= SUMMARY_MAX_CHARS);
    }

    #[tokio::test]
    async fn status_counts_cover_the_whole_listing() {
        let f = fixture();
        seed_requests(&f);

        let counts = f.aggregator.status_counts(&f.ctx).await.unwrap();
        assert_eq!(
            counts,
            LeaveStatusCounts {
                pending: 2,
                approved: 1,
                rejected: 0,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn poller_publishes_ready_states_and_stops_on_drop() {
        let f = fixture();
        seed_requests(&f);

        let mut poller = f
            .aggregator
            .spawn_poller(f.ctx.clone(), Duration::from_millis(10));

        let state = poller.changed().await.unwrap();
        match state {
            FeedState::Ready(items) => assert_eq!(items.len(), 2),
            other => panic!("expected Ready, got {other:?}"),
        }

        // Another consumer keeps reading the shared key after this one goes
        // away.
        drop(poller);
        assert_eq!(f.aggregator.pending_count(&f.ctx).await.unwrap(), 2);
    }

    #[test]
    fn clamp_is_a_noop_under_the_limit_and_bounded_over_it() {
        assert_eq!(clamp("short", 10), "short");
        let long = "x".repeat(500);
        let clamped = clamp(&long, 120);
        assert_eq!(clamped.chars().count(), 120);
        assert!(clamped.ends_with('\u{2026}'));
    }
}
