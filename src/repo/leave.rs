//! Leave-request reads and the decision workflow.
//!
//! Reads are cached per status filter. Decisions only ever move a request
//! out of `pending`; a request that already reached a terminal state cannot
//! be re-decided, and nothing moves a request back to `pending`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::cache::{CacheValue, QueryCache, QueryKey};
use crate::error::{DataError, DataResult};
use crate::model::{
    LeaveRequest, LeaveRequestWithRequester, LeaveStatus, NewLeaveRequest, StatusFilter,
};
use crate::notices::NoticeHub;
use crate::store::{Filter, RemoteStore, SelectQuery};

const KNOWN_LEAVE_TYPES: [&str; 3] = ["vacation", "sick", "other"];

pub struct LeaveRequestRepository {
    store: Arc<dyn RemoteStore>,
    cache: Arc<QueryCache>,
    notices: Arc<NoticeHub>,
}

impl LeaveRequestRepository {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<QueryCache>,
        notices: Arc<NoticeHub>,
    ) -> Self {
        Self {
            store,
            cache,
            notices,
        }
    }

    /// Requests matching the filter, newest first, each joined with the
    /// requester's display name. The name is `None` when row-level security
    /// hides the requester's profile from this session.
    pub async fn list(
        &self,
        ctx: &SessionContext,
        filter: StatusFilter,
    ) -> DataResult<Arc<Vec<LeaveRequestWithRequester>>> {
        ctx.ensure_active()?;

        let store = Arc::clone(&self.store);
        self.cache
            .get_or_load(QueryKey::LeaveRequests(filter), async move {
                let mut query = SelectQuery::all().order_by("created_at", false);
                if let Some(status) = filter.status() {
                    query = query.filter(Filter::eq("status", status.as_str()));
                }
                let rows = store.select("leave_requests", query).await?;
                let requests = rows
                    .into_iter()
                    .map(LeaveRequest::from_row)
                    .collect::<DataResult<Vec<_>>>()?;

                let names = requester_names(&store, &requests).await?;
                let joined = requests
                    .into_iter()
                    .map(|request| {
                        let requester_name = names.get(&request.profile_id).cloned();
                        LeaveRequestWithRequester {
                            request,
                            requester_name,
                        }
                    })
                    .collect();
                Ok(CacheValue::LeaveRequests(Arc::new(joined)))
            })
            .await?
            .try_into()
    }

    /// Submits a new pending request for the session user's profile.
    pub async fn create(
        &self,
        ctx: &SessionContext,
        new: NewLeaveRequest,
    ) -> DataResult<LeaveRequest> {
        ctx.ensure_active()?;

        let result = self.insert_request(ctx, new).await;
        match &result {
            Ok(_) => self
                .notices
                .success("Leave Request Submitted", "Your request is pending review."),
            Err(err) => {
                tracing::warn!(error = %err, "leave request submission failed");
                self.notices
                    .error("Error", "Failed to submit leave request. Please try again.");
            }
        }
        result
    }

    pub async fn approve(&self, ctx: &SessionContext, id: Uuid) -> DataResult<()> {
        self.decide(ctx, id, LeaveStatus::Approved).await
    }

    pub async fn reject(&self, ctx: &SessionContext, id: Uuid) -> DataResult<()> {
        self.decide(ctx, id, LeaveStatus::Rejected).await
    }

    async fn decide(
        &self,
        ctx: &SessionContext,
        id: Uuid,
        decision: LeaveStatus,
    ) -> DataResult<()> {
        ctx.ensure_active()?;
        ctx.require_hr()?;

        let result = async {
            // The pending predicate is the transition guard: a request that
            // was already decided matches nothing.
            let updated = self
                .store
                .update(
                    "leave_requests",
                    vec![
                        Filter::eq("id", id.to_string()),
                        Filter::eq("status", LeaveStatus::Pending.as_str()),
                    ],
                    json!({ "status": decision.as_str() }),
                )
                .await?;
            if updated.is_none() {
                return Err(DataError::NotFound(
                    "leave request not found or already processed".into(),
                ));
            }
            self.cache.invalidate_leave_requests().await;
            Ok(())
        }
        .await;

        let label = match decision {
            LeaveStatus::Approved => "approved",
            _ => "rejected",
        };
        match &result {
            Ok(()) => self
                .notices
                .success("Leave Request", &format!("Leave {label}.")),
            Err(err) => {
                tracing::warn!(leave_id = %id, error = %err, "leave decision failed");
                self.notices
                    .error("Error", &format!("Failed to mark leave as {label}."));
            }
        }
        result
    }

    async fn insert_request(
        &self,
        ctx: &SessionContext,
        new: NewLeaveRequest,
    ) -> DataResult<LeaveRequest> {
        if !KNOWN_LEAVE_TYPES.contains(&new.leave_type.as_str()) {
            return Err(DataError::Validation(format!(
                "invalid leave type '{}', allowed: vacation, sick, other",
                new.leave_type
            )));
        }
        if !(new.days > 0.0) {
            return Err(DataError::Validation("days must be positive".into()));
        }

        let profile_id = self.own_profile_id(ctx).await?;
        let row = json!({
            "id": Uuid::new_v4().to_string(),
            "profile_id": profile_id.to_string(),
            "leave_type": new.leave_type,
            "days": new.days,
            "status": LeaveStatus::Pending.as_str(),
            "created_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let stored = self.store.insert("leave_requests", row).await?;
        let request = LeaveRequest::from_row(stored)?;

        self.cache.invalidate_leave_requests().await;
        Ok(request)
    }

    async fn own_profile_id(&self, ctx: &SessionContext) -> DataResult<Uuid> {
        let rows = self
            .store
            .select(
                "profiles",
                SelectQuery::all()
                    .columns(&["id"])
                    .filter(Filter::eq("user_id", ctx.user_id().to_string())),
            )
            .await?;
        let id = rows
            .into_iter()
            .next()
            .and_then(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
            .ok_or_else(|| DataError::NotFound("no profile for this account".into()))?;
        id.parse()
            .map_err(|e| DataError::Internal(format!("bad profile id: {e}")))
    }
}

/// Fetches the minimal requester projection (id, display name) for a batch
/// of requests in one read.
async fn requester_names(
    store: &Arc<dyn RemoteStore>,
    requests: &[LeaveRequest],
) -> DataResult<HashMap<Uuid, String>> {
    let ids: Vec<Value> = requests
        .iter()
        .map(|r| r.profile_id.to_string())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .map(Value::String)
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = store
        .select(
            "profiles",
            SelectQuery::all()
                .columns(&["id", "full_name"])
                .filter(Filter::is_in("id", ids)),
        )
        .await?;

    let mut names = HashMap::with_capacity(rows.len());
    for row in rows {
        let id = row
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok());
        let name = row.get("full_name").and_then(Value::as_str);
        if let (Some(id), Some(name)) = (id, name) {
            names.insert(id, name.to_string());
        }
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Role;
    use crate::store::{MemoryRemoteStore, StoreIdentity};
    use std::time::Duration;

    fn leave_row(profile_id: Uuid, leave_type: &str, status: &str, created_at: &str) -> Value {
        json!({
            "id": Uuid::new_v4().to_string(),
            "profile_id": profile_id.to_string(),
            "leave_type": leave_type,
            "days": 2.0,
            "status": status,
            "created_at": created_at,
        })
    }

    fn profile_row(id: Uuid, user_id: Uuid, name: &str) -> Value {
        json!({
            "id": id.to_string(),
            "user_id": user_id.to_string(),
            "full_name": name,
            "email": "x@company.com",
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z",
        })
    }

    struct Fixture {
        store: Arc<MemoryRemoteStore>,
        repo: LeaveRequestRepository,
        ctx: SessionContext,
        profile_id: Uuid,
    }

    fn fixture(role: Role) -> Fixture {
        let user_id = Uuid::new_v4();
        let profile_id = Uuid::new_v4();
        let store = Arc::new(MemoryRemoteStore::new(StoreIdentity::new(user_id, role)));
        store.seed(
            "profiles",
            vec![profile_row(profile_id, user_id, "Session User")],
        );
        let repo = LeaveRequestRepository::new(
            store.clone() as Arc<dyn RemoteStore>,
            Arc::new(QueryCache::new(1_000, Duration::from_secs(300))),
            Arc::new(NoticeHub::default()),
        );
        let ctx = SessionContext::new(user_id, "Session User", role);
        Fixture {
            store,
            repo,
            ctx,
            profile_id,
        }
    }

    fn seed_mixed_requests(f: &Fixture) {
        f.store.seed(
            "leave_requests",
            vec![
                leave_row(f.profile_id, "vacation", "pending", "2024-03-03T09:00:00Z"),
                leave_row(f.profile_id, "sick", "approved", "2024-03-02T09:00:00Z"),
                leave_row(f.profile_id, "other", "rejected", "2024-03-01T09:00:00Z"),
                leave_row(f.profile_id, "sick", "pending", "2024-03-04T09:00:00Z"),
            ],
        );
    }

    #[tokio::test]
    async fn every_filter_returns_only_matching_requests() {
        let f = fixture(Role::Hr);
        seed_mixed_requests(&f);

        for (filter, expected) in [
            (StatusFilter::All, 4),
            (StatusFilter::Pending, 2),
            (StatusFilter::Approved, 1),
            (StatusFilter::Rejected, 1),
        ] {
            let requests = f.repo.list(&f.ctx, filter).await.unwrap();
            assert_eq!(requests.len(), expected, "filter {}", filter.as_str());
            if let Some(status) = filter.status() {
                assert!(requests.iter().all(|r| r.request.status == status));
            }
        }
    }

    #[tokio::test]
    async fn listing_is_newest_first_and_joined_with_names() {
        let f = fixture(Role::Hr);
        seed_mixed_requests(&f);

        let requests = f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap();
        assert_eq!(requests[0].request.leave_type, "sick");
        assert_eq!(requests[1].request.leave_type, "vacation");
        assert!(
            requests
                .iter()
                .all(|r| r.requester_name.as_deref() == Some("Session User"))
        );
    }

    #[tokio::test]
    async fn approval_moves_pending_to_terminal_exactly_once() {
        let f = fixture(Role::Hr);
        seed_mixed_requests(&f);

        let pending = f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap();
        let id = pending[0].request.id;

        f.repo.approve(&f.ctx, id).await.unwrap();
        let approved = f.repo.list(&f.ctx, StatusFilter::Approved).await.unwrap();
        assert!(approved.iter().any(|r| r.request.id == id));

        // No transition out of a terminal state, in either direction.
        let err = f.repo.reject(&f.ctx, id).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
        let err = f.repo.approve(&f.ctx, id).await.unwrap_err();
        assert!(matches!(err, DataError::NotFound(_)));
    }

    #[tokio::test]
    async fn decisions_are_hr_only() {
        let f = fixture(Role::Employee);
        seed_mixed_requests(&f);
        let err = f.repo.approve(&f.ctx, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DataError::Authorization(_)));
    }

    #[tokio::test]
    async fn decision_invalidates_every_filtered_listing() {
        let f = fixture(Role::Hr);
        seed_mixed_requests(&f);

        let before = f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap();
        f.repo.approve(&f.ctx, before[0].request.id).await.unwrap();

        let after = f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap();
        assert_eq!(after.len(), before.len() - 1);
    }

    #[tokio::test]
    async fn submission_validates_type_and_days() {
        let f = fixture(Role::Employee);

        let err = f
            .repo
            .create(
                &f.ctx,
                NewLeaveRequest {
                    leave_type: "sabbatical".into(),
                    days: 1.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));

        let err = f
            .repo
            .create(
                &f.ctx,
                NewLeaveRequest {
                    leave_type: "sick".into(),
                    days: 0.0,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
    }

    #[tokio::test]
    async fn submitted_request_appears_in_the_pending_listing() {
        let f = fixture(Role::Employee);
        assert!(f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap().is_empty());

        let created = f
            .repo
            .create(
                &f.ctx,
                NewLeaveRequest {
                    leave_type: "vacation".into(),
                    days: 1.5,
                },
            )
            .await
            .unwrap();
        assert_eq!(created.status, LeaveStatus::Pending);

        let pending = f.repo.list(&f.ctx, StatusFilter::Pending).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].request.id, created.id);
        assert_eq!(pending[0].request.days, 1.5);
    }
}
