//! Profile reads and writes over the remote store.
//!
//! Reads go through the shared [`QueryCache`]; writes invalidate both the
//! HR-wide listing and the owner's own-profile entry so the next read on
//! either key is a fresh fetch.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::SessionContext;
use crate::cache::{CacheValue, QueryCache, QueryKey};
use crate::error::{DataError, DataResult, MAX_AVATAR_BYTES};
use crate::model::{Profile, ProfilePatch};
use crate::notices::NoticeHub;
use crate::store::{Filter, RemoteStore, SelectQuery};

/// An avatar file as handed over by the UI: declared MIME type plus raw bytes.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub mime: String,
    pub bytes: Vec<u8>,
}

pub struct ProfileRepository {
    store: Arc<dyn RemoteStore>,
    cache: Arc<QueryCache>,
    notices: Arc<NoticeHub>,
}

impl ProfileRepository {
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

    /// All profiles ordered by display name.
    ///
    /// Client-side short-circuit: a non-HR durable role gets `Authorization`
    /// before any network call. This is a UX optimization only — the store's
    /// row-level security stays authoritative whether or not this check runs.
    pub async fn list_profiles(&self, ctx: &SessionContext) -> DataResult<Arc<Vec<Profile>>> {
        ctx.ensure_active()?;
        ctx.require_hr()?;

        let store = Arc::clone(&self.store);
        self.cache
            .get_or_load(QueryKey::Profiles, async move {
                let rows = store
                    .select(
                        "profiles",
                        SelectQuery::all().order_by("full_name", true),
                    )
                    .await?;
                let profiles = rows
                    .into_iter()
                    .map(Profile::from_row)
                    .collect::<DataResult<Vec<_>>>()?;
                Ok(CacheValue::Profiles(Arc::new(profiles)))
            })
            .await?
            .try_into()
    }

    /// The session user's own profile, `None` for a just-registered account
    /// with no profile row yet. Keyed by user id, so concurrent callers share
    /// one in-flight read.
    pub async fn own_profile(&self, ctx: &SessionContext) -> DataResult<Option<Arc<Profile>>> {
        ctx.ensure_active()?;

        let store = Arc::clone(&self.store);
        let user_id = ctx.user_id();
        self.cache
            .get_or_load(QueryKey::OwnProfile(user_id), async move {
                let rows = store
                    .select(
                        "profiles",
                        SelectQuery::all().filter(Filter::eq("user_id", user_id.to_string())),
                    )
                    .await?;
                let profile = match rows.into_iter().next() {
                    Some(row) => Some(Arc::new(Profile::from_row(row)?)),
                    None => None,
                };
                Ok(CacheValue::OwnProfile(profile))
            })
            .await?
            .try_into()
    }

    /// Applies a partial update to the profile owned by `user_id`.
    pub async fn update_profile(
        &self,
        ctx: &SessionContext,
        user_id: Uuid,
        patch: ProfilePatch,
    ) -> DataResult<Profile> {
        ctx.ensure_active()?;

        let result = async {
            let patch = patch.into_value()?;
            self.apply_update(user_id, patch).await
        }
        .await;

        match &result {
            Ok(_) => self.notices.success(
                "Profile Updated",
                "Profile has been updated successfully.",
            ),
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "profile update failed");
                self.notices
                    .error("Error", "Failed to update profile. Please try again.");
            }
        }
        result
    }

    /// Validates and inlines an avatar into the profile row as a `data:` URL.
    ///
    /// Storing the image in the row trades storage efficiency for zero extra
    /// infrastructure; every profile read carries the full payload from then
    /// on. Returns the stored data URL.
    pub async fn upload_avatar(
        &self,
        ctx: &SessionContext,
        user_id: Uuid,
        upload: AvatarUpload,
    ) -> DataResult<String> {
        ctx.ensure_active()?;

        let result = async {
            if !upload.mime.starts_with("image/") {
                return Err(DataError::InvalidFileType(format!(
                    "expected an image, got {}",
                    upload.mime
                )));
            }
            if upload.bytes.len() > MAX_AVATAR_BYTES {
                return Err(DataError::FileTooLarge {
                    size: upload.bytes.len(),
                    max: MAX_AVATAR_BYTES,
                });
            }

            let data_url = format!(
                "data:{};base64,{}",
                upload.mime,
                BASE64.encode(&upload.bytes)
            );
            let patch = ProfilePatch {
                avatar_url: Some(data_url.clone()),
                ..Default::default()
            }
            .into_value()?;
            self.apply_update(user_id, patch).await?;
            Ok(data_url)
        }
        .await;

        match &result {
            Ok(_) => self.notices.success(
                "Avatar Updated",
                "Your profile picture has been updated successfully.",
            ),
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "avatar upload failed");
                self.notices.error("Upload Failed", &err.to_string());
            }
        }
        result
    }

    async fn apply_update(&self, user_id: Uuid, patch: Value) -> DataResult<Profile> {
        let updated = self
            .store
            .update(
                "profiles",
                vec![Filter::eq("user_id", user_id.to_string())],
                patch,
            )
            .await?;
        let row = updated.ok_or_else(|| {
            DataError::NotFound(format!("no profile for user {user_id}"))
        })?;
        let profile = Profile::from_row(row)?;

        self.cache.invalidate(&QueryKey::Profiles).await;
        self.cache.invalidate(&QueryKey::OwnProfile(user_id)).await;
        Ok(profile)
    }
}
