use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use uuid::Uuid;

use crate::auth::jwt;
use crate::cache::QueryCache;
use crate::error::{DataError, DataResult};
use crate::model::Role;

#[derive(Debug)]
struct SessionInner {
    user_id: Uuid,
    name: String,
    /// Durable assigned role. This is what gates operations and what the
    /// store's row-level security keys on.
    role: Role,
    /// Session-local display override. Lets an HR user preview the employee
    /// experience; never consulted for authorization.
    view_as: Mutex<Role>,
    active: AtomicBool,
}

/// Authenticated session state, passed explicitly to every repository call.
#[derive(Clone, Debug)]
pub struct SessionContext {
    inner: Arc<SessionInner>,
}

impl SessionContext {
    pub fn new(user_id: Uuid, name: impl Into<String>, role: Role) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                user_id,
                name: name.into(),
                role,
                view_as: Mutex::new(role),
                active: AtomicBool::new(true),
            }),
        }
    }

    /// Builds a session from a bearer token issued by the auth service.
    pub fn from_token(token: &str, secret: &str) -> DataResult<Self> {
        let claims = jwt::decode_claims(token, secret)?;
        Ok(Self::new(claims.sub, claims.name, claims.role))
    }

    pub fn user_id(&self) -> Uuid {
        self.inner.user_id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// The effective display view: the override if set, otherwise the role.
    pub fn view_as(&self) -> Role {
        *self.inner.view_as.lock().expect("session lock")
    }

    pub fn is_hr(&self) -> bool {
        self.inner.role == Role::Hr
    }

    /// Flips the display view between HR and Employee. Only available to HR
    /// identities; has no effect on what the store lets this session read.
    pub fn toggle_view_as(&self) -> DataResult<Role> {
        self.require_hr()?;
        let mut view = self.inner.view_as.lock().expect("session lock");
        *view = view.flipped();
        Ok(*view)
    }

    pub fn require_hr(&self) -> DataResult<()> {
        if self.inner.role == Role::Hr {
            Ok(())
        } else {
            Err(DataError::Authorization("HR only".into()))
        }
    }

    /// Fails once the session has been logged out.
    pub fn ensure_active(&self) -> DataResult<()> {
        if self.inner.active.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DataError::Authorization("session is no longer active".into()))
        }
    }

    /// Invalidates the session and clears the shared cache so nothing keyed
    /// to this identity is served to whoever signs in next. The caller is
    /// expected to route back to an unauthenticated entry point.
    pub fn logout(&self, cache: &QueryCache) {
        self.inner.active.store(false, Ordering::SeqCst);
        cache.invalidate_all();
        tracing::info!(user_id = %self.inner.user_id, "session logged out");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn hr_session() -> SessionContext {
        SessionContext::new(Uuid::new_v4(), "HR Person", Role::Hr)
    }

    #[test]
    fn toggle_is_hr_only() {
        let employee = SessionContext::new(Uuid::new_v4(), "Emp", Role::Employee);
        assert!(matches!(
            employee.toggle_view_as().unwrap_err(),
            DataError::Authorization(_)
        ));

        let hr = hr_session();
        assert_eq!(hr.toggle_view_as().unwrap(), Role::Employee);
        assert_eq!(hr.toggle_view_as().unwrap(), Role::Hr);
    }

    #[test]
    fn view_override_never_touches_the_durable_role() {
        let hr = hr_session();
        hr.toggle_view_as().unwrap();
        assert_eq!(hr.view_as(), Role::Employee);
        assert_eq!(hr.role(), Role::Hr);
        assert!(hr.is_hr());
    }

    #[test]
    fn round_trips_through_a_token() {
        let claims = crate::auth::Claims {
            sub: Uuid::new_v4(),
            name: "Jane Doe".into(),
            role: Role::Hr,
            exp: usize::MAX / 2,
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let session = SessionContext::from_token(&token, "secret").unwrap();
        assert_eq!(session.user_id(), claims.sub);
        assert_eq!(session.name(), "Jane Doe");
        assert!(session.is_hr());

        assert!(matches!(
            SessionContext::from_token(&token, "wrong-secret").unwrap_err(),
            DataError::Authorization(_)
        ));
    }

    #[test]
    fn logged_out_session_is_inactive() {
        let cache = QueryCache::new(10, std::time::Duration::from_secs(60));
        let session = hr_session();
        assert!(session.ensure_active().is_ok());
        session.logout(&cache);
        assert!(matches!(
            session.ensure_active().unwrap_err(),
            DataError::Authorization(_)
        ));
    }
}
