use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::request::PropertyType;
use crate::errors::DomainError;
use crate::intake::states::IntakeStep;

/// Partial quote request collected turn by turn.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestDraft {
    pub origin_raw: Option<String>,
    pub destination_raw: Option<String>,
    pub property_type: Option<PropertyType>,
    pub has_elevator: Option<bool>,
    pub needs_packing: Option<bool>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub move_date: Option<NaiveDate>,
    pub extra_items: Option<String>,
}

/// Fully collected answers, ready to become a quote request.
#[derive(Clone, Debug, PartialEq)]
pub struct CompletedIntake {
    pub origin_raw: String,
    pub destination_raw: String,
    pub property_type: PropertyType,
    pub has_elevator: bool,
    pub needs_packing: bool,
    pub name: String,
    pub email: String,
    pub move_date: Option<NaiveDate>,
    pub extra_items: Option<String>,
}

impl RequestDraft {
    pub fn try_finish(&self) -> Result<CompletedIntake, DomainError> {
        fn required<T: Clone>(value: &Option<T>, field: &str) -> Result<T, DomainError> {
            value.clone().ok_or_else(|| DomainError::MissingField(field.to_string()))
        }

        Ok(CompletedIntake {
            origin_raw: required(&self.origin_raw, "origin")?,
            destination_raw: required(&self.destination_raw, "destination")?,
            property_type: required(&self.property_type, "property_type")?,
            has_elevator: required(&self.has_elevator, "has_elevator")?,
            needs_packing: required(&self.needs_packing, "needs_packing")?,
            name: required(&self.name, "name")?,
            email: required(&self.email, "email")?,
            move_date: self.move_date,
            extra_items: self.extra_items.clone(),
        })
    }
}

/// Transient per-identity conversational state during intake.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntakeSession {
    pub identity: String,
    pub step: IntakeStep,
    pub draft: RequestDraft,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl IntakeSession {
    pub fn start(identity: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            identity: identity.into(),
            step: IntakeStep::Origin,
            draft: RequestDraft::default(),
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    pub fn is_idle(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now - self.last_activity_at > ttl
    }
}

/// Keyed session storage.
///
/// `take` checks a session out of the store; a handler that took a session
/// owns it until it is put back or dropped, so two handlers never mutate
/// the same identity's session concurrently.
pub trait SessionStore: Send + Sync {
    fn take(&self, identity: &str) -> Option<IntakeSession>;
    fn put(&self, session: IntakeSession);
    fn contains(&self, identity: &str) -> bool;
    fn purge_idle(&self, ttl: Duration, now: DateTime<Utc>) -> usize;
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, IntakeSession>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IntakeSession>> {
        match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn take(&self, identity: &str) -> Option<IntakeSession> {
        self.lock().remove(identity)
    }

    fn put(&self, session: IntakeSession) {
        self.lock().insert(session.identity.clone(), session);
    }

    fn contains(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }

    fn purge_idle(&self, ttl: Duration, now: DateTime<Utc>) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_idle(ttl, now));
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{InMemorySessionStore, IntakeSession, SessionStore};

    #[test]
    fn take_checks_the_session_out() {
        let store = InMemorySessionStore::new();
        store.put(IntakeSession::start("5511987654321", Utc::now()));

        let session = store.take("5511987654321").expect("session present");
        assert!(store.take("5511987654321").is_none(), "taken session is exclusive");

        store.put(session);
        assert!(store.contains("5511987654321"));
    }

    #[test]
    fn purge_removes_only_idle_sessions() {
        let now = Utc::now();
        let store = InMemorySessionStore::new();

        let mut stale = IntakeSession::start("stale", now - Duration::minutes(90));
        stale.last_activity_at = now - Duration::minutes(90);
        store.put(stale);
        store.put(IntakeSession::start("fresh", now));

        let purged = store.purge_idle(Duration::minutes(30), now);
        assert_eq!(purged, 1);
        assert!(store.contains("fresh"));
        assert!(!store.contains("stale"));
    }

    #[test]
    fn draft_finish_requires_all_mandatory_answers() {
        let session = IntakeSession::start("id", Utc::now());
        assert!(session.draft.try_finish().is_err());
    }
}
