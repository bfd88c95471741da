use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::domain::request::RequestId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    pub fn allowed() -> Self {
        Self { allowed: true, retry_after_secs: None }
    }

    pub fn throttled(retry_after_secs: u64) -> Self {
        Self { allowed: false, retry_after_secs: Some(retry_after_secs) }
    }
}

/// Inbound-identity throttle consumed by the intake pipeline.
///
/// The pipeline rejects with a retry-after when `allowed` is false and
/// records every accepted turn.
pub trait RateLimitGuard: Send + Sync {
    fn check(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision;
    fn record_attempt(&self, identity: &str, now: DateTime<Utc>);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub existing_id: Option<RequestId>,
}

impl DuplicateCheck {
    pub fn fresh() -> Self {
        Self { is_duplicate: false, existing_id: None }
    }
}

/// Duplicate-submission window consumed before any quote request is written.
pub trait DuplicateGuard: Send + Sync {
    fn check_duplicate(
        &self,
        email: &str,
        origin: &str,
        destination: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DuplicateCheck;

    fn record_submission(
        &self,
        email: &str,
        origin: &str,
        destination: &str,
        id: &RequestId,
        now: DateTime<Utc>,
    );
}

/// Guard that lets everything through; the production guard is an external
/// collaborator wired in at bootstrap.
#[derive(Clone, Copy, Debug, Default)]
pub struct PermissiveGuard;

impl RateLimitGuard for PermissiveGuard {
    fn check(&self, _identity: &str, _now: DateTime<Utc>) -> RateLimitDecision {
        RateLimitDecision::allowed()
    }

    fn record_attempt(&self, _identity: &str, _now: DateTime<Utc>) {}
}

impl DuplicateGuard for PermissiveGuard {
    fn check_duplicate(
        &self,
        _email: &str,
        _origin: &str,
        _destination: &str,
        _window: Duration,
        _now: DateTime<Utc>,
    ) -> DuplicateCheck {
        DuplicateCheck::fresh()
    }

    fn record_submission(
        &self,
        _email: &str,
        _origin: &str,
        _destination: &str,
        _id: &RequestId,
        _now: DateTime<Utc>,
    ) {
    }
}

/// Sliding-window limiter for single-instance deployments.
#[derive(Clone)]
pub struct InMemoryRateLimitGuard {
    max_attempts: u32,
    window: Duration,
    attempts: Arc<Mutex<HashMap<String, Vec<DateTime<Utc>>>>>,
}

impl InMemoryRateLimitGuard {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self { max_attempts, window, attempts: Arc::new(Mutex::new(HashMap::new())) }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<DateTime<Utc>>>> {
        match self.attempts.lock() {
            Ok(attempts) => attempts,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl RateLimitGuard for InMemoryRateLimitGuard {
    fn check(&self, identity: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let mut attempts = self.lock();
        let Some(history) = attempts.get_mut(identity) else {
            return RateLimitDecision::allowed();
        };
        history.retain(|at| now - *at <= self.window);

        if (history.len() as u32) < self.max_attempts {
            return RateLimitDecision::allowed();
        }

        let oldest = history.iter().min().copied().unwrap_or(now);
        let retry_after = (oldest + self.window - now).num_seconds().max(1) as u64;
        RateLimitDecision::throttled(retry_after)
    }

    fn record_attempt(&self, identity: &str, now: DateTime<Utc>) {
        self.lock().entry(identity.to_string()).or_default().push(now);
    }
}

/// In-memory duplicate window keyed by a submission fingerprint.
#[derive(Clone, Default)]
pub struct InMemoryDuplicateGuard {
    submissions: Arc<Mutex<HashMap<String, (RequestId, DateTime<Utc>)>>>,
}

impl InMemoryDuplicateGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (RequestId, DateTime<Utc>)>> {
        match self.submissions.lock() {
            Ok(submissions) => submissions,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Stable fingerprint over the fields that define a duplicate submission.
pub fn submission_fingerprint(email: &str, origin: &str, destination: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(origin.trim().to_lowercase().as_bytes());
    hasher.update(b"\x1f");
    hasher.update(destination.trim().to_lowercase().as_bytes());
    format!("{:x}", hasher.finalize())
}

impl DuplicateGuard for InMemoryDuplicateGuard {
    fn check_duplicate(
        &self,
        email: &str,
        origin: &str,
        destination: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> DuplicateCheck {
        let fingerprint = submission_fingerprint(email, origin, destination);
        let submissions = self.lock();
        match submissions.get(&fingerprint) {
            Some((id, at)) if now - *at <= window => {
                DuplicateCheck { is_duplicate: true, existing_id: Some(id.clone()) }
            }
            _ => DuplicateCheck::fresh(),
        }
    }

    fn record_submission(
        &self,
        email: &str,
        origin: &str,
        destination: &str,
        id: &RequestId,
        now: DateTime<Utc>,
    ) {
        let fingerprint = submission_fingerprint(email, origin, destination);
        self.lock().insert(fingerprint, (id.clone(), now));
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use crate::domain::request::RequestId;

    use super::{
        DuplicateGuard, InMemoryDuplicateGuard, InMemoryRateLimitGuard, PermissiveGuard,
        RateLimitGuard,
    };

    #[test]
    fn limiter_throttles_after_the_window_fills() {
        let now = Utc::now();
        let guard = InMemoryRateLimitGuard::new(3, Duration::seconds(60));

        for _ in 0..3 {
            assert!(guard.check("5511987654321", now).allowed);
            guard.record_attempt("5511987654321", now);
        }

        let decision = guard.check("5511987654321", now);
        assert!(!decision.allowed);
        assert!(decision.retry_after_secs.is_some());
    }

    #[test]
    fn limiter_forgets_attempts_outside_the_window() {
        let now = Utc::now();
        let guard = InMemoryRateLimitGuard::new(1, Duration::seconds(60));

        guard.record_attempt("id", now - Duration::seconds(120));
        assert!(guard.check("id", now).allowed);
    }

    #[test]
    fn limiter_tracks_identities_independently() {
        let now = Utc::now();
        let guard = InMemoryRateLimitGuard::new(1, Duration::seconds(60));

        guard.record_attempt("first", now);
        assert!(!guard.check("first", now).allowed);
        assert!(guard.check("second", now).allowed);
    }

    #[test]
    fn duplicate_guard_flags_repeat_within_window() {
        let now = Utc::now();
        let guard = InMemoryDuplicateGuard::new();
        let id = RequestId("R-1".to_string());

        guard.record_submission("ana@x.com", "Moema SP", "Santana SP", &id, now);

        let check = guard.check_duplicate(
            "ANA@x.com ",
            "moema sp",
            "santana sp",
            Duration::minutes(30),
            now + Duration::minutes(5),
        );
        assert!(check.is_duplicate);
        assert_eq!(check.existing_id, Some(id));

        let expired = guard.check_duplicate(
            "ana@x.com",
            "Moema SP",
            "Santana SP",
            Duration::minutes(30),
            now + Duration::minutes(45),
        );
        assert!(!expired.is_duplicate);
    }

    #[test]
    fn permissive_guard_always_allows() {
        let now = Utc::now();
        assert!(PermissiveGuard.check("any", now).allowed);
        assert!(
            !PermissiveGuard
                .check_duplicate("a@b.co", "x", "y", Duration::minutes(1), now)
                .is_duplicate
        );
    }
}
