use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::request::RequestId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompanyId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CampaignId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A company's active promotional period during which it receives leads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub company_id: CompanyId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// When set, only requests originating in this state match.
    pub origin_state: Option<String>,
    pub active: bool,
}

impl Campaign {
    pub fn matches(&self, origin_state: Option<&str>, now: DateTime<Utc>) -> bool {
        if !self.active || now < self.starts_at {
            return false;
        }
        if self.ends_at.is_some_and(|ends_at| now > ends_at) {
            return false;
        }
        match (&self.origin_state, origin_state) {
            (Some(filter), Some(state)) => filter.eq_ignore_ascii_case(state),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sending,
    Sent,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "queued" => Some(Self::Queued),
            "sending" => Some(Self::Sending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Distinguishes failures worth retrying from failures that never will be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Transient,
    Terminal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Terminal => "terminal",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "transient" => Some(Self::Transient),
            "terminal" => Some(Self::Terminal),
            _ => None,
        }
    }
}

/// The per-company delivery record for one quote request.
///
/// Mutated exclusively by the dispatcher; attempts only ever grow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignLink {
    pub id: LinkId,
    pub request_id: RequestId,
    pub company_id: CompanyId,
    pub campaign_id: CampaignId,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CampaignLink {
    pub fn new(request_id: RequestId, campaign: &Campaign, now: DateTime<Utc>) -> Self {
        Self {
            id: LinkId(Uuid::new_v4().to_string()),
            request_id,
            company_id: campaign.company_id.clone(),
            campaign_id: campaign.id.clone(),
            status: DeliveryStatus::Queued,
            attempts: 0,
            last_error: None,
            error_class: None,
            message_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_transition_to(&self, next: DeliveryStatus, max_attempts: u32) -> bool {
        match (self.status, next) {
            (DeliveryStatus::Queued, DeliveryStatus::Sending) => true,
            (DeliveryStatus::Sending, DeliveryStatus::Sent) => true,
            (DeliveryStatus::Sending, DeliveryStatus::Failed) => true,
            (DeliveryStatus::Failed, DeliveryStatus::Sending) => {
                self.attempts < max_attempts && self.error_class != Some(ErrorClass::Terminal)
            }
            _ => false,
        }
    }

    /// Claims the link for delivery. Consumes one attempt.
    pub fn begin_sending(
        &mut self,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(DeliveryStatus::Sending, max_attempts) {
            return Err(DomainError::InvalidDeliveryTransition {
                from: self.status,
                to: DeliveryStatus::Sending,
            });
        }
        self.status = DeliveryStatus::Sending;
        self.attempts += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_sent(
        &mut self,
        message_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(DeliveryStatus::Sent, u32::MAX) {
            return Err(DomainError::InvalidDeliveryTransition {
                from: self.status,
                to: DeliveryStatus::Sent,
            });
        }
        self.status = DeliveryStatus::Sent;
        self.message_id = Some(message_id.into());
        self.last_error = None;
        self.error_class = None;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        class: ErrorClass,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if !self.can_transition_to(DeliveryStatus::Failed, u32::MAX) {
            return Err(DomainError::InvalidDeliveryTransition {
                from: self.status,
                to: DeliveryStatus::Failed,
            });
        }
        self.status = DeliveryStatus::Failed;
        self.last_error = Some(error.into());
        self.error_class = Some(class);
        self.updated_at = now;
        Ok(())
    }

    /// Exhausted links stay `failed` and are never selected again.
    pub fn is_exhausted(&self, max_attempts: u32) -> bool {
        self.status == DeliveryStatus::Failed
            && (self.attempts >= max_attempts || self.error_class == Some(ErrorClass::Terminal))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{
        Campaign, CampaignId, CampaignLink, CompanyId, DeliveryStatus, ErrorClass, RequestId,
    };

    fn campaign(origin_state: Option<&str>) -> Campaign {
        Campaign {
            id: CampaignId("CP-1".to_string()),
            company_id: CompanyId("CO-1".to_string()),
            starts_at: Utc::now() - Duration::days(1),
            ends_at: None,
            origin_state: origin_state.map(str::to_string),
            active: true,
        }
    }

    fn link() -> CampaignLink {
        CampaignLink::new(RequestId("R-1".to_string()), &campaign(None), Utc::now())
    }

    #[test]
    fn campaign_matching_honors_window_and_state_filter() {
        let now = Utc::now();
        assert!(campaign(None).matches(Some("SP"), now));
        assert!(campaign(Some("SP")).matches(Some("sp"), now));
        assert!(!campaign(Some("RJ")).matches(Some("SP"), now));
        assert!(!campaign(Some("RJ")).matches(None, now));

        let mut inactive = campaign(None);
        inactive.active = false;
        assert!(!inactive.matches(Some("SP"), now));

        let mut expired = campaign(None);
        expired.ends_at = Some(now - Duration::hours(1));
        assert!(!expired.matches(Some("SP"), now));
    }

    #[test]
    fn delivery_walks_queued_sending_sent() {
        let mut link = link();
        link.begin_sending(3, Utc::now()).expect("queued -> sending");
        assert_eq!(link.attempts, 1);
        link.mark_sent("msg-1", Utc::now()).expect("sending -> sent");
        assert_eq!(link.status, DeliveryStatus::Sent);
        assert_eq!(link.message_id.as_deref(), Some("msg-1"));
    }

    #[test]
    fn failed_link_retries_until_the_ceiling() {
        let mut link = link();
        for attempt in 1..=3u32 {
            link.begin_sending(3, Utc::now()).expect("claim should succeed under ceiling");
            assert_eq!(link.attempts, attempt);
            link.mark_failed("smtp timeout", ErrorClass::Transient, Utc::now())
                .expect("sending -> failed");
        }
        assert!(link.is_exhausted(3));
        assert!(link.begin_sending(3, Utc::now()).is_err());
    }

    #[test]
    fn terminal_failures_are_never_reclaimed() {
        let mut link = link();
        link.begin_sending(3, Utc::now()).expect("queued -> sending");
        link.mark_failed("company has no contact email", ErrorClass::Terminal, Utc::now())
            .expect("sending -> failed");

        assert!(link.is_exhausted(3));
        assert!(link.begin_sending(3, Utc::now()).is_err());
    }

    #[test]
    fn sent_is_a_terminal_state() {
        let mut link = link();
        link.begin_sending(3, Utc::now()).expect("queued -> sending");
        link.mark_sent("msg-1", Utc::now()).expect("sending -> sent");
        assert!(link.begin_sending(3, Utc::now()).is_err());
        assert!(link.mark_failed("late error", ErrorClass::Transient, Utc::now()).is_err());
    }
}
