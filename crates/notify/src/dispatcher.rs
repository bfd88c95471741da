use std::sync::Arc;
use std::time::Duration;

use mudey_core::chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use mudey_core::config::DispatchConfig;
use mudey_core::domain::campaign::{CampaignLink, ErrorClass};
use mudey_core::domain::request::QuoteRequest;
use mudey_db::repositories::{
    CampaignLinkRepository, CampaignRepository, DeliveryLogEntry, DeliveryLogRepository,
    QuoteRequestRepository,
};

use crate::email::{EmailMessage, EmailReceipt, EmailSender};
use crate::shortener::UrlShortener;
use crate::templates::{lead_subject, render_lead_email, LeadEmailContext};

/// Result of one dispatch sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
    pub batches: usize,
}

/// Sender identity stamped on every outbound notification.
#[derive(Clone, Debug)]
pub struct SenderIdentity {
    pub from_address: String,
    pub from_name: String,
    pub reply_to: Option<String>,
}

/// Fan-out notification dispatcher.
///
/// Claims deliverable campaign links in fixed-size batches (the claim
/// doubles as the optimistic lock), builds one notification per link, and
/// records every outcome in the delivery log. One bad record never aborts
/// a batch; batches run sequentially with a pause to respect provider
/// rate limits.
pub struct NotificationDispatcher {
    links: Arc<dyn CampaignLinkRepository>,
    requests: Arc<dyn QuoteRequestRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    delivery_log: Arc<dyn DeliveryLogRepository>,
    email: Arc<dyn EmailSender>,
    shortener: UrlShortener,
    sender_identity: SenderIdentity,
    portal_base_url: String,
    config: DispatchConfig,
}

enum DeliveryFailure {
    Transient(String),
    Terminal(String),
}

impl DeliveryFailure {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Transient(_) => ErrorClass::Transient,
            Self::Terminal(_) => ErrorClass::Terminal,
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Transient(message) | Self::Terminal(message) => message,
        }
    }
}

impl NotificationDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        links: Arc<dyn CampaignLinkRepository>,
        requests: Arc<dyn QuoteRequestRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        delivery_log: Arc<dyn DeliveryLogRepository>,
        email: Arc<dyn EmailSender>,
        shortener: UrlShortener,
        sender_identity: SenderIdentity,
        portal_base_url: String,
        config: DispatchConfig,
    ) -> Self {
        Self {
            links,
            requests,
            campaigns,
            delivery_log,
            email,
            shortener,
            sender_identity,
            portal_base_url,
            config,
        }
    }

    /// Processes everything currently deliverable and returns the tally.
    pub async fn dispatch_pending(&self) -> DispatchSummary {
        let mut summary = DispatchSummary::default();

        loop {
            let batch = match self
                .links
                .claim_due(self.config.batch_size, self.config.max_attempts, Utc::now())
                .await
            {
                Ok(batch) => batch,
                Err(repository_error) => {
                    error!(
                        event_name = "dispatch.claim_failed",
                        correlation_id = "dispatch-sweep",
                        error = %repository_error,
                        "could not claim deliverable links; aborting sweep"
                    );
                    break;
                }
            };

            if batch.is_empty() {
                break;
            }

            let batch_len = batch.len();
            summary.batches += 1;
            for link in batch {
                if self.process_link(link).await {
                    summary.sent += 1;
                } else {
                    summary.failed += 1;
                }
            }

            if batch_len < self.config.batch_size {
                break;
            }
            tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
        }

        info!(
            event_name = "dispatch.sweep_finished",
            correlation_id = "dispatch-sweep",
            sent = summary.sent,
            failed = summary.failed,
            batches = summary.batches,
            "dispatch sweep finished"
        );
        summary
    }

    /// Delivers one claimed link. Returns true on success.
    async fn process_link(&self, mut link: CampaignLink) -> bool {
        let link_id = link.id.clone();
        let outcome = self.deliver(&link).await;
        let now = Utc::now();

        let (sent, detail) = match outcome {
            Ok(receipt) => {
                let message_id = receipt.message_id.clone().unwrap_or_default();
                if let Err(transition_error) = link.mark_sent(message_id.clone(), now) {
                    warn!(
                        event_name = "dispatch.transition_rejected",
                        link_id = %link_id.0,
                        error = %transition_error,
                        "sent transition rejected"
                    );
                }
                (
                    true,
                    json!({
                        "provider": receipt.provider,
                        "message_id": message_id,
                        "attempt": link.attempts,
                    }),
                )
            }
            Err(failure) => {
                if let Err(transition_error) =
                    link.mark_failed(failure.message(), failure.class(), now)
                {
                    warn!(
                        event_name = "dispatch.transition_rejected",
                        link_id = %link_id.0,
                        error = %transition_error,
                        "failed transition rejected"
                    );
                }
                warn!(
                    event_name = "dispatch.delivery_failed",
                    correlation_id = "dispatch-sweep",
                    link_id = %link_id.0,
                    error_class = failure.class().as_str(),
                    attempt = link.attempts,
                    error = %failure.message(),
                    "delivery failed"
                );
                (
                    false,
                    json!({
                        "error": failure.message(),
                        "error_class": failure.class().as_str(),
                        "attempt": link.attempts,
                    }),
                )
            }
        };

        if let Err(save_error) = self.links.save(link.clone()).await {
            error!(
                event_name = "dispatch.link_save_failed",
                link_id = %link_id.0,
                error = %save_error,
                "could not persist delivery outcome"
            );
        }

        // Audit trail is best-effort: a logging failure never changes the
        // delivery outcome.
        let entry = DeliveryLogEntry::new(
            link.id.clone(),
            link.request_id.clone(),
            link.company_id.clone(),
            if sent { "sent" } else { "failed" },
            detail.to_string(),
            now,
        );
        if let Err(log_error) = self.delivery_log.append(entry).await {
            warn!(
                event_name = "dispatch.audit_write_failed",
                link_id = %link_id.0,
                error = %log_error,
                "delivery log write failed; outcome kept"
            );
        }

        sent
    }

    async fn deliver(&self, link: &CampaignLink) -> Result<EmailReceipt, DeliveryFailure> {
        let request = self
            .requests
            .find_by_id(&link.request_id)
            .await
            .map_err(|error| DeliveryFailure::Transient(format!("request lookup failed: {error}")))?
            .ok_or_else(|| {
                DeliveryFailure::Terminal(format!("quote request {} missing", link.request_id.0))
            })?;

        let company = self
            .campaigns
            .find_company(&link.company_id)
            .await
            .map_err(|error| DeliveryFailure::Transient(format!("company lookup failed: {error}")))?
            .ok_or_else(|| {
                DeliveryFailure::Terminal(format!("company {} missing", link.company_id.0))
            })?;

        let Some(recipient) = company.contact_email.clone() else {
            return Err(DeliveryFailure::Terminal(format!(
                "company {} has no contact email",
                link.company_id.0
            )));
        };

        let long_link = self.portal_link(&request, link);
        let short_link = self
            .shortener
            .shorten(&long_link)
            .await
            .map_err(|error| DeliveryFailure::Transient(error.to_string()))?;

        let context = LeadEmailContext::build(&request, &company, short_link);
        let html = render_lead_email(&context)
            .map_err(|error| DeliveryFailure::Terminal(error.to_string()))?;

        let message = EmailMessage {
            to: recipient,
            subject: lead_subject(&request),
            html,
            from: self.sender_identity.from_address.clone(),
            from_name: self.sender_identity.from_name.clone(),
            reply_to: self.sender_identity.reply_to.clone(),
        };

        self.email
            .send(&message)
            .await
            .map_err(|error| DeliveryFailure::Transient(error.to_string()))
    }

    /// Long lead link handed to the shortener. Embeds the lead content so
    /// the company page renders even before the API lookup resolves.
    fn portal_link(&self, request: &QuoteRequest, link: &CampaignLink) -> String {
        let base = self.portal_base_url.trim_end_matches('/');
        let endpoint = format!("{base}/leads/{}", request.id.0);

        let price = request
            .price
            .map(|price| format!("{:.2}-{:.2}", price.min, price.max))
            .unwrap_or_default();
        let params = [
            ("entrega", link.id.0.as_str()),
            ("origem", request.origin_raw.as_str()),
            ("destino", request.destination_raw.as_str()),
            ("imovel", request.property_type.as_str()),
            ("faixa", price.as_str()),
        ];

        match reqwest::Url::parse_with_params(&endpoint, &params) {
            Ok(url) => url.to_string(),
            Err(_) => endpoint,
        }
    }
}
