//! Intake pipeline: everything that happens between an inbound channel
//! message and the queued campaign links.
//!
//! The conversational turn is synchronous relative to the session: a
//! session is checked out of the store, advanced, and either put back or
//! discarded before the reply is returned. Fan-out itself runs on the
//! dispatcher, never on this path.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use mudey_agent::{CompletionClient, EstimateInput, PriceEstimator};
use mudey_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use mudey_core::config::IntakeConfig;
use mudey_core::domain::campaign::CampaignLink;
use mudey_core::domain::request::{Channel, ContactInfo, QuoteRequest, RequestId};
use mudey_core::domain::session::{CompletedIntake, IntakeSession, SessionStore};
use mudey_core::guard::{DuplicateGuard, RateLimitGuard};
use mudey_core::intake::{IntakeFlow, TurnOutcome};
use mudey_core::pricing::{fallback_estimate, PriceEstimate, PricingPolicy};
use mudey_core::validate::normalize_phone;
use mudey_db::repositories::{
    CampaignLinkRepository, CampaignRepository, QuoteRequestRepository,
};
use mudey_notify::NotificationDispatcher;
use mudey_whatsapp::events::{EventContext, EventHandlerError, IntakeMessageService};
use mudey_whatsapp::messages::{
    duplicate_message, failure_message, prompt_for_step, reprompt_message, summary_message,
    throttled_message, OutboundMessage,
};
use mudey_whatsapp::InboundMessage;

pub struct IntakePipeline<C> {
    flow: IntakeFlow,
    sessions: Arc<dyn SessionStore>,
    rate_limit: Arc<dyn RateLimitGuard>,
    duplicates: Arc<dyn DuplicateGuard>,
    estimator: Option<PriceEstimator<C>>,
    policy: PricingPolicy,
    requests: Arc<dyn QuoteRequestRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    links: Arc<dyn CampaignLinkRepository>,
    audit: Arc<dyn AuditSink>,
    /// Set in production so completed intakes dispatch immediately; the
    /// periodic sweep covers anything this trigger misses.
    dispatcher: Option<Arc<NotificationDispatcher>>,
    config: IntakeConfig,
}

impl<C> IntakePipeline<C>
where
    C: CompletionClient + Send + Sync + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        rate_limit: Arc<dyn RateLimitGuard>,
        duplicates: Arc<dyn DuplicateGuard>,
        estimator: Option<PriceEstimator<C>>,
        policy: PricingPolicy,
        requests: Arc<dyn QuoteRequestRepository>,
        campaigns: Arc<dyn CampaignRepository>,
        links: Arc<dyn CampaignLinkRepository>,
        audit: Arc<dyn AuditSink>,
        dispatcher: Option<Arc<NotificationDispatcher>>,
        config: IntakeConfig,
    ) -> Self {
        Self {
            flow: IntakeFlow::new(),
            sessions,
            rate_limit,
            duplicates,
            estimator,
            policy,
            requests,
            campaigns,
            links,
            audit,
            dispatcher,
            config,
        }
    }

    /// Drops sessions idle past the configured TTL. Called by the sweep.
    pub fn purge_idle_sessions(&self) -> usize {
        self.sessions.purge_idle(Duration::minutes(self.config.session_ttl_minutes), Utc::now())
    }

    async fn handle_turn(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Vec<OutboundMessage> {
        let now = Utc::now();
        // Channel identities arrive in wire format; sessions are keyed by
        // the normalized number so formatting variants of the same phone
        // land on the same session.
        let identity =
            normalize_phone(&message.identity).unwrap_or_else(|_| message.identity.clone());
        let identity = identity.as_str();

        let Some(mut session) = self.sessions.take(identity) else {
            // No session: only an activation keyword may open one. Anything
            // else is ignored so bystanders are never messaged.
            if !self.flow.is_activation(message.raw_text()) {
                return Vec::new();
            }

            let decision = self.rate_limit.check(identity, now);
            if !decision.allowed {
                return vec![throttled_message(decision.retry_after_secs.unwrap_or(60))];
            }
            self.rate_limit.record_attempt(identity, now);

            let session = IntakeSession::start(identity, now);
            let first_step = session.step;
            self.sessions.put(session);

            self.audit.emit(AuditEvent::new(
                None,
                Some(identity.to_string()),
                ctx.correlation_id.clone(),
                "intake.session_opened",
                AuditCategory::Ingress,
                "intake-pipeline",
                AuditOutcome::Success,
            ));

            return vec![prompt_for_step(first_step)];
        };

        let decision = self.rate_limit.check(identity, now);
        if !decision.allowed {
            self.sessions.put(session);
            return vec![throttled_message(decision.retry_after_secs.unwrap_or(60))];
        }
        self.rate_limit.record_attempt(identity, now);

        let audit_ctx = AuditContext::new(
            None,
            Some(identity.to_string()),
            ctx.correlation_id.clone(),
            "intake-pipeline",
        );
        let outcome = self.flow.apply_with_audit(
            &mut session,
            &message.as_answer(),
            now.date_naive(),
            self.audit.as_ref(),
            &audit_ctx,
        );

        match outcome {
            TurnOutcome::Advanced { to } => {
                session.touch(now);
                self.sessions.put(session);
                vec![prompt_for_step(to)]
            }
            TurnOutcome::Reprompt { hint } => {
                session.touch(now);
                self.sessions.put(session);
                vec![reprompt_message(&hint)]
            }
            // The session was taken out of the store and is deliberately
            // not put back: completion discards it unconditionally.
            TurnOutcome::Completed => self.finalize(session, ctx).await,
        }
    }

    /// Terminal step of the conversation: estimate, persist, match, queue,
    /// summarize. Every error path resolves to a reply; the session is
    /// already gone from the store.
    async fn finalize(&self, session: IntakeSession, ctx: &EventContext) -> Vec<OutboundMessage> {
        let completed = match session.draft.try_finish() {
            Ok(completed) => completed,
            Err(missing) => {
                warn!(
                    event_name = "intake.finalize_incomplete",
                    correlation_id = %ctx.correlation_id,
                    identity = %session.identity,
                    error = %missing,
                    "intake completed with missing answers"
                );
                return vec![failure_message()];
            }
        };

        let now = Utc::now();
        let duplicate = self.duplicates.check_duplicate(
            &completed.email,
            &completed.origin_raw,
            &completed.destination_raw,
            Duration::minutes(self.config.duplicate_window_minutes),
            now,
        );
        if duplicate.is_duplicate {
            info!(
                event_name = "intake.duplicate_submission",
                correlation_id = %ctx.correlation_id,
                identity = %session.identity,
                existing_id = duplicate.existing_id.map(|id| id.0).unwrap_or_default(),
                "duplicate submission short-circuited"
            );
            return vec![duplicate_message()];
        }

        let submission_key = (
            completed.email.clone(),
            completed.origin_raw.clone(),
            completed.destination_raw.clone(),
        );
        let estimate = self.estimate(&completed, ctx).await;
        let request = self.build_request(&session, completed, &estimate, now);
        let request_id = request.id.clone();
        let price = estimate.price;
        let explanation = estimate.explanation.clone();

        let notified = match self.persist_and_match(request, ctx).await {
            Ok(notified) => notified,
            Err(()) => {
                // The estimate is still owed to the user even when saving
                // failed; the failure stays internal.
                return vec![summary_message(&price, &explanation, &[])];
            }
        };

        self.duplicates.record_submission(
            &submission_key.0,
            &submission_key.1,
            &submission_key.2,
            &request_id,
            now,
        );

        if let Some(dispatcher) = &self.dispatcher {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch_pending().await;
            });
        }

        vec![summary_message(&price, &explanation, &notified)]
    }

    async fn estimate(&self, completed: &CompletedIntake, ctx: &EventContext) -> PriceEstimate {
        let input = EstimateInput::from(completed);

        if let Some(estimator) = &self.estimator {
            if let Some(estimate) = estimator.estimate(&input).await {
                self.audit.emit(AuditEvent::new(
                    None,
                    None,
                    ctx.correlation_id.clone(),
                    "pricing.model_estimate",
                    AuditCategory::Pricing,
                    "price-estimator",
                    AuditOutcome::Success,
                ));
                return estimate;
            }
            warn!(
                event_name = "pricing.model_unavailable",
                correlation_id = %ctx.correlation_id,
                "completion service failed; using deterministic fallback"
            );
        }

        self.audit.emit(AuditEvent::new(
            None,
            None,
            ctx.correlation_id.clone(),
            "pricing.fallback_estimate",
            AuditCategory::Pricing,
            "price-estimator",
            AuditOutcome::Success,
        ));
        fallback_estimate(
            &self.policy,
            input.property_type,
            input.needs_packing,
            input.has_elevator,
            &input.origin_raw,
            &input.destination_raw,
        )
    }

    fn build_request(
        &self,
        session: &IntakeSession,
        completed: CompletedIntake,
        estimate: &PriceEstimate,
        now: chrono::DateTime<Utc>,
    ) -> QuoteRequest {
        QuoteRequest {
            id: RequestId(Uuid::new_v4().to_string()),
            contact: ContactInfo {
                name: completed.name,
                email: completed.email,
                phone: session.identity.clone(),
            },
            origin_raw: completed.origin_raw,
            destination_raw: completed.destination_raw,
            origin_city: estimate.origin_city.clone(),
            origin_state: estimate.origin_state.clone(),
            destination_city: estimate.destination_city.clone(),
            destination_state: estimate.destination_state.clone(),
            property_type: completed.property_type,
            has_elevator: completed.has_elevator,
            needs_packing: completed.needs_packing,
            move_date: completed.move_date,
            extra_items: completed.extra_items,
            distance_km: Some(estimate.distance_km),
            price: Some(estimate.price),
            explanation: Some(estimate.explanation.clone()),
            channel: Channel::WhatsApp,
            client_ip: None,
            user_agent: None,
            created_at: now,
        }
    }

    /// Saves the request and queues one link per matched company, returning
    /// the names of the notified companies. `Err(())` means nothing was
    /// persisted.
    async fn persist_and_match(
        &self,
        request: QuoteRequest,
        ctx: &EventContext,
    ) -> Result<Vec<String>, ()> {
        let request_id = request.id.clone();
        let origin_state = request.origin_state.clone();
        let now = request.created_at;

        if let Err(validation_error) = request.validate() {
            warn!(
                event_name = "intake.request_invalid",
                correlation_id = %ctx.correlation_id,
                error = %validation_error,
                "assembled request violated invariants; not persisting"
            );
            return Err(());
        }

        if let Err(save_error) = self.requests.save(request).await {
            warn!(
                event_name = "intake.request_save_failed",
                correlation_id = %ctx.correlation_id,
                error = %save_error,
                "quote request persistence failed; estimate still returned"
            );
            self.audit.emit(AuditEvent::new(
                Some(request_id),
                None,
                ctx.correlation_id.clone(),
                "persistence.request_save_failed",
                AuditCategory::Persistence,
                "intake-pipeline",
                AuditOutcome::Failed,
            ));
            return Err(());
        }

        let matching = match self
            .campaigns
            .list_matching_campaigns(origin_state.as_deref(), now)
            .await
        {
            Ok(matching) => matching,
            Err(lookup_error) => {
                warn!(
                    event_name = "intake.campaign_match_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %lookup_error,
                    "campaign matching failed; request saved without links"
                );
                return Ok(Vec::new());
            }
        };

        // One delivery per company: if several of a company's campaigns
        // match, only the earliest-starting one carries the lead.
        let mut notified = Vec::new();
        let mut seen_companies = std::collections::BTreeSet::new();
        for campaign in &matching {
            if !seen_companies.insert(campaign.company_id.0.clone()) {
                continue;
            }
            let link = CampaignLink::new(request_id.clone(), campaign, now);
            if let Err(save_error) = self.links.save(link).await {
                warn!(
                    event_name = "intake.link_save_failed",
                    correlation_id = %ctx.correlation_id,
                    company_id = %campaign.company_id.0,
                    error = %save_error,
                    "campaign link persistence failed"
                );
                continue;
            }
            let company_name = match self.campaigns.find_company(&campaign.company_id).await {
                Ok(Some(company)) => company.name,
                _ => campaign.company_id.0.clone(),
            };
            notified.push(company_name);
        }

        self.audit.emit(
            AuditEvent::new(
                Some(request_id),
                None,
                ctx.correlation_id.clone(),
                "intake.request_persisted",
                AuditCategory::Persistence,
                "intake-pipeline",
                AuditOutcome::Success,
            )
            .with_metadata("links_queued", notified.len().to_string()),
        );

        Ok(notified)
    }
}

#[async_trait]
impl<C> IntakeMessageService for IntakePipeline<C>
where
    C: CompletionClient + Send + Sync + 'static,
{
    async fn handle_message(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<Vec<OutboundMessage>, EventHandlerError> {
        Ok(self.handle_turn(message, ctx).await)
    }
}
