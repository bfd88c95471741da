use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::events::{ChannelEnvelope, ChannelEvent, EventContext, EventDispatcher, HandlerResult};
use crate::sender::ChannelSender;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Inbound event stream of the channel (webhook bridge, long-poll, or a
/// test script).
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<ChannelEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Transport that immediately reports a closed stream. Lets the server
/// run without channel credentials.
#[derive(Default)]
pub struct NoopChannelTransport;

#[async_trait]
impl ChannelTransport for NoopChannelTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<ChannelEnvelope>, TransportError> {
        Ok(None)
    }

    async fn acknowledge(&self, _envelope_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Sender that drops every reply. Paired with the noop transport.
pub struct NoopChannelSender;

#[async_trait]
impl ChannelSender for NoopChannelSender {
    async fn send(
        &self,
        _identity: &str,
        _message: &crate::messages::OutboundMessage,
    ) -> Result<crate::sender::SendReceipt, crate::sender::SendError> {
        Ok(crate::sender::SendReceipt { message_id: None })
    }
}

/// Pumps channel events through the dispatcher and pushes replies back
/// through the sender, reconnecting with bounded backoff.
pub struct ChannelRunner {
    transport: Arc<dyn ChannelTransport>,
    sender: Arc<dyn ChannelSender>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    noop_transport: bool,
}

impl Default for ChannelRunner {
    fn default() -> Self {
        Self {
            transport: Arc::new(NoopChannelTransport),
            sender: Arc::new(NoopChannelSender),
            dispatcher: crate::events::default_dispatcher(),
            reconnect_policy: ReconnectPolicy::default(),
            noop_transport: true,
        }
    }
}

impl ChannelRunner {
    pub fn new(
        transport: Arc<dyn ChannelTransport>,
        sender: Arc<dyn ChannelSender>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, sender, dispatcher, reconnect_policy, noop_transport: false }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.noop_transport
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "channel transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "channel transport retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening channel transport connection");
        self.transport.connect().await?;
        info!(attempt, "channel transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "channel transport stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };

            let identity = identity_of(&envelope);
            info!(
                event_name = "ingress.channel.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                identity = identity.as_deref().unwrap_or("unknown"),
                "received channel envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.channel.ack_failed",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    identity = identity.as_deref().unwrap_or("unknown"),
                    error = %error,
                    "failed to acknowledge channel envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.channel.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    identity = identity.as_deref().unwrap_or("unknown"),
                    "acknowledged channel envelope"
                );
            }

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            match self.dispatcher.dispatch(&envelope, &context).await {
                Ok(HandlerResult::Replies(replies)) => {
                    let Some(identity) = identity.as_deref() else {
                        continue;
                    };
                    for reply in replies {
                        if let Err(error) = self.sender.send(identity, &reply).await {
                            warn!(
                                envelope_id = %envelope.envelope_id,
                                correlation_id = %envelope.envelope_id,
                                identity,
                                error = %error,
                                "failed to send channel reply"
                            );
                        }
                    }
                }
                Ok(HandlerResult::Processed | HandlerResult::Ignored) => {}
                Err(error) => {
                    warn!(
                        envelope_id = %envelope.envelope_id,
                        correlation_id = %envelope.envelope_id,
                        identity = identity.as_deref().unwrap_or("unknown"),
                        error = %error,
                        "event dispatch failed; continuing channel loop"
                    );
                }
            }
        }
    }
}

fn identity_of(envelope: &ChannelEnvelope) -> Option<String> {
    match &envelope.event {
        ChannelEvent::Message(message) => Some(message.identity.clone()),
        ChannelEvent::StatusUpdate(_) | ChannelEvent::Unsupported { .. } => None,
    }
}
