use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;

use mudey_core::intake::AnswerInput;

use crate::messages::OutboundMessage;

/// One inbound unit from the channel transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEnvelope {
    pub envelope_id: String,
    pub event: ChannelEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(InboundMessage),
    StatusUpdate(StatusUpdateEvent),
    Unsupported { event_type: String },
}

impl ChannelEvent {
    pub fn event_type(&self) -> ChannelEventType {
        match self {
            Self::Message(_) => ChannelEventType::Message,
            Self::StatusUpdate(_) => ChannelEventType::StatusUpdate,
            Self::Unsupported { .. } => ChannelEventType::Unsupported,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChannelEventType {
    Message,
    StatusUpdate,
    Unsupported,
}

/// A user message: free text, or the id of a tapped button / list row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender identity (normalized phone number).
    pub identity: String,
    pub payload: MessagePayload,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessagePayload {
    Text(String),
    ButtonReply { id: String },
    ListReply { id: String },
}

impl InboundMessage {
    /// Converts the payload into the intake engine's answer shape.
    pub fn as_answer(&self) -> AnswerInput {
        match &self.payload {
            MessagePayload::Text(text) => AnswerInput::Text(text.clone()),
            MessagePayload::ButtonReply { id } | MessagePayload::ListReply { id } => {
                AnswerInput::Option(id.clone())
            }
        }
    }

    /// Raw text of the payload, for activation-keyword checks and logs.
    pub fn raw_text(&self) -> &str {
        match &self.payload {
            MessagePayload::Text(text) => text,
            MessagePayload::ButtonReply { id } | MessagePayload::ListReply { id } => id,
        }
    }
}

/// Provider-side delivery receipt for a message we sent. Consumed for
/// logging only; the pipeline state lives elsewhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdateEvent {
    pub message_id: String,
    pub status: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// What a handler did with an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// Send these messages back to the event's sender.
    Replies(Vec<OutboundMessage>),
    /// Handled, nothing to say.
    Processed,
    /// No handler, or the handler chose silence.
    Ignored,
}

#[derive(Debug, Error)]
pub enum EventHandlerError {
    #[error("intake handler failure: {0}")]
    Intake(String),
    #[error("status handler failure: {0}")]
    Status(String),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChannelEventType;
    async fn handle(
        &self,
        envelope: &ChannelEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChannelEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        envelope: &ChannelEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

/// The intake pipeline behind the message handler. Implemented by the
/// server; the channel crate only knows the contract: silence is allowed
/// (no active session, non-activation message), replies go back verbatim.
#[async_trait]
pub trait IntakeMessageService: Send + Sync {
    async fn handle_message(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<Vec<OutboundMessage>, EventHandlerError>;
}

#[async_trait]
impl<T> IntakeMessageService for Arc<T>
where
    T: IntakeMessageService + ?Sized,
{
    async fn handle_message(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<Vec<OutboundMessage>, EventHandlerError> {
        (**self).handle_message(message, ctx).await
    }
}

pub struct MessageHandler<S> {
    service: S,
}

impl<S> MessageHandler<S>
where
    S: IntakeMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageHandler<S>
where
    S: IntakeMessageService + 'static,
{
    fn event_type(&self) -> ChannelEventType {
        ChannelEventType::Message
    }

    async fn handle(
        &self,
        envelope: &ChannelEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChannelEvent::Message(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let replies = self.service.handle_message(message, ctx).await?;
        Ok(if replies.is_empty() {
            HandlerResult::Processed
        } else {
            HandlerResult::Replies(replies)
        })
    }
}

/// Service that never answers. Used when the server boots without a
/// configured pipeline and by tests that only exercise routing.
#[derive(Default)]
pub struct SilentMessageService;

#[async_trait]
impl IntakeMessageService for SilentMessageService {
    async fn handle_message(
        &self,
        _message: &InboundMessage,
        _ctx: &EventContext,
    ) -> Result<Vec<OutboundMessage>, EventHandlerError> {
        Ok(Vec::new())
    }
}

pub struct StatusUpdateHandler;

#[async_trait]
impl EventHandler for StatusUpdateHandler {
    fn event_type(&self) -> ChannelEventType {
        ChannelEventType::StatusUpdate
    }

    async fn handle(
        &self,
        envelope: &ChannelEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChannelEvent::StatusUpdate(_) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        Ok(HandlerResult::Processed)
    }
}

pub fn default_dispatcher() -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageHandler::new(SilentMessageService));
    dispatcher.register(StatusUpdateHandler);
    dispatcher
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::messages::OutboundMessage;

    use super::{
        default_dispatcher, ChannelEnvelope, ChannelEvent, EventContext, EventDispatcher,
        EventHandlerError, HandlerResult, InboundMessage, IntakeMessageService, MessageHandler,
        MessagePayload, StatusUpdateEvent,
    };

    fn text_envelope(id: &str, identity: &str, text: &str) -> ChannelEnvelope {
        ChannelEnvelope {
            envelope_id: id.to_string(),
            event: ChannelEvent::Message(InboundMessage {
                identity: identity.to_string(),
                payload: MessagePayload::Text(text.to_string()),
            }),
        }
    }

    struct EchoService;

    #[async_trait]
    impl IntakeMessageService for EchoService {
        async fn handle_message(
            &self,
            message: &InboundMessage,
            _ctx: &EventContext,
        ) -> Result<Vec<OutboundMessage>, EventHandlerError> {
            Ok(vec![OutboundMessage::text(message.raw_text().to_string())])
        }
    }

    #[tokio::test]
    async fn dispatcher_routes_messages_to_the_intake_service() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(MessageHandler::new(EchoService));

        let result = dispatcher
            .dispatch(&text_envelope("env-1", "5511987654321", "oi"), &EventContext::default())
            .await
            .expect("dispatch");

        let HandlerResult::Replies(replies) = result else {
            panic!("expected replies");
        };
        assert_eq!(replies[0].fallback_text(), "oi");
    }

    #[tokio::test]
    async fn silent_service_produces_processed_not_replies() {
        let dispatcher = default_dispatcher();

        let result = dispatcher
            .dispatch(
                &text_envelope("env-2", "5511987654321", "mensagem qualquer"),
                &EventContext::default(),
            )
            .await
            .expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
    }

    #[tokio::test]
    async fn unsupported_events_are_ignored() {
        let dispatcher = default_dispatcher();
        let envelope = ChannelEnvelope {
            envelope_id: "env-3".to_string(),
            event: ChannelEvent::Unsupported { event_type: "reaction".to_string() },
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test]
    async fn status_updates_are_processed_silently() {
        let dispatcher = default_dispatcher();
        let envelope = ChannelEnvelope {
            envelope_id: "env-4".to_string(),
            event: ChannelEvent::StatusUpdate(StatusUpdateEvent {
                message_id: "msg-1".to_string(),
                status: "delivered".to_string(),
            }),
        };

        let result =
            dispatcher.dispatch(&envelope, &EventContext::default()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);
    }

    #[test]
    fn default_dispatcher_registers_handlers() {
        assert_eq!(default_dispatcher().handler_count(), 2);
    }

    #[test]
    fn button_replies_become_option_answers() {
        let message = InboundMessage {
            identity: "5511987654321".to_string(),
            payload: MessagePayload::ButtonReply { id: "elevator.yes".to_string() },
        };
        assert_eq!(
            message.as_answer(),
            mudey_core::intake::AnswerInput::Option("elevator.yes".to_string())
        );
    }
}
