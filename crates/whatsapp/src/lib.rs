//! WhatsApp channel adapter - the conversational surface of the pipeline.
//!
//! This crate owns everything channel-shaped and nothing pipeline-shaped:
//! - **Events** (`events`) - inbound envelopes, the event dispatcher, and
//!   the `IntakeMessageService` contract the server implements
//! - **Messages** (`messages`) - typed outbound templates (text, reply
//!   buttons, lists) and the intake question for each step
//! - **Sender** (`sender`) - outbound HTTP sender for a WhatsApp
//!   Cloud-style API, plus an in-memory double for tests
//! - **Transport** (`transport`) - inbound event pump with bounded
//!   reconnect backoff; a noop transport lets the server run unconfigured
//!
//! # Architecture
//!
//! ```text
//! Channel Events → ChannelRunner → EventDispatcher → IntakeMessageService
//!                       ↓                                    ↓
//!                 ChannelSender  ←  OutboundMessage replies ←┘
//! ```
//!
//! The crate never touches sessions, estimation, or persistence: those live
//! behind the `IntakeMessageService` trait so the channel stays testable
//! with scripted transports and in-memory senders.

pub mod events;
pub mod messages;
pub mod sender;
pub mod transport;

pub use events::{
    ChannelEnvelope, ChannelEvent, EventContext, EventDispatcher, InboundMessage,
    IntakeMessageService, MessagePayload,
};
pub use messages::OutboundMessage;
pub use sender::{ChannelSender, HttpChannelSender, InMemoryChannelSender};
pub use transport::{ChannelRunner, ChannelTransport, NoopChannelTransport, ReconnectPolicy};
