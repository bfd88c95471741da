//! Price estimation service - the model-assisted half of the pipeline.
//!
//! This crate turns a completed intake into a bounded price range:
//! 1. **Prompt construction** (`prompt`) - encode addresses and pricing
//!    heuristics into a deterministic prompt
//! 2. **Completion call** (`llm`) - pluggable `CompletionClient` with an
//!    OpenAI-compatible HTTP implementation
//! 3. **Parse and clamp** (`estimator`) - parse the model's JSON and force
//!    the deterministic floor and margin invariants onto it
//!
//! # Safety Principle
//!
//! The model is strictly an estimator. It NEVER gets the last word on a
//! price: the deterministic floor in `mudey_core::pricing` raises any
//! implausibly cheap output, and a failed or malformed model call degrades
//! to the deterministic fallback estimator rather than to silence.

pub mod estimator;
pub mod llm;
pub mod prompt;

pub use estimator::PriceEstimator;
pub use llm::{CompletionClient, HttpCompletionClient};
pub use prompt::{build_prompt, EstimateInput};
