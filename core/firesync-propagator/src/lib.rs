//! The Firesync propagation engine.
//!
//! Every local mutation arrives here as a classified
//! [`Event`](firesync_types::Event). Replicated echoes and tombstone
//! bookkeeping are skipped outright; user creations, updates, and
//! deletions run one datastore transaction that reconciles the document
//! and its tombstone sibling under last-writer-wins ordering, then the
//! surviving events are published to the propagation topic for peer
//! replicas to apply.
//!
//! # Components
//!
//! - **Propagator**: the transactional state machine and its per-kind
//!   sub-protocols
//! - **Transport**: abstract publish channel, with an in-process topic
//!   for local development and a mock for tests
//! - **Metrics**: per-result event counters and the event-to-ack latency
//!   histogram

mod error;
mod metrics;
mod propagator;
pub mod transport;

pub use error::{PropagateError, PropagateResult};
pub use metrics::{Counter, Histogram, PropagationMetrics};
pub use propagator::{PropagationResult, Propagator, PropagatorConfig};
pub use transport::{OutboundMessage, Transport, TransportError, TransportResult};
