//! Processing queue for intake and remediation jobs.
//!
//! Two priority tiers, FIFO within a tier, a bounded worker pool, one job per
//! idempotency key, and retries with exponential backoff under a per-attempt timeout.

pub mod context;
pub mod pending;
pub mod queue;

pub use context::JobHandler;
pub use queue::{ProcessingQueue, SubmitOutcome};
