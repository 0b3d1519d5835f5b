//! Docintake Services Layer
//!
//! The intake pipeline proper: hashing and duplicate detection at the gate, account
//! matching, allocation into canonical documents, staff remediation (single edits and
//! bulk sessions), per-user access filtering and retention. Persistence, storage and the
//! processing queue are injected from the lower crates so the binary wires one facade.

pub mod access;
pub mod allocator;
pub mod hasher;
pub mod intake;
pub mod matching;
pub mod notify;
pub mod outbox;
pub mod parser;
pub mod remediation;
pub mod retention;
pub mod settings;

pub use access::AccessFilter;
pub use allocator::{AllocationOutcome, DocumentAllocator, FieldSource, SYSTEM_ACTOR};
pub use hasher::{ContentHasher, Sha256Hasher};
pub use intake::{IntakeGate, IntakeOutcome};
pub use matching::{AccountCandidates, MatchOutcome, MatchStrategy, MatchingEngine};
pub use notify::{notifier_from_config, LogNotifier, Notifier, NotifyError};
pub use outbox::{Outbox, SideEffect};
pub use parser::{ParseError, Parser, PdfTextParser};
pub use remediation::{BulkAllocationRunner, BulkSelection, BulkStarted, FileEdit, RemediationService};
pub use retention::{RetentionReaper, RetentionSummary};
pub use settings::SettingsCache;
