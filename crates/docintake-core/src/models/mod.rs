pub mod access;
pub mod allocation;
pub mod company;
pub mod document;
pub mod file;
pub mod job;
pub mod parsed;
pub mod query;
pub mod settings;

pub use access::{AccessScope, UserAccess, UserRole};
pub use allocation::{AllocationResult, AllocationSession, SessionStatus};
pub use company::Company;
pub use document::{Document, DocumentKind, DocumentStatus, NewDocument};
pub use file::{
    AllocationMetadata, EditLogEntry, FailureReason, FileFailure, FileRecord, FileStatus, NewFile,
};
pub use job::{Priority, ProcessingJob};
pub use parsed::ParsedFields;
pub use query::{DocumentQuery, FileFilter};
pub use settings::{
    RetentionDates, RetentionPolicy, RetentionTrigger, SettingsSnapshot, MAX_RETENTION_DAYS,
};
