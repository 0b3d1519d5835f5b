//! Database repositories for the data access layer
//!
//! `traits` defines the contracts the services depend on. `postgres` holds the sqlx
//! implementations and `memory` the in-process ones.

pub mod memory;
pub mod postgres;
pub mod traits;

pub use memory::{
    InMemoryCompanyDirectory, InMemoryDocumentRepository, InMemoryFileRepository,
    InMemorySessionStore, InMemorySettingsStore,
};
pub use postgres::{
    connect, run_migrations, PgCompanyDirectory, PgDocumentRepository, PgFileRepository,
    PgSettingsStore,
};
pub use traits::{
    AllocationSessionStore, CompanyDirectory, DocumentRepository, FileRepository, SettingsStore,
};
