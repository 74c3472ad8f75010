//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools. Every repository also hands out a
//! transaction-bound handle (`repo.tx(&mut conn)`) so multi-step writes
//! never read through the pool while holding the writer connection.

pub mod collection;
pub mod example;
pub mod flow;
pub mod linked;
pub mod overlay;
pub mod ownership;
pub mod pool;
pub mod response;
pub mod snapshot;
pub mod util;
pub mod workspace;

pub use collection::SqliteCollectionRepository;
pub use example::SqliteExampleRepository;
pub use flow::SqliteFlowRepository;
pub use overlay::{SqliteAssertOverlay, SqliteKeyValueOverlay};
pub use ownership::{Owned, SqliteOwnership};
pub use pool::DatabasePool;
pub use response::SqliteResponseRepository;
pub use snapshot::SqliteSnapshotStore;
pub use workspace::SqliteWorkspaceRepository;
