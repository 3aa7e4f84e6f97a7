//! Fotosync Sync - reconciliation engine
//!
//! Mirrors the remote photo library onto the local filesystem, one-way:
//!
//! 1. **Fetch** - the full remote and local entity sets, four concurrent
//!    loads behind one barrier
//! 2. **Diff** - identity-based three-way partition into processing queues,
//!    plus hierarchical dependency resolution for albums
//! 3. **Write** - asset deletions before downloads, album writes in
//!    hierarchy order, archived albums through the stash
//! 4. **Retry** - a bounded loop that settles the request limiter and
//!    refreshes the session between attempts
//!
//! Concurrent engine runs against the same library are prevented by the
//! pid-based [`lock::LibraryLock`].

pub mod diff;
pub mod engine;
pub mod error;
pub mod lock;

pub use engine::{SyncEngine, SyncResult};
pub use error::{RetryLedger, SyncError};
