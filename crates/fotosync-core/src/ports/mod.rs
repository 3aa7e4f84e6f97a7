//! Port definitions (trait seams)
//!
//! Adapters implement these traits; the reconciliation engine and the auth
//! machine only ever see the trait objects.

pub mod library_store;
pub mod mfa;
pub mod remote_library;

pub use library_store::LibraryStore;
pub use mfa::{mfa_channel, MfaChannel, MfaReceiver, MfaSender, MfaSignal};
pub use remote_library::{FetchedAlbums, FetchedAssets, RemoteLibrary};
