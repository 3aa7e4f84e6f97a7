//! Fotosync Cloud - record-store protocol adapter
//!
//! Implements everything between the domain core and the proprietary photos
//! backend:
//!
//! - [`srp`] - the password-authenticated key-agreement handshake
//! - [`auth`] - the authentication state machine (sign-in, MFA, trust
//!   tokens, account and zone setup)
//! - [`mfa`] - multi-factor channel payloads and response validation
//! - [`query`] / [`records`] - the query dialect and the validating record
//!   parser
//! - [`client`] - the paginated query/operation client with the indexing
//!   gate
//! - [`limit`] - the global request limiter shared across all outgoing calls
//! - [`remote`] - the [`fotosync_core::ports::RemoteLibrary`] implementation
//!   consumed by the reconciliation engine

pub mod auth;
pub mod client;
pub mod error;
pub mod limit;
pub mod mfa;
pub mod query;
pub mod records;
pub mod remote;
pub mod srp;
