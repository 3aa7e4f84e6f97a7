//! Integration tests for the cloud adapter
//!
//! Uses wiremock to stand in for the authentication, setup and record
//! store services.

mod common;
mod test_auth;
mod test_client;
