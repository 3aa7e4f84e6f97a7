//! Multi-factor transport port
//!
//! The code-entry channel (web UI, CLI prompt, ...) is an external
//! collaborator. It delivers signals over an `mpsc` channel; the auth machine
//! consumes `CodeReceived` / `ResendRequested` and emits the corresponding
//! lifecycle events back.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// The verification channel a code travels over.
///
/// Defaults to `Device`; phone channels carry the id of the trusted number
/// the backend should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MfaChannel {
    /// Push a code to all trusted devices
    Device,
    /// Text a code to a trusted phone number
    Sms { number_id: u32 },
    /// Call a trusted phone number
    Voice { number_id: u32 },
}

impl Default for MfaChannel {
    fn default() -> Self {
        MfaChannel::Device
    }
}

impl std::fmt::Display for MfaChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaChannel::Device => write!(f, "'Device'"),
            MfaChannel::Sms { number_id } => write!(f, "'SMS' (Number ID: {number_id})"),
            MfaChannel::Voice { number_id } => write!(f, "'Voice' (Number ID: {number_id})"),
        }
    }
}

/// Signals delivered by the multi-factor transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaSignal {
    /// The user entered a verification code
    CodeReceived { channel: MfaChannel, code: String },
    /// The user asked for the code to be re-sent over the given channel
    ResendRequested { channel: MfaChannel },
}

/// Sender half handed to the transport collaborator.
pub type MfaSender = mpsc::Sender<MfaSignal>;

/// Receiver half consumed by the auth state machine.
pub type MfaReceiver = mpsc::Receiver<MfaSignal>;

/// Creates the signal channel connecting transport and auth machine.
pub fn mfa_channel() -> (MfaSender, MfaReceiver) {
    mpsc::channel(16)
}
