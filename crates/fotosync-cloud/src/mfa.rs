//! Multi-factor channel protocol plumbing
//!
//! Maps an [`MfaChannel`] to the endpoint paths, payloads and expected
//! status codes of the verification backend, and validates the shape of
//! resend responses per channel.

use fotosync_core::ports::MfaChannel;
use serde_json::{json, Value};

/// Endpoint path for requesting a new code on a trusted device
const DEVICE_RESEND_PATH: &str = "/verify/trusteddevice";
/// Endpoint path for entering a device code
const DEVICE_ENTER_PATH: &str = "/verify/trusteddevice/securitycode";
/// Endpoint path for requesting a new code via phone (sms/voice)
const PHONE_RESEND_PATH: &str = "/verify/phone";
/// Endpoint path for entering a phone code
const PHONE_ENTER_PATH: &str = "/verify/phone/securitycode";

/// Protocol behavior for one verification channel.
pub trait MfaChannelExt {
    fn resend_path(&self) -> &'static str;
    fn enter_path(&self) -> &'static str;
    fn resend_payload(&self) -> Option<Value>;
    fn enter_payload(&self, code: &str) -> Value;
    fn resend_successful(&self, status: u16) -> bool;
    fn enter_successful(&self, status: u16) -> bool;
    fn validate_resend_body(&self, body: &Value) -> Result<String, String>;
}

impl MfaChannelExt for MfaChannel {
    fn resend_path(&self) -> &'static str {
        match self {
            MfaChannel::Device => DEVICE_RESEND_PATH,
            MfaChannel::Sms { .. } | MfaChannel::Voice { .. } => PHONE_RESEND_PATH,
        }
    }

    fn enter_path(&self) -> &'static str {
        match self {
            MfaChannel::Device => DEVICE_ENTER_PATH,
            MfaChannel::Sms { .. } | MfaChannel::Voice { .. } => PHONE_ENTER_PATH,
        }
    }

    /// Resend body: devices need none, phone channels carry the trusted
    /// number id and the delivery mode.
    fn resend_payload(&self) -> Option<Value> {
        match self {
            MfaChannel::Device => None,
            MfaChannel::Sms { number_id } => Some(json!({
                "phoneNumber": {"id": number_id},
                "mode": "sms",
            })),
            MfaChannel::Voice { number_id } => Some(json!({
                "phoneNumber": {"id": number_id},
                "mode": "voice",
            })),
        }
    }

    fn enter_payload(&self, code: &str) -> Value {
        match self {
            MfaChannel::Device => json!({
                "securityCode": {"code": code},
            }),
            MfaChannel::Sms { number_id } => json!({
                "securityCode": {"code": code},
                "phoneNumber": {"id": number_id},
                "mode": "sms",
            }),
            MfaChannel::Voice { number_id } => json!({
                "securityCode": {"code": code},
                "phoneNumber": {"id": number_id},
                "mode": "voice",
            }),
        }
    }

    fn resend_successful(&self, status: u16) -> bool {
        match self {
            MfaChannel::Device => status == 202,
            MfaChannel::Sms { .. } | MfaChannel::Voice { .. } => status == 200,
        }
    }

    fn enter_successful(&self, status: u16) -> bool {
        match self {
            MfaChannel::Device => status == 204,
            MfaChannel::Sms { .. } | MfaChannel::Voice { .. } => status == 200,
        }
    }

    /// Checks that a resend response has the shape this channel expects and
    /// returns a human-readable confirmation. A non-conforming shape is a
    /// warning for the caller, not a fatal error.
    fn validate_resend_body(&self, body: &Value) -> Result<String, String> {
        match self {
            MfaChannel::Device => body
                .get("trustedDeviceCount")
                .and_then(Value::as_u64)
                .filter(|count| *count >= 1)
                .map(|count| format!("code sent to {count} trusted device(s)"))
                .ok_or_else(|| "no trusted device count in response".to_string()),
            MfaChannel::Sms { .. } | MfaChannel::Voice { .. } => body
                .pointer("/trustedPhoneNumber/numberWithDialCode")
                .and_then(Value::as_str)
                .map(|number| format!("code sent to {number}"))
                .ok_or_else(|| "no trusted phone number in response".to_string()),
        }
    }
}
