//! Zone references
//!
//! A zone is a partition of the remote record store with its own owner and
//! sync token. Every account has a primary zone; accounts participating in a
//! shared library additionally carry a shared zone.

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// The area a zone belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ZoneArea {
    /// The account's own library zone (always present)
    Primary,
    /// The shared library zone (optional)
    Shared,
}

impl std::fmt::Display for ZoneArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZoneArea::Primary => write!(f, "primary"),
            ZoneArea::Shared => write!(f, "shared"),
        }
    }
}

/// A queryable area of the remote record store
///
/// Acquired once per authenticated session during zone setup and attached to
/// every query/mutation issued by the protocol client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneReference {
    /// Zone name (e.g. the primary sync zone or a shared zone)
    pub zone_name: String,
    /// Zone type discriminator as reported by the backend
    pub zone_type: String,
    /// Record name of the zone owner
    pub owner_name: String,
    /// Which area this zone serves
    pub area: ZoneArea,
}

impl ZoneReference {
    /// Validates that all identifying fields are present
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.zone_name.is_empty() {
            return Err(DomainError::InvalidZone(format!(
                "{} zone name empty",
                self.area
            )));
        }
        if self.zone_type.is_empty() {
            return Err(DomainError::InvalidZone(format!(
                "{} zone type empty",
                self.area
            )));
        }
        if self.owner_name.is_empty() {
            return Err(DomainError::InvalidZone(format!(
                "{} zone owner empty",
                self.area
            )));
        }
        Ok(())
    }
}
