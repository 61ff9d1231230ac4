//! Role and status enums shared between the client and the marketplace API.

use serde::{Deserialize, Serialize};

/// Role carried in the access token's claims.
///
/// The API issues upper-case role names; anything the client does not know
/// about deserializes to [`UserRole::Unknown`] instead of failing the decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    #[default]
    Customer,
    Vendor,
    Admin,
    Super,
    #[serde(other)]
    Unknown,
}

impl UserRole {
    /// Roles allowed into the vendor area.
    #[must_use]
    pub const fn can_access_vendor_area(self) -> bool {
        matches!(self, Self::Vendor | Self::Admin | Self::Super)
    }

    /// Roles allowed into the admin review console.
    #[must_use]
    pub const fn can_access_admin_area(self) -> bool {
        matches!(self, Self::Admin | Self::Super)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Customer => "CUSTOMER",
            Self::Vendor => "VENDOR",
            Self::Admin => "ADMIN",
            Self::Super => "SUPER",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Outcome of a payment verification, as reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Success,
    Failed,
    Abandoned,
    #[default]
    Pending,
    #[serde(other)]
    Unknown,
}

impl PaymentStatus {
    /// Whether the payment completed successfully.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}
