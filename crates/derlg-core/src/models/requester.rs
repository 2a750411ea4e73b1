//! Requester identity and discount profile
//!
//! Identities are issued by the session layer; the engine only sees an opaque
//! requester id, a role, and the student-discount counter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Requester role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequesterRole {
    /// Guest making bookings
    #[default]
    Customer,
    /// Hotel, tour, or event operator
    HotelAdmin,
    /// Platform administrator
    SuperAdmin,
}

impl fmt::Display for RequesterRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequesterRole::Customer => write!(f, "customer"),
            RequesterRole::HotelAdmin => write!(f, "hotel_admin"),
            RequesterRole::SuperAdmin => write!(f, "super_admin"),
        }
    }
}

impl RequesterRole {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" | "user" | "tourist" => Some(RequesterRole::Customer),
            "hotel_admin" | "operator" => Some(RequesterRole::HotelAdmin),
            "super_admin" | "admin" => Some(RequesterRole::SuperAdmin),
            _ => None,
        }
    }

    /// Check if role may act on other people's bookings
    pub fn is_operator(&self) -> bool {
        matches!(self, RequesterRole::HotelAdmin | RequesterRole::SuperAdmin)
    }
}

/// Student-discount profile of a requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequesterProfile {
    pub requester_id: String,
    pub is_student: bool,
    pub student_discount_remaining: i32,
}

impl RequesterProfile {
    /// Profile for a requester with no stored record
    pub fn anonymous(requester_id: &str) -> Self {
        Self {
            requester_id: requester_id.to_string(),
            is_student: false,
            student_discount_remaining: 0,
        }
    }

    pub fn student_discount_eligible(&self) -> bool {
        self.is_student && self.student_discount_remaining > 0
    }
}
