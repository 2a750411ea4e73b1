//! JWT Claims structure

use chrono::{Duration, Utc};
use derlg_core::models::RequesterRole;
use serde::{Deserialize, Serialize};

/// JWT Claims
///
/// `sub` carries the opaque requester id assigned by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject (requester id)
    pub sub: String,

    /// Requester role
    #[serde(default)]
    pub role: RequesterRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Create new claims; expiration is filled in by `JwtService`
    ///
    /// # Examples
    ///
    /// ```
    /// use derlg_auth::Claims;
    /// use derlg_core::models::RequesterRole;
    ///
    /// let claims = Claims::new("user-42", RequesterRole::Customer);
    /// assert_eq!(claims.requester_id(), "user-42");
    /// ```
    pub fn new(requester_id: &str, role: RequesterRole) -> Self {
        Self {
            sub: requester_id.to_string(),
            role,
            iat: Utc::now().timestamp(),
            exp: 0,
        }
    }

    /// Create new claims with custom expiration duration
    pub fn with_expiration(requester_id: &str, role: RequesterRole, expires_in_secs: i64) -> Self {
        let now = Utc::now();
        let exp = now + Duration::seconds(expires_in_secs);

        Self {
            sub: requester_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.exp <= Utc::now().timestamp()
    }

    pub fn requester_id(&self) -> &str {
        &self.sub
    }

    /// Hotel/tour operators and platform admins
    pub fn is_operator(&self) -> bool {
        self.role.is_operator()
    }
}
