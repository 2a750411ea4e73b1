//! Payment attempt model
//!
//! One booking may accumulate many attempts (retries), but only one may be
//! non-terminal at a time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::booking::{PaymentMethod, PaymentType};
use super::inventory::Currency;

/// Terminal state of an attempt; `None` while still open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    #[default]
    None,
    Succeeded,
    Failed,
    Expired,
    /// Closed by the engine (booking cancelled while the attempt was open)
    Superseded,
}

impl fmt::Display for AttemptState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptState::None => write!(f, "none"),
            AttemptState::Succeeded => write!(f, "succeeded"),
            AttemptState::Failed => write!(f, "failed"),
            AttemptState::Expired => write!(f, "expired"),
            AttemptState::Superseded => write!(f, "superseded"),
        }
    }
}

impl AttemptState {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "none" => Some(AttemptState::None),
            "succeeded" => Some(AttemptState::Succeeded),
            "failed" => Some(AttemptState::Failed),
            "expired" => Some(AttemptState::Expired),
            "superseded" => Some(AttemptState::Superseded),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptState::None)
    }
}

/// Normalized provider-side status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    /// Created, waiting for the payer
    Pending,
    /// Card needs 3-D Secure or similar client-side step
    RequiresAction,
    /// Wallet order approved by the payer, not yet captured
    Approved,
    /// Money captured
    Succeeded,
    Failed,
    Expired,
    /// Wallet order voided
    Voided,
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderStatus::Pending => write!(f, "pending"),
            ProviderStatus::RequiresAction => write!(f, "requires_action"),
            ProviderStatus::Approved => write!(f, "approved"),
            ProviderStatus::Succeeded => write!(f, "succeeded"),
            ProviderStatus::Failed => write!(f, "failed"),
            ProviderStatus::Expired => write!(f, "expired"),
            ProviderStatus::Voided => write!(f, "voided"),
        }
    }
}

impl ProviderStatus {
    pub fn is_terminal(&self) -> bool {
        self.terminal_state().is_some()
    }

    /// Attempt state this status settles to, if terminal
    pub fn terminal_state(&self) -> Option<AttemptState> {
        match self {
            ProviderStatus::Succeeded => Some(AttemptState::Succeeded),
            ProviderStatus::Failed | ProviderStatus::Voided => Some(AttemptState::Failed),
            ProviderStatus::Expired => Some(AttemptState::Expired),
            ProviderStatus::Pending | ProviderStatus::RequiresAction | ProviderStatus::Approved => {
                None
            }
        }
    }
}

/// Payment attempt entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub id: Uuid,
    pub booking_id: Uuid,

    /// Provider-side correlation key (intent id, order id, QR md5)
    pub gateway_reference: String,

    pub provider: PaymentMethod,
    pub amount: Decimal,
    pub currency: Currency,
    pub payment_type: PaymentType,
    pub terminal_state: AttemptState,

    /// What the client needs to complete payment (client secret, approval URL, QR)
    pub client_payload: serde_json::Value,

    pub created_at: DateTime<Utc>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PaymentAttempt {
    pub fn new(
        booking_id: Uuid,
        gateway_reference: String,
        provider: PaymentMethod,
        amount: Decimal,
        currency: Currency,
        payment_type: PaymentType,
        client_payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            booking_id,
            gateway_reference,
            provider,
            amount,
            currency,
            payment_type,
            terminal_state: AttemptState::None,
            client_payload,
            created_at: Utc::now(),
            last_checked_at: None,
            settled_at: None,
        }
    }

    pub fn is_open(&self) -> bool {
        !self.terminal_state.is_terminal()
    }

    /// Close the attempt with a terminal state
    pub fn settle(&mut self, state: AttemptState) {
        let now = Utc::now();
        self.terminal_state = state;
        self.last_checked_at = Some(now);
        self.settled_at = Some(now);
    }
}
