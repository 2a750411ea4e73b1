//! Cache key builders
//!
//! # Key Patterns
//!
//! - `payment_status:{reference}` - Last provider status seen for a gateway reference
//! - `qr_monitor:{booking_id}` - Lease held by the instance polling a QR payment
//!
//! # Example
//!
//! ```
//! use derlg_cache::keys;
//!
//! assert_eq!(keys::payment_status_key("abc"), "payment_status:abc");
//! ```

/// Prefix for cached provider status snapshots
///
/// Format: `payment_status:{reference}`
pub const PAYMENT_STATUS_PREFIX: &str = "payment_status";

/// Prefix for reconciliation monitor leases
///
/// Format: `qr_monitor:{booking_id}`
pub const QR_MONITOR_PREFIX: &str = "qr_monitor";

/// Build a cache key for a provider status snapshot
pub fn payment_status_key(reference: &str) -> String {
    format!("{}:{}", PAYMENT_STATUS_PREFIX, reference)
}

/// Build the lease key of a booking's QR monitor
///
/// # Example
///
/// ```
/// use derlg_cache::keys::qr_monitor_key;
///
/// let key = qr_monitor_key("550e8400-e29b-41d4-a716-446655440000");
/// assert_eq!(key, "qr_monitor:550e8400-e29b-41d4-a716-446655440000");
/// ```
pub fn qr_monitor_key(booking_id: &str) -> String {
    format!("{}:{}", QR_MONITOR_PREFIX, booking_id)
}
