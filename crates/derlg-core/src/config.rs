//! Application configuration
//!
//! This module provides centralized configuration management using the `config` crate.
//! Configuration can be loaded from environment variables and config files.

use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub payment_options: PaymentOptionsConfig,
    #[serde(default)]
    pub booking: BookingConfig,
    #[serde(default)]
    pub refund: RefundConfig,
    #[serde(default)]
    pub gateways: GatewaysConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

/// HTTP server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Number of worker threads
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Comma-separated allowed CORS origins
    #[serde(default = "default_cors_origins")]
    pub cors_origins: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_cors_origins() -> String {
    "http://localhost:3000,http://localhost:5173".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            cors_origins: default_cors_origins(),
        }
    }
}

/// Database configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,

    /// Apply embedded migrations at boot
    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    2
}

fn default_acquire_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Redis configuration; the cache is disabled when `url` is absent
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RedisConfig {
    pub url: Option<String>,

    /// TTL of cached provider status snapshots
    #[serde(default = "default_status_ttl")]
    pub status_ttl_secs: u64,

    /// TTL of the per-booking QR monitor lease
    #[serde(default = "default_monitor_lease")]
    pub monitor_lease_secs: u64,
}

fn default_status_ttl() -> u64 {
    5
}

fn default_monitor_lease() -> u64 {
    900
}

/// Authentication configuration
#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// JWT signing secret shared with the identity service
    pub jwt_secret: String,

    /// JWT token expiration in minutes
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_minutes: i64,
}

fn default_jwt_expiration() -> i64 {
    1440 // 24 hours
}

/// Price calculation policy
#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    #[serde(default = "default_tax_rate")]
    pub tax_rate_percent: Decimal,

    #[serde(default = "default_student_discount")]
    pub student_discount_percent: Decimal,

    /// Lifetime student discounts per account
    #[serde(default = "default_student_uses")]
    pub student_discount_max_uses: i32,
}

fn default_tax_rate() -> Decimal {
    Decimal::new(10, 0)
}

fn default_student_discount() -> Decimal {
    Decimal::new(10, 0)
}

fn default_student_uses() -> i32 {
    3
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_percent: default_tax_rate(),
            student_discount_percent: default_student_discount(),
            student_discount_max_uses: default_student_uses(),
        }
    }
}

/// Deposit / milestone / full payment policy
#[derive(Debug, Deserialize, Clone)]
pub struct PaymentOptionsConfig {
    #[serde(default = "default_deposit")]
    pub default_deposit_percent: Decimal,

    #[serde(default = "default_min_deposit")]
    pub min_deposit_percent: Decimal,

    #[serde(default = "default_max_deposit")]
    pub max_deposit_percent: Decimal,

    #[serde(default = "default_full_discount")]
    pub full_payment_discount_percent: Decimal,

    /// Days before check-in the second milestone falls due
    #[serde(default = "default_milestone_offset")]
    pub milestone_second_due_days_before_checkin: i64,

    #[serde(default = "default_bonus_services")]
    pub full_payment_bonus_services: Vec<String>,
}

fn default_deposit() -> Decimal {
    Decimal::new(60, 0)
}

fn default_min_deposit() -> Decimal {
    Decimal::new(50, 0)
}

fn default_max_deposit() -> Decimal {
    Decimal::new(70, 0)
}

fn default_full_discount() -> Decimal {
    Decimal::new(5, 0)
}

fn default_milestone_offset() -> i64 {
    7
}

fn default_bonus_services() -> Vec<String> {
    vec![
        "Free airport pickup".to_string(),
        "Priority check-in".to_string(),
        "Complimentary welcome drink".to_string(),
    ]
}

impl Default for PaymentOptionsConfig {
    fn default() -> Self {
        Self {
            default_deposit_percent: default_deposit(),
            min_deposit_percent: default_min_deposit(),
            max_deposit_percent: default_max_deposit(),
            full_payment_discount_percent: default_full_discount(),
            milestone_second_due_days_before_checkin: default_milestone_offset(),
            full_payment_bonus_services: default_bonus_services(),
        }
    }
}

/// Booking modification policy
#[derive(Debug, Deserialize, Clone)]
pub struct BookingConfig {
    /// Date/unit changes are refused this close to check-in
    #[serde(default = "default_modification_cutoff")]
    pub modification_cutoff_hours: i64,

    /// Remind guests of an installment falling due within this many days
    #[serde(default = "default_reminder_lead_days")]
    pub reminder_lead_days: i64,

    /// Seconds between reminder sweeps; 0 disables the sweep
    #[serde(default = "default_reminder_interval")]
    pub reminder_interval_secs: u64,
}

fn default_modification_cutoff() -> i64 {
    48
}

fn default_reminder_lead_days() -> i64 {
    7
}

fn default_reminder_interval() -> u64 {
    86_400
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            modification_cutoff_hours: default_modification_cutoff(),
            reminder_lead_days: default_reminder_lead_days(),
            reminder_interval_secs: default_reminder_interval(),
        }
    }
}

/// Tiered cancellation refund policy
#[derive(Debug, Deserialize, Clone)]
pub struct RefundConfig {
    #[serde(default = "default_full_tier_days")]
    pub full_tier_days: i64,

    #[serde(default = "default_full_tier_rate")]
    pub full_tier_rate: Decimal,

    #[serde(default = "default_partial_tier_days")]
    pub partial_tier_days: i64,

    #[serde(default = "default_partial_tier_rate")]
    pub partial_tier_rate: Decimal,

    #[serde(default = "default_late_tier_rate")]
    pub late_tier_rate: Decimal,

    /// Late-band rate for deposit bookings
    #[serde(default)]
    pub late_deposit_rate: Decimal,

    #[serde(default = "default_processing_time")]
    pub processing_time: String,
}

fn default_full_tier_days() -> i64 {
    30
}

fn default_full_tier_rate() -> Decimal {
    Decimal::new(95, 2)
}

fn default_partial_tier_days() -> i64 {
    7
}

fn default_partial_tier_rate() -> Decimal {
    Decimal::new(50, 2)
}

fn default_late_tier_rate() -> Decimal {
    Decimal::new(25, 2)
}

fn default_processing_time() -> String {
    "5-10 business days".to_string()
}

impl Default for RefundConfig {
    fn default() -> Self {
        Self {
            full_tier_days: default_full_tier_days(),
            full_tier_rate: default_full_tier_rate(),
            partial_tier_days: default_partial_tier_days(),
            partial_tier_rate: default_partial_tier_rate(),
            late_tier_rate: default_late_tier_rate(),
            late_deposit_rate: Decimal::ZERO,
            processing_time: default_processing_time(),
        }
    }
}

/// Payment gateway credentials and endpoints
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewaysConfig {
    #[serde(default)]
    pub card: CardGatewayConfig,
    #[serde(default)]
    pub wallet: WalletGatewayConfig,
    #[serde(default)]
    pub qr: QrGatewayConfig,
}

/// Card payment-intent provider
#[derive(Debug, Deserialize, Clone)]
pub struct CardGatewayConfig {
    #[serde(default = "default_card_url")]
    pub api_url: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_card_url() -> String {
    "https://api.stripe.com".to_string()
}

fn default_gateway_timeout() -> u64 {
    10
}

impl Default for CardGatewayConfig {
    fn default() -> Self {
        Self {
            api_url: default_card_url(),
            secret_key: String::new(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

/// Wallet redirect provider
#[derive(Debug, Deserialize, Clone)]
pub struct WalletGatewayConfig {
    #[serde(default = "default_wallet_url")]
    pub api_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default = "default_return_url")]
    pub return_url: String,
    #[serde(default = "default_cancel_url")]
    pub cancel_url: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_wallet_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_return_url() -> String {
    "http://localhost:3000/payment/success".to_string()
}

fn default_cancel_url() -> String {
    "http://localhost:3000/payment/cancel".to_string()
}

impl Default for WalletGatewayConfig {
    fn default() -> Self {
        Self {
            api_url: default_wallet_url(),
            client_id: String::new(),
            client_secret: String::new(),
            return_url: default_return_url(),
            cancel_url: default_cancel_url(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

/// QR push provider (KHQR)
#[derive(Debug, Deserialize, Clone)]
pub struct QrGatewayConfig {
    #[serde(default = "default_qr_url")]
    pub api_url: String,
    #[serde(default)]
    pub developer_token: String,
    #[serde(default = "default_merchant_id")]
    pub merchant_id: String,
    #[serde(default = "default_merchant_name")]
    pub merchant_name: String,
    #[serde(default = "default_merchant_city")]
    pub merchant_city: String,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_secs: u64,
}

fn default_qr_url() -> String {
    "https://api-bakong.nbc.gov.kh/v1".to_string()
}

fn default_merchant_id() -> String {
    "derlg@aclb".to_string()
}

fn default_merchant_name() -> String {
    "DerLg Tourism".to_string()
}

fn default_merchant_city() -> String {
    "Phnom Penh".to_string()
}

impl Default for QrGatewayConfig {
    fn default() -> Self {
        Self {
            api_url: default_qr_url(),
            developer_token: String::new(),
            merchant_id: default_merchant_id(),
            merchant_name: default_merchant_name(),
            merchant_city: default_merchant_city(),
            timeout_secs: default_gateway_timeout(),
        }
    }
}

/// QR reconciliation poller bounds
#[derive(Debug, Deserialize, Clone)]
pub struct ReconciliationConfig {
    #[serde(default = "default_monitor_timeout")]
    pub default_timeout_ms: u64,

    #[serde(default = "default_monitor_interval")]
    pub default_interval_ms: u64,

    /// Server-side cap on a single long-poll
    #[serde(default = "default_monitor_max_timeout")]
    pub max_timeout_ms: u64,

    #[serde(default = "default_monitor_min_interval")]
    pub min_interval_ms: u64,
}

fn default_monitor_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_monitor_interval() -> u64 {
    5_000
}

fn default_monitor_max_timeout() -> u64 {
    900_000 // 15 minutes
}

fn default_monitor_min_interval() -> u64 {
    1_000
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_monitor_timeout(),
            default_interval_ms: default_monitor_interval(),
            max_timeout_ms: default_monitor_max_timeout(),
            min_interval_ms: default_monitor_min_interval(),
        }
    }
}

/// Booking notification delivery
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// Webhook receiving booking events; log-only when absent
    pub webhook_url: Option<String>,

    #[serde(default = "default_notification_timeout")]
    pub timeout_secs: u64,
}

fn default_notification_timeout() -> u64 {
    5
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_notification_timeout(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and optional config files
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", num_cpus::get() as i64)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.jwt_expiration_minutes", 1440)?
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Load from environment variables with DERLG_ prefix
            .add_source(
                Environment::with_prefix("DERLG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("DERLG").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Get the server bind address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_policy_defaults() {
        let pricing = PricingConfig::default();
        assert_eq!(pricing.tax_rate_percent, dec!(10));
        assert_eq!(pricing.student_discount_max_uses, 3);

        let options = PaymentOptionsConfig::default();
        assert_eq!(options.default_deposit_percent, dec!(60));
        assert_eq!(options.min_deposit_percent, dec!(50));
        assert_eq!(options.max_deposit_percent, dec!(70));
        assert_eq!(options.milestone_second_due_days_before_checkin, 7);
        assert_eq!(options.full_payment_bonus_services.len(), 3);

        let refund = RefundConfig::default();
        assert_eq!(refund.full_tier_rate, dec!(0.95));
        assert_eq!(refund.late_deposit_rate, Decimal::ZERO);
    }

    #[test]
    fn test_reconciliation_defaults() {
        let rc = ReconciliationConfig::default();
        assert_eq!(rc.default_timeout_ms / rc.default_interval_ms, 60);
    }

    #[test]
    fn test_deserialize_minimal_sections() {
        let config = Config::builder()
            .set_override("database.url", "postgresql://localhost/derlg_tourism")
            .unwrap()
            .set_override("auth.jwt_secret", "secret")
            .unwrap()
            .set_override("pricing.tax_rate_percent", "12.5")
            .unwrap()
            .build()
            .unwrap();

        let app: AppConfig = config.try_deserialize().unwrap();
        assert_eq!(app.pricing.tax_rate_percent, dec!(12.5));
        assert_eq!(app.server.port, 8080);
        assert!(app.redis.url.is_none());
        assert_eq!(app.booking.modification_cutoff_hours, 48);
        assert_eq!(app.booking.reminder_lead_days, 7);
        assert!(app.database.run_migrations);
    }
}
