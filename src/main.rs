//! DerLg booking engine server
//!
//! Booking lifecycle and payment reconciliation API for rooms, tours and
//! events, backed by PostgreSQL with optional Redis.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use anyhow::Context;
use derlg_api::configure_api;
use derlg_auth::JwtService;
use derlg_cache::RedisCache;
use derlg_core::AppConfig;
use derlg_db::{
    create_pool, run_migrations, PgBookingRepository, PgInventoryRepository,
    PgPaymentAttemptRepository, PgPromoCodeStore, PgRequesterProfileRepository,
};
use derlg_services::{
    BookingService, BookingStores, GatewayRegistry, MonitorRegistry, PaymentService,
    ReconciliationPoller, ReminderTask, WebhookNotifier,
};
use std::env;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "derlg_booking={0},derlg_api={0},derlg_services={0},derlg_db={0},actix_web=info,sqlx=warn",
            log_level
        ))
    });

    let json = env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

/// Redis is optional; without it status reads skip the cache and monitor
/// leases are local only
async fn connect_cache(config: &AppConfig) -> Option<Arc<RedisCache>> {
    let url = config.redis.url.as_deref().filter(|u| !u.trim().is_empty())?;

    match RedisCache::new(url).await {
        Ok(cache) => match cache.ping().await {
            Ok(()) => {
                info!("Redis cache connected");
                Some(Arc::new(cache))
            }
            Err(e) => {
                warn!("Redis ping failed, running without cache: {}", e);
                None
            }
        },
        Err(e) => {
            warn!("Redis unavailable, running without cache: {}", e);
            None
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!("Starting DerLg booking engine v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load().context("Failed to load configuration")?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database)
        .await
        .context("Failed to create database pool")?;
    info!(
        "Database connection established with {} max connections",
        config.database.max_connections
    );

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
    }

    let cache = connect_cache(&config).await;

    let stores = BookingStores {
        inventory: Arc::new(PgInventoryRepository::new(pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(pool.clone())),
        attempts: Arc::new(PgPaymentAttemptRepository::new(pool.clone())),
        profiles: Arc::new(PgRequesterProfileRepository::new(pool.clone())),
        promos: Arc::new(PgPromoCodeStore::new(pool.clone())),
    };

    let notifier = WebhookNotifier::from_config(&config.notifications)
        .context("Failed to configure notifications")?;
    let gateways = GatewayRegistry::from_config(&config.gateways)
        .context("Failed to configure payment gateways")?;

    let bookings = Arc::new(BookingService::new(
        stores,
        &config,
        notifier,
        MonitorRegistry::new(),
    ));
    let payments = Arc::new(PaymentService::new(
        bookings.clone(),
        gateways.clone(),
        cache.clone(),
        config.redis.status_ttl_secs,
    ));
    let poller = Arc::new(ReconciliationPoller::new(
        bookings.clone(),
        gateways,
        cache,
        config.reconciliation.clone(),
        config.redis.monitor_lease_secs,
    ));

    let background = CancellationToken::new();
    let reminders = ReminderTask::from_config(bookings.clone(), &config.booking)
        .map(|task| task.spawn(background.child_token()));

    let jwt_expiration_secs = config.auth.jwt_expiration_minutes * 60;
    let jwt_service = Arc::new(JwtService::new(&config.auth.jwt_secret, jwt_expiration_secs));
    info!(
        "JWT service configured with {} second token expiration",
        jwt_expiration_secs
    );

    let bind_addr = config.server_addr();
    let workers = config.server.workers;
    let cors_origins = config.server.cors_origins.clone();

    info!(
        "Starting HTTP server on {} with {} workers",
        bind_addr, workers
    );

    HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                let origins: Vec<&str> = cors_origins_inner.split(',').collect();
                if let Ok(origin_str) = origin.to_str() {
                    origins.iter().any(|o| o.trim() == origin_str)
                } else {
                    false
                }
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(bookings.clone()))
            .app_data(web::Data::new(payments.clone()))
            .app_data(web::Data::new(poller.clone()))
            // Middleware
            .wrap(cors)
            .wrap(middleware::Logger::new("%a \"%r\" %s %b %Dms"))
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(middleware::NormalizePath::trim())
            .service(web::scope("/api/v1").configure(configure_api))
            // Root redirect to health
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await?;

    background.cancel();
    if let Some(handle) = reminders {
        if let Err(e) = handle.await {
            warn!("Reminder task ended abnormally: {}", e);
        }
    }

    Ok(())
}
