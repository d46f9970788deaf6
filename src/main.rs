//! chargeboard - Charging session KPI dashboard
//!
//! Serves success/failure statistics for charging sessions stored in SQLite.

mod config;
mod db;
mod sessions;
mod web;

use config::ServerConfig;
use db::{NewSession, Store};
use sessions::{Aggregator, MomentOrder};
use web::Server;

use chrono::{Duration as ChronoDuration, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("chargeboard=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting chargeboard on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let count = store.count_sessions()?;
    if count == 0 && cfg.seed_demo {
        let demo = demo_sessions(Utc::now().naive_utc());
        tracing::info!("Seeding {} demo sessions", demo.len());
        store.insert_sessions(&demo)?;
    } else {
        tracing::info!("{} sessions in store", count);
    }

    let moment_order = MomentOrder::new(&cfg.moment_order);
    tracing::info!(
        "Moment order: {}",
        moment_order.iter().collect::<Vec<_>>().join(", ")
    );
    let aggregator = Arc::new(Aggregator::new(moment_order, cfg.top_n));

    // Start web server
    let server = Server::new(cfg, store, aggregator);
    server.start().await?;

    Ok(())
}

/// A week of sessions over a handful of sites.
fn demo_sessions(now: NaiveDateTime) -> Vec<NewSession> {
    const SITES: &[&str] = &["Gare Nord", "Parking Centre", "Zone Est", "Campus", "Port"];
    const ERRORS: &[&str] = &["EV disconnected", "Isolation fault", "Authorization", "Power loss"];
    const MOMENTS: &[&str] = &["morning", "afternoon", "evening", "night"];

    (0..280)
        .map(|i: usize| {
            let site = SITES[(i * 7 + i / 5) % SITES.len()];
            let failed = (i * 13 + site.len()) % 9 < 2;
            NewSession {
                site: site.to_string(),
                state: if failed { "1" } else { "0" }.to_string(),
                error_type: failed.then(|| ERRORS[(i / 3) % ERRORS.len()].to_string()),
                moment: Some(MOMENTS[(i / 2) % MOMENTS.len()].to_string()),
                start_time: now - ChronoDuration::minutes((i * 36) as i64),
            }
        })
        .collect()
}
