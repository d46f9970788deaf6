//! Configuration module for chargeboard.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;

/// Default moment vocabulary, in display order.
pub const DEFAULT_MOMENT_ORDER: &[&str] = &["morning", "afternoon", "evening", "night"];

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "chargeboard.db")
    pub db_path: String,
    /// Ordered moment vocabulary used for pivot columns and distributions
    pub moment_order: Vec<String>,
    /// Number of sites kept in the top-N tables (default: 10)
    pub top_n: usize,
    /// Insert demo sessions when the table is empty (default: false)
    pub seed_demo: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "chargeboard.db".to_string(),
            moment_order: DEFAULT_MOMENT_ORDER.iter().map(|m| m.to_string()).collect(),
            top_n: 10,
            seed_demo: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CHARGEBOARD_HTTP_PORT`: HTTP port (default: 8080)
    /// - `CHARGEBOARD_DB_PATH`: Database file path (default: "chargeboard.db")
    /// - `CHARGEBOARD_MOMENT_ORDER`: Comma-separated moment vocabulary
    /// - `CHARGEBOARD_TOP_N`: Size of the top-N site tables (default: 10)
    /// - `CHARGEBOARD_SEED_DEMO`: `1` or `true` to seed demo sessions
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port_str) = lookup("CHARGEBOARD_HTTP_PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.http_port = port;
            }
        }

        if let Some(db_path) = lookup("CHARGEBOARD_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(order) = lookup("CHARGEBOARD_MOMENT_ORDER") {
            let moments: Vec<String> = order
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if !moments.is_empty() {
                cfg.moment_order = moments;
            }
        }

        if let Some(top_n) = lookup("CHARGEBOARD_TOP_N") {
            match top_n.parse::<usize>() {
                Ok(n) if n > 0 => cfg.top_n = n,
                _ => tracing::warn!("Ignoring invalid CHARGEBOARD_TOP_N value {:?}", top_n),
            }
        }

        if let Some(seed) = lookup("CHARGEBOARD_SEED_DEMO") {
            cfg.seed_demo = matches!(seed.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        cfg
    }
}
