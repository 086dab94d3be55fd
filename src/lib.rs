/*
 * Arbview - Arbitrage Dashboard Client
 * Core library exports and module declarations
 */

pub mod api;
pub mod analytics;
pub mod chart;
pub mod config;
pub mod models;
pub mod service;
pub mod settings;
pub mod table;
pub mod tasks;
pub mod utils;

pub use config::Config;
pub use models::*;
pub use service::DashboardService;
