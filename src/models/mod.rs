/*
 * Data models and error types shared by the dashboard client
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::utils::{deserialize_flexible_id, deserialize_flexible_time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    DexToCex,
    CexToDex,
}

impl Direction {
    /// Direction implied by the two venue prices: selling on the DEX when it quotes higher.
    #[must_use]
    pub fn from_prices(dex_price: f64, cex_price: f64) -> Self {
        if dex_price > cex_price {
            Direction::DexToCex
        } else {
            Direction::CexToDex
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Direction::DexToCex => "DEX→CEX",
            Direction::CexToDex => "CEX→DEX",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::DexToCex => write!(f, "DEX_TO_CEX"),
            Direction::CexToDex => write!(f, "CEX_TO_DEX"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = ArbviewError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().replace('-', "_").as_str() {
            "DEX_TO_CEX" => Ok(Direction::DexToCex),
            "CEX_TO_DEX" => Ok(Direction::CexToDex),
            _ => Err(ArbviewError::ConfigError(format!("Unknown direction: {s}"))),
        }
    }
}

/// A detected price discrepancy between the DEX and the CEX, as served by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArbitrageOpportunity {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    pub id: String,
    /// ISO-8601, kept as text so ordering matches what the backend sent.
    pub timestamp: String,
    #[serde(alias = "uniswapPrice")]
    pub dex_price: f64,
    #[serde(alias = "binancePrice")]
    pub cex_price: f64,
    pub direction: Direction,
    pub gross_profit: f64,
    #[serde(alias = "gasUsdt")]
    pub gas_cost: f64,
    pub total_fees: f64,
    pub net_profit: f64,
}

impl ArbitrageOpportunity {
    /// Builds a record whose profit fields are derived from prices and costs.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        timestamp: impl Into<String>,
        dex_price: f64,
        cex_price: f64,
        gas_cost: f64,
        total_fees: f64,
    ) -> Self {
        let breakdown = crate::analytics::ProfitBreakdown::derive(dex_price, cex_price, gas_cost, total_fees);

        Self {
            id: id.into(),
            timestamp: timestamp.into(),
            dex_price,
            cex_price,
            direction: breakdown.direction,
            gross_profit: breakdown.gross_profit,
            gas_cost,
            total_fees,
            net_profit: breakdown.net_profit,
        }
    }

    /// Whether gross and net profit agree with the prices and costs within `epsilon`.
    #[must_use]
    pub fn is_consistent(&self, epsilon: f64) -> bool {
        let expected = crate::analytics::ProfitBreakdown::derive(
            self.dex_price,
            self.cex_price,
            self.gas_cost,
            self.total_fees,
        );
        (expected.gross_profit - self.gross_profit).abs() <= epsilon
            && (expected.net_profit - self.net_profit).abs() <= epsilon
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.gas_cost + self.total_fees
    }
}

/// One sample of the two venue prices at an instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricePoint {
    #[serde(alias = "timestamp", alias = "time_bucket", deserialize_with = "deserialize_flexible_time")]
    pub time: DateTime<Utc>,
    #[serde(alias = "uniswapPrice", alias = "uniswap")]
    pub price_a: f64,
    #[serde(alias = "binancePrice", alias = "binance")]
    pub price_b: f64,
}

/// Outcome of a view's load: data, an empty successful result, or a failure to render.
#[derive(Debug)]
pub enum LoadState<T> {
    Loaded(T),
    Empty,
    Failed(ArbviewError),
}

impl<T> LoadState<T> {
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }

    #[must_use]
    pub fn loaded(self) -> Option<T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ArbviewError {
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Server error ({status}): {}", describe_body(.body))]
    ServerError { status: u16, body: serde_json::Value },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Task {task_id} cannot go from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: String,
        to: String,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ArbviewError {
    /// The server-provided error body, when the failure came from a response.
    #[must_use]
    pub fn server_body(&self) -> Option<&serde_json::Value> {
        match self {
            ArbviewError::ServerError { body, .. } => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ArbviewError::ServerError { status, .. } => Some(*status),
            ArbviewError::NetworkError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, ArbviewError::NetworkError(e) if e.is_timeout())
    }
}

/// Human readable message out of a backend error body.
#[must_use]
pub fn describe_body(body: &serde_json::Value) -> String {
    match body {
        serde_json::Value::Null => "empty response body".to_string(),
        serde_json::Value::String(text) => text.clone(),
        serde_json::Value::Object(map) => ["message", "error", "msg"]
            .iter()
            .find_map(|key| map.get(*key).and_then(|v| v.as_str()))
            .map_or_else(|| body.to_string(), str::to_string),
        other => other.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ArbviewError>;
