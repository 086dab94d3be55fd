/*
 * Profit derivation, filtering and aggregate statistics over opportunities
 */

use serde::{Deserialize, Serialize};
use crate::models::{ArbitrageOpportunity, Direction};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfitBreakdown {
    pub gross_profit: f64,
    pub net_profit: f64,
    pub direction: Direction,
}

impl ProfitBreakdown {
    #[must_use]
    pub fn derive(dex_price: f64, cex_price: f64, gas_cost: f64, total_fees: f64) -> Self {
        let gross_profit = (dex_price - cex_price).abs();
        let net_profit = gross_profit - gas_cost - total_fees;

        Self {
            gross_profit,
            net_profit,
            direction: Direction::from_prices(dex_price, cex_price),
        }
    }

    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.net_profit > 0.0
    }
}

/// Row filter applied before sorting; stats are computed over what passes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityFilter {
    pub direction: Option<Direction>,
    pub min_net_profit: Option<f64>,
}

impl OpportunityFilter {
    #[must_use]
    pub fn matches(&self, opportunity: &ArbitrageOpportunity) -> bool {
        if let Some(direction) = self.direction {
            if opportunity.direction != direction {
                return false;
            }
        }
        if let Some(threshold) = self.min_net_profit {
            if opportunity.net_profit <= threshold {
                return false;
            }
        }
        true
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.direction.is_none() && self.min_net_profit.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityStats {
    pub total_opportunities: usize,
    pub max_profit: f64,
    pub avg_profit: f64,
    pub total_potential_profit: f64,
}

impl OpportunityStats {
    /// Zeroes for an empty set rather than the NaN an average would produce.
    pub fn compute<'a, I>(opportunities: I) -> Self
    where
        I: IntoIterator<Item = &'a ArbitrageOpportunity>,
    {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut max = f64::NEG_INFINITY;

        for opp in opportunities {
            count += 1;
            sum += opp.net_profit;
            max = max.max(opp.net_profit);
        }

        if count == 0 {
            return Self::default();
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_profit = sum / count as f64;

        Self {
            total_opportunities: count,
            max_profit: max,
            avg_profit,
            total_potential_profit: sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opp(id: &str, net: f64, direction: Direction) -> ArbitrageOpportunity {
        ArbitrageOpportunity {
            id: id.to_string(),
            timestamp: "2025-09-01T00:00:00Z".to_string(),
            dex_price: 2000.0,
            cex_price: 2000.0,
            direction,
            gross_profit: net,
            gas_cost: 0.0,
            total_fees: 0.0,
            net_profit: net,
        }
    }

    #[test]
    fn breakdown_subtracts_gas_and_fees() {
        let b = ProfitBreakdown::derive(2000.0, 2015.0, 10.0, 2.0);
        assert_eq!(b.gross_profit, 15.0);
        assert_eq!(b.net_profit, 3.0);
        assert_eq!(b.direction, Direction::CexToDex);
        assert!(b.is_profitable());

        let loss = ProfitBreakdown::derive(2000.0, 2005.0, 10.0, 2.0);
        assert!(!loss.is_profitable());
    }

    #[test]
    fn stats_over_set() {
        let rows = vec![
            opp("a", 1.0, Direction::DexToCex),
            opp("b", 5.0, Direction::CexToDex),
            opp("c", 3.0, Direction::DexToCex),
        ];
        let stats = OpportunityStats::compute(&rows);

        assert_eq!(stats.total_opportunities, 3);
        assert_eq!(stats.max_profit, 5.0);
        assert_eq!(stats.total_potential_profit, 9.0);
        assert_eq!(stats.avg_profit, 3.0);
    }

    #[test]
    fn stats_of_empty_set_are_zero() {
        let stats = OpportunityStats::compute(&Vec::<ArbitrageOpportunity>::new());
        assert_eq!(stats, OpportunityStats::default());
    }

    #[test]
    fn filter_by_direction_and_threshold() {
        let filter = OpportunityFilter {
            direction: Some(Direction::DexToCex),
            min_net_profit: Some(0.5),
        };

        assert!(filter.matches(&opp("a", 1.0, Direction::DexToCex)));
        assert!(!filter.matches(&opp("b", 1.0, Direction::CexToDex)));
        assert!(!filter.matches(&opp("c", 0.5, Direction::DexToCex)));
        assert!(OpportunityFilter::default().is_empty());
    }
}
