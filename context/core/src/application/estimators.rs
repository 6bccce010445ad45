// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Strategy Estimators
//!
//! Provides strategy impact estimation functionality for the system.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pluggable impact and risk estimates per strategy

use std::collections::BTreeMap;

use crate::domain::decision::Alternative;
use crate::domain::optimization::Strategy;
use crate::domain::snapshot::{ContextSnapshot, HealthStatus};

pub const PERFORMANCE_IMPROVEMENT: &str = "performance_improvement";
pub const RESOURCE_EFFICIENCY: &str = "resource_efficiency";
pub const RESPONSE_TIME_IMPROVEMENT: &str = "response_time_improvement";
pub const SYSTEM_STABILITY: &str = "system_stability";

/// Estimates what a strategy is expected to do.
pub trait StrategyEstimator: Send + Sync {
    /// Expected impact per outcome metric, used by the optimizer to score
    /// learned outcomes.
    fn expected_impact(&self, strategy: Strategy) -> BTreeMap<String, f64>;

    /// A decision-engine alternative for `strategy` in `context`.
    fn estimate_alternative(&self, strategy: Strategy, context: &ContextSnapshot) -> Alternative;
}

/// Fixed lookup tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticStrategyTable;

impl StaticStrategyTable {
    fn impact_row(strategy: Strategy) -> [f64; 4] {
        match strategy {
            Strategy::Aggressive => [0.4, 0.6, 0.3, 0.2],
            Strategy::Performance => [0.6, 0.2, 0.5, 0.3],
            Strategy::Efficiency => [0.2, 0.7, 0.1, 0.4],
            Strategy::Conservative => [0.1, 0.3, 0.0, 0.6],
            Strategy::Balanced => [0.3, 0.4, 0.2, 0.4],
        }
    }

    fn base_performance(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Conservative => 0.1,
            Strategy::Balanced => 0.3,
            Strategy::Performance => 0.6,
            Strategy::Efficiency => 0.4,
            Strategy::Aggressive => 0.8,
        }
    }

    fn efficiency(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Conservative => 0.9,
            Strategy::Balanced => 0.7,
            Strategy::Performance => 0.4,
            Strategy::Efficiency => 0.9,
            Strategy::Aggressive => 0.3,
        }
    }

    fn base_risk(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Conservative => 0.1,
            Strategy::Balanced => 0.3,
            Strategy::Performance => 0.5,
            Strategy::Efficiency => 0.2,
            Strategy::Aggressive => 0.8,
        }
    }

    fn responsiveness(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Conservative => 0.0,
            Strategy::Balanced => 0.2,
            Strategy::Performance => 0.7,
            Strategy::Efficiency => 0.1,
            Strategy::Aggressive => 0.5,
        }
    }

    fn disruption(strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Conservative => 0.0,
            Strategy::Balanced => 0.1,
            Strategy::Performance => 0.3,
            Strategy::Efficiency => 0.1,
            Strategy::Aggressive => 0.6,
        }
    }

    /// Degraded systems make every change riskier.
    fn health_risk_multiplier(health: HealthStatus) -> f64 {
        match health {
            HealthStatus::Excellent => 0.8,
            HealthStatus::Good => 0.9,
            HealthStatus::Fair => 1.0,
            HealthStatus::Poor => 1.3,
            HealthStatus::Critical => 1.5,
        }
    }

    fn description(strategy: Strategy) -> &'static str {
        match strategy {
            Strategy::Conservative => "Minimize changes and preserve resources",
            Strategy::Efficiency => "Trim resource usage while keeping throughput",
            Strategy::Balanced => "Balance throughput against resource usage",
            Strategy::Performance => "Favor throughput and responsiveness",
            Strategy::Aggressive => "Shed load aggressively to recover headroom",
        }
    }
}

impl StrategyEstimator for StaticStrategyTable {
    fn expected_impact(&self, strategy: Strategy) -> BTreeMap<String, f64> {
        let [performance, efficiency, response_time, stability] = Self::impact_row(strategy);
        BTreeMap::from([
            (PERFORMANCE_IMPROVEMENT.to_string(), performance),
            (RESOURCE_EFFICIENCY.to_string(), efficiency),
            (RESPONSE_TIME_IMPROVEMENT.to_string(), response_time),
            (SYSTEM_STABILITY.to_string(), stability),
        ])
    }

    fn estimate_alternative(&self, strategy: Strategy, context: &ContextSnapshot) -> Alternative {
        let cpu = context.metrics.cpu().clamp(0.0, 100.0);
        let performance_gain = (Self::base_performance(strategy) * (1.0 + cpu / 100.0)).min(1.0);
        let risk =
            (Self::base_risk(strategy) * Self::health_risk_multiplier(context.health)).min(1.0);

        Alternative {
            id: strategy.as_str().to_string(),
            description: Self::description(strategy).to_string(),
            strategy: Some(strategy),
            performance_gain,
            resource_efficiency: Self::efficiency(strategy),
            risk,
            responsiveness_gain: Self::responsiveness(strategy),
            user_disruption: Self::disruption(strategy),
            attributes: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{ResourceMetrics, SystemSnapshot};
    use chrono::Utc;

    fn context(cpu: f64, memory: f64) -> ContextSnapshot {
        let metrics = ResourceMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            ..Default::default()
        };
        let snapshot = SystemSnapshot::new(Utc::now(), metrics, vec![], 4);
        ContextSnapshot::from_snapshot(&snapshot, vec![], 0)
    }

    #[test]
    fn test_impact_table() {
        let table = StaticStrategyTable;
        let impact = table.expected_impact(Strategy::Performance);
        assert_eq!(impact[PERFORMANCE_IMPROVEMENT], 0.6);
        assert_eq!(impact[SYSTEM_STABILITY], 0.3);
        assert_eq!(table.expected_impact(Strategy::Conservative)[RESPONSE_TIME_IMPROVEMENT], 0.0);
    }

    #[test]
    fn test_performance_scales_with_cpu_and_caps() {
        let table = StaticStrategyTable;
        let quiet = table.estimate_alternative(Strategy::Balanced, &context(0.0, 10.0));
        assert!((quiet.performance_gain - 0.3).abs() < 1e-12);
        let busy = table.estimate_alternative(Strategy::Aggressive, &context(100.0, 10.0));
        assert_eq!(busy.performance_gain, 1.0);
    }

    #[test]
    fn test_risk_grows_with_degraded_health() {
        let table = StaticStrategyTable;
        let healthy = table.estimate_alternative(Strategy::Aggressive, &context(10.0, 10.0));
        let critical = table.estimate_alternative(Strategy::Aggressive, &context(95.0, 97.0));
        assert!((healthy.risk - 0.64).abs() < 1e-12);
        assert!(critical.risk > healthy.risk);
        assert!(critical.risk <= 1.0);
    }
}
