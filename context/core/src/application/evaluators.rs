// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decision Engine Extension Points
//!
//! The decision engine never hard-codes how alternatives are produced,
//! scored or carried out. Each concern is a trait with a blanket impl for
//! plain closures:
//!
//! - [`CriterionEvaluator`]: scores one alternative against one criterion.
//! - [`AlternativeGenerator`]: produces candidates for a decision type.
//! - [`DecisionExecutor`]: carries out a selected decision.
//!
//! [`builtin_evaluators`] provides a scorer for each of the seven criteria.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Pluggable scoring, generation and execution

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::decision::{Alternative, ContextualDecision, Criterion};
use crate::domain::optimization::ContextState;
use crate::domain::snapshot::ContextSnapshot;

/// What evaluators and generators see about the current context.
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub environment: ContextSnapshot,
    pub state: ContextState,
}

impl EvaluationContext {
    pub fn new(environment: ContextSnapshot) -> Self {
        let state = ContextState::classify_context(&environment);
        Self { environment, state }
    }
}

pub trait CriterionEvaluator: Send + Sync {
    /// Score in [0,1]. Out-of-range results are clamped by the engine and
    /// non-finite ones replaced with 0.5.
    fn evaluate(&self, alternative: &Alternative, context: &EvaluationContext) -> f64;
}

impl<F> CriterionEvaluator for F
where
    F: Fn(&Alternative, &EvaluationContext) -> f64 + Send + Sync,
{
    fn evaluate(&self, alternative: &Alternative, context: &EvaluationContext) -> f64 {
        self(alternative, context)
    }
}

pub trait AlternativeGenerator: Send + Sync {
    fn generate(&self, context: &EvaluationContext) -> Vec<Alternative>;
}

impl<F> AlternativeGenerator for F
where
    F: Fn(&EvaluationContext) -> Vec<Alternative> + Send + Sync,
{
    fn generate(&self, context: &EvaluationContext) -> Vec<Alternative> {
        self(context)
    }
}

pub trait DecisionExecutor: Send + Sync {
    /// `Ok(true)` means the decision took effect.
    fn execute(&self, decision: &ContextualDecision) -> anyhow::Result<bool>;
}

impl<F> DecisionExecutor for F
where
    F: Fn(&ContextualDecision) -> anyhow::Result<bool> + Send + Sync,
{
    fn execute(&self, decision: &ContextualDecision) -> anyhow::Result<bool> {
        self(decision)
    }
}

/// Default scorer for one criterion.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinEvaluator {
    criterion: Criterion,
}

impl BuiltinEvaluator {
    pub fn new(criterion: Criterion) -> Self {
        Self { criterion }
    }
}

impl CriterionEvaluator for BuiltinEvaluator {
    fn evaluate(&self, alternative: &Alternative, context: &EvaluationContext) -> f64 {
        let environment = &context.environment;
        match self.criterion {
            Criterion::Performance => alternative.performance_gain,
            Criterion::Efficiency => alternative.resource_efficiency,
            Criterion::Stability => {
                environment.health.goodness() * (1.0 - alternative.risk * 0.5)
            }
            Criterion::UserExperience => {
                0.5 + alternative.responsiveness_gain - alternative.user_disruption
            }
            Criterion::ResourceConservation => {
                let pressure = environment.resource_pressure.overall;
                1.0 - (1.0 - alternative.resource_efficiency) * (0.5 + 0.5 * pressure)
            }
            Criterion::Responsiveness => alternative.responsiveness_gain,
            Criterion::Reliability => 1.0 - alternative.risk,
        }
    }
}

pub fn builtin_evaluators() -> BTreeMap<Criterion, Arc<dyn CriterionEvaluator>> {
    Criterion::ALL
        .into_iter()
        .map(|criterion| {
            let evaluator: Arc<dyn CriterionEvaluator> = Arc::new(BuiltinEvaluator::new(criterion));
            (criterion, evaluator)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{HealthStatus, ResourceMetrics, SystemSnapshot};
    use chrono::Utc;

    fn context(cpu: f64, memory: f64) -> EvaluationContext {
        let metrics = ResourceMetrics {
            cpu_percent: Some(cpu),
            memory_percent: Some(memory),
            ..Default::default()
        };
        let snapshot = SystemSnapshot::new(Utc::now(), metrics, vec![], 4);
        EvaluationContext::new(ContextSnapshot::from_snapshot(&snapshot, vec![], 0))
    }

    fn alternative() -> Alternative {
        Alternative {
            id: "test".to_string(),
            description: "test".to_string(),
            strategy: None,
            performance_gain: 0.6,
            resource_efficiency: 0.4,
            risk: 0.5,
            responsiveness_gain: 0.7,
            user_disruption: 0.3,
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn test_builtin_scores() {
        let ctx = context(10.0, 20.0);
        assert_eq!(ctx.environment.health, HealthStatus::Excellent);
        assert_eq!(ctx.state, ContextState::Idle);
        let alt = alternative();
        let score = |criterion| BuiltinEvaluator::new(criterion).evaluate(&alt, &ctx);

        assert_eq!(score(Criterion::Performance), 0.6);
        assert!((score(Criterion::Stability) - 0.75).abs() < 1e-12);
        assert!((score(Criterion::UserExperience) - 0.9).abs() < 1e-12);
        assert_eq!(score(Criterion::Reliability), 0.5);

        // overall pressure = 0.4*0.1 + 0.4*0.2 = 0.12
        let expected = 1.0 - 0.6 * (0.5 + 0.5 * 0.12);
        assert!((score(Criterion::ResourceConservation) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_closures_are_evaluators() {
        let custom = |alt: &Alternative, _ctx: &EvaluationContext| alt.risk * 2.0;
        assert_eq!(custom.evaluate(&alternative(), &context(0.0, 0.0)), 1.0);
        assert_eq!(builtin_evaluators().len(), Criterion::ALL.len());
    }
}
