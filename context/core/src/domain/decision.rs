// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decision Domain
//!
//! Value types for multi-criteria decisions: the seven fixed criteria, the
//! weight vector that combines them, alternatives with their per-criterion
//! scores, and the decision record that receives feedback once.
//!
//! # Weight invariant
//!
//! After every adjustment the weight vector sums to 1 and each weight lies in
//! `[MIN_WEIGHT, MAX_WEIGHT]`. [`CriteriaWeights::rebalance`] enforces this
//! with a bounded water-filling pass: weights that would overflow the upper
//! bound are pinned first, then weights that would underflow the lower bound,
//! and the remaining mass is spread proportionally over the free weights.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Decision engine value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::optimization::Strategy;

pub const MIN_WEIGHT: f64 = 0.01;
pub const MAX_WEIGHT: f64 = 0.8;

const WEIGHT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Performance,
    Efficiency,
    Stability,
    UserExperience,
    ResourceConservation,
    Responsiveness,
    Reliability,
}

impl Criterion {
    pub const ALL: [Criterion; 7] = [
        Criterion::Performance,
        Criterion::Efficiency,
        Criterion::Stability,
        Criterion::UserExperience,
        Criterion::ResourceConservation,
        Criterion::Responsiveness,
        Criterion::Reliability,
    ];

    pub fn default_weight(&self) -> f64 {
        match self {
            Criterion::Performance => 0.25,
            Criterion::Efficiency => 0.20,
            Criterion::Stability => 0.15,
            Criterion::UserExperience => 0.20,
            Criterion::ResourceConservation => 0.10,
            Criterion::Responsiveness => 0.05,
            Criterion::Reliability => 0.05,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Criterion::Performance => "performance",
            Criterion::Efficiency => "efficiency",
            Criterion::Stability => "stability",
            Criterion::UserExperience => "user_experience",
            Criterion::ResourceConservation => "resource_conservation",
            Criterion::Responsiveness => "responsiveness",
            Criterion::Reliability => "reliability",
        }
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized weight per criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CriteriaWeights(BTreeMap<Criterion, f64>);

impl Default for CriteriaWeights {
    fn default() -> Self {
        let mut weights = Self(
            Criterion::ALL
                .into_iter()
                .map(|criterion| (criterion, criterion.default_weight()))
                .collect(),
        );
        weights.rebalance();
        weights
    }
}

impl CriteriaWeights {
    /// Build from arbitrary raw weights; missing criteria take their default.
    pub fn from_raw(raw: &BTreeMap<Criterion, f64>) -> Self {
        let mut weights = Self(
            Criterion::ALL
                .into_iter()
                .map(|criterion| {
                    let value = raw
                        .get(&criterion)
                        .copied()
                        .unwrap_or_else(|| criterion.default_weight());
                    (criterion, value)
                })
                .collect(),
        );
        weights.rebalance();
        weights
    }

    pub fn get(&self, criterion: Criterion) -> f64 {
        self.0.get(&criterion).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Criterion, f64)> + '_ {
        self.0.iter().map(|(criterion, weight)| (*criterion, *weight))
    }

    pub fn sum(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn as_map(&self) -> &BTreeMap<Criterion, f64> {
        &self.0
    }

    /// Shift one weight by `delta`. Call [`rebalance`](Self::rebalance) afterwards.
    pub fn nudge(&mut self, criterion: Criterion, delta: f64) {
        if let Some(weight) = self.0.get_mut(&criterion) {
            if delta.is_finite() {
                *weight += delta;
            }
        }
    }

    /// Weighted average of per-criterion scores. Missing scores count as 0.5.
    pub fn weighted_score(&self, scores: &BTreeMap<Criterion, f64>) -> f64 {
        let total: f64 = self
            .iter()
            .map(|(criterion, weight)| weight * scores.get(&criterion).copied().unwrap_or(0.5))
            .sum();
        total.clamp(0.0, 1.0)
    }

    /// Restore the sum-to-one and per-weight bound invariants.
    pub fn rebalance(&mut self) {
        let criteria: Vec<Criterion> = self.0.keys().copied().collect();
        let n = criteria.len();
        if n == 0 {
            return;
        }

        let raw: Vec<f64> = criteria
            .iter()
            .map(|criterion| {
                let w = self.0[criterion];
                if w.is_finite() && w > 0.0 {
                    w
                } else {
                    0.0
                }
            })
            .collect();

        let mut pinned: Vec<Option<f64>> = vec![None; n];

        // Upper bound first, then lower bound.
        pin_violations(&raw, &mut pinned, MAX_WEIGHT, |w| w > MAX_WEIGHT + WEIGHT_EPSILON);
        pin_violations(&raw, &mut pinned, MIN_WEIGHT, |w| w < MIN_WEIGHT - WEIGHT_EPSILON);

        let mut values = distribute(&raw, &pinned);

        // All weights pinned with residual mass: spread it over weights with headroom.
        let residual = 1.0 - values.iter().sum::<f64>();
        if residual.abs() > WEIGHT_EPSILON {
            let adjustable: Vec<usize> = (0..n)
                .filter(|&i| {
                    if residual > 0.0 {
                        values[i] < MAX_WEIGHT
                    } else {
                        values[i] > MIN_WEIGHT
                    }
                })
                .collect();
            if !adjustable.is_empty() {
                let share = residual / adjustable.len() as f64;
                for i in adjustable {
                    values[i] = (values[i] + share).clamp(MIN_WEIGHT, MAX_WEIGHT);
                }
            }
        }

        for (criterion, value) in criteria.into_iter().zip(values) {
            self.0.insert(criterion, value);
        }
    }
}

fn pin_violations(
    raw: &[f64],
    pinned: &mut [Option<f64>],
    bound: f64,
    violates: impl Fn(f64) -> bool,
) {
    loop {
        let scaled = distribute(raw, pinned);
        let mut changed = false;
        for (slot, value) in pinned.iter_mut().zip(scaled) {
            if slot.is_none() && violates(value) {
                *slot = Some(bound);
                changed = true;
            }
        }
        if !changed || pinned.iter().all(Option::is_some) {
            break;
        }
    }
}

/// Spread the mass left over by pinned weights across free weights in
/// proportion to their raw values.
fn distribute(raw: &[f64], pinned: &[Option<f64>]) -> Vec<f64> {
    let pinned_sum: f64 = pinned.iter().flatten().sum();
    let remaining = (1.0 - pinned_sum).max(0.0);
    let free_raw: f64 = raw
        .iter()
        .zip(pinned)
        .filter(|(_, p)| p.is_none())
        .map(|(w, _)| *w)
        .sum();
    let free_count = pinned.iter().filter(|p| p.is_none()).count();

    raw.iter()
        .zip(pinned)
        .map(|(w, p)| match p {
            Some(value) => *value,
            None if free_raw > 0.0 => w * remaining / free_raw,
            None => remaining / free_count.max(1) as f64,
        })
        .collect()
}

/// Five-tier confidence label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl ConfidenceTier {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceTier::VeryHigh
        } else if confidence >= 0.6 {
            ConfidenceTier::High
        } else if confidence >= 0.4 {
            ConfidenceTier::Moderate
        } else if confidence >= 0.2 {
            ConfidenceTier::Low
        } else {
            ConfidenceTier::VeryLow
        }
    }

    /// Representative numeric value for aggregation.
    pub fn score(&self) -> f64 {
        match self {
            ConfidenceTier::VeryHigh => 0.9,
            ConfidenceTier::High => 0.7,
            ConfidenceTier::Moderate => 0.5,
            ConfidenceTier::Low => 0.3,
            ConfidenceTier::VeryLow => 0.1,
        }
    }
}

/// A candidate course of action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub id: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub performance_gain: f64,
    pub resource_efficiency: f64,
    pub risk: f64,
    pub responsiveness_gain: f64,
    pub user_disruption: f64,
    /// Free-form estimates for custom evaluators
    #[serde(default)]
    pub attributes: BTreeMap<String, f64>,
}

impl Alternative {
    pub const NO_ACTION: &'static str = "no_action";

    pub fn no_action() -> Self {
        Self {
            id: Self::NO_ACTION.to_string(),
            description: "Keep current configuration".to_string(),
            strategy: None,
            performance_gain: 0.0,
            resource_efficiency: 0.5,
            risk: 0.0,
            responsiveness_gain: 0.0,
            user_disruption: 0.0,
            attributes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAlternative {
    pub alternative: Alternative,
    pub criteria_scores: BTreeMap<Criterion, f64>,
    pub overall_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(pub Uuid);

impl DecisionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DecisionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionFeedback {
    pub score: f64,
    pub outcomes: BTreeMap<String, f64>,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualDecision {
    pub id: DecisionId,
    pub decision_type: String,
    pub context_signature: String,
    pub alternatives: Vec<ScoredAlternative>,
    /// Index into `alternatives`
    pub selected: usize,
    pub overall_score: f64,
    pub confidence: f64,
    pub confidence_tier: ConfidenceTier,
    pub reasoning: Vec<String>,
    pub expected_outcomes: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    pub executed: bool,
    pub feedback: Option<DecisionFeedback>,
}

impl ContextualDecision {
    pub fn selected_alternative(&self) -> Option<&ScoredAlternative> {
        self.alternatives.get(self.selected)
    }

    pub fn is_no_action(&self) -> bool {
        self.selected_alternative()
            .map(|scored| scored.alternative.id == Alternative::NO_ACTION)
            .unwrap_or(true)
    }
}

/// Feature profile of contexts in which a decision type has been judged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionPattern {
    pub signature: String,
    pub features: Vec<f64>,
    pub success_rate: f64,
    pub occurrences: u64,
    pub best_alternative: String,
    pub last_updated: DateTime<Utc>,
}

/// Cosine similarity of two equal-length feature vectors; 0 when either is empty or zero.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
