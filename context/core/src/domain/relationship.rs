// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Relationships
//!
//! Relationships are keyed by an unordered application pair plus kind. The
//! pair is normalized on construction so `(a, b)` and `(b, a)` collide.
//!
//! Strength only ever moves up: every confirming observation takes the max of
//! the current strength and the kind's base strength plus a small per
//! observation bonus, capped at 1.0. Hierarchy links stay at their fixed
//! strength.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Relationship value types and monotonic strength updates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::snapshot::AppId;

/// Maximum evidence strings retained per relationship
pub const MAX_EVIDENCE: usize = 16;

const CONFIRMATION_BONUS: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Hierarchy,
    ResourceSharing,
    Communication,
    CoOccurrence,
}

impl RelationshipKind {
    pub fn base_strength(&self) -> f64 {
        match self {
            RelationshipKind::Hierarchy => 0.9,
            RelationshipKind::ResourceSharing => 0.6,
            RelationshipKind::Communication => 0.7,
            RelationshipKind::CoOccurrence => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Hierarchy => "hierarchy",
            RelationshipKind::ResourceSharing => "resource_sharing",
            RelationshipKind::Communication => "communication",
            RelationshipKind::CoOccurrence => "co_occurrence",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub first: AppId,
    pub second: AppId,
    pub kind: RelationshipKind,
}

impl RelationshipKey {
    pub fn new(a: AppId, b: AppId, kind: RelationshipKind) -> Self {
        if a <= b {
            Self { first: a, second: b, kind }
        } else {
            Self { first: b, second: a, kind }
        }
    }
}

impl fmt::Display for RelationshipKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}:{}", self.first, self.second, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationRelationship {
    pub key: RelationshipKey,
    pub strength: f64,
    pub evidence: Vec<String>,
    pub first_observed: DateTime<Utc>,
    pub last_observed: DateTime<Utc>,
    pub frequency: u64,
}

impl ApplicationRelationship {
    pub fn new(key: RelationshipKey, evidence: String, observed_at: DateTime<Utc>) -> Self {
        let strength = key.kind.base_strength();
        Self {
            key,
            strength,
            evidence: vec![evidence],
            first_observed: observed_at,
            last_observed: observed_at,
            frequency: 1,
        }
    }

    /// Record a confirming observation. Never lowers strength.
    pub fn confirm(&mut self, evidence: String, observed_at: DateTime<Utc>) {
        self.frequency = self.frequency.saturating_add(1);
        if observed_at > self.last_observed {
            self.last_observed = observed_at;
        }

        let candidate = match self.key.kind {
            RelationshipKind::Hierarchy => self.key.kind.base_strength(),
            kind => {
                kind.base_strength() + CONFIRMATION_BONUS * (self.frequency - 1) as f64
            }
        };
        self.strength = self.strength.max(candidate).min(1.0);

        if !self.evidence.contains(&evidence) {
            if self.evidence.len() >= MAX_EVIDENCE {
                self.evidence.remove(0);
            }
            self.evidence.push(evidence);
        }
    }
}
