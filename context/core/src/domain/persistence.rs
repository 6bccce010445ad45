// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Persistence Store Port
//!
//! Opaque key/value contract used to save and restore learned state. No
//! transactional guarantee is assumed.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer (port)
//! - **Purpose:** Boundary to durable storage

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError>;
}
