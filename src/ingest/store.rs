// src/ingest/store.rs
use std::fmt;
use std::sync::Mutex;

use crate::ingest::types::CandidateEntity;

/// Persistence failure for a single entity. Absorbed by the pipeline: the
/// entity is not counted as imported and the message lands in the run's
/// error list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceError {
    pub entity: String,
    pub message: String,
}

impl PersistenceError {
    pub fn new(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "persist {}: {}", self.entity, self.message)
    }
}

impl std::error::Error for PersistenceError {}

/// Boundary to the platform's relational store. The pipeline only ever
/// hands over entities one at a time so a single failure cannot take the
/// batch down with it.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    async fn save(&self, entity: &CandidateEntity) -> Result<(), PersistenceError>;
}

/// In-memory store used by the binary until the platform store is wired,
/// and by tests to observe what a run persisted.
#[derive(Default)]
pub struct InMemoryStore {
    entities: Mutex<Vec<CandidateEntity>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<CandidateEntity> {
        self.entities.lock().expect("store mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entities.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl EntityStore for InMemoryStore {
    async fn save(&self, entity: &CandidateEntity) -> Result<(), PersistenceError> {
        self.entities
            .lock()
            .expect("store mutex poisoned")
            .push(entity.clone());
        Ok(())
    }
}
