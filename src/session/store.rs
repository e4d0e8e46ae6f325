//! Persistent set of [`Session`] records.
//!
//! Operations mirror [`crate::task::store::TaskStore`]: create/get/update/
//! delete/list/search/cleanup, plus the two narrow mutators the scheduler
//! needs for cost accrual (`increment_messages`, `add_cost`) so that callers
//! never have to read-modify-write a whole session record by hand.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{NewSession, Session, SessionStats, SessionStatus};
use crate::store::{generate_id, PersistentStore, StoreError};

/// Errors produced by [`SessionStore`] operations.
#[derive(Debug, Error)]
pub enum SessionStoreError {
    /// Underlying persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct SessionDocument {
    sessions: Vec<Session>,
}

/// Optional filter for [`SessionStore::list`].
#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    /// Restrict to this status, if set.
    pub status: Option<SessionStatus>,
    /// Restrict to sessions with this exact `project_path`, if set.
    pub project_path: Option<String>,
    /// Maximum number of results.
    pub limit: Option<usize>,
}

/// Persistent session store backed by a single `sessions.json` document.
pub struct SessionStore {
    store: PersistentStore<SessionDocument>,
}

impl SessionStore {
    /// Open (or initialize) the session store at `path`.
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, SessionStoreError> {
        Ok(Self {
            store: PersistentStore::open(path).await?,
        })
    }

    /// Create a new session, active, zero cost and messages.
    pub async fn create(&self, new: NewSession) -> Result<Session, SessionStoreError> {
        let now = Utc::now();
        let session = Session {
            id: generate_id(),
            created_at: now,
            updated_at: now,
            model: new.model.unwrap_or_default(),
            project_path: new.project_path.unwrap_or_default(),
            status: SessionStatus::Active,
            total_cost_usd: 0.0,
            messages_count: 0,
            metadata: new.metadata.unwrap_or_default(),
        };

        let created = session.clone();
        self.store
            .with_lock(|doc| doc.sessions.push(session))
            .await?;
        Ok(created)
    }

    /// Fetch a session by id.
    pub async fn get(&self, id: &str) -> Option<Session> {
        let doc = self.store.read().await;
        doc.sessions.into_iter().find(|s| s.id == id)
    }

    /// Replace the mutable fields of a session with the result of `mutate`.
    async fn mutate<R>(
        &self,
        id: &str,
        mutate: impl FnOnce(&mut Session) -> R,
    ) -> Result<Option<R>, SessionStoreError> {
        let result = self
            .store
            .with_lock(|doc| {
                let session = doc.sessions.iter_mut().find(|s| s.id == id)?;
                let r = mutate(session);
                session.updated_at = Utc::now();
                Some(r)
            })
            .await?;
        Ok(result)
    }

    /// Update `status` and/or `metadata` for a session. Returns the updated
    /// record, or `None` if not found.
    pub async fn update_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> Result<Option<Session>, SessionStoreError> {
        let result = self
            .mutate(id, |session| {
                session.status = status;
                session.clone()
            })
            .await?;
        Ok(result)
    }

    /// Delete a session by id. Returns `true` if a record was removed.
    pub async fn delete(&self, id: &str) -> Result<bool, SessionStoreError> {
        let removed = self
            .store
            .with_lock(|doc| {
                let before = doc.sessions.len();
                doc.sessions.retain(|s| s.id != id);
                doc.sessions.len() != before
            })
            .await?;
        Ok(removed)
    }

    /// List sessions matching `filter`, ordered by `updated_at` descending.
    pub async fn list(&self, filter: SessionListFilter) -> Vec<Session> {
        let doc = self.store.read().await;
        let mut sessions: Vec<Session> = doc
            .sessions
            .into_iter()
            .filter(|s| filter.status.map_or(true, |st| s.status == st))
            .filter(|s| {
                filter
                    .project_path
                    .as_deref()
                    .map_or(true, |p| s.project_path == p)
            })
            .collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = filter.limit {
            sessions.truncate(limit);
        }
        sessions
    }

    /// Case-insensitive substring search against the session id and a
    /// JSON-serialized rendering of its metadata.
    pub async fn search(&self, query: &str, limit: Option<usize>) -> Vec<Session> {
        let needle = query.to_lowercase();
        let doc = self.store.read().await;
        let mut matches: Vec<Session> = doc
            .sessions
            .into_iter()
            .filter(|s| {
                let metadata_text = serde_json::to_string(&s.metadata).unwrap_or_default();
                s.id.to_lowercase().contains(&needle)
                    || metadata_text.to_lowercase().contains(&needle)
            })
            .collect();
        matches.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        matches
    }

    /// Purge sessions whose `updated_at` is older than `retention_days`.
    pub async fn cleanup(&self, retention_days: i64) -> Result<usize, SessionStoreError> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let deleted = self
            .store
            .with_lock(|doc| {
                let before = doc.sessions.len();
                doc.sessions.retain(|s| s.updated_at >= cutoff);
                before - doc.sessions.len()
            })
            .await?;
        Ok(deleted)
    }

    /// Increment `messages_count` by one. No-op (but still returns the
    /// current record) if the session is `archived` — message counts only
    /// grow while a session is active.
    pub async fn increment_messages(
        &self,
        id: &str,
    ) -> Result<Option<Session>, SessionStoreError> {
        let result = self
            .mutate(id, |session| {
                if session.status == SessionStatus::Active {
                    session.messages_count += 1;
                }
                session.clone()
            })
            .await?;
        Ok(result)
    }

    /// Add `delta` to `total_cost_usd`. Negative deltas are clamped so the
    /// total never goes below zero.
    pub async fn add_cost(
        &self,
        id: &str,
        delta: f64,
    ) -> Result<Option<Session>, SessionStoreError> {
        let result = self
            .mutate(id, |session| {
                session.total_cost_usd = (session.total_cost_usd + delta).max(0.0);
                session.clone()
            })
            .await?;
        Ok(result)
    }

    /// Aggregate counters across all session records.
    pub async fn get_stats(&self) -> SessionStats {
        let doc = self.store.read().await;
        let mut stats = SessionStats::default();
        for session in &doc.sessions {
            stats.total += 1;
            stats.total_cost_usd += session.total_cost_usd;
            match session.status {
                SessionStatus::Active => stats.active += 1,
                SessionStatus::Archived => stats.archived += 1,
            }
        }
        stats
    }
}
