//! Per-operation ambient context.
//!
//! A [`TaskContext`] carries the three things every asynchronous boundary in
//! the synchroniser needs to inherit: a request id, the database handle, and
//! a span pre-decorated with that id. Contexts are cheap to clone and are
//! handed to every spawned stage of the pipeline.

use granary_metadata::SqliteStore;
use std::sync::Arc;
use uuid::Uuid;

/// Ambient state for one logical operation.
#[derive(Clone)]
pub struct TaskContext {
    request_id: Uuid,
    db: Option<Arc<SqliteStore>>,
}

impl TaskContext {
    /// A fresh context with a newly generated request id and no database.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            db: None,
        }
    }

    /// Attach a database handle.
    pub fn with_database(mut self, db: Arc<SqliteStore>) -> Self {
        self.db = Some(db);
        self
    }

    /// A child context for a new logical operation: fresh request id, same
    /// database.
    pub fn child(&self) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            db: self.db.clone(),
        }
    }

    /// The request id generated when this context was created.
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// The database handle.
    ///
    /// # Panics
    ///
    /// Panics when no database was attached; reaching for a database in a
    /// context that never had one is a programming error, not a runtime
    /// condition.
    pub fn db(&self) -> &Arc<SqliteStore> {
        self.db
            .as_ref()
            .expect("no database attached to the context")
    }

    /// A span carrying this context's request id. Instrument spawned work
    /// with it so log lines stay correlated across task boundaries.
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!("task", request_id = %self.request_id)
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_is_stable_across_clones() {
        let ctx = TaskContext::new();
        assert_eq!(ctx.request_id(), ctx.clone().request_id());
    }

    #[test]
    fn children_get_fresh_request_ids() {
        let ctx = TaskContext::new();
        assert_ne!(ctx.request_id(), ctx.child().request_id());
    }

    #[test]
    #[should_panic(expected = "no database attached")]
    fn missing_database_is_a_programmer_error() {
        let ctx = TaskContext::new();
        let _ = ctx.db();
    }
}
