use std::sync::{Arc, Mutex, MutexGuard};

/// How a staged item is written on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    /// Skip rows whose id already exists.
    Insert,
    /// Overwrite rows whose id already exists.
    Upsert,
}

impl WriteMode {
    /// Conflict clause for a statement whose upsert form is `update`.
    pub(crate) fn conflict_clause(self, update: &str) -> String {
        match self {
            WriteMode::Insert => "ON CONFLICT (id) DO NOTHING".to_string(),
            WriteMode::Upsert => format!("ON CONFLICT (id) DO UPDATE SET {update}"),
        }
    }
}

/// Items waiting for the next `save`, shared by every clone of a repository.
#[derive(Debug)]
pub(crate) struct Staging<T> {
    inner: Arc<Mutex<Vec<(WriteMode, T)>>>,
}

impl<T> Clone for Staging<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Staging<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T> Staging<T> {
    fn lock_inner(&self) -> MutexGuard<'_, Vec<(WriteMode, T)>> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Staging mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    pub(crate) fn push(&self, mode: WriteMode, items: Vec<T>) {
        self.lock_inner()
            .extend(items.into_iter().map(|item| (mode, item)));
    }

    /// Drain everything staged so far.
    pub(crate) fn take(&self) -> Vec<(WriteMode, T)> {
        std::mem::take(&mut *self.lock_inner())
    }

    /// Put back items from a failed commit, ahead of anything staged since.
    pub(crate) fn restore(&self, mut items: Vec<(WriteMode, T)>) {
        let mut staged = self.lock_inner();
        items.append(&mut staged);
        *staged = items;
    }

    pub(crate) fn clear(&self) {
        self.lock_inner().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock_inner().len()
    }
}
