use std::ops::{Deref, DerefMut};
use std::sync::MutexGuard;

use tracing::trace;

use super::memory::MemoryState;

/// Scoped handle on the store's backing state.
///
/// Acquired at the start of a store call and released on drop, including
/// when the call bails out early with an error.
pub(crate) struct StoreSession<'a> {
    guard: MutexGuard<'a, MemoryState>,
    operation: &'static str,
}

impl<'a> StoreSession<'a> {
    pub(super) fn new(guard: MutexGuard<'a, MemoryState>, operation: &'static str) -> Self {
        trace!(operation, "store session acquired");
        Self { guard, operation }
    }

    #[must_use]
    pub(crate) fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Deref for StoreSession<'_> {
    type Target = MemoryState;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for StoreSession<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for StoreSession<'_> {
    fn drop(&mut self) {
        trace!(operation = self.operation, "store session released");
    }
}
