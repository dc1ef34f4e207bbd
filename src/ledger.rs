//! Visibility ledger
//!
//! Process-wide set of the dialog keys currently fully visible (not mid-exit).
//! Its cardinality gates one shared side effect, the host scroll lock: the
//! lock engages when the ledger goes from empty to non-empty and releases the
//! instant it empties again. The hook runs outside the ledger's lock.

use crate::types::DialogKey;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type ScrollHook = Arc<dyn Fn(bool) + Send + Sync>;

/// Shared handle to the set of visible dialog keys
#[derive(Clone, Default)]
pub struct VisibilityLedger {
    inner: Arc<Mutex<LedgerState>>,
}

#[derive(Default)]
struct LedgerState {
    visible: HashSet<DialogKey>,
    hook: Option<ScrollHook>,
}

impl VisibilityLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the scroll-lock hook invoked on empty/non-empty transitions.
    pub fn set_hook(&self, hook: impl Fn(bool) + Send + Sync + 'static) {
        self.lock().hook = Some(Arc::new(hook));
    }

    /// Record a key as visible. Engages the scroll lock on the transition
    /// from empty to non-empty.
    pub fn insert(&self, key: DialogKey) {
        let mut state = self.lock();
        let was_empty = state.visible.is_empty();
        let inserted = state.visible.insert(key);
        let hook = if was_empty && inserted {
            state.hook.clone()
        } else {
            None
        };
        drop(state);

        if let Some(hook) = hook {
            hook(true);
        }
    }

    /// Remove a key. Releases the scroll lock the instant the set empties.
    /// Removing an absent key is a no-op.
    pub fn remove(&self, key: &DialogKey) {
        let mut state = self.lock();
        let removed = state.visible.remove(key);
        let hook = if removed && state.visible.is_empty() {
            state.hook.clone()
        } else {
            None
        };
        drop(state);

        if let Some(hook) = hook {
            hook(false);
        }
    }

    pub fn contains(&self, key: &DialogKey) -> bool {
        self.lock().visible.contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().visible.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().visible.is_empty()
    }

    /// Drop the installed hook, if any.
    pub(crate) fn clear_hook(&self) {
        self.lock().hook = None;
    }

    /// Clear all entries, releasing the scroll lock if it was engaged.
    /// Intended for test isolation and full-context resets.
    pub fn reset(&self) {
        let mut state = self.lock();
        let hook = if state.visible.is_empty() {
            None
        } else {
            state.hook.clone()
        };
        state.visible.clear();
        drop(state);

        if let Some(hook) = hook {
            hook(false);
        }
    }
}
