//! Navigation event hub
//!
//! The host forwards its back/forward-equivalent events here as a single
//! `popstate` signal. Subscribers (a dialog stack, the static gateway, or a
//! standalone overlay) receive a broadcast and decide for themselves which
//! instances to close. Dropping the subscription guard unsubscribes, so a torn
//! down component never receives stale dispatches.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Broadcast hub for host navigation (popstate) events
#[derive(Clone, Default)]
pub struct NavHub {
    inner: Arc<Mutex<HubState>>,
}

#[derive(Default)]
struct HubState {
    listeners: Vec<(u64, Listener)>,
    next_id: u64,
}

impl NavHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a listener; it stays active until the returned guard drops.
    pub fn subscribe(&self, listener: impl Fn() + Send + Sync + 'static) -> NavSubscription {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push((id, Arc::new(listener)));
        NavSubscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Broadcast one navigation event to every live listener. Listeners run
    /// after the hub's lock is released, so they may subscribe or dispatch
    /// further events.
    pub fn popstate(&self) {
        let listeners: Vec<Listener> = {
            let state = self.lock();
            state.listeners.iter().map(|(_, l)| l.clone()).collect()
        };
        for listener in listeners {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}

/// Guard keeping one hub subscription alive
pub struct NavSubscription {
    id: u64,
    hub: Weak<Mutex<HubState>>,
}

impl Drop for NavSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            let mut state = inner.lock().unwrap_or_else(PoisonError::into_inner);
            state.listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl std::fmt::Debug for NavSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavSubscription").field("id", &self.id).finish()
    }
}
