//! Render host seam
//!
//! The embedding application implements `RenderHost` to give the engine the
//! few things it cannot do itself: bookkeeping for detached overlay roots
//! (used by the static gateway) and the shared scroll lock driven by the
//! visibility ledger.

/// Identifier for a detached render root mounted by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId(pub u64);

impl std::fmt::Display for RootId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "root-{}", self.0)
    }
}

/// Host-side services consumed by the dialog engine
pub trait RenderHost: Send + Sync {
    /// Create a detached render root for a static dialog and return its id.
    fn mount_root(&self) -> RootId;

    /// Tear down a previously mounted root. Called exactly once per root,
    /// after the owning dialog's exit completes.
    fn unmount_root(&self, root: RootId);

    /// Engage or release the host's scroll lock.
    fn set_scroll_lock(&self, locked: bool);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingHost {
        next_root: AtomicU64,
        unmounted: Mutex<Vec<RootId>>,
    }

    impl RenderHost for CountingHost {
        fn mount_root(&self) -> RootId {
            RootId(self.next_root.fetch_add(1, Ordering::SeqCst))
        }

        fn unmount_root(&self, root: RootId) {
            self.unmounted.lock().unwrap().push(root);
        }

        fn set_scroll_lock(&self, _locked: bool) {}
    }

    #[test]
    fn test_host_round_trip() {
        let host = CountingHost::default();
        let a = host.mount_root();
        let b = host.mount_root();
        assert_ne!(a, b);

        host.unmount_root(a);
        assert_eq!(*host.unmounted.lock().unwrap(), vec![a]);
        assert_eq!(a.to_string(), "root-0");
    }
}
