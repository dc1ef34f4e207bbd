//! Dialog context
//!
//! Explicit process-wide state shared by the stack, the static gateway, and
//! standalone overlays: the visibility ledger, the navigation hub, the z-index
//! allocator, the installed render host, and the slot the global accessor
//! reads the current stack from. A lazily created global context serves the
//! common case; tests build isolated contexts with [`DialogContext::fresh`]
//! or wipe the global one with [`DialogContext::reset`].

use crate::error::{DialogError, DialogResult};
use crate::gateway::StaticState;
use crate::host::RenderHost;
use crate::ledger::VisibilityLedger;
use crate::nav::NavHub;
use crate::stack::{DialogStack, WeakStack};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use tracing::debug;

/// First z-index handed out, and the value the allocator resets to.
const Z_BASE: u32 = 4000;

/// Largest z-index the allocator will hand out.
const Z_CAP: u32 = 9999;

static GLOBAL: OnceLock<Arc<DialogContext>> = OnceLock::new();

/// Shared engine state. Cheap to clone via `Arc`.
pub struct DialogContext {
    ledger: VisibilityLedger,
    nav: NavHub,
    z_counter: AtomicU32,
    host: Mutex<Option<Arc<dyn RenderHost>>>,
    stack_slot: Mutex<Option<WeakStack>>,
    statics: Mutex<StaticState>,
}

impl DialogContext {
    fn new_state() -> Self {
        Self {
            ledger: VisibilityLedger::new(),
            nav: NavHub::new(),
            z_counter: AtomicU32::new(Z_BASE),
            host: Mutex::new(None),
            stack_slot: Mutex::new(None),
            statics: Mutex::new(StaticState::default()),
        }
    }

    /// The process-wide context, created on first use.
    pub fn global() -> &'static Arc<Self> {
        GLOBAL.get_or_init(|| Arc::new(Self::new_state()))
    }

    /// A context isolated from the global one, for tests and embedders
    /// running several independent dialog engines.
    pub fn fresh() -> Arc<Self> {
        Arc::new(Self::new_state())
    }

    pub fn ledger(&self) -> &VisibilityLedger {
        &self.ledger
    }

    pub fn nav(&self) -> &NavHub {
        &self.nav
    }

    /// Broadcast a navigation event to every subscribed overlay and the
    /// installed stack and gateway.
    pub fn popstate(&self) {
        self.nav.popstate();
    }

    /// Install the render host and wire the visibility ledger's scroll-lock
    /// hook to it. Replaces any previously installed host.
    pub fn install_host(&self, host: Arc<dyn RenderHost>) {
        let hooked = host.clone();
        self.ledger
            .set_hook(move |locked| hooked.set_scroll_lock(locked));
        *self.lock_host() = Some(host);
        debug!("render host installed");
    }

    pub(crate) fn host(&self) -> DialogResult<Arc<dyn RenderHost>> {
        self.lock_host().clone().ok_or(DialogError::HostNotInstalled)
    }

    /// Next paint layer. Strictly increasing until the cap, then pinned.
    pub(crate) fn allocate_z(&self) -> u16 {
        self.z_counter.fetch_add(1, Ordering::SeqCst).min(Z_CAP) as u16
    }

    /// Record the stack the global accessor should resolve to. The newest
    /// stack wins; the slot holds only a weak reference so a dropped stack
    /// does not linger.
    pub(crate) fn install_stack(&self, slot: WeakStack) {
        *self.lock_slot() = Some(slot);
        debug!("dialog stack installed");
    }

    /// Resolve the currently installed stack. Fails when none was installed
    /// or the installed one has been dropped.
    pub fn stack(self: &Arc<Self>) -> DialogResult<DialogStack> {
        self.lock_slot()
            .as_ref()
            .and_then(|slot| slot.upgrade(self.clone()))
            .ok_or(DialogError::StackNotInstalled)
    }

    pub(crate) fn statics(&self) -> MutexGuard<'_, StaticState> {
        self.statics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wipe everything back to a just-created state: ledger, z allocator,
    /// static entries, stack slot, and host. Close callbacks and teardown do
    /// not run; this is the test-isolation hammer, not a graceful shutdown.
    pub fn reset(&self) {
        self.statics().clear();
        *self.lock_slot() = None;
        *self.lock_host() = None;
        self.ledger.reset();
        self.ledger.clear_hook();
        self.z_counter.store(Z_BASE, Ordering::SeqCst);
        debug!("dialog context reset");
    }

    fn lock_host(&self) -> MutexGuard<'_, Option<Arc<dyn RenderHost>>> {
        self.host.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_slot(&self) -> MutexGuard<'_, Option<WeakStack>> {
        self.stack_slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
