//! Animated modal dialog orchestration for ratatui terminal UIs.
//!
//! A stack of overlay dialogs with animated close lifecycles. Dialogs are
//! registered by type in a [`DialogRegistry`], opened through a
//! [`DialogStack`] (deduplicated per type, closed via the controlled close
//! contract, torn down only when their exit animations complete), or opened
//! ad hoc through the [`StaticDialogs`] gateway with a content component in
//! hand. A process-wide [`DialogContext`] carries the shared pieces: the
//! visibility ledger driving the host scroll lock, the navigation hub for
//! popstate-style close broadcasts, the z-index allocator, and the slot the
//! [`current`] accessor resolves the active stack from.
//!
//! The host embeds the engine by implementing [`RenderHost`], drawing the
//! stack each frame, and forwarding mouse, animation-end, and tick events.

mod animation;
mod context;
mod error;
mod gateway;
mod global;
mod host;
mod ledger;
mod lifecycle;
mod nav;
mod overlay;
mod props;
mod registry;
mod signal;
mod stack;
mod types;

pub use animation::{progress, EnterAnimation, ExitAnimation, ENTER_DURATION, EXIT_DURATION};
pub use context::DialogContext;
pub use error::{DialogError, DialogResult};
pub use gateway::{StaticDialog, StaticDialogOptions, StaticDialogs};
pub use global::current;
pub use host::{RenderHost, RootId};
pub use ledger::VisibilityLedger;
pub use lifecycle::Phase;
pub use nav::{NavHub, NavSubscription};
pub use overlay::{MaskRegion, Overlay, OverlayConfig, WeakOverlay};
pub use props::PropsUpdate;
pub use registry::{DialogContent, DialogRegistry};
pub use signal::{AfterClose, Closing};
pub use stack::{DialogEvent, DialogHandle, DialogStack, OpenOptions};
pub use types::{DialogKey, DialogType};

/// Route tracing output through the test harness, honoring `RUST_LOG`.
/// Repeat calls are no-ops.
#[cfg(test)]
pub(crate) fn init_test_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scrim=debug".into());
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
