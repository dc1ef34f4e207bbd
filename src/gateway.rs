//! Static dialog gateway
//!
//! Imperative opens that bypass the registry and the stack: callers hand
//! over a content component directly and get back a handle that can close
//! it. Each static dialog mounts its own render root through the installed
//! host, lives in the context's static table, and leaves it only on
//! confirmed teardown (unmount first, then the table entry, then the
//! caller's callback).
//!
//! Static overlays are uncontrolled but externally managed: a close request
//! starts the exit immediately, and the gateway holds one popstate
//! subscription for all of them.

use crate::animation::{EnterAnimation, ExitAnimation};
use crate::context::DialogContext;
use crate::error::DialogResult;
use crate::host::RootId;
use crate::nav::NavSubscription;
use crate::overlay::{MaskRegion, Overlay, OverlayConfig};
use crate::registry::DialogContent;
use crate::signal::{AfterClose, Closing};
use crate::types::DialogKey;
use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::Frame;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Table of live static dialogs, owned by the context
#[derive(Default)]
pub(crate) struct StaticState {
    entries: HashMap<DialogKey, StaticEntry>,
    next_seq: u64,
    nav_guard: Option<NavSubscription>,
}

impl StaticState {
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.next_seq = 0;
        self.nav_guard = None;
    }
}

struct StaticEntry {
    overlay: Overlay,
    content: Arc<dyn DialogContent>,
    props: Value,
    root: RootId,
    seq: u64,
}

/// Per-open options for [`StaticDialogs::open`]
pub struct StaticDialogOptions {
    props: Value,
    z_index: Option<u16>,
    mask_closable: bool,
    auto_destroy: Option<Duration>,
    enter_animation: EnterAnimation,
    exit_animation: ExitAnimation,
    mask_style: Option<Style>,
    content_style: Option<Style>,
    close_on_popstate: bool,
    exit_fallback: Option<Duration>,
    on_after_close: Option<Box<dyn FnOnce() + Send>>,
}

impl StaticDialogOptions {
    pub fn new() -> Self {
        Self {
            props: Value::Object(serde_json::Map::new()),
            z_index: None,
            mask_closable: true,
            auto_destroy: None,
            enter_animation: EnterAnimation::default(),
            exit_animation: ExitAnimation::default(),
            mask_style: None,
            content_style: None,
            close_on_popstate: true,
            exit_fallback: None,
            on_after_close: None,
        }
    }

    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Explicit paint layer; without it the context allocator assigns one.
    pub fn with_z_index(mut self, z_index: u16) -> Self {
        self.z_index = Some(z_index);
        self
    }

    pub fn mask_closable(mut self, closable: bool) -> Self {
        self.mask_closable = closable;
        self
    }

    pub fn with_auto_destroy(mut self, after: Duration) -> Self {
        self.auto_destroy = Some(after);
        self
    }

    pub fn with_enter_animation(mut self, animation: EnterAnimation) -> Self {
        self.enter_animation = animation;
        self
    }

    pub fn with_exit_animation(mut self, animation: ExitAnimation) -> Self {
        self.exit_animation = animation;
        self
    }

    pub fn with_mask_style(mut self, style: Style) -> Self {
        self.mask_style = Some(style);
        self
    }

    pub fn with_content_style(mut self, style: Style) -> Self {
        self.content_style = Some(style);
        self
    }

    pub fn close_on_popstate(mut self, close: bool) -> Self {
        self.close_on_popstate = close;
        self
    }

    pub fn with_exit_fallback(mut self, bound: Duration) -> Self {
        self.exit_fallback = Some(bound);
        self
    }

    /// Callback fired exactly once after teardown completes.
    pub fn on_after_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_after_close = Some(Box::new(callback));
        self
    }
}

impl Default for StaticDialogOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a dialog opened through the static gateway
#[derive(Clone)]
pub struct StaticDialog {
    key: DialogKey,
    overlay: Overlay,
}

impl StaticDialog {
    pub fn key(&self) -> &DialogKey {
        &self.key
    }

    pub fn z_index(&self) -> u16 {
        self.overlay.z_index()
    }

    /// Whether the dialog is fully visible (not exiting, not closed).
    pub fn is_open(&self) -> bool {
        self.overlay.is_visible()
    }

    pub fn is_exiting(&self) -> bool {
        self.overlay.is_exiting()
    }

    pub fn is_closed(&self) -> bool {
        self.overlay.is_closed()
    }

    /// Start closing. Repeat calls while the exit runs are no-ops; the
    /// returned signal resolves once teardown has completed.
    pub fn close(&self) -> AfterClose {
        let waiter = self.overlay.after_close();
        self.overlay.request_close();
        waiter
    }

    pub fn after_close(&self) -> AfterClose {
        self.overlay.after_close()
    }
}

impl std::fmt::Debug for StaticDialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticDialog").field("key", &self.key).finish()
    }
}

/// The static gateway. All functions default to the global context; the
/// `_in` variants take an explicit one.
pub struct StaticDialogs;

impl StaticDialogs {
    /// Open a dialog with the given content on the global context.
    pub fn open(
        content: Arc<dyn DialogContent>,
        options: StaticDialogOptions,
    ) -> DialogResult<StaticDialog> {
        Self::open_in(DialogContext::global(), content, options)
    }

    /// Open a dialog with the given content. Fails when no render host is
    /// installed, since every static dialog needs its own root.
    pub fn open_in(
        ctx: &Arc<DialogContext>,
        content: Arc<dyn DialogContent>,
        options: StaticDialogOptions,
    ) -> DialogResult<StaticDialog> {
        let host = ctx.host()?;
        ensure_nav_guard(ctx);

        let root = host.mount_root();
        let z_index = options
            .z_index
            .unwrap_or_else(|| ctx.allocate_z());

        let config = OverlayConfig {
            open: None,
            mask_closable: options.mask_closable,
            auto_destroy: options.auto_destroy,
            enter_animation: options.enter_animation,
            exit_animation: options.exit_animation,
            z_index,
            mask_style: options.mask_style,
            content_style: options.content_style,
            close_on_popstate: options.close_on_popstate,
            managed_externally: true,
            exit_fallback: options.exit_fallback,
        };
        let overlay = Overlay::new(ctx.ledger().clone(), ctx.nav(), config);
        let key = overlay.key();

        let weak_ctx = Arc::downgrade(ctx);
        let teardown_key = key.clone();
        let user = options.on_after_close;
        overlay.set_after_close(move || {
            host.unmount_root(root);
            if let Some(ctx) = weak_ctx.upgrade() {
                ctx.statics().entries.remove(&teardown_key);
            }
            if let Some(user) = user {
                user();
            }
        });

        {
            let mut statics = ctx.statics();
            let seq = statics.next_seq;
            statics.next_seq += 1;
            statics.entries.insert(
                key.clone(),
                StaticEntry {
                    overlay: overlay.clone(),
                    content,
                    props: options.props,
                    root,
                    seq,
                },
            );
        }
        debug!(key = %key, z_index, "static dialog opened");

        Ok(StaticDialog { key, overlay })
    }

    /// Close the static dialog under `key`, or every static dialog when
    /// `None`, on the global context.
    pub fn close(key: Option<&DialogKey>) -> Closing {
        Self::close_in(DialogContext::global(), key)
    }

    pub fn close_in(ctx: &Arc<DialogContext>, key: Option<&DialogKey>) -> Closing {
        let overlays: Vec<Overlay> = {
            let statics = ctx.statics();
            statics
                .entries
                .iter()
                .filter(|(k, _)| key.map_or(true, |key| *k == key))
                .map(|(_, e)| e.overlay.clone())
                .collect()
        };
        let waiters: Vec<AfterClose> = overlays.iter().map(|o| o.after_close()).collect();
        for overlay in &overlays {
            overlay.request_close();
        }
        Closing::join(waiters)
    }

    /// Draw all static dialogs on the global context, oldest first.
    pub fn render(frame: &mut Frame<'_>, area: Rect) {
        Self::render_in(DialogContext::global(), frame, area);
    }

    pub fn render_in(ctx: &Arc<DialogContext>, frame: &mut Frame<'_>, area: Rect) {
        let mut entries: Vec<(u64, Overlay, Arc<dyn DialogContent>, Value)> = {
            let statics = ctx.statics();
            statics
                .entries
                .values()
                .map(|e| (e.seq, e.overlay.clone(), e.content.clone(), e.props.clone()))
                .collect()
        };
        entries.sort_by_key(|(seq, ..)| *seq);
        for (_, overlay, content, props) in entries {
            let size = content.desired_size(&props, area);
            overlay.render(frame, area, size, |f, rect| content.render(&props, f, rect));
        }
    }

    /// Route a mouse event to the topmost painted static dialog.
    pub fn handle_mouse(event: &MouseEvent) -> bool {
        Self::handle_mouse_in(DialogContext::global(), event)
    }

    pub fn handle_mouse_in(ctx: &Arc<DialogContext>, event: &MouseEvent) -> bool {
        if event.kind != MouseEventKind::Down(MouseButton::Left) {
            return false;
        }
        let mut overlays: Vec<(u64, Overlay)> = {
            let statics = ctx.statics();
            statics
                .entries
                .values()
                .map(|e| (e.seq, e.overlay.clone()))
                .collect()
        };
        overlays.sort_by_key(|(seq, _)| *seq);
        for (_, overlay) in overlays.iter().rev() {
            match overlay.mask_hit(event.column, event.row) {
                Some(MaskRegion::Content) => return true,
                Some(MaskRegion::Mask) => {
                    if overlay.mask_closable() {
                        overlay.request_close();
                    }
                    return true;
                }
                None => continue,
            }
        }
        false
    }

    /// Deliver an animation-end event to static dialogs.
    pub fn handle_animation_end(target: &DialogKey) -> bool {
        Self::handle_animation_end_in(DialogContext::global(), target)
    }

    pub fn handle_animation_end_in(ctx: &Arc<DialogContext>, target: &DialogKey) -> bool {
        let overlay = {
            let statics = ctx.statics();
            statics.entries.get(target).map(|e| e.overlay.clone())
        };
        overlay.is_some_and(|o| o.handle_animation_end(target))
    }

    /// Drive exit completion for static dialogs from the host's render
    /// clock.
    pub fn tick(now: Instant) {
        Self::tick_in(DialogContext::global(), now);
    }

    pub fn tick_in(ctx: &Arc<DialogContext>, now: Instant) {
        let overlays: Vec<Overlay> = {
            let statics = ctx.statics();
            statics.entries.values().map(|e| e.overlay.clone()).collect()
        };
        for overlay in overlays {
            overlay.tick(now);
        }
    }

    /// Number of live static dialogs, exiting ones included.
    pub fn count_in(ctx: &Arc<DialogContext>) -> usize {
        ctx.statics().entries.len()
    }
}

/// Install the gateway's popstate subscription on first use. Holds the
/// context weakly; the hub lives inside it.
fn ensure_nav_guard(ctx: &Arc<DialogContext>) {
    let installed = ctx.statics().nav_guard.is_some();
    if installed {
        return;
    }
    let weak = Arc::downgrade(ctx);
    let guard = ctx.nav().subscribe(move || {
        let Some(ctx) = weak.upgrade() else {
            return;
        };
        let overlays: Vec<Overlay> = {
            let statics = ctx.statics();
            statics.entries.values().map(|e| e.overlay.clone()).collect()
        };
        for overlay in overlays {
            if overlay.close_on_popstate() {
                overlay.request_close();
            }
        }
    });
    ctx.statics().nav_guard = Some(guard);
}
