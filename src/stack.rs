//! Dialog stack
//!
//! The managed layer: dialogs are opened by registered type, deduplicated
//! per type unless opted out, tracked in insertion order, and closed through
//! the controlled-overlay contract (close intents flip the open flag, the
//! exit animation runs, and the entry is removed only on confirmed teardown).
//! The stack installs itself into its context so [`crate::current`] can
//! resolve it from anywhere, holds the popstate subscription for every
//! managed dialog, and routes render, mouse, animation-end, and tick traffic
//! to its overlays.
//!
//! Every public method snapshots what it needs under the stack lock and
//! talks to overlays only after releasing it, so overlay callbacks may
//! freely reenter the stack.

use crate::animation::{EnterAnimation, ExitAnimation};
use crate::context::DialogContext;
use crate::error::{DialogError, DialogResult};
use crate::overlay::{MaskRegion, Overlay, OverlayConfig};
use crate::props::PropsUpdate;
use crate::registry::{DialogContent, DialogRegistry};
use crate::signal::{AfterClose, Closing};
use crate::types::{DialogKey, DialogType};
use crossterm::event::{MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::Frame;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::debug;

/// Notification emitted when a managed dialog opens or finishes closing.
/// Upserts into an existing instance do not emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogEvent {
    Opened {
        key: DialogKey,
        dialog_type: DialogType,
    },
    Closed {
        key: DialogKey,
        dialog_type: DialogType,
    },
}

/// Per-open options for [`DialogStack::open`]
pub struct OpenOptions {
    props: Option<PropsUpdate>,
    multiple: bool,
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

impl OpenOptions {
    pub fn new() -> Self {
        Self {
            props: None,
            multiple: false,
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

    /// Initial props, shallow-merged over an existing instance on upsert.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = Some(PropsUpdate::from(props));
        self
    }

    /// Full-control variant of [`OpenOptions::with_props`].
    pub fn with_props_update(mut self, update: PropsUpdate) -> Self {
        self.props = Some(update);
        self
    }

    /// Allow several instances of the same type instead of upserting.
    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
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

    /// Callback fired exactly once when the instance has fully closed. On
    /// upsert the newest callback replaces the previous one.
    pub fn on_after_close(mut self, callback: impl FnOnce() + Send + 'static) -> Self {
        self.on_after_close = Some(Box::new(callback));
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

struct StackEntry {
    key: DialogKey,
    dialog_type: DialogType,
    overlay: Overlay,
    content: Arc<dyn DialogContent>,
    props: Value,
}

struct StackInner {
    entries: Vec<StackEntry>,
    event_tx: Option<mpsc::UnboundedSender<DialogEvent>>,
    nav_guard: Option<crate::nav::NavSubscription>,
}

/// The managed dialog stack. Clones share the same state.
#[derive(Clone)]
pub struct DialogStack {
    inner: Arc<Mutex<StackInner>>,
    registry: Arc<DialogRegistry>,
    ctx: Arc<DialogContext>,
}

/// Weak reference stored in the context slot, so a dropped stack does not
/// keep resolving through the global accessor.
pub(crate) struct WeakStack {
    inner: Weak<Mutex<StackInner>>,
    registry: Arc<DialogRegistry>,
}

impl WeakStack {
    pub(crate) fn upgrade(&self, ctx: Arc<DialogContext>) -> Option<DialogStack> {
        let inner = self.inner.upgrade()?;
        Some(DialogStack {
            inner,
            registry: self.registry.clone(),
            ctx,
        })
    }
}

/// Handle to one managed dialog instance
#[derive(Clone)]
pub struct DialogHandle {
    key: DialogKey,
    dialog_type: DialogType,
    overlay: Overlay,
    stack: Weak<Mutex<StackInner>>,
}

impl DialogHandle {
    pub fn key(&self) -> &DialogKey {
        &self.key
    }

    pub fn dialog_type(&self) -> &DialogType {
        &self.dialog_type
    }

    /// Whether the instance is fully visible (not exiting, not closed).
    pub fn is_open(&self) -> bool {
        self.overlay.is_visible()
    }

    pub fn z_index(&self) -> u16 {
        self.overlay.z_index()
    }

    /// Update this instance's props. No-op once the instance has closed.
    pub fn update_props(&self, update: PropsUpdate) {
        let Some(inner) = self.stack.upgrade() else {
            return;
        };
        let prev = {
            let stack = lock_inner(&inner);
            stack
                .entries
                .iter()
                .find(|e| e.key == self.key)
                .map(|e| e.props.clone())
        };
        let Some(prev) = prev else {
            return;
        };
        let next = update.apply(&prev);
        let mut stack = lock_inner(&inner);
        if let Some(entry) = stack.entries.iter_mut().find(|e| e.key == self.key) {
            entry.props = next;
        }
    }

    /// Request a close through the user-intent path, as a mask click would.
    /// Idempotent on an already-exiting instance.
    pub fn request_close(&self) {
        self.overlay.request_close();
    }

    /// Close this instance, skipping the intent round-trip. The returned
    /// signal resolves once the exit animation has completed.
    pub fn close(&self) -> AfterClose {
        let waiter = self.overlay.after_close();
        self.overlay.set_open(false);
        waiter
    }

    /// Signal resolving when this instance has fully closed, without
    /// requesting anything.
    pub fn after_close(&self) -> AfterClose {
        self.overlay.after_close()
    }
}

impl std::fmt::Debug for DialogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogHandle")
            .field("key", &self.key)
            .field("dialog_type", &self.dialog_type)
            .finish()
    }
}

impl DialogStack {
    /// Build a stack over a frozen registry and install it into the context
    /// as the one the global accessor resolves. The newest stack wins.
    pub fn new(ctx: &Arc<DialogContext>, registry: DialogRegistry) -> Self {
        let registry = Arc::new(registry);
        let inner = Arc::new(Mutex::new(StackInner {
            entries: Vec::new(),
            event_tx: None,
            nav_guard: None,
        }));

        // One popstate subscription for the whole stack; per-dialog opt-out
        // is honored at dispatch time.
        let weak = Arc::downgrade(&inner);
        let guard = ctx.nav().subscribe(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let overlays: Vec<Overlay> = {
                let stack = lock_inner(&inner);
                stack.entries.iter().map(|e| e.overlay.clone()).collect()
            };
            for overlay in overlays {
                if overlay.close_on_popstate() {
                    overlay.request_close();
                }
            }
        });
        lock_inner(&inner).nav_guard = Some(guard);

        let stack = Self {
            inner,
            registry,
            ctx: ctx.clone(),
        };
        ctx.install_stack(WeakStack {
            inner: Arc::downgrade(&stack.inner),
            registry: stack.registry.clone(),
        });
        stack
    }

    pub fn registry(&self) -> &DialogRegistry {
        &self.registry
    }

    /// Route open/closed notifications to `tx`. Replaces any previous sink.
    pub fn set_event_sender(&self, tx: mpsc::UnboundedSender<DialogEvent>) {
        self.lock().event_tx = Some(tx);
    }

    /// Open a dialog of a registered type. If an instance of the type is
    /// already in the stack and `multiple` was not requested, that instance
    /// is updated in place instead: props apply over its current ones, the
    /// after-close callback is replaced, and a mid-exit instance is brought
    /// back to visible.
    pub fn open(
        &self,
        dialog_type: impl Into<DialogType>,
        options: OpenOptions,
    ) -> DialogResult<DialogHandle> {
        let dialog_type = dialog_type.into();
        let OpenOptions {
            props,
            multiple,
            mask_closable,
            auto_destroy,
            enter_animation,
            exit_animation,
            mask_style,
            content_style,
            close_on_popstate,
            exit_fallback,
            on_after_close,
        } = options;

        if !multiple {
            let existing = {
                let stack = self.lock();
                stack
                    .entries
                    .iter()
                    .find(|e| e.dialog_type == dialog_type)
                    .map(|e| (e.key.clone(), e.overlay.clone(), e.props.clone()))
            };
            if let Some((key, overlay, prev)) = existing {
                let next = match props {
                    Some(update) => update.apply(&prev),
                    None => prev,
                };
                {
                    let mut stack = self.lock();
                    if let Some(entry) = stack.entries.iter_mut().find(|e| e.key == key) {
                        entry.props = next;
                    }
                }
                overlay.set_after_close(terminal_closure(
                    Arc::downgrade(&self.inner),
                    key.clone(),
                    dialog_type.clone(),
                    on_after_close,
                ));
                // Re-opens a mid-exit instance; a no-op when already visible.
                overlay.set_open(true);
                debug!(dialog_type = %dialog_type, key = %key, "dialog upserted");
                return Ok(DialogHandle {
                    key,
                    dialog_type,
                    overlay,
                    stack: Arc::downgrade(&self.inner),
                });
            }
        }

        let content = self
            .registry
            .get(&dialog_type)
            .ok_or_else(|| DialogError::UnregisteredType(dialog_type.clone()))?;
        let initial = props
            .map(PropsUpdate::initial)
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let z_index = self.ctx.allocate_z();

        let config = OverlayConfig {
            open: Some(true),
            mask_closable,
            auto_destroy,
            enter_animation,
            exit_animation,
            z_index,
            mask_style,
            content_style,
            close_on_popstate,
            managed_externally: true,
            exit_fallback,
        };
        let overlay = Overlay::new(self.ctx.ledger().clone(), self.ctx.nav(), config);
        let key = overlay.key();

        let weak_overlay = overlay.downgrade();
        overlay.set_on_close(move || {
            if let Some(overlay) = weak_overlay.upgrade() {
                overlay.set_open(false);
            }
        });
        overlay.set_after_close(terminal_closure(
            Arc::downgrade(&self.inner),
            key.clone(),
            dialog_type.clone(),
            on_after_close,
        ));

        let tx = {
            let mut stack = self.lock();
            stack.entries.push(StackEntry {
                key: key.clone(),
                dialog_type: dialog_type.clone(),
                overlay: overlay.clone(),
                content,
                props: initial,
            });
            stack.event_tx.clone()
        };
        if let Some(tx) = tx {
            let _ = tx.send(DialogEvent::Opened {
                key: key.clone(),
                dialog_type: dialog_type.clone(),
            });
        }
        debug!(dialog_type = %dialog_type, key = %key, z_index, "dialog opened");

        Ok(DialogHandle {
            key,
            dialog_type,
            overlay,
            stack: Arc::downgrade(&self.inner),
        })
    }

    /// Open a dialog and get a signal that resolves once it has fully
    /// closed. Upsert semantics are the same as [`DialogStack::open`], so
    /// queueing an already-open type updates it and the signal resolves with
    /// that shared instance's close.
    pub fn queue(
        &self,
        dialog_type: impl Into<DialogType>,
        options: OpenOptions,
    ) -> DialogResult<AfterClose> {
        let handle = self.open(dialog_type, options)?;
        Ok(handle.after_close())
    }

    /// Update the props of the first open dialog of `dialog_type`. A no-op
    /// when no such dialog is open.
    pub fn update_props(&self, dialog_type: impl Into<DialogType>, update: PropsUpdate) {
        let dialog_type = dialog_type.into();
        let found = {
            let stack = self.lock();
            stack
                .entries
                .iter()
                .find(|e| e.dialog_type == dialog_type)
                .map(|e| (e.key.clone(), e.props.clone()))
        };
        let Some((key, prev)) = found else {
            debug!(dialog_type = %dialog_type, "update_props: no open dialog of this type");
            return;
        };
        let next = update.apply(&prev);
        let mut stack = self.lock();
        if let Some(entry) = stack.entries.iter_mut().find(|e| e.key == key) {
            entry.props = next;
        }
    }

    /// Close every dialog of `dialog_type`, or every dialog when `None`.
    /// Closing an absent type resolves immediately. Entries leave the stack
    /// only when their exits complete.
    pub fn close(&self, dialog_type: Option<&DialogType>) -> Closing {
        let overlays: Vec<Overlay> = {
            let stack = self.lock();
            stack
                .entries
                .iter()
                .filter(|e| dialog_type.map_or(true, |t| e.dialog_type == *t))
                .map(|e| e.overlay.clone())
                .collect()
        };
        debug!(count = overlays.len(), "closing dialogs");

        let waiters: Vec<AfterClose> = overlays.iter().map(|o| o.after_close()).collect();
        for overlay in &overlays {
            overlay.set_open(false);
        }
        Closing::join(waiters)
    }

    /// Close the most recently opened dialog.
    pub fn close_top(&self) -> Closing {
        let overlay = {
            let stack = self.lock();
            stack.entries.last().map(|e| e.overlay.clone())
        };
        match overlay {
            Some(overlay) => {
                let waiter = overlay.after_close();
                overlay.set_open(false);
                Closing::join(vec![waiter])
            }
            None => Closing::idle(),
        }
    }

    /// Draw all managed dialogs, oldest first, so later dialogs paint over
    /// earlier ones. Exiting dialogs still draw until their exits complete.
    pub fn render(&self, frame: &mut Frame<'_>, area: Rect) {
        let entries: Vec<(Overlay, Arc<dyn DialogContent>, Value)> = {
            let stack = self.lock();
            stack
                .entries
                .iter()
                .map(|e| (e.overlay.clone(), e.content.clone(), e.props.clone()))
                .collect()
        };
        for (overlay, content, props) in entries {
            let size = content.desired_size(&props, area);
            overlay.render(frame, area, size, |f, rect| content.render(&props, f, rect));
        }
    }

    /// Route a mouse event to the topmost painted dialog. Presses on the
    /// content area are consumed without closing; presses on the mask
    /// request a close when the dialog allows it. Returns whether the event
    /// was consumed.
    pub fn handle_mouse(&self, event: &MouseEvent) -> bool {
        if event.kind != MouseEventKind::Down(MouseButton::Left) {
            return false;
        }
        let overlays: Vec<Overlay> = {
            let stack = self.lock();
            stack.entries.iter().map(|e| e.overlay.clone()).collect()
        };
        for overlay in overlays.iter().rev() {
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

    /// Deliver an animation-end event; each overlay matches it against its
    /// own key. Returns whether any exit completed.
    pub fn handle_animation_end(&self, target: &DialogKey) -> bool {
        let overlays: Vec<Overlay> = {
            let stack = self.lock();
            stack.entries.iter().map(|e| e.overlay.clone()).collect()
        };
        overlays.iter().any(|o| o.handle_animation_end(target))
    }

    /// Drive exit completion for all dialogs from the host's render clock.
    pub fn tick(&self, now: Instant) {
        let overlays: Vec<Overlay> = {
            let stack = self.lock();
            stack.entries.iter().map(|e| e.overlay.clone()).collect()
        };
        for overlay in overlays {
            overlay.tick(now);
        }
    }

    /// Number of dialogs in the stack, exiting ones included.
    pub fn count(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn contains(&self, dialog_type: &DialogType) -> bool {
        self.lock()
            .entries
            .iter()
            .any(|e| e.dialog_type == *dialog_type)
    }

    pub fn top_key(&self) -> Option<DialogKey> {
        self.lock().entries.last().map(|e| e.key.clone())
    }

    pub fn keys(&self) -> Vec<DialogKey> {
        self.lock().entries.iter().map(|e| e.key.clone()).collect()
    }

    pub fn types(&self) -> Vec<DialogType> {
        self.lock()
            .entries
            .iter()
            .map(|e| e.dialog_type.clone())
            .collect()
    }

    /// Current props of the instance under `key`, if it is still in the
    /// stack.
    pub fn props_of(&self, key: &DialogKey) -> Option<Value> {
        self.lock()
            .entries
            .iter()
            .find(|e| e.key == *key)
            .map(|e| e.props.clone())
    }

    fn lock(&self) -> MutexGuard<'_, StackInner> {
        lock_inner(&self.inner)
    }
}

fn lock_inner(inner: &Mutex<StackInner>) -> MutexGuard<'_, StackInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Terminal after-close wiring for a managed entry: confirmed teardown
/// removes the entry, then the closed event and the user callback fire.
fn terminal_closure(
    inner: Weak<Mutex<StackInner>>,
    key: DialogKey,
    dialog_type: DialogType,
    user: Option<Box<dyn FnOnce() + Send>>,
) -> impl FnOnce() + Send {
    move || {
        let mut tx = None;
        if let Some(inner) = inner.upgrade() {
            let mut stack = lock_inner(&inner);
            if let Some(pos) = stack.entries.iter().position(|e| e.key == key) {
                stack.entries.remove(pos);
            }
            tx = stack.event_tx.clone();
        }
        if let Some(tx) = tx {
            let _ = tx.send(DialogEvent::Closed { key, dialog_type });
        }
        if let Some(user) = user {
            user();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;
    use futures::FutureExt;
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullContent;

    impl DialogContent for NullContent {
        fn render(&self, _props: &Value, _frame: &mut Frame<'_>, _area: Rect) {}
    }

    struct CountingContent {
        draws: Arc<AtomicUsize>,
    }

    impl DialogContent for CountingContent {
        fn render(&self, _props: &Value, _frame: &mut Frame<'_>, _area: Rect) {
            self.draws.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct OrderedContent {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl DialogContent for OrderedContent {
        fn render(&self, _props: &Value, _frame: &mut Frame<'_>, _area: Rect) {
            self.log.lock().unwrap().push(self.name);
        }
    }

    fn stack_with(types: &[&str]) -> (Arc<DialogContext>, DialogStack) {
        crate::init_test_tracing();
        let ctx = DialogContext::fresh();
        let mut registry = DialogRegistry::new();
        for dialog_type in types {
            registry
                .register(*dialog_type, Arc::new(NullContent))
                .unwrap();
        }
        let stack = DialogStack::new(&ctx, registry);
        (ctx, stack)
    }

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send) {
        let count = Arc::new(AtomicUsize::new(0));
        let sink = count.clone();
        (count, move || {
            sink.fetch_add(1, Ordering::SeqCst);
        })
    }

    /// Two draw passes so every overlay is past its mount guard.
    fn paint(stack: &DialogStack) {
        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        for _ in 0..2 {
            terminal
                .draw(|frame| {
                    let area = frame.size();
                    stack.render(frame, area);
                })
                .unwrap();
        }
    }

    fn left_down(column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn finish_exits(stack: &DialogStack) {
        stack.tick(Instant::now() + Duration::from_secs(5));
    }

    #[test]
    fn test_open_tracks_instance() {
        let (ctx, stack) = stack_with(&["confirm"]);
        let handle = stack.open("confirm", OpenOptions::new()).unwrap();

        assert!(handle.is_open());
        assert_eq!(stack.count(), 1);
        assert!(stack.contains(&DialogType::new("confirm")));
        assert_eq!(stack.top_key(), Some(handle.key().clone()));
        assert_eq!(ctx.ledger().len(), 1);
    }

    #[test]
    fn test_open_unregistered_type_fails() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let err = stack.open("missing", OpenOptions::new()).unwrap_err();
        assert!(matches!(err, DialogError::UnregisteredType(t) if t.as_str() == "missing"));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_upsert_merges_props_into_single_instance() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let first = stack
            .open(
                "confirm",
                OpenOptions::new().with_props(json!({"title": "a", "count": 1})),
            )
            .unwrap();
        let second = stack
            .open(
                "confirm",
                OpenOptions::new().with_props(json!({"title": "b"})),
            )
            .unwrap();

        assert_eq!(stack.count(), 1);
        assert_eq!(first.key(), second.key());
        assert_eq!(
            stack.props_of(first.key()),
            Some(json!({"title": "b", "count": 1}))
        );
    }

    #[test]
    fn test_multiple_opt_out_allows_duplicates() {
        let (_ctx, stack) = stack_with(&["toast"]);
        let first = stack
            .open("toast", OpenOptions::new().multiple(true))
            .unwrap();
        let second = stack
            .open("toast", OpenOptions::new().multiple(true))
            .unwrap();

        assert_eq!(stack.count(), 2);
        assert_ne!(first.key(), second.key());
        assert!(second.z_index() > first.z_index());
    }

    #[test]
    fn test_upsert_replaces_close_callback() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let (first_count, first_cb) = counter();
        let (second_count, second_cb) = counter();

        stack
            .open("confirm", OpenOptions::new().on_after_close(first_cb))
            .unwrap();
        stack
            .open("confirm", OpenOptions::new().on_after_close(second_cb))
            .unwrap();

        stack.close(None);
        finish_exits(&stack);
        assert_eq!(first_count.load(Ordering::SeqCst), 0);
        assert_eq!(second_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mask_click_lifecycle_with_events() {
        let (ctx, stack) = stack_with(&["confirm"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        stack.set_event_sender(tx);
        let (closed, cb) = counter();

        let handle = stack
            .open("confirm", OpenOptions::new().on_after_close(cb))
            .unwrap();
        paint(&stack);
        assert_eq!(ctx.ledger().len(), 1);

        // Mask press: intent, flag flip, exit begins. Entry stays until the
        // exit completes.
        assert!(stack.handle_mouse(&left_down(1, 1)));
        assert!(!handle.is_open());
        assert_eq!(stack.count(), 1);
        assert!(ctx.ledger().is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        assert!(stack.handle_animation_end(handle.key()));
        assert_eq!(stack.count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let opened = rx.try_recv().unwrap();
        assert!(matches!(opened, DialogEvent::Opened { ref dialog_type, .. }
            if dialog_type.as_str() == "confirm"));
        let done = rx.try_recv().unwrap();
        assert!(matches!(done, DialogEvent::Closed { ref key, .. } if key == handle.key()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_mask_click_respects_mask_closable() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let handle = stack
            .open("confirm", OpenOptions::new().mask_closable(false))
            .unwrap();
        paint(&stack);

        // Consumed, because the dialog is modal, but no close is requested.
        assert!(stack.handle_mouse(&left_down(1, 1)));
        assert!(handle.is_open());
    }

    #[test]
    fn test_content_click_never_closes() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let handle = stack.open("confirm", OpenOptions::new()).unwrap();
        paint(&stack);

        // Default 40x10 content centered on an 80x24 screen.
        assert!(stack.handle_mouse(&left_down(40, 12)));
        assert!(handle.is_open());
    }

    #[test]
    fn test_unpainted_stack_passes_mouse_through() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        stack.open("confirm", OpenOptions::new()).unwrap();

        assert!(!stack.handle_mouse(&left_down(1, 1)));

        let moved = MouseEvent {
            kind: MouseEventKind::Moved,
            column: 1,
            row: 1,
            modifiers: KeyModifiers::NONE,
        };
        paint(&stack);
        assert!(!stack.handle_mouse(&moved));
    }

    #[test]
    fn test_queue_resolves_on_close() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let mut waiter = stack.queue("confirm", OpenOptions::new()).unwrap();
        assert!((&mut waiter).now_or_never().is_none());

        let mut closing = stack.close(Some(&DialogType::new("confirm")));
        assert!((&mut closing).now_or_never().is_none());

        finish_exits(&stack);
        assert_eq!(waiter.now_or_never(), Some(()));
        assert_eq!(closing.now_or_never(), Some(()));
        assert!(stack.is_empty());
    }

    #[test]
    fn test_queued_dialogs_present_sequentially() {
        let (_ctx, stack) = stack_with(&["first", "second"]);
        let waiter = stack.queue("first", OpenOptions::new()).unwrap();
        assert_eq!(stack.types(), vec![DialogType::new("first")]);

        stack.close(Some(&DialogType::new("first")));
        finish_exits(&stack);
        assert_eq!(waiter.now_or_never(), Some(()));
        assert!(stack.is_empty());

        // The follow-up dialog only exists once the first has fully closed.
        let second = stack.queue("second", OpenOptions::new()).unwrap();
        assert_eq!(stack.types(), vec![DialogType::new("second")]);
        drop(second);
    }

    #[test]
    fn test_queue_same_type_coalesces() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let mut first = stack
            .queue("confirm", OpenOptions::new().with_props(json!({"n": 1})))
            .unwrap();
        let mut second = stack
            .queue("confirm", OpenOptions::new().with_props(json!({"n": 2})))
            .unwrap();
        assert_eq!(stack.count(), 1);

        stack.close(None);
        assert!((&mut first).now_or_never().is_none());
        assert!((&mut second).now_or_never().is_none());

        finish_exits(&stack);
        assert_eq!(first.now_or_never(), Some(()));
        assert_eq!(second.now_or_never(), Some(()));
    }

    #[test]
    fn test_close_top_then_sweep() {
        let (_ctx, stack) = stack_with(&["first", "second"]);
        stack.open("first", OpenOptions::new()).unwrap();
        let second = stack.open("second", OpenOptions::new()).unwrap();

        let mut closing = stack.close_top();
        assert!(!second.is_open());
        assert!((&mut closing).now_or_never().is_none());

        finish_exits(&stack);
        assert_eq!(closing.now_or_never(), Some(()));
        assert_eq!(stack.types(), vec![DialogType::new("first")]);

        stack.close(None);
        finish_exits(&stack);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_close_absent_type_resolves_immediately() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        stack.open("confirm", OpenOptions::new()).unwrap();

        let closing = stack.close(Some(&DialogType::new("missing")));
        assert_eq!(closing.now_or_never(), Some(()));
        assert_eq!(stack.count(), 1);

        // Same for a props update aimed at nothing.
        stack.update_props("missing", PropsUpdate::Replace(json!({"x": 1})));
        assert_eq!(stack.count(), 1);
    }

    #[test]
    fn test_popstate_respects_opt_out() {
        let (ctx, stack) = stack_with(&["confirm", "pinned"]);
        let closing = stack.open("confirm", OpenOptions::new()).unwrap();
        let pinned = stack
            .open("pinned", OpenOptions::new().close_on_popstate(false))
            .unwrap();

        ctx.popstate();
        assert!(!closing.is_open());
        assert!(pinned.is_open());
    }

    #[test]
    fn test_upsert_while_exiting_reopens() {
        let (ctx, stack) = stack_with(&["confirm"]);
        let handle = stack.open("confirm", OpenOptions::new()).unwrap();

        let mut waiter = handle.close();
        assert!(!handle.is_open());
        assert!(ctx.ledger().is_empty());

        let reopened = stack.open("confirm", OpenOptions::new()).unwrap();
        assert_eq!(reopened.key(), handle.key());
        assert!(reopened.is_open());
        assert_eq!(ctx.ledger().len(), 1);

        // The pre-empted close's waiter stays pending until a real close.
        assert!((&mut waiter).now_or_never().is_none());
        handle.request_close();
        finish_exits(&stack);
        assert_eq!(waiter.now_or_never(), Some(()));
    }

    #[test]
    fn test_ledger_counts_visible_not_exiting() {
        let (ctx, stack) = stack_with(&["first", "second"]);
        stack.open("first", OpenOptions::new()).unwrap();
        let second = stack.open("second", OpenOptions::new()).unwrap();
        assert_eq!(ctx.ledger().len(), 2);

        second.close();
        assert_eq!(ctx.ledger().len(), 1);
        assert_eq!(stack.count(), 2);

        finish_exits(&stack);
        assert_eq!(ctx.ledger().len(), 1);
        assert_eq!(stack.count(), 1);
    }

    #[test]
    fn test_update_props_via_stack_and_handle() {
        let (_ctx, stack) = stack_with(&["confirm"]);
        let handle = stack
            .open("confirm", OpenOptions::new().with_props(json!({"n": 1})))
            .unwrap();

        stack.update_props("confirm", PropsUpdate::Merge(json!({"title": "hi"})));
        handle.update_props(PropsUpdate::compute(|prev| {
            let n = prev["n"].as_i64().unwrap_or(0);
            json!({"n": n + 1, "title": prev["title"].clone()})
        }));

        assert_eq!(
            stack.props_of(handle.key()),
            Some(json!({"n": 2, "title": "hi"}))
        );
    }

    #[test]
    fn test_render_covers_visible_and_exiting() {
        let ctx = DialogContext::fresh();
        let draws = Arc::new(AtomicUsize::new(0));
        let mut registry = DialogRegistry::new();
        registry
            .register(
                "confirm",
                Arc::new(CountingContent {
                    draws: draws.clone(),
                }),
            )
            .unwrap();
        let stack = DialogStack::new(&ctx, registry);
        let handle = stack.open("confirm", OpenOptions::new()).unwrap();

        let backend = TestBackend::new(80, 24);
        let mut terminal = Terminal::new(backend).unwrap();
        let mut draw = |stack: &DialogStack| {
            terminal
                .draw(|frame| {
                    let area = frame.size();
                    stack.render(frame, area);
                })
                .unwrap();
        };

        draw(&stack);
        assert_eq!(draws.load(Ordering::SeqCst), 0);
        draw(&stack);
        assert_eq!(draws.load(Ordering::SeqCst), 1);

        handle.close();
        draw(&stack);
        assert_eq!(draws.load(Ordering::SeqCst), 2);

        finish_exits(&stack);
        draw(&stack);
        assert_eq!(draws.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_paint_order_beyond_z_cap_follows_insertion() {
        let ctx = DialogContext::fresh();
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = DialogRegistry::new();
        for name in ["first", "second"] {
            registry
                .register(
                    name,
                    Arc::new(OrderedContent {
                        name,
                        log: log.clone(),
                    }),
                )
                .unwrap();
        }
        let stack = DialogStack::new(&ctx, registry);

        // Exhaust the z range so both opens land on the clamp.
        for _ in 0..6_000 {
            ctx.allocate_z();
        }
        let first = stack.open("first", OpenOptions::new()).unwrap();
        let second = stack.open("second", OpenOptions::new()).unwrap();
        assert_eq!(first.z_index(), 9999);
        assert_eq!(second.z_index(), 9999);

        paint(&stack);
        assert_eq!(*log.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_context_resolves_only_live_stacks() {
        let (ctx, stack) = stack_with(&["confirm"]);
        assert!(ctx.stack().is_ok());

        drop(stack);
        assert!(matches!(ctx.stack(), Err(DialogError::StackNotInstalled)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_destroy_flows_through_controller() {
        let (_ctx, stack) = stack_with(&["toast"]);
        let handle = stack
            .open(
                "toast",
                OpenOptions::new().with_auto_destroy(Duration::from_secs(1)),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!handle.is_open());
        assert_eq!(stack.count(), 1);

        finish_exits(&stack);
        assert!(stack.is_empty());
    }
}
