//! Overlay primitive
//!
//! One overlay instance: mask plus centered content, an enter/exit animated
//! lifecycle, an optional auto-destroy timer, and exactly one terminal
//! after-close signal. The overlay owns a [`Lifecycle`] machine and executes
//! its effects (ledger membership, timers, callbacks, waiter resolution)
//! strictly after releasing its own lock, so callbacks are free to call back
//! into the engine.
//!
//! Exit completion arrives on one of three paths, all funneled through the
//! same idempotent transition: an explicit animation-end event matched by key,
//! the render-clock `tick`, or the optional exit fallback timer.

use crate::animation::{progress, EnterAnimation, ExitAnimation};
use crate::ledger::VisibilityLedger;
use crate::lifecycle::{Effect, Input, Lifecycle, Mode, Phase};
use crate::nav::{NavHub, NavSubscription};
use crate::signal::AfterClose;
use crate::types::DialogKey;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Clear};
use ratatui::Frame;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Configuration for one overlay instance
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Controlled-mode flag. `Some` puts the overlay under external control
    /// with the given initial state; `None` is uncontrolled (starts visible).
    pub open: Option<bool>,

    /// Whether clicking the mask requests a close.
    pub mask_closable: bool,

    /// Request a close automatically after this long visible.
    pub auto_destroy: Option<Duration>,

    /// Animation played when becoming visible.
    pub enter_animation: EnterAnimation,

    /// Animation played while exiting.
    pub exit_animation: ExitAnimation,

    /// Paint layer, assigned by the owning stack or gateway.
    pub z_index: u16,

    /// Style override for the full-screen mask.
    pub mask_style: Option<Style>,

    /// Style override painted under the content area.
    pub content_style: Option<Style>,

    /// Whether a navigation (popstate) event closes this overlay.
    pub close_on_popstate: bool,

    /// Set by a stack or the static gateway when they own popstate dispatch,
    /// so the overlay does not subscribe itself.
    pub managed_externally: bool,

    /// Force-complete an exit that never sees its animation end after this
    /// bound. Off by default; when it fires the recovery is logged.
    pub exit_fallback: Option<Duration>,
}

impl OverlayConfig {
    pub fn new() -> Self {
        Self {
            open: None,
            mask_closable: true,
            auto_destroy: None,
            enter_animation: EnterAnimation::default(),
            exit_animation: ExitAnimation::default(),
            z_index: 4000,
            mask_style: None,
            content_style: None,
            close_on_popstate: true,
            managed_externally: false,
            exit_fallback: None,
        }
    }

    pub fn with_open(mut self, open: bool) -> Self {
        self.open = Some(open);
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

    pub fn with_z_index(mut self, z_index: u16) -> Self {
        self.z_index = z_index;
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

    pub fn managed_externally(mut self, managed: bool) -> Self {
        self.managed_externally = managed;
        self
    }

    pub fn with_exit_fallback(mut self, bound: Duration) -> Self {
        self.exit_fallback = Some(bound);
        self
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a mouse press landed relative to an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRegion {
    /// Inside the content rect; clicks here never close the dialog.
    Content,
    /// On the mask around the content.
    Mask,
}

/// Shared handle to one overlay instance
#[derive(Clone)]
pub struct Overlay {
    inner: Arc<Mutex<OverlayInner>>,
}

/// Non-owning overlay handle, for callbacks that must not keep their own
/// instance alive.
#[derive(Clone)]
pub struct WeakOverlay {
    inner: Weak<Mutex<OverlayInner>>,
}

impl WeakOverlay {
    pub fn upgrade(&self) -> Option<Overlay> {
        self.inner.upgrade().map(|inner| Overlay { inner })
    }
}

struct OverlayInner {
    key: DialogKey,
    config: OverlayConfig,
    lifecycle: Lifecycle,

    /// Render-readiness guard; the first render pass only registers the
    /// mount and draws nothing.
    mounted: bool,

    exit_started: Option<Instant>,
    content_rect: Option<Rect>,

    on_close: Option<Arc<dyn Fn() + Send + Sync>>,
    on_after_close: Option<Box<dyn FnOnce() + Send>>,
    waiters: Vec<oneshot::Sender<()>>,

    /// Generation counters invalidating stale timer tasks.
    auto_generation: u64,
    fallback_generation: u64,

    ledger: VisibilityLedger,
    nav_subscription: Option<NavSubscription>,
}

/// A concrete deferred action extracted from a lifecycle effect under the
/// overlay lock and executed after it is released.
enum Action {
    Ledger(DialogKey, bool),
    ArmAutoDestroy(Duration, u64),
    ArmFallback(Duration, u64),
    Intent(Arc<dyn Fn() + Send + Sync>),
    Terminal {
        key: DialogKey,
        callback: Option<Box<dyn FnOnce() + Send>>,
        waiters: Vec<oneshot::Sender<()>>,
    },
    Abandon(Vec<oneshot::Sender<()>>),
}

impl Overlay {
    /// Create an overlay. Registers with the visibility ledger immediately if
    /// it starts visible, and subscribes to popstate unless managed
    /// externally or opted out.
    pub fn new(ledger: VisibilityLedger, nav: &NavHub, config: OverlayConfig) -> Self {
        let key = DialogKey::generate();
        let mode = match config.open {
            Some(open) => Mode::Controlled { open },
            None => Mode::Uncontrolled,
        };
        let (lifecycle, effects) = Lifecycle::new(mode);
        let self_popstate = config.close_on_popstate && !config.managed_externally;

        let inner = Arc::new(Mutex::new(OverlayInner {
            key: key.clone(),
            config,
            lifecycle,
            mounted: false,
            exit_started: None,
            content_rect: None,
            on_close: None,
            on_after_close: None,
            waiters: Vec::new(),
            auto_generation: 0,
            fallback_generation: 0,
            ledger,
            nav_subscription: None,
        }));
        let overlay = Self { inner };

        if self_popstate {
            let weak = Arc::downgrade(&overlay.inner);
            let subscription = nav.subscribe(move || {
                if let Some(inner) = weak.upgrade() {
                    Overlay { inner }.request_close();
                }
            });
            overlay.lock().nav_subscription = Some(subscription);
        }

        debug!(key = %key, controlled = matches!(mode, Mode::Controlled { .. }), "overlay created");
        overlay.execute_effects(effects);
        overlay
    }

    fn lock(&self) -> MutexGuard<'_, OverlayInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Instance key, generated at construction.
    pub fn key(&self) -> DialogKey {
        self.lock().key.clone()
    }

    pub fn phase(&self) -> Phase {
        self.lock().lifecycle.phase()
    }

    pub fn is_controlled(&self) -> bool {
        self.lock().lifecycle.is_controlled()
    }

    pub fn is_visible(&self) -> bool {
        self.phase() == Phase::Visible
    }

    pub fn is_exiting(&self) -> bool {
        self.phase() == Phase::Exiting
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    pub fn z_index(&self) -> u16 {
        self.lock().config.z_index
    }

    pub fn mask_closable(&self) -> bool {
        self.lock().config.mask_closable
    }

    pub fn close_on_popstate(&self) -> bool {
        self.lock().config.close_on_popstate
    }

    pub fn downgrade(&self) -> WeakOverlay {
        WeakOverlay {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Install the close-intent callback (controlled mode): invoked when a
    /// user-intent close needs the controller to flip the open flag.
    pub fn set_on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.lock().on_close = Some(Arc::new(callback));
    }

    /// Install or replace the terminal after-close callback. Fires at most
    /// once, when the exit animation completes.
    pub fn set_after_close(&self, callback: impl FnOnce() + Send + 'static) {
        self.lock().on_after_close = Some(Box::new(callback));
    }

    /// Flip the controlled open flag. Ignored in uncontrolled mode.
    pub fn set_open(&self, open: bool) {
        self.apply_input(Input::SetOpen(open));
    }

    /// A user-intent close request: in controlled mode this emits the intent
    /// callback and waits for the flag; in uncontrolled mode the exit starts
    /// immediately. Idempotent on exiting or closed instances.
    pub fn request_close(&self) {
        self.apply_input(Input::CloseIntent);
    }

    /// Feed an animation-end event. Events whose target is another instance
    /// are rejected, as are ends while not exiting (an enter animation
    /// finishing, or a duplicate end). Returns whether the terminal
    /// transition ran.
    pub fn handle_animation_end(&self, target: &DialogKey) -> bool {
        {
            let state = self.lock();
            if state.key != *target {
                return false;
            }
            if state.lifecycle.phase() != Phase::Exiting {
                return false;
            }
        }
        self.apply_input(Input::ExitAnimationEnd);
        true
    }

    /// Drive exit completion from the host's render clock: once the exit
    /// animation's duration has elapsed at `now`, run the terminal
    /// transition.
    pub fn tick(&self, now: Instant) {
        let due = {
            let state = self.lock();
            match (state.lifecycle.phase(), state.exit_started) {
                (Phase::Exiting, Some(started)) => {
                    now >= started + state.config.exit_animation.duration()
                }
                _ => false,
            }
        };
        if due {
            self.apply_input(Input::ExitAnimationEnd);
        }
    }

    /// Fraction of the exit animation elapsed at `now`, while exiting.
    pub fn exit_progress(&self, now: Instant) -> Option<f32> {
        let state = self.lock();
        if state.lifecycle.phase() != Phase::Exiting {
            return None;
        }
        let started = state.exit_started?;
        Some(progress(
            started,
            state.config.exit_animation.duration(),
            now,
        ))
    }

    /// Register a waiter resolved when this instance has fully closed.
    /// Already-closed instances resolve immediately; so does an instance
    /// torn down without a terminal transition.
    pub fn after_close(&self) -> AfterClose {
        let mut state = self.lock();
        if state.lifecycle.phase() == Phase::Closed {
            return AfterClose::ready();
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.push(tx);
        AfterClose::new(rx)
    }

    /// Tear the overlay down without waiting for an exit animation. The
    /// after-close callback does not fire; pending close waiters resolve.
    pub fn destroy(&self) {
        self.apply_input(Input::Destroy);
    }

    /// Draw the mask and content. The first call only marks the overlay
    /// mounted; nothing paints until the pass after that. `draw_content`
    /// receives the centered content rect, already cleared.
    pub fn render(
        &self,
        frame: &mut Frame<'_>,
        area: Rect,
        content_size: (u16, u16),
        draw_content: impl FnOnce(&mut Frame<'_>, Rect),
    ) {
        let (mask_style, content_style, content_rect) = {
            let mut state = self.lock();
            if !state.mounted {
                state.mounted = true;
                state.content_rect = None;
                return;
            }
            if !state.lifecycle.is_rendered() {
                state.content_rect = None;
                return;
            }
            let rect = centered_rect(area, content_size);
            state.content_rect = Some(rect);
            (state.config.mask_style, state.config.content_style, rect)
        };

        let mask = mask_style.unwrap_or_else(default_mask_style);
        frame.render_widget(Clear, area);
        frame.render_widget(Block::default().style(mask), area);

        frame.render_widget(Clear, content_rect);
        if let Some(style) = content_style {
            frame.render_widget(Block::default().style(style), content_rect);
        }
        draw_content(frame, content_rect);
    }

    /// Classify a mouse position against the last rendered layout. `None`
    /// until the overlay has painted, or once it is no longer rendered.
    pub fn mask_hit(&self, column: u16, row: u16) -> Option<MaskRegion> {
        let state = self.lock();
        if !state.lifecycle.is_rendered() {
            return None;
        }
        let rect = state.content_rect?;
        if column >= rect.x
            && column < rect.x + rect.width
            && row >= rect.y
            && row < rect.y + rect.height
        {
            Some(MaskRegion::Content)
        } else {
            Some(MaskRegion::Mask)
        }
    }

    fn apply_input(&self, input: Input) {
        let (ledger, actions) = {
            let mut state = self.lock();
            let effects = state.lifecycle.apply(input);
            let mut actions = Vec::new();
            for effect in effects {
                state.collect(effect, &mut actions);
            }
            (state.ledger.clone(), actions)
        };
        self.run_actions(ledger, actions);
    }

    fn execute_effects(&self, effects: Vec<Effect>) {
        if effects.is_empty() {
            return;
        }
        let (ledger, actions) = {
            let mut state = self.lock();
            let mut actions = Vec::new();
            for effect in effects {
                state.collect(effect, &mut actions);
            }
            (state.ledger.clone(), actions)
        };
        self.run_actions(ledger, actions);
    }

    fn run_actions(&self, ledger: VisibilityLedger, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Ledger(key, true) => ledger.insert(key),
                Action::Ledger(key, false) => ledger.remove(&key),
                Action::ArmAutoDestroy(delay, generation) => {
                    spawn_auto_destroy(Arc::downgrade(&self.inner), delay, generation);
                }
                Action::ArmFallback(bound, generation) => {
                    spawn_exit_fallback(Arc::downgrade(&self.inner), bound, generation);
                }
                Action::Intent(callback) => callback(),
                Action::Terminal {
                    key,
                    callback,
                    waiters,
                } => {
                    debug!(key = %key, "overlay closed");
                    if let Some(callback) = callback {
                        callback();
                    }
                    for waiter in waiters {
                        let _ = waiter.send(());
                    }
                }
                Action::Abandon(waiters) => drop(waiters),
            }
        }
    }

    fn auto_destroy_fired(&self, generation: u64) {
        {
            let state = self.lock();
            if state.auto_generation != generation || state.lifecycle.phase() != Phase::Visible {
                return;
            }
        }
        debug!(key = %self.key(), "auto-destroy timer fired");
        self.apply_input(Input::CloseIntent);
    }

    fn exit_fallback_fired(&self, generation: u64) {
        {
            let state = self.lock();
            if state.fallback_generation != generation || state.lifecycle.phase() != Phase::Exiting
            {
                return;
            }
        }
        warn!(key = %self.key(), "exit animation end never arrived; forcing close");
        self.apply_input(Input::ExitAnimationEnd);
    }
}

impl OverlayInner {
    fn collect(&mut self, effect: Effect, actions: &mut Vec<Action>) {
        match effect {
            Effect::AddToLedger => actions.push(Action::Ledger(self.key.clone(), true)),
            Effect::RemoveFromLedger => actions.push(Action::Ledger(self.key.clone(), false)),
            Effect::ArmAutoDestroy => {
                self.auto_generation += 1;
                if let Some(delay) = self.config.auto_destroy {
                    actions.push(Action::ArmAutoDestroy(delay, self.auto_generation));
                }
            }
            Effect::CancelAutoDestroy => {
                self.auto_generation += 1;
            }
            Effect::BeginExit => {
                self.exit_started = Some(Instant::now());
                self.fallback_generation += 1;
                if let Some(bound) = self.config.exit_fallback {
                    actions.push(Action::ArmFallback(bound, self.fallback_generation));
                }
            }
            Effect::CancelExit => {
                self.exit_started = None;
                self.fallback_generation += 1;
            }
            Effect::EmitCloseIntent => {
                if let Some(callback) = self.on_close.clone() {
                    actions.push(Action::Intent(callback));
                }
            }
            Effect::AfterClose => actions.push(Action::Terminal {
                key: self.key.clone(),
                callback: self.on_after_close.take(),
                waiters: std::mem::take(&mut self.waiters),
            }),
            Effect::AbandonWaiters => {
                self.on_after_close = None;
                actions.push(Action::Abandon(std::mem::take(&mut self.waiters)));
            }
        }
    }
}

fn default_mask_style() -> Style {
    Style::default()
        .bg(Color::Black)
        .add_modifier(Modifier::DIM)
}

fn centered_rect(area: Rect, size: (u16, u16)) -> Rect {
    let width = size.0.min(area.width);
    let height = size.1.min(area.height);
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width, height)
}

fn spawn_auto_destroy(weak: Weak<Mutex<OverlayInner>>, delay: Duration, generation: u64) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("auto-destroy configured without a tokio runtime; timer not armed");
        return;
    };
    runtime.spawn(async move {
        tokio::time::sleep(delay).await;
        if let Some(inner) = weak.upgrade() {
            Overlay { inner }.auto_destroy_fired(generation);
        }
    });
}

fn spawn_exit_fallback(weak: Weak<Mutex<OverlayInner>>, bound: Duration, generation: u64) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!("exit fallback configured without a tokio runtime; timer not armed");
        return;
    };
    runtime.spawn(async move {
        tokio::time::sleep(bound).await;
        if let Some(inner) = weak.upgrade() {
            Overlay { inner }.exit_fallback_fired(generation);
        }
    });
}
