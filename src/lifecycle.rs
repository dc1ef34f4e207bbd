//! Overlay lifecycle state machine
//!
//! Pure transition logic for one overlay instance. The two open modes are
//! explicit variants sharing a single exiting-to-closed tail:
//!
//! - `Controlled`: an external open flag owns visibility. A user-intent close
//!   only emits the intent signal; the exit animation starts when the flag
//!   actually flips false. Flipping it back true before the animation ends
//!   re-enters `Visible` (re-open pre-empts close).
//! - `Uncontrolled`: the overlay owns its own exit; a user-intent close starts
//!   the animation immediately.
//!
//! `apply` mutates the machine and returns the effects the owner must execute
//! after releasing its locks. The machine itself never touches ledgers,
//! timers, or callbacks.

/// Open-mode variants for an overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Visibility is owned by an external boolean flag.
    Controlled { open: bool },
    /// The overlay owns its visibility; it starts visible.
    Uncontrolled,
}

/// Lifecycle phase of an overlay instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Constructed but not yet shown (controlled with `open = false`).
    Created,
    /// Fully visible, counted by the visibility ledger.
    Visible,
    /// Playing the exit animation; no longer counted by the ledger.
    Exiting,
    /// Terminal. Never left.
    Closed,
}

/// Inputs fed to the machine by the owning overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// The controlling open flag changed (controlled mode only).
    SetOpen(bool),
    /// A user-intent close: mask click, auto-destroy timer, popstate, or an
    /// explicit request.
    CloseIntent,
    /// The exit animation finished. Ignored unless currently exiting.
    ExitAnimationEnd,
    /// The owner is tearing the overlay down without waiting for an exit.
    Destroy,
}

/// Effects the owner must execute, in order, after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Add this instance's key to the visibility ledger.
    AddToLedger,
    /// Remove this instance's key from the visibility ledger.
    RemoveFromLedger,
    /// Arm the auto-destroy timer if one is configured.
    ArmAutoDestroy,
    /// Invalidate any pending auto-destroy timer.
    CancelAutoDestroy,
    /// Record the exit start and arm the exit fallback if configured.
    BeginExit,
    /// Invalidate the exit fallback and forget the exit start.
    CancelExit,
    /// Invoke the close-intent callback (controlled mode).
    EmitCloseIntent,
    /// Fire the terminal after-close callback and resolve all close waiters.
    AfterClose,
    /// Drop close waiters without firing the after-close callback.
    AbandonWaiters,
}

/// The state machine itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    mode: Mode,
    phase: Phase,
}

impl Lifecycle {
    /// Build a machine in its initial phase. An overlay that starts open is
    /// immediately `Visible`; the returned effects register it with the
    /// ledger and arm its timer.
    pub fn new(mode: Mode) -> (Self, Vec<Effect>) {
        let open = match mode {
            Mode::Controlled { open } => open,
            Mode::Uncontrolled => true,
        };
        if open {
            (
                Self {
                    mode,
                    phase: Phase::Visible,
                },
                vec![Effect::AddToLedger, Effect::ArmAutoDestroy],
            )
        } else {
            (
                Self {
                    mode,
                    phase: Phase::Created,
                },
                Vec::new(),
            )
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_controlled(&self) -> bool {
        matches!(self.mode, Mode::Controlled { .. })
    }

    /// Whether the overlay should currently be drawn (visible or mid-exit).
    pub fn is_rendered(&self) -> bool {
        matches!(self.phase, Phase::Visible | Phase::Exiting)
    }

    /// Apply one input, returning the effects to execute.
    pub fn apply(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::SetOpen(flag) => self.set_open(flag),
            Input::CloseIntent => self.close_intent(),
            Input::ExitAnimationEnd => self.exit_animation_end(),
            Input::Destroy => self.destroy(),
        }
    }

    fn set_open(&mut self, flag: bool) -> Vec<Effect> {
        match self.mode {
            Mode::Uncontrolled => Vec::new(),
            Mode::Controlled { ref mut open } => {
                *open = flag;
                match (flag, self.phase) {
                    (true, Phase::Created) => {
                        self.phase = Phase::Visible;
                        vec![Effect::AddToLedger, Effect::ArmAutoDestroy]
                    }
                    // Re-open pre-empts an in-flight exit.
                    (true, Phase::Exiting) => {
                        self.phase = Phase::Visible;
                        vec![
                            Effect::CancelExit,
                            Effect::AddToLedger,
                            Effect::ArmAutoDestroy,
                        ]
                    }
                    (false, Phase::Visible) => {
                        self.phase = Phase::Exiting;
                        vec![
                            Effect::RemoveFromLedger,
                            Effect::CancelAutoDestroy,
                            Effect::BeginExit,
                        ]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    fn close_intent(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Visible {
            // Closing an already-exiting or closed instance is a no-op.
            return Vec::new();
        }
        match self.mode {
            Mode::Controlled { .. } => vec![Effect::EmitCloseIntent],
            Mode::Uncontrolled => {
                self.phase = Phase::Exiting;
                vec![
                    Effect::RemoveFromLedger,
                    Effect::CancelAutoDestroy,
                    Effect::BeginExit,
                ]
            }
        }
    }

    fn exit_animation_end(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Exiting {
            return Vec::new();
        }
        self.phase = Phase::Closed;
        vec![Effect::CancelExit, Effect::AfterClose]
    }

    fn destroy(&mut self) -> Vec<Effect> {
        let effects = match self.phase {
            Phase::Visible => vec![
                Effect::RemoveFromLedger,
                Effect::CancelAutoDestroy,
                Effect::AbandonWaiters,
            ],
            Phase::Exiting => vec![Effect::CancelExit, Effect::AbandonWaiters],
            Phase::Created => vec![Effect::AbandonWaiters],
            Phase::Closed => Vec::new(),
        };
        self.phase = Phase::Closed;
        effects
    }
}
