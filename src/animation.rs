//! Enter/exit animation identifiers and timing
//!
//! Animations here are lifecycle timing, not easing curves: an overlay is
//! considered mid-exit until its exit animation's duration has elapsed (or the
//! host reports the end event explicitly). Identifiers match the style names
//! hosts typically map to their own transition rendering.

use std::time::{Duration, Instant};

/// How long enter animations run.
pub const ENTER_DURATION: Duration = Duration::from_millis(300);

/// How long exit animations run. Exits are faster than enters so dismissal
/// feels immediate.
pub const EXIT_DURATION: Duration = Duration::from_millis(200);

/// Animation played when an overlay becomes visible
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterAnimation {
    FadeIn,
    ZoomIn,
    SlideUpIn,
    SlideRightIn,
}

impl EnterAnimation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FadeIn => "fade-in",
            Self::ZoomIn => "zoom-in",
            Self::SlideUpIn => "slide-up-in",
            Self::SlideRightIn => "slide-right-in",
        }
    }

    pub fn duration(&self) -> Duration {
        ENTER_DURATION
    }
}

impl Default for EnterAnimation {
    fn default() -> Self {
        Self::ZoomIn
    }
}

impl std::fmt::Display for EnterAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Animation played while an overlay exits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitAnimation {
    FadeOut,
    ZoomOut,
    SlideUpOut,
    SlideRightOut,
}

impl ExitAnimation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FadeOut => "fade-out",
            Self::ZoomOut => "zoom-out",
            Self::SlideUpOut => "slide-up-out",
            Self::SlideRightOut => "slide-right-out",
        }
    }

    pub fn duration(&self) -> Duration {
        EXIT_DURATION
    }
}

impl Default for ExitAnimation {
    fn default() -> Self {
        Self::ZoomOut
    }
}

impl std::fmt::Display for ExitAnimation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fraction of an animation elapsed at `now`, clamped to `0.0..=1.0`.
pub fn progress(started: Instant, duration: Duration, now: Instant) -> f32 {
    if duration.is_zero() {
        return 1.0;
    }
    let elapsed = now.saturating_duration_since(started);
    (elapsed.as_secs_f32() / duration.as_secs_f32()).clamp(0.0, 1.0)
}
