//! Error types for dialog orchestration
//!
//! Configuration and missing-context failures are surfaced synchronously so a
//! broken registry or an uninitialized stack is caught during development
//! instead of degrading into a silent no-op.

use crate::types::DialogType;

/// Result type for dialog operations
pub type DialogResult<T> = std::result::Result<T, DialogError>;

/// Dialog-specific error types
#[derive(Debug, thiserror::Error)]
pub enum DialogError {
    #[error("Dialog type '{0}' is not registered")]
    UnregisteredType(DialogType),

    #[error("Dialog type '{0}' is already registered")]
    DuplicateType(DialogType),

    #[error("No dialog stack is installed; construct a DialogStack before using the global accessor")]
    StackNotInstalled,

    #[error("No render host is installed; call DialogContext::install_host before opening static dialogs")]
    HostNotInstalled,
}
