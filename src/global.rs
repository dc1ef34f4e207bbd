//! Global stack accessor
//!
//! Imperative access to the most recently constructed [`DialogStack`] from
//! anywhere in the program, without threading the stack through call sites.
//! The context slot holds the stack weakly, so resolution fails cleanly once
//! the stack is dropped instead of going stale.

use crate::context::DialogContext;
use crate::error::DialogResult;
use crate::stack::DialogStack;

/// The stack installed on the global context. Fails when none has been
/// constructed yet, or the last one was dropped.
pub fn current() -> DialogResult<DialogStack> {
    DialogContext::global().stack()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DialogError;

    // The sole test touching global state; everything else runs on
    // DialogContext::fresh so tests stay order-independent.
    #[test]
    fn test_current_without_stack_fails() {
        assert!(matches!(current(), Err(DialogError::StackNotInstalled)));
    }
}
