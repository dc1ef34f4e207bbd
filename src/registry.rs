//! Dialog content registry
//!
//! Maps a dialog type name to the component that renders it. Built once at
//! startup; duplicate registration and unregistered lookups are configuration
//! errors, surfaced loudly rather than ignored.

use crate::error::{DialogError, DialogResult};
use crate::types::DialogType;
use ratatui::layout::Rect;
use ratatui::Frame;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Content rendered inside an overlay for one dialog type
///
/// Implementations are shared across every live instance of their type; all
/// per-instance data arrives through `props`.
pub trait DialogContent: Send + Sync {
    /// Draw the dialog body into `area` (the centered content rect, already
    /// cleared by the overlay).
    fn render(&self, props: &Value, frame: &mut Frame<'_>, area: Rect);

    /// Preferred content size in cells for the given props and screen area.
    fn desired_size(&self, props: &Value, area: Rect) -> (u16, u16) {
        let _ = (props, area);
        (40, 10)
    }
}

/// Static lookup from dialog type to content component
#[derive(Default)]
pub struct DialogRegistry {
    entries: HashMap<DialogType, Arc<dyn DialogContent>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a content component under `dialog_type`.
    pub fn register(
        &mut self,
        dialog_type: impl Into<DialogType>,
        content: Arc<dyn DialogContent>,
    ) -> DialogResult<()> {
        let dialog_type = dialog_type.into();
        if self.entries.contains_key(&dialog_type) {
            return Err(DialogError::DuplicateType(dialog_type));
        }
        debug!(dialog_type = %dialog_type, "registered dialog content");
        self.entries.insert(dialog_type, content);
        Ok(())
    }

    pub fn get(&self, dialog_type: &DialogType) -> Option<Arc<dyn DialogContent>> {
        self.entries.get(dialog_type).cloned()
    }

    pub fn contains(&self, dialog_type: &DialogType) -> bool {
        self.entries.contains_key(dialog_type)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered type names, in no particular order.
    pub fn types(&self) -> Vec<DialogType> {
        self.entries.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyContent;

    impl DialogContent for EmptyContent {
        fn render(&self, _props: &Value, _frame: &mut Frame<'_>, _area: Rect) {}
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = DialogRegistry::new();
        registry
            .register("X1Dialog", Arc::new(EmptyContent))
            .unwrap();

        assert!(registry.contains(&DialogType::new("X1Dialog")));
        assert!(registry.get(&DialogType::new("X1Dialog")).is_some());
        assert!(registry.get(&DialogType::new("X2Dialog")).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut registry = DialogRegistry::new();
        registry
            .register("X1Dialog", Arc::new(EmptyContent))
            .unwrap();

        let err = registry
            .register("X1Dialog", Arc::new(EmptyContent))
            .unwrap_err();
        assert!(matches!(err, DialogError::DuplicateType(t) if t.as_str() == "X1Dialog"));
    }

    #[test]
    fn test_default_desired_size() {
        let content = EmptyContent;
        let area = Rect::new(0, 0, 80, 24);
        assert_eq!(content.desired_size(&Value::Null, area), (40, 10));
    }
}
