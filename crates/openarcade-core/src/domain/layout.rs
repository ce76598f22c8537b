//! Two-way lookup between UI button names and device control IDs.
//!
//! The UI speaks in button names (`"start"`, `"button_3"`); the device speaks
//! in control IDs (`"14"`, `"3"`).  A device's layout maps the former to the
//! latter.  [`LayoutIndex`] precomputes the reverse direction once so both
//! lookups are O(1) until the layout changes.
//!
//! A layout is expected to be a bijection but nothing enforces it.  When two
//! buttons share a control ID, reverse lookup returns the first button in
//! name order and a warning is logged.

use std::collections::HashMap;

use tracing::warn;

use super::device::Layout;

/// Forward and reverse index over one layout.
#[derive(Debug, Clone, Default)]
pub struct LayoutIndex {
    by_button: HashMap<String, String>,
    by_control: HashMap<String, String>,
}

impl LayoutIndex {
    /// Indexes `layout`.  Rebuild the index whenever the layout changes.
    pub fn new(layout: &Layout) -> Self {
        let mut by_control: HashMap<String, String> = HashMap::with_capacity(layout.len());

        // BTreeMap iteration is sorted by button name, which makes the
        // collision winner stable.
        for (button, control) in layout {
            if let Some(existing) = by_control.get(control) {
                warn!(
                    control_id = %control,
                    kept = %existing,
                    ignored = %button,
                    "layout maps two buttons to one control"
                );
                continue;
            }
            by_control.insert(control.clone(), button.clone());
        }

        Self {
            by_button: layout.iter().map(|(b, c)| (b.clone(), c.clone())).collect(),
            by_control,
        }
    }

    /// Control ID for a UI button name.
    pub fn control_for(&self, button: &str) -> Option<&str> {
        self.by_button.get(button).map(String::as_str)
    }

    /// UI button name for a control ID.
    pub fn button_for(&self, control_id: &str) -> Option<&str> {
        self.by_control.get(control_id).map(String::as_str)
    }

    /// Number of buttons in the layout.
    pub fn len(&self) -> usize {
        self.by_button.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_button.is_empty()
    }
}
