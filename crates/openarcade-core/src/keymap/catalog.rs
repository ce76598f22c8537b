//! The boundary to the UI's input catalog, and turning a picked input into a
//! [`Binding`].
//!
//! The catalog itself (which gamepad buttons exist, what they are called on
//! screen) belongs to the UI.  This crate only needs to ask two questions of
//! it, captured by [`InputCatalog`]: what label does an input have, and does
//! it drive an analog axis?

use std::collections::HashMap;

use crate::domain::device::{AnalogConfig, Binding, InputKind};

use super::hid::HidKeyCode;

/// Lookup table from symbolic input name to display data.
pub trait InputCatalog {
    /// Display label for `input`, or `None` if the catalog does not offer it.
    fn label(&self, kind: InputKind, input: &str) -> Option<String>;

    /// Whether `input` drives an analog axis and needs an `analogConfig`.
    fn is_analog(&self, kind: InputKind, _input: &str) -> bool {
        kind == InputKind::Analog
    }
}

#[derive(Debug, Clone)]
struct CatalogEntry {
    label: String,
    analog: bool,
}

/// An [`InputCatalog`] filled in by the caller.
///
/// Keyboard inputs that are not in the table but name a known HID key are
/// still offered, labelled with the key's name (`"ENTER"` for `key_enter`).
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    entries: HashMap<(InputKind, String), CatalogEntry>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a digital input.
    pub fn with(mut self, kind: InputKind, input: &str, label: &str) -> Self {
        self.insert(kind, input, label, kind == InputKind::Analog);
        self
    }

    /// Adds an input that drives an analog axis regardless of its kind, such
    /// as a gamepad trigger.
    pub fn with_analog(mut self, kind: InputKind, input: &str, label: &str) -> Self {
        self.insert(kind, input, label, true);
        self
    }

    fn insert(&mut self, kind: InputKind, input: &str, label: &str, analog: bool) {
        self.entries.insert(
            (kind, input.to_string()),
            CatalogEntry {
                label: label.to_string(),
                analog,
            },
        );
    }
}

impl InputCatalog for TableCatalog {
    fn label(&self, kind: InputKind, input: &str) -> Option<String> {
        if let Some(entry) = self.entries.get(&(kind, input.to_string())) {
            return Some(entry.label.clone());
        }
        match kind {
            InputKind::Keyboard => HidKeyCode::from_input_name(input)
                .map(|key| key.name().trim_start_matches("HID_KEY_").to_string()),
            _ => None,
        }
    }

    fn is_analog(&self, kind: InputKind, input: &str) -> bool {
        self.entries
            .get(&(kind, input.to_string()))
            .map(|entry| entry.analog)
            .unwrap_or(kind == InputKind::Analog)
    }
}

/// Builds the mapping entry for a UI input picked in the configurator.
///
/// Keyboard inputs must name a known HID key.  Gamepad and analog inputs
/// must be offered by `catalog`.  Anything else yields `None`.
pub fn build_binding(catalog: &dyn InputCatalog, kind: InputKind, input: &str) -> Option<Binding> {
    let (keycode, label) = match kind {
        InputKind::Keyboard => {
            let key = HidKeyCode::from_input_name(input)?;
            let label = catalog
                .label(kind, input)
                .unwrap_or_else(|| input.to_string());
            (Some(key.name().to_string()), label)
        }
        InputKind::Gamepad | InputKind::Analog => (None, catalog.label(kind, input)?),
    };

    Some(Binding {
        keycode,
        kind: Some(kind),
        input: Some(input.to_string()),
        action: Some(label.clone()),
        label: Some(label),
        analog_config: catalog
            .is_analog(kind, input)
            .then(AnalogConfig::default),
        extra: Default::default(),
    })
}
