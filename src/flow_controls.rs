//! Named scalar/string variable table consulted by the scheduler when a
//! `Conditional` node evaluates a branch. Writable only through
//! commands; the scheduler only ever reads it.

use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Number(f32),
    String(Vec<u8>),
}

impl ControlValue {
    /// Truthiness used by `Conditional` nodes: a number is nonzero if
    /// it's not exactly `0.0`; a string is nonzero if it's non-empty.
    pub fn is_nonzero(&self) -> bool {
        match self {
            ControlValue::Number(n) => *n != 0.0,
            ControlValue::String(s) => !s.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlowControls {
    values: HashMap<Vec<u8>, ControlValue>,
}

impl FlowControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_number(&mut self, name: &[u8], value: f32) {
        self.values.insert(name.to_vec(), ControlValue::Number(value));
    }

    pub fn set_string(&mut self, name: &[u8], value: Vec<u8>) {
        self.values.insert(name.to_vec(), ControlValue::String(value));
    }

    pub fn clear(&mut self, name: &[u8]) {
        self.values.remove(name);
    }

    pub fn clear_all(&mut self) {
        self.values.clear();
    }

    /// Removes every control whose name starts with `prefix` (spec §6
    /// group 4's `clear_prefixed_flow_controls`), for host code that
    /// namespaces controls per-flow and wants to tear a namespace down
    /// in one call instead of clearing each key by hand.
    pub fn clear_prefixed(&mut self, prefix: &[u8]) {
        self.values.retain(|name, _| !name.starts_with(prefix));
    }

    pub fn get(&self, name: &[u8]) -> Option<&ControlValue> {
        self.values.get(name)
    }

    /// Evaluates truthiness for a `Conditional` node. An unset control is
    /// treated as zero/false rather than an error, since soundtrack
    /// authors routinely branch on controls the host hasn't set yet.
    pub fn is_truthy(&self, name: &[u8]) -> bool {
        self.values.get(name).map(|v| v.is_nonzero()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_control_is_falsy() {
        let controls = FlowControls::new();
        assert!(!controls.is_truthy(b"missing"));
    }

    #[test]
    fn zero_number_is_falsy_nonzero_is_truthy() {
        let mut controls = FlowControls::new();
        controls.set_number(b"intensity", 0.0);
        assert!(!controls.is_truthy(b"intensity"));
        controls.set_number(b"intensity", 0.5);
        assert!(controls.is_truthy(b"intensity"));
    }

    #[test]
    fn clear_prefixed_removes_only_matching_names() {
        let mut controls = FlowControls::new();
        controls.set_number(b"combat.intensity", 1.0);
        controls.set_number(b"combat.heat", 2.0);
        controls.set_string(b"ambient.weather", b"rain".to_vec());

        controls.clear_prefixed(b"combat.");

        assert!(controls.get(b"combat.intensity").is_none());
        assert!(controls.get(b"combat.heat").is_none());
        assert_eq!(controls.get(b"ambient.weather"), Some(&ControlValue::String(b"rain".to_vec())));
    }
}
