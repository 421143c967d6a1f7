use crate::{EngineError, Fields, Value};
use std::collections::HashMap;
use std::sync::RwLock;

/// Per-run accumulator of the trigger payload and every completed node's
/// outputs, keyed by node title.
///
/// The outputs map is append-only: each title is written at most once,
/// by the one task executing that node, and never mutated afterwards.
/// The lock is held only for the map operation itself, never across an
/// await point.
pub struct RunContext {
    trigger: Fields,
    outputs: RwLock<HashMap<String, Fields>>,
}

impl RunContext {
    pub fn new(trigger: Fields) -> Self {
        Self {
            trigger,
            outputs: RwLock::new(HashMap::new()),
        }
    }

    pub fn trigger(&self) -> &Fields {
        &self.trigger
    }

    /// Record a completed node's outputs. Writing the same title twice is
    /// an engine bug, surfaced as an execution error rather than a silent
    /// overwrite.
    pub fn record(&self, title: &str, fields: Fields) -> Result<(), EngineError> {
        let mut outputs = self.outputs.write().expect("context lock poisoned");
        if outputs.contains_key(title) {
            return Err(EngineError::Execution(format!(
                "outputs for node '{}' already recorded",
                title
            )));
        }
        outputs.insert(title.to_string(), fields);
        Ok(())
    }

    pub fn has_completed(&self, title: &str) -> bool {
        self.outputs
            .read()
            .expect("context lock poisoned")
            .contains_key(title)
    }

    /// `outputs[title][field]`, cloned. None when the node has not
    /// completed or lacks the field.
    pub fn lookup(&self, title: &str, field: &str) -> Option<Value> {
        self.outputs
            .read()
            .expect("context lock poisoned")
            .get(title)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    /// Snapshot of all outputs recorded so far, for handing to a step.
    pub fn snapshot(&self) -> HashMap<String, Fields> {
        self.outputs.read().expect("context lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_lookup() {
        let ctx = RunContext::new(Fields::new());
        let mut fields = Fields::new();
        fields.insert("x".to_string(), Value::Number(5.0));
        ctx.record("A", fields).unwrap();

        assert_eq!(ctx.lookup("A", "x"), Some(Value::Number(5.0)));
        assert_eq!(ctx.lookup("A", "missing"), None);
        assert_eq!(ctx.lookup("B", "x"), None);
        assert!(ctx.has_completed("A"));
        assert!(!ctx.has_completed("B"));
    }

    #[test]
    fn double_record_is_rejected() {
        let ctx = RunContext::new(Fields::new());
        ctx.record("A", Fields::new()).unwrap();
        assert!(ctx.record("A", Fields::new()).is_err());
        // First write survives
        assert!(ctx.has_completed("A"));
    }
}
