use crate::invoke::invoke_step;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wirecore::{
    ActionDescriptor, Plugin, RegistryError, Step, StepFailure, StepInput, StepResult,
};

/// Slug-keyed table of every action the engine can run, flattened from
/// the plugin set plus the built-in system actions at start-up.
///
/// This is the single indirection point between the executor and step
/// code: `invoke` validates the declared config schema, then dispatches
/// to the bound step through the invocation wrapper. Unknown slugs are a
/// registry error, never a run-time failure value.
pub struct ActionRegistry {
    actions: HashMap<String, ActionEntry>,
    order: Vec<String>,
}

struct ActionEntry {
    descriptor: ActionDescriptor,
    step: Arc<dyn Step>,
}

impl ActionRegistry {
    /// Flatten plugins into one slug-keyed table. Every declared action
    /// must have a step implementation with a matching slug; duplicate
    /// slugs across the whole set are rejected.
    pub fn from_plugins(plugins: &[Plugin]) -> Result<Self, RegistryError> {
        let mut registry = Self {
            actions: HashMap::new(),
            order: Vec::new(),
        };
        for plugin in plugins {
            let steps: HashMap<&str, &Arc<dyn Step>> =
                plugin.steps.iter().map(|s| (s.slug(), s)).collect();
            for action in &plugin.descriptor.actions {
                let step = steps.get(action.slug.as_str()).copied().ok_or_else(|| {
                    RegistryError::MissingStep {
                        plugin: plugin.descriptor.integration_type.clone(),
                        slug: action.slug.clone(),
                    }
                })?;
                registry.insert(action.clone(), Arc::clone(step))?;
            }
        }
        Ok(registry)
    }

    fn insert(
        &mut self,
        descriptor: ActionDescriptor,
        step: Arc<dyn Step>,
    ) -> Result<(), RegistryError> {
        let slug = descriptor.slug.clone();
        if self.actions.contains_key(&slug) {
            return Err(RegistryError::DuplicateSlug(slug));
        }
        tracing::debug!(slug = %slug, integration = %descriptor.integration_type, "registering action");
        self.order.push(slug.clone());
        self.actions.insert(slug, ActionEntry { descriptor, step });
        Ok(())
    }

    /// O(1) descriptor lookup.
    pub fn resolve(&self, slug: &str) -> Result<&ActionDescriptor, RegistryError> {
        self.actions
            .get(slug)
            .map(|entry| &entry.descriptor)
            .ok_or_else(|| RegistryError::ActionNotFound(slug.to_string()))
    }

    /// All descriptors in registration order, for authoring collaborators.
    pub fn all(&self) -> Vec<&ActionDescriptor> {
        self.order
            .iter()
            .filter_map(|slug| self.actions.get(slug))
            .map(|entry| &entry.descriptor)
            .collect()
    }

    /// Validate the resolved input against the action's declared schema,
    /// then dispatch to the bound step through the invocation wrapper.
    ///
    /// A missing or blank required field yields a Validation failure
    /// naming the field; the step is never called in that case.
    pub async fn invoke(
        &self,
        slug: &str,
        input: StepInput,
        deadline: Option<Duration>,
    ) -> Result<StepResult, RegistryError> {
        let entry = self
            .actions
            .get(slug)
            .ok_or_else(|| RegistryError::ActionNotFound(slug.to_string()))?;

        if let Some(failure) = validate_input(&entry.descriptor, &input) {
            return Ok(StepResult::Failure(failure));
        }

        Ok(invoke_step(slug, Arc::clone(&entry.step), input, deadline).await)
    }
}

fn validate_input(descriptor: &ActionDescriptor, input: &StepInput) -> Option<StepFailure> {
    for field in &descriptor.config_fields {
        if !field.required {
            continue;
        }
        let blank = match input.config.get(&field.key) {
            None => true,
            Some(value) => value.render().trim().is_empty(),
        };
        if blank {
            return Some(StepFailure::validation(format!(
                "Missing required field '{}' for action '{}'",
                field.key, descriptor.slug
            )));
        }
    }
    None
}
