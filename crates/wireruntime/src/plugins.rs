use std::collections::HashMap;
use std::sync::Arc;
use wirecore::{ConnectivityTest, IntegrationDescriptor, Plugin, RegistryError};

/// Registry of integration descriptors, built once at process start from
/// an explicit list of plugin constructors and read-only thereafter.
///
/// There is no removal operation; the registry is additive for the
/// process lifetime.
pub struct PluginRegistry {
    descriptors: HashMap<String, IntegrationDescriptor>,
    connectivity: HashMap<String, Arc<dyn ConnectivityTest>>,
    // Preserve registration order for stable catalog listings.
    order: Vec<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            descriptors: HashMap::new(),
            connectivity: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Build a registry by invoking each plugin constructor in turn.
    pub fn from_plugins(plugins: &[Plugin]) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for plugin in plugins {
            registry.register(plugin)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, plugin: &Plugin) -> Result<(), RegistryError> {
        let integration_type = plugin.descriptor.integration_type.clone();
        if self.descriptors.contains_key(&integration_type) {
            return Err(RegistryError::DuplicateType(integration_type));
        }
        tracing::info!(integration = %integration_type, "registering integration");
        if let Some(test) = &plugin.connectivity {
            self.connectivity
                .insert(integration_type.clone(), Arc::clone(test));
        }
        self.order.push(integration_type.clone());
        self.descriptors
            .insert(integration_type, plugin.descriptor.clone());
        Ok(())
    }

    pub fn get(&self, integration_type: &str) -> Option<&IntegrationDescriptor> {
        self.descriptors.get(integration_type)
    }

    /// Full descriptor set, in registration order, for authoring
    /// collaborators.
    pub fn all(&self) -> Vec<&IntegrationDescriptor> {
        self.order
            .iter()
            .filter_map(|t| self.descriptors.get(t))
            .collect()
    }

    pub fn connectivity_test(&self, integration_type: &str) -> Option<Arc<dyn ConnectivityTest>> {
        self.connectivity.get(integration_type).cloned()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
