use std::{collections::HashMap, sync::Arc};

use crate::{Tool, ToolDescriptor};

pub(crate) struct RegisteredTool {
    pub(crate) tool: Arc<dyn Tool>,
    pub(crate) validator: jsonschema::Validator,
}

/// Name-keyed set of registered tools with precompiled argument
/// validators.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with an invalid input schema or a duplicate
    /// name is rejected with a warning rather than poisoning the registry.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let descriptor = tool.descriptor();
        let name = descriptor.name.clone();

        if self.tools.contains_key(&name) {
            log::warn!("Tool '{name}' is already registered, keeping the first registration");
            return;
        }

        let validator = match jsonschema::validator_for(&descriptor.input_schema) {
            Ok(validator) => validator,
            Err(e) => {
                log::warn!("Tool '{name}' has an invalid input schema, skipping registration: {e}");
                return;
            }
        };

        log::debug!("Registered tool '{name}'");
        self.tools.insert(name, RegisteredTool { tool, validator });
    }

    /// Whether a tool with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Descriptors of every registered tool, sorted by name.
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut descriptors: Vec<&ToolDescriptor> =
            self.tools.values().map(|entry| entry.tool.descriptor()).collect();

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Sorted tool names, for error messages and logs.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub(crate) fn get(&self, name: &str) -> Option<&RegisteredTool> {
        self.tools.get(name)
    }
}
