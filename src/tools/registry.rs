use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::core::tool::{Tool, ToolDescriptor};
use crate::tools::math::{AddTool, MultiplyTool};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool `{0}` is already registered")]
    Duplicate(String),
}

/// Tools known to the server, in registration order. Built once at startup,
/// then shared read-only.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<&'static str, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools<I>(iter: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut reg = Self::new();
        for t in iter {
            reg.register_arc(t)?;
        }
        Ok(reg)
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let name = tool.name();
        if self.by_name.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_owned()));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor()).collect()
    }

    pub fn describe(&self, name: &str) -> Option<ToolDescriptor> {
        self.get(name).map(|t| t.descriptor())
    }

    pub(crate) fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&i| &self.tools[i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The server's static tool set: `add` and `multiply`.
pub fn build_registry() -> Result<ToolRegistry, RegistryError> {
    ToolRegistry::with_tools([
        Arc::new(AddTool) as Arc<dyn Tool>,
        Arc::new(MultiplyTool) as Arc<dyn Tool>,
    ])
}
