//! Tool Registry - immutable name to descriptor map.
//!
//! Built once at startup from the catalog; read-only afterwards and shared
//! by every transport.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use super::descriptor::ToolDescriptor;
use super::error::ToolError;

/// Problems detected while building the registry. Fatal at startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two descriptors share a name.
    #[error("Duplicate tool name: {0}")]
    Duplicate(String),

    /// A descriptor is internally inconsistent.
    #[error("Invalid tool descriptor '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

// ============================================================================
// Tool Registry
// ============================================================================

/// Registry of all descriptor-backed tools.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<ToolDescriptor>>,
}

impl ToolRegistry {
    /// Build a registry, rejecting duplicate names and malformed descriptors.
    pub fn new(descriptors: impl IntoIterator<Item = ToolDescriptor>) -> Result<Self, RegistryError> {
        let mut tools = BTreeMap::new();
        for descriptor in descriptors {
            descriptor
                .check()
                .map_err(|reason| RegistryError::InvalidDescriptor {
                    name: descriptor.name.clone(),
                    reason,
                })?;
            if tools.contains_key(&descriptor.name) {
                return Err(RegistryError::Duplicate(descriptor.name));
            }
            tools.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        info!("Registered {} tool(s)", tools.len());
        Ok(Self { tools })
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<Arc<ToolDescriptor>, ToolError> {
        self.tools.get(name).cloned().ok_or_else(|| {
            warn!("Unknown tool requested: {}", name);
            ToolError::not_found(name)
        })
    }

    /// All tool names, sorted.
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// All descriptors, sorted by name.
    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<ToolDescriptor>> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::tools::catalog;
    use crate::domains::tools::descriptor::{CachePolicy, ParamSpec};

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "d", "/exchanges-list", "read:eod", CachePolicy::STATIC)
    }

    #[test]
    fn test_resolve_known_and_unknown() {
        let registry = ToolRegistry::new([tool("a"), tool("b")]).unwrap();

        assert_eq!(registry.resolve("a").unwrap().name, "a");
        assert!(matches!(registry.resolve("zzz"), Err(ToolError::NotFound(_))));
        assert_eq!(registry.tool_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let err = ToolRegistry::new([tool("a"), tool("a")]).unwrap_err();
        assert!(matches!(err, RegistryError::Duplicate(name) if name == "a"));
    }

    #[test]
    fn test_malformed_descriptor_is_rejected() {
        let bad = ToolDescriptor::new("bad", "d", "/eod/{ticker}", "read:eod", CachePolicy::EOD)
            .param(ParamSpec::string("symbol", "wrong name").in_path());
        assert!(matches!(
            ToolRegistry::new([bad]),
            Err(RegistryError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_builtin_catalog_registers() {
        let registry = ToolRegistry::new(catalog::descriptors()).unwrap();
        assert!(registry.len() >= 25);
        assert!(registry.resolve(catalog::LIVE_PRICE).is_ok());
        assert!(registry.resolve(catalog::FUNDAMENTALS).is_ok());
    }
}
