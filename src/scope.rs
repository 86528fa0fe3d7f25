use log::debug;

use crate::error::{LogError, Result};

/// Strategy for naming the storage scope (container) a collector writes under
pub trait ScopeNamer: Send + Sync {
    /// Resolve the scope name
    fn scope_name(&self) -> Result<String>;
}

/// Names the scope after the current machine
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineName;

impl ScopeNamer for MachineName {
    fn scope_name(&self) -> Result<String> {
        let name = hostname::get()?
            .into_string()
            .map_err(|raw| LogError::Config(format!("Hostname is not valid UTF-8: {:?}", raw)))?;

        if name.is_empty() {
            return Err(LogError::Config("Hostname is empty".to_string()));
        }

        debug!("Using machine name '{}' as scope", name);
        Ok(name)
    }
}

/// A scope name fixed up front
#[derive(Debug, Clone)]
pub struct FixedScope(String);

impl FixedScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl ScopeNamer for FixedScope {
    fn scope_name(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(LogError::Config("Scope name is empty".to_string()));
        }
        Ok(self.0.clone())
    }
}
