//! Stage inputs with strictness enforcement.

use crate::errors::UndeclaredDependencyError;
use std::collections::{HashMap, HashSet};

/// Data produced by upstream stages, keyed by stage name.
pub type UpstreamOutputs = HashMap<String, HashMap<String, serde_json::Value>>;

/// Provides an immutable view of prior stage outputs.
///
/// In strict mode, accessing undeclared dependencies raises an error. The
/// executor always builds strict inputs, so a stage can only see data that
/// flowed along one of its declared edges.
#[derive(Debug, Clone, Default)]
pub struct StageInputs {
    outputs: UpstreamOutputs,
    declared_dependencies: HashSet<String>,
    stage_name: String,
    strict: bool,
}

impl StageInputs {
    /// Creates new stage inputs.
    #[must_use]
    pub fn new(
        outputs: UpstreamOutputs,
        declared_dependencies: HashSet<String>,
        stage_name: impl Into<String>,
        strict: bool,
    ) -> Self {
        Self {
            outputs,
            declared_dependencies,
            stage_name: stage_name.into(),
            strict,
        }
    }

    /// Creates permissive stage inputs (no strictness).
    #[must_use]
    pub fn permissive(outputs: UpstreamOutputs, stage_name: impl Into<String>) -> Self {
        Self {
            declared_dependencies: outputs.keys().cloned().collect(),
            outputs,
            stage_name: stage_name.into(),
            strict: false,
        }
    }

    fn check_declared(&self, stage: &str) -> Result<(), UndeclaredDependencyError> {
        if self.strict && !self.declared_dependencies.contains(stage) {
            return Err(UndeclaredDependencyError::new(&self.stage_name, stage));
        }
        Ok(())
    }

    /// Gets output from a specific stage.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if the stage
    /// is not a declared dependency.
    pub fn get(
        &self,
        stage: &str,
    ) -> Result<Option<&HashMap<String, serde_json::Value>>, UndeclaredDependencyError> {
        self.check_declared(stage)?;
        Ok(self.outputs.get(stage))
    }

    /// Gets a specific value from a stage's output.
    ///
    /// # Errors
    ///
    /// Returns `UndeclaredDependencyError` in strict mode if the stage
    /// is not a declared dependency.
    pub fn get_value(
        &self,
        stage: &str,
        key: &str,
    ) -> Result<Option<&serde_json::Value>, UndeclaredDependencyError> {
        self.check_declared(stage)?;
        Ok(self.outputs.get(stage).and_then(|o| o.get(key)))
    }

    /// Checks if output exists for a stage.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.outputs.contains_key(stage)
    }

    /// Returns the name of the stage these inputs belong to.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    /// Returns the declared dependencies.
    #[must_use]
    pub fn declared_dependencies(&self) -> &HashSet<String> {
        &self.declared_dependencies
    }
}
