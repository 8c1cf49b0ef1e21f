//! ClassRegistry - Registry builder output, annotator input
//!
//! Persisted as `{"reference": {class: id}, "classification": {archetype: id | null}}`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ContractError;

/// Ground-truth class id
pub type ClassId = i64;

/// Archetype -> class id mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassRegistry {
    /// Class name -> class id
    pub reference: BTreeMap<String, ClassId>,

    /// Archetype -> class id, `None` when the base type had no reference entry
    pub classification: BTreeMap<String, Option<ClassId>>,
}

impl ClassRegistry {
    pub fn new(reference: BTreeMap<String, ClassId>) -> Self {
        Self {
            reference,
            classification: BTreeMap::new(),
        }
    }

    /// Class id for a reference class name (case-insensitive)
    pub fn reference_id(&self, base_type: &str) -> Option<ClassId> {
        self.reference.get(&base_type.to_lowercase()).copied()
    }

    pub fn insert(&mut self, type_id: impl Into<String>, class_id: Option<ClassId>) {
        self.classification.insert(type_id.into(), class_id);
    }

    /// Class id for an archetype; `None` for unknown or unclassified archetypes
    pub fn class_of(&self, type_id: &str) -> Option<ClassId> {
        self.classification.get(type_id).copied().flatten()
    }

    /// Archetypes recorded without a class id
    pub fn unclassified(&self) -> impl Iterator<Item = &str> {
        self.classification
            .iter()
            .filter(|(_, id)| id.is_none())
            .map(|(type_id, _)| type_id.as_str())
    }

    pub fn to_json_pretty(&self) -> Result<String, ContractError> {
        serde_json::to_string_pretty(self).map_err(|e| ContractError::registry("<memory>", e.to_string()))
    }

    /// Load a registry file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ContractError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ContractError::registry(path.display().to_string(), e.to_string()))?;
        serde_json::from_str(&content)
            .map_err(|e| ContractError::registry(path.display().to_string(), e.to_string()))
    }

    /// Write the registry as pretty JSON, replacing any existing file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ContractError> {
        let path = path.as_ref();
        let content = self.to_json_pretty()?;
        std::fs::write(path, content)
            .map_err(|e| ContractError::registry(path.display().to_string(), e.to_string()))
    }
}
