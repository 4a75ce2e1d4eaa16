//! Package requirements targeted by jobs.
//!
//! A [`Requirement`] is a package name plus a version constraint. It is
//! validated once, at construction, and never mutated afterwards.

mod events;

pub use events::{RequirementEvent, RequirementEvents, channel};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PaketError;

/// A package dependency: name and version constraint.
///
/// An empty constraint means "unconstrained".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    name: String,
    version_constraint: String,
}

/// Persisted shape of a [`Requirement`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequirementRecord {
    pub name: String,
    #[serde(default)]
    pub version_constraint: String,
}

impl Requirement {
    pub fn new(
        name: impl Into<String>,
        version_constraint: impl Into<String>,
    ) -> Result<Self, PaketError> {
        let name: String = name.into();
        let name = name.trim().to_string();
        let version_constraint: String = version_constraint.into();
        let version_constraint = version_constraint.trim().to_string();

        if name.is_empty() {
            return Err(PaketError::InvalidRequirement(
                "package name must not be empty".into(),
            ));
        }
        // Both values end up as arguments of the package manager.
        if name.starts_with('-') {
            return Err(PaketError::InvalidRequirement(format!(
                "package name must not start with '-': {name}"
            )));
        }
        if name.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(PaketError::InvalidRequirement(format!(
                "package name must not contain whitespace: {name:?}"
            )));
        }
        if version_constraint.starts_with('-') {
            return Err(PaketError::InvalidRequirement(format!(
                "version constraint must not start with '-': {version_constraint}"
            )));
        }
        if version_constraint.chars().any(char::is_control) {
            return Err(PaketError::InvalidRequirement(format!(
                "version constraint contains control characters: {version_constraint:?}"
            )));
        }

        Ok(Self {
            name,
            version_constraint,
        })
    }

    pub fn unconstrained(name: impl Into<String>) -> Result<Self, PaketError> {
        Self::new(name, "")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version_constraint(&self) -> &str {
        &self.version_constraint
    }

    pub fn is_constrained(&self) -> bool {
        !self.version_constraint.is_empty()
    }

    pub fn to_record(&self) -> RequirementRecord {
        RequirementRecord {
            name: self.name.clone(),
            version_constraint: self.version_constraint.clone(),
        }
    }

    /// Decodes a stored requirement. An empty name is the placeholder
    /// written for jobs without a requirement and yields `None`.
    pub fn from_record(record: RequirementRecord) -> Result<Option<Self>, PaketError> {
        if record.name.is_empty() {
            return Ok(None);
        }
        Self::new(record.name, record.version_constraint)
            .map(Some)
            .map_err(|e| PaketError::MalformedJobRecord(e.to_string()))
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_constrained() {
            write!(f, "{}:{}", self.name, self.version_constraint)
        } else {
            write!(f, "{}", self.name)
        }
    }
}
