//! The acting identity of a request.
//!
//! The identity collaborator resolves `{id, role, department}`; the engine
//! trusts it. Free-text roles are normalized exactly once, in
//! [`Caller::parse`], and compared as enums everywhere else.

use appraisal_state::{normalize_label, Role, UnknownLabel, UserId};
use serde::{Deserialize, Serialize};

/// Broad capability class of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleClass {
    /// Creates, transitions and deletes evaluations; sees everything.
    Coordinator,
    /// Reads every evaluation of their own department.
    DepartmentReviewer,
    /// Only reaches evaluations addressed to them.
    Evaluator,
}

/// Classify a role.
pub fn role_class(role: Role) -> RoleClass {
    match role {
        Role::QualityOfficer | Role::Admin => RoleClass::Coordinator,
        Role::DepartmentHead | Role::CollegeDean | Role::ViceAcademy | Role::HumanResource => {
            RoleClass::DepartmentReviewer
        }
        Role::Instructor | Role::Student => RoleClass::Evaluator,
    }
}

/// Request caller as resolved by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub id: UserId,
    pub role: Role,
    #[serde(default)]
    pub department: Option<String>,
}

impl Caller {
    pub fn new(id: impl Into<UserId>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            department: None,
        }
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Build a caller from boundary strings, normalizing the role.
    pub fn parse(
        id: impl Into<UserId>,
        role: &str,
        department: Option<String>,
    ) -> Result<Self, UnknownLabel> {
        Ok(Self {
            id: id.into(),
            role: role.parse()?,
            department: department.filter(|d| !d.trim().is_empty()),
        })
    }

    pub fn class(&self) -> RoleClass {
        role_class(self.role)
    }

    pub fn is_coordinator(&self) -> bool {
        self.class() == RoleClass::Coordinator
    }

    /// Whether the caller belongs to `department`.
    pub fn in_department(&self, department: &str) -> bool {
        self.department
            .as_deref()
            .is_some_and(|own| same_department(own, department))
    }
}

/// Department names compare case- and separator-insensitively.
pub fn same_department(a: &str, b: &str) -> bool {
    normalize_label(a) == normalize_label(b)
}
