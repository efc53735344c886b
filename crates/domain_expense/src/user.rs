//! Users as seen by the expense domain
//!
//! Users are owned by the identity collaborator; this crate only reads them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use core_kernel::UserId;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Employee,
    Manager,
    Finance,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Employee => "employee",
            Role::Manager => "manager",
            Role::Finance => "finance",
        }
    }

    /// Roles allowed to review expenses
    pub fn can_review(&self) -> bool {
        matches!(self, Role::Manager | Role::Finance)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "employee" => Ok(Role::Employee),
            "manager" => Ok(Role::Manager),
            "finance" => Ok(Role::Finance),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A user record from the identity directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// The user's manager, if one has been declared
    pub manager_id: Option<UserId>,
    pub department: Option<String>,
}

impl User {
    /// Creates a user with no manager or department
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new_v7(),
            name: name.into(),
            email: email.into(),
            role,
            manager_id: None,
            department: None,
        }
    }

    /// Sets the declared manager
    pub fn reporting_to(mut self, manager_id: UserId) -> Self {
        self.manager_id = Some(manager_id);
        self
    }

    /// Name used on external records; falls back to the email address
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.email
        } else {
            &self.name
        }
    }

    /// The authenticated view of this user
    pub fn as_actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// The authenticated caller of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: UserId, role: Role) -> Self {
        Self { id, role }
    }
}
