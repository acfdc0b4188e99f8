//! Static description of a resource family.

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::id::IdFormat;
use crate::schema::Schema;

/// The four lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    #[allow(missing_docs)]
    Create,
    #[allow(missing_docs)]
    Read,
    #[allow(missing_docs)]
    Update,
    #[allow(missing_docs)]
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Time budget for each lifecycle operation, including waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTimeouts {
    #[allow(missing_docs)]
    pub create: Duration,
    #[allow(missing_docs)]
    pub read: Duration,
    #[allow(missing_docs)]
    pub update: Duration,
    #[allow(missing_docs)]
    pub delete: Duration,
}

impl ResourceTimeouts {
    /// The budget for `operation`.
    pub fn for_operation(&self, operation: Operation) -> Duration {
        match operation {
            Operation::Create => self.create,
            Operation::Read => self.read,
            Operation::Update => self.update,
            Operation::Delete => self.delete,
        }
    }
}

impl Default for ResourceTimeouts {
    fn default() -> Self {
        Self {
            create: Duration::from_secs(30 * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(30 * 60),
            delete: Duration::from_secs(30 * 60),
        }
    }
}

/// Everything the provider layer needs to know about a resource type
/// without talking to the remote API.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    /// Unique type name, e.g. `hemmer_container_registry`.
    pub type_name: &'static str,
    /// Field declarations.
    pub schema: Schema,
    /// Per-operation budgets.
    pub timeouts: ResourceTimeouts,
    /// Grammar of the resource's ID.
    pub id_format: IdFormat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = ResourceTimeouts::default();
        assert_eq!(timeouts.for_operation(Operation::Create), Duration::from_secs(1800));
        assert_eq!(timeouts.for_operation(Operation::Read), Duration::from_secs(300));
        assert_eq!(timeouts.for_operation(Operation::Update), Duration::from_secs(1800));
        assert_eq!(timeouts.for_operation(Operation::Delete), Duration::from_secs(1800));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(Operation::Create.to_string(), "create");
        assert_eq!(Operation::Delete.to_string(), "delete");
    }
}
