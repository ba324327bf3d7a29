//! Acting user

use serde::{Deserialize, Serialize};

/// Authenticated operator performing a split
///
/// Returned by the login collaborator after a credential check and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub name: String,
}

impl User {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
