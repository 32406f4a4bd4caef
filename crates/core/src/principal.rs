//! Operator identity, as handed over by the external identity provider.

use serde::{Deserialize, Serialize};

use crate::id::OperatorId;

/// An authenticated operator (warehouse employee, supervisor, or the system
/// itself for synthetic writes).
///
/// The engine never authenticates anyone; it only records which principal
/// performed an action. Authentication is the identity provider's problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: OperatorId,
    pub display_name: String,
    pub email: Option<String>,
}

impl Operator {
    pub fn new(id: OperatorId, display_name: impl Into<String>) -> Self {
        Self {
            id,
            display_name: display_name.into(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
