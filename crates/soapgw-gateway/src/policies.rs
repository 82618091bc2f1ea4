//! Template validation policies

use serde::{Deserialize, Serialize};

/// What to do when a route's templates drift from its schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    /// Refuse to register the route
    Enforce,

    /// Register the route and log every mismatch
    #[default]
    Warn,

    /// Do not validate
    Skip,
}

impl ValidationPolicy {
    pub fn blocks_registration(self) -> bool {
        self == Self::Enforce
    }

    pub fn validates(self) -> bool {
        self != Self::Skip
    }
}
