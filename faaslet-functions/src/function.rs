//! Function model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered function: a display name bound to a container image
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Function {
    pub id: String,
    pub name: String,
    pub image: String,
    pub created_at: DateTime<Utc>,
}

impl Function {
    /// Create a new function with a freshly generated ID
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            image: image.into(),
            created_at: Utc::now(),
        }
    }
}
