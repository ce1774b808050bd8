use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(PlaceId);

/// Place identifiers the user has marked as visited.
pub type VisitedSet = BTreeSet<PlaceId>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub id: PlaceId,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    pub image_url: String,
    /// Derived from the visited set; recomputed on every sync.
    #[serde(default)]
    pub visited: bool,
}

impl PlaceRecord {
    pub fn rating_label(&self) -> String {
        match self.rating {
            Some(rating) if rating > 0.0 => rating.to_string(),
            _ => "N/A".to_string(),
        }
    }

    pub fn reconcile(&mut self, visited: &VisitedSet) {
        self.visited = visited.contains(&self.id);
    }
}
