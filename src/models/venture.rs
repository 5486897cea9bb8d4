use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a venture.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VentureStage {
    #[default]
    Idea,
    Building,
    Launched,
}

impl std::fmt::Display for VentureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VentureStage::Idea => write!(f, "idea"),
            VentureStage::Building => write!(f, "building"),
            VentureStage::Launched => write!(f, "launched"),
        }
    }
}

/// A venture in the studio portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Venture {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub stage: VentureStage,
    pub created_at: DateTime<Utc>,
}

impl Venture {
    /// Create a venture with a fresh id, stamped `created_at`.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        stage: VentureStage,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            stage,
            created_at,
        }
    }

    /// Apply the fields present in `update`.
    pub fn apply(&mut self, update: UpdateVentureRequest) {
        if let Some(name) = update.name {
            self.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(stage) = update.stage {
            self.stage = stage;
        }
    }
}

/// Body of `POST /api/ventures`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateVentureRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stage: VentureStage,
}

/// Body of `PUT /api/ventures/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateVentureRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub stage: Option<VentureStage>,
}

impl UpdateVentureRequest {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.stage.is_none()
    }
}
