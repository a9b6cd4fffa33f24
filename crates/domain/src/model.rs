//! Core data model shared by every store and component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved identity behind a request. Anonymous callers get a
/// `"anon-"`-prefixed id minted by the Identity Resolver and never gain
/// `is_admin`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub is_admin: bool,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Caller {
    pub fn anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_admin: false,
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub total_tokens: u64,
    /// Condensed running summary, refreshed by the Memory Store to bound
    /// prompt growth. Absent until the first refresh.
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
    Tool,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub session_id: String,
    pub owner_id: String,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub specialist: Option<String>,
}

/// Access scope for a derived memory or ingested document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Private,
    SharedWithAdmins,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Identity,
    EmotionalState,
    Preference,
    Goal,
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub owner_id: String,
    pub source_turn_id: String,
    pub kind: MemoryKind,
    pub content: String,
    pub access_level: AccessLevel,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Ingesting,
    Ready,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub access_level: AccessLevel,
    pub status: DocumentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub owner_id: String,
    pub access_level: AccessLevel,
    pub ordinal: u32,
    pub text: String,
    /// Serialized dense embedding, stored as a BLOB column.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistKind {
    Worker,
    Team,
}

/// A capability/precondition descriptor loaded at startup from a specialist
/// manifest. Not the specialist's live connection state, which is tracked
/// separately so routing can skip unreachable specialists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialistDescriptor {
    pub name: String,
    pub kind: SpecialistKind,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub tool_requirements: Vec<String>,
    #[serde(default)]
    pub model_hint: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_connection: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Degraded,
}
