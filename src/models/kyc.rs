use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Passport,
    IdCard,
    DriverLicense,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum KycStatus {
    Verified,
    Rejected,
    ManualReview,
}

impl KycStatus {
    pub fn as_label(self) -> &'static str {
        match self {
            KycStatus::Verified => "verified",
            KycStatus::Rejected => "rejected",
            KycStatus::ManualReview => "manual_review",
        }
    }
}

/// Structured verdict expected from the face comparison model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FaceMatchReport {
    pub is_match: bool,
    pub confidence: f64,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Structured verdict expected from the liveness model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LivenessReport {
    pub passed: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KycRecord {
    pub user_id: Uuid,
    pub document_kind: DocumentKind,
    pub status: KycStatus,
    pub reason: Option<String>,
    pub face_match: Option<FaceMatchReport>,
    pub liveness: Option<LivenessReport>,
    pub reviewed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
