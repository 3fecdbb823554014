//! KYC verdicts from model replies.
//!
//! A reply is accepted only if it is a single JSON object matching the report
//! schema exactly. Anything else routes the submission to manual review;
//! nothing here ever defaults to a passing verdict.

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::identity::Identity;
use crate::models::kyc::{DocumentKind, FaceMatchReport, KycRecord, KycStatus, LivenessReport};
use crate::state::AppState;

#[derive(Debug, Error)]
pub enum KycParseError {
    #[error("reply is empty")]
    Empty,

    #[error("reply does not match the report schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KycDecision {
    pub status: KycStatus,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KycSubmission {
    pub document_kind: DocumentKind,
    pub face_match_reply: String,
    pub liveness_reply: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KycReview {
    pub approve: bool,
    pub note: Option<String>,
}

/// Strips one surrounding fenced code block, if present.
fn unfence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(body) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}

fn parse_report<T: DeserializeOwned>(raw: &str) -> Result<T, KycParseError> {
    let body = unfence(raw);
    if body.is_empty() {
        return Err(KycParseError::Empty);
    }
    Ok(serde_json::from_str(body)?)
}

fn check_confidence(confidence: f64) -> Result<(), KycParseError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(KycParseError::ConfidenceOutOfRange(confidence))
    }
}

pub fn parse_face_match(raw: &str) -> Result<FaceMatchReport, KycParseError> {
    let report: FaceMatchReport = parse_report(raw)?;
    check_confidence(report.confidence)?;
    Ok(report)
}

pub fn parse_liveness(raw: &str) -> Result<LivenessReport, KycParseError> {
    let report: LivenessReport = parse_report(raw)?;
    check_confidence(report.confidence)?;
    Ok(report)
}

pub fn decide(
    face_match: &Result<FaceMatchReport, KycParseError>,
    liveness: &Result<LivenessReport, KycParseError>,
    min_confidence: f64,
) -> KycDecision {
    let (face, live) = match (face_match, liveness) {
        (Ok(face), Ok(live)) => (face, live),
        (Err(err), _) => {
            return KycDecision {
                status: KycStatus::ManualReview,
                reason: Some(format!("face match unreadable: {err}")),
            };
        }
        (_, Err(err)) => {
            return KycDecision {
                status: KycStatus::ManualReview,
                reason: Some(format!("liveness unreadable: {err}")),
            };
        }
    };

    let reason = if !face.is_match {
        Some("face does not match the document".to_string())
    } else if face.confidence < min_confidence {
        Some(format!("face match confidence {:.2} below {min_confidence:.2}", face.confidence))
    } else if !live.passed {
        Some(if live.reasons.is_empty() {
            "liveness check failed".to_string()
        } else {
            format!("liveness check failed: {}", live.reasons.join(", "))
        })
    } else if live.confidence < min_confidence {
        Some(format!("liveness confidence {:.2} below {min_confidence:.2}", live.confidence))
    } else {
        None
    };

    match reason {
        Some(reason) => KycDecision {
            status: KycStatus::Rejected,
            reason: Some(reason),
        },
        None => KycDecision {
            status: KycStatus::Verified,
            reason: None,
        },
    }
}

fn record_decision(state: &AppState, status: KycStatus) {
    state
        .metrics
        .kyc_decisions_total
        .with_label_values(&[status.as_label()])
        .inc();
}

pub fn submit(
    state: &AppState,
    identity: Identity,
    submission: KycSubmission,
) -> Result<KycRecord, AppError> {
    if let Some(existing) = state.kyc_records.get(&identity.user_id) {
        if existing.status == KycStatus::Verified {
            return Err(AppError::Conflict("identity is already verified".to_string()));
        }
    }

    let face_match = parse_face_match(&submission.face_match_reply);
    let liveness = parse_liveness(&submission.liveness_reply);
    let decision = decide(&face_match, &liveness, state.config.kyc_min_confidence);

    if decision.status == KycStatus::ManualReview {
        warn!(user_id = %identity.user_id, reason = ?decision.reason, "kyc reply unreadable; manual review");
    }

    let now = Utc::now();
    let record = KycRecord {
        user_id: identity.user_id,
        document_kind: submission.document_kind,
        status: decision.status,
        reason: decision.reason,
        face_match: face_match.ok(),
        liveness: liveness.ok(),
        reviewed_by: None,
        created_at: now,
        updated_at: now,
    };

    state.kyc_records.insert(record.user_id, record.clone());
    record_decision(state, record.status);
    info!(user_id = %record.user_id, status = record.status.as_label(), "kyc submission decided");

    Ok(record)
}

pub fn get_record(state: &AppState, user_id: Uuid) -> Result<KycRecord, AppError> {
    state
        .kyc_records
        .get(&user_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("no kyc submission for user {user_id}")))
}

pub fn review(
    state: &AppState,
    identity: Identity,
    user_id: Uuid,
    review: KycReview,
) -> Result<KycRecord, AppError> {
    if !identity.is_admin() {
        return Err(AppError::Forbidden("only admins review kyc submissions".to_string()));
    }

    let mut record = state
        .kyc_records
        .get_mut(&user_id)
        .ok_or_else(|| AppError::NotFound(format!("no kyc submission for user {user_id}")))?;

    record.status = if review.approve {
        KycStatus::Verified
    } else {
        KycStatus::Rejected
    };
    record.reason = review.note;
    record.reviewed_by = Some(identity.user_id);
    record.updated_at = Utc::now();
    let updated = record.clone();
    drop(record);

    record_decision(state, updated.status);
    info!(%user_id, reviewer = %identity.user_id, status = updated.status.as_label(), "kyc reviewed");

    Ok(updated)
}
