pub mod queries;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::files::{FileError, FileRef};
use crate::validation;

/// One compliance checklist item belonging to a control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Subcontrol {
    pub id: i32,
    pub control_id: i32,
    pub status: Option<String>,
    pub approver: Option<String>,
    pub owner: Option<String>,
    pub reviewer: Option<String>,
    pub risk_review: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub implementation_details: Option<String>,
    pub evidence: Option<String>,
    pub feedback: Option<String>,
    #[sqlx(json)]
    #[serde(rename = "evidenceFiles")]
    pub evidence_files: Vec<FileRef>,
    #[sqlx(json)]
    #[serde(rename = "feedbackFiles")]
    pub feedback_files: Vec<FileRef>,
    pub attachment: Option<String>,
}

impl Subcontrol {
    /// The mutable columns of this row, as accepted by `queries::update`.
    pub fn to_record(&self) -> SubcontrolRecord {
        SubcontrolRecord {
            control_id: self.control_id,
            status: self.status.clone(),
            approver: self.approver.clone(),
            risk_review: self.risk_review.clone(),
            owner: self.owner.clone(),
            reviewer: self.reviewer.clone(),
            due_date: self.due_date,
            implementation_details: self.implementation_details.clone(),
            evidence: self.evidence.clone(),
            attachment: self.attachment.clone(),
            feedback: self.feedback.clone(),
        }
    }
}

/// Column values supplied when creating a subcontrol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubcontrolFields {
    pub status: Option<String>,
    pub approver: Option<String>,
    pub risk_review: Option<String>,
    pub owner: Option<String>,
    pub reviewer: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub implementation_details: Option<String>,
    pub evidence: Option<String>,
    pub feedback: Option<String>,
}

/// Full replacement for the mutable columns of a subcontrol.
///
/// Every column is overwritten on update: a field left as `None` is stored
/// as NULL. Callers that only want to change one field must send the whole
/// prior record with that field changed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubcontrolRecord {
    pub control_id: i32,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub approver: Option<String>,
    #[serde(default)]
    pub risk_review: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub reviewer: Option<String>,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub implementation_details: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub attachment: Option<String>,
    #[serde(default)]
    pub feedback: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SubcontrolError {
    #[error("attachment upload failed: {0}")]
    Upload(#[from] FileError),

    #[error(transparent)]
    Query(#[from] sqlx::Error),
}

impl From<SubcontrolError> for ApiError {
    fn from(err: SubcontrolError) -> Self {
        match err {
            SubcontrolError::Upload(e) => Self::from(e),
            SubcontrolError::Query(e) => Self::from(e),
        }
    }
}

fn check_text_fields(fields: &[(&str, Option<&String>)]) -> Vec<String> {
    let too_long = |name: &str, value: &str| {
        validation::check_length(name, value, 0, validation::MAX_TEXT_LEN).is_err()
    };
    fields
        .iter()
        .filter(|(name, value)| value.is_some_and(|v| too_long(name, v)))
        .map(|(name, _)| (*name).to_owned())
        .collect()
}

impl SubcontrolFields {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = check_text_fields(&[
            ("approver", self.approver.as_ref()),
            ("risk_review", self.risk_review.as_ref()),
            ("owner", self.owner.as_ref()),
            ("reviewer", self.reviewer.as_ref()),
            (
                "implementation_details",
                self.implementation_details.as_ref(),
            ),
            ("evidence", self.evidence.as_ref()),
            ("feedback", self.feedback.as_ref()),
        ]);
        if let Some(status) = &self.status
            && validation::check_status(status).is_err()
        {
            errors.push("status".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

impl SubcontrolRecord {
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = check_text_fields(&[
            ("approver", self.approver.as_ref()),
            ("risk_review", self.risk_review.as_ref()),
            ("owner", self.owner.as_ref()),
            ("reviewer", self.reviewer.as_ref()),
            (
                "implementation_details",
                self.implementation_details.as_ref(),
            ),
            ("evidence", self.evidence.as_ref()),
            ("attachment", self.attachment.as_ref()),
            ("feedback", self.feedback.as_ref()),
        ]);
        if let Some(status) = &self.status
            && validation::check_status(status).is_err()
        {
            errors.push("status".into());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_file_lists_in_camel_case() {
        let sc = Subcontrol {
            id: 1,
            control_id: 5,
            status: Some("Waiting".into()),
            approver: None,
            owner: None,
            reviewer: None,
            risk_review: None,
            due_date: NaiveDate::from_ymd_opt(2025, 3, 1),
            implementation_details: None,
            evidence: None,
            feedback: None,
            evidence_files: vec![FileRef {
                id: 3,
                file_name: "log.txt".into(),
            }],
            feedback_files: vec![],
            attachment: None,
        };
        let json = serde_json::to_value(&sc).unwrap();
        assert_eq!(json["evidenceFiles"][0]["fileName"], "log.txt");
        assert_eq!(json["feedbackFiles"], serde_json::json!([]));
        assert_eq!(json["due_date"], "2025-03-01");
        assert!(json.get("evidence_files").is_none());
    }

    #[test]
    fn record_requires_control_id() {
        let err = serde_json::from_value::<SubcontrolRecord>(serde_json::json!({
            "status": "Done"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn record_missing_fields_become_none() {
        let record: SubcontrolRecord =
            serde_json::from_value(serde_json::json!({ "control_id": 2, "owner": "Bob" })).unwrap();
        assert_eq!(record.owner.as_deref(), Some("Bob"));
        assert!(record.status.is_none());
        assert!(record.feedback.is_none());
    }

    #[test]
    fn unknown_status_fails_validation() {
        let fields = SubcontrolFields {
            status: Some("Finished".into()),
            ..Default::default()
        };
        let err = fields.validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref f) if f == &["status".to_owned()]));
    }

    #[test]
    fn empty_fields_are_valid() {
        assert!(SubcontrolFields::default().validate().is_ok());
    }

    #[test]
    fn overlong_owner_is_reported() {
        let record = SubcontrolRecord {
            control_id: 1,
            status: None,
            approver: None,
            risk_review: None,
            owner: Some("x".repeat(validation::MAX_TEXT_LEN + 1)),
            reviewer: None,
            due_date: None,
            implementation_details: None,
            evidence: None,
            attachment: None,
            feedback: None,
        };
        let err = record.validate().unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref f) if f.contains(&"owner".to_owned())));
    }
}
