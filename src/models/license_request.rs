use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::License;
use crate::error::{AppError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    PendingPayment,
    PaymentVerified,
    Approved,
    Rejected,
}

impl RequestStatus {
    /// Statuses that count against the one-open-request-per-user rule.
    pub const OPEN: [RequestStatus; 3] = [
        RequestStatus::Pending,
        RequestStatus::PendingPayment,
        RequestStatus::PaymentVerified,
    ];

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

/// Admin decision on a license request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RequestAction {
    Approve,
    Reject,
    /// Approve a payment-gated request without verifying a payment
    Exempt,
}

impl RequestAction {
    pub fn allowed_from(&self, status: RequestStatus) -> bool {
        match self {
            RequestAction::Approve | RequestAction::Reject => status == RequestStatus::Pending,
            RequestAction::Exempt => matches!(
                status,
                RequestStatus::PendingPayment | RequestStatus::PaymentVerified
            ),
        }
    }

    pub fn issues_license(&self) -> bool {
        matches!(self, RequestAction::Approve | RequestAction::Exempt)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRequest {
    pub id: String,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub account_ids: Vec<String>,
    pub reason: String,
    pub subscription_plan_id: Option<String>,
    pub payment_id: Option<String>,
    pub status: RequestStatus,
    pub admin_notes: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<i64>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// User-editable fields of a license request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestFields {
    pub first_name: String,
    pub last_name: String,
    pub account_ids: Vec<String>,
    pub reason: String,
}

impl RequestFields {
    /// Validate and return a trimmed copy with de-duplicated account ids.
    pub fn normalized(&self) -> Result<RequestFields> {
        let first_name = require_text(&self.first_name, "first_name")?;
        let last_name = require_text(&self.last_name, "last_name")?;
        let reason = require_text(&self.reason, "reason")?;
        let account_ids = normalize_account_ids(&self.account_ids)?;

        Ok(RequestFields {
            first_name,
            last_name,
            account_ids,
            reason,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLicenseRequest {
    #[serde(flatten)]
    pub fields: RequestFields,
    #[serde(default)]
    pub subscription_plan_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecideRequest {
    pub action: RequestAction,
    #[serde(default)]
    pub admin_notes: Option<String>,
    /// Required for approve and exempt
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Outcome of an admin decision; `license` is set when one was issued.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDecision {
    pub request: LicenseRequest,
    pub license: Option<License>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RequestListQuery {
    pub status: Option<RequestStatus>,
    /// Admin only: matches names, account ids and the requester's email or name
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRequestQuery {
    #[serde(default)]
    pub cascade: bool,
}

fn require_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Check that an account id is a non-empty run of ASCII digits.
pub fn is_valid_account_id(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Trim, validate and de-duplicate account ids, keeping first-seen order.
pub fn normalize_account_ids(ids: &[String]) -> Result<Vec<String>> {
    let mut normalized: Vec<String> = Vec::with_capacity(ids.len());
    for raw in ids {
        let id = raw.trim();
        if !is_valid_account_id(id) {
            return Err(AppError::Validation(format!(
                "Invalid account id '{}': account ids must be numeric",
                raw
            )));
        }
        if !normalized.iter().any(|existing| existing == id) {
            normalized.push(id.to_string());
        }
    }

    if normalized.is_empty() {
        return Err(AppError::Validation(
            "At least one account id is required".into(),
        ));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn account_ids_are_trimmed_and_deduplicated() {
        let result = normalize_account_ids(&ids(&[" 1001", "2002", "1001 "])).unwrap();
        assert_eq!(result, ids(&["1001", "2002"]));
    }

    #[test]
    fn account_ids_must_be_numeric() {
        for bad in ["12a4", "", "-15", "1.5", "١٢"] {
            let err = normalize_account_ids(&ids(&[bad])).unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn account_ids_cannot_be_empty() {
        assert!(matches!(
            normalize_account_ids(&[]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn request_fields_reject_blank_names() {
        let fields = RequestFields {
            first_name: "  ".into(),
            last_name: "Doe".into(),
            account_ids: ids(&["1"]),
            reason: "trading".into(),
        };
        assert!(matches!(fields.normalized(), Err(AppError::Validation(_))));
    }

    #[test]
    fn status_strings_match_storage_format() {
        assert_eq!(RequestStatus::PendingPayment.as_ref(), "pending_payment");
        assert_eq!(
            "payment_verified".parse::<RequestStatus>().unwrap(),
            RequestStatus::PaymentVerified
        );
    }

    #[test]
    fn decision_transitions() {
        use RequestAction::*;
        use RequestStatus::*;

        assert!(Approve.allowed_from(Pending));
        assert!(Reject.allowed_from(Pending));
        assert!(!Approve.allowed_from(PendingPayment));
        assert!(!Reject.allowed_from(PaymentVerified));
        assert!(Exempt.allowed_from(PendingPayment));
        assert!(Exempt.allowed_from(PaymentVerified));
        assert!(!Exempt.allowed_from(Pending));

        for terminal in [Approved, Rejected] {
            assert!(terminal.is_terminal());
            for action in [Approve, Reject, Exempt] {
                assert!(!action.allowed_from(terminal));
            }
        }
    }
}
