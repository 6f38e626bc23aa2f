use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::{License, LicenseRequest};
use crate::error::{AppError, Result};

pub const DEFAULT_CURRENCY: &str = "USD";
pub const DEFAULT_REJECTION_REASON: &str = "Payment verification failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentAction {
    Verify,
    Reject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub user_id: String,
    /// None once the linked request has been deleted
    pub license_request_id: Option<String>,
    pub subscription_plan_id: String,
    pub payment_method_id: String,
    pub amount: f64,
    pub currency: String,
    /// Proof of payment (URL or data URI), stored as-is
    pub proof: String,
    pub transaction_reference: Option<String>,
    pub status: PaymentStatus,
    pub verified_by: Option<String>,
    pub verified_at: Option<i64>,
    pub rejection_reason: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitPayment {
    pub license_request_id: String,
    pub subscription_plan_id: String,
    pub payment_method_id: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub proof: String,
    #[serde(default)]
    pub transaction_reference: Option<String>,
}

impl SubmitPayment {
    pub fn validate(&self) -> Result<()> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(AppError::Validation("amount must be greater than zero".into()));
        }
        if self.proof.trim().is_empty() {
            return Err(AppError::Validation("proof of payment is required".into()));
        }
        if let Some(currency) = &self.currency
            && currency.trim().is_empty()
        {
            return Err(AppError::Validation("currency cannot be empty".into()));
        }
        Ok(())
    }

    pub fn currency_code(&self) -> String {
        self.currency
            .as_deref()
            .map(|c| c.trim().to_uppercase())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecidePayment {
    pub action: PaymentAction,
    /// When verifying, also issue the license with this expiry
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Outcome of an admin payment decision.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentDecision {
    pub payment: Payment,
    pub request: Option<LicenseRequest>,
    pub license: Option<License>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PaymentListQuery {
    pub status: Option<PaymentStatus>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}
