use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AuditAction {
    CreateRequest,
    EditRequest,
    DecideRequest,
    DeleteRequest,
    SubmitPayment,
    DecidePayment,
    CreateLicense,
    UpdateLicense,
    DeleteLicense,
    CreatePlan,
    UpdatePlan,
    DeletePlan,
    CreatePaymentMethod,
    UpdatePaymentMethod,
    DeletePaymentMethod,
    CreateUser,
    UpdateUser,
    DeleteUser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: String,
    pub timestamp: i64,
    /// None for system actions (bootstrap, CLI)
    pub actor_id: Option<String>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: String,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub actor_id: Option<String>,
    pub action: Option<AuditAction>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditLogQuery {
    pub fn limit(&self) -> i64 {
        crate::pagination::clamp_limit(self.limit)
    }

    pub fn offset(&self) -> i64 {
        crate::pagination::clamp_offset(self.offset)
    }
}
