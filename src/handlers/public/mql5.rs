use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::extractors::Json;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub success: bool,
    pub message: &'static str,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_data: Option<serde_json::Value>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Connectivity check for terminals before they start validating.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        success: true,
        message: "MT5 API is reachable",
        timestamp: timestamp(),
        received_data: None,
    })
}

/// Echo a JSON body back so terminals can check their request encoding.
pub async fn ping_echo(Json(body): Json<serde_json::Value>) -> Json<PingResponse> {
    Json(PingResponse {
        success: true,
        message: "MT5 API received the request",
        timestamp: timestamp(),
        received_data: Some(body),
    })
}
