use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The envelope every RPC endpoint answers with, success or failure,
/// always under HTTP 200.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiResponse {
    pub status: ApiStatus,
    pub message: String,
    pub results: Vec<Value>,
}

#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone, Copy)]
pub enum ApiStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERROR")]
    Error,
    #[serde(rename = "ZERO_RESULTS")]
    ZeroResults,
}

impl ApiResponse {
    /// Wraps handler output; an empty result set is reported as
    /// `ZERO_RESULTS` rather than `OK`.
    pub fn results(results: Vec<Value>) -> ApiResponse {
        if results.is_empty() {
            ApiResponse {
                status: ApiStatus::ZeroResults,
                message: "no data returned".to_string(),
                results,
            }
        } else {
            ApiResponse {
                status: ApiStatus::Ok,
                message: "success".to_string(),
                results,
            }
        }
    }

    pub fn one(result: impl Serialize) -> ApiResponse {
        let value = serde_json::to_value(result).unwrap_or(Value::Null);
        ApiResponse::results(vec![value])
    }

    pub fn error(message: impl Into<String>) -> ApiResponse {
        ApiResponse {
            status: ApiStatus::Error,
            message: message.into(),
            results: Vec::new(),
        }
    }
}
