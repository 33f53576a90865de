use serde::{Deserialize, Serialize};

use crate::error::ControlError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum ServerResponse {
    #[serde(rename = "success")]
    Success {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        data: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

impl ServerResponse {
    pub fn success(id: Option<String>, data: serde_json::Value) -> Self {
        Self::Success { id, data }
    }

    pub fn error(id: Option<String>, message: String) -> Self {
        Self::Error {
            id,
            message,
            code: None,
        }
    }

    /// Typed control failures keep their machine-readable code so clients
    /// can tell a bounds rejection from a hardware fault.
    pub fn control_error(id: Option<String>, err: &ControlError) -> Self {
        Self::Error {
            id,
            message: err.to_string(),
            code: Some(err.code().to_string()),
        }
    }
}
