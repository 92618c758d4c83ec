//! Wire envelope exchanged with an isolated engine instance
//!
//! One JSON object per line. Every message carries an explicit `type` tag, so a
//! report is never inferred from the shape of an arbitrary message.

use serde::{Deserialize, Serialize};

use parade_common::{AuditError, AuditReport, AuditSettings};

/// Parent -> engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineRequest {
    RunAudit { url: String, settings: AuditSettings },
    /// Release resources and exit.
    Close,
}

/// Engine -> parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineResponse {
    Report { report: Box<AuditReport> },
    Error { message: String },
    /// Diagnostic output; never completes an audit.
    Log { level: String, message: String },
}

/// Serialize a message as one newline-terminated line.
pub fn encode_line<T: Serialize>(message: &T) -> serde_json::Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

pub fn decode_request(line: &str) -> serde_json::Result<EngineRequest> {
    serde_json::from_str(line.trim())
}

/// Decode a line from the engine; anything unrecognised is a malformed response.
pub fn decode_response(line: &str) -> Result<EngineResponse, AuditError> {
    serde_json::from_str(line.trim()).map_err(|e| {
        let mut preview: String = line.trim().chars().take(80).collect();
        if line.trim().chars().count() > 80 {
            preview.push_str("...");
        }
        AuditError::MalformedResponse(format!("{e} in '{preview}'"))
    })
}
