//! JSON envelopes spoken by the job services.
//!
//! Responses come either bare (`{jobId}`, `{stage, percent, message}`) or
//! wrapped as `{success, data, message}`. The subtitle service reports
//! `status: queued|running|done|error` with `progress` instead of
//! `stage`/`percent`; both dialects normalize to [`RemoteStatus`].

use serde::Deserialize;
use serde_json::Value;

use super::{GatewayError, RemoteStatus};

#[derive(Debug, Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedJob {
    #[serde(alias = "job_id", alias = "id")]
    job_id: Value,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
}

/// Strip a `{success, data}` envelope, turning `success: false` into a rejection.
pub fn unwrap_envelope(body: Value) -> Result<Value, GatewayError> {
    let wrapped = body
        .as_object()
        .is_some_and(|obj| obj.get("success").is_some_and(Value::is_boolean));
    if !wrapped {
        return Ok(body);
    }

    let envelope: Envelope =
        serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
    if !envelope.success {
        return Err(GatewayError::Rejected {
            message: envelope
                .message
                .unwrap_or_else(|| "request rejected".to_string()),
        });
    }
    Ok(envelope.data.unwrap_or(Value::Null))
}

pub fn parse_created(body: Value) -> Result<String, GatewayError> {
    let data = unwrap_envelope(body)?;
    let created: CreatedJob = serde_json::from_value(data)
        .map_err(|e| GatewayError::Decode(format!("job creation response: {}", e)))?;

    match created.job_id {
        Value::String(id) if !id.trim().is_empty() => Ok(id),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(GatewayError::Decode(format!("unusable job id {}", other))),
    }
}

pub fn parse_status(body: Value) -> Result<RemoteStatus, GatewayError> {
    let data = unwrap_envelope(body)?;
    let status: StatusBody = serde_json::from_value(data)
        .map_err(|e| GatewayError::Decode(format!("job status response: {}", e)))?;

    let marker = status
        .stage
        .or(status.status)
        .ok_or_else(|| GatewayError::Decode("job status carries neither stage nor status".into()))?;

    match marker.to_ascii_lowercase().as_str() {
        "complete" | "completed" | "done" | "success" => Ok(RemoteStatus::Complete {
            result: status.result.filter(|v| !v.is_null()),
        }),
        "error" | "failed" | "failure" => Ok(RemoteStatus::Failed {
            error: status
                .error
                .as_ref()
                .map(error_message)
                .or(status.message)
                .unwrap_or_else(|| "remote job failed".to_string()),
        }),
        _ => {
            let percent = status.percent.or(status.progress).unwrap_or(0.0);
            Ok(RemoteStatus::Running {
                percent: percent.clamp(0.0, 100.0).round() as u8,
                message: status.message.unwrap_or(marker),
            })
        }
    }
}

pub fn parse_result(body: Value) -> Result<Value, GatewayError> {
    let data = unwrap_envelope(body)?;
    if data.is_null() {
        return Err(GatewayError::Decode("result response is empty".to_string()));
    }
    Ok(data)
}

fn error_message(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn created_job_bare_and_wrapped() {
        assert_eq!(parse_created(json!({"jobId": "j-1"})).unwrap(), "j-1");
        assert_eq!(
            parse_created(json!({"success": true, "data": {"jobId": "j-2", "status": "queued"}}))
                .unwrap(),
            "j-2"
        );
        assert_eq!(parse_created(json!({"id": 42})).unwrap(), "42");
    }

    #[test]
    fn failed_envelope_is_a_rejection() {
        let err = parse_created(json!({"success": false, "message": "unsupported platform"}))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Rejected { message } if message == "unsupported platform"));
    }

    #[test]
    fn running_status_in_both_dialects() {
        assert_eq!(
            parse_status(json!({"stage": "visual", "percent": 41.6, "message": "OCR"})).unwrap(),
            RemoteStatus::Running {
                percent: 42,
                message: "OCR".into()
            }
        );
        assert_eq!(
            parse_status(json!({"success": true, "data": {"status": "running", "progress": 10}}))
                .unwrap(),
            RemoteStatus::Running {
                percent: 10,
                message: "running".into()
            }
        );
    }

    #[test]
    fn terminal_statuses() {
        assert_eq!(
            parse_status(json!({"status": "done", "result": {"subtitle": "", "format": "srt"}}))
                .unwrap(),
            RemoteStatus::Complete {
                result: Some(json!({"subtitle": "", "format": "srt"}))
            }
        );
        assert_eq!(
            parse_status(json!({"stage": "complete"})).unwrap(),
            RemoteStatus::Complete { result: None }
        );
        assert_eq!(
            parse_status(json!({"stage": "error", "error": {"message": "no audio track"}}))
                .unwrap(),
            RemoteStatus::Failed {
                error: "no audio track".into()
            }
        );
    }

    #[test]
    fn status_without_marker_is_undecodable() {
        let err = parse_status(json!({"percent": 5})).unwrap_err();
        assert!(matches!(err, GatewayError::Decode(_)));
    }
}
