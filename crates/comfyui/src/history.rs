//! Typed view of the ComfyUI history endpoint.
//!
//! `GET /api/history/{prompt_id}` returns an object keyed by prompt ID:
//!
//! ```json
//! {
//!   "<prompt_id>": {
//!     "status": { "completed": true, "status_str": "success", "messages": [...] },
//!     "outputs": { "9": { "images": [{ "filename": "...", "subfolder": "", "type": "output" }] } }
//!   }
//! }
//! ```
//!
//! The object is empty until the backend has finished (or failed) the job.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `status_str` reported for a successful job.
pub const STATUS_SUCCESS: &str = "success";

/// `status_str` reported for a failed job.
pub const STATUS_ERROR: &str = "error";

/// Message type carrying exception details inside `status.messages`.
const EXECUTION_ERROR_MESSAGE: &str = "execution_error";

/// A backend-produced output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// Storage type reported by the backend (`output`, `temp`, ...).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Where a job stands according to one history response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The backend has not recorded the job yet.
    Unknown,
    /// Recorded, but not finished.
    Pending,
    /// Finished, one way or the other.
    Completed(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure {
        status: String,
        /// Exception message from the backend, when it sent one.
        detail: Option<String>,
    },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryStatus {
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub status_str: String,
    /// `[message_type, payload]` pairs recorded during execution.
    #[serde(default)]
    pub messages: Vec<Value>,
}

/// One prompt's record in the history.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub status: HistoryStatus,
    /// Raw node outputs in the order the backend reported them. Only the
    /// `images` list of the first output carrying one is interpreted.
    #[serde(default)]
    pub outputs: IndexMap<String, Value>,
}

/// Find and parse the entry for `prompt_id` in a history response.
///
/// Returns `Ok(None)` while the backend has no record of the prompt.
pub fn parse_history(history: &Value, prompt_id: &str) -> Result<Option<HistoryEntry>, String> {
    let obj = history
        .as_object()
        .ok_or_else(|| format!("history response is not an object: {history}"))?;

    match obj.get(prompt_id) {
        None => Ok(None),
        Some(entry) => serde_json::from_value(entry.clone())
            .map(Some)
            .map_err(|e| format!("history entry for {prompt_id} has unexpected shape: {e}")),
    }
}

/// Status of `prompt_id` in a history response.
pub fn job_status(history: &Value, prompt_id: &str) -> Result<JobStatus, String> {
    Ok(parse_history(history, prompt_id)?
        .map(|entry| entry.job_status())
        .unwrap_or(JobStatus::Unknown))
}

impl HistoryEntry {
    /// Finished only on `completed` plus the success marker. A completed
    /// job with any other status, or an `error` status, is a failure.
    pub fn job_status(&self) -> JobStatus {
        let status = &self.status;
        if status.completed && status.status_str == STATUS_SUCCESS {
            JobStatus::Completed(Outcome::Success)
        } else if status.completed || status.status_str == STATUS_ERROR {
            JobStatus::Completed(Outcome::Failure {
                status: status.status_str.clone(),
                detail: self.error_detail(),
            })
        } else {
            JobStatus::Pending
        }
    }

    /// Artifacts of the first output (in reported order) that has an
    /// `images` list. Later outputs are never looked at.
    ///
    /// `Ok(None)` when no output has one; `Err` when the first one cannot
    /// be read as artifact references.
    pub fn artifacts(&self) -> Result<Option<Vec<ArtifactRef>>, String> {
        let first = self.outputs.iter().find_map(|(node_id, output)| {
            output
                .get("images")
                .filter(|images| !images.is_null())
                .map(|images| (node_id, images))
        });
        let Some((node_id, images)) = first else {
            return Ok(None);
        };
        serde_json::from_value(images.clone())
            .map(Some)
            .map_err(|e| format!("images of output {node_id} have unexpected shape: {e}"))
    }

    /// Exception text from the last `execution_error` message, if any.
    pub fn error_detail(&self) -> Option<String> {
        self.status.messages.iter().rev().find_map(|msg| {
            let pair = msg.as_array()?;
            if pair.first()?.as_str()? != EXECUTION_ERROR_MESSAGE {
                return None;
            }
            let payload = pair.get(1)?;
            let message = payload.get("exception_message")?.as_str()?.trim();
            let detail = match payload.get("node_type").and_then(Value::as_str) {
                Some(node_type) => format!("{node_type}: {message}"),
                None => message.to_string(),
            };
            Some(detail)
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn missing_entry_is_unknown() {
        assert_eq!(job_status(&json!({}), "abc").unwrap(), JobStatus::Unknown);
    }

    #[test]
    fn incomplete_entry_is_pending() {
        let history = json!({ "abc": { "status": { "completed": false, "status_str": "running" }, "outputs": {} } });
        assert_eq!(job_status(&history, "abc").unwrap(), JobStatus::Pending);
    }

    #[test]
    fn completed_success() {
        let history = json!({ "abc": { "status": { "completed": true, "status_str": "success" }, "outputs": {} } });
        assert_eq!(
            job_status(&history, "abc").unwrap(),
            JobStatus::Completed(Outcome::Success)
        );
    }

    #[test]
    fn error_status_fails_even_when_not_completed() {
        let history = json!({ "abc": { "status": {
            "completed": false,
            "status_str": "error",
            "messages": [
                ["execution_start", { "prompt_id": "abc" }],
                ["execution_error", { "node_type": "KSampler", "exception_message": "CUDA out of memory\n" }]
            ]
        } } });
        assert_eq!(
            job_status(&history, "abc").unwrap(),
            JobStatus::Completed(Outcome::Failure {
                status: "error".into(),
                detail: Some("KSampler: CUDA out of memory".into()),
            })
        );
    }

    #[test]
    fn completed_without_success_is_a_failure() {
        let history = json!({ "abc": { "status": { "completed": true, "status_str": "interrupted" } } });
        assert_eq!(
            job_status(&history, "abc").unwrap(),
            JobStatus::Completed(Outcome::Failure {
                status: "interrupted".into(),
                detail: None,
            })
        );
    }

    #[test]
    fn non_object_history_is_rejected() {
        assert!(job_status(&json!([]), "abc").is_err());
    }

    #[test]
    fn artifacts_come_from_first_output_with_images() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "status": { "completed": true, "status_str": "success" },
            "outputs": {
                "12": { "text": ["caption"] },
                "9": { "images": [{ "filename": "a.png", "subfolder": "", "type": "output" }] },
                "3": { "images": [{ "filename": "b.png", "subfolder": "x", "type": "temp" }] }
            }
        }))
        .unwrap();

        let artifacts = entry.artifacts().unwrap().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].filename, "a.png");
    }

    #[test]
    fn outputs_after_the_first_image_list_are_ignored() {
        let history = json!({ "p": {
            "status": { "completed": true, "status_str": "success" },
            "outputs": {
                "9": { "images": [{ "filename": "a.png", "subfolder": "", "type": "output" }] },
                "20": { "images": "not-a-list" },
                "21": 42
            }
        } });
        let entry = parse_history(&history, "p").unwrap().unwrap();

        let artifacts = entry.artifacts().unwrap().unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].filename, "a.png");
    }

    #[test]
    fn unreadable_first_image_list_is_an_error() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "outputs": {
                "7": { "images": null },
                "9": { "images": [{ "subfolder": "" }] }
            }
        }))
        .unwrap();
        let err = entry.artifacts().unwrap_err();
        assert!(err.contains("output 9"), "{err}");
    }

    #[test]
    fn artifacts_absent_without_images() {
        let entry: HistoryEntry = serde_json::from_value(json!({
            "outputs": { "12": { "text": ["caption"] } }
        }))
        .unwrap();
        assert_eq!(entry.artifacts().unwrap(), None);
    }
}
