//! Integration tests for the submit-then-poll job runner against a mocked
//! ComfyUI backend.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use comfymcp_comfyui::api::ComfyUIApi;
use comfymcp_comfyui::orchestrator::{JobError, JobRunner, PollConfig};
use comfymcp_core::template::JobTemplate;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROMPT_ID: &str = "3f2b9c1e-prompt";

fn template() -> JobTemplate {
    JobTemplate::from_value(json!({
        "3": { "class_type": "KSampler", "inputs": { "seed": 123456789012345u64, "steps": 20 } },
        "9": { "class_type": "SaveImage", "inputs": { "filename_prefix": "ComfyUI" } }
    }))
    .unwrap()
}

fn runner_for(server: &MockServer) -> JobRunner {
    JobRunner::new(
        Arc::new(ComfyUIApi::new(server.uri())),
        PollConfig {
            interval: Duration::from_millis(10),
            deadline: Some(Duration::from_secs(5)),
        },
    )
}

fn history(completed: bool, status_str: &str, outputs: Value) -> Value {
    json!({
        PROMPT_ID: {
            "status": { "completed": completed, "status_str": status_str, "messages": [] },
            "outputs": outputs
        }
    })
}

fn image_outputs() -> Value {
    json!({
        "9": { "images": [
            { "filename": "ComfyUI_00001_.png", "subfolder": "", "type": "output" },
            { "filename": "ComfyUI_00002_.png", "subfolder": "", "type": "output" }
        ] }
    })
}

async fn mount_submit_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/prompt"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "prompt_id": PROMPT_ID, "number": 4, "node_errors": {} })),
        )
        .expect(1)
        .mount(server)
        .await;
}

// ---------------------------------------------------------------------------
// Test: N pending polls then success -> N+1 polls, images from that output
// ---------------------------------------------------------------------------

#[tokio::test]
async fn polls_until_success_and_returns_images() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    let pending = 3;
    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(false, "running", json!({}))),
        )
        .up_to_n_times(pending)
        .expect(pending as u64)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(true, "success", image_outputs())),
        )
        .expect(1)
        .mount(&server)
        .await;

    let job = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await
        .expect("job should complete");

    assert_eq!(job.prompt_id, PROMPT_ID);
    assert_eq!(job.polls, pending as u32 + 1);
    assert_eq!(job.artifacts.len(), 2);
    assert_eq!(job.artifacts[0].filename, "ComfyUI_00001_.png");
    assert_eq!(job.artifacts[1].filename, "ComfyUI_00002_.png");
}

// ---------------------------------------------------------------------------
// Test: an empty history object means "not recorded yet", keep polling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_history_keeps_polling() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(true, "success", image_outputs())),
        )
        .expect(1)
        .mount(&server)
        .await;

    let job = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(job.polls, 3);
}

// ---------------------------------------------------------------------------
// Test: success without any images output -> NoArtifactsProduced
// ---------------------------------------------------------------------------

#[tokio::test]
async fn success_without_images_is_no_artifacts() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(history(
            true,
            "success",
            json!({ "12": { "text": ["only text"] } }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(result, Err(JobError::NoArtifactsProduced { prompt_id }) if prompt_id == PROMPT_ID);
}

// ---------------------------------------------------------------------------
// Test: non-2xx submission -> SubmissionFailed, zero polls
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submission_error_fails_without_polling() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/prompt"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"prompt_outputs_failed_validation"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(0)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(
        result,
        Err(JobError::SubmissionFailed { status: 400, body }) if body.contains("failed_validation")
    );
}

// ---------------------------------------------------------------------------
// Test: submission response without prompt_id -> MalformedResponse
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submission_without_prompt_id_is_malformed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/prompt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "number": 1 })))
        .expect(1)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(result, Err(JobError::MalformedResponse(_)));
}

// ---------------------------------------------------------------------------
// Test: non-2xx history -> PollFailed
// ---------------------------------------------------------------------------

#[tokio::test]
async fn history_error_is_poll_failed() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .expect(1)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(result, Err(JobError::PollFailed { status: 502, .. }));
}

// ---------------------------------------------------------------------------
// Test: backend-reported failure -> JobFailed with exception text
// ---------------------------------------------------------------------------

#[tokio::test]
async fn backend_failure_is_job_failed() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            PROMPT_ID: {
                "status": {
                    "completed": false,
                    "status_str": "error",
                    "messages": [["execution_error", {
                        "node_type": "CheckpointLoaderSimple",
                        "exception_message": "model not found"
                    }]]
                },
                "outputs": {}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(
        result,
        Err(JobError::JobFailed { status, detail: Some(detail), .. })
            if status == "error" && detail.contains("model not found")
    );
}

// ---------------------------------------------------------------------------
// Test: completed without the success marker -> JobFailed after one poll
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completed_without_success_is_job_failed() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(true, "interrupted", json!({}))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await;
    assert_matches!(
        result,
        Err(JobError::JobFailed { prompt_id, status, detail: None })
            if prompt_id == PROMPT_ID && status == "interrupted"
    );
}

// ---------------------------------------------------------------------------
// Test: outputs after the first image list are not interpreted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn later_outputs_do_not_affect_extraction() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(history(
            true,
            "success",
            json!({
                "9": { "images": [{ "filename": "a.png", "subfolder": "", "type": "output" }] },
                "20": { "images": "not-a-list" }
            }),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let job = runner_for(&server)
        .run_job(&template(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(job.artifacts.len(), 1);
    assert_eq!(job.artifacts[0].filename, "a.png");
}

// ---------------------------------------------------------------------------
// Test: a job stuck pending hits the deadline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stuck_job_hits_deadline() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(false, "running", json!({}))),
        )
        .mount(&server)
        .await;

    let runner = JobRunner::new(
        Arc::new(ComfyUIApi::new(server.uri())),
        PollConfig {
            interval: Duration::from_millis(10),
            deadline: Some(Duration::from_millis(150)),
        },
    );

    let result = runner.run_job(&template(), &CancellationToken::new()).await;
    assert_matches!(result, Err(JobError::DeadlineExceeded { .. }));
}

// ---------------------------------------------------------------------------
// Test: cancellation stops polling promptly
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancellation_stops_polling() {
    let server = MockServer::start().await;
    mount_submit_ok(&server).await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let runner = JobRunner::new(
        Arc::new(ComfyUIApi::new(server.uri())),
        PollConfig {
            interval: Duration::from_millis(10),
            deadline: None,
        },
    );

    let result = runner.run_job(&template(), &cancel).await;
    assert_matches!(result, Err(JobError::Cancelled));
}

// ---------------------------------------------------------------------------
// Test: request body carries the template and a fresh client_id per call
// ---------------------------------------------------------------------------

#[tokio::test]
async fn each_submission_uses_a_new_client_id() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/prompt"))
        .and(body_partial_json(json!({ "prompt": template().to_value() })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "prompt_id": PROMPT_ID })))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/api/history/{PROMPT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(history(true, "success", image_outputs())),
        )
        .mount(&server)
        .await;

    let runner = runner_for(&server);
    let cancel = CancellationToken::new();
    runner.run_job(&template(), &cancel).await.unwrap();
    runner.run_job(&template(), &cancel).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let client_ids: Vec<String> = requests
        .iter()
        .filter(|r| r.url.path() == "/api/prompt")
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["client_id"].as_str().unwrap().to_string()
        })
        .collect();

    assert_eq!(client_ids.len(), 2);
    assert_ne!(client_ids[0], client_ids[1]);
}
