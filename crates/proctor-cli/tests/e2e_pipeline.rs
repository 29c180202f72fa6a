//! End-to-end pipeline tests: the real binary against a mock provider API.
//!
//! A wiremock server stands in for the provider endpoints; a registry file
//! points both providers at it via `base_url`.

use std::path::Path;

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const EXAM: &str = r#"{"index": 1, "question": "What is 2+2?", "answer": "4", "points": 5}
{"index": 2, "question": "Name the largest planet.", "answer": "Jupiter", "points": 10}
"#;

fn write_fixtures(dir: &Path, server_uri: &str) {
    std::fs::write(dir.join("exam.jsonl"), EXAM).unwrap();
    std::fs::write(
        dir.join("registry.json"),
        json!({
            "anthropic": {
                "provider": "anthropic",
                "models": ["test-student"],
                "api_key_env_var": "PROCTOR_E2E_KEY",
                "base_url": server_uri,
            },
            "openai": {
                "provider": "openai",
                "models": ["test-grader"],
                "api_key_env_var": "PROCTOR_E2E_KEY",
                "base_url": server_uri,
            },
        })
        .to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.join("student.json"),
        r#"{"model_name": "test-student", "system_prompt": "answer briefly"}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("grader.json"),
        r#"{"model_name": "test-grader"}"#,
    )
    .unwrap();
}

async fn mount_student(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "a studied answer"}],
            "model": "test-student-1",
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 30, "output_tokens": 8}
        })))
        .mount(server)
        .await;
}

async fn mount_grader(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "{\"grader_score\": 4, \"grader_justification\": \"close enough\"}"
                },
                "finish_reason": "stop",
                "index": 0
            }],
            "model": "test-grader-1",
            "usage": {"prompt_tokens": 60, "completion_tokens": 20}
        })))
        .mount(server)
        .await;
}

fn read_jsonl_records(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn student_phase_produces_full_outputs() {
    let server = MockServer::start().await;
    mount_student(&server).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path(), &server.uri());
    let out = dir.path().join("out");

    let dir_path = dir.path().to_path_buf();
    let out_clone = out.clone();
    tokio::task::spawn_blocking(move || {
        #[allow(deprecated)]
        Command::cargo_bin("proctor")
            .unwrap()
            .env("PROCTOR_E2E_KEY", "sk-test")
            .arg("run")
            .arg("--exam")
            .arg(dir_path.join("exam.jsonl"))
            .arg("--student-config")
            .arg(dir_path.join("student.json"))
            .arg("--registry")
            .arg(dir_path.join("registry.json"))
            .arg("--output")
            .arg(&out_clone)
            .assert()
            .success();
    })
    .await
    .unwrap();

    // every question got an answer, incrementally persisted
    let records = read_jsonl_records(&out.join("student.jsonl"));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["index"], 1);
    assert_eq!(records[0]["student_response"], "a studied answer");
    assert_eq!(records[0]["student_model_specified"], "test-student");
    assert_eq!(records[0]["student_model_used"], "test-student-1");
    assert_eq!(records[1]["student_input_tokens"], 30);

    assert!(out.join("student.csv").exists());
    assert!(out.join("student_config.json").exists());

    let manifest: Value =
        serde_json::from_str(&std::fs::read_to_string(out.join("manifest.json")).unwrap())
            .unwrap();
    assert_eq!(manifest["student_models"][0], "test-student");
    assert!(manifest["grader_model"].is_null());

    // one request per question, each carrying the accumulated history
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    let second: Value = serde_json::from_slice(&requests[1].body).unwrap();
    let messages = second["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["content"], "What is 2+2?");
    assert_eq!(messages[1]["content"], "a studied answer");
    assert_eq!(second["system"], "answer briefly");
}

#[tokio::test(flavor = "multi_thread")]
async fn grading_run_scores_every_row() {
    let server = MockServer::start().await;
    mount_student(&server).await;
    mount_grader(&server).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path(), &server.uri());
    let out = dir.path().join("out");

    let dir_path = dir.path().to_path_buf();
    let out_clone = out.clone();
    tokio::task::spawn_blocking(move || {
        #[allow(deprecated)]
        Command::cargo_bin("proctor")
            .unwrap()
            .env("PROCTOR_E2E_KEY", "sk-test")
            .arg("run")
            .arg("--exam")
            .arg(dir_path.join("exam.jsonl"))
            .arg("--student-config")
            .arg(dir_path.join("student.json"))
            .arg("--grading")
            .arg("--grader-config")
            .arg(dir_path.join("grader.json"))
            .arg("--registry")
            .arg(dir_path.join("registry.json"))
            .arg("--output")
            .arg(&out_clone)
            .assert()
            .success();
    })
    .await
    .unwrap();

    let records = read_jsonl_records(&out.join("student_graded.jsonl"));
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record["student_response"], "a studied answer");
        assert_eq!(record["grader_score"], 4.0);
        assert_eq!(record["grader_justification"], "close enough");
        assert_eq!(record["grader_model_specified"], "test-grader");
    }
    assert!(out.join("student_graded.csv").exists());
    assert!(out.join("grader_config.json").exists());

    // the grader prompt carries question, student response, key, and points
    let requests = server.received_requests().await.unwrap();
    let grader_requests: Vec<Value> = requests
        .iter()
        .filter(|r| r.url.path() == "/v1/chat/completions")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect();
    assert_eq!(grader_requests.len(), 2);
    let first_prompt = grader_requests[0]["messages"][0]["content"]
        .as_str()
        .unwrap();
    assert!(first_prompt.contains("Question: What is 2+2?"));
    assert!(first_prompt.contains("Student response: a studied answer"));
    assert!(first_prompt.contains("Answer key: 4"));
    assert!(first_prompt.contains("Total points available: 5"));
}

#[tokio::test(flavor = "multi_thread")]
async fn standalone_grade_command_reads_prior_output() {
    let server = MockServer::start().await;
    mount_student(&server).await;
    mount_grader(&server).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path(), &server.uri());
    let out = dir.path().join("out");

    // first a student-only run, then grade its CSV separately
    let dir_path = dir.path().to_path_buf();
    let out_clone = out.clone();
    tokio::task::spawn_blocking(move || {
        #[allow(deprecated)]
        Command::cargo_bin("proctor")
            .unwrap()
            .env("PROCTOR_E2E_KEY", "sk-test")
            .arg("run")
            .arg("--exam")
            .arg(dir_path.join("exam.jsonl"))
            .arg("--student-config")
            .arg(dir_path.join("student.json"))
            .arg("--registry")
            .arg(dir_path.join("registry.json"))
            .arg("--output")
            .arg(&out_clone)
            .assert()
            .success();

        #[allow(deprecated)]
        Command::cargo_bin("proctor")
            .unwrap()
            .env("PROCTOR_E2E_KEY", "sk-test")
            .arg("grade")
            .arg("--input")
            .arg(out_clone.join("student.csv"))
            .arg("--grader-config")
            .arg(dir_path.join("grader.json"))
            .arg("--registry")
            .arg(dir_path.join("registry.json"))
            .assert()
            .success();
    })
    .await
    .unwrap();

    let records = read_jsonl_records(&out.join("student_graded.jsonl"));
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["grader_score"], 4.0);
    assert_eq!(records[1]["grader_score"], 4.0);
    assert!(out.join("student_graded.csv").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_api_key_fails_before_any_request() {
    let server = MockServer::start().await;
    mount_student(&server).await;

    let dir = TempDir::new().unwrap();
    write_fixtures(dir.path(), &server.uri());

    let dir_path = dir.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        #[allow(deprecated)]
        Command::cargo_bin("proctor")
            .unwrap()
            .env_remove("PROCTOR_E2E_KEY")
            .arg("run")
            .arg("--exam")
            .arg(dir_path.join("exam.jsonl"))
            .arg("--student-config")
            .arg(dir_path.join("student.json"))
            .arg("--registry")
            .arg(dir_path.join("registry.json"))
            .arg("--output")
            .arg(dir_path.join("out"))
            .assert()
            .failure()
            .stderr(predicates::str::contains("PROCTOR_E2E_KEY"));
    })
    .await
    .unwrap();

    assert!(server.received_requests().await.unwrap().is_empty());
}
