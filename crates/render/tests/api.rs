//! `RenderApi` against a local stub of the `/v1/videos` relay.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use storyreel_core::failure::FailureClass;
use storyreel_render::api::{RenderApi, RenderRequest};
use storyreel_render::error::RenderError;

// ---------------------------------------------------------------------------
// Stub server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
struct Field {
    name: String,
    file_name: Option<String>,
    content_type: Option<String>,
    data: Vec<u8>,
}

struct Stub {
    create_status: u16,
    create_reply: Value,
    forms: Mutex<Vec<Vec<Field>>>,
    auth: Mutex<Vec<String>>,
}

struct TestServer {
    base_url: String,
    stub: Arc<Stub>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(create_status: u16, create_reply: Value) -> Self {
        let stub = Arc::new(Stub {
            create_status,
            create_reply,
            forms: Mutex::new(Vec::new()),
            auth: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/v1/videos", post(create))
            .route("/v1/videos/{id}", get(status))
            .route("/v1/videos/{id}/content", get(content))
            .route("/frames/first.png", get(|| async { b"PNG".to_vec() }))
            .with_state(Arc::clone(&stub));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base_url,
            stub,
            handle,
        }
    }

    fn api(&self) -> RenderApi {
        RenderApi::new("relay-token", &self.base_url)
    }

    fn only_form(&self) -> Vec<Field> {
        let forms = self.stub.forms.lock().unwrap();
        assert_eq!(forms.len(), 1);
        forms[0].clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn create(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> (StatusCode, String) {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        stub.auth.lock().unwrap().push(auth.to_string());
    }
    let mut fields = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        fields.push(Field {
            name,
            file_name,
            content_type,
            data,
        });
    }
    stub.forms.lock().unwrap().push(fields);
    (
        StatusCode::from_u16(stub.create_status).unwrap(),
        stub.create_reply.to_string(),
    )
}

async fn status(Path(id): Path<String>) -> String {
    json!({"id": id, "status": "COMPLETED", "url": "https://cdn/v.mp4"}).to_string()
}

async fn content(Path(id): Path<String>) -> (StatusCode, Vec<u8>) {
    if id == "gone" {
        (StatusCode::NOT_FOUND, Vec::new())
    } else {
        (StatusCode::OK, b"MP4".to_vec())
    }
}

fn field<'a>(form: &'a [Field], name: &str) -> &'a Field {
    form.iter()
        .find(|f| f.name == name)
        .unwrap_or_else(|| panic!("no {name} field in {form:?}"))
}

fn text(form: &[Field], name: &str) -> String {
    String::from_utf8(field(form, name).data.clone()).unwrap()
}

fn request(image: Option<&str>) -> RenderRequest {
    RenderRequest {
        model: "sora-2".into(),
        prompt: "slow dolly in".into(),
        image: image.map(str::to_string),
        aspect_ratio: "9:16".into(),
        duration: "10s".into(),
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn create_task_sends_multipart_fields() {
    let server = TestServer::spawn(200, json!({"id": "task-9", "status": "queued"})).await;

    let id = server
        .api()
        .create_task(&request(Some("data:image/png;base64,QUJD")))
        .await
        .unwrap();

    assert_eq!(id, "task-9");
    let form = server.only_form();
    assert_eq!(text(&form, "model"), "sora-2");
    assert_eq!(text(&form, "prompt"), "slow dolly in");
    assert_eq!(text(&form, "seconds"), "10");
    assert_eq!(text(&form, "size"), "1080x1920");

    let reference = field(&form, "input_reference");
    assert_eq!(reference.file_name.as_deref(), Some("reference_image.png"));
    assert_eq!(reference.content_type.as_deref(), Some("image/png"));
    assert_eq!(reference.data, b"ABC");

    assert_eq!(
        server.stub.auth.lock().unwrap().clone(),
        vec!["Bearer relay-token".to_string()]
    );
}

#[tokio::test]
async fn create_task_without_image_has_no_attachment() {
    let server = TestServer::spawn(200, json!({"task_id": "t-1"})).await;

    let id = server.api().create_task(&request(None)).await.unwrap();

    assert_eq!(id, "t-1");
    let form = server.only_form();
    assert!(form.iter().all(|f| f.name != "input_reference"));
}

#[tokio::test]
async fn reference_url_is_fetched_and_attached() {
    let server = TestServer::spawn(200, json!({"ID": "t-2"})).await;
    let url = format!("{}/frames/first.png", server.base_url);

    server.api().create_task(&request(Some(&url))).await.unwrap();

    let form = server.only_form();
    assert_eq!(field(&form, "input_reference").data, b"PNG");
}

#[tokio::test]
async fn missing_task_id_is_a_submission_error() {
    let server = TestServer::spawn(200, json!({"status": "queued"})).await;

    let err = server.api().create_task(&request(None)).await.unwrap_err();

    assert_matches!(err, RenderError::MissingTaskId(ref body) if body.contains("queued"));
    assert_eq!(err.failure_class(), FailureClass::Transport);
}

#[tokio::test]
async fn non_success_uses_vendor_message() {
    let server = TestServer::spawn(422, json!({"error": {"message": "bad size"}})).await;

    let err = server.api().create_task(&request(None)).await.unwrap_err();

    assert_matches!(
        err,
        RenderError::ApiError { status: 422, ref message } if message == "bad size"
    );
}

#[tokio::test]
async fn unauthorized_submission_classifies_as_authentication() {
    let server = TestServer::spawn(401, json!({"message": "invalid token"})).await;

    let err = server.api().create_task(&request(None)).await.unwrap_err();

    assert_eq!(err.failure_class(), FailureClass::Authentication);
}

#[tokio::test]
async fn invalid_inline_image_fails_before_sending() {
    let server = TestServer::spawn(200, json!({"id": "never"})).await;

    let err = server
        .api()
        .create_task(&request(Some("data:image/png,raw")))
        .await
        .unwrap_err();

    assert_matches!(err, RenderError::InvalidImage(_));
    assert!(server.stub.forms.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Status and content
// ---------------------------------------------------------------------------

#[tokio::test]
async fn get_task_returns_raw_snapshot() {
    let server = TestServer::spawn(200, json!({})).await;

    let snapshot = server.api().get_task("t-5").await.unwrap();

    assert_eq!(snapshot["id"], "t-5");
    assert_eq!(snapshot["status"], "COMPLETED");
}

#[tokio::test]
async fn fetch_content_returns_bytes_or_none() {
    let server = TestServer::spawn(200, json!({})).await;
    let api = server.api();

    assert_eq!(api.fetch_content("t-5").await.unwrap(), Some(b"MP4".to_vec()));
    assert_eq!(api.fetch_content("gone").await.unwrap(), None);
}
