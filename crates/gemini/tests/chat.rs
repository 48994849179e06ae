//! `ChatApi` against a local chat completions stub, and model routing.

use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use storyreel_core::failure::FailureClass;
use storyreel_gemini::api::SafetyPolicy;
use storyreel_gemini::cascade::{ContentGenerator, InvocationError};
use storyreel_gemini::chat::{ChatApi, ChatApiError, ModelRouter};
use storyreel_gemini::parts::ContentPart;

// ---------------------------------------------------------------------------
// Stub server
// ---------------------------------------------------------------------------

struct Stub {
    status: u16,
    reply: Value,
    seen: Mutex<Vec<(Option<String>, Value)>>,
}

struct TestServer {
    base_url: String,
    stub: Arc<Stub>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(status: u16, reply: Value) -> Self {
        let stub = Arc::new(Stub {
            status,
            reply,
            seen: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/v1/chat/completions", post(complete))
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

    fn api(&self) -> ChatApi {
        ChatApi::new("chat-token", format!("{}/", self.base_url))
    }

    fn seen(&self) -> Vec<(Option<String>, Value)> {
        self.stub.seen.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn complete(
    State(stub): State<Arc<Stub>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    stub.seen.lock().unwrap().push((auth, body));
    (StatusCode::from_u16(stub.status).unwrap(), Json(stub.reply.clone()))
}

fn choice(content: &str) -> Value {
    json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
}

// ---------------------------------------------------------------------------
// ChatApi
// ---------------------------------------------------------------------------

#[tokio::test]
async fn completion_sends_bearer_and_messages() {
    let server = TestServer::spawn(200, choice("a foggy pier")).await;

    let text = server
        .api()
        .generate(
            "gpt-4o",
            &[ContentPart::text("Describe"), ContentPart::text("shot 4")],
            SafetyPolicy::BlockNone,
        )
        .await
        .unwrap();

    assert_eq!(text, "a foggy pier");
    let seen = server.seen();
    assert_eq!(seen.len(), 1);
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer chat-token"));
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["messages"][1]["content"], "Describe\n\nshot 4");
    assert!(body.get("response_format").is_none());
}

#[tokio::test]
async fn json_generation_requests_json_object() {
    let server = TestServer::spawn(200, choice("{\"segments\":[]}")).await;

    server
        .api()
        .generate_json("deepseek-chat", &[ContentPart::text("Break down")], SafetyPolicy::Default)
        .await
        .unwrap();

    assert_eq!(server.seen()[0].1["response_format"]["type"], "json_object");
}

#[tokio::test]
async fn error_message_comes_from_body() {
    let server =
        TestServer::spawn(401, json!({"error": {"message": "Incorrect API key provided"}})).await;

    let err = server.api().complete("gpt-4o", "hi", false).await.unwrap_err();

    assert_matches!(
        err,
        ChatApiError::ApiError { status: 401, ref message } if message == "Incorrect API key provided"
    );
    let invocation = InvocationError::from(err);
    assert_eq!(invocation.class, FailureClass::Authentication);
    assert!(!invocation.class.triggers_cascade());
}

#[tokio::test]
async fn empty_choices_is_an_error() {
    let server = TestServer::spawn(200, json!({"choices": []})).await;
    let err = server.api().complete("gpt-4o", "hi", false).await.unwrap_err();
    assert_matches!(err, ChatApiError::NoChoices);
}

#[tokio::test]
async fn transport_errors_never_carry_the_token() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let err = ChatApi::new("chat-token", base_url)
        .complete("gpt-4o", "hi", false)
        .await
        .unwrap_err();

    assert_eq!(err.failure_class(), FailureClass::Transport);
    assert!(!err.to_string().contains("chat-token"));
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

struct Named {
    name: &'static str,
    calls: Mutex<Vec<(String, bool)>>,
}

impl Named {
    fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            calls: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ContentGenerator for Named {
    async fn generate(
        &self,
        model: &str,
        _parts: &[ContentPart],
        _safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        self.calls.lock().unwrap().push((model.to_string(), false));
        Ok(self.name.to_string())
    }

    async fn generate_json(
        &self,
        model: &str,
        _parts: &[ContentPart],
        _safety: SafetyPolicy,
    ) -> Result<String, InvocationError> {
        self.calls.lock().unwrap().push((model.to_string(), true));
        Ok(self.name.to_string())
    }
}

#[tokio::test]
async fn router_picks_backend_by_model_name() {
    let google = Named::new("google");
    let chat = Named::new("chat");
    let router = ModelRouter::new(google.clone(), chat.clone());
    let parts = [ContentPart::text("x")];

    assert_eq!(
        router.generate("gemini-2.5-pro", &parts, SafetyPolicy::Default).await.unwrap(),
        "google"
    );
    assert_eq!(
        router.generate("gpt-4o", &parts, SafetyPolicy::Default).await.unwrap(),
        "chat"
    );
    assert_eq!(
        router.generate_json("claude-sonnet", &parts, SafetyPolicy::Default).await.unwrap(),
        "chat"
    );

    assert_eq!(
        google.calls.lock().unwrap().clone(),
        vec![("gemini-2.5-pro".to_string(), false)]
    );
    assert_eq!(
        chat.calls.lock().unwrap().clone(),
        vec![("gpt-4o".to_string(), false), ("claude-sonnet".to_string(), true)]
    );
}
