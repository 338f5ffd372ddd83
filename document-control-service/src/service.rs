use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, Request, StatusCode, header},
    middleware::{Next, from_fn},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;
use wizard_flow::{FlowError, InMemorySessionStorage, SessionStorage};

use crate::{
    config::AppConfig,
    models::{SelectOperationRequest, SessionRecord, UploadedFile, VerifyDocumentRequest, WizardView},
    notifier::{SendError, SmtpNotifier},
    validation::ValidationError,
    workflow::{
        DocumentControlRunner, WizardAction, WizardError, create_flow_runner,
        spawn_session_sweeper,
    },
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

fn not_found_error(message: &str, id: &str) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": message,
            "session_id": id
        })),
    )
}

fn validation_error(error: &ValidationError) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
            "error": error.to_string(),
            "field": error.field()
        })),
    )
}

fn conflict_error(message: &str) -> ApiError {
    (StatusCode::CONFLICT, Json(json!({ "error": message })))
}

fn submission_error(status: StatusCode, message: &str) -> ApiError {
    (
        status,
        Json(json!({
            "error": message,
            "retryable": true
        })),
    )
}

fn internal_error(message: &str, details: &str) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": message,
            "details": details
        })),
    )
}

#[derive(Clone)]
pub struct AppState {
    pub flow_runner: DocumentControlRunner,
    pub stylesheet_path: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

/// Build the router and start the idle-session sweeper. Must run inside a Tokio runtime.
pub fn create_app(config: &AppConfig) -> Result<Router, SendError> {
    let app_state = create_app_state(config)?;
    spawn_session_sweeper(
        app_state.flow_runner.clone(),
        chrono::Duration::minutes(i64::from(config.session_idle_minutes)),
        SWEEP_INTERVAL,
    );
    Ok(build_router(app_state))
}

fn create_app_state(config: &AppConfig) -> Result<AppState, SendError> {
    let notifier = Arc::new(SmtpNotifier::new(config.mail.clone())?);
    let session_storage: Arc<dyn SessionStorage<SessionRecord>> =
        Arc::new(InMemorySessionStorage::<SessionRecord>::new());

    Ok(AppState {
        flow_runner: create_flow_runner(notifier, session_storage),
        stylesheet_path: config.stylesheet_path.clone(),
        max_upload_bytes: config.max_upload_bytes,
    })
}

pub fn build_router(app_state: AppState) -> Router {
    let body_limit = app_state.max_upload_bytes;
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/theme.css", get(theme_stylesheet))
        .route("/wizard", post(create_session))
        .route("/wizard/{session_id}", get(get_session))
        .route("/wizard/{session_id}/operation", post(select_operation))
        .route("/wizard/{session_id}/checklist", post(verify_document))
        .route("/wizard/{session_id}/submit", post(submit_documents))
        .route("/wizard/{session_id}/back", post(go_back))
        .route("/wizard/{session_id}/restart", post(start_over))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Middleware to add correlation ID to all requests
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Document Control Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Three-step document verification wizard that mails a PDF report",
        "endpoints": {
            "POST /wizard": "Start a new submission",
            "GET /wizard/{session_id}": "Current step and entered data",
            "POST /wizard/{session_id}/operation": "Step 1: choose the operation",
            "POST /wizard/{session_id}/checklist": "Step 2: document checklist and responsible person",
            "POST /wizard/{session_id}/submit": "Step 3: upload files (multipart field `files`) and send",
            "POST /wizard/{session_id}/back": "Return to the previous step",
            "POST /wizard/{session_id}/restart": "Discard the session data and start over",
            "GET /theme.css": "Optional form stylesheet",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Serves the configured stylesheet, or an empty one when it is missing.
async fn theme_stylesheet(State(state): State<AppState>) -> impl IntoResponse {
    let css = match &state.stylesheet_path {
        Some(path) => tokio::fs::read_to_string(path).await.unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Stylesheet unavailable, using default presentation");
            String::new()
        }),
        None => String::new(),
    };
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], css)
}

async fn create_session(State(state): State<AppState>) -> ApiResult<WizardView> {
    match state.flow_runner.start().await {
        Ok(session) => Ok(Json(WizardView::new(session.id, session.state))),
        Err(e) => {
            error!("Failed to create session: {}", e);
            Err(internal_error("Failed to create session", &e.to_string()))
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WizardView> {
    validate_session_id(&session_id)?;

    match state.flow_runner.get(&session_id).await {
        Ok(session) => Ok(Json(WizardView::new(session.id, session.state))),
        Err(e) => Err(flow_error_response(&session_id, e)),
    }
}

async fn select_operation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<SelectOperationRequest>,
) -> ApiResult<WizardView> {
    dispatch(&state, &session_id, WizardAction::SelectOperation(request)).await
}

async fn verify_document(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<VerifyDocumentRequest>,
) -> ApiResult<WizardView> {
    dispatch(&state, &session_id, WizardAction::VerifyDocument(request)).await
}

async fn submit_documents(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    multipart: Multipart,
) -> ApiResult<WizardView> {
    validate_session_id(&session_id)?;
    let files = read_uploads(multipart).await?;
    info!(session_id = %session_id, files = files.len(), "Processing submission");
    dispatch(&state, &session_id, WizardAction::Submit(files)).await
}

async fn go_back(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WizardView> {
    dispatch(&state, &session_id, WizardAction::Back).await
}

async fn start_over(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<WizardView> {
    dispatch(&state, &session_id, WizardAction::StartOver).await
}

fn validate_session_id(session_id: &str) -> Result<(), ApiError> {
    if Uuid::parse_str(session_id).is_err() {
        return Err(bad_request_error("Invalid session ID format"));
    }
    Ok(())
}

async fn dispatch(state: &AppState, session_id: &str, action: WizardAction) -> ApiResult<WizardView> {
    validate_session_id(session_id)?;
    let action_name = action.name();

    match state.flow_runner.dispatch(session_id, action).await {
        Ok(outcome) => {
            info!(
                session_id = %session_id,
                action = action_name,
                step = outcome.session.state.step.number(),
                "Action applied"
            );
            Ok(Json(
                WizardView::new(outcome.session.id, outcome.session.state)
                    .with_message(outcome.response),
            ))
        }
        Err(e) => Err(flow_error_response(session_id, e)),
    }
}

fn flow_error_response(session_id: &str, error: FlowError<WizardError>) -> ApiError {
    match error {
        FlowError::SessionNotFound(_) => not_found_error("Session not found", session_id),
        FlowError::Storage(e) => {
            error!(session_id = %session_id, error = %e, "Failed to access session");
            internal_error("Failed to access session", &e.to_string())
        }
        FlowError::Workflow(WizardError::Validation(e)) => {
            info!(session_id = %session_id, field = e.field(), "Validation failed: {}", e);
            validation_error(&e)
        }
        FlowError::Workflow(e @ WizardError::OutOfStep { .. }) => conflict_error(&e.to_string()),
        FlowError::Workflow(WizardError::Render(e)) => {
            error!(session_id = %session_id, error = %e, "Report generation failed");
            submission_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to generate report")
        }
        FlowError::Workflow(WizardError::Send(e)) => {
            error!(session_id = %session_id, error = %e, "Report delivery failed");
            submission_error(StatusCode::BAD_GATEWAY, "Failed to send report")
        }
    }
}

/// Collect every part of the `files` field. Parts without a file name (an
/// empty picker) are skipped.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request_error(&format!("Invalid multipart body: {e}")))?
    {
        if field.name() != Some("files") {
            continue;
        }
        let Some(file_name) = field.file_name().map(base_name).filter(|n| !n.is_empty()) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| bad_request_error(&format!("Failed to read {file_name}: {e}")))?;

        files.push(UploadedFile::new(file_name, content_type.as_deref(), bytes.to_vec()));
    }

    Ok(files)
}

/// Browsers may send a full client-side path; keep only the last component.
fn base_name(file_name: &str) -> String {
    file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordingNotifier, png};
    use axum::body::Body;
    use tower::ServiceExt;

    const BOUNDARY: &str = "document-control-boundary";

    fn test_app() -> (Router, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let storage: Arc<dyn SessionStorage<SessionRecord>> =
            Arc::new(InMemorySessionStorage::<SessionRecord>::new());
        let state = AppState {
            flow_runner: create_flow_runner(notifier.clone(), storage),
            stylesheet_path: None,
            max_upload_bytes: 10 * 1024 * 1024,
        };
        (build_router(state), notifier)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn post_empty(uri: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    fn post_files(uri: &str, files: &[(&str, &str, Vec<u8>)]) -> Request<Body> {
        let mut body = Vec::new();
        for (name, content_type, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn new_session(app: &Router) -> String {
        let (status, body) = send(app, post_empty("/wizard")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], 1);
        body["session_id"].as_str().unwrap().to_string()
    }

    async fn reach_upload_step(app: &Router, id: &str) {
        let (status, body) = send(
            app,
            post_json(
                &format!("/wizard/{id}/operation"),
                json!({ "operation": "DSM" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], 2);

        let (status, body) = send(
            app,
            post_json(
                &format!("/wizard/{id}/checklist"),
                json!({ "responsibility_ack": true, "responsible_name": "Ana" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], 3);
    }

    #[tokio::test]
    async fn http_cycle_sends_report_and_restarts() {
        let (app, notifier) = test_app();
        let id = new_session(&app).await;
        reach_upload_step(&app, &id).await;

        let (status, body) = send(
            &app,
            post_files(
                &format!("/wizard/{id}/submit"),
                &[
                    ("foto.png", "image/png", png(32, 16)),
                    ("nota.pdf", "application/pdf", b"%PDF-1.4".to_vec()),
                ],
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["record"]["submission_complete"], true);
        assert_eq!(body["record"]["receipt"]["file_count"], 2);
        assert_eq!(
            body["record"]["receipt"]["file_names"],
            json!(["foto.png", "nota.pdf"])
        );

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].report_contains(b"DSM"));
        assert!(sent[0].report_contains(b"application/pdf"));

        let (status, body) = send(&app, post_empty(&format!("/wizard/{id}/restart"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], 1);
        assert_eq!(body["record"]["operation_name"], "");
        assert_eq!(body["record"]["responsible_name"], "");
    }

    #[tokio::test]
    async fn validation_errors_name_the_field() {
        let (app, _) = test_app();
        let id = new_session(&app).await;

        let (status, body) = send(
            &app,
            post_json(
                &format!("/wizard/{id}/operation"),
                json!({ "operation": "OUTROS", "custom_operation_note": "  " }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "custom_operation_note");

        let (_, body) = send(
            &app,
            Request::builder()
                .uri(format!("/wizard/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["step"], 1);
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let (app, notifier) = test_app();
        let id = new_session(&app).await;
        reach_upload_step(&app, &id).await;

        // what a browser sends when the picker is left empty
        let files = [("", "application/octet-stream", Vec::new())];
        let (status, body) = send(&app, post_files(&format!("/wizard/{id}/submit"), &files)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["field"], "files");
        assert_eq!(notifier.attempts(), 0);
    }

    #[tokio::test]
    async fn delivery_failure_keeps_the_session_for_retry() {
        let (app, notifier) = test_app();
        let id = new_session(&app).await;
        reach_upload_step(&app, &id).await;

        notifier.fail_next_sends(true);
        let files = [("foto.png", "image/png", png(8, 8))];
        let (status, body) = send(&app, post_files(&format!("/wizard/{id}/submit"), &files)).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["retryable"], true);

        let (_, body) = send(
            &app,
            Request::builder()
                .uri(format!("/wizard/{id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(body["step"], 3);
        assert_eq!(body["record"]["submission_complete"], false);

        notifier.fail_next_sends(false);
        let (status, _) = send(&app, post_files(&format!("/wizard/{id}/submit"), &files)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn out_of_step_actions_conflict() {
        let (app, _) = test_app();
        let id = new_session(&app).await;

        let (status, _) = send(
            &app,
            post_json(
                &format!("/wizard/{id}/checklist"),
                json!({ "responsibility_ack": true, "responsible_name": "Ana" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn session_ids_are_checked() {
        let (app, _) = test_app();

        let (status, _) = send(&app, post_empty("/wizard/not-a-uuid/back")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            post_empty(&format!("/wizard/{}/back", Uuid::new_v4())),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found");
    }

    #[tokio::test]
    async fn missing_stylesheet_degrades_to_empty_css() {
        let (app, _) = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/theme.css")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/css; charset=utf-8"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(body.is_empty());
    }

    #[test]
    fn base_name_strips_client_paths() {
        assert_eq!(base_name("C:\\fakepath\\nota.pdf"), "nota.pdf");
        assert_eq!(base_name("/home/ana/foto.png"), "foto.png");
        assert_eq!(base_name("foto.png"), "foto.png");
    }
}
