use anyhow::{anyhow, Context, Result};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;
use tokio::sync::oneshot;
use tower_http::cors::CorsLayer;

use crate::caption_client::{CaptionClient, UploadFile};
use crate::clipboard::ClipboardWriter;
use crate::controller::{HistoryAction, Snapshot, SubmitForm, UploadController};
use crate::keywords::RowId;
use crate::main_ui_html::build_main_ui_html;

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const ROW_FIELD_PREFIX: &str = "row:";

pub struct AppState {
    pub controller: Mutex<UploadController>,
    pub client: CaptionClient,
    pub clipboard: Box<dyn ClipboardWriter>,
    pub server_port: AtomicU16,
}

type ApiResponse = (StatusCode, Json<Value>);

impl AppState {
    pub fn new(
        controller: UploadController,
        client: CaptionClient,
        clipboard: Box<dyn ClipboardWriter>,
    ) -> Self {
        Self {
            controller: Mutex::new(controller),
            client,
            clipboard,
            server_port: AtomicU16::new(0),
        }
    }
}

pub struct AppServer {
    port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl AppServer {
    pub fn start(state: Arc<AppState>, preferred_port: u16) -> Result<Self> {
        let listener = bind_listener(preferred_port)?;
        let port = listener
            .local_addr()
            .context("failed to inspect server local address")?
            .port();
        listener
            .set_nonblocking(true)
            .context("failed to set listener non-blocking")?;

        state.server_port.store(port, Ordering::Relaxed);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread_handle = thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build();
            let runtime = match runtime {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("failed to build server runtime: {err}");
                    return;
                }
            };

            runtime.block_on(async move {
                let listener = match tokio::net::TcpListener::from_std(listener) {
                    Ok(listener) => listener,
                    Err(err) => {
                        log::error!("failed to adopt listener: {err}");
                        return;
                    }
                };

                let app = build_router(state);
                let server = axum::serve(listener, app).with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                });
                if let Err(err) = server.await {
                    log::error!("server stopped with error: {err}");
                }
            });
        });

        log::info!("listening on http://127.0.0.1:{port}/");
        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
            thread_handle: Some(thread_handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Drop for AppServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Deserialize)]
struct FileChangeReq {
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoveRowReq {
    row_id: RowId,
}

fn build_router(state: Arc<AppState>) -> Router {
    let port = state.server_port.load(Ordering::Relaxed);
    let mut origins = vec![HeaderValue::from_static("null")];
    for host in ["127.0.0.1", "localhost"] {
        if let Ok(origin) = HeaderValue::from_str(&format!("http://{host}:{port}")) {
            origins.push(origin);
        }
    }

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(get_main_page))
        .route("/ping", get(get_ping))
        .route("/app/init", get(get_app_init))
        .route("/app/file-change", post(post_app_file_change))
        .route("/app/rows/add", post(post_app_add_row))
        .route("/app/rows/remove", post(post_app_remove_row))
        .route("/app/submit", post(post_app_submit))
        .route("/app/history-action", post(post_app_history_action))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES + 200_000))
        .layer(cors)
        .with_state(state)
}

async fn get_main_page() -> Html<String> {
    Html(build_main_ui_html())
}

async fn get_ping() -> ApiResponse {
    ok_json(json!({}))
}

async fn get_app_init(State(state): State<Arc<AppState>>) -> ApiResponse {
    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => controller.snapshot(Instant::now()),
        Err(response) => return response,
    };
    ok_snapshot(snapshot, None)
}

async fn post_app_file_change(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<FileChangeReq>,
) -> ApiResponse {
    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => {
            controller.file_changed(payload.file_name.as_deref());
            controller.snapshot(Instant::now())
        }
        Err(response) => return response,
    };
    ok_snapshot(snapshot, None)
}

async fn post_app_add_row(State(state): State<Arc<AppState>>) -> ApiResponse {
    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => {
            controller.add_row();
            controller.snapshot(Instant::now())
        }
        Err(response) => return response,
    };
    ok_snapshot(snapshot, None)
}

async fn post_app_remove_row(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RemoveRowReq>,
) -> ApiResponse {
    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => {
            controller.remove_row(payload.row_id);
            controller.snapshot(Instant::now())
        }
        Err(response) => return response,
    };
    ok_snapshot(snapshot, None)
}

async fn post_app_submit(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResponse {
    let form = match read_submit_form(&mut multipart).await {
        Ok(form) => form,
        Err(message) => return err_json(StatusCode::BAD_REQUEST, &message),
    };

    let submission = match lock_controller(&state) {
        Ok(mut controller) => match controller.begin_submission(form) {
            Some(submission) => submission,
            None => return ok_snapshot(controller.snapshot(Instant::now()), None),
        },
        Err(response) => return response,
    };

    // The request runs in its own task so the pending flag is cleared even
    // when the page drops this connection mid-flight.
    let task_state = state.clone();
    let request = tokio::spawn(async move {
        let result = task_state.client.submit(&submission).await;
        match task_state.controller.lock() {
            Ok(mut controller) => controller.finish_submission(submission, result),
            Err(_) => log::error!("controller lock poisoned, caption result dropped"),
        };
    });
    if let Err(err) = request.await {
        log::error!("caption request task failed: {err}");
        if let Ok(mut controller) = state.controller.lock() {
            controller.abandon_submission();
        }
    }

    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => controller.snapshot(Instant::now()),
        Err(response) => return response,
    };
    ok_snapshot(snapshot, None)
}

async fn post_app_history_action(
    State(state): State<Arc<AppState>>,
    Json(action): Json<HistoryAction>,
) -> ApiResponse {
    let copy = match lock_controller(&state) {
        Ok(mut controller) => controller.dispatch(action, Instant::now()),
        Err(response) => return response,
    };

    let mut alert = None;
    if let Some(copy) = copy {
        let task_state = state.clone();
        let text = copy.caption.clone();
        let result = tokio::task::spawn_blocking(move || task_state.clipboard.write_text(&text))
            .await
            .unwrap_or_else(|err| Err(anyhow!("clipboard task failed: {err}")));
        match lock_controller(&state) {
            Ok(mut controller) => alert = controller.complete_copy(copy, result, Instant::now()),
            Err(response) => return response,
        }
    }

    let snapshot = match lock_controller(&state) {
        Ok(mut controller) => controller.snapshot(Instant::now()),
        Err(response) => return response,
    };
    ok_snapshot(snapshot, alert)
}

async fn read_submit_form(multipart: &mut Multipart) -> std::result::Result<SubmitForm, String> {
    let mut form = SubmitForm::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return Err("invalid multipart request".to_string()),
        };

        let field_name = field.name().unwrap_or_default().to_string();
        if field_name == "file" {
            let file_name = field.file_name().unwrap_or_default().trim().to_string();
            let content_type = field.content_type().map(ToOwned::to_owned);
            let bytes = field
                .bytes()
                .await
                .map_err(|_| "invalid file".to_string())?;
            if file_name.is_empty() && bytes.is_empty() {
                continue;
            }
            if bytes.len() > MAX_UPLOAD_BYTES {
                return Err("file size exceeds 20MB".to_string());
            }
            form.file = Some(UploadFile {
                file_name,
                content_type,
                bytes: bytes.to_vec(),
            });
        } else if let Some(raw_id) = field_name.strip_prefix(ROW_FIELD_PREFIX) {
            let row_id = raw_id
                .trim()
                .parse::<RowId>()
                .map_err(|_| format!("invalid row id: {raw_id}"))?;
            let value = field
                .text()
                .await
                .map_err(|_| "invalid keyword".to_string())?;
            form.row_values.push((row_id, value));
        }
    }

    Ok(form)
}

fn lock_controller(
    state: &AppState,
) -> std::result::Result<MutexGuard<'_, UploadController>, ApiResponse> {
    state
        .controller
        .lock()
        .map_err(|_| err_json(StatusCode::INTERNAL_SERVER_ERROR, "controller lock error"))
}

fn ok_json(payload: Value) -> ApiResponse {
    let mut body = serde_json::Map::new();
    body.insert("ok".to_string(), Value::Bool(true));

    if let Some(obj) = payload.as_object() {
        for (key, value) in obj {
            body.insert(key.clone(), value.clone());
        }
    } else if !payload.is_null() {
        body.insert("data".to_string(), payload);
    }

    (StatusCode::OK, Json(Value::Object(body)))
}

fn ok_snapshot(snapshot: Snapshot, alert: Option<String>) -> ApiResponse {
    let mut payload = match serde_json::to_value(&snapshot) {
        Ok(value) => value,
        Err(err) => {
            return err_json(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("snapshot error: {err}"),
            )
        }
    };
    if let (Some(obj), Some(alert)) = (payload.as_object_mut(), alert) {
        obj.insert("alert".to_string(), Value::String(alert));
    }
    ok_json(payload)
}

fn err_json(status: StatusCode, message: &str) -> ApiResponse {
    (
        status,
        Json(json!({
            "ok": false,
            "error": message,
        })),
    )
}

fn bind_listener(preferred_port: u16) -> Result<TcpListener> {
    if preferred_port == 0 {
        return TcpListener::bind(("127.0.0.1", 0)).context("failed to bind server port");
    }

    for offset in 0..200u16 {
        let port = preferred_port.saturating_add(offset);
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
            return Ok(listener);
        }
    }

    Err(anyhow!("failed to bind server port"))
}
