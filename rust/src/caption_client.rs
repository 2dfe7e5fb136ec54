use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;

use crate::error::RequestError;

pub const DEFAULT_CAPTION_ENDPOINT: &str = "http://localhost:5000/gerar_legenda";

#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// One validated request: a file plus at least one trimmed keyword.
#[derive(Debug, Clone)]
pub struct Submission {
    pub file: UploadFile,
    pub keywords: Vec<String>,
}

/// Success-body fields holding the caption, in lookup order.
const CAPTION_FIELDS: [&str; 2] = ["legenda", "caption"];

#[derive(Clone)]
pub struct CaptionClient {
    http: reqwest::Client,
    endpoint: String,
}

impl CaptionClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            endpoint: endpoint.trim().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn submit(&self, submission: &Submission) -> Result<String, RequestError> {
        let form = build_form(submission);
        log::info!(
            "requesting caption for {} with {} keyword(s)",
            submission.file.file_name,
            submission.keywords.len()
        );

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|err| {
                log::error!("caption request failed: {err}");
                RequestError::from_reqwest(&err)
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RequestError::from_reqwest(&err))?;

        if !status.is_success() {
            let message = error_message_from_body(status, &body);
            log::warn!("caption service returned {status}: {message}");
            return Err(RequestError::Server(message));
        }

        parse_success_body(&body)
    }
}

fn build_form(submission: &Submission) -> Form {
    let file = &submission.file;
    let part = Part::bytes(file.bytes.clone()).file_name(file.file_name.clone());
    let part = match file.content_type.as_deref() {
        Some(mime) => match part.mime_str(mime) {
            Ok(part) => part,
            Err(_) => Part::bytes(file.bytes.clone()).file_name(file.file_name.clone()),
        },
        None => part,
    };

    let mut form = Form::new().part("file", part);
    for keyword in &submission.keywords {
        form = form.text("keywords", keyword.clone());
    }
    form
}

/// Message for a non-success response: JSON `error`, then JSON `message`,
/// then the raw text, then a generic status line.
fn error_message_from_body(status: StatusCode, body: &str) -> String {
    let fallback = format!("HTTP error {}", status.as_u16());
    match serde_json::from_str::<Value>(body) {
        Ok(json) => json
            .get("error")
            .and_then(message_from_value)
            .or_else(|| json.get("message").and_then(message_from_value))
            .unwrap_or(fallback),
        Err(_) => {
            if body.is_empty() {
                fallback
            } else {
                body.to_string()
            }
        }
    }
}

fn parse_success_body(body: &str) -> Result<String, RequestError> {
    let parsed: Value = serde_json::from_str(body)
        .map_err(|err| RequestError::InvalidResponse(err.to_string()))?;

    if let Some(message) = parsed.get("error").and_then(message_from_value) {
        return Err(RequestError::Server(message));
    }

    CAPTION_FIELDS
        .iter()
        .find_map(|field| parsed.get(*field).and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| RequestError::InvalidResponse("missing caption field".to_string()))
}

fn message_from_value(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(text) if text.is_empty() => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::{error_message_from_body, parse_success_body, CaptionClient, Submission, UploadFile};
    use crate::error::RequestError;
    use axum::extract::Multipart;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;
    use std::time::Duration;

    async fn spawn_mock(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock");
        let addr = listener.local_addr().expect("mock addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/gerar_legenda")
    }

    fn submission(keywords: &[&str]) -> Submission {
        Submission {
            file: UploadFile {
                file_name: "dog.png".to_string(),
                content_type: Some("image/png".to_string()),
                bytes: vec![0x89, 0x50, 0x4e, 0x47],
            },
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    async fn echo_fields(mut multipart: Multipart) -> Json<serde_json::Value> {
        let mut file_name = String::new();
        let mut file_len = 0;
        let mut keywords = Vec::new();
        while let Some(field) = multipart.next_field().await.expect("field") {
            let field_name = field.name().unwrap_or_default().to_string();
            match field_name.as_str() {
                "file" => {
                    file_name = field.file_name().unwrap_or_default().to_string();
                    file_len = field.bytes().await.expect("file bytes").len();
                }
                "keywords" => keywords.push(field.text().await.expect("keyword")),
                _ => {}
            }
        }
        Json(json!({
            "legenda": format!("{file_name}:{file_len}:{}", keywords.join("|"))
        }))
    }

    fn client(endpoint: &str) -> CaptionClient {
        CaptionClient::new(endpoint, Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn submit_sends_file_and_repeated_keywords() {
        let endpoint = spawn_mock(Router::new().route("/gerar_legenda", post(echo_fields))).await;

        let caption = client(&endpoint)
            .submit(&submission(&["praia", "cachorro"]))
            .await
            .expect("caption");
        assert_eq!(caption, "dog.png:4:praia|cachorro");
    }

    #[tokio::test]
    async fn submit_surfaces_json_error_on_bad_status() {
        let router = Router::new().route(
            "/gerar_legenda",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Nenhum arquivo selecionado" })),
                )
            }),
        );
        let endpoint = spawn_mock(router).await;

        let err = client(&endpoint)
            .submit(&submission(&["a"]))
            .await
            .expect_err("bad status");
        assert_eq!(err, RequestError::Server("Nenhum arquivo selecionado".to_string()));
    }

    #[tokio::test]
    async fn submit_treats_error_field_on_success_as_failure() {
        let router = Router::new().route(
            "/gerar_legenda",
            post(|| async { Json(json!({ "error": "Cota da API excedida." })) }),
        );
        let endpoint = spawn_mock(router).await;

        let err = client(&endpoint)
            .submit(&submission(&["a"]))
            .await
            .expect_err("error field");
        assert_eq!(err.to_string(), "Cota da API excedida.");
    }

    #[tokio::test]
    async fn submit_reports_unreachable_server() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe");
            listener.local_addr().expect("probe addr").port()
        };
        let endpoint = format!("http://127.0.0.1:{port}/gerar_legenda");

        let err = client(&endpoint)
            .submit(&submission(&["a"]))
            .await
            .expect_err("nothing listens");
        assert_eq!(err, RequestError::Unreachable);
    }

    #[test]
    fn error_message_prefers_error_then_message() {
        assert_eq!(
            error_message_from_body(StatusCode::BAD_REQUEST, r#"{"error":"e","message":"m"}"#),
            "e"
        );
        assert_eq!(
            error_message_from_body(StatusCode::BAD_REQUEST, r#"{"error":"","message":"m"}"#),
            "m"
        );
        assert_eq!(
            error_message_from_body(StatusCode::NOT_FOUND, r#"{"detail":"x"}"#),
            "HTTP error 404"
        );
    }

    #[test]
    fn error_message_falls_back_to_text_then_status() {
        assert_eq!(
            error_message_from_body(StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            "boom"
        );
        assert_eq!(
            error_message_from_body(StatusCode::BAD_GATEWAY, ""),
            "HTTP error 502"
        );
    }

    #[test]
    fn success_body_requires_caption() {
        assert_eq!(
            parse_success_body(r#"{"legenda":"Legenda: oi"}"#).expect("caption"),
            "Legenda: oi"
        );
        assert_eq!(
            parse_success_body(r#"{"caption":"hi"}"#).expect("caption alias"),
            "hi"
        );
        assert_eq!(
            parse_success_body(r#"{"legenda":"oi","caption":"hi"}"#).expect("both fields"),
            "oi"
        );
        assert_eq!(
            parse_success_body(r#"{"legenda":null,"caption":"hi"}"#).expect("null legenda"),
            "hi"
        );
        assert!(matches!(
            parse_success_body("{}"),
            Err(RequestError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_success_body("not json"),
            Err(RequestError::InvalidResponse(_))
        ));
    }
}
