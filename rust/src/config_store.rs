use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use toml::map::Map;
use toml::Value;

use crate::caption_client::DEFAULT_CAPTION_ENDPOINT;
use crate::caption_text::{CaptionCleaner, DEFAULT_PREFIXES};
use crate::controller::ControllerSettings;

const DEFAULT_REQUEST_TIMEOUT_SEC: f64 = 60.0;
const MAX_REQUEST_TIMEOUT_SEC: f64 = 86_400.0;

#[derive(Debug)]
pub struct ConfigStore {
    pub path: PathBuf,
    doc: Value,
}

impl ConfigStore {
    /// Loads the TOML config, creating it with defaults when missing.
    pub fn new(path: PathBuf) -> Result<Self> {
        let doc = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse TOML: {}", path.display()))?
        } else {
            log::info!("config not found, writing defaults to {}", path.display());
            Value::Table(Map::new())
        };

        let mut store = Self { path, doc };
        store.normalize_doc();
        store.save()?;
        Ok(store)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create config dir: {}", parent.display()))?;
        }
        let serialized = toml::to_string_pretty(&self.doc).context("failed to serialize TOML")?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("failed to write config: {}", self.path.display()))
    }

    pub fn caption_endpoint(&self) -> String {
        self.app_table()
            .and_then(|t| t.get("caption_endpoint"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_CAPTION_ENDPOINT)
            .to_string()
    }

    pub fn server_port(&self) -> u16 {
        self.app_table()
            .and_then(|t| t.get("server_port"))
            .and_then(value_to_i64)
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(3000)
    }

    pub fn request_timeout(&self) -> Duration {
        self.app_table()
            .and_then(|t| t.get("request_timeout_sec"))
            .and_then(timeout_secs)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .unwrap_or(Duration::from_secs(60))
    }

    pub fn copy_feedback(&self) -> Duration {
        let millis = self
            .app_table()
            .and_then(|t| t.get("copy_feedback_ms"))
            .and_then(value_to_i64)
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(2000);
        Duration::from_millis(millis)
    }

    pub fn initial_keyword_rows(&self) -> usize {
        self.app_table()
            .and_then(|t| t.get("initial_keyword_rows"))
            .and_then(value_to_i64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(1)
    }

    pub fn caption_cleaner(&self) -> CaptionCleaner {
        CaptionCleaner::new(strings_from_value(
            self.cleanup_table().and_then(|t| t.get("prefixes")),
        ))
    }

    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            initial_rows: self.initial_keyword_rows(),
            copy_feedback: self.copy_feedback(),
            cleaner: self.caption_cleaner(),
        }
    }

    fn normalize_doc(&mut self) {
        if !self.doc.is_table() {
            self.doc = Value::Table(Map::new());
        }

        {
            let app = ensure_table_mut(self.root_table_mut(), "app");

            let endpoint = app
                .get("caption_endpoint")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .unwrap_or(DEFAULT_CAPTION_ENDPOINT)
                .to_string();
            app.insert("caption_endpoint".to_string(), Value::String(endpoint));

            let port = app
                .get("server_port")
                .and_then(value_to_i64)
                .filter(|v| (1..=65_535).contains(v))
                .unwrap_or(3000);
            app.insert("server_port".to_string(), Value::Integer(port));

            let timeout = app
                .get("request_timeout_sec")
                .and_then(timeout_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SEC);
            app.insert("request_timeout_sec".to_string(), Value::Float(timeout));

            let copy_feedback = app
                .get("copy_feedback_ms")
                .and_then(value_to_i64)
                .filter(|v| *v >= 0)
                .unwrap_or(2000);
            app.insert("copy_feedback_ms".to_string(), Value::Integer(copy_feedback));

            let rows = app
                .get("initial_keyword_rows")
                .and_then(value_to_i64)
                .filter(|v| *v >= 0)
                .unwrap_or(1);
            app.insert("initial_keyword_rows".to_string(), Value::Integer(rows));
        }

        {
            let cleanup = ensure_table_mut(self.root_table_mut(), "cleanup");
            let prefixes = match cleanup.get("prefixes") {
                Some(value @ Value::Array(_)) => strings_from_value(Some(value)),
                _ => DEFAULT_PREFIXES.iter().map(|v| v.to_string()).collect(),
            };
            cleanup.insert("prefixes".to_string(), strings_to_value(&prefixes));
        }
    }

    fn app_table(&self) -> Option<&Map<String, Value>> {
        self.doc
            .as_table()
            .and_then(|root| root.get("app"))
            .and_then(Value::as_table)
    }

    fn cleanup_table(&self) -> Option<&Map<String, Value>> {
        self.doc
            .as_table()
            .and_then(|root| root.get("cleanup"))
            .and_then(Value::as_table)
    }

    fn root_table_mut(&mut self) -> &mut Map<String, Value> {
        if !self.doc.is_table() {
            self.doc = Value::Table(Map::new());
        }
        match &mut self.doc {
            Value::Table(root) => root,
            _ => unreachable!("root is a table after normalization"),
        }
    }
}

fn ensure_table_mut<'a>(root: &'a mut Map<String, Value>, key: &str) -> &'a mut Map<String, Value> {
    let value = root
        .entry(key.to_string())
        .or_insert_with(|| Value::Table(Map::new()));
    if !value.is_table() {
        *value = Value::Table(Map::new());
    }
    match value {
        Value::Table(table) => table,
        _ => unreachable!("value is a table after normalization"),
    }
}

/// Trimmed, non-empty, de-duplicated strings in their original order.
fn strings_from_value(value: Option<&Value>) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::new();
    if let Some(Value::Array(items)) = value {
        for item in items {
            let Some(text) = item.as_str().map(str::trim) else {
                continue;
            };
            if !text.is_empty() && !normalized.iter().any(|existing| existing == text) {
                normalized.push(text.to_string());
            }
        }
    }
    normalized
}

fn strings_to_value(values: &[String]) -> Value {
    Value::Array(values.iter().cloned().map(Value::String).collect())
}

fn value_to_f64(value: &Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
        .or_else(|| value.as_str().and_then(|v| v.parse::<f64>().ok()))
}

/// Positive, finite timeout in seconds, capped at one day.
fn timeout_secs(value: &Value) -> Option<f64> {
    value_to_f64(value).filter(|v| v.is_finite() && *v > 0.0 && *v <= MAX_REQUEST_TIMEOUT_SEC)
}

fn value_to_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .or_else(|| value.as_float().map(|v| v as i64))
        .or_else(|| value.as_str().and_then(|v| v.parse::<i64>().ok()))
}
