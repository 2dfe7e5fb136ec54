use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{Local, NaiveDateTime};
use html_escape::{encode_double_quoted_attribute, encode_text};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};

pub const COPY_LABEL: &str = "Copy caption";
pub const COPIED_LABEL: &str = "Copied!";
pub const DELETE_LABEL: &str = "Delete";

#[derive(Debug, Clone, Serialize)]
pub struct CaptionEntry {
    pub id: String,
    pub image_data_url: String,
    pub caption: String,
    #[serde(skip)]
    pub copied_until: Option<Instant>,
}

impl CaptionEntry {
    pub fn is_copy_locked(&self, now: Instant) -> bool {
        self.copied_until.is_some_and(|until| now < until)
    }
}

/// In-memory caption history, newest first. Nothing is persisted.
#[derive(Debug, Default)]
pub struct CaptionHistory {
    entries: Vec<CaptionEntry>,
    next_seq: u64,
}

impl CaptionHistory {
    pub fn entries(&self) -> &[CaptionEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn prepend(&mut self, image_data_url: String, caption: String) -> &CaptionEntry {
        let id = self.next_entry_id(Local::now().naive_local());
        self.entries.insert(
            0,
            CaptionEntry {
                id,
                image_data_url,
                caption,
                copied_until: None,
            },
        );
        &self.entries[0]
    }

    pub fn find(&self, entry_id: &str) -> Option<&CaptionEntry> {
        self.entries.iter().find(|entry| entry.id == entry_id)
    }

    pub fn delete(&mut self, entry_id: &str) -> bool {
        let entry_id = entry_id.trim();
        if entry_id.is_empty() {
            return false;
        }
        let before = self.entries.len();
        self.entries.retain(|entry| entry.id != entry_id);
        self.entries.len() != before
    }

    pub fn mark_copied(&mut self, entry_id: &str, now: Instant, window: Duration) -> bool {
        match self.entries.iter_mut().find(|entry| entry.id == entry_id) {
            Some(entry) => {
                entry.copied_until = Some(now + window);
                true
            }
            None => false,
        }
    }

    /// Timestamp to the millisecond plus a process-wide sequence, so two
    /// entries created in the same millisecond still get distinct ids.
    fn next_entry_id(&mut self, now: NaiveDateTime) -> String {
        self.next_seq += 1;
        format!("{}_{:04}", now.format("%Y%m%d_%H%M%S_%3f"), self.next_seq)
    }

    pub fn render_html(&self, now: Instant) -> String {
        let mut items = Vec::new();
        for entry in &self.entries {
            let entry_id = encode_double_quoted_attribute(&entry.id).to_string();
            let image_src = encode_double_quoted_attribute(&entry.image_data_url).to_string();
            let caption_attr = encode_double_quoted_attribute(&entry.caption).to_string();
            let caption_html = encode_text(&entry.caption).to_string();

            let (copy_label, copy_disabled) = if entry.is_copy_locked(now) {
                (COPIED_LABEL, " disabled")
            } else {
                (COPY_LABEL, "")
            };

            items.push(format!(
                "<li class=\"entry\" data-entry-id=\"{}\"><img class=\"preview\" src=\"{}\" alt=\"uploaded image\" /><div class=\"entry-body\"><p class=\"entry-title\">Generated caption:</p><p class=\"caption\" id=\"caption-{}\">{}</p><div class=\"entry-actions\"><button type=\"button\" class=\"btn copy-caption-btn\" data-action=\"copy\" data-caption-text=\"{}\"{}>{}</button><button type=\"button\" class=\"btn delete-caption-btn\" data-action=\"delete\">{}</button></div></div></li>",
                entry_id,
                image_src,
                entry_id,
                caption_html,
                caption_attr,
                copy_disabled,
                copy_label,
                DELETE_LABEL
            ));
        }
        items.join("\n")
    }
}

pub fn image_data_url(file_name: &str, content_type: Option<&str>, bytes: &[u8]) -> String {
    let mime = content_type
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| image_content_type(Path::new(file_name)));
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

fn image_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|v| v.to_str())
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}
