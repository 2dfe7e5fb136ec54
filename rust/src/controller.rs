use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::caption_client::{Submission, UploadFile};
use crate::caption_text::CaptionCleaner;
use crate::error::RequestError;
use crate::history::{image_data_url, CaptionHistory};
use crate::keywords::{KeywordRow, KeywordRows, RowId};

pub const NO_FILE_LABEL: &str = "No file selected";
pub const MISSING_FILE_MESSAGE: &str = "Please select an image before submitting.";
pub const MISSING_KEYWORDS_MESSAGE: &str =
    "Please add at least one keyword to generate the caption.";
pub const PENDING_MESSAGE: &str = "A caption request is already in progress. Please wait.";
pub const SENDING_MESSAGE: &str = "Sending image and generating caption... Please wait.";
pub const ABANDONED_MESSAGE: &str = "The caption request was interrupted. Please try again.";
pub const COPY_FAILED_ALERT: &str = "Could not copy the caption. Please copy it manually.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMessage {
    pub kind: MessageKind,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub initial_rows: usize,
    pub copy_feedback: Duration,
    pub cleaner: CaptionCleaner,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            initial_rows: 1,
            copy_feedback: Duration::from_millis(2000),
            cleaner: CaptionCleaner::default(),
        }
    }
}

/// Form state posted by the page: the chosen file and every row's current input.
#[derive(Debug, Default)]
pub struct SubmitForm {
    pub file: Option<UploadFile>,
    pub row_values: Vec<(RowId, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum HistoryAction {
    Copy { entry_id: String },
    Delete { entry_id: String },
}

/// A copy that passed the feedback-window check and still has to reach the
/// clipboard. The write happens outside the controller lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCopy {
    pub entry_id: String,
    pub caption: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub rows: Vec<KeywordRow>,
    pub focus_row: Option<RowId>,
    pub file_label: String,
    pub message: Option<StatusMessage>,
    pub show_history_heading: bool,
    pub history_html: String,
    pub entry_count: usize,
    pub pending: bool,
    pub copy_feedback_ms: u64,
}

pub struct UploadController {
    settings: ControllerSettings,
    rows: KeywordRows,
    history: CaptionHistory,
    message: Option<StatusMessage>,
    file_label: String,
    pending: bool,
}

impl UploadController {
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            rows: KeywordRows::with_rows(settings.initial_rows),
            history: CaptionHistory::default(),
            message: None,
            file_label: NO_FILE_LABEL.to_string(),
            pending: false,
            settings,
        }
    }

    pub fn history(&self) -> &CaptionHistory {
        &self.history
    }

    pub fn rows(&self) -> &[KeywordRow] {
        self.rows.rows()
    }

    pub fn message(&self) -> Option<&StatusMessage> {
        self.message.as_ref()
    }

    pub fn file_label(&self) -> &str {
        &self.file_label
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn file_changed(&mut self, file_name: Option<&str>) {
        self.file_label = file_name
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(NO_FILE_LABEL)
            .to_string();
        self.message = None;
    }

    pub fn add_row(&mut self) -> RowId {
        self.rows.add_row()
    }

    pub fn remove_row(&mut self, row_id: RowId) -> bool {
        self.rows.remove_row(row_id)
    }

    /// Validates the form. Returns the submission to send, or `None` after
    /// showing the validation error; nothing is sent in that case.
    pub fn begin_submission(&mut self, form: SubmitForm) -> Option<Submission> {
        for (row_id, value) in &form.row_values {
            self.rows.set_value(*row_id, value);
        }
        let keywords = self.rows.keywords();

        let Some(file) = form.file.filter(|f| !f.file_name.trim().is_empty()) else {
            self.show(MessageKind::Error, MISSING_FILE_MESSAGE);
            self.file_label = NO_FILE_LABEL.to_string();
            return None;
        };
        if keywords.is_empty() {
            self.show(MessageKind::Error, MISSING_KEYWORDS_MESSAGE);
            return None;
        }
        if self.pending {
            self.show(MessageKind::Error, PENDING_MESSAGE);
            return None;
        }

        self.pending = true;
        self.show(MessageKind::Info, SENDING_MESSAGE);
        Some(Submission { file, keywords })
    }

    pub fn finish_submission(
        &mut self,
        submission: Submission,
        result: Result<String, RequestError>,
    ) {
        self.pending = false;

        let caption = match result {
            Ok(caption) => caption,
            Err(err) => {
                log::warn!("caption generation failed: {err}");
                self.show(
                    MessageKind::Error,
                    &format!("Error generating caption: {err}"),
                );
                return;
            }
        };

        let file = submission.file;
        let data_url = image_data_url(&file.file_name, file.content_type.as_deref(), &file.bytes);
        let cleaned = self.settings.cleaner.clean(&caption);
        let entry_id = self.history.prepend(data_url, cleaned).id.clone();
        log::info!("added caption entry {entry_id} for {}", file.file_name);

        self.show(
            MessageKind::Success,
            &format!("Caption generated successfully for {}!", file.file_name),
        );
        self.file_label = NO_FILE_LABEL.to_string();
        self.rows.clear_values();
    }

    /// Clears the in-flight flag when a request ended without a result.
    pub fn abandon_submission(&mut self) {
        self.pending = false;
        self.show(MessageKind::Error, ABANDONED_MESSAGE);
    }

    /// Runs a history action. A copy is returned for the caller to write to
    /// the clipboard and report back through `complete_copy`.
    pub fn dispatch(&mut self, action: HistoryAction, now: Instant) -> Option<PendingCopy> {
        match action {
            HistoryAction::Copy { entry_id } => {
                let entry = self.history.find(&entry_id)?;
                if entry.is_copy_locked(now) {
                    return None;
                }
                Some(PendingCopy {
                    caption: entry.caption.clone(),
                    entry_id,
                })
            }
            HistoryAction::Delete { entry_id } => {
                if self.history.delete(&entry_id) {
                    log::info!("deleted caption entry {entry_id}");
                }
                None
            }
        }
    }

    /// Records the clipboard outcome. Returns alert text when the write failed.
    pub fn complete_copy(
        &mut self,
        copy: PendingCopy,
        result: anyhow::Result<()>,
        now: Instant,
    ) -> Option<String> {
        match result {
            Ok(()) => {
                self.history
                    .mark_copied(&copy.entry_id, now, self.settings.copy_feedback);
                None
            }
            Err(err) => {
                log::warn!("failed to copy caption {}: {err:#}", copy.entry_id);
                Some(COPY_FAILED_ALERT.to_string())
            }
        }
    }

    pub fn snapshot(&mut self, now: Instant) -> Snapshot {
        Snapshot {
            rows: self.rows.rows().to_vec(),
            focus_row: self.rows.take_focus(),
            file_label: self.file_label.clone(),
            message: self.message.clone(),
            show_history_heading: !self.history.is_empty(),
            history_html: self.history.render_html(now),
            entry_count: self.history.entries().len(),
            pending: self.pending,
            copy_feedback_ms: u64::try_from(self.settings.copy_feedback.as_millis())
                .unwrap_or(u64::MAX),
        }
    }

    fn show(&mut self, kind: MessageKind, text: &str) {
        self.message = Some(StatusMessage {
            kind,
            text: text.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clipboard::testing::RecordingClipboard;
    use crate::clipboard::ClipboardWriter;

    fn png(name: &str) -> UploadFile {
        UploadFile {
            file_name: name.to_string(),
            content_type: Some("image/png".to_string()),
            bytes: b"img".to_vec(),
        }
    }

    fn controller() -> UploadController {
        UploadController::new(ControllerSettings::default())
    }

    fn form_with(controller: &UploadController, file: Option<UploadFile>, values: &[&str]) -> SubmitForm {
        SubmitForm {
            file,
            row_values: controller
                .rows()
                .iter()
                .zip(values.iter())
                .map(|(row, value)| (row.id, value.to_string()))
                .collect(),
        }
    }

    fn run_action(
        controller: &mut UploadController,
        action: HistoryAction,
        clipboard: &dyn ClipboardWriter,
        now: Instant,
    ) -> Option<String> {
        let copy = controller.dispatch(action, now)?;
        let result = clipboard.write_text(&copy.caption);
        controller.complete_copy(copy, result, now)
    }

    fn add_entry(controller: &mut UploadController, caption: &str) -> String {
        let form = form_with(controller, Some(png("a.png")), &["kw"]);
        let submission = controller.begin_submission(form).expect("valid form");
        controller.finish_submission(submission, Ok(caption.to_string()));
        controller.history().entries()[0].id.clone()
    }

    #[test]
    fn missing_file_blocks_submission_and_resets_label() {
        let mut controller = controller();
        controller.file_changed(Some("stale.png"));
        let form = form_with(&controller, None, &["praia"]);

        assert!(controller.begin_submission(form).is_none());
        assert_eq!(
            controller.message(),
            Some(&StatusMessage {
                kind: MessageKind::Error,
                text: MISSING_FILE_MESSAGE.to_string(),
            })
        );
        assert_eq!(controller.file_label(), NO_FILE_LABEL);
        assert!(!controller.is_pending());
    }

    #[test]
    fn blank_keywords_block_submission() {
        let mut controller = controller();
        controller.add_row();
        let form = form_with(&controller, Some(png("a.png")), &["   ", ""]);

        assert!(controller.begin_submission(form).is_none());
        assert_eq!(
            controller.message().map(|m| m.text.as_str()),
            Some(MISSING_KEYWORDS_MESSAGE)
        );
        assert!(!controller.is_pending());
    }

    #[test]
    fn missing_file_is_reported_before_missing_keywords() {
        let mut controller = controller();
        let form = form_with(&controller, None, &[""]);
        assert!(controller.begin_submission(form).is_none());
        assert_eq!(
            controller.message().map(|m| m.text.as_str()),
            Some(MISSING_FILE_MESSAGE)
        );
    }

    #[test]
    fn submits_only_filled_rows_in_row_order() {
        let mut controller = controller();
        controller.add_row();
        controller.add_row();
        controller.add_row();
        let form = form_with(&controller, Some(png("a.png")), &["sol", "", " mar ", "  "]);

        let submission = controller.begin_submission(form).expect("valid form");
        assert_eq!(submission.keywords, vec!["sol", "mar"]);
        assert_eq!(submission.file.file_name, "a.png");
        assert!(controller.is_pending());
        assert_eq!(
            controller.message().map(|m| m.kind),
            Some(MessageKind::Info)
        );
    }

    #[test]
    fn second_submit_while_pending_is_rejected() {
        let mut controller = controller();
        let form = form_with(&controller, Some(png("a.png")), &["sol"]);
        let first = controller.begin_submission(form).expect("first");

        let form = form_with(&controller, Some(png("b.png")), &["sol"]);
        assert!(controller.begin_submission(form).is_none());
        assert_eq!(
            controller.message().map(|m| m.text.as_str()),
            Some(PENDING_MESSAGE)
        );

        controller.finish_submission(first, Ok("ok".to_string()));
        assert!(!controller.is_pending());
    }

    #[test]
    fn abandoned_submission_frees_the_next_submit() {
        let mut controller = controller();
        let form = form_with(&controller, Some(png("a.png")), &["sol"]);
        controller.begin_submission(form).expect("first");
        assert!(controller.is_pending());

        controller.abandon_submission();
        assert!(!controller.is_pending());
        assert_eq!(
            controller.message().map(|m| m.text.as_str()),
            Some(ABANDONED_MESSAGE)
        );

        let form = form_with(&controller, Some(png("b.png")), &["sol"]);
        assert!(controller.begin_submission(form).is_some());
    }

    #[test]
    fn success_prepends_cleaned_entry_and_resets_form() {
        let mut controller = controller();
        controller.add_row();
        controller.file_changed(Some("dog.png"));
        let form = form_with(&controller, Some(png("dog.png")), &["cachorro", "praia"]);
        let submission = controller.begin_submission(form).expect("valid form");

        controller.finish_submission(submission, Ok("Legenda: A dog on a beach".to_string()));

        let entry = &controller.history().entries()[0];
        assert_eq!(entry.caption, "A dog on a beach");
        assert!(entry.image_data_url.starts_with("data:image/png;base64,"));
        assert_eq!(
            controller.message(),
            Some(&StatusMessage {
                kind: MessageKind::Success,
                text: "Caption generated successfully for dog.png!".to_string(),
            })
        );
        assert_eq!(controller.file_label(), NO_FILE_LABEL);
        assert_eq!(controller.rows().len(), 2);
        assert!(controller.rows().iter().all(|row| row.value.is_empty()));

        let snapshot = controller.snapshot(Instant::now());
        assert!(snapshot.show_history_heading);
        assert_eq!(snapshot.entry_count, 1);
    }

    #[test]
    fn newest_entry_comes_first() {
        let mut controller = controller();
        add_entry(&mut controller, "primeira");
        add_entry(&mut controller, "segunda");
        let captions: Vec<_> = controller
            .history()
            .entries()
            .iter()
            .map(|e| e.caption.as_str())
            .collect();
        assert_eq!(captions, vec!["segunda", "primeira"]);
    }

    #[test]
    fn failure_shows_error_and_keeps_form() {
        let mut controller = controller();
        let form = form_with(&controller, Some(png("a.png")), &["sol"]);
        let submission = controller.begin_submission(form).expect("valid form");

        controller.finish_submission(submission, Err(RequestError::Unreachable));

        assert!(controller.history().is_empty());
        assert_eq!(
            controller.message().map(|m| m.text.clone()),
            Some(format!(
                "Error generating caption: {}",
                crate::error::UNREACHABLE_MESSAGE
            ))
        );
        assert_eq!(controller.rows()[0].value, "sol");
    }

    #[test]
    fn failed_to_fetch_renders_friendly_message() {
        let mut controller = controller();
        let form = form_with(&controller, Some(png("a.png")), &["sol"]);
        let submission = controller.begin_submission(form).expect("valid form");

        controller.finish_submission(
            submission,
            Err(RequestError::from_transport_message("Failed to fetch")),
        );

        let text = controller.message().map(|m| m.text.clone()).unwrap_or_default();
        assert!(text.contains("Could not connect to the server"));
        assert!(!text.contains("Failed to fetch"));
    }

    #[test]
    fn delete_removes_exactly_that_entry_and_hides_heading_when_empty() {
        let mut controller = controller();
        let clipboard = RecordingClipboard::working();
        let first = add_entry(&mut controller, "um");
        let second = add_entry(&mut controller, "dois");

        run_action(
            &mut controller,
            HistoryAction::Delete { entry_id: second },
            &clipboard,
            Instant::now(),
        );
        assert_eq!(controller.history().entries().len(), 1);
        assert_eq!(controller.history().entries()[0].id, first);
        assert!(controller.snapshot(Instant::now()).show_history_heading);

        run_action(
            &mut controller,
            HistoryAction::Delete { entry_id: first },
            &clipboard,
            Instant::now(),
        );
        assert!(controller.history().is_empty());
        assert!(!controller.snapshot(Instant::now()).show_history_heading);
    }

    #[test]
    fn second_copy_inside_feedback_window_is_noop() {
        let mut controller = controller();
        let clipboard = RecordingClipboard::working();
        let id = add_entry(&mut controller, "Legenda: Praia");
        let now = Instant::now();

        let copy = HistoryAction::Copy { entry_id: id.clone() };
        assert!(run_action(&mut controller, copy.clone(), &clipboard, now).is_none());
        assert!(controller
            .dispatch(copy.clone(), now + Duration::from_millis(1500))
            .is_none());
        assert_eq!(clipboard.written(), vec!["Praia"]);

        run_action(&mut controller, copy, &clipboard, now + Duration::from_millis(2100));
        assert_eq!(clipboard.written(), vec!["Praia", "Praia"]);
    }

    #[test]
    fn copy_failure_returns_alert_and_keeps_button_enabled() {
        let mut controller = controller();
        let id = add_entry(&mut controller, "texto");
        let now = Instant::now();

        let alert = run_action(
            &mut controller,
            HistoryAction::Copy { entry_id: id },
            &RecordingClipboard::failing(),
            now,
        );
        assert_eq!(alert.as_deref(), Some(COPY_FAILED_ALERT));
        assert!(!controller.history().entries()[0].is_copy_locked(now));
    }

    #[test]
    fn copy_hands_out_caption_and_locks_only_after_success() {
        let mut controller = controller();
        let id = add_entry(&mut controller, "Legenda: Praia");
        let now = Instant::now();

        let copy = controller
            .dispatch(HistoryAction::Copy { entry_id: id.clone() }, now)
            .expect("copy of unlocked entry");
        assert_eq!(
            copy,
            PendingCopy {
                entry_id: id.clone(),
                caption: "Praia".to_string(),
            }
        );
        assert!(!controller.history().entries()[0].is_copy_locked(now));

        assert!(controller.complete_copy(copy, Ok(()), now).is_none());
        assert!(controller.history().entries()[0].is_copy_locked(now));
        assert!(controller
            .dispatch(HistoryAction::Copy { entry_id: id }, now)
            .is_none());
    }

    #[test]
    fn copy_of_unknown_entry_is_ignored() {
        let mut controller = controller();
        add_entry(&mut controller, "um");
        assert!(controller
            .dispatch(
                HistoryAction::Copy { entry_id: "missing".to_string() },
                Instant::now()
            )
            .is_none());
    }

    #[test]
    fn file_change_updates_label_and_hides_message() {
        let mut controller = controller();
        let form = form_with(&controller, None, &[]);
        controller.begin_submission(form);
        assert!(controller.message().is_some());

        controller.file_changed(Some("gato.jpg"));
        assert_eq!(controller.file_label(), "gato.jpg");
        assert!(controller.message().is_none());

        controller.file_changed(None);
        assert_eq!(controller.file_label(), NO_FILE_LABEL);
    }

    #[test]
    fn history_action_deserializes_by_kind() {
        let action: HistoryAction =
            serde_json::from_str(r#"{"action":"copy","entry_id":"x"}"#).expect("copy");
        assert_eq!(action, HistoryAction::Copy { entry_id: "x".to_string() });
        let action: HistoryAction =
            serde_json::from_str(r#"{"action":"delete","entry_id":"y"}"#).expect("delete");
        assert_eq!(action, HistoryAction::Delete { entry_id: "y".to_string() });
    }
}
