use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

pub trait ClipboardWriter: Send + Sync {
    fn is_available(&self) -> bool {
        true
    }

    fn write_text(&self, text: &str) -> Result<()>;
}

/// Native clipboard API. Only Windows has one wired in.
pub struct SystemClipboard;

impl ClipboardWriter for SystemClipboard {
    fn is_available(&self) -> bool {
        cfg!(target_os = "windows")
    }

    #[cfg(target_os = "windows")]
    fn write_text(&self, text: &str) -> Result<()> {
        clipboard_win::set_clipboard_string(text)
            .map_err(|err| anyhow!("failed to write clipboard: {err}"))
    }

    #[cfg(not(target_os = "windows"))]
    fn write_text(&self, _text: &str) -> Result<()> {
        Err(anyhow!("system clipboard is not available on this platform"))
    }
}

/// Pipes text into the platform copy command: pbcopy, wl-copy or xclip.
pub struct CommandClipboard;

impl CommandClipboard {
    fn command() -> (&'static str, Vec<&'static str>) {
        if cfg!(target_os = "macos") {
            return ("pbcopy", vec![]);
        }
        if cfg!(target_os = "windows") {
            return ("clip", vec![]);
        }
        let session_type = std::env::var("XDG_SESSION_TYPE").unwrap_or_default();
        if session_type == "wayland" {
            ("wl-copy", vec![])
        } else {
            ("xclip", vec!["-selection", "clipboard"])
        }
    }
}

impl ClipboardWriter for CommandClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        let (cmd, args) = Self::command();
        let mut child = Command::new(cmd)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to spawn {cmd}"))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(text.as_bytes())
                .with_context(|| format!("failed to write to {cmd}"))?;
        }
        // Close stdin so the copy command sees EOF.
        drop(child.stdin.take());

        let status = child
            .wait()
            .with_context(|| format!("failed to wait for {cmd}"))?;
        if !status.success() {
            return Err(anyhow!("{cmd} exited with status {status}"));
        }
        Ok(())
    }
}

/// Uses the primary writer when it reports itself available, otherwise the
/// fallback. A primary failure is not retried on the fallback.
pub struct ClipboardChain {
    primary: Box<dyn ClipboardWriter>,
    fallback: Box<dyn ClipboardWriter>,
}

impl ClipboardChain {
    pub fn new(primary: Box<dyn ClipboardWriter>, fallback: Box<dyn ClipboardWriter>) -> Self {
        Self { primary, fallback }
    }

    pub fn system() -> Self {
        Self::new(Box::new(SystemClipboard), Box::new(CommandClipboard))
    }
}

impl ClipboardWriter for ClipboardChain {
    fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallback.is_available()
    }

    fn write_text(&self, text: &str) -> Result<()> {
        if self.primary.is_available() {
            self.primary.write_text(text)
        } else {
            log::debug!("primary clipboard unavailable, using fallback");
            self.fallback.write_text(text)
        }
    }
}
