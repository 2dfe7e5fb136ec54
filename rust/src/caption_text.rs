/// Boilerplate openers the captioning model tends to emit, most specific first.
/// Only the first match is stripped, so "claro, aqui está:" must be tried
/// before "aqui está:".
pub const DEFAULT_PREFIXES: [&str; 8] = [
    "claro, aqui está uma legenda:",
    "claro, aqui está:",
    "aqui está sua legenda:",
    "aqui está:",
    "legenda:",
    "opção 1:",
    "opção 2:",
    "opção 3:",
];

#[derive(Debug, Clone)]
pub struct CaptionCleaner {
    prefixes: Vec<String>,
}

impl Default for CaptionCleaner {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIXES.iter().map(|v| v.to_string()).collect())
    }
}

impl CaptionCleaner {
    pub fn new(prefixes: Vec<String>) -> Self {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .collect(),
        }
    }

    /// Strips the first matching prefix and trims the rest. A caption with no
    /// matching prefix comes back unchanged.
    pub fn clean(&self, caption: &str) -> String {
        for prefix in &self.prefixes {
            if let Some(rest) = strip_prefix_ignore_case(caption, prefix) {
                return rest.trim().to_string();
            }
        }
        caption.to_string()
    }
}

/// Case-insensitive `str::strip_prefix` that compares by lowercased chars so
/// byte offsets stay valid for non-ASCII text such as "Opção".
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let mut text_chars = text.char_indices();
    for expected in prefix.chars() {
        let (_, actual) = text_chars.next()?;
        if !chars_eq_ignore_case(actual, expected) {
            return None;
        }
    }
    match text_chars.next() {
        Some((index, _)) => Some(&text[index..]),
        None => Some(""),
    }
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}
