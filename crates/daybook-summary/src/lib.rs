//! Turns a finished [`Report`] into prose for non-technical readers.

pub mod fake;
pub mod openai;
pub mod prompt;

use daybook_core::Report;

pub use fake::ScriptedSummarizer;
pub use openai::OpenAiSummarizer;

#[derive(Debug, thiserror::Error)]
pub enum SummaryError {
    #[error("http: {0}")]
    Http(#[from] ureq::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("decoding completion: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("completion carried no content")]
    Empty,
    #[error("request task failed: {0}")]
    Join(String),
    #[error("{0}")]
    Injected(String),
}

#[async_trait::async_trait]
pub trait Summarizer: Send + Sync {
    /// A bounded-length summary of `report`.
    async fn summarize(&self, report: &Report) -> Result<String, SummaryError>;
}

/// Trim surrounding whitespace and cut to at most `max_chars` characters.
pub fn bound(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].trim_end().to_string(),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bound_trims_and_cuts_on_char_boundary() {
        assert_eq!(bound("  hello \n", 100), "hello");
        assert_eq!(bound("héllo wörld", 5), "héllo");
        assert_eq!(bound("abc", 3), "abc");
        assert_eq!(bound("", 3), "");
    }
}
