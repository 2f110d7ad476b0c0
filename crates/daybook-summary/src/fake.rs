use std::sync::atomic::{AtomicUsize, Ordering};

use daybook_core::Report;

use crate::{Summarizer, SummaryError};

/// Summarizer with a canned reply, or a canned failure.
pub struct ScriptedSummarizer {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedSummarizer {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Summarizer for ScriptedSummarizer {
    async fn summarize(&self, report: &Report) -> Result<String, SummaryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(text) => Ok(text.replace("{date}", &report.date.to_string())),
            None => Err(SummaryError::Injected("summarizer unavailable".into())),
        }
    }
}
