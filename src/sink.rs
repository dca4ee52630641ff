//! Display sinks: where presentations end up.

use std::io::Write;
use std::sync::Mutex;

use crate::presenter::{DisplayMessage, Presentation, Tone};

/// Accepts rendered messages. Layout and styling belong to the sink.
pub trait DisplaySink: Send + Sync {
    /// Render one message.
    fn show(&self, message: &DisplayMessage);

    /// Render every message of a presentation in order.
    fn show_presentation(&self, presentation: &Presentation) {
        for message in presentation.messages() {
            self.show(message);
        }
    }
}

/// Writes success and confirmation text to stdout, errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl DisplaySink for ConsoleSink {
    fn show(&self, message: &DisplayMessage) {
        // A closed pipe is not worth failing the submission over.
        let _ = match message.tone {
            Tone::Success => writeln!(std::io::stdout().lock(), "{}", message.text),
            Tone::Confirmation => writeln!(std::io::stdout().lock(), "\n{}", message.text),
            Tone::Error => writeln!(std::io::stderr().lock(), "error: {}", message.text),
        };
    }
}

/// Keeps every message shown, for tests and embedding.
#[derive(Debug, Default)]
pub struct RecordingSink {
    shown: Mutex<Vec<DisplayMessage>>,
}

impl RecordingSink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages shown so far, in order.
    pub fn shown(&self) -> Vec<DisplayMessage> {
        self.shown
            .lock()
            .map(|shown| shown.clone())
            .unwrap_or_default()
    }
}

impl DisplaySink for RecordingSink {
    fn show(&self, message: &DisplayMessage) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(message.clone());
        }
    }
}
