//! Speech capabilities consumed by the conversation controller.
//!
//! Real speech recognition and synthesis live outside this crate; the
//! controller talks to them through [`SpeechCapture`] and [`SpeechOutput`].
//! The console implementations below stand in for them in the terminal.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use owo_colors::OwoColorize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::session::controller::Completion;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone permission denied")]
    PermissionDenied,
    #[error("speech recognition unavailable: {0}")]
    Unavailable(String),
}

/// Forwards live transcripts of one capture session to the controller.
#[derive(Debug, Clone)]
pub struct TranscriptSink {
    tx: UnboundedSender<Completion>,
    session: u64,
}

impl TranscriptSink {
    pub(crate) fn new(tx: UnboundedSender<Completion>, session: u64) -> Self {
        Self { tx, session }
    }

    /// Publishes the full transcript heard so far.
    pub fn update(&self, transcript: impl Into<String>) {
        // The controller may already be gone at shutdown.
        let _ = self.tx.send(Completion::Transcript {
            session: self.session,
            text: transcript.into(),
        });
    }
}

/// Speech-to-text with streaming partial results.
pub trait SpeechCapture: Send {
    /// Begins listening. Partial transcripts go to `sink`.
    fn start(&mut self, locale: &str, sink: TranscriptSink) -> Result<(), CaptureError>;

    /// Stops listening and returns the finalized transcript.
    fn stop(&mut self) -> String;
}

/// Text-to-speech playback. A new `speak` supersedes the active utterance.
pub trait SpeechOutput: Send + Sync {
    fn speak(&self, text: &str, rate: f32, pitch: f32);

    fn stop(&self);
}

/// Prints utterances to stdout instead of playing them.
#[derive(Debug, Default)]
pub struct ConsoleSpeaker;

impl SpeechOutput for ConsoleSpeaker {
    fn speak(&self, text: &str, rate: f32, pitch: f32) {
        debug!(rate, pitch, chars = text.chars().count(), "speaking");
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{} {}", "🔊".bold(), text.cyan());
    }

    fn stop(&self) {
        debug!("speech stopped");
    }
}

#[derive(Default)]
struct DictationState {
    sink: Option<TranscriptSink>,
    transcript: String,
}

/// Capture fed by typed words, standing in for a microphone.
#[derive(Clone, Default)]
pub struct ConsoleCapture {
    state: Arc<Mutex<DictationState>>,
}

impl ConsoleCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle used by the front-end to "speak" words into an active capture.
    pub fn dictation(&self) -> Dictation {
        Dictation {
            state: Arc::clone(&self.state),
        }
    }
}

impl SpeechCapture for ConsoleCapture {
    fn start(&mut self, locale: &str, sink: TranscriptSink) -> Result<(), CaptureError> {
        debug!(locale, "console capture started");
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.transcript.clear();
        state.sink = Some(sink);
        Ok(())
    }

    fn stop(&mut self) -> String {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.sink = None;
        std::mem::take(&mut state.transcript)
    }
}

/// Feeds words into a [`ConsoleCapture`].
#[derive(Clone)]
pub struct Dictation {
    state: Arc<Mutex<DictationState>>,
}

impl Dictation {
    /// Appends words to the live transcript. Returns `false` when nothing is listening.
    pub fn say(&self, words: &str) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let DictationState { sink, transcript } = &mut *state;
        let Some(sink) = sink else {
            return false;
        };
        let words = words.trim();
        if !words.is_empty() {
            if !transcript.is_empty() {
                transcript.push(' ');
            }
            transcript.push_str(words);
        }
        sink.update(transcript.clone());
        true
    }
}
