//! Conversation session: history, state machine and speech seams.

pub mod controller;
pub mod speech;
pub mod state;

pub use controller::{Completion, Controller, Intent, Phase, SessionEvent, SessionOptions};
pub use speech::{
    CaptureError, ConsoleCapture, ConsoleSpeaker, Dictation, SpeechCapture, SpeechOutput,
    TranscriptSink,
};
pub use state::{ConversationState, Message, VoiceSettings};
