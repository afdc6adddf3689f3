use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::llm::Provider;

pub const VOICE_RATE_RANGE: (f32, f32) = (0.0, 1.0);
pub const VOICE_PITCH_RANGE: (f32, f32) = (0.5, 2.0);

/// One entry of the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    id: Uuid,
    text: String,
    is_from_user: bool,
    created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, true)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(text, false)
    }

    fn new(text: impl Into<String>, is_from_user: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            is_from_user,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_from_user(&self) -> bool {
        self.is_from_user
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Speech output settings; values are clamped into their valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    rate: f32,
    pitch: f32,
}

impl VoiceSettings {
    pub fn new(rate: f32, pitch: f32) -> Self {
        Self {
            rate: clamp(rate, VOICE_RATE_RANGE, 0.5),
            pitch: clamp(pitch, VOICE_PITCH_RANGE, 1.0),
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self::new(0.5, 1.0)
    }
}

fn clamp(value: f32, (low, high): (f32, f32), fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(low, high)
    }
}

/// Everything the presentation layer renders for one session.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationState {
    messages: Vec<Message>,
    selected_provider: Provider,
    voice: VoiceSettings,
    user_age: String,
    is_busy: bool,
    last_error: Option<String>,
}

impl ConversationState {
    pub fn new(provider: Provider, voice: VoiceSettings, user_age: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            selected_provider: provider,
            voice,
            user_age: user_age.into().trim().to_string(),
            is_busy: false,
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn selected_provider(&self) -> Provider {
        self.selected_provider
    }

    pub fn voice(&self) -> VoiceSettings {
        self.voice
    }

    pub fn user_age(&self) -> &str {
        &self.user_age
    }

    pub fn is_busy(&self) -> bool {
        self.is_busy
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub(crate) fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        &self.messages[self.messages.len() - 1]
    }

    pub(crate) fn set_busy(&mut self, busy: bool) {
        self.is_busy = busy;
    }

    pub(crate) fn set_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    pub(crate) fn set_provider(&mut self, provider: Provider) {
        self.selected_provider = provider;
    }

    pub(crate) fn set_voice(&mut self, voice: VoiceSettings) {
        self.voice = voice;
    }

    pub(crate) fn set_age(&mut self, age: &str) {
        self.user_age = age.trim().to_string();
    }

    /// Drops history and the pending error; settings survive.
    pub(crate) fn reset(&mut self) {
        self.messages.clear();
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{ConversationState, Message, VoiceSettings};
    use crate::llm::Provider;

    #[test]
    fn voice_settings_are_clamped() {
        let voice = VoiceSettings::new(3.0, 0.1);
        assert_eq!(voice.rate(), 1.0);
        assert_eq!(voice.pitch(), 0.5);

        let voice = VoiceSettings::new(f32::NAN, f32::NAN);
        assert_eq!(voice, VoiceSettings::default());
    }

    #[test]
    fn messages_get_distinct_ids() {
        let first = Message::user("a");
        let second = Message::user("a");
        assert_ne!(first.id(), second.id());
        assert!(first.is_from_user());
        assert!(!Message::assistant("b").is_from_user());
    }

    #[test]
    fn reset_keeps_settings() {
        let mut state = ConversationState::new(Provider::Openai, VoiceSettings::new(0.3, 1.4), "8");
        state.push(Message::user("hello"));
        state.set_error("boom");
        state.reset();

        assert!(state.messages().is_empty());
        assert_eq!(state.last_error(), None);
        assert_eq!(state.selected_provider(), Provider::Openai);
        assert_eq!(state.voice(), VoiceSettings::new(0.3, 1.4));
        assert_eq!(state.user_age(), "8");
    }
}
