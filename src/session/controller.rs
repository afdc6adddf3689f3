//! Conversation controller.
//!
//! A single owner holds the [`ConversationState`]. User intents arrive through
//! [`Controller::handle`]; provider replies and live transcripts produced by
//! background tasks come back as [`Completion`] messages over a channel and
//! are applied by the same owner, so state is never touched concurrently.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::llm::prompt::{HOMEWORK_PROMPT, WELCOME_MESSAGE, switch_announcement, system_prompt};
use crate::llm::{OutboundQuery, Provider, ProviderError, Responder};
use crate::session::speech::{SpeechCapture, SpeechOutput, TranscriptSink};
use crate::session::state::{ConversationState, Message, VoiceSettings};

/// User intents issued by the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    StartCapture,
    StopCapture,
    SubmitText(String),
    /// Sends the homework-help prompt together with a photo.
    AttachImage(Vec<u8>),
    SwitchProvider(Provider),
    SubmitAge(String),
    SetVoice { rate: f32, pitch: f32 },
    Reset,
}

impl Intent {
    fn kind(&self) -> &'static str {
        match self {
            Self::StartCapture => "start_capture",
            Self::StopCapture => "stop_capture",
            Self::SubmitText(_) => "submit_text",
            Self::AttachImage(_) => "attach_image",
            Self::SwitchProvider(_) => "switch_provider",
            Self::SubmitAge(_) => "submit_age",
            Self::SetVoice { .. } => "set_voice",
            Self::Reset => "reset",
        }
    }
}

/// Results of background work, delivered back to the owning task.
#[derive(Debug)]
pub enum Completion {
    Transcript {
        session: u64,
        text: String,
    },
    Reply {
        generation: u64,
        provider: Provider,
        result: Result<String, ProviderError>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Capturing,
    Sending,
}

/// Notifications for whoever renders the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    MessageAppended(Message),
    Cleared,
    BusyChanged(bool),
    Error(String),
    LiveTranscript(String),
    CaptureChanged(bool),
    ProviderChanged(Provider),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Locale handed to speech capture.
    pub locale: String,
    /// Drop replies to requests issued before the latest reset.
    pub discard_stale_replies: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            discard_stale_replies: false,
        }
    }
}

pub struct Controller {
    state: ConversationState,
    options: SessionOptions,
    responder: Arc<dyn Responder>,
    capture: Box<dyn SpeechCapture>,
    speech: Arc<dyn SpeechOutput>,
    capturing: bool,
    capture_session: u64,
    live_transcript: String,
    generation: u64,
    in_flight: usize,
    completion_tx: UnboundedSender<Completion>,
    completion_rx: UnboundedReceiver<Completion>,
    events: Option<UnboundedSender<SessionEvent>>,
}

enum Step {
    Intent(Option<Intent>),
    Completion(Option<Completion>),
}

impl Controller {
    pub fn new(
        state: ConversationState,
        responder: Arc<dyn Responder>,
        capture: Box<dyn SpeechCapture>,
        speech: Arc<dyn SpeechOutput>,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        Self {
            state,
            options: SessionOptions::default(),
            responder,
            capture,
            speech,
            capturing: false,
            capture_session: 0,
            live_transcript: String::new(),
            generation: 0,
            in_flight: 0,
            completion_tx,
            completion_rx,
            events: None,
        }
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        if self.capturing {
            Phase::Capturing
        } else if self.state.is_busy() {
            Phase::Sending
        } else {
            Phase::Idle
        }
    }

    pub fn live_transcript(&self) -> &str {
        &self.live_transcript
    }

    /// Provider requests whose completion has not been applied yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Applies one user intent. Must run inside a tokio runtime.
    pub fn handle(&mut self, intent: Intent) {
        debug!(intent = intent.kind(), phase = ?self.phase(), "handling intent");
        match intent {
            Intent::StartCapture => self.start_capture(),
            Intent::StopCapture => self.stop_capture(),
            Intent::SubmitText(text) => self.submit(&text, None),
            Intent::AttachImage(bytes) => self.submit(HOMEWORK_PROMPT, Some(bytes)),
            Intent::SwitchProvider(provider) => self.switch_provider(provider),
            Intent::SubmitAge(age) => {
                self.state.set_age(&age);
                info!(age = self.state.user_age(), "age submitted");
            }
            Intent::SetVoice { rate, pitch } => {
                self.state.set_voice(VoiceSettings::new(rate, pitch));
            }
            Intent::Reset => self.reset(),
        }
    }

    /// Applies the result of background work.
    pub fn apply(&mut self, completion: Completion) {
        match completion {
            Completion::Transcript { session, text } => {
                if self.capturing && session == self.capture_session {
                    self.live_transcript = text.clone();
                    self.emit(SessionEvent::LiveTranscript(text));
                }
            }
            Completion::Reply {
                generation,
                provider,
                result,
            } => self.apply_reply(generation, provider, result),
        }
    }

    /// Waits for the next background completion.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.completion_rx.recv().await
    }

    /// Applies completions until no provider request is outstanding.
    pub async fn settle(&mut self) {
        while self.in_flight > 0 {
            match self.completion_rx.recv().await {
                Some(completion) => self.apply(completion),
                None => break,
            }
        }
    }

    /// Drives the session from an intent channel. When the channel closes,
    /// outstanding replies are still applied before the final state is returned.
    pub async fn run(mut self, mut intents: mpsc::Receiver<Intent>) -> ConversationState {
        loop {
            let step = tokio::select! {
                intent = intents.recv() => Step::Intent(intent),
                completion = self.completion_rx.recv() => Step::Completion(completion),
            };
            match step {
                Step::Intent(Some(intent)) => self.handle(intent),
                Step::Intent(None) => break,
                Step::Completion(Some(completion)) => self.apply(completion),
                Step::Completion(None) => break,
            }
        }

        if self.capturing {
            self.stop_capture();
        }
        self.settle().await;
        self.state
    }

    fn start_capture(&mut self) {
        let was_capturing = self.capturing;
        if was_capturing {
            self.capture.stop();
            self.capturing = false;
        }

        self.capture_session += 1;
        self.live_transcript.clear();
        let sink = TranscriptSink::new(self.completion_tx.clone(), self.capture_session);
        match self.capture.start(&self.options.locale, sink) {
            Ok(()) => {
                self.capturing = true;
                if !was_capturing {
                    self.emit(SessionEvent::CaptureChanged(true));
                }
            }
            Err(err) => {
                warn!(error = %err, "speech capture failed to start");
                if was_capturing {
                    self.emit(SessionEvent::CaptureChanged(false));
                }
                self.fail(format!("Failed to start recording: {err}"));
            }
        }
    }

    fn stop_capture(&mut self) {
        if !self.capturing {
            return;
        }
        let transcript = self.capture.stop();
        self.capturing = false;
        self.live_transcript.clear();
        self.emit(SessionEvent::CaptureChanged(false));
        self.submit(&transcript, None);
    }

    fn submit(&mut self, text: &str, image: Option<Vec<u8>>) {
        let text = text.trim();
        if text.is_empty() {
            debug!("ignoring blank submission");
            return;
        }

        let message = self.state.push(Message::user(text)).clone();
        self.emit(SessionEvent::MessageAppended(message));
        self.state.set_busy(true);
        self.emit(SessionEvent::BusyChanged(true));

        let provider = self.state.selected_provider();
        let query = OutboundQuery {
            user_text: text.to_string(),
            system_prompt: system_prompt(self.state.user_age()),
            attached_image: image,
            provider,
        };
        let generation = self.generation;
        let responder = Arc::clone(&self.responder);
        let tx = self.completion_tx.clone();
        self.in_flight += 1;
        debug!(provider = provider.as_str(), generation, "request issued");

        tokio::spawn(async move {
            let result = responder.answer(query).await;
            let _ = tx.send(Completion::Reply {
                generation,
                provider,
                result,
            });
        });
    }

    fn apply_reply(
        &mut self,
        generation: u64,
        provider: Provider,
        result: Result<String, ProviderError>,
    ) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.state.set_busy(false);
        self.emit(SessionEvent::BusyChanged(false));

        if generation != self.generation {
            if self.options.discard_stale_replies {
                info!(provider = provider.as_str(), generation, "dropping reply issued before reset");
                return;
            }
            debug!(provider = provider.as_str(), generation, "reply issued before reset");
        }

        match result {
            Ok(text) => {
                let message = self.state.push(Message::assistant(text)).clone();
                let voice = self.state.voice();
                self.speech
                    .speak(message.text(), voice.rate(), voice.pitch());
                self.emit(SessionEvent::MessageAppended(message));
            }
            Err(err) => {
                warn!(provider = provider.as_str(), error = %err, "provider request failed");
                self.fail(format!("AI Error: {err}"));
            }
        }
    }

    fn switch_provider(&mut self, provider: Provider) {
        if provider == self.state.selected_provider() {
            return;
        }
        let announce = self.phase() == Phase::Idle;
        self.state.set_provider(provider);
        self.emit(SessionEvent::ProviderChanged(provider));

        if announce {
            let text = switch_announcement(provider.display_name());
            let message = self.state.push(Message::assistant(text)).clone();
            let voice = self.state.voice();
            self.speech
                .speak(message.text(), voice.rate(), voice.pitch());
            self.emit(SessionEvent::MessageAppended(message));
        }
    }

    fn reset(&mut self) {
        self.state.reset();
        self.generation += 1;
        self.emit(SessionEvent::Cleared);

        let voice = self.state.voice();
        self.speech.stop();
        self.speech.speak(WELCOME_MESSAGE, voice.rate(), voice.pitch());
    }

    fn fail(&mut self, error: String) {
        self.state.set_error(error.clone());
        self.emit(SessionEvent::Error(error));
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}
