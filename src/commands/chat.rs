use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use owo_colors::OwoColorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::{self, CliOverrides};
use crate::credentials::{CredentialStore, EnvOverride, FileCredentialStore};
use crate::llm::{Provider, ProviderClient};
use crate::logging::{self, Verbosity};
use crate::session::{
    ConsoleCapture, ConsoleSpeaker, Controller, ConversationState, Dictation, Intent,
    SessionEvent,
};

const CHAT_HELP: &str = "Type a question and press enter, or use:
  /listen             start listening
  /say <words>        speak words into the microphone
  /stop               stop listening and send what was heard
  /provider <name>    switch to openai or gemini
  /age <age>          tell the teacher how old you are
  /voice <rate> <pitch>
  /image <path>       send a photo of your homework
  /reset              start over
  /quit";

#[derive(Debug, Args, Clone)]
pub struct ChatArgs {
    /// Provider to start with: openai or gemini.
    #[arg(long)]
    provider: Option<String>,
    /// Model for the starting provider.
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    age: Option<String>,
    #[arg(long)]
    profile: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Speech rate, 0.0 to 1.0.
    #[arg(long)]
    rate: Option<f32>,
    /// Speech pitch, 0.5 to 2.0.
    #[arg(long)]
    pitch: Option<f32>,
    /// Ignore replies to questions asked before the last reset.
    #[arg(long)]
    discard_stale: bool,
    /// Skip the spoken welcome at start.
    #[arg(long)]
    no_welcome: bool,
    /// Write the conversation as JSON when the session ends.
    #[arg(long, value_name = "PATH")]
    save: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, PartialEq)]
enum ReplCommand {
    Intent(Intent),
    Say(String),
    LoadImage(PathBuf),
    Help,
    Quit,
    Nothing,
    Invalid(String),
}

fn parse_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Nothing;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Intent(Intent::SubmitText(line.to_string()));
    };

    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    match name {
        "listen" => ReplCommand::Intent(Intent::StartCapture),
        "stop" => ReplCommand::Intent(Intent::StopCapture),
        "say" => ReplCommand::Say(rest.to_string()),
        "reset" => ReplCommand::Intent(Intent::Reset),
        "age" => ReplCommand::Intent(Intent::SubmitAge(rest.to_string())),
        "provider" => match rest.parse::<Provider>() {
            Ok(provider) => ReplCommand::Intent(Intent::SwitchProvider(provider)),
            Err(err) => ReplCommand::Invalid(err),
        },
        "voice" => {
            let values: Result<Vec<f32>, _> =
                rest.split_whitespace().map(str::parse::<f32>).collect();
            match values.as_deref() {
                Ok([rate, pitch]) => ReplCommand::Intent(Intent::SetVoice {
                    rate: *rate,
                    pitch: *pitch,
                }),
                _ => ReplCommand::Invalid("Usage: /voice <rate> <pitch>".to_string()),
            }
        }
        "image" if !rest.is_empty() => ReplCommand::LoadImage(PathBuf::from(rest)),
        "image" => ReplCommand::Invalid("Usage: /image <path>".to_string()),
        "help" => ReplCommand::Help,
        "quit" | "exit" => ReplCommand::Quit,
        other => ReplCommand::Invalid(format!("Unknown command '/{other}'. Try /help.")),
    }
}

pub async fn run(args: ChatArgs) -> Result<(), String> {
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));

    let resolved = config::resolve(&CliOverrides {
        profile: args.profile.clone(),
        provider: args.provider.clone(),
        model: args.model.clone(),
        age: args.age.clone(),
        timeout: args.timeout,
        voice_rate: args.rate,
        voice_pitch: args.pitch,
        discard_stale_replies: args.discard_stale,
        ..CliOverrides::default()
    })
    .map_err(|err| err.to_string())?;

    let credentials_path = config::credentials_path().map_err(|err| err.to_string())?;
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(EnvOverride::new(FileCredentialStore::new(credentials_path)));
    for provider in Provider::ALL {
        if !credentials.has_key(provider) {
            warn!(
                provider = provider.as_str(),
                "no API key saved; run `kidtutor keys set {}`",
                provider.as_str()
            );
        }
    }

    let capture = ConsoleCapture::new();
    let dictation = capture.dictation();
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let controller = Controller::new(
        ConversationState::new(resolved.provider, resolved.voice, resolved.age.clone()),
        Arc::new(ProviderClient::new(credentials, resolved.providers.clone())),
        Box::new(capture),
        Arc::new(ConsoleSpeaker),
    )
    .with_options(resolved.session.clone())
    .with_events(event_tx);

    let (intent_tx, intent_rx) = mpsc::channel(32);
    let session = tokio::spawn(controller.run(intent_rx));
    let printer = tokio::spawn(print_events(event_rx));

    if !args.no_welcome {
        let _ = intent_tx.send(Intent::Reset).await;
    }
    read_commands(intent_tx, dictation).await?;

    let final_state = session
        .await
        .map_err(|err| format!("Chat session stopped unexpectedly: {err}"))?;
    let _ = printer.await;

    if let Some(path) = &args.save {
        save_conversation(path, &final_state)?;
    }
    Ok(())
}

async fn read_commands(intents: mpsc::Sender<Intent>, dictation: Dictation) -> Result<(), String> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|err| format!("Failed to read input: {err}"))?
    {
        let intent = match parse_line(&line) {
            ReplCommand::Intent(intent) => intent,
            ReplCommand::Say(words) => {
                if !dictation.say(&words) {
                    println!("{}", "Not listening. Use /listen first.".yellow());
                }
                continue;
            }
            ReplCommand::LoadImage(path) => match fs::read(&path) {
                Ok(bytes) => Intent::AttachImage(bytes),
                Err(err) => {
                    println!("{}", format!("Failed to read image '{}': {err}", path.display()).red());
                    continue;
                }
            },
            ReplCommand::Help => {
                println!("{CHAT_HELP}");
                continue;
            }
            ReplCommand::Invalid(message) => {
                println!("{}", message.yellow());
                continue;
            }
            ReplCommand::Nothing => continue,
            ReplCommand::Quit => break,
        };
        if intents.send(intent).await.is_err() {
            break;
        }
    }
    Ok(())
}

async fn print_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            // Assistant messages are shown when they are spoken.
            SessionEvent::MessageAppended(message) if message.is_from_user() => {
                println!("{} {}", "you:".green().bold(), message.text());
            }
            SessionEvent::MessageAppended(_) => {}
            SessionEvent::BusyChanged(true) => println!("{}", "thinking...".dimmed()),
            SessionEvent::BusyChanged(false) => {}
            SessionEvent::Error(message) => println!("{}", message.red()),
            SessionEvent::LiveTranscript(text) => println!("{} {}", "heard:".dimmed(), text.dimmed()),
            SessionEvent::CaptureChanged(true) => println!("{}", "listening...".dimmed()),
            SessionEvent::CaptureChanged(false) => println!("{}", "stopped listening".dimmed()),
            SessionEvent::ProviderChanged(provider) => {
                println!("{} {}", "now using".dimmed(), provider.display_name().bold());
            }
            SessionEvent::Cleared => println!("{}", "conversation cleared".dimmed()),
        }
    }
}

fn save_conversation(path: &Path, state: &ConversationState) -> Result<(), String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| {
            format!("Failed to create output directory '{}': {err}", parent.display())
        })?;
    }
    let encoded = serde_json::to_string_pretty(state)
        .map_err(|err| format!("Failed to encode conversation: {err}"))?;
    fs::write(path, encoded)
        .map_err(|err| format!("Failed to write conversation to '{}': {err}", path.display()))
}
