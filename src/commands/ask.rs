use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::config::{self, CliOverrides, OutputMode};
use crate::credentials::{CredentialStore, EnvOverride, FileCredentialStore};
use crate::llm::prompt::{HOMEWORK_PROMPT, system_prompt};
use crate::llm::{OutboundQuery, ProviderClient, ProviderError};
use crate::logging::{self, Verbosity};

#[derive(Debug, Args, Clone)]
pub struct AskArgs {
    /// Question to ask. Read from stdin when omitted.
    prompt: Option<String>,
    /// Provider to ask: openai or gemini.
    #[arg(long)]
    provider: Option<String>,
    /// Model for the selected provider.
    #[arg(long)]
    model: Option<String>,
    /// Age of the child asking.
    #[arg(long)]
    age: Option<String>,
    /// Photo of homework to attach.
    #[arg(long, value_name = "PATH")]
    image: Option<PathBuf>,
    /// Profile from the config file.
    #[arg(long)]
    profile: Option<String>,
    /// Request timeout in seconds.
    #[arg(long)]
    timeout: Option<u64>,
    /// Output format: text or json.
    #[arg(long)]
    output: Option<String>,
    /// Shorthand for --output json.
    #[arg(long)]
    json: bool,
    /// Print the request that would be sent, without sending it.
    #[arg(long)]
    dry_run: bool,
    #[arg(short, long)]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

impl AskArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            profile: self.profile.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            age: self.age.clone(),
            timeout: self.timeout,
            output: if self.json {
                Some(OutputMode::Json.as_str().to_string())
            } else {
                self.output.clone()
            },
            ..CliOverrides::default()
        }
    }
}

pub async fn run(args: AskArgs) -> Result<(), String> {
    logging::init(Verbosity::from_flags(args.verbose, args.quiet));

    let resolved = config::resolve(&args.overrides()).map_err(|err| err.to_string())?;
    let provider = resolved.provider;

    let attached_image = match &args.image {
        Some(path) => Some(
            fs::read(path)
                .map_err(|err| format!("Failed to read image '{}': {err}", path.display()))?,
        ),
        None => None,
    };
    let user_text = question_text(args.prompt.as_deref(), attached_image.is_some()).await?;

    let query = OutboundQuery {
        user_text,
        system_prompt: system_prompt(&resolved.age),
        attached_image,
        provider,
    };

    let credentials_path = config::credentials_path().map_err(|err| err.to_string())?;
    let credentials: Arc<dyn CredentialStore> =
        Arc::new(EnvOverride::new(FileCredentialStore::new(credentials_path)));
    let api_key_present = credentials.has_key(provider);
    debug!(
        provider = provider.as_str(),
        model = resolved.providers.model(provider),
        api_key_present,
        "resolved ask settings"
    );

    if args.dry_run {
        // The placeholder never leaves the process.
        let prepared = provider
            .prepare(&query, "dry-run", &resolved.providers)
            .map_err(|err| err.to_string())?;
        let body = json!({
            "dry_run": true,
            "provider": provider.as_str(),
            "model": resolved.providers.model(provider),
            "url": prepared.url,
            "auth": prepared.auth.describe(),
            "api_key_present": api_key_present,
            "output": resolved.output.as_str(),
            "timeout_secs": resolved.providers.timeout_secs,
            "request": prepared.body,
        });
        println!("{body}");
        return Ok(());
    }

    let client = ProviderClient::new(credentials, resolved.providers.clone());
    let started = Instant::now();
    let reply = client.ask(&query).await.map_err(describe_failure)?;
    let latency_ms = started.elapsed().as_millis();

    match resolved.output {
        OutputMode::Text => println!("{reply}"),
        OutputMode::Json => println!(
            "{}",
            json!({
                "provider": provider.as_str(),
                "model": resolved.providers.model(provider),
                "reply": reply,
                "latency_ms": latency_ms,
            })
        ),
    }
    Ok(())
}

async fn question_text(prompt: Option<&str>, has_image: bool) -> Result<String, String> {
    let text = match prompt {
        Some(prompt) => prompt.to_string(),
        None if has_image => HOMEWORK_PROMPT.to_string(),
        None if std::io::stdin().is_terminal() => String::new(),
        None => {
            let mut buffer = String::new();
            tokio::io::stdin()
                .read_to_string(&mut buffer)
                .await
                .map_err(|err| format!("Failed to read question from stdin: {err}"))?;
            buffer
        }
    };

    let text = text.trim();
    if text.is_empty() {
        return Err("No question provided. Pass it as an argument or pipe it on stdin.".to_string());
    }
    Ok(text.to_string())
}

fn describe_failure(err: ProviderError) -> String {
    match err {
        ProviderError::MissingCredential { provider } => format!(
            "{err}. Run `kidtutor keys set {}` or set {}.",
            provider.as_str(),
            provider.api_key_env()
        ),
        other => other.to_string(),
    }
}
