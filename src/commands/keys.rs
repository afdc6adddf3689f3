use std::io::{self, IsTerminal, Read};

use clap::{Args, Subcommand};

use crate::config;
use crate::credentials::{CredentialStore, EnvOverride, FileCredentialStore};
use crate::llm::Provider;

#[derive(Debug, Args, Clone)]
pub struct KeysArgs {
    #[command(subcommand)]
    command: KeysSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum KeysSubcommand {
    /// Save a provider API key. Read from stdin when KEY is omitted.
    Set { provider: String, key: Option<String> },
    /// Show which providers have a key, without printing it.
    Status,
    /// Remove a saved provider API key.
    Clear { provider: String },
}

pub fn run(args: KeysArgs) -> Result<(), String> {
    let path = config::credentials_path().map_err(|err| err.to_string())?;
    let store = EnvOverride::new(FileCredentialStore::new(&path));

    match args.command {
        KeysSubcommand::Set { provider, key } => {
            let provider: Provider = provider.parse()?;
            let key = match key {
                Some(key) => key,
                None => read_key_from_stdin()?,
            };
            if key.trim().is_empty() {
                return Err("No key provided.".to_string());
            }
            store
                .set_key(provider, &key)
                .map_err(|err| err.to_string())?;
            println!("saved {} key to {}", provider.as_str(), path.display());
        }
        KeysSubcommand::Status => {
            for provider in Provider::ALL {
                let status = if store.from_env(provider) {
                    format!("set via {}", provider.api_key_env())
                } else if store.has_key(provider) {
                    "saved".to_string()
                } else {
                    "missing".to_string()
                };
                println!("{}: {status}", provider.as_str());
            }
        }
        KeysSubcommand::Clear { provider } => {
            let provider: Provider = provider.parse()?;
            store
                .set_key(provider, "")
                .map_err(|err| err.to_string())?;
            println!("cleared {} key", provider.as_str());
        }
    }
    Ok(())
}

fn read_key_from_stdin() -> Result<String, String> {
    let mut stdin = io::stdin();
    if stdin.is_terminal() {
        return Err("No key provided. Pass it as an argument or pipe it on stdin.".to_string());
    }
    let mut key = String::new();
    stdin
        .read_to_string(&mut key)
        .map_err(|err| format!("Failed to read key from stdin: {err}"))?;
    Ok(key)
}
