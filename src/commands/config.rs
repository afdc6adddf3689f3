use clap::{Args, Subcommand};

use crate::config;

#[derive(Debug, Args, Clone)]
pub struct ConfigArgs {
    #[command(subcommand)]
    command: ConfigSubcommand,
}

#[derive(Debug, Subcommand, Clone)]
enum ConfigSubcommand {
    /// Parse the config file and optionally resolve one profile.
    Check {
        #[arg(long)]
        profile: Option<String>,
    },
    /// Print where the config and credentials files live.
    Path,
}

pub fn run(args: ConfigArgs) -> Result<(), String> {
    match args.command {
        ConfigSubcommand::Check { profile } => {
            let path = config::validate_config(profile.as_deref()).map_err(|err| err.to_string())?;
            println!("config OK: {}", path.display());
        }
        ConfigSubcommand::Path => {
            let config_path = config::config_path().map_err(|err| err.to_string())?;
            let credentials_path = config::credentials_path().map_err(|err| err.to_string())?;
            println!("config: {}", config_path.display());
            println!("credentials: {}", credentials_path.display());
        }
    }
    Ok(())
}
