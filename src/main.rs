use std::io;
use std::process;

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, shells};
use kidtutor::commands::ask::{self, AskArgs};
use kidtutor::commands::chat::{self, ChatArgs};
use kidtutor::commands::config::{self, ConfigArgs};
use kidtutor::commands::keys::{self, KeysArgs};

const ROOT_HELP_EXAMPLES: &str = "Examples:\n  kidtutor keys set gemini AIza...\n  kidtutor ask --age 9 \"Why is the sky blue?\"\n  kidtutor ask --provider openai --image homework.jpg\n  kidtutor chat --provider gemini --age 8\n  kidtutor completion bash > ~/.local/share/bash-completion/completions/kidtutor";

const ASK_HELP_EXAMPLES: &str = "Examples:\n  kidtutor ask --age 9 \"How do plants eat?\"\n  echo \"What is a fraction?\" | kidtutor ask --provider openai\n  kidtutor ask --provider gemini --image homework.jpg --dry-run --json";

#[derive(Debug, Parser)]
#[command(
    name = "kidtutor",
    about = "Kid-safe AI teacher backed by ChatGPT or Gemini",
    version = kidtutor::VERSION,
    after_help = ROOT_HELP_EXAMPLES
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Ask the teacher one question", after_help = ASK_HELP_EXAMPLES)]
    Ask(AskArgs),
    #[command(about = "Start an interactive conversation")]
    Chat(ChatArgs),
    #[command(about = "Manage provider API keys")]
    Keys(KeysArgs),
    #[command(about = "Manage local config")]
    Config(ConfigArgs),
    #[command(about = "Generate shell completion script")]
    Completion {
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

fn print_completion(shell: CompletionShell) {
    let mut cmd = Cli::command();
    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, "kidtutor", &mut io::stdout()),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, "kidtutor", &mut io::stdout()),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, "kidtutor", &mut io::stdout()),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Ask(args) => ask::run(args).await,
        Commands::Chat(args) => chat::run(args).await,
        Commands::Keys(args) => keys::run(args),
        Commands::Config(args) => config::run(args),
        Commands::Completion { shell } => {
            print_completion(shell);
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}
