use std::io::{self, IsTerminal};

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    /// `--quiet` wins over `--verbose`.
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (_, true) => Self::Quiet,
            (true, false) => Self::Verbose,
            (false, false) => Self::Normal,
        }
    }

    fn directive(self) -> &'static str {
        match self {
            Self::Quiet => "off",
            Self::Normal => "warn",
            Self::Verbose => "kidtutor=debug,warn",
        }
    }
}

/// Installs the stderr subscriber. `RUST_LOG` overrides the flag-derived level
/// except in quiet mode.
pub fn init(verbosity: Verbosity) {
    let filter = match verbosity {
        Verbosity::Quiet => EnvFilter::new(verbosity.directive()),
        _ => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(verbosity.directive())),
    };

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::Verbosity;

    #[test]
    fn quiet_overrides_verbose() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(true, false), Verbosity::Verbose);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }
}
