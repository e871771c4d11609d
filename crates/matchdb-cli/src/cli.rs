use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "matchdb",
    about = "matchdb — inspect persistent identification-match stores",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show a store summary: name plus record counts per type
    Info(InfoArgs),
    /// Count persisted records of one type
    Count(CountArgs),
    /// Check whether a record exists for a string key
    Exists(ExistsArgs),
    /// Dump the record stored under a string key
    Show(ShowArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Path to the store directory
    pub path: String,
}

#[derive(Args)]
pub struct CountArgs {
    /// Path to the store directory
    pub path: String,
    /// Type tag, e.g. spectrum_match
    pub tag: String,
}

#[derive(Args)]
pub struct ExistsArgs {
    /// Path to the store directory
    pub path: String,
    /// Application-level string key
    pub key: String,
}

#[derive(Args)]
pub struct ShowArgs {
    /// Path to the store directory
    pub path: String,
    /// Application-level string key
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info() {
        let cli = Cli::try_parse_from(["matchdb", "info", "/data/proj"]).unwrap();
        if let Command::Info(args) = cli.command {
            assert_eq!(args.path, "/data/proj");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_count() {
        let cli = Cli::try_parse_from(["matchdb", "count", "/data/proj", "spectrum_match"]).unwrap();
        if let Command::Count(args) = cli.command {
            assert_eq!(args.tag, "spectrum_match");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_exists() {
        let cli = Cli::try_parse_from(["matchdb", "exists", "/data/proj", "scan=12"]).unwrap();
        if let Command::Exists(args) = cli.command {
            assert_eq!(args.key, "scan=12");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_show_with_json_format() {
        let cli =
            Cli::try_parse_from(["matchdb", "--format", "json", "show", "/data/proj", "scan=1"])
                .unwrap();
        assert!(matches!(cli.format, OutputFormat::Json));
        assert!(matches!(cli.command, Command::Show(_)));
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["matchdb", "--verbose", "info", "."]).unwrap();
        assert!(cli.verbose);
    }

    #[test]
    fn missing_tag_is_an_error() {
        assert!(Cli::try_parse_from(["matchdb", "count", "/data/proj"]).is_err());
    }
}
