//! CLI argument parsing definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a YAML configuration file; TETHER_* variables override it
    #[arg(long, value_name = "PATH", env = "TETHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Print a sample configuration and exit
    #[arg(long)]
    pub print_sample_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flags() {
        let cli = Cli::try_parse_from(["tether", "--config", "worker.yaml", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("worker.yaml")));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(!cli.print_sample_config);
    }
}
