//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// mTLS gatekeeper for a device-management API
#[derive(Parser, Debug)]
#[command(name = "computer-api-proxy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "COMPUTER_API_PROXY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "COMPUTER_API_PROXY_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "COMPUTER_API_PROXY_HOST")]
    pub host: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "COMPUTER_API_PROXY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "COMPUTER_API_PROXY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the proxy server (default)
    Serve,

    /// Check a client certificate against the configured CA
    VerifyCert {
        /// Path to the client certificate (PEM)
        #[arg(required = true)]
        cert: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["computer-api-proxy", "--port", "8443"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.port, Some(8443));
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn verify_cert_takes_a_path() {
        let cli = Cli::try_parse_from([
            "computer-api-proxy",
            "--config",
            "proxy.yaml",
            "verify-cert",
            "device.pem",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("proxy.yaml")));
        match cli.command {
            Some(Command::VerifyCert { cert }) => assert_eq!(cert, PathBuf::from("device.pem")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn verify_cert_requires_a_path() {
        assert!(Cli::try_parse_from(["computer-api-proxy", "verify-cert"]).is_err());
    }
}
