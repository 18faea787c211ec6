// Configuration
// Priority: CLI > environment > defaults, with .env support

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

/// Command-line client for the portal API
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Portal origin, e.g. https://portal.example.com
    #[arg(short, long, env = "PORTAL_ORIGIN")]
    pub origin: Option<String>,

    /// Path to the session store database
    #[arg(short = 's', long, env = "PORTAL_SESSION_FILE")]
    pub session_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// HTTP request timeout in seconds
    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30")]
    pub http_timeout: u64,

    /// HTTP connect timeout in seconds
    #[arg(long, env = "HTTP_CONNECT_TIMEOUT", default_value = "10")]
    pub connect_timeout: u64,

    /// Token refresh timeout in seconds
    #[arg(long, env = "REFRESH_TIMEOUT", default_value = "15")]
    pub refresh_timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login {
        /// Account email (prompted when omitted)
        #[arg(long)]
        email: Option<String>,
    },
    /// Show the stored session
    Whoami,
    /// GET an API path with the session attached
    Get {
        /// Path under the portal origin, e.g. /api/widgets
        path: String,
    },
    /// Drop the stored session
    Logout,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub origin: String,
    pub session_file: PathBuf,
    pub log_level: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub refresh_timeout: Duration,
}

impl Config {
    /// Load configuration and the requested subcommand
    pub fn load() -> Result<(Self, Command)> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let args = CliArgs::parse();
        let config = Self::from_args(&args)?;
        Ok((config, args.command))
    }

    fn from_args(args: &CliArgs) -> Result<Self> {
        let origin = args
            .origin
            .clone()
            .context("PORTAL_ORIGIN is required (use -o or set PORTAL_ORIGIN)")?
            .trim_end_matches('/')
            .to_string();

        let session_file = args
            .session_file
            .as_deref()
            .map(expand_tilde)
            .or_else(default_session_file)
            .context("Could not determine a session store path (set PORTAL_SESSION_FILE)")?;

        let config = Config {
            origin,
            session_file,
            log_level: args.log_level.clone(),
            request_timeout: Duration::from_secs(args.http_timeout),
            connect_timeout: Duration::from_secs(args.connect_timeout),
            refresh_timeout: Duration::from_secs(args.refresh_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.origin.starts_with("http://") && !self.origin.starts_with("https://") {
            anyhow::bail!("PORTAL_ORIGIN must be an http(s) origin: {}", self.origin);
        }
        Ok(())
    }
}

/// Default session store location under the platform data directory
fn default_session_file() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("portalctl").join("session.sqlite3"))
}

/// Expand tilde (~) in file paths to the user's home directory
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_expand_tilde() {
        let path = expand_tilde("~/portal/session.sqlite3");
        assert!(path.to_string_lossy().contains("portal/session.sqlite3"));
        assert!(!path.to_string_lossy().starts_with('~'));

        let path = expand_tilde("/absolute/path");
        assert_eq!(path, PathBuf::from("/absolute/path"));

        let path = expand_tilde("relative/path");
        assert_eq!(path, PathBuf::from("relative/path"));
    }

    #[test]
    fn test_config_from_args() {
        let args = parse(&[
            "portalctl",
            "--origin",
            "https://portal.example.com/",
            "--session-file",
            "/tmp/portal-session.sqlite3",
            "whoami",
        ]);

        let config = Config::from_args(&args).unwrap();
        // Trailing slash is normalized away
        assert_eq!(config.origin, "https://portal.example.com");
        assert_eq!(
            config.session_file,
            PathBuf::from("/tmp/portal-session.sqlite3")
        );
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.refresh_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_origin_must_be_http() {
        let args = parse(&["portalctl", "--origin", "portal.example.com", "whoami"]);
        assert!(Config::from_args(&args).is_err());
    }

    #[test]
    fn test_origin_is_required() {
        let args = CliArgs {
            origin: None,
            session_file: None,
            log_level: "info".to_string(),
            http_timeout: 30,
            connect_timeout: 10,
            refresh_timeout: 15,
            command: Command::Whoami,
        };
        assert!(Config::from_args(&args).is_err());
    }
}
