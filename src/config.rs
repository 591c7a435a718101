use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Reverse proxy that routes on the first path segment.
#[derive(Parser, Debug, Clone)]
#[command(name = "signpost", version)]
pub struct Config {
    /// Port to listen on, e.g. 80 or 8080
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Host to listen on, e.g. localhost, 127.0.0.1 or ::1
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Terminate TLS on the listener
    #[arg(long)]
    pub tls: bool,

    /// Route table file (`key destination` lines, or a .yaml/.yml/.json mapping)
    #[arg(long, default_value = "routetable.txt")]
    pub routetable: PathBuf,

    /// PEM certificate chain used with --tls
    #[arg(long, default_value = "cert.pem")]
    pub cert: PathBuf,

    /// PEM private key used with --tls
    #[arg(long, default_value = "key.pem")]
    pub key: PathBuf,

    /// Seconds allowed for connecting to a backend
    #[arg(long, default_value_t = 5)]
    pub connect_timeout: u64,

    /// Seconds allowed for a whole backend exchange
    #[arg(long, default_value_t = 30)]
    pub request_timeout: u64,
}

impl Config {
    /// Parse the process arguments, exiting with usage on error.
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn listen_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}
