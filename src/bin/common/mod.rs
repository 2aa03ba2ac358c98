use std::time::Duration;

use structopt::StructOpt;
use tracing_subscriber::EnvFilter;
use unitree_motor_driver::{DEFAULT_BAUD_RATE, DEFAULT_PORT, DEFAULT_TIMEOUT};

#[derive(StructOpt, Debug)]
pub struct PortArgs {
    /// Serial device of the RS-485 adapter, /dev/ttyUSB0 when unset
    #[structopt(long, env = "UNITREE_PORT")]
    pub port: Option<String>,
    /// Bus baud rate
    #[structopt(long)]
    pub baud_rate: Option<u32>,
    /// How long to wait for a reply, in milliseconds
    #[structopt(long)]
    pub timeout_ms: Option<u64>,
}

impl PortArgs {
    pub fn port(&self) -> &str {
        self.port.as_deref().unwrap_or(DEFAULT_PORT)
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(DEFAULT_BAUD_RATE)
    }

    pub fn reply_timeout(&self) -> Duration {
        self.timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_TIMEOUT)
    }
}

/// Logs go to stderr so stdout only carries the report.
pub fn init_logging() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact()
        .init();
}
