mod common;

use anyhow::Context;
use std::time::Duration;
use structopt::StructOpt;
use unitree_motor_driver::{open_and_scan, ScanConfig, TokioDelay, UnitreeDriver};

#[derive(StructOpt)]
#[structopt(about = "Finds which motor ids answer on the bus")]
struct Args {
    #[structopt(flatten)]
    port: common::PortArgs,
    /// Pause after each query, in milliseconds
    #[structopt(long)]
    delay_ms: Option<u64>,
    /// First id to query
    #[structopt(long)]
    first_id: Option<u8>,
    /// Last id to query
    #[structopt(long)]
    last_id: Option<u8>,
}

impl Args {
    fn scan_config(&self) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            port: self.port.port().to_owned(),
            baud_rate: self.port.baud_rate(),
            reply_timeout: self.port.reply_timeout(),
            delay: self
                .delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.delay),
            first_id: self.first_id.unwrap_or(defaults.first_id),
            last_id: self.last_id.unwrap_or(defaults.last_id),
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    common::init_logging();
    let args = Args::from_args();
    let config = args.scan_config();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    open_and_scan(
        &config,
        |config| UnitreeDriver::with_settings(&config.port, config.baud_rate, config.reply_timeout),
        TokioDelay,
        &mut out,
    )
    .await
    .with_context(|| format!("scan on {} failed", config.port))?;
    Ok(())
}
