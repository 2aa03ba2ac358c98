mod common;

use std::future::Future;
use std::io::Write;
use std::time::Duration;
use structopt::StructOpt;
use tracing::{info, warn};
use unitree_motor_driver::{DriverError, MotorType, UnitreeDriver, MAX_ID};

#[derive(StructOpt)]
#[structopt(about = "Continuously reads telemetry from one motor")]
struct Args {
    #[structopt(flatten)]
    port: common::PortArgs,
    /// Motor id
    #[structopt(long, default_value = "0")]
    id: u8,
    /// Time between reads, in milliseconds
    #[structopt(long, default_value = "100")]
    interval_ms: u64,
    /// Stop after this many reads
    #[structopt(long)]
    count: Option<u64>,
    /// Put the motor in brake mode before exiting, also on ctrl-c
    #[structopt(long)]
    brake: bool,
}

/// Polls the motor until `count` reads are done or `shutdown` resolves,
/// then brakes it if asked to.
async fn read_until<F, W>(
    driver: &mut UnitreeDriver,
    args: &Args,
    shutdown: F,
    out: &mut W,
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
    W: Write,
{
    let gear_ratio = MotorType::GoM8010_6.gear_ratio();
    let polling = async {
        let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms));
        let mut reads = 0;
        while args.count.map_or(true, |count| reads < count) {
            interval.tick().await;
            reads += 1;
            match driver.query(args.id).await {
                Ok(feedback) => writeln!(
                    out,
                    "position: {:.3} rad (output {:.3}), velocity: {:.3} rad/s, \
                     torque: {:.3} Nm, temperature: {}°C, error: {}",
                    feedback.position,
                    feedback.position / gear_ratio,
                    feedback.velocity,
                    feedback.torque,
                    feedback.temperature,
                    feedback.fault(),
                )?,
                Err(error) => warn!(id = args.id, %error, "no response"),
            }
        }
        Ok::<(), anyhow::Error>(())
    };

    tokio::select! {
        result = polling => result?,
        _ = shutdown => info!("interrupted"),
    }

    if args.brake {
        if let Err(error) = driver.brake(args.id).await {
            warn!(id = args.id, %error, "brake not acknowledged");
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    common::init_logging();
    let args = Args::from_args();
    if args.id > MAX_ID {
        return Err(DriverError::InvalidId(args.id).into());
    }
    let mut driver = UnitreeDriver::with_settings(
        args.port.port(),
        args.port.baud_rate(),
        args.port.reply_timeout(),
    )?;

    let shutdown = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            warn!(%error, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    read_until(&mut driver, &args, shutdown, &mut out).await
}
