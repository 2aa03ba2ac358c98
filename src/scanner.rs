//! Sequential discovery of the motors attached to a bus.
//!
//! The bus carries one transaction at a time, so ids are queried strictly in
//! order with a fixed pause after each one. Results are written out as soon
//! as they are known; nothing is collected.

use std::io::Write;
use std::ops::RangeInclusive;

use async_trait::async_trait;
use tokio::time::Duration;
use tracing::{debug, info};

use crate::protocol::{MotorCommand, MotorFeedback, MAX_ID};
use crate::serial_driver::{DriverError, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT};
use crate::Transport;

pub const DEFAULT_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_SCAN_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Serial device the bus adapter is attached to. Host specific.
    pub port: String,
    pub baud_rate: u32,
    pub reply_timeout: Duration,
    /// Pause after every transaction, successful or not.
    pub delay: Duration,
    pub first_id: u8,
    pub last_id: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        ScanConfig {
            port: DEFAULT_PORT.to_owned(),
            baud_rate: DEFAULT_BAUD_RATE,
            reply_timeout: DEFAULT_TIMEOUT,
            delay: DEFAULT_SCAN_DELAY,
            first_id: 0,
            last_id: MAX_ID,
        }
    }
}

impl ScanConfig {
    pub fn ids(&self) -> Result<RangeInclusive<u8>, DriverError> {
        if self.last_id > MAX_ID {
            return Err(DriverError::InvalidId(self.last_id));
        }
        if self.first_id > self.last_id {
            return Err(DriverError::InvalidRange {
                first: self.first_id,
                last: self.last_id,
            });
        }
        Ok(self.first_id..=self.last_id)
    }
}

/// Source of the pause between transactions.
#[async_trait]
pub trait Delay: Send {
    async fn delay(&mut self, duration: Duration);
}

pub struct TokioDelay;

#[async_trait]
impl Delay for TokioDelay {
    async fn delay(&mut self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct BusScanner<T, D> {
    transport: T,
    delay: D,
    ids: RangeInclusive<u8>,
    interval: Duration,
}

impl<T: Transport, D: Delay> BusScanner<T, D> {
    pub fn new(
        transport: T,
        delay: D,
        config: &ScanConfig,
    ) -> Result<BusScanner<T, D>, DriverError> {
        Ok(BusScanner {
            transport,
            delay,
            ids: config.ids()?,
            interval: config.delay,
        })
    }

    /// Queries every configured id once, in ascending order.
    ///
    /// A failed transaction is reported as "no response" whatever the cause;
    /// the cause itself only goes to the debug log. Errors are returned only
    /// when writing to `out` fails.
    pub async fn scan<W: Write>(&mut self, out: &mut W) -> Result<(), DriverError> {
        writeln!(out, "Scanning bus for motor IDs...")?;
        for id in self.ids.clone() {
            let command = MotorCommand::query(id);
            match self.transport.transact(&command).await {
                Ok(feedback) => {
                    info!(id, "motor found");
                    write_found(out, id, &feedback)?;
                }
                Err(error) => {
                    debug!(id, %error, "no response");
                    writeln!(out, "ID {}: no response", id)?;
                }
            }
            self.delay.delay(self.interval).await;
        }
        writeln!(out, "Scan complete")?;
        Ok(())
    }
}

fn write_found<W: Write>(out: &mut W, id: u8, feedback: &MotorFeedback) -> std::io::Result<()> {
    writeln!(out, "Found motor - ID: {}", id)?;
    writeln!(out, "  position: {:.3}", feedback.position)?;
    writeln!(out, "  velocity: {:.3}", feedback.velocity)?;
    writeln!(out, "  temperature: {}°C", feedback.temperature)?;
    writeln!(out, "  error: {}", feedback.error)
}

/// Opens the transport with `open` and scans the configured range.
///
/// Nothing is written and no transaction happens when the range is invalid
/// or the transport fails to open.
pub async fn open_and_scan<T, D, F, W>(
    config: &ScanConfig,
    open: F,
    delay: D,
    out: &mut W,
) -> Result<(), DriverError>
where
    T: Transport,
    D: Delay,
    F: FnOnce(&ScanConfig) -> Result<T, DriverError>,
    W: Write,
{
    config.ids()?;
    let transport = open(config)?;
    let mut scanner = BusScanner::new(transport, delay, config)?;
    scanner.scan(out).await
}
