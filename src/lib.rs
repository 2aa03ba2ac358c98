//! Async driver and bus scanner for Unitree GO-M8010-6 actuators on an
//! RS-485 serial link.
//!
//! Every exchange is one command frame answered by one feedback frame.
//! [`UnitreeDriver`] performs these transactions, [`BusScanner`] walks a range
//! of ids with them to find out which motors are attached.

mod protocol;
mod scanner;
mod serial_driver;

pub use protocol::{MotorCommand, MotorFault, MotorFeedback, MotorMode, MotorType, MAX_ID};
pub use scanner::{
    open_and_scan, BusScanner, Delay, ScanConfig, TokioDelay, DEFAULT_PORT, DEFAULT_SCAN_DELAY,
};
pub use serial_driver::{
    ClearInput, DriverError, FramedDriver, FramedSerialDriver, DEFAULT_BAUD_RATE,
    DEFAULT_TIMEOUT,
};

use async_trait::async_trait;
use std::time::Duration;

/// A request/response link that can carry one motor transaction at a time.
#[async_trait]
pub trait Transport: Send {
    async fn transact(&mut self, command: &MotorCommand) -> Result<MotorFeedback, DriverError>;
}

pub struct UnitreeDriver {
    port: Box<dyn FramedDriver>,
}

impl UnitreeDriver {
    pub fn new(port_name: &str) -> Result<UnitreeDriver, DriverError> {
        let driver = FramedSerialDriver::new(port_name)?;
        Ok(UnitreeDriver {
            port: Box::new(driver),
        })
    }

    pub fn with_baud_rate(port_name: &str, baud_rate: u32) -> Result<UnitreeDriver, DriverError> {
        let driver = FramedSerialDriver::with_baud_rate(port_name, baud_rate)?;
        Ok(UnitreeDriver {
            port: Box::new(driver),
        })
    }

    pub fn with_settings(
        port_name: &str,
        baud_rate: u32,
        reply_timeout: Duration,
    ) -> Result<UnitreeDriver, DriverError> {
        let driver = FramedSerialDriver::with_settings(port_name, baud_rate, reply_timeout)?;
        Ok(UnitreeDriver {
            port: Box::new(driver),
        })
    }

    pub fn with_framed_driver(driver: Box<dyn FramedDriver>) -> UnitreeDriver {
        UnitreeDriver { port: driver }
    }

    /// Sends one command and waits for the motor's reply.
    pub async fn send_recv(&mut self, command: MotorCommand) -> Result<MotorFeedback, DriverError> {
        self.port.send(command).await?;
        self.port.receive().await
    }

    pub async fn query(&mut self, id: u8) -> Result<MotorFeedback, DriverError> {
        self.send_recv(MotorCommand::query(id)).await
    }

    pub async fn ping(&mut self, id: u8) -> Result<(), DriverError> {
        let _feedback = self.query(id).await?;
        Ok(())
    }

    pub async fn brake(&mut self, id: u8) -> Result<MotorFeedback, DriverError> {
        self.send_recv(MotorCommand::brake(id)).await
    }

    pub async fn search_all(&mut self) -> Result<Vec<u8>, DriverError> {
        let mut ids = vec![];
        for i in 0..=MAX_ID {
            if self.ping(i).await.is_ok() {
                ids.push(i);
            }
        }
        Ok(ids)
    }
}

#[async_trait]
impl Transport for UnitreeDriver {
    async fn transact(&mut self, command: &MotorCommand) -> Result<MotorFeedback, DriverError> {
        self.send_recv(*command).await
    }
}
