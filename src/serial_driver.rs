use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{timeout, Duration};
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, info, trace};

use crate::protocol::{MotorCommand, MotorFeedback, FEEDBACK_HEADER, FEEDBACK_LEN};

pub const DEFAULT_BAUD_RATE: u32 = 4_000_000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20);

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DriverError {
    #[error("connection timeout")]
    Timeout,
    #[error("checksum error on arriving packet")]
    ChecksumError,
    #[error("reading error")]
    ReadingError,
    #[error("motor id {0} out of range 0-15")]
    InvalidId(u8),
    #[error("empty id range {first}..={last}")]
    InvalidRange { first: u8, last: u8 },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),
}

/// Codec for the GO-M8010-6 framing.
///
/// The decoder resynchronises on the feedback header, so bytes in front of
/// it (line noise, the echo of our own command on a half-duplex adapter) are
/// dropped. Frames failing the CRC are skipped and counted.
#[derive(Debug, Default)]
pub(crate) struct UnitreeProtocol {
    corrupt_frames: usize,
}

impl Decoder for UnitreeProtocol {
    type Item = MotorFeedback;
    type Error = DriverError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match src.windows(2).position(|w| w == &FEEDBACK_HEADER[..]) {
                Some(0) => {}
                Some(start) => {
                    trace!(skipped = start, "discarding bytes before header");
                    src.advance(start);
                }
                None => {
                    // a trailing first header byte may be completed by the next read
                    let keep = usize::from(src.last() == Some(&FEEDBACK_HEADER[0]));
                    let skipped = src.len() - keep;
                    src.advance(skipped);
                    return Ok(None);
                }
            }
            if src.len() < FEEDBACK_LEN {
                return Ok(None);
            }
            match MotorFeedback::load(&src[..FEEDBACK_LEN]) {
                Ok(feedback) => {
                    trace!(frame = ?&src[..FEEDBACK_LEN], "received frame");
                    src.advance(FEEDBACK_LEN);
                    return Ok(Some(feedback));
                }
                Err(DriverError::ChecksumError) => {
                    debug!(frame = ?&src[..FEEDBACK_LEN], "checksum mismatch, resyncing");
                    self.corrupt_frames += 1;
                    src.advance(1);
                }
                Err(error) => return Err(error),
            }
        }
    }
}

impl Encoder<MotorCommand> for UnitreeProtocol {
    type Error = DriverError;

    fn encode(&mut self, data: MotorCommand, buf: &mut BytesMut) -> Result<(), Self::Error> {
        let msg = data.serialize();
        trace!(frame = ?msg, "sending frame");
        buf.reserve(msg.len());
        buf.put(msg.as_ref());
        Ok(())
    }
}

/// One framed request/response link to the bus.
#[async_trait]
pub trait FramedDriver: Send {
    async fn send(&mut self, command: MotorCommand) -> Result<(), DriverError>;
    async fn receive(&mut self) -> Result<MotorFeedback, DriverError>;
}

/// Byte streams whose pending, not yet read input can be discarded.
pub trait ClearInput {
    fn clear_input(&self) -> Result<(), DriverError>;
}

impl ClearInput for SerialStream {
    fn clear_input(&self) -> Result<(), DriverError> {
        self.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

pub struct FramedSerialDriver<S = SerialStream> {
    framed_port: Framed<S, UnitreeProtocol>,
    reply_timeout: Duration,
}

impl FramedSerialDriver {
    pub fn new(port: &str) -> Result<FramedSerialDriver, DriverError> {
        FramedSerialDriver::with_settings(port, DEFAULT_BAUD_RATE, DEFAULT_TIMEOUT)
    }

    pub fn with_baud_rate(port: &str, baud_rate: u32) -> Result<FramedSerialDriver, DriverError> {
        FramedSerialDriver::with_settings(port, baud_rate, DEFAULT_TIMEOUT)
    }

    pub fn with_settings(
        port: &str,
        baud_rate: u32,
        reply_timeout: Duration,
    ) -> Result<FramedSerialDriver, DriverError> {
        let serial_port = tokio_serial::new(port, baud_rate)
            .timeout(reply_timeout)
            .open_native_async()?;
        info!(port, baud_rate, "serial port opened");
        Ok(FramedSerialDriver::with_stream(serial_port, reply_timeout))
    }
}

impl<S> FramedSerialDriver<S>
where
    S: AsyncRead + AsyncWrite + ClearInput + Unpin + Send,
{
    pub fn with_stream(stream: S, reply_timeout: Duration) -> FramedSerialDriver<S> {
        FramedSerialDriver {
            framed_port: UnitreeProtocol::default().framed(stream),
            reply_timeout,
        }
    }
}

#[async_trait]
impl<S> FramedDriver for FramedSerialDriver<S>
where
    S: AsyncRead + AsyncWrite + ClearInput + Unpin + Send,
{
    async fn send(&mut self, command: MotorCommand) -> Result<(), DriverError> {
        // replies to earlier requests must not be taken for this one
        self.framed_port.get_ref().clear_input()?;
        self.framed_port.read_buffer_mut().clear();
        self.framed_port.codec_mut().corrupt_frames = 0;
        self.framed_port.send(command).await?;
        Ok(())
    }

    async fn receive(&mut self) -> Result<MotorFeedback, DriverError> {
        match timeout(self.reply_timeout, self.framed_port.next()).await {
            Ok(Some(response)) => response,
            Ok(None) => Err(DriverError::ReadingError),
            Err(_) if self.framed_port.codec().corrupt_frames > 0 => {
                Err(DriverError::ChecksumError)
            }
            Err(_) => Err(DriverError::Timeout),
        }
    }
}
