use std::f32::consts::TAU;
use std::fmt;

use crate::serial_driver::DriverError;

pub(crate) const COMMAND_HEADER: [u8; 2] = [0xFE, 0xEE];
pub(crate) const FEEDBACK_HEADER: [u8; 2] = [0xFD, 0xEE];
pub(crate) const COMMAND_LEN: usize = 17;
pub(crate) const FEEDBACK_LEN: usize = 16;

/// Highest address representable in the 4 bit id field.
pub const MAX_ID: u8 = 15;

// kp and kd are sent as q15 fractions of this value
const GAIN_SCALE: f32 = 25.6;

/// CRC-16/CCITT, reflected (poly 0x8408, init 0).
pub(crate) fn calc_crc(payload: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for b in payload {
        crc ^= *b as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MotorType {
    GoM8010_6,
}

impl MotorType {
    pub fn gear_ratio(&self) -> f32 {
        match self {
            MotorType::GoM8010_6 => 6.33,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MotorMode {
    Brake = 0,
    Foc = 1,
    Calibrate = 2,
}

impl MotorMode {
    pub fn from_status(status: u8) -> Option<MotorMode> {
        match status {
            0 => Some(MotorMode::Brake),
            1 => Some(MotorMode::Foc),
            2 => Some(MotorMode::Calibrate),
            _ => None,
        }
    }
}

/// Error code reported in the 3 bit fault field of a feedback frame.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum MotorFault {
    None,
    Overheat,
    Overcurrent,
    Overvoltage,
    EncoderFault,
    Unknown(u8),
}

impl From<u8> for MotorFault {
    fn from(code: u8) -> Self {
        match code {
            0 => MotorFault::None,
            1 => MotorFault::Overheat,
            2 => MotorFault::Overcurrent,
            3 => MotorFault::Overvoltage,
            4 => MotorFault::EncoderFault,
            other => MotorFault::Unknown(other),
        }
    }
}

impl fmt::Display for MotorFault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MotorFault::None => write!(f, "none"),
            MotorFault::Overheat => write!(f, "overheat"),
            MotorFault::Overcurrent => write!(f, "overcurrent"),
            MotorFault::Overvoltage => write!(f, "overvoltage"),
            MotorFault::EncoderFault => write!(f, "encoder_fault"),
            MotorFault::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Control command for a single motor.
///
/// Units are on the rotor side: `q` in rad, `dq` in rad/s, `tau` in N·m.
/// `kp` and `kd` are clamped by the encoding to `0.0..=25.6`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct MotorCommand {
    pub motor_type: MotorType,
    pub id: u8,
    pub mode: MotorMode,
    pub kp: f32,
    pub kd: f32,
    pub q: f32,
    pub dq: f32,
    pub tau: f32,
}

impl MotorCommand {
    pub fn new(id: u8, mode: MotorMode) -> MotorCommand {
        MotorCommand {
            motor_type: MotorType::GoM8010_6,
            id,
            mode,
            kp: 0.0,
            kd: 0.0,
            q: 0.0,
            dq: 0.0,
            tau: 0.0,
        }
    }

    /// Telemetry readback: FOC mode with zero stiffness and a small damping
    /// term, so the motor answers without being driven anywhere.
    pub fn query(id: u8) -> MotorCommand {
        MotorCommand {
            kd: 0.01,
            ..MotorCommand::new(id, MotorMode::Foc)
        }
    }

    pub fn brake(id: u8) -> MotorCommand {
        MotorCommand::new(id, MotorMode::Brake)
    }

    /// Holds `q` with stiffness `kp` and damping `kd`.
    pub fn position(id: u8, q: f32, kp: f32, kd: f32) -> MotorCommand {
        MotorCommand {
            q,
            kp,
            kd,
            ..MotorCommand::new(id, MotorMode::Foc)
        }
    }

    /// Tracks `dq` with damping `kd` and no position stiffness.
    pub fn velocity(id: u8, dq: f32, kd: f32) -> MotorCommand {
        MotorCommand {
            dq,
            kd,
            ..MotorCommand::new(id, MotorMode::Foc)
        }
    }

    /// Pure feed-forward torque, both gains zero.
    pub fn torque(id: u8, tau: f32) -> MotorCommand {
        MotorCommand {
            tau,
            ..MotorCommand::new(id, MotorMode::Foc)
        }
    }

    /// Starts encoder calibration. The motor must be free to turn.
    pub fn calibrate(id: u8) -> MotorCommand {
        MotorCommand::new(id, MotorMode::Calibrate)
    }

    pub(crate) fn serialize(&self) -> Vec<u8> {
        // float to int casts truncate and saturate
        let tor_des = (self.tau * 256.0) as i16;
        let spd_des = (self.dq / TAU * 256.0) as i16;
        let pos_des = (self.q / TAU * 32768.0) as i32;
        let k_pos = (self.kp / GAIN_SCALE * 32768.0) as u16;
        let k_spd = (self.kd / GAIN_SCALE * 32768.0) as u16;

        let mut data = Vec::with_capacity(COMMAND_LEN);
        data.extend_from_slice(&COMMAND_HEADER);
        data.push((self.id & 0x0F) | ((self.mode as u8 & 0x07) << 4));
        data.extend_from_slice(&tor_des.to_le_bytes());
        data.extend_from_slice(&spd_des.to_le_bytes());
        data.extend_from_slice(&pos_des.to_le_bytes());
        data.extend_from_slice(&k_pos.to_le_bytes());
        data.extend_from_slice(&k_spd.to_le_bytes());
        let crc = calc_crc(&data);
        data.extend_from_slice(&crc.to_le_bytes());
        data
    }
}

/// Telemetry returned by a motor in reply to any command.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct MotorFeedback {
    pub id: u8,
    pub status: u8,
    /// N·m
    pub torque: f32,
    /// rad/s
    pub velocity: f32,
    /// rad
    pub position: f32,
    /// °C
    pub temperature: i8,
    pub error: u8,
    pub foot_force: u16,
}

impl MotorFeedback {
    /// Parses a complete feedback frame, header included.
    pub(crate) fn load(frame: &[u8]) -> Result<MotorFeedback, DriverError> {
        if frame.len() != FEEDBACK_LEN || frame[..2] != FEEDBACK_HEADER {
            return Err(DriverError::ReadingError);
        }
        let checksum = u16::from_le_bytes([frame[14], frame[15]]);
        if calc_crc(&frame[..14]) != checksum {
            return Err(DriverError::ChecksumError);
        }
        let torque = i16::from_le_bytes([frame[3], frame[4]]);
        let speed = i16::from_le_bytes([frame[5], frame[6]]);
        let position = i32::from_le_bytes([frame[7], frame[8], frame[9], frame[10]]);
        let error_force = u16::from_le_bytes([frame[12], frame[13]]);
        Ok(MotorFeedback {
            id: frame[2] & 0x0F,
            status: (frame[2] >> 4) & 0x07,
            torque: torque as f32 / 256.0,
            velocity: speed as f32 * TAU / 256.0,
            position: position as f32 * TAU / 32768.0,
            temperature: frame[11] as i8,
            error: (error_force & 0x07) as u8,
            foot_force: (error_force >> 3) & 0x0FFF,
        })
    }

    pub fn mode(&self) -> Option<MotorMode> {
        MotorMode::from_status(self.status)
    }

    pub fn fault(&self) -> MotorFault {
        MotorFault::from(self.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_check_value() {
        assert_eq!(calc_crc(b"123456789"), 0x2189);
    }

    #[test]
    fn query_serialization() {
        let payload = MotorCommand::query(5).serialize();
        assert_eq!(
            payload,
            vec![254, 238, 21, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 12, 0, 12, 195]
        );
    }

    #[test]
    fn query_serialization_id_zero() {
        let payload = MotorCommand::query(0).serialize();
        assert_eq!(
            payload,
            vec![254, 238, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 12, 0, 21, 208]
        );
    }

    #[test]
    fn brake_serialization() {
        let payload = MotorCommand::brake(3).serialize();
        assert_eq!(
            payload,
            vec![254, 238, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 146, 45]
        );
    }

    #[test]
    fn control_serialization_scales_fields() {
        let command = MotorCommand {
            kp: 12.8,
            kd: 25.6,
            q: TAU / 4.0,
            dq: TAU,
            tau: -1.5,
            ..MotorCommand::new(2, MotorMode::Foc)
        };
        assert_eq!(
            command.serialize(),
            vec![254, 238, 18, 128, 254, 0, 1, 0, 32, 0, 0, 0, 64, 0, 128, 35, 245]
        );
    }

    #[test]
    fn position_command_matches_manual_fields() {
        let command = MotorCommand {
            tau: -1.5,
            dq: TAU,
            ..MotorCommand::position(2, TAU / 4.0, 12.8, 25.6)
        };
        assert_eq!(
            command.serialize(),
            vec![254, 238, 18, 128, 254, 0, 1, 0, 32, 0, 0, 0, 64, 0, 128, 35, 245]
        );
    }

    #[test]
    fn velocity_and_torque_commands() {
        let velocity = MotorCommand::velocity(1, 3.0, 0.1);
        assert_eq!(velocity.mode, MotorMode::Foc);
        assert_eq!((velocity.dq, velocity.kd, velocity.kp), (3.0, 0.1, 0.0));
        assert_eq!((velocity.q, velocity.tau), (0.0, 0.0));

        let torque = MotorCommand::torque(1, 0.75);
        assert_eq!(torque.mode, MotorMode::Foc);
        assert_eq!((torque.tau, torque.kp, torque.kd), (0.75, 0.0, 0.0));
        // 0.75 N·m in q8
        assert_eq!(&torque.serialize()[3..5], &[192, 0]);
    }

    #[test]
    fn calibrate_sets_mode_bits() {
        let payload = MotorCommand::calibrate(3).serialize();
        assert_eq!(payload[2], 0x23);
        assert!(payload[3..15].iter().all(|b| *b == 0));
    }

    #[test]
    fn gains_saturate() {
        let command = MotorCommand {
            kp: 1000.0,
            kd: -3.0,
            ..MotorCommand::new(1, MotorMode::Foc)
        };
        let payload = command.serialize();
        assert_eq!(&payload[11..13], &[0xFF, 0xFF]);
        assert_eq!(&payload[13..15], &[0x00, 0x00]);
    }

    #[test]
    fn id_is_masked_to_four_bits() {
        let payload = MotorCommand::query(0x23).serialize();
        // id 3 in the low nibble, FOC in the mode bits
        assert_eq!(payload[2], 0x13);
        assert_eq!(payload.len(), COMMAND_LEN);
    }

    #[test]
    fn feedback_load() {
        let frame = [253, 238, 21, 128, 0, 0, 255, 35, 25, 0, 0, 40, 34, 3, 58, 74];
        let feedback = MotorFeedback::load(&frame).unwrap();
        assert_eq!(feedback.id, 5);
        assert_eq!(feedback.mode(), Some(MotorMode::Foc));
        assert_eq!(feedback.torque, 0.5);
        assert_eq!(feedback.velocity, -TAU);
        assert!((feedback.position - 1.2339).abs() < 1e-3);
        assert_eq!(feedback.temperature, 40);
        assert_eq!(feedback.error, 2);
        assert_eq!(feedback.fault(), MotorFault::Overcurrent);
        assert_eq!(feedback.foot_force, 100);
    }

    #[test]
    fn feedback_load_negative_temperature() {
        let frame = [253, 238, 0, 0, 0, 0, 0, 0, 0, 0, 0, 251, 1, 0, 118, 72];
        let feedback = MotorFeedback::load(&frame).unwrap();
        assert_eq!(feedback.id, 0);
        assert_eq!(feedback.mode(), Some(MotorMode::Brake));
        assert_eq!(feedback.temperature, -5);
        assert_eq!(feedback.fault(), MotorFault::Overheat);
    }

    #[test]
    fn feedback_load_bad_checksum() {
        let frame = [253, 238, 21, 128, 0, 0, 255, 35, 25, 0, 0, 41, 34, 3, 58, 74];
        assert!(matches!(
            MotorFeedback::load(&frame),
            Err(DriverError::ChecksumError)
        ));
    }

    #[test]
    fn fault_display() {
        assert_eq!(MotorFault::from(4).to_string(), "encoder_fault");
        assert_eq!(MotorFault::from(7).to_string(), "unknown(7)");
    }
}
