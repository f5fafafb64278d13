// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Field definitions, well-known field indexes, and flight-controller configuration shared
//! between the header parser and the frame decoder.

use bitflags::bitflags;

/// The ASCII marker that opens every log within a container.
pub const LOG_START_MARKER: &[u8] =
    b"H Product:Blackbox flight data recorder by Nicholas Sherlock\n";

/// The maximum number of fields a single frame definition may carry.
pub const MAX_FIELDS: usize = 128;

/// The maximum number of motor fields.
pub const MAX_MOTORS: usize = 8;
/// The maximum number of servo fields.
pub const MAX_SERVOS: usize = 8;

/// Absolute index of the `loopIteration` field within a main frame.
pub const FIELD_INDEX_ITERATION: usize = 0;
/// Absolute index of the `time` field within a main frame.
pub const FIELD_INDEX_TIME: usize = 1;

/// Frames whose iteration index jumps by more than this are considered corrupt.
pub const MAX_ITERATION_JUMP: u32 = 500 * 10;
/// Frames whose timestamp jumps by more than this (in microseconds) are considered corrupt. Also
/// bounds the wrap-around distance accepted as a 32-bit timestamp rollover.
pub const MAX_TIME_JUMP_US: i64 = 10 * 1_000_000;

/// Event type byte: loggger synchronisation beep.
pub const EVENT_SYNC_BEEP: u8 = 0;
/// Event type byte: in-flight adjustment of a tuning parameter.
pub const EVENT_INFLIGHT_ADJUSTMENT: u8 = 13;
/// Event type byte: logging resumed after a pause.
pub const EVENT_LOGGING_RESUME: u8 = 14;
/// Event type byte: end of log marker.
pub const EVENT_LOG_END: u8 = 255;

/// The per-field wire encoding declared by the `Field <T> encoding` header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldEncoding {
    /// ZigZag-mapped base-128 variable byte.
    SignedVb,
    /// Base-128 variable byte.
    UnsignedVb,
    /// Unsigned variable byte holding a negated 14-bit two's complement value.
    Neg14Bit,
    /// Elias delta prefix code, unsigned.
    EliasDeltaU32,
    /// Elias delta prefix code, zigzag-mapped.
    EliasDeltaS32,
    /// Up-to-eight signed variable bytes behind a presence bitmask.
    Tag8_8Svb,
    /// Three signed values behind a 2-bit width selector.
    Tag2_3S32,
    /// Four signed 16-bit values behind a packed type selector.
    Tag8_4S16,
    /// No bytes on the wire; the field is pure prediction.
    Null,
    /// Elias gamma prefix code, unsigned.
    EliasGammaU32,
    /// Elias gamma prefix code, zigzag-mapped.
    EliasGammaS32,
    /// An encoding this decoder does not recognise. The field is skipped.
    Unknown,
}

impl FieldEncoding {
    /// Maps a `Field <T> encoding` header value to an encoding.
    pub fn from_header_value(value: i64) -> FieldEncoding {
        match value {
            0 => FieldEncoding::SignedVb,
            1 => FieldEncoding::UnsignedVb,
            3 => FieldEncoding::Neg14Bit,
            4 => FieldEncoding::EliasDeltaU32,
            5 => FieldEncoding::EliasDeltaS32,
            6 => FieldEncoding::Tag8_8Svb,
            7 => FieldEncoding::Tag2_3S32,
            8 => FieldEncoding::Tag8_4S16,
            9 => FieldEncoding::Null,
            10 => FieldEncoding::EliasGammaU32,
            11 => FieldEncoding::EliasGammaS32,
            _ => FieldEncoding::Unknown,
        }
    }
}

/// The per-field reconstruction rule declared by the `Field <T> predictor` header. The predictor
/// contribution is added to the decoded raw value to produce the final field value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldPredictor {
    /// No contribution.
    Zero,
    /// The field's value in the previous frame.
    Previous,
    /// Linear extrapolation from the two previous frames.
    StraightLine,
    /// Average of the two previous frames.
    Average2,
    /// The `minthrottle` system constant.
    MinThrottle,
    /// The already-decoded `motor[0]` field of the current frame.
    Motor0,
    /// The frame counter: one past the last emitted iteration, plus any scheduled skips. The
    /// decoded raw value is ignored.
    Increment,
    /// The first home coordinate of the last GPS home frame.
    HomeCoord,
    /// The constant 1500.
    FifteenHundred,
    /// The `vbatref` system constant.
    VBatRef,
    /// The timestamp of the previous main frame.
    LastMainFrameTime,
    /// The `motorOutput` low system constant.
    MinMotor,
    /// The second home coordinate of the last GPS home frame. Not a wire value: the schema
    /// rewrite assigns it to the second of two consecutive `HomeCoord` fields.
    HomeCoord1,
}

impl FieldPredictor {
    /// Maps a `Field <T> predictor` header value to a predictor. Unrecognised values contribute
    /// nothing and map to [`FieldPredictor::Zero`].
    pub fn from_header_value(value: i64) -> FieldPredictor {
        match value {
            0 => FieldPredictor::Zero,
            1 => FieldPredictor::Previous,
            2 => FieldPredictor::StraightLine,
            3 => FieldPredictor::Average2,
            4 => FieldPredictor::MinThrottle,
            5 => FieldPredictor::Motor0,
            6 => FieldPredictor::Increment,
            7 => FieldPredictor::HomeCoord,
            8 => FieldPredictor::FifteenHundred,
            9 => FieldPredictor::VBatRef,
            10 => FieldPredictor::LastMainFrameTime,
            11 => FieldPredictor::MinMotor,
            _ => FieldPredictor::Zero,
        }
    }
}

/// The firmware family that produced a log. Affects the gyro scale conversion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FirmwareType {
    #[default]
    Unknown,
    Baseflight,
    Cleanflight,
    Betaflight,
}

/// Definition of the fields of one frame type (I, P, G, H, or S), as declared by the
/// `Field <T> ...` header lines.
#[derive(Clone, Debug)]
pub struct FrameDef {
    pub field_names: Vec<String>,
    pub field_count: usize,
    pub field_signed: [bool; MAX_FIELDS],
    /// Byte-width hint per field. Fields of width 8 keep their full 64-bit reconstruction;
    /// everything else truncates to 32 bits after prediction.
    pub field_width: [u32; MAX_FIELDS],
    pub predictor: [FieldPredictor; MAX_FIELDS],
    pub encoding: [FieldEncoding; MAX_FIELDS],
}

impl Default for FrameDef {
    fn default() -> Self {
        FrameDef {
            field_names: Vec::new(),
            field_count: 0,
            field_signed: [false; MAX_FIELDS],
            field_width: [4; MAX_FIELDS],
            predictor: [FieldPredictor::Zero; MAX_FIELDS],
            encoding: [FieldEncoding::SignedVb; MAX_FIELDS],
        }
    }
}

/// The frame definitions of one log, keyed by frame-type tag byte.
#[derive(Clone, Debug, Default)]
pub struct FrameDefs {
    pub intra: FrameDef,
    pub inter: FrameDef,
    pub gps: FrameDef,
    pub gps_home: FrameDef,
    pub slow: FrameDef,
}

impl FrameDefs {
    /// Returns the frame definition for a frame-type tag byte.
    pub fn by_tag(&self, tag: u8) -> Option<&FrameDef> {
        match tag {
            b'I' => Some(&self.intra),
            b'P' => Some(&self.inter),
            b'G' => Some(&self.gps),
            b'H' => Some(&self.gps_home),
            b'S' => Some(&self.slow),
            _ => None,
        }
    }

    /// Returns a mutable frame definition for a frame-type tag byte.
    pub fn by_tag_mut(&mut self, tag: u8) -> Option<&mut FrameDef> {
        match tag {
            b'I' => Some(&mut self.intra),
            b'P' => Some(&mut self.inter),
            b'G' => Some(&mut self.gps),
            b'H' => Some(&mut self.gps_home),
            b'S' => Some(&mut self.slow),
            _ => None,
        }
    }
}

/// Flight-controller configuration extracted from the header. Immutable once parsed; read by the
/// predictors during frame decoding.
#[derive(Clone, Debug)]
pub struct SysConfig {
    pub minthrottle: i32,
    pub maxthrottle: i32,
    pub motor_output_low: i32,
    pub motor_output_high: i32,

    pub rc_rate: i32,

    pub acc_1g: i32,
    pub gyro_scale: f32,

    pub vbatscale: i32,
    pub vbatmaxcellvoltage: i32,
    pub vbatmincellvoltage: i32,
    pub vbatwarningcellvoltage: i32,

    pub current_meter_offset: i32,
    pub current_meter_scale: i32,

    pub vbatref: i32,

    pub firmware_type: FirmwareType,
}

impl Default for SysConfig {
    fn default() -> Self {
        SysConfig {
            minthrottle: 1150,
            maxthrottle: 1850,
            motor_output_low: 1150,
            motor_output_high: 1850,
            rc_rate: 90,
            acc_1g: 1,
            gyro_scale: 1.0,
            vbatscale: 110,
            vbatmaxcellvoltage: 43,
            vbatmincellvoltage: 33,
            vbatwarningcellvoltage: 35,
            current_meter_offset: 0,
            current_meter_scale: 400,
            vbatref: 4095,
            firmware_type: FirmwareType::Unknown,
        }
    }
}

/// Well-known field indexes within the main (I/P) frame. `None` when the field is not logged.
#[derive(Clone, Debug, Default)]
pub struct MainFieldIndexes {
    pub loop_iteration: Option<usize>,
    pub time: Option<usize>,
    /// PID terms indexed as `pid[term][axis]`, term 0..3 = P, I, D.
    pub pid: [[Option<usize>; 3]; 3],
    pub rc_command: [Option<usize>; 4],
    pub vbat_latest: Option<usize>,
    pub amperage_latest: Option<usize>,
    pub mag_adc: [Option<usize>; 3],
    pub baro_alt: Option<usize>,
    pub sonar_raw: Option<usize>,
    pub rssi: Option<usize>,
    pub gyro_adc: [Option<usize>; 3],
    pub acc_smooth: [Option<usize>; 3],
    pub motor: [Option<usize>; MAX_MOTORS],
    pub servo: [Option<usize>; MAX_SERVOS],
}

/// Well-known field indexes within the GPS frame.
#[derive(Clone, Debug, Default)]
pub struct GpsFieldIndexes {
    pub time: Option<usize>,
    pub num_sat: Option<usize>,
    pub coord: [Option<usize>; 2],
    pub altitude: Option<usize>,
    pub speed: Option<usize>,
    pub ground_course: Option<usize>,
}

/// Well-known field indexes within the GPS home frame.
#[derive(Clone, Debug, Default)]
pub struct GpsHomeFieldIndexes {
    pub home: [Option<usize>; 2],
}

/// Well-known field indexes within the slow frame.
#[derive(Clone, Debug, Default)]
pub struct SlowFieldIndexes {
    pub flight_mode_flags: Option<usize>,
    pub state_flags: Option<usize>,
    pub failsafe_phase: Option<usize>,
}

bitflags! {
    /// Flight mode bit mask carried by the slow frame's `flightModeFlags` field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FlightModeFlags: u32 {
        const ANGLE       = 0x0000_0001;
        const HORIZON     = 0x0000_0002;
        const MAG         = 0x0000_0004;
        const BARO        = 0x0000_0008;
        const GPS_HOME    = 0x0000_0010;
        const GPS_HOLD    = 0x0000_0020;
        const HEADFREE    = 0x0000_0040;
        const UNUSED      = 0x0000_0080;
        const PASSTHRU    = 0x0000_0100;
        const RANGEFINDER = 0x0000_0200;
        const FAILSAFE    = 0x0000_0400;
    }
}

bitflags! {
    /// Flight state bit mask carried by the slow frame's `stateFlags` field.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct StateFlags: u32 {
        const GPS_FIX_HOME  = 0x0000_0001;
        const GPS_FIX       = 0x0000_0002;
        const CALIBRATE_MAG = 0x0000_0004;
        const SMALL_ANGLE   = 0x0000_0008;
        const FIXED_WING    = 0x0000_0010;
    }
}

/// Failsafe phase carried by the slow frame's `failsafePhase` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailsafePhase {
    Idle,
    RxLossDetected,
    Landing,
    Landed,
    RxLossMonitoring,
    RxLossRecovered,
    Unknown,
}

impl FailsafePhase {
    /// Maps a decoded `failsafePhase` field value to a phase.
    pub fn from_value(value: i64) -> FailsafePhase {
        match value {
            0 => FailsafePhase::Idle,
            1 => FailsafePhase::RxLossDetected,
            2 => FailsafePhase::Landing,
            3 => FailsafePhase::Landed,
            4 => FailsafePhase::RxLossMonitoring,
            5 => FailsafePhase::RxLossRecovered,
            _ => FailsafePhase::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_log_start_marker() {
        assert_eq!(LOG_START_MARKER.len(), 61);
        assert!(LOG_START_MARKER.starts_with(b"H Product:"));
        assert!(LOG_START_MARKER.ends_with(b"\n"));
    }

    #[test]
    fn verify_encoding_from_header_value() {
        assert_eq!(FieldEncoding::from_header_value(0), FieldEncoding::SignedVb);
        assert_eq!(FieldEncoding::from_header_value(1), FieldEncoding::UnsignedVb);
        assert_eq!(FieldEncoding::from_header_value(9), FieldEncoding::Null);
        assert_eq!(FieldEncoding::from_header_value(11), FieldEncoding::EliasGammaS32);
        // 2 is a historical gap in the encoding table.
        assert_eq!(FieldEncoding::from_header_value(2), FieldEncoding::Unknown);
        assert_eq!(FieldEncoding::from_header_value(99), FieldEncoding::Unknown);
    }

    #[test]
    fn verify_predictor_from_header_value() {
        assert_eq!(FieldPredictor::from_header_value(0), FieldPredictor::Zero);
        assert_eq!(FieldPredictor::from_header_value(6), FieldPredictor::Increment);
        assert_eq!(FieldPredictor::from_header_value(11), FieldPredictor::MinMotor);
        assert_eq!(FieldPredictor::from_header_value(42), FieldPredictor::Zero);
    }

    #[test]
    fn verify_failsafe_phase_from_value() {
        assert_eq!(FailsafePhase::from_value(0), FailsafePhase::Idle);
        assert_eq!(FailsafePhase::from_value(5), FailsafePhase::RxLossRecovered);
        assert_eq!(FailsafePhase::from_value(6), FailsafePhase::Unknown);
    }
}
