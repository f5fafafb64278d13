// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `frame` module implements the stateful frame decoder.
//!
//! Main (I/P) frames reconstruct one row of field values each by decoding a raw scalar per field
//! and adding a per-field predictor contribution. Predictors reference up to two previous rows
//! held in a three-slot history ring, the partially decoded current row, the last GPS home frame,
//! and header constants. GPS, GPS home, and slow frames decode into last-seen state, and event
//! frames carry out-of-band markers.
//!
//! The decoder is resilient: a frame that fails iteration/time validation is discarded, the
//! history is cleared so that no later frame predicts from bad data, and decoding continues until
//! the next intraframe re-establishes a baseline.

use aerolog_core::io::BitReader;

use log::debug;

use crate::codec::*;
use crate::header::LogHeader;
use crate::schema::*;

/// A decoded event frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LogEvent {
    /// The flight controller beeped to synchronise external recordings.
    SyncBeep { time: i64 },
    /// A tuning parameter was adjusted mid-flight.
    InflightAdjustment { function: u8, value: AdjustmentValue },
    /// Logging resumed after a pause. Declares the iteration and time the stream continues at.
    LoggingResume { iteration: u32, time: i64 },
    /// The end-of-log marker. Data beyond it does not belong to this log.
    LogEnd,
}

/// The payload of an in-flight adjustment event.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AdjustmentValue {
    Int(i32),
    Float(f32),
}

/// The frame types that decode through the generic field loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameKind {
    Intra,
    Inter,
    Gps,
    GpsHome,
    Slow,
}

/// Decodes data frames from a log's byte window, maintaining the inter-frame state that
/// prediction requires.
pub struct FrameParser<'h> {
    header: &'h LogHeader,

    /// Three physical row buffers cycled by the history ring.
    ring: [[i64; MAX_FIELDS]; 3],
    /// Ring slot the in-flight frame decodes into.
    current: usize,
    /// Ring slot of the previous committed row, if prediction history is intact.
    prev: Option<usize>,
    /// Ring slot of the row before the previous, if prediction history is intact.
    prev2: Option<usize>,

    main_stream_valid: bool,

    last_gps: [i64; MAX_FIELDS],
    /// Slot 0 receives the in-flight home frame; slot 1 is the last published home position.
    gps_home: [[i64; MAX_FIELDS]; 2],
    gps_home_valid: bool,
    last_slow: [i64; MAX_FIELDS],

    /// Total of all 32-bit timestamp wrap-arounds observed, always a multiple of 2^32.
    time_rollover_accumulator: i64,
    last_main_iteration: Option<u32>,
    last_main_time: Option<i64>,
    last_skipped_frames: u32,
}

impl<'h> FrameParser<'h> {
    pub fn new(header: &'h LogHeader) -> Self {
        FrameParser {
            header,
            ring: [[0; MAX_FIELDS]; 3],
            current: 0,
            prev: None,
            prev2: None,
            main_stream_valid: false,
            last_gps: [0; MAX_FIELDS],
            gps_home: [[0; MAX_FIELDS]; 2],
            gps_home_valid: false,
            last_slow: [0; MAX_FIELDS],
            time_rollover_accumulator: 0,
            last_main_iteration: None,
            last_main_time: None,
            last_skipped_frames: 0,
        }
    }

    /// Returns true while the main frame stream is intact. Cleared when corruption is detected
    /// and re-established by the next valid intraframe.
    pub fn main_stream_valid(&self) -> bool {
        self.main_stream_valid
    }

    /// The most recently committed main frame row, if any.
    pub fn prev_row(&self) -> Option<&[i64]> {
        self.prev.map(|p| &self.ring[p][..])
    }

    /// The last decoded GPS frame.
    pub fn gps_row(&self) -> &[i64] {
        &self.last_gps
    }

    /// The last published GPS home position.
    pub fn home_row(&self) -> &[i64] {
        &self.gps_home[1]
    }

    /// Returns true once a GPS home frame has been published.
    pub fn gps_home_valid(&self) -> bool {
        self.gps_home_valid
    }

    /// The last decoded slow frame.
    pub fn slow_row(&self) -> &[i64] {
        &self.last_slow
    }

    /// The number of schedule slots skipped before the last interframe.
    pub fn last_skipped_frames(&self) -> u32 {
        self.last_skipped_frames
    }

    /// Parses an intraframe into the current row. Returns true if the frame was committed.
    ///
    /// A committed intraframe collapses the history: both previous rows become this row, so
    /// interframe prediction restarts from a self-contained baseline.
    pub fn parse_intraframe(&mut self, reader: &mut BitReader<'_>, raw: bool) -> bool {
        let prev = self.prev;
        self.parse_fields(reader, FrameKind::Intra, prev, None, 0, raw);

        // A frame cut short by the end of the window decodes its missing fields as zero.
        // Discard it rather than commit fabricated values; a longer window will re-decode it.
        if reader.is_eof() {
            debug!("bbl: intraframe truncated by end of stream");
            self.invalidate_stream();
            return false;
        }

        let time = self.detect_time_rollover(self.ring[self.current][FIELD_INDEX_TIME]);
        self.ring[self.current][FIELD_INDEX_TIME] = time;

        if !raw && self.last_main_iteration.is_some() && !self.validate_main_frame() {
            debug!("bbl: intraframe failed iteration/time validation");
            self.invalidate_stream();
        }
        else {
            self.main_stream_valid = true;
        }

        if self.main_stream_valid {
            self.commit_main_frame(true);
        }

        self.main_stream_valid
    }

    /// Parses an interframe into the current row. Returns true if the frame was committed.
    pub fn parse_interframe(&mut self, reader: &mut BitReader<'_>, raw: bool) -> bool {
        self.last_skipped_frames = self.count_skipped_frames();

        let (prev, prev2) = (self.prev, self.prev2);
        let skipped = self.last_skipped_frames;
        self.parse_fields(reader, FrameKind::Inter, prev, prev2, skipped, raw);

        if reader.is_eof() {
            debug!("bbl: interframe truncated by end of stream");
            self.invalidate_stream();
            return false;
        }

        let time = self.detect_time_rollover(self.ring[self.current][FIELD_INDEX_TIME]);
        self.ring[self.current][FIELD_INDEX_TIME] = time;

        if self.main_stream_valid && !raw && !self.validate_main_frame() {
            debug!("bbl: interframe failed iteration/time validation");
            self.invalidate_stream();
        }

        if self.main_stream_valid {
            self.commit_main_frame(false);
        }

        self.main_stream_valid
    }

    /// Parses a GPS frame into the last-seen GPS state.
    pub fn parse_gps_frame(&mut self, reader: &mut BitReader<'_>, raw: bool) {
        self.parse_fields(reader, FrameKind::Gps, None, None, 0, raw);

        // GPS timestamps share the main stream's rollover accumulator.
        if let Some(time_index) = self.header.gps_field_indexes.time {
            let time = self.detect_time_rollover(self.last_gps[time_index]);
            self.last_gps[time_index] = time;
        }
    }

    /// Parses a GPS home frame and publishes it for the HomeCoord predictors.
    pub fn parse_gps_home_frame(&mut self, reader: &mut BitReader<'_>, raw: bool) {
        self.parse_fields(reader, FrameKind::GpsHome, None, None, 0, raw);

        // Publish only after a complete decode so that GPS frames never predict from a
        // half-written home position.
        self.gps_home[1] = self.gps_home[0];
        self.gps_home_valid = true;
    }

    /// Parses a slow frame into the last-seen slow state.
    pub fn parse_slow_frame(&mut self, reader: &mut BitReader<'_>, raw: bool) {
        self.parse_fields(reader, FrameKind::Slow, None, None, 0, raw);
    }

    /// Parses an event frame. Returns the decoded event, or `None` if the event type is unknown
    /// or its payload malformed.
    pub fn parse_event_frame(&mut self, reader: &mut BitReader<'_>) -> Option<LogEvent> {
        let event_type = reader.read_byte()?;

        match event_type {
            EVENT_SYNC_BEEP => {
                let time = i64::from(reader.read_unsigned_vb()) + self.time_rollover_accumulator;
                Some(LogEvent::SyncBeep { time })
            }
            EVENT_INFLIGHT_ADJUSTMENT => {
                let function = reader.read_byte().unwrap_or(0);
                // Functions above 127 carry a float payload, the rest a signed VB.
                let value = if function > 127 {
                    AdjustmentValue::Float(reader.read_f32_le().unwrap_or(0.0))
                }
                else {
                    AdjustmentValue::Int(reader.read_signed_vb())
                };
                Some(LogEvent::InflightAdjustment { function, value })
            }
            EVENT_LOGGING_RESUME => {
                let iteration = reader.read_unsigned_vb();
                let time = i64::from(reader.read_unsigned_vb()) + self.time_rollover_accumulator;

                // The resume point is a legal discontinuity; align the validation state to it so
                // the following frames are not discarded.
                self.last_main_iteration = Some(iteration);
                self.last_main_time = Some(time);

                Some(LogEvent::LoggingResume { iteration, time })
            }
            EVENT_LOG_END => {
                let message = reader.read_buf(11);
                if message == b"End of log\0" {
                    reader.set_end(reader.pos());
                    Some(LogEvent::LogEnd)
                }
                else {
                    None
                }
            }
            other => {
                debug!("bbl: ignoring unknown event type {}", other);
                None
            }
        }
    }

    /// Discards prediction history so that no frame decodes against corrupt rows. The stream
    /// stays invalid until the next valid intraframe.
    pub(crate) fn invalidate_stream(&mut self) {
        self.main_stream_valid = false;
        self.prev = None;
        self.prev2 = None;
    }

    /// Decodes every field of one frame in schema order.
    fn parse_fields(
        &mut self,
        reader: &mut BitReader<'_>,
        kind: FrameKind,
        prev: Option<usize>,
        prev2: Option<usize>,
        skipped_frames: u32,
        raw: bool,
    ) {
        let def = self.frame_def(kind);
        let field_count = def.field_count.min(MAX_FIELDS);

        let mut i = 0;
        while i < field_count {
            // In raw mode, fields keep their decoded value. The frame counter is the exception:
            // it is reconstructed rather than transmitted.
            let predictor_at = |index: usize| {
                if raw && def.predictor[index] != FieldPredictor::Increment {
                    FieldPredictor::Zero
                }
                else {
                    def.predictor[index]
                }
            };

            match def.encoding[i] {
                FieldEncoding::SignedVb => {
                    reader.byte_align();
                    let value = i64::from(reader.read_signed_vb());
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::UnsignedVb => {
                    reader.byte_align();
                    let value = i64::from(reader.read_unsigned_vb());
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::Neg14Bit => {
                    reader.byte_align();
                    let value = i64::from(read_neg_14bit(reader));
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::Tag8_4S16 => {
                    reader.byte_align();
                    let values = if self.header.data_version < 2 {
                        read_tag8_4s16_v1(reader)
                    }
                    else {
                        read_tag8_4s16_v2(reader)
                    };
                    for &value in values.iter() {
                        if i < field_count {
                            self.set_grouped(def, kind, i, predictor_at(i), i64::from(value), prev, prev2, skipped_frames);
                            i += 1;
                        }
                    }
                }
                FieldEncoding::Tag2_3S32 => {
                    reader.byte_align();
                    let values = read_tag2_3s32(reader);
                    for &value in values.iter() {
                        if i < field_count {
                            self.set_grouped(def, kind, i, predictor_at(i), i64::from(value), prev, prev2, skipped_frames);
                            i += 1;
                        }
                    }
                }
                FieldEncoding::Tag8_8Svb => {
                    reader.byte_align();

                    // Consecutive Tag8_8Svb fields, up to eight, decode as one group behind a
                    // single presence mask.
                    let mut group_count = 1;
                    while group_count < 8
                        && i + group_count < field_count
                        && def.encoding[i + group_count] == FieldEncoding::Tag8_8Svb
                    {
                        group_count += 1;
                    }

                    let values = read_tag8_8svb(reader, group_count);
                    for &value in values.iter().take(group_count) {
                        if i < field_count {
                            self.set_grouped(def, kind, i, predictor_at(i), i64::from(value), prev, prev2, skipped_frames);
                            i += 1;
                        }
                    }
                }
                FieldEncoding::EliasDeltaU32 => {
                    let value = i64::from(read_elias_delta_u32(reader));
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::EliasDeltaS32 => {
                    let value = i64::from(read_elias_delta_s32(reader));
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::EliasGammaU32 => {
                    let value = i64::from(read_elias_gamma_u32(reader));
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::EliasGammaS32 => {
                    let value = i64::from(read_elias_gamma_s32(reader));
                    self.set_scalar(def, kind, i, predictor_at(i), value, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::Null => {
                    self.set_scalar(def, kind, i, predictor_at(i), 0, prev, prev2, skipped_frames);
                    i += 1;
                }
                FieldEncoding::Unknown => {
                    // Nothing on the wire to consume; the field keeps its slot.
                    i += 1;
                }
            }
        }

        reader.byte_align();
    }

    /// Applies the predictor, truncates to the field width, and stores a scalar-encoded field.
    #[allow(clippy::too_many_arguments)]
    fn set_scalar(
        &mut self,
        def: &FrameDef,
        kind: FrameKind,
        i: usize,
        predictor: FieldPredictor,
        value: i64,
        prev: Option<usize>,
        prev2: Option<usize>,
        skipped_frames: u32,
    ) {
        let mut value = self.predict(kind, i, predictor, value, prev, prev2, skipped_frames);

        // Prediction arithmetic is carried out in 64 bits; fields declared 8 bytes wide keep the
        // full value, everything else truncates to its 32-bit representation.
        if def.field_width[i] != 8 {
            value = truncate_32(value, def.field_signed[i]);
        }

        self.target_mut(kind)[i] = value;
    }

    /// Applies the predictor and stores one field of a tag-packed group. Group codecs fix their
    /// field widths, so no truncation applies.
    #[allow(clippy::too_many_arguments)]
    fn set_grouped(
        &mut self,
        _def: &FrameDef,
        kind: FrameKind,
        i: usize,
        predictor: FieldPredictor,
        value: i64,
        prev: Option<usize>,
        prev2: Option<usize>,
        skipped_frames: u32,
    ) {
        let value = self.predict(kind, i, predictor, value, prev, prev2, skipped_frames);
        self.target_mut(kind)[i] = value;
    }

    /// Adds the predictor contribution to a decoded raw value.
    #[allow(clippy::too_many_arguments)]
    fn predict(
        &self,
        kind: FrameKind,
        i: usize,
        predictor: FieldPredictor,
        value: i64,
        prev: Option<usize>,
        prev2: Option<usize>,
        skipped_frames: u32,
    ) -> i64 {
        let sys = &self.header.sys_config;

        match predictor {
            FieldPredictor::Zero => value,
            FieldPredictor::Previous => match prev {
                Some(p) => value + self.ring[p][i],
                None => value,
            },
            FieldPredictor::StraightLine => match (prev, prev2) {
                (Some(p), Some(p2)) => value + 2 * self.ring[p][i] - self.ring[p2][i],
                _ => value,
            },
            FieldPredictor::Average2 => match (prev, prev2) {
                (Some(p), Some(p2)) => {
                    value + (self.ring[p][i] + self.ring[p2][i]).div_euclid(2)
                }
                _ => value,
            },
            FieldPredictor::MinThrottle => value + i64::from(sys.minthrottle),
            FieldPredictor::Motor0 => {
                match self.header.main_field_indexes.motor[0] {
                    Some(motor0) => value + self.target(kind)[motor0],
                    None => value,
                }
            }
            // The raw value is discarded: the field is a frame counter reconstructed from the
            // emission schedule.
            FieldPredictor::Increment => {
                let base = prev.map(|p| self.ring[p][i]).unwrap_or(0);
                i64::from(skipped_frames) + 1 + base
            }
            FieldPredictor::HomeCoord => {
                match self.header.gps_home_field_indexes.home[0] {
                    Some(home) => value + self.gps_home[1][home],
                    None => value,
                }
            }
            FieldPredictor::HomeCoord1 => {
                match self.header.gps_home_field_indexes.home[1] {
                    Some(home) => value + self.gps_home[1][home],
                    None => value,
                }
            }
            FieldPredictor::FifteenHundred => value + 1500,
            FieldPredictor::VBatRef => value + i64::from(sys.vbatref),
            FieldPredictor::LastMainFrameTime => match self.prev {
                Some(p) => value + self.ring[p][FIELD_INDEX_TIME],
                None => value,
            },
            FieldPredictor::MinMotor => value + i64::from(sys.motor_output_low),
        }
    }

    fn frame_def(&self, kind: FrameKind) -> &'h FrameDef {
        match kind {
            FrameKind::Intra => &self.header.frame_defs.intra,
            FrameKind::Inter => &self.header.frame_defs.inter,
            FrameKind::Gps => &self.header.frame_defs.gps,
            FrameKind::GpsHome => &self.header.frame_defs.gps_home,
            FrameKind::Slow => &self.header.frame_defs.slow,
        }
    }

    fn target(&self, kind: FrameKind) -> &[i64; MAX_FIELDS] {
        match kind {
            FrameKind::Intra | FrameKind::Inter => &self.ring[self.current],
            FrameKind::Gps => &self.last_gps,
            FrameKind::GpsHome => &self.gps_home[0],
            FrameKind::Slow => &self.last_slow,
        }
    }

    fn target_mut(&mut self, kind: FrameKind) -> &mut [i64; MAX_FIELDS] {
        match kind {
            FrameKind::Intra | FrameKind::Inter => &mut self.ring[self.current],
            FrameKind::Gps => &mut self.last_gps,
            FrameKind::GpsHome => &mut self.gps_home[0],
            FrameKind::Slow => &mut self.last_slow,
        }
    }

    /// Counts the schedule slots after the last committed frame that the emission schedule
    /// declares absent. Feeds the frame-counter reconstruction.
    fn count_skipped_frames(&self) -> u32 {
        let last_iteration = match self.last_main_iteration {
            Some(iteration) => iteration,
            None => return 0,
        };

        let mut count = 0;
        let mut frame_index = last_iteration.wrapping_add(1);

        while !should_have_frame(self.header, frame_index) {
            count += 1;
            frame_index = frame_index.wrapping_add(1);
            // Degenerate schedules must not stall the decoder.
            if count > 10_000 {
                break;
            }
        }

        count
    }

    /// Folds a freshly decoded 32-bit timestamp into the 64-bit timeline, advancing the rollover
    /// accumulator when the clock wraps.
    fn detect_time_rollover(&mut self, timestamp: i64) -> i64 {
        let ts32 = timestamp as u32;

        if let Some(last) = self.last_main_time {
            let last32 = last as u32;
            // A wrap is a backwards step whose wrapped distance is a plausible frame interval.
            // Large backwards jumps are corruption and are left for validation to reject.
            if ts32 < last32 && ts32.wrapping_sub(last32) < MAX_TIME_JUMP_US as u32 {
                self.time_rollover_accumulator += 1i64 << 32;
            }
        }

        i64::from(ts32) + self.time_rollover_accumulator
    }

    /// Checks the decoded iteration and time against the last committed frame.
    fn validate_main_frame(&self) -> bool {
        let (last_iteration, last_time) = match (self.last_main_iteration, self.last_main_time) {
            (Some(iteration), Some(time)) => (iteration, time),
            _ => return true,
        };

        let iteration = u64::from(self.ring[self.current][FIELD_INDEX_ITERATION] as u32);
        let last_iteration = u64::from(last_iteration);
        let time = self.ring[self.current][FIELD_INDEX_TIME];

        iteration >= last_iteration
            && iteration < last_iteration + u64::from(MAX_ITERATION_JUMP)
            && time >= last_time
            && time < last_time + MAX_TIME_JUMP_US
    }

    /// Records the committed frame and rotates the history ring. An intraframe collapses both
    /// history slots onto itself; an interframe shifts them.
    fn commit_main_frame(&mut self, intraframe: bool) {
        let current = &self.ring[self.current];
        self.last_main_iteration = Some(current[FIELD_INDEX_ITERATION] as u32);
        self.last_main_time = Some(current[FIELD_INDEX_TIME]);

        if intraframe {
            self.prev = Some(self.current);
            self.prev2 = Some(self.current);
        }
        else {
            self.prev2 = self.prev;
            self.prev = Some(self.current);
        }

        self.current = (self.current + 1) % 3;
    }
}

/// Returns true if the emission schedule produces a main frame at the given iteration index.
///
/// I-frames are produced every `frame_interval_i` iterations; of the P-frame slots between them,
/// `frame_interval_p_num` out of every `frame_interval_p_denom` are emitted.
pub fn should_have_frame(header: &LogHeader, frame_index: u32) -> bool {
    (frame_index % header.frame_interval_i + header.frame_interval_p_num - 1)
        % header.frame_interval_p_denom
        < header.frame_interval_p_num
}

/// Truncates a 64-bit reconstruction to the 32-bit value it represents on the wire.
fn truncate_32(value: i64, signed: bool) -> i64 {
    if signed {
        i64::from(value as i32)
    }
    else {
        i64::from(value as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::parse_header_line;

    use aerolog_core::io::BitReader;
    use aerolog_core::util::bits::zigzag_encode;

    fn unsigned_vb(mut value: u32, out: &mut Vec<u8>) {
        loop {
            let group = (value & 0x7f) as u8;
            value >>= 7;
            if value != 0 {
                out.push(group | 0x80);
            }
            else {
                out.push(group);
                break;
            }
        }
    }

    fn signed_vb(value: i32, out: &mut Vec<u8>) {
        unsigned_vb(zigzag_encode(value), out);
    }

    /// A three-field main frame schema exercising the history predictors.
    fn test_header() -> LogHeader {
        let mut header = LogHeader::default();
        parse_header_line(&mut header, "Field I name:loopIteration,time,gyroADC[0]");
        parse_header_line(&mut header, "Field I signed:0,0,1");
        parse_header_line(&mut header, "Field I predictor:0,0,0");
        parse_header_line(&mut header, "Field I encoding:1,1,0");
        parse_header_line(&mut header, "Field P predictor:6,1,3");
        parse_header_line(&mut header, "Field P encoding:9,0,0");
        header
    }

    #[test]
    fn verify_intraframe_baseline() {
        let header = test_header();
        let mut parser = FrameParser::new(&header);

        let mut data = Vec::new();
        unsigned_vb(1, &mut data);
        unsigned_vb(100, &mut data);
        signed_vb(2, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, false));
        assert!(parser.main_stream_valid());
        assert_eq!(&parser.prev_row().unwrap()[..3], &[1, 100, 2]);
    }

    #[test]
    fn verify_interframe_prediction() {
        let header = test_header();
        let mut parser = FrameParser::new(&header);

        let mut data = Vec::new();
        unsigned_vb(1, &mut data);
        unsigned_vb(100, &mut data);
        signed_vb(2, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, false));

        // Interframe: loopIteration reconstructs by increment, time is previous + delta, the
        // gyro term averages the two history rows (collapsed onto the intraframe).
        let mut data = Vec::new();
        signed_vb(1, &mut data);
        signed_vb(3, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_interframe(&mut reader, false));
        assert_eq!(&parser.prev_row().unwrap()[..3], &[2, 101, 5]);
    }

    #[test]
    fn verify_interframe_validation_rejects_time_jump() {
        let header = test_header();
        let mut parser = FrameParser::new(&header);

        let mut data = Vec::new();
        unsigned_vb(1, &mut data);
        unsigned_vb(100, &mut data);
        signed_vb(0, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, false));

        // A time delta beyond the validation window invalidates the stream and discards the row.
        let mut data = Vec::new();
        signed_vb(20_000_000, &mut data);
        signed_vb(0, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(!parser.parse_interframe(&mut reader, false));
        assert!(!parser.main_stream_valid());
        assert!(parser.prev_row().is_none());
    }

    #[test]
    fn verify_raw_mode_skips_prediction() {
        let header = test_header();
        let mut parser = FrameParser::new(&header);

        let mut data = Vec::new();
        unsigned_vb(1, &mut data);
        unsigned_vb(100, &mut data);
        signed_vb(2, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, true));

        let mut data = Vec::new();
        signed_vb(1, &mut data);
        signed_vb(3, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_interframe(&mut reader, true));

        // Deltas stay deltas, but the frame counter is still reconstructed.
        assert_eq!(&parser.prev_row().unwrap()[..3], &[2, 1, 3]);
    }

    #[test]
    fn verify_logging_resume_accepts_jump() {
        let header = test_header();
        let mut parser = FrameParser::new(&header);

        let mut data = Vec::new();
        unsigned_vb(1, &mut data);
        unsigned_vb(100, &mut data);
        signed_vb(0, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, false));

        // A resume event at a far later iteration and time.
        let mut data = vec![EVENT_LOGGING_RESUME];
        unsigned_vb(100_000, &mut data);
        unsigned_vb(500_000_000, &mut data);

        let mut reader = BitReader::new(&data);
        let event = parser.parse_event_frame(&mut reader);
        assert_eq!(event, Some(LogEvent::LoggingResume { iteration: 100_000, time: 500_000_000 }));

        // The next intraframe at the resume point validates despite the jump.
        let mut data = Vec::new();
        unsigned_vb(100_001, &mut data);
        unsigned_vb(500_000_100, &mut data);
        signed_vb(0, &mut data);

        let mut reader = BitReader::new(&data);
        assert!(parser.parse_intraframe(&mut reader, false));
    }

    #[test]
    fn verify_schedule_density() {
        // Over any window of frame_interval_i * p_denom iterations the schedule emits exactly
        // the declared fraction of frames.
        for &(interval_i, num, denom) in &[(32u32, 1u32, 1u32), (32, 1, 2), (32, 1, 4), (16, 1, 2), (32, 3, 4)] {
            let mut header = LogHeader::default();
            header.frame_interval_i = interval_i;
            header.frame_interval_p_num = num;
            header.frame_interval_p_denom = denom;

            let window = interval_i * denom;
            for offset in [0u32, 1, 7, 1000] {
                let emitted = (offset..offset + window)
                    .filter(|&n| should_have_frame(&header, n))
                    .count() as u32;
                assert_eq!(
                    emitted * denom,
                    window * num,
                    "interval_i={} p={}/{} offset={}",
                    interval_i,
                    num,
                    denom,
                    offset
                );
            }
        }
    }

    #[test]
    fn verify_truncate_32() {
        assert_eq!(truncate_32(0x1_0000_0001, false), 1);
        assert_eq!(truncate_32(-1, false), 0xffff_ffff);
        assert_eq!(truncate_32(0xffff_ffff, true), -1);
        assert_eq!(truncate_32(123, true), 123);
        assert_eq!(truncate_32(-123, true), -123);
    }
}
