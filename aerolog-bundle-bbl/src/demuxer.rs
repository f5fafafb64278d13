// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `demuxer` module implements the log container reader.
//!
//! A container byte buffer holds one or more logs, one per arm/disarm cycle, each opened by a
//! fixed ASCII marker line. [`BblReader`] locates the logs and decodes each one independently:
//! the header prologue produces the field schema, then the frame loop reconstructs the row table.

use std::collections::HashMap;

use aerolog_core::errors::{decode_error, out_of_range_error, unsupported_error, Result};
use aerolog_core::io::BitReader;

use log::debug;

use crate::frame::{FrameParser, LogEvent};
use crate::header::{parse_headers, LogHeader};
use crate::schema::{FieldPredictor, FIELD_INDEX_TIME, LOG_START_MARKER, MAX_FIELDS};

/// Options controlling how a log is decoded.
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodeOptions {
    /// Decode without applying predictors, exposing the raw deltas carried by the stream.
    pub raw: bool,
}

/// The start and end offsets of one log within the container.
#[derive(Clone, Copy, Debug)]
struct LogSpan {
    start: usize,
    end: usize,
}

/// An auxiliary (GPS, GPS home, or slow) row snapshot, tagged with its position in the main row
/// sequence so consumers can merge the two timelines.
#[derive(Clone, Debug)]
pub struct AuxRow {
    /// The number of main rows committed when this snapshot was taken.
    pub position: usize,
    pub values: Vec<i64>,
}

/// A fully decoded log: the parsed header, the dense main row table, auxiliary rows, and events.
#[derive(Debug)]
pub struct DecodedLog {
    pub header: LogHeader,
    /// Column names of the main row table, in intraframe schema order.
    pub field_names: Vec<String>,
    /// Committed main rows in stream order, one per logged control-loop iteration.
    pub main_rows: Vec<Vec<i64>>,
    pub gps_rows: Vec<AuxRow>,
    pub home_rows: Vec<AuxRow>,
    pub slow_rows: Vec<AuxRow>,
    pub events: Vec<LogEvent>,
    pub valid_frame_count: u64,
    pub corrupt_frame_count: u64,
}

impl DecodedLog {
    /// The number of committed main rows.
    pub fn row_count(&self) -> usize {
        self.main_rows.len()
    }

    /// The column index of a field, by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_names.iter().position(|n| n == name)
    }

    /// Extracts one column of the main row table, by field name.
    pub fn column(&self, name: &str) -> Option<Vec<i64>> {
        let index = self.field_index(name)?;
        Some(self.main_rows.iter().map(|row| row[index]).collect())
    }

    /// The span of the time column in microseconds.
    pub fn duration_us(&self) -> i64 {
        match (self.main_rows.first(), self.main_rows.last()) {
            (Some(first), Some(last)) if first.len() > FIELD_INDEX_TIME => {
                last[FIELD_INDEX_TIME] - first[FIELD_INDEX_TIME]
            }
            _ => 0,
        }
    }

    /// The span of the time column in seconds.
    pub fn duration_s(&self) -> f64 {
        self.duration_us() as f64 / 1_000_000.0
    }

    /// The mean main-frame rate estimated from the time column.
    pub fn sample_rate_hz(&self) -> f64 {
        let duration_us = self.duration_us();
        if self.main_rows.len() < 2 || duration_us == 0 {
            return 0.0;
        }
        (self.main_rows.len() - 1) as f64 / (duration_us as f64 / 1_000_000.0)
    }

    /// The raw header key-value pairs, for setup and tuning inspection.
    pub fn setup_info(&self) -> &HashMap<String, String> {
        &self.header.raw_headers
    }
}

/// Blackbox flight data recorder log container reader.
pub struct BblReader {
    data: Vec<u8>,
    logs: Vec<LogSpan>,
}

impl BblReader {
    /// Instantiates a `BblReader` over a fully loaded container buffer.
    ///
    /// Returns an error if the buffer contains no log start marker.
    pub fn try_new(data: Vec<u8>) -> Result<Self> {
        let logs = discover_logs(&data);

        if logs.is_empty() {
            return unsupported_error("bbl: missing log start marker");
        }

        Ok(BblReader { data, logs })
    }

    /// The number of logs in the container. Each arm/disarm cycle records a new log.
    pub fn log_count(&self) -> usize {
        self.logs.len()
    }

    /// Parses and returns the header of the given log.
    pub fn get_header(&self, log_index: usize) -> Result<LogHeader> {
        let span = match self.logs.get(log_index) {
            Some(span) => *span,
            None => return out_of_range_error("bbl: log index out of range"),
        };

        let mut reader = BitReader::new_ranged(&self.data, span.start, span.end);
        Ok(parse_headers(&mut reader))
    }

    /// Decodes the given log into its row table.
    pub fn decode(&self, log_index: usize, opts: &DecodeOptions) -> Result<DecodedLog> {
        let span = match self.logs.get(log_index) {
            Some(span) => *span,
            None => return out_of_range_error("bbl: log index out of range"),
        };

        let mut reader = BitReader::new_ranged(&self.data, span.start, span.end);
        let mut header = parse_headers(&mut reader);

        // Two consecutive home-coordinate predictors in the GPS schema refer to the two home
        // coordinates; rewrite the second so it reads the right one.
        let gps_def = &mut header.frame_defs.gps;
        for i in 1..gps_def.field_count.min(MAX_FIELDS) {
            if gps_def.predictor[i - 1] == FieldPredictor::HomeCoord
                && gps_def.predictor[i] == FieldPredictor::HomeCoord
            {
                gps_def.predictor[i] = FieldPredictor::HomeCoord1;
            }
        }

        // Without an intraframe schema no frame can be decoded.
        if header.frame_defs.intra.field_count == 0 {
            return decode_error("bbl: missing intraframe field definitions");
        }

        let field_count = header.frame_defs.intra.field_count.min(MAX_FIELDS);
        let field_names = header.frame_defs.intra.field_names[..field_count].to_vec();
        let gps_field_count = header.frame_defs.gps.field_count.min(MAX_FIELDS);
        let home_field_count = header.frame_defs.gps_home.field_count.min(MAX_FIELDS);
        let slow_field_count = header.frame_defs.slow.field_count.min(MAX_FIELDS);

        let mut parser = FrameParser::new(&header);

        let mut main_rows: Vec<Vec<i64>> = Vec::new();
        let mut gps_rows = Vec::new();
        let mut home_rows = Vec::new();
        let mut slow_rows = Vec::new();
        let mut events = Vec::new();
        let mut valid_frame_count = 0u64;
        let mut corrupt_frame_count = 0u64;

        while !reader.is_eof() {
            let tag = match reader.peek_byte() {
                Some(tag) => tag,
                None => break,
            };

            match tag {
                b'I' => {
                    reader.read_byte();
                    let committed = parser.parse_intraframe(&mut reader, opts.raw);
                    match parser.prev_row() {
                        Some(row) if committed => {
                            main_rows.push(row[..field_count].to_vec());
                            valid_frame_count += 1;
                        }
                        _ => corrupt_frame_count += 1,
                    }
                }
                b'P' => {
                    reader.read_byte();
                    let committed = parser.parse_interframe(&mut reader, opts.raw);
                    match parser.prev_row() {
                        Some(row) if committed => {
                            main_rows.push(row[..field_count].to_vec());
                            valid_frame_count += 1;
                        }
                        _ => corrupt_frame_count += 1,
                    }
                }
                b'G' => {
                    reader.read_byte();
                    parser.parse_gps_frame(&mut reader, opts.raw);
                    if gps_field_count > 0 {
                        gps_rows.push(AuxRow {
                            position: main_rows.len(),
                            values: parser.gps_row()[..gps_field_count].to_vec(),
                        });
                    }
                }
                b'H' => {
                    reader.read_byte();
                    parser.parse_gps_home_frame(&mut reader, opts.raw);
                    if home_field_count > 0 {
                        home_rows.push(AuxRow {
                            position: main_rows.len(),
                            values: parser.home_row()[..home_field_count].to_vec(),
                        });
                    }
                }
                b'S' => {
                    reader.read_byte();
                    parser.parse_slow_frame(&mut reader, opts.raw);
                    if slow_field_count > 0 {
                        slow_rows.push(AuxRow {
                            position: main_rows.len(),
                            values: parser.slow_row()[..slow_field_count].to_vec(),
                        });
                    }
                }
                b'E' => {
                    reader.read_byte();
                    if let Some(event) = parser.parse_event_frame(&mut reader) {
                        events.push(event);
                    }
                }
                other => {
                    // An unrecognised tag byte means the stream is corrupt here. Drop prediction
                    // history and advance one byte; decoding resynchronises at the next valid
                    // intraframe.
                    debug!("bbl: unknown frame tag {:#04x}, resynchronising", other);
                    reader.read_byte();
                    parser.invalidate_stream();
                }
            }
        }

        Ok(DecodedLog {
            header,
            field_names,
            main_rows,
            gps_rows,
            home_rows,
            slow_rows,
            events,
            valid_frame_count,
            corrupt_frame_count,
        })
    }
}

/// Scans the buffer for log start markers. Each marker opens a log that runs to the next marker
/// or the end of the buffer.
fn discover_logs(data: &[u8]) -> Vec<LogSpan> {
    let mut logs: Vec<LogSpan> = Vec::new();
    let marker_len = LOG_START_MARKER.len();

    let mut search = 0;
    while search + marker_len <= data.len() {
        match data[search..].windows(marker_len).position(|w| w == LOG_START_MARKER) {
            Some(offset) => {
                let start = search + offset;
                if let Some(last) = logs.last_mut() {
                    last.end = start;
                }
                logs.push(LogSpan { start, end: data.len() });
                search = start + marker_len;
            }
            None => break,
        }
    }

    logs
}

#[cfg(test)]
mod tests {
    use super::*;

    use aerolog_core::errors::Error;
    use aerolog_core::util::bits::zigzag_encode;

    use crate::frame::LogEvent;

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

    /// Header lines declaring a two-field main frame: an increment-reconstructed loop counter
    /// and a time column carried as unsigned VB in intraframes and as a signed delta in
    /// interframes.
    const BASE_HEADERS: &[&str] = &[
        "H Data version:2",
        "H Field I name:loopIteration,time",
        "H Field I signed:0,0",
        "H Field I predictor:6,0",
        "H Field I encoding:1,1",
        "H Field P predictor:6,1",
        "H Field P encoding:9,0",
    ];

    fn build_log(headers: &[&str], frames: &[u8]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(LOG_START_MARKER);
        for line in headers {
            data.extend_from_slice(line.as_bytes());
            data.push(b'\n');
        }
        data.extend_from_slice(frames);
        data
    }

    fn intraframe(iteration_raw: u32, time: u32, out: &mut Vec<u8>) {
        out.push(b'I');
        unsigned_vb(iteration_raw, out);
        unsigned_vb(time, out);
    }

    fn interframe(time_delta: i32, out: &mut Vec<u8>) {
        out.push(b'P');
        signed_vb(time_delta, out);
    }

    #[test]
    fn verify_single_intraframe() {
        // S1: one intraframe; the counter reconstructs to 1 and time decodes directly.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        assert_eq!(reader.log_count(), 1);

        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();
        assert_eq!(decoded.field_names, ["loopIteration", "time"]);
        assert_eq!(decoded.main_rows, [[1, 100]]);
        assert_eq!(decoded.valid_frame_count, 1);
        assert_eq!(decoded.corrupt_frame_count, 0);
    }

    #[test]
    fn verify_intra_then_inter() {
        // S2: the interframe continues from the intraframe through the increment and previous
        // predictors.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        interframe(1, &mut frames);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.main_rows, [[1, 100], [2, 101]]);
        assert_eq!(decoded.valid_frame_count, 2);
        assert_eq!(decoded.column("time").unwrap(), [100, 101]);
    }

    #[test]
    fn verify_timestamp_rollover() {
        // S3: the 32-bit clock wraps between two frames; the reported time keeps counting.
        let mut frames = Vec::new();
        intraframe(0, 0xffff_fff0, &mut frames);
        interframe(0x20, &mut frames);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.main_rows.len(), 2);
        assert_eq!(decoded.main_rows[0][1], 0xffff_fff0);
        assert_eq!(decoded.main_rows[1][1], (1i64 << 32) + 0x10);

        // The time column is non-decreasing through the rollover.
        let time = decoded.column("time").unwrap();
        assert!(time.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn verify_resync_after_corrupt_byte() {
        // S4: an unknown tag byte between two valid intraframes; both intraframes commit and the
        // second re-establishes the baseline.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        frames.push(0x5a);
        intraframe(0, 110, &mut frames);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.main_rows, [[1, 100], [1, 110]]);
        assert_eq!(decoded.valid_frame_count, 2);
    }

    #[test]
    fn verify_log_end_event() {
        // S5: bytes beyond the end-of-log event are not parsed.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        frames.push(b'E');
        frames.push(255);
        frames.extend_from_slice(b"End of log\0");
        frames.extend_from_slice(&[0x42, 0x42, 0x42, 0x42]);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.main_rows, [[1, 100]]);
        assert_eq!(decoded.events, [LogEvent::LogEnd]);
        assert_eq!(decoded.corrupt_frame_count, 0);
    }

    #[test]
    fn verify_dual_logs() {
        // S6: two concatenated logs decode independently, with no state leaking across.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        interframe(1, &mut frames);
        let mut data = build_log(BASE_HEADERS, &frames);

        let mut frames = Vec::new();
        intraframe(0, 200, &mut frames);
        data.extend_from_slice(&build_log(BASE_HEADERS, &frames));

        let reader = BblReader::try_new(data).unwrap();
        assert_eq!(reader.log_count(), 2);

        let first = reader.decode(0, &DecodeOptions::default()).unwrap();
        let second = reader.decode(1, &DecodeOptions::default()).unwrap();

        assert_eq!(first.main_rows, [[1, 100], [2, 101]]);
        assert_eq!(first.valid_frame_count, 2);
        assert_eq!(second.main_rows, [[1, 200]]);
        assert_eq!(second.valid_frame_count, 1);
    }

    #[test]
    fn verify_prefix_stability() {
        // Decoding a longer window only appends rows, never rewrites earlier ones.
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        interframe(1, &mut frames);
        interframe(1, &mut frames);
        let data = build_log(BASE_HEADERS, &frames);

        let full = BblReader::try_new(data.clone())
            .unwrap()
            .decode(0, &DecodeOptions::default())
            .unwrap();

        for cut in (data.len() - 4)..data.len() {
            let truncated = BblReader::try_new(data[..cut].to_vec())
                .unwrap()
                .decode(0, &DecodeOptions::default())
                .unwrap();

            let n = truncated.main_rows.len();
            assert!(n <= full.main_rows.len());
            assert_eq!(truncated.main_rows[..], full.main_rows[..n]);
        }
    }

    #[test]
    fn verify_gps_home_and_slow_frames() {
        let mut headers = BASE_HEADERS.to_vec();
        headers.extend_from_slice(&[
            "H Field H name:GPS_home[0],GPS_home[1]",
            "H Field H signed:1,1",
            "H Field H predictor:0,0",
            "H Field H encoding:0,0",
            "H Field G name:time,GPS_numSat,GPS_coord[0],GPS_coord[1]",
            "H Field G signed:0,0,1,1",
            "H Field G predictor:10,0,7,7",
            "H Field G encoding:1,1,0,0",
            "H Field S name:flightModeFlags,stateFlags,failsafePhase",
            "H Field S signed:0,0,0",
            "H Field S predictor:0,0,0",
            "H Field S encoding:1,1,1",
        ]);

        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);

        // GPS home at (500, 600).
        frames.push(b'H');
        signed_vb(500, &mut frames);
        signed_vb(600, &mut frames);

        // GPS frame: time predicts from the last main frame, the coordinates from the two home
        // coordinates (the second through the rewritten predictor).
        frames.push(b'G');
        unsigned_vb(5, &mut frames);
        unsigned_vb(8, &mut frames);
        signed_vb(7, &mut frames);
        signed_vb(-3, &mut frames);

        // Slow frame: angle mode + small-angle state, failsafe idle.
        frames.push(b'S');
        unsigned_vb(0x01, &mut frames);
        unsigned_vb(0x08, &mut frames);
        unsigned_vb(0, &mut frames);

        let reader = BblReader::try_new(build_log(&headers, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.main_rows, [[1, 100]]);

        assert_eq!(decoded.home_rows.len(), 1);
        assert_eq!(decoded.home_rows[0].position, 1);
        assert_eq!(decoded.home_rows[0].values, [500, 600]);

        assert_eq!(decoded.gps_rows.len(), 1);
        assert_eq!(decoded.gps_rows[0].values, [105, 8, 507, 597]);

        assert_eq!(decoded.slow_rows.len(), 1);
        assert_eq!(decoded.slow_rows[0].values, [1, 8, 0]);
    }

    #[test]
    fn verify_missing_intraframe_schema_is_fatal() {
        let headers = ["H Data version:2"];
        let reader = BblReader::try_new(build_log(&headers, b"XYZ")).unwrap();

        match reader.decode(0, &DecodeOptions::default()) {
            Err(Error::DecodeError(_)) => (),
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[test]
    fn verify_log_index_out_of_range() {
        let mut frames = Vec::new();
        intraframe(0, 100, &mut frames);
        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();

        assert!(matches!(reader.get_header(7), Err(Error::OutOfRange(_))));
        assert!(matches!(reader.decode(7, &DecodeOptions::default()), Err(Error::OutOfRange(_))));
    }

    #[test]
    fn verify_missing_marker_is_unsupported() {
        match BblReader::try_new(b"not a blackbox log".to_vec()) {
            Err(Error::Unsupported(_)) => (),
            other => panic!("expected an unsupported error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn verify_durations() {
        let mut frames = Vec::new();
        intraframe(0, 1_000_000, &mut frames);
        interframe(500, &mut frames);
        interframe(500, &mut frames);

        let reader = BblReader::try_new(build_log(BASE_HEADERS, &frames)).unwrap();
        let decoded = reader.decode(0, &DecodeOptions::default()).unwrap();

        assert_eq!(decoded.duration_us(), 1000);
        assert!((decoded.duration_s() - 0.001).abs() < 1e-9);
        assert!((decoded.sample_rate_hz() - 2000.0).abs() < 1e-6);
    }
}
