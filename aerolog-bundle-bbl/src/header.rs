// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `header` module parses the `H key:value` prologue of a log into a [`LogHeader`].
//!
//! Header lines declare the field schema of every frame type, the frame emission schedule, and
//! the flight-controller configuration the predictors read during decoding. Malformed lines are
//! tolerated: every line is retained verbatim in a raw key-value mapping, and only
//! well-formed values act on the parsed structures.

use std::collections::HashMap;
use std::f32::consts::PI;

use aerolog_core::io::BitReader;

use log::debug;

use crate::schema::*;

/// All metadata parsed from the header section of one log.
#[derive(Clone, Debug)]
pub struct LogHeader {
    pub frame_defs: FrameDefs,
    pub sys_config: SysConfig,
    pub main_field_indexes: MainFieldIndexes,
    pub gps_field_indexes: GpsFieldIndexes,
    pub gps_home_field_indexes: GpsHomeFieldIndexes,
    pub slow_field_indexes: SlowFieldIndexes,

    /// Version of the frame data format; 2 and above select the second revision of the
    /// TAG8_4S16 codec.
    pub data_version: u32,
    pub fc_version: String,
    pub firmware_revision: String,

    /// I-frames are emitted every `frame_interval_i` loop iterations.
    pub frame_interval_i: u32,
    /// Of every `frame_interval_p_denom` P-frame slots, `frame_interval_p_num` are emitted.
    pub frame_interval_p_num: u32,
    pub frame_interval_p_denom: u32,

    /// Every parsed `key:value` pair, verbatim, for external consumers.
    pub raw_headers: HashMap<String, String>,
}

impl Default for LogHeader {
    fn default() -> Self {
        LogHeader {
            frame_defs: FrameDefs::default(),
            sys_config: SysConfig::default(),
            main_field_indexes: MainFieldIndexes::default(),
            gps_field_indexes: GpsFieldIndexes::default(),
            gps_home_field_indexes: GpsHomeFieldIndexes::default(),
            slow_field_indexes: SlowFieldIndexes::default(),
            data_version: 0,
            fc_version: String::new(),
            firmware_revision: String::new(),
            frame_interval_i: 32,
            frame_interval_p_num: 1,
            frame_interval_p_denom: 1,
            raw_headers: HashMap::new(),
        }
    }
}

/// Reads all `H key:value` lines from the reader's current position.
///
/// Returns the populated [`LogHeader`]. The reader is left positioned at the first byte that does
/// not open a header line, i.e. the first data frame tag.
pub fn parse_headers(reader: &mut BitReader<'_>) -> LogHeader {
    let mut header = LogHeader::default();

    while !reader.is_eof() {
        if reader.peek_byte() != Some(b'H') {
            break;
        }

        // Consume 'H' and the following space. A lone 'H' not followed by a space ends the
        // header region.
        reader.read_byte();
        if reader.read_byte() != Some(b' ') {
            break;
        }

        let mut line = Vec::new();
        loop {
            match reader.read_byte() {
                None | Some(b'\n') | Some(0) => break,
                Some(c) => line.push(c),
            }
        }

        let line = String::from_utf8_lossy(&line);
        parse_header_line(&mut header, &line);
    }

    header
}

/// Parses a single header line (without the leading `H `) into `header`.
pub fn parse_header_line(header: &mut LogHeader, line: &str) {
    let Some(colon) = line.find(':') else {
        debug!("bbl: ignoring malformed header line: {}", line);
        return;
    };

    let name = line[..colon].trim();
    let value = line[colon + 1..].trim();

    header.raw_headers.insert(name.to_string(), value.to_string());

    if let Some(rest) = name.strip_prefix("Field ") {
        parse_field_def_line(header, rest, value);
        return;
    }

    match name {
        "I interval" => {
            if let Ok(v) = value.parse::<i64>() {
                header.frame_interval_i = v.max(1) as u32;
            }
        }
        "P interval" => {
            if let Some((num, denom)) = value.split_once('/') {
                if let (Ok(num), Ok(denom)) =
                    (num.trim().parse::<u32>(), denom.trim().parse::<u32>())
                {
                    if num >= 1 && denom >= 1 {
                        header.frame_interval_p_num = num;
                        header.frame_interval_p_denom = denom;
                    }
                }
            }
        }
        "Data version" => {
            if let Ok(v) = value.parse::<u32>() {
                header.data_version = v;
            }
        }
        "Firmware type" => {
            header.sys_config.firmware_type = if value == "Cleanflight" {
                FirmwareType::Cleanflight
            }
            else {
                FirmwareType::Baseflight
            };
        }
        "Firmware revision" => {
            header.firmware_revision = value.to_string();

            // A revision of the form "Betaflight <version> ..." identifies the firmware family
            // and carries the flight-controller version.
            let mut parts = value.split(' ');
            if parts.next() == Some("Betaflight") {
                if let Some(version) = parts.next() {
                    header.fc_version = version.to_string();
                    header.sys_config.firmware_type = FirmwareType::Betaflight;
                }
            }
        }
        "minthrottle" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.minthrottle = v;
                header.sys_config.motor_output_low = v;
            }
        }
        "maxthrottle" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.maxthrottle = v;
                header.sys_config.motor_output_high = v;
            }
        }
        "rcRate" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.rc_rate = v;
            }
        }
        "vbatscale" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.vbatscale = v;
            }
        }
        "vbatref" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.vbatref = v;
            }
        }
        "vbatcellvoltage" => {
            let values = parse_csv_ints(value);
            if values.len() >= 3 {
                header.sys_config.vbatmincellvoltage = values[0] as i32;
                header.sys_config.vbatwarningcellvoltage = values[1] as i32;
                header.sys_config.vbatmaxcellvoltage = values[2] as i32;
            }
        }
        "currentMeter" => {
            let values = parse_csv_ints(value);
            if values.len() >= 2 {
                header.sys_config.current_meter_offset = values[0] as i32;
                header.sys_config.current_meter_scale = values[1] as i32;
            }
        }
        "gyro.scale" | "gyro_scale" => {
            let hex = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
            let mut gyro_scale = match u32::from_str_radix(hex, 16) {
                Ok(bits) => f32::from_bits(bits),
                Err(_) => 1.0,
            };

            // Firmwares after baseflight log the scale in radians per microsecond.
            if header.sys_config.firmware_type != FirmwareType::Baseflight {
                gyro_scale = gyro_scale * (PI / 180.0) * 0.000001;
            }

            header.sys_config.gyro_scale = gyro_scale;
        }
        "acc_1G" => {
            if let Ok(v) = value.parse::<i32>() {
                header.sys_config.acc_1g = v;
            }
        }
        "motorOutput" => {
            let values = parse_csv_ints(value);
            if values.len() >= 2 {
                header.sys_config.motor_output_low = values[0] as i32;
                header.sys_config.motor_output_high = values[1] as i32;
            }
        }
        _ => {
            // Unrecognised keys remain available through the raw mapping.
        }
    }
}

/// Parses a `Field <T> <kind>` line, where `rest` is everything after `"Field "`.
fn parse_field_def_line(header: &mut LogHeader, rest: &str, value: &str) {
    let tag = match rest.bytes().next() {
        Some(tag) => tag,
        None => return,
    };

    // Slicing by byte is only safe for an ASCII tag; anything else is not a frame type.
    let suffix = match rest.get(1..) {
        Some(suffix) if tag.is_ascii() => suffix,
        _ => return,
    };

    match suffix {
        " name" => {
            let names: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from)
                .collect();

            match tag {
                b'I' => {
                    identify_main_fields(&mut header.main_field_indexes, &names);
                    // P-frame definitions derive their names from the I-frame.
                    header.frame_defs.inter.field_names = names.clone();
                    header.frame_defs.inter.field_count = names.len();
                    header.frame_defs.intra.field_count = names.len();
                    header.frame_defs.intra.field_names = names;
                }
                b'G' => {
                    identify_gps_fields(&mut header.gps_field_indexes, &names);
                    header.frame_defs.gps.field_count = names.len();
                    header.frame_defs.gps.field_names = names;
                }
                b'H' => {
                    identify_gps_home_fields(&mut header.gps_home_field_indexes, &names);
                    header.frame_defs.gps_home.field_count = names.len();
                    header.frame_defs.gps_home.field_names = names;
                }
                b'S' => {
                    identify_slow_fields(&mut header.slow_field_indexes, &names);
                    header.frame_defs.slow.field_count = names.len();
                    header.frame_defs.slow.field_names = names;
                }
                b'P' => {
                    header.frame_defs.inter.field_count = names.len();
                    header.frame_defs.inter.field_names = names;
                }
                _ => {}
            }
        }
        " signed" => {
            let values = parse_csv_ints(value);
            if let Some(def) = header.frame_defs.by_tag_mut(tag) {
                for (j, v) in values.iter().take(MAX_FIELDS).enumerate() {
                    def.field_signed[j] = *v != 0;
                }
            }
            // I-frame signedness mirrors to the P-frame definition.
            if tag == b'I' {
                for (j, v) in values.iter().take(MAX_FIELDS).enumerate() {
                    header.frame_defs.inter.field_signed[j] = *v != 0;
                }
            }
        }
        " predictor" => {
            if let Some(def) = header.frame_defs.by_tag_mut(tag) {
                for (j, v) in parse_csv_ints(value).iter().take(MAX_FIELDS).enumerate() {
                    def.predictor[j] = FieldPredictor::from_header_value(*v);
                }
            }
        }
        " encoding" => {
            if let Some(def) = header.frame_defs.by_tag_mut(tag) {
                for (j, v) in parse_csv_ints(value).iter().take(MAX_FIELDS).enumerate() {
                    def.encoding[j] = FieldEncoding::from_header_value(*v);
                }
            }
        }
        " width" => {
            if let Some(def) = header.frame_defs.by_tag_mut(tag) {
                for (j, v) in parse_csv_ints(value).iter().take(MAX_FIELDS).enumerate() {
                    def.field_width[j] = (*v).max(0) as u32;
                }
            }
        }
        _ => {}
    }
}

/// Parses a comma-separated list of integers. Unparseable entries decode as 0, matching the
/// leniency of the reference implementations.
fn parse_csv_ints(value: &str) -> Vec<i64> {
    value
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse::<i64>().unwrap_or(0))
        .collect()
}

/// Extracts the index from a name of the form `<prefix><index>]`, e.g. `motor[2]` with prefix
/// `motor[`.
fn bracket_index(name: &str, prefix: &str) -> Option<usize> {
    name.strip_prefix(prefix)?.strip_suffix(']')?.parse().ok()
}

fn identify_main_fields(idx: &mut MainFieldIndexes, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if let Some(mi) = bracket_index(name, "motor[") {
            if mi < MAX_MOTORS {
                idx.motor[mi] = Some(i);
            }
        }
        else if let Some(ri) = bracket_index(name, "rcCommand[") {
            if ri < 4 {
                idx.rc_command[ri] = Some(i);
            }
        }
        else if name.starts_with("axis") {
            // axisP[0], axisI[1], axisD[2], ...
            let term = match name.as_bytes().get(4) {
                Some(b'P') => Some(0),
                Some(b'I') => Some(1),
                Some(b'D') => Some(2),
                // axisF (feedforward) is recognised but has no dedicated slot.
                _ => None,
            };
            if let (Some(term), Some(open)) = (term, name.find('[')) {
                if let Some(ai) = name[open..].strip_prefix('[').and_then(|s| {
                    s.strip_suffix(']').and_then(|s| s.parse::<usize>().ok())
                }) {
                    if ai < 3 {
                        idx.pid[term][ai] = Some(i);
                    }
                }
            }
        }
        else if let Some(ai) =
            bracket_index(name, "gyroData[").or_else(|| bracket_index(name, "gyroADC["))
        {
            if ai < 3 {
                idx.gyro_adc[ai] = Some(i);
            }
        }
        else if let Some(ai) = bracket_index(name, "magADC[") {
            if ai < 3 {
                idx.mag_adc[ai] = Some(i);
            }
        }
        else if let Some(ai) = bracket_index(name, "accSmooth[") {
            if ai < 3 {
                idx.acc_smooth[ai] = Some(i);
            }
        }
        else if let Some(si) = bracket_index(name, "servo[") {
            if si < MAX_SERVOS {
                idx.servo[si] = Some(i);
            }
        }
        else {
            match name.as_str() {
                "vbatLatest" => idx.vbat_latest = Some(i),
                "amperageLatest" => idx.amperage_latest = Some(i),
                "BaroAlt" => idx.baro_alt = Some(i),
                "sonarRaw" => idx.sonar_raw = Some(i),
                "rssi" => idx.rssi = Some(i),
                "loopIteration" => idx.loop_iteration = Some(i),
                "time" => idx.time = Some(i),
                _ => {}
            }
        }
    }
}

fn identify_gps_fields(idx: &mut GpsFieldIndexes, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        if let Some(ci) = bracket_index(name, "GPS_coord[") {
            if ci < 2 {
                idx.coord[ci] = Some(i);
            }
        }
        else {
            match name.as_str() {
                "time" => idx.time = Some(i),
                "GPS_numSat" => idx.num_sat = Some(i),
                "GPS_altitude" => idx.altitude = Some(i),
                "GPS_speed" => idx.speed = Some(i),
                "GPS_ground_course" => idx.ground_course = Some(i),
                _ => {}
            }
        }
    }
}

fn identify_gps_home_fields(idx: &mut GpsHomeFieldIndexes, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        match name.as_str() {
            "GPS_home[0]" => idx.home[0] = Some(i),
            "GPS_home[1]" => idx.home[1] = Some(i),
            _ => {}
        }
    }
}

fn identify_slow_fields(idx: &mut SlowFieldIndexes, names: &[String]) {
    for (i, name) in names.iter().enumerate() {
        match name.as_str() {
            "flightModeFlags" => idx.flight_mode_flags = Some(i),
            "stateFlags" => idx.state_flags = Some(i),
            "failsafePhase" => idx.failsafe_phase = Some(i),
            _ => {}
        }
    }
}
