// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `codec` module implements the multi-value tag-packed codecs and the Elias prefix codes
//! used by frame fields.
//!
//! All decoders assume a byte-aligned reader on entry, except the Elias decoders which operate
//! bit-by-bit. Truncated input decodes to 0; the caller observes the reader's EOF flag and
//! discards the in-flight frame.

use aerolog_core::io::BitReader;
use aerolog_core::util::bits::{
    sign_extend_14bit, sign_extend_24bit, sign_extend_2bit, sign_extend_4bit, sign_extend_6bit,
    zigzag_decode,
};

/// The longest bit run an Elias prefix may declare for a 32-bit value.
const MAX_BIT_READ: u32 = 32;

/// Decodes three signed 32-bit values packed behind a 2-bit width selector.
///
/// The top two bits of the lead byte select the layout:
/// 0 - three 2-bit fields in the low six bits of the lead byte,
/// 1 - three 4-bit fields, the first in the low nibble of the lead byte,
/// 2 - three 6-bit fields, one per following byte,
/// 3 - per-field byte counts in the low six bits, fields of 1 to 4 little-endian bytes.
pub fn read_tag2_3s32(reader: &mut BitReader<'_>) -> [i32; 3] {
    let mut values = [0i32; 3];

    let mut lead = match reader.read_byte() {
        Some(lead) => u32::from(lead),
        None => return values,
    };

    match lead >> 6 {
        0 => {
            values[0] = sign_extend_2bit((lead >> 4) & 0x03);
            values[1] = sign_extend_2bit((lead >> 2) & 0x03);
            values[2] = sign_extend_2bit(lead & 0x03);
        }
        1 => {
            values[0] = sign_extend_4bit(lead & 0x0f);
            lead = u32::from(reader.read_byte().unwrap_or(0));
            values[1] = sign_extend_4bit(lead >> 4);
            values[2] = sign_extend_4bit(lead & 0x0f);
        }
        2 => {
            values[0] = sign_extend_6bit(lead & 0x3f);
            lead = u32::from(reader.read_byte().unwrap_or(0));
            values[1] = sign_extend_6bit(lead & 0x3f);
            lead = u32::from(reader.read_byte().unwrap_or(0));
            values[2] = sign_extend_6bit(lead & 0x3f);
        }
        _ => {
            for value in values.iter_mut() {
                let b1 = u32::from(reader.read_byte().unwrap_or(0));
                *value = match lead & 0x03 {
                    0 => b1 as u8 as i8 as i32,
                    1 => {
                        let b2 = u32::from(reader.read_byte().unwrap_or(0));
                        (b1 | (b2 << 8)) as u16 as i16 as i32
                    }
                    2 => {
                        let b2 = u32::from(reader.read_byte().unwrap_or(0));
                        let b3 = u32::from(reader.read_byte().unwrap_or(0));
                        sign_extend_24bit(b1 | (b2 << 8) | (b3 << 16))
                    }
                    _ => {
                        let b2 = u32::from(reader.read_byte().unwrap_or(0));
                        let b3 = u32::from(reader.read_byte().unwrap_or(0));
                        let b4 = u32::from(reader.read_byte().unwrap_or(0));
                        (b1 | (b2 << 8) | (b3 << 16) | (b4 << 24)) as i32
                    }
                };
                lead >>= 2;
            }
        }
    }

    values
}

/// Field type codes of the TAG8_4S16 selector byte.
const FIELD_ZERO: u32 = 0;
const FIELD_4BIT: u32 = 1;
const FIELD_8BIT: u32 = 2;

/// Decodes four signed 16-bit values behind a packed type selector, first data revision.
///
/// The selector byte carries four 2-bit type codes, least-significant first. 4-bit values pack
/// two to a byte with the earlier value in the low nibble.
pub fn read_tag8_4s16_v1(reader: &mut BitReader<'_>) -> [i32; 4] {
    let mut values = [0i32; 4];

    let mut selector = match reader.read_byte() {
        Some(selector) => u32::from(selector),
        None => return values,
    };

    let mut i = 0;
    while i < 4 {
        match selector & 0x03 {
            FIELD_ZERO => {
                values[i] = 0;
            }
            FIELD_4BIT => {
                let combined = u32::from(reader.read_byte().unwrap_or(0));
                values[i] = sign_extend_4bit(combined & 0x0f);
                i += 1;
                selector >>= 2;
                // The high nibble feeds the next field, whatever its declared type.
                if i < 4 {
                    values[i] = sign_extend_4bit(combined >> 4);
                }
            }
            FIELD_8BIT => {
                values[i] = reader.read_byte().unwrap_or(0) as i8 as i32;
            }
            _ => {
                let c1 = u32::from(reader.read_byte().unwrap_or(0));
                let c2 = u32::from(reader.read_byte().unwrap_or(0));
                values[i] = (c1 | (c2 << 8)) as u16 as i16 as i32;
            }
        }

        selector >>= 2;
        i += 1;
    }

    values
}

/// Decodes four signed 16-bit values behind a packed type selector, second data revision.
///
/// Unlike the first revision, 4-bit values pack with the earlier value in the high nibble, and
/// 8- and 16-bit values may straddle a held nibble. The decoder carries at most one nibble of
/// state across the four fields.
pub fn read_tag8_4s16_v2(reader: &mut BitReader<'_>) -> [i32; 4] {
    let mut values = [0i32; 4];

    let mut selector = match reader.read_byte() {
        Some(selector) => u32::from(selector),
        None => return values,
    };

    let mut held_nibble = false;
    let mut buffer = 0u32;

    for value in values.iter_mut() {
        match selector & 0x03 {
            FIELD_ZERO => {
                *value = 0;
            }
            FIELD_4BIT => {
                if !held_nibble {
                    buffer = u32::from(reader.read_byte().unwrap_or(0));
                    *value = sign_extend_4bit(buffer >> 4);
                    held_nibble = true;
                }
                else {
                    *value = sign_extend_4bit(buffer & 0x0f);
                    held_nibble = false;
                }
            }
            FIELD_8BIT => {
                if !held_nibble {
                    *value = reader.read_byte().unwrap_or(0) as i8 as i32;
                }
                else {
                    let mut c1 = (buffer << 4) & 0xff;
                    buffer = u32::from(reader.read_byte().unwrap_or(0));
                    c1 |= buffer >> 4;
                    *value = c1 as u8 as i8 as i32;
                }
            }
            _ => {
                let c1 = u32::from(reader.read_byte().unwrap_or(0));
                let c2 = u32::from(reader.read_byte().unwrap_or(0));
                if !held_nibble {
                    *value = ((c1 << 8) | c2) as u16 as i16 as i32;
                }
                else {
                    *value = (((buffer & 0x0f) << 12) | (c1 << 4) | (c2 >> 4)) as u16 as i16 as i32;
                    buffer = c2;
                }
            }
        }

        selector >>= 2;
    }

    values
}

/// Decodes up to eight signed variable-byte values behind a presence bitmask.
///
/// With a single value there is no mask; the value follows directly. Otherwise a header byte
/// flags, least-significant bit first, which of the slots carry a value; absent slots are 0.
pub fn read_tag8_8svb(reader: &mut BitReader<'_>, value_count: usize) -> [i32; 8] {
    let mut values = [0i32; 8];

    if value_count == 1 {
        values[0] = reader.read_signed_vb();
    }
    else {
        let mut header = reader.read_byte().unwrap_or(0);
        for value in values.iter_mut() {
            if header & 0x01 != 0 {
                *value = reader.read_signed_vb();
            }
            header >>= 1;
        }
    }

    values
}

/// Decodes an unsigned variable byte holding a negated 14-bit two's complement value.
pub fn read_neg_14bit(reader: &mut BitReader<'_>) -> i32 {
    -sign_extend_14bit(reader.read_unsigned_vb())
}

/// Decodes an Elias delta encoded unsigned 32-bit integer.
///
/// The value 0xFFFFFFFF cannot be represented directly; the codes for 0xFFFFFFFE and 0xFFFFFFFF
/// share a prefix and are distinguished by one trailing escape bit. A prefix declaring more than
/// 32 bits, a result wider than 32 bits, or a truncated read decodes to 0.
pub fn read_elias_delta_u32(reader: &mut BitReader<'_>) -> u32 {
    // Unary run of zeros giving the bit count of the length field.
    let mut length_val_bits = 0u32;
    while length_val_bits <= MAX_BIT_READ {
        match reader.read_bit() {
            None => return 0,
            Some(0) => length_val_bits += 1,
            Some(_) => break,
        }
    }

    if reader.is_eof() || length_val_bits > MAX_BIT_READ {
        return 0;
    }

    let length_low_bits = match reader.read_bits(length_val_bits) {
        Some(bits) => u64::from(bits),
        None => return 0,
    };

    let length = ((1u64 << length_val_bits) | length_low_bits) - 1;
    if length > u64::from(MAX_BIT_READ) {
        return 0;
    }

    let result_low_bits = match reader.read_bits(length as u32) {
        Some(bits) => u64::from(bits),
        None => return 0,
    };

    let result = (1u64 << length) | result_low_bits;

    if result == 0xffff_ffff {
        // Escape bit disambiguates the two largest values.
        return match reader.read_bit() {
            Some(0) => 0xffff_fffe,
            Some(_) => 0xffff_ffff,
            None => 0,
        };
    }

    if result > 0xffff_ffff {
        return 0;
    }

    result as u32 - 1
}

/// Decodes an Elias delta encoded, zigzag-mapped, signed 32-bit integer.
pub fn read_elias_delta_s32(reader: &mut BitReader<'_>) -> i32 {
    zigzag_decode(read_elias_delta_u32(reader))
}

/// Decodes an Elias gamma encoded unsigned 32-bit integer, with the same escape handling as the
/// delta code.
pub fn read_elias_gamma_u32(reader: &mut BitReader<'_>) -> u32 {
    let mut value_bits = 0u32;
    while value_bits <= MAX_BIT_READ {
        match reader.read_bit() {
            None => return 0,
            Some(0) => value_bits += 1,
            Some(_) => break,
        }
    }

    if reader.is_eof() || value_bits > MAX_BIT_READ {
        return 0;
    }

    let value_low_bits = match reader.read_bits(value_bits) {
        Some(bits) => u64::from(bits),
        None => return 0,
    };

    let result = (1u64 << value_bits) | value_low_bits;

    if result == 0xffff_ffff {
        return match reader.read_bit() {
            Some(0) => 0xffff_fffe,
            Some(_) => 0xffff_ffff,
            None => 0,
        };
    }

    if result > 0xffff_ffff {
        return 0;
    }

    result as u32 - 1
}

/// Decodes an Elias gamma encoded, zigzag-mapped, signed 32-bit integer.
pub fn read_elias_gamma_s32(reader: &mut BitReader<'_>) -> i32 {
    zigzag_decode(read_elias_gamma_u32(reader))
}
