// Aerolog
// Copyright (c) 2025 The Project Aerolog Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Demuxer and decoder for Blackbox flight data recorder logs.
//!
//! A Blackbox container concatenates one or more logs, each consisting of an ASCII header
//! prologue followed by a packed binary frame stream. The header declares, per frame type, the
//! field names, wire encodings, and predictors; the frame stream delta-encodes one row of sensor
//! values per control-loop iteration against that schema.
//!
//! [`BblReader`] locates the logs within a buffer and decodes each into a [`DecodedLog`]: a
//! dense `i64` row table named by the intraframe schema, with timestamps widened to 64 bits
//! across 32-bit clock rollovers.

pub mod codec;
pub mod demuxer;
pub mod frame;
pub mod header;
pub mod schema;

pub use crate::demuxer::{AuxRow, BblReader, DecodeOptions, DecodedLog};
pub use crate::frame::{AdjustmentValue, LogEvent};
pub use crate::header::LogHeader;
