//! WLED JSON API payload builders.
//!
//! The controllers speak the WLED JSON state API: an object with an `on`
//! flag, brightness, and a `seg` array addressing individual segments.
//! Colors travel as RGB triples inside `col`.

use fcs_packets::{WledInitParameters, WledUpdateParameters};
use serde::Serialize;

/// Probe payload; an empty state object elicits a state response without
/// changing anything.
pub const HEARTBEAT_PAYLOAD: &str = "{}";

const FULL_BRIGHTNESS: u8 = 255;

#[derive(Serialize)]
struct InitState {
    on: bool,
    bri: u8,
    transition: u8,
    seg: Vec<InitSegment>,
}

#[derive(Serialize)]
struct InitSegment {
    id: u8,
    start: u16,
    stop: u16,
}

#[derive(Serialize)]
struct ColorState {
    transition: u8,
    seg: Vec<ColorSegment>,
}

#[derive(Serialize)]
struct ColorSegment {
    id: u8,
    on: bool,
    col: [[u8; 3]; 1],
}

/// Parse a six-digit hex color, with or without a leading `#`.
///
/// Malformed input parses as black so a bad operator-entered color can
/// never fail a send.
#[must_use]
pub fn parse_hex_color(color: &str) -> [u8; 3] {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 {
        return [0, 0, 0];
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
    match (channel(0..2), channel(2..4), channel(4..6)) {
        (Some(r), Some(g), Some(b)) => [r, g, b],
        _ => [0, 0, 0],
    }
}

/// Build the full-state payload that declares the segment layout.
#[must_use]
pub fn initialization_payload(init: &WledInitParameters) -> String {
    let state = InitState {
        on: true,
        bri: FULL_BRIGHTNESS,
        transition: 0,
        seg: init
            .segments
            .iter()
            .enumerate()
            .map(|(id, segment)| InitSegment {
                id: id as u8,
                start: segment.start,
                stop: segment.stop,
            })
            .collect(),
    };
    // Serialization of these payload structs cannot fail.
    serde_json::to_string(&state).unwrap_or_else(|_| HEARTBEAT_PAYLOAD.to_owned())
}

/// Build the payload applying each pattern's color to its target segments.
#[must_use]
pub fn set_color_payload(update: &WledUpdateParameters) -> String {
    let mut seg = Vec::new();
    for pattern in &update.patterns {
        let col = parse_hex_color(&pattern.color);
        for &id in &pattern.target_segments {
            seg.push(ColorSegment {
                id,
                on: true,
                col: [col],
            });
        }
    }
    let state = ColorState { transition: 0, seg };
    serde_json::to_string(&state).unwrap_or_else(|_| HEARTBEAT_PAYLOAD.to_owned())
}
