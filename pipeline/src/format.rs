//! Human-readable byte-count and time-interval phrases for progress lines.

use std::fmt::Write;

const NUM_BYTE_UNITS: usize = 9;
const BYTE_UNIT_FACTORS: [f64; NUM_BYTE_UNITS] = [
    1.0,
    1024.0,
    1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
    1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0,
];
const BYTE_UNIT_NAMES: [&str; NUM_BYTE_UNITS] = [
    "bytes", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "YiB", "ZiB",
];

/// Phrase for a byte quantity in binary units, e.g. `20 bytes`, `1 KiB`,
/// `1.50 MiB`.
///
/// The largest unit whose factor does not exceed the value is chosen. Exact
/// multiples of the unit print as integers, everything else with two
/// fractional digits.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn byte_count_phrase(num_bytes: u64) -> String {
    let mut unit = NUM_BYTE_UNITS - 1;
    while unit > 0 && (num_bytes as f64) < BYTE_UNIT_FACTORS[unit] {
        unit -= 1;
    }

    let factor = BYTE_UNIT_FACTORS[unit];
    let num_this_unit = num_bytes as f64 / factor;
    if num_bytes as f64 % factor > 0.0 {
        format!("{:.2} {}", num_this_unit, BYTE_UNIT_NAMES[unit])
    } else {
        format!("{} {}", num_this_unit as u64, BYTE_UNIT_NAMES[unit])
    }
}

const NUM_INTERVAL_UNITS: usize = 5;
const INTERVAL_UNIT_FACTORS: [f64; NUM_INTERVAL_UNITS] = [
    1.0 / 1000.0,
    1.0,
    60.0,
    60.0 * 60.0,
    60.0 * 60.0 * 24.0,
];
const INTERVAL_UNIT_NAMES: [&str; NUM_INTERVAL_UNITS] = ["ms", "sec", "min", "hr", "d"];

/// Phrase for a duration in fractional seconds, e.g. `500 ms`, `1 sec`,
/// `1 d 1 hr 1 min 1 sec`.
///
/// Non-zero components are concatenated largest-first, separated by single
/// spaces. Sub-second durations print as milliseconds; once a unit larger
/// than seconds is present, milliseconds are omitted.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn interval_phrase(num_seconds: f64) -> String {
    let mut unit = NUM_INTERVAL_UNITS - 1;
    while unit > 0 && num_seconds < INTERVAL_UNIT_FACTORS[unit] {
        unit -= 1;
    }

    let num_this_unit = (num_seconds / INTERVAL_UNIT_FACTORS[unit]) as u64;
    let mut remaining = num_seconds % INTERVAL_UNIT_FACTORS[unit];
    let mut phrase = format!("{} {}", num_this_unit, INTERVAL_UNIT_NAMES[unit]);

    // Walk down to seconds, skipping zero components (e.g. "1 hr 3 sec").
    while remaining > 0.0 && unit > 1 {
        unit -= 1;
        let count = (remaining / INTERVAL_UNIT_FACTORS[unit]) as u64;
        remaining %= INTERVAL_UNIT_FACTORS[unit];
        if count > 0 {
            let _ = write!(phrase, " {} {}", count, INTERVAL_UNIT_NAMES[unit]);
        }
    }

    phrase
}
