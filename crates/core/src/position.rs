//! Resume state: the next starting value to dispatch, the best stopping
//! time observed so far, and the small "recent record holder" anchor
//! arrays the shader uses to short-circuit already-analysed prefixes.

use alloc::{string::String, vec::Vec};

use crate::numeric::{StartValue, StopTime};

/// Persisted resume point. See spec §3 for field semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub cur_start_value: StartValue,
    pub best_stop_time: StopTime,
    pub val0mod1off: [StartValue; 3],
    pub val1mod6off: [StartValue; 3],
}

impl Position {
    /// A brand-new scan starting at `StartValue(1)`.
    pub fn fresh() -> Self {
        Self {
            cur_start_value: StartValue::ONE,
            best_stop_time: StopTime::UNKNOWN,
            val0mod1off: [StartValue(0); 3],
            val1mod6off: [StartValue(0); 3],
        }
    }

    /// Advance `cur_start_value` by one full dispatch's worth of values.
    /// Returns `None` if the 128-bit space is exhausted; callers treat
    /// that as a clean-shutdown condition rather than a panic.
    pub fn advance(&mut self, values_per_inout: u64, inouts_per_heap: u32) -> Option<()> {
        let stride = (values_per_inout as u128) * (inouts_per_heap as u128);
        self.cur_start_value = self.cur_start_value.checked_add(stride)?;
        Some(())
    }

    /// Register a new record. Only called when `stop_time` is strictly
    /// greater than the current `best_stop_time` (the caller enforces
    /// this), so offset-array ties never arise: a value can only ever
    /// displace offset 0 by beating the previous best.
    pub fn register_record(&mut self, value: StartValue, stop_time: StopTime) {
        debug_assert!(stop_time > self.best_stop_time);
        self.best_stop_time = stop_time;

        self.val0mod1off[2] = self.val0mod1off[1];
        self.val0mod1off[1] = self.val0mod1off[0];
        self.val0mod1off[0] = value;

        if value.rem_u128(6) == 1 {
            self.val1mod6off[2] = self.val1mod6off[1];
            self.val1mod6off[1] = self.val1mod6off[0];
            self.val1mod6off[0] = value;
        }
    }
}

/// Human-readable, line-based, tolerant encode/decode for `position.txt`.
pub mod codec {
    use super::*;

    fn line(key: &str, value: u128) -> String {
        let mut out = String::new();
        out.push_str(key);
        out.push('=');
        out.push_str(&value.to_string());
        out
    }

    /// Encode a `Position` as the `position.txt` body.
    pub fn encode_position(pos: &Position) -> String {
        let (lo, hi) = pos.cur_start_value.to_limbs();
        let mut lines = Vec::with_capacity(9);
        lines.push(line("cur_start_value_lo", lo as u128));
        lines.push(line("cur_start_value_hi", hi as u128));
        lines.push(line("best_stop_time", pos.best_stop_time.0 as u128));
        for (i, v) in pos.val0mod1off.iter().enumerate() {
            lines.push(line(&alloc::format!("val0mod1off_{i}"), v.0));
        }
        for (i, v) in pos.val1mod6off.iter().enumerate() {
            lines.push(line(&alloc::format!("val1mod6off_{i}"), v.0));
        }
        lines.join("\n")
    }

    /// Decode a `position.txt` body. Unrecognised or malformed lines are
    /// ignored; missing fields fall back to `Position::fresh()` defaults,
    /// per the spec's "no-file / bad-path is a fresh start" policy.
    pub fn decode_position(text: &str) -> Position {
        let mut pos = Position::fresh();
        let (mut lo, mut hi) = pos.cur_start_value.to_limbs();

        for raw_line in text.lines() {
            let Some((key, value)) = raw_line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let Ok(parsed) = value.trim().parse::<u128>() else {
                continue;
            };

            match key {
                "cur_start_value_lo" => lo = parsed as u64,
                "cur_start_value_hi" => hi = parsed as u64,
                "best_stop_time" => pos.best_stop_time = StopTime(parsed as u16),
                "val0mod1off_0" => pos.val0mod1off[0] = StartValue(parsed),
                "val0mod1off_1" => pos.val0mod1off[1] = StartValue(parsed),
                "val0mod1off_2" => pos.val0mod1off[2] = StartValue(parsed),
                "val1mod6off_0" => pos.val1mod6off[0] = StartValue(parsed),
                "val1mod6off_1" => pos.val1mod6off[1] = StartValue(parsed),
                "val1mod6off_2" => pos.val1mod6off[2] = StartValue(parsed),
                _ => {
                    // Unrecognised line; caller may log a warning.
                }
            }
        }

        pos.cur_start_value = StartValue::from_limbs(lo, hi);
        pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_position_starts_at_one() {
        let pos = Position::fresh();
        assert_eq!(pos.cur_start_value, StartValue::ONE);
        assert_eq!(pos.best_stop_time, StopTime::UNKNOWN);
    }

    #[test]
    fn advance_moves_by_stride() {
        let mut pos = Position::fresh();
        pos.advance(256, 4).unwrap();
        assert_eq!(pos.cur_start_value, StartValue(1 + 256 * 4));
    }

    #[test]
    fn advance_reports_exhaustion() {
        let mut pos = Position::fresh();
        pos.cur_start_value = StartValue(u128::MAX - 10);
        assert!(pos.advance(100, 1).is_none());
    }

    #[test]
    fn register_record_shifts_offsets() {
        let mut pos = Position::fresh();
        pos.register_record(StartValue(2), StopTime(1));
        assert_eq!(pos.val0mod1off[0], StartValue(2));
        pos.register_record(StartValue(3), StopTime(7));
        assert_eq!(pos.val0mod1off[0], StartValue(3));
        assert_eq!(pos.val0mod1off[1], StartValue(2));
        assert_eq!(pos.best_stop_time, StopTime(7));
    }

    #[test]
    fn register_record_tracks_mod6_residue_separately() {
        let mut pos = Position::fresh();
        pos.register_record(StartValue(2), StopTime(1)); // 2 % 6 != 1
        assert_eq!(pos.val1mod6off[0], StartValue(0));
        pos.register_record(StartValue(7), StopTime(16)); // 7 % 6 == 1
        assert_eq!(pos.val1mod6off[0], StartValue(7));
    }

    #[test]
    fn position_round_trips_through_codec() {
        let mut pos = Position::fresh();
        pos.register_record(StartValue(2), StopTime(1));
        pos.register_record(StartValue(27), StopTime(111));
        let encoded = codec::encode_position(&pos);
        let decoded = codec::decode_position(&encoded);
        assert_eq!(decoded, pos);
    }

    #[test]
    fn decode_tolerates_unknown_and_malformed_lines() {
        let text = "cur_start_value_lo=42\nbogus_field=abc\n\nbest_stop_time=9\n";
        let pos = codec::decode_position(text);
        assert_eq!(pos.cur_start_value, StartValue(42));
        assert_eq!(pos.best_stop_time, StopTime(9));
    }

    #[test]
    fn decode_missing_file_body_yields_fresh_position() {
        let pos = codec::decode_position("");
        assert_eq!(pos, Position::fresh());
    }
}
