//! # decoder
//!
//! Turns one raw text line from the tag's debug output into an optional
//! `(anchor_id, distance_m)` pair.
//!
//! Accepted report shape (anywhere in the line, serial-monitor prefixes allowed):
//!
//! ```text
//! 13:38:49.068 -> [TAG] A2 = 3.28 m
//! ```
//!
//! i.e. `[TAG]`, optional whitespace, `A` + one or more digits, optional
//! whitespace, `=`, optional whitespace, a decimal number (`12`, `3.28`, `.5`),
//! optional whitespace, then `m`. The anchor id keeps its digits verbatim
//! (`A02` stays `A02`). Anything else decodes to `None`; this never fails.

use uwb_types::{AnchorId, Measurement};

const TAG_MARKER: &str = "[TAG]";

/// Decode a report line. `None` means "not a range report", which callers skip.
pub fn decode(line: &str) -> Option<(AnchorId, f64)> {
    // First well-formed report wins, like a regex search over the line.
    line.match_indices(TAG_MARKER)
        .find_map(|(idx, _)| decode_report(&line[idx + TAG_MARKER.len()..]))
}

/// Decode and stamp a line with the producer's receive time.
pub fn decode_measurement(line: &str, timestamp_ms: u64) -> Option<Measurement> {
    decode(line).map(|(anchor_id, distance_m)| Measurement { timestamp_ms, anchor_id, distance_m })
}

fn decode_report(rest: &str) -> Option<(AnchorId, f64)> {
    let mut cur = Cursor::new(rest);

    cur.skip_whitespace();
    cur.expect('A')?;
    let digits = cur.take_digits();
    if digits.is_empty() {
        return None;
    }

    cur.skip_whitespace();
    cur.expect('=')?;
    cur.skip_whitespace();

    let number = cur.take_decimal()?;
    cur.skip_whitespace();
    cur.expect('m')?;

    let distance: f64 = number.parse().ok()?;
    if !distance.is_finite() || distance < 0.0 {
        return None;
    }
    Some((format!("A{digits}"), distance))
}

// ── Cursor ────────────────────────────────────────────────────────────────────

struct Cursor<'a> {
    s: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(s: &'a str) -> Self { Self { s, pos: 0 } }

    fn rest(&self) -> &'a str { &self.s[self.pos..] }

    fn peek(&self) -> Option<char> { self.rest().chars().next() }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn expect(&mut self, c: char) -> Option<()> {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Some(())
        } else {
            None
        }
    }

    fn take_digits(&mut self) -> &'a str {
        let rest = self.rest();
        let n = rest.bytes().take_while(u8::is_ascii_digit).count();
        self.pos += n;
        &rest[..n]
    }

    /// `digits`, `digits.digits` or `.digits`. A trailing dot without digits
    /// is not part of the number.
    fn take_decimal(&mut self) -> Option<&'a str> {
        let start = self.pos;
        self.take_digits();

        let after_int = self.pos;
        if self.expect('.').is_some() && self.take_digits().is_empty() {
            self.pos = after_int;
        }

        if self.pos == start {
            return None;
        }
        Some(&self.s[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn decodes_plain_report() {
        assert_eq!(decode("[TAG] A2 = 3.28 m"), Some(("A2".to_string(), 3.28)));
    }

    #[test]
    fn decodes_serial_monitor_prefix() {
        assert_eq!(
            decode("13:38:49.068 -> [TAG] A12 = 10.5 m\r\n"),
            Some(("A12".to_string(), 10.5))
        );
    }

    #[test]
    fn decodes_compact_and_integer_forms() {
        assert_eq!(decode("[TAG]A1=4m"), Some(("A1".to_string(), 4.0)));
        assert_eq!(decode("[TAG] A3 = .75 m"), Some(("A3".to_string(), 0.75)));
        assert_eq!(decode("[TAG] A07 = 1.0 m"), Some(("A07".to_string(), 1.0)));
    }

    #[test]
    fn rejects_garbage_and_near_misses() {
        assert_eq!(decode("garbage"), None);
        assert_eq!(decode(""), None);
        assert_eq!(decode("[TAG] B2 = 3.28 m"), None);
        assert_eq!(decode("[TAG] A = 3.28 m"), None);
        assert_eq!(decode("[TAG] A2 = 3.28"), None);
        assert_eq!(decode("[TAG] A2 = -3.28 m"), None);
        assert_eq!(decode("[TAG] A2 = 3. m"), None);
        assert_eq!(decode("[TAG] A2 = 1.2.3 m"), None);
        assert_eq!(decode("TAG A2 = 3.28 m"), None);
    }

    #[test]
    fn later_report_in_line_is_found_after_broken_one() {
        assert_eq!(
            decode("[TAG] A1 = oops [TAG] A4 = 2.5 m"),
            Some(("A4".to_string(), 2.5))
        );
    }

    #[test]
    fn measurement_carries_timestamp() {
        let m = decode_measurement("[TAG] A5 = 0.5 m", 1234).unwrap();
        assert_eq!(m, Measurement::new(1234, "A5", 0.5));
    }

    proptest! {
        #[test]
        fn never_panics_and_only_yields_valid_ranges(line in ".{0,64}") {
            if let Some((id, d)) = decode(&line) {
                prop_assert!(id.starts_with('A') && id.len() > 1);
                prop_assert!(d.is_finite() && d >= 0.0);
            }
        }

        #[test]
        fn well_formed_reports_round_trip(n in 1u32..500, cm in 0u32..100_000) {
            let d = cm as f64 / 100.0;
            let line = format!("[TAG] A{n} = {d} m");
            prop_assert_eq!(decode(&line), Some((format!("A{n}"), d)));
        }
    }
}
