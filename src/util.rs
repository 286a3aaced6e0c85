//! Miscellaneous utilities.

use std::fmt;

/// Wrapper to force a `&[u8]` to display as nicely-formatted hexadecimal
/// bytes with only the the first line or so of bytes shown.
pub struct BytesFormatter<'a>(pub &'a [u8]);

impl<'a> fmt::Debug for BytesFormatter<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let BytesFormatter(bytes) = *self;
        for byte in bytes.iter().take(16) {
            write!(f, "{:02x} ", byte)?;
        }
        write!(f, "({} bytes)", bytes.len())?;
        Ok(())
    }
}

/// Parse an integer literal the way `*.idx` values are written: a leading
/// `0x` selects base 16, `0b` base 2, any other leading `0` base 8, and
/// everything else base 10.  An empty string maps to -1, and an
/// unparseable one to 0.
pub fn parse_int(s: &str) -> i64 {
    let s = s.trim();
    if s.is_empty() {
        return -1;
    }
    let (digits, radix) = if s.starts_with("0x") || s.starts_with("0X") {
        (&s[2..], 16)
    } else if s.starts_with("0b") || s.starts_with("0B") {
        (&s[2..], 2)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    };
    i64::from_str_radix(digits, radix).unwrap_or(0)
}

#[test]
fn parse_int_literals() {
    assert_eq!(parse_int("0x10"), 16);
    assert_eq!(parse_int("0b10"), 2);
    assert_eq!(parse_int("010"), 8);
    assert_eq!(parse_int("10"), 10);
    assert_eq!(parse_int("0"), 0);
    assert_eq!(parse_int(""), -1);
    assert_eq!(parse_int("   "), -1);
    assert_eq!(parse_int("abc"), 0);
    assert_eq!(parse_int("-5"), -5);
}

/// Parse an `hh:mm:ss:ms` timestamp into 90 kHz clock ticks, as used by
/// `timestamp:` lines in `*.idx` files.
pub fn time_str_to_pts(s: &str) -> Option<i64> {
    let mut parts = s.trim().split(':');
    let hours: i64 = parts.next()?.trim().parse().ok()?;
    let minutes: i64 = parts.next()?.trim().parse().ok()?;
    let seconds: i64 = parts.next()?.trim().parse().ok()?;
    let millis: i64 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if hours < 0 || minutes < 0 || seconds < 0 || millis < 0 {
        return None;
    }
    Some((((hours * 60 + minutes) * 60 + seconds) * 1000 + millis) * 90)
}

/// Format 90 kHz clock ticks as the `hh:mm:ss:ms` timestamp used by
/// `*.idx` files.
pub fn pts_to_time_str(pts: i64) -> String {
    let millis_total = pts / 90;
    let millis = millis_total % 1000;
    let seconds = (millis_total / 1000) % 60;
    let minutes = (millis_total / (60 * 1000)) % 60;
    let hours = millis_total / (60 * 60 * 1000);
    format!("{:02}:{:02}:{:02}:{:03}", hours, minutes, seconds, millis)
}

#[test]
fn parse_time_str() {
    assert_eq!(time_str_to_pts("00:00:01:000"), Some(90000));
    assert_eq!(time_str_to_pts("00:00:10:000"), Some(900000));
    assert_eq!(time_str_to_pts("01:02:03:004"), Some((3723004) * 90));
    assert_eq!(time_str_to_pts("00:00:01"), None);
    assert_eq!(time_str_to_pts("xx:00:01:000"), None);
}

#[test]
fn format_time_str() {
    assert_eq!(pts_to_time_str(90000), "00:00:01:000");
    assert_eq!(pts_to_time_str(945000), "00:00:10:500");
    assert_eq!(time_str_to_pts(&pts_to_time_str(3723004 * 90)),
               Some(3723004 * 90));
}
