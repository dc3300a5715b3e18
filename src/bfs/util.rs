/*
 * Copyright 2025 Luc Lenôtre
 *
 * This file is part of Maestro.
 *
 * Maestro is free software: you can redistribute it and/or modify it under the
 * terms of the GNU General Public License as published by the Free Software
 * Foundation, either version 3 of the License, or (at your option) any later
 * version.
 *
 * Maestro is distributed in the hope that it will be useful, but WITHOUT ANY
 * WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS FOR
 * A PARTICULAR PURPOSE. See the GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License along with
 * Maestro. If not, see <https://www.gnu.org/licenses/>.
 */

//! Formatting helpers shared by the engine and the shell.

use std::fmt;
use std::mem::MaybeUninit;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch, in seconds.
pub fn get_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("System clock panic!")
        .as_secs() as u32
}

/// A number of bytes, displayed in decimal units (B/K/M/G/T).
pub struct ByteSize(pub u64);

impl fmt::Display for ByteSize {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        const UNITS: [(u64, &str); 4] = [
            (1_000_000_000_000, "T"),
            (1_000_000_000, "G"),
            (1_000_000, "M"),
            (1_000, "K"),
        ];
        for (unit, suffix) in UNITS {
            if self.0 >= unit {
                let size = self.0 as f64 / unit as f64;
                let precision = usize::from(size < 10.);
                return write!(fmt, "{size:.precision$}{suffix}");
            }
        }
        write!(fmt, "{}B", self.0)
    }
}

/// A timestamp displayed as local time, `YYYY-MM-DD HH:MM:SS`.
pub struct LocalTime(pub u32);

impl fmt::Display for LocalTime {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let t = self.0 as libc::time_t;
        let tm = unsafe {
            let mut tm: libc::tm = MaybeUninit::zeroed().assume_init();
            libc::localtime_r(&t, &mut tm);
            tm
        };
        write!(
            fmt,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            tm.tm_year + 1900,
            tm.tm_mon + 1,
            tm.tm_mday,
            tm.tm_hour,
            tm.tm_min,
            tm.tm_sec
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bytesize() {
        assert_eq!(format!("{}", ByteSize(0)).as_str(), "0B");
        assert_eq!(format!("{}", ByteSize(5)).as_str(), "5B");
        assert_eq!(format!("{}", ByteSize(999)).as_str(), "999B");
        assert_eq!(format!("{}", ByteSize(1000)).as_str(), "1.0K");
        assert_eq!(format!("{}", ByteSize(1500)).as_str(), "1.5K");
        assert_eq!(format!("{}", ByteSize(15000)).as_str(), "15K");
        assert_eq!(format!("{}", ByteSize(999999)).as_str(), "1000K");
        assert_eq!(format!("{}", ByteSize(1_000_000)).as_str(), "1.0M");
        assert_eq!(format!("{}", ByteSize(4_239_360)).as_str(), "4.2M");
        assert_eq!(format!("{}", ByteSize(2_500_000_000)).as_str(), "2.5G");
        assert_eq!(format!("{}", ByteSize(7_000_000_000_000)).as_str(), "7.0T");
    }

    #[test]
    fn localtime_shape() {
        // The exact value depends on the local timezone, the shape does not
        let s = format!("{}", LocalTime(0));
        assert_eq!(s.len(), 19);
        assert_eq!(s.as_bytes()[4], b'-');
        assert_eq!(s.as_bytes()[7], b'-');
        assert_eq!(s.as_bytes()[10], b' ');
        assert_eq!(s.as_bytes()[13], b':');
        assert_eq!(s.as_bytes()[16], b':');
        assert!(s.starts_with("19"));
    }
}
