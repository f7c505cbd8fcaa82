//! Chrono crate type implementations (NaiveDate, NaiveTime, NaiveDateTime, DateTime<Utc>).

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::array::ArrayElement;
use super::{FromWireValue, IsNull, ToWireValue, utf8};

/// Days from 0001-01-01 (CE) to the PostgreSQL epoch, 2000-01-01.
const PG_EPOCH_DAYS_FROM_CE: i32 = 730_120;

/// Microseconds from the Unix epoch to the PostgreSQL epoch.
const PG_EPOCH_UNIX_USECS: i64 = 946_684_800_000_000;

const USECS_PER_SEC: i64 = 1_000_000;

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {} length: {}", what, bytes.len())))
}

fn reject_infinity(s: &str) -> Result<()> {
    if s.eq_ignore_ascii_case("infinity") || s.eq_ignore_ascii_case("-infinity") {
        return Err(Error::Decode(format!("{} is not representable", s)));
    }
    Ok(())
}

/// Microseconds since the PostgreSQL epoch to a UTC instant.
fn from_pg_micros(usecs: i64) -> Result<DateTime<Utc>> {
    if usecs == i64::MAX || usecs == i64::MIN {
        return Err(Error::Decode("infinite timestamp is not representable".into()));
    }
    usecs
        .checked_add(PG_EPOCH_UNIX_USECS)
        .and_then(DateTime::from_timestamp_micros)
        .ok_or_else(|| Error::Decode("timestamp out of range".into()))
}

fn to_pg_micros(dt: &DateTime<Utc>) -> Result<i64> {
    dt.timestamp_micros()
        .checked_sub(PG_EPOCH_UNIX_USECS)
        .ok_or_else(|| Error::Encode("timestamp out of range".into()))
}

fn write_formatted(value: impl std::fmt::Display, buf: &mut Vec<u8>) -> IsNull {
    use std::io::Write;
    let _ = write!(buf, "{}", value);
    IsNull::No
}

// === DATE ===

impl FromWireValue<'_> for NaiveDate {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch(oid::DATE, oid));
        }
        let s = utf8(bytes)?;
        reject_infinity(s)?;
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| Error::Decode(format!("invalid date: {}", e)))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::DATE {
            return Err(Error::type_mismatch(oid::DATE, oid));
        }
        let pg_days = i32::from_be_bytes(fixed::<4>(bytes, "date")?);
        pg_days
            .checked_add(PG_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .ok_or_else(|| Error::Decode(format!("date out of range: {} days", pg_days)))
    }
}

impl ToWireValue for NaiveDate {
    fn natural_oid(&self) -> Oid {
        oid::DATE
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::DATE {
            return Err(Error::type_mismatch(oid::DATE, target_oid));
        }
        let pg_days = self.num_days_from_ce() - PG_EPOCH_DAYS_FROM_CE;
        buf.extend_from_slice(&pg_days.to_be_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::DATE {
            return Err(Error::type_mismatch(oid::DATE, target_oid));
        }
        Ok(write_formatted(self.format("%Y-%m-%d"), buf))
    }
}

// === TIME ===

impl FromWireValue<'_> for NaiveTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch(oid::TIME, oid));
        }
        NaiveTime::parse_from_str(utf8(bytes)?, "%H:%M:%S%.f")
            .map_err(|e| Error::Decode(format!("invalid time: {}", e)))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIME {
            return Err(Error::type_mismatch(oid::TIME, oid));
        }
        let usecs = i64::from_be_bytes(fixed::<8>(bytes, "time")?);
        let secs = u32::try_from(usecs.div_euclid(USECS_PER_SEC));
        let nano = u32::try_from(usecs.rem_euclid(USECS_PER_SEC) * 1000);
        match (secs, nano) {
            (Ok(secs), Ok(nano)) => NaiveTime::from_num_seconds_from_midnight_opt(secs, nano),
            _ => None,
        }
        .ok_or_else(|| Error::Decode(format!("time out of range: {} us", usecs)))
    }
}

impl ToWireValue for NaiveTime {
    fn natural_oid(&self) -> Oid {
        oid::TIME
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::TIME {
            return Err(Error::type_mismatch(oid::TIME, target_oid));
        }
        // Leap-second nanoseconds beyond 1s are clamped into the last microsecond.
        let sub_usecs = i64::from(self.nanosecond().min(999_999_999) / 1000);
        let usecs = i64::from(self.num_seconds_from_midnight()) * USECS_PER_SEC + sub_usecs;
        buf.extend_from_slice(&usecs.to_be_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if target_oid != oid::TIME {
            return Err(Error::type_mismatch(oid::TIME, target_oid));
        }
        Ok(write_formatted(self.format("%H:%M:%S%.6f"), buf))
    }
}

// === TIMESTAMP ===

impl FromWireValue<'_> for NaiveDateTime {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch(oid::TIMESTAMP, oid));
        }
        let s = utf8(bytes)?;
        reject_infinity(s)?;
        // A TIMESTAMPTZ carries an offset after the time part; drop it.
        let s = s
            .get(10..)
            .and_then(|time| time.find(['+', '-']))
            .and_then(|pos| s.get(..pos + 10))
            .unwrap_or(s);
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
            .map_err(|e| Error::Decode(format!("invalid timestamp: {}", e)))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if !matches!(oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch(oid::TIMESTAMP, oid));
        }
        let usecs = i64::from_be_bytes(fixed::<8>(bytes, "timestamp")?);
        from_pg_micros(usecs).map(|dt| dt.naive_utc())
    }
}

impl ToWireValue for NaiveDateTime {
    fn natural_oid(&self) -> Oid {
        oid::TIMESTAMP
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if !matches!(target_oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch(oid::TIMESTAMP, target_oid));
        }
        let usecs = to_pg_micros(&self.and_utc())?;
        buf.extend_from_slice(&usecs.to_be_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if !matches!(target_oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch(oid::TIMESTAMP, target_oid));
        }
        Ok(write_formatted(self.format("%Y-%m-%d %H:%M:%S%.6f"), buf))
    }
}

// === TIMESTAMPTZ ===

impl FromWireValue<'_> for DateTime<Utc> {
    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch(oid::TIMESTAMPTZ, oid));
        }
        let s = utf8(bytes)?;
        reject_infinity(s)?;
        // PostgreSQL prints the offset as +HH, +HH:MM or +HH:MM:SS
        DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f%#z")
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Decode(format!("invalid timestamptz: {}", e)))
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        if oid != oid::TIMESTAMPTZ {
            return Err(Error::type_mismatch(oid::TIMESTAMPTZ, oid));
        }
        from_pg_micros(i64::from_be_bytes(fixed::<8>(bytes, "timestamptz")?))
    }
}

impl ToWireValue for DateTime<Utc> {
    fn natural_oid(&self) -> Oid {
        oid::TIMESTAMPTZ
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        if !matches!(target_oid, oid::TIMESTAMP | oid::TIMESTAMPTZ) {
            return Err(Error::type_mismatch(oid::TIMESTAMPTZ, target_oid));
        }
        buf.extend_from_slice(&to_pg_micros(self)?.to_be_bytes());
        Ok(IsNull::No)
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match target_oid {
            oid::TIMESTAMPTZ => Ok(write_formatted(self.format("%Y-%m-%d %H:%M:%S%.6f+00"), buf)),
            oid::TIMESTAMP => Ok(write_formatted(self.format("%Y-%m-%d %H:%M:%S%.6f"), buf)),
            _ => Err(Error::type_mismatch(oid::TIMESTAMPTZ, target_oid)),
        }
    }
}

impl ArrayElement for NaiveDate {
    const ELEMENT_OID: Oid = oid::DATE;
}

impl ArrayElement for NaiveTime {
    const ELEMENT_OID: Oid = oid::TIME;
}

impl ArrayElement for NaiveDateTime {
    const ELEMENT_OID: Oid = oid::TIMESTAMP;
}

impl ArrayElement for DateTime<Utc> {
    const ELEMENT_OID: Oid = oid::TIMESTAMPTZ;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::Array;

    const USECS_PER_DAY: i64 = 86_400_000_000;

    fn binary<T: ToWireValue>(value: &T) -> Vec<u8> {
        let mut buf = Vec::new();
        value.encode_binary(value.natural_oid(), &mut buf).unwrap();
        buf
    }

    #[test]
    fn date_text_and_binary() {
        let date = NaiveDate::from_text(oid::DATE, b"2024-01-15").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 15));

        // 2024-01-15 is 8780 days after 2000-01-01
        assert_eq!(NaiveDate::from_binary(oid::DATE, &8780_i32.to_be_bytes()).unwrap(), date);
        assert_eq!(binary(&date), 8780_i32.to_be_bytes());

        let before = NaiveDate::from_ymd_opt(1999, 12, 31).unwrap();
        assert_eq!(binary(&before), (-1_i32).to_be_bytes());
    }

    #[test]
    fn date_rejects_infinity_and_wrong_oid() {
        assert!(NaiveDate::from_text(oid::DATE, b"infinity").is_err());
        assert!(NaiveDate::from_binary(oid::DATE, &i32::MAX.to_be_bytes()).is_err());
        assert!(NaiveDate::from_text(oid::TEXT, b"2024-01-15").is_err());
    }

    #[test]
    fn time_text_and_binary() {
        let time = NaiveTime::from_text(oid::TIME, b"10:30:45.123456").unwrap();
        assert_eq!(time.nanosecond(), 123_456_000);
        assert_eq!(NaiveTime::from_text(oid::TIME, b"10:30:45").unwrap().second(), 45);

        let usecs: i64 = (10 * 3600 + 30 * 60 + 45) * USECS_PER_SEC + 123_456;
        assert_eq!(NaiveTime::from_binary(oid::TIME, &usecs.to_be_bytes()).unwrap(), time);
        assert_eq!(binary(&time), usecs.to_be_bytes());
    }

    #[test]
    fn timestamp_binary() {
        let usecs = 8780 * USECS_PER_DAY + (10 * 3600 + 30 * 60 + 45) * USECS_PER_SEC;
        let ts = NaiveDateTime::from_binary(oid::TIMESTAMP, &usecs.to_be_bytes()).unwrap();
        assert_eq!(ts.to_string(), "2024-01-15 10:30:45");
        assert_eq!(binary(&ts), usecs.to_be_bytes());

        // before the epoch
        let ts = NaiveDateTime::from_binary(oid::TIMESTAMP, &(-1_i64).to_be_bytes()).unwrap();
        assert_eq!(ts.to_string(), "1999-12-31 23:59:59.999999");
        assert!(NaiveDateTime::from_binary(oid::TIMESTAMP, &i64::MAX.to_be_bytes()).is_err());
    }

    #[test]
    fn timestamp_text() {
        let ts = NaiveDateTime::from_text(oid::TIMESTAMP, b"2024-01-15 10:30:45.5").unwrap();
        assert_eq!(ts.nanosecond(), 500_000_000);
        let tz = NaiveDateTime::from_text(oid::TIMESTAMPTZ, b"2024-01-15 10:30:45-05").unwrap();
        assert_eq!(tz.hour(), 10);

        let mut buf = Vec::new();
        ts.encode_text(oid::TIMESTAMP, &mut buf).unwrap();
        assert_eq!(buf, b"2024-01-15 10:30:45.500000");
    }

    #[test]
    fn timestamptz_text_and_binary() {
        let ts = DateTime::<Utc>::from_text(oid::TIMESTAMPTZ, b"2024-01-15 10:30:45+02").unwrap();
        assert_eq!(ts.hour(), 8);
        let ts2 = DateTime::<Utc>::from_text(oid::TIMESTAMPTZ, b"2024-01-15 08:30:45.000001+00:00").unwrap();
        assert_eq!(ts2.nanosecond(), 1_000);

        let usecs = to_pg_micros(&ts).unwrap();
        assert_eq!(DateTime::<Utc>::from_binary(oid::TIMESTAMPTZ, &usecs.to_be_bytes()).unwrap(), ts);
        assert!(DateTime::<Utc>::from_binary(oid::TIMESTAMP, &usecs.to_be_bytes()).is_err());
    }

    #[test]
    fn date_array_text() {
        let dates = Array::from(vec![
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
        ]);
        assert_eq!(dates.natural_oid(), oid::DATE_ARRAY);
        let mut buf = Vec::new();
        dates.encode_text(oid::DATE_ARRAY, &mut buf).unwrap();
        assert_eq!(buf, b"{2024-01-15,2000-01-01}");

        let back = Array::<NaiveDate>::from_text(oid::DATE_ARRAY, &buf).unwrap();
        assert_eq!(back, dates);
    }
}
