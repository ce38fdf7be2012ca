use crate::datatype::Atomic;
use crate::encoding::{AppTag, Tag};
use crate::{DecodeError, EncodeError};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

/// Wildcard octet for any date or time field.
pub const ANY: u8 = 255;

pub const MONTH_ODD: u8 = 13;
pub const MONTH_EVEN: u8 = 14;
pub const DAY_LAST: u8 = 32;
pub const DAY_ODD: u8 = 33;
pub const DAY_EVEN: u8 = 34;

/// BACnet date with the raw wire octets.
///
/// Wildcards stay literal: `==` compares octets, [`Date::matches`] applies
/// wildcard semantics against a concrete date. `day_of_week` is 1 (Monday)
/// through 7 (Sunday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Date {
    pub year_since_1900: u8,
    pub month: u8,
    pub day: u8,
    pub day_of_week: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

impl Date {
    pub const fn new(year_since_1900: u8, month: u8, day: u8, day_of_week: u8) -> Self {
        Self {
            year_since_1900,
            month,
            day,
            day_of_week,
        }
    }

    pub const fn any() -> Self {
        Self::new(ANY, ANY, ANY, ANY)
    }

    /// Concrete date; `None` when the year cannot be carried in one octet.
    pub fn from_naive(date: NaiveDate) -> Option<Self> {
        let year = u8::try_from(date.year().checked_sub(1900)?).ok()?;
        if year == ANY {
            return None;
        }
        Some(Self::new(
            year,
            date.month() as u8,
            date.day() as u8,
            date.weekday().number_from_monday() as u8,
        ))
    }

    pub fn year(&self) -> Option<i32> {
        (self.year_since_1900 != ANY).then(|| 1900 + i32::from(self.year_since_1900))
    }

    /// The calendar date, if year, month and day are all concrete.
    pub fn to_naive(&self) -> Option<NaiveDate> {
        if self.month > 12 || self.day > 31 {
            return None;
        }
        NaiveDate::from_ymd_opt(self.year()?, u32::from(self.month), u32::from(self.day))
    }

    pub fn is_concrete(&self) -> bool {
        self.to_naive().is_some()
    }

    /// Fills in the day of week when the date is concrete.
    pub fn resolve_day_of_week(&self) -> Self {
        match self.to_naive() {
            Some(date) => Self {
                day_of_week: date.weekday().number_from_monday() as u8,
                ..*self
            },
            None => *self,
        }
    }

    /// Whether the concrete `date` falls within this (possibly wildcard) pattern.
    pub fn matches(&self, date: NaiveDate) -> bool {
        let year_ok = match self.year() {
            None => true,
            Some(year) => year == date.year(),
        };
        let month = date.month() as u8;
        let month_ok = match self.month {
            ANY => true,
            MONTH_ODD => month % 2 == 1,
            MONTH_EVEN => month % 2 == 0,
            m => m == month,
        };
        let day = date.day() as u8;
        let day_ok = match self.day {
            ANY => true,
            DAY_LAST => date.succ_opt().map_or(true, |next| next.month() != date.month()),
            DAY_ODD => day % 2 == 1,
            DAY_EVEN => day % 2 == 0,
            d => d == day,
        };
        let dow_ok = match self.day_of_week {
            ANY => true,
            dow => dow == date.weekday().number_from_monday() as u8,
        };
        year_ok && month_ok && day_ok && dow_ok
    }
}

impl Time {
    pub const fn new(hour: u8, minute: u8, second: u8, hundredths: u8) -> Self {
        Self {
            hour,
            minute,
            second,
            hundredths,
        }
    }

    pub const fn any() -> Self {
        Self::new(ANY, ANY, ANY, ANY)
    }

    pub fn from_naive(time: NaiveTime) -> Self {
        Self::new(
            time.hour() as u8,
            time.minute() as u8,
            time.second() as u8,
            (time.nanosecond() / 10_000_000).min(99) as u8,
        )
    }

    pub fn to_naive(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_milli_opt(
            u32::from(self.hour),
            u32::from(self.minute),
            u32::from(self.second),
            u32::from(self.hundredths) * 10,
        )
    }

    pub fn matches(&self, time: NaiveTime) -> bool {
        let then = Time::from_naive(time);
        [
            (self.hour, then.hour),
            (self.minute, then.minute),
            (self.second, then.second),
            (self.hundredths, then.hundredths),
        ]
        .iter()
        .all(|&(pattern, value)| pattern == ANY || pattern == value)
    }
}

impl Atomic for Date {
    const APP_TAG: AppTag = AppTag::Date;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(
            AppTag::Date,
            vec![self.year_since_1900, self.month, self.day, self.day_of_week],
        ))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        match tag.data.as_slice() {
            [y, m, d, w] => Ok(Date::new(*y, *m, *d, *w)),
            _ => Err(DecodeError::InvalidLength),
        }
    }
}

impl Atomic for Time {
    const APP_TAG: AppTag = AppTag::Time;

    fn to_tag(&self) -> Result<Tag, EncodeError> {
        Ok(Tag::application(
            AppTag::Time,
            vec![self.hour, self.minute, self.second, self.hundredths],
        ))
    }

    fn from_tag(tag: &Tag) -> Result<Self, DecodeError> {
        match tag.data.as_slice() {
            [h, m, s, c] => Ok(Time::new(*h, *m, *s, *c)),
            _ => Err(DecodeError::InvalidLength),
        }
    }
}

impl_atomic_datatype!(Date, Time);

#[cfg(test)]
mod tests {
    use super::{Date, Time, ANY, DAY_LAST, MONTH_EVEN};
    use crate::datatype::{from_bytes, to_bytes};
    use chrono::{NaiveDate, NaiveTime};

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn wildcards_survive_the_wire_literally() {
        let pattern = Date::new(ANY, MONTH_EVEN, DAY_LAST, ANY);
        let bytes = to_bytes(&pattern).unwrap();
        assert_eq!(bytes, vec![0xA4, 0xFF, 14, 32, 0xFF]);
        let decoded: Date = from_bytes(&bytes).unwrap();
        assert_eq!(decoded, pattern);
        assert!(!decoded.is_concrete());
        assert_ne!(decoded, Date::from_naive(ymd(2024, 2, 29)).unwrap());
    }

    #[test]
    fn wildcard_matching_against_calendar() {
        let last_of_even_month = Date::new(ANY, MONTH_EVEN, DAY_LAST, ANY);
        assert!(last_of_even_month.matches(ymd(2024, 2, 29)));
        assert!(!last_of_even_month.matches(ymd(2023, 2, 28) - chrono::Days::new(1)));
        assert!(!last_of_even_month.matches(ymd(2024, 3, 31)));

        // any Friday in 2024
        let fridays = Date::new(124, ANY, ANY, 5);
        assert!(fridays.matches(ymd(2024, 5, 10)));
        assert!(!fridays.matches(ymd(2024, 5, 11)));
    }

    #[test]
    fn day_of_week_resolution() {
        let unresolved = Date::new(124, 7, 4, ANY);
        assert_eq!(unresolved.resolve_day_of_week().day_of_week, 4);
        assert_eq!(Date::any().resolve_day_of_week(), Date::any());
    }

    #[test]
    fn time_wildcards() {
        let on_the_hour = Time::new(ANY, 0, 0, 0);
        assert!(on_the_hour.matches(NaiveTime::from_hms_opt(13, 0, 0).unwrap()));
        assert!(!on_the_hour.matches(NaiveTime::from_hms_opt(13, 0, 1).unwrap()));
        let t = Time::from_naive(NaiveTime::from_hms_milli_opt(8, 30, 15, 250).unwrap());
        assert_eq!(t, Time::new(8, 30, 15, 25));
    }
}
