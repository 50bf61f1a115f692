use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bucket::Bucket;
use crate::error::{IdError, IdResult};

static UUID_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}")
        .expect("static identifier pattern")
});

/// High bit of the retention byte: "extend life".
const EXTEND_FLAG: u8 = 0x80;
/// Low bits of the retention byte: months to extend.
const EXTEND_MONTHS: u8 = 0x7f;

/// Which identifier scheme an identifier was decoded with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdScheme {
    /// RFC-4122 version 1: timestamp decoded from the UUID itself.
    TimeOrdered,
    /// v4-shaped identifier whose leading digits spell `YYYYMMDD-HHmm`.
    TimeEncoded,
}

impl fmt::Display for IdScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimeOrdered => write!(f, "v1"),
            Self::TimeEncoded => write!(f, "time-v4"),
        }
    }
}

/// An identifier resolved to its container.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedId {
    /// The UUID-shaped substring; used as the entry name inside the container.
    pub normalized: String,
    /// Bucket the container path is derived from.
    pub bucket: Bucket,
    pub scheme: IdScheme,
    /// Months the bucket date was advanced by, when retention extension applied.
    pub extended_months: Option<u8>,
}

impl ResolvedId {
    /// Container path relative to the storage root.
    pub fn container(&self) -> PathBuf {
        self.bucket.relative_path()
    }
}

/// Maps identifiers to containers.
///
/// The retention-extension feature is fixed at construction; two codecs with
/// different settings may place the same identifier in different containers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdCodec {
    extend_life_support: bool,
}

impl IdCodec {
    pub fn new(extend_life_support: bool) -> Self {
        Self {
            extend_life_support,
        }
    }

    pub fn extend_life_support(&self) -> bool {
        self.extend_life_support
    }

    /// Resolve an identifier to its normalized form and container bucket.
    pub fn resolve(&self, identifier: &str) -> IdResult<ResolvedId> {
        let normalized = extract(identifier)?;
        let uuid = Uuid::parse_str(normalized)
            .map_err(|_| IdError::InvalidIdentifier(identifier.to_string()))?;

        match uuid.get_version_num() {
            1 => resolve_time_ordered(normalized, &uuid),
            4 => self.resolve_time_encoded(normalized),
            n => Err(IdError::UnsupportedVersion(n)),
        }
    }

    fn resolve_time_encoded(&self, id: &str) -> IdResult<ResolvedId> {
        if !id.starts_with("20") {
            return Err(IdError::NotTimeEncoded(id.to_string()));
        }
        let digits = |range: std::ops::Range<usize>| -> IdResult<u16> {
            let s = &id[range];
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(IdError::NotTimeEncoded(id.to_string()));
            }
            s.parse().map_err(|_| IdError::NotTimeEncoded(id.to_string()))
        };
        let slot = hex_byte(&id[34..36]);
        let hour = digits(9..11)? as u8;
        let retention = hex_byte(&id[11..13]);

        if self.extend_life_support && retention & EXTEND_FLAG == EXTEND_FLAG {
            let months = retention & EXTEND_MONTHS;
            let created = NaiveDate::parse_from_str(&id[0..8], "%Y%m%d")
                .map_err(|_| IdError::DateDecode(id.to_string()))?;
            let date = add_months(created, months.into())
                .ok_or_else(|| IdError::DateDecode(id.to_string()))?;
            let year =
                u16::try_from(date.year()).map_err(|_| IdError::DateDecode(id.to_string()))?;
            return Ok(ResolvedId {
                normalized: id.to_string(),
                bucket: Bucket::new(year, date.month() as u8, date.day() as u8, hour, slot),
                scheme: IdScheme::TimeEncoded,
                extended_months: Some(months),
            });
        }

        // Without extension the digits are used verbatim, as written.
        Ok(ResolvedId {
            normalized: id.to_string(),
            bucket: Bucket::new(
                digits(0..4)?,
                digits(4..6)? as u8,
                digits(6..8)? as u8,
                hour,
                slot,
            ),
            scheme: IdScheme::TimeEncoded,
            extended_months: None,
        })
    }
}

fn resolve_time_ordered(id: &str, uuid: &Uuid) -> IdResult<ResolvedId> {
    let (secs, nanos) = uuid
        .get_timestamp()
        .ok_or_else(|| IdError::DateDecode(id.to_string()))?
        .to_unix();
    let at = i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, nanos))
        .ok_or_else(|| IdError::DateDecode(id.to_string()))?;
    let year = u16::try_from(at.year()).map_err(|_| IdError::DateDecode(id.to_string()))?;
    Ok(ResolvedId {
        normalized: id.to_string(),
        bucket: Bucket::new(
            year,
            at.month() as u8,
            at.day() as u8,
            at.hour() as u8,
            hex_byte(&id[4..6]),
        ),
        scheme: IdScheme::TimeOrdered,
        extended_months: None,
    })
}

/// Find the first UUID-shaped substring (lowercase hex) in `identifier`.
pub fn extract(identifier: &str) -> IdResult<&str> {
    UUID_SHAPE
        .find(identifier)
        .map(|m| m.as_str())
        .ok_or_else(|| IdError::InvalidIdentifier(identifier.to_string()))
}

/// Generate a fresh time-encoded identifier for the current minute.
pub fn generate_identifier() -> String {
    generate_identifier_at(Utc::now())
}

/// Generate a time-encoded identifier for the given instant.
///
/// The `YYYYMMDD-HHMM` prefix replaces the first 13 characters of a random
/// v4 UUID, keeping its version nibble and randomness.
pub fn generate_identifier_at(now: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().to_string();
    format!("{}{}", now.format("%Y%m%d-%H%M"), &random[13..])
}

/// Add calendar months, normalising day overflow into the following month
/// (Jan 31 + 1 month is Mar 3 in a non-leap year).
fn add_months(date: NaiveDate, months: u32) -> Option<NaiveDate> {
    let total = date.year() * 12 + date.month0() as i32 + months as i32;
    let first = NaiveDate::from_ymd_opt(total.div_euclid(12), total.rem_euclid(12) as u32 + 1, 1)?;
    first.checked_add_days(Days::new(u64::from(date.day() - 1)))
}

/// Two lowercase hex characters, already validated by `UUID_SHAPE`.
fn hex_byte(s: &str) -> u8 {
    u8::from_str_radix(s, 16).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const PLAIN: &str = "20231019-1504-4abc-8def-0123456789ab";

    #[test]
    fn resolves_time_encoded() {
        let resolved = IdCodec::default().resolve(PLAIN).unwrap();
        assert_eq!(resolved.normalized, PLAIN);
        assert_eq!(resolved.scheme, IdScheme::TimeEncoded);
        assert_eq!(resolved.container(), PathBuf::from("2023/10/19/15/ab.tar"));
        assert_eq!(resolved.extended_months, None);
    }

    #[test]
    fn extracts_from_surrounding_text() {
        let resolved = IdCodec::default()
            .resolve(&format!("upload-{PLAIN}.json"))
            .unwrap();
        assert_eq!(resolved.normalized, PLAIN);
    }

    #[test]
    fn resolves_v1_timestamp() {
        // 2022-02-22 19:22:22 UTC
        let id = "c232ab00-9414-11ec-b3c8-9f6bdeced846";
        let resolved = IdCodec::default().resolve(id).unwrap();
        assert_eq!(resolved.scheme, IdScheme::TimeOrdered);
        assert_eq!(resolved.container(), PathBuf::from("2022/02/22/19/ab.tar"));
    }

    #[test]
    fn rejects_wrong_length() {
        let err = IdCodec::default().resolve("20231019-1504-4abc-8def-0123").unwrap_err();
        assert!(matches!(err, IdError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_non_hex() {
        let err = IdCodec::default()
            .resolve("20231019-1504-4abc-8def-0123456789zz")
            .unwrap_err();
        assert!(matches!(err, IdError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_uppercase() {
        let err = IdCodec::default()
            .resolve("20231019-1504-4ABC-8DEF-0123456789AB")
            .unwrap_err();
        assert!(matches!(err, IdError::InvalidIdentifier(_)));
    }

    #[test]
    fn rejects_unsupported_version() {
        let err = IdCodec::default()
            .resolve("20231019-1504-7abc-8def-0123456789ab")
            .unwrap_err();
        assert_eq!(err, IdError::UnsupportedVersion(7));
    }

    #[test]
    fn rejects_wrong_century() {
        let err = IdCodec::default()
            .resolve("19991019-1504-4abc-8def-0123456789ab")
            .unwrap_err();
        assert!(matches!(err, IdError::NotTimeEncoded(_)));
    }

    #[test]
    fn rejects_random_v4() {
        let err = IdCodec::default()
            .resolve("9b2d6c1e-3f4a-4b5c-8d6e-7f8091a2b3c4")
            .unwrap_err();
        assert!(matches!(err, IdError::NotTimeEncoded(_)));
    }

    #[test]
    fn rejects_hex_letters_in_date_and_hour() {
        for id in [
            "2024a315-1000-4abc-8def-0123456789ab",
            "202403fe-1000-4abc-8def-0123456789ab",
            "20240315-1b00-4abc-8def-0123456789ab",
        ] {
            let err = IdCodec::default().resolve(id).unwrap_err();
            assert!(matches!(err, IdError::NotTimeEncoded(_)), "{id}");
        }
    }

    #[test]
    fn extension_advances_date() {
        // 0x8c: extend flag + 12 months
        let id = "20231019-158c-4abc-8def-0123456789ab";
        let resolved = IdCodec::new(true).resolve(id).unwrap();
        assert_eq!(resolved.container(), PathBuf::from("2024/10/19/15/ab.tar"));
        assert_eq!(resolved.extended_months, Some(12));
    }

    #[test]
    fn extension_ignored_when_disabled() {
        let id = "20231019-158c-4abc-8def-0123456789ab";
        let resolved = IdCodec::new(false).resolve(id).unwrap();
        assert_eq!(resolved.container(), PathBuf::from("2023/10/19/15/ab.tar"));
        assert_eq!(resolved.extended_months, None);
    }

    #[test]
    fn extension_without_flag_is_literal() {
        // 0x59 has the high bit clear.
        let resolved = IdCodec::new(true).resolve("20231019-1559-4abc-8def-0123456789ab").unwrap();
        assert_eq!(resolved.container(), PathBuf::from("2023/10/19/15/ab.tar"));
    }

    #[test]
    fn extension_normalises_month_overflow() {
        // Jan 31 + 1 month
        let resolved = IdCodec::new(true).resolve("20230131-0081-4abc-8def-0123456789ab").unwrap();
        assert_eq!(resolved.container(), PathBuf::from("2023/03/03/00/ab.tar"));
    }

    #[test]
    fn extension_with_bad_date_is_an_error() {
        let err = IdCodec::new(true)
            .resolve("20231399-1581-4abc-8def-0123456789ab")
            .unwrap_err();
        assert!(matches!(err, IdError::DateDecode(_)));
    }

    #[test]
    fn generated_identifier_resolves_to_its_minute() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 59, 12).unwrap();
        let id = generate_identifier_at(now);
        assert!(id.starts_with("20240601-0859-4"));
        let resolved = IdCodec::new(true).resolve(&id).unwrap();
        assert_eq!(resolved.bucket.hour, 8);
        assert_eq!(resolved.extended_months, None);
    }

    #[test]
    fn resolved_id_serde_roundtrip() {
        let resolved = IdCodec::default().resolve(PLAIN).unwrap();
        let json = serde_json::to_string(&resolved).unwrap();
        let back: ResolvedId = serde_json::from_str(&json).unwrap();
        assert_eq!(resolved, back);
    }

    proptest! {
        #[test]
        fn same_bucket_same_container(
            day in 1u32..=28,
            month in 1u32..=12,
            year in 2000u32..=2099,
            hour in 0u32..24,
            minute in 0u32..60,
            tail_a in "[a-f0-9]{3}-[a-f0-9]{4}-[a-f0-9]{10}",
            tail_b in "[a-f0-9]{3}-[a-f0-9]{4}-[a-f0-9]{10}",
            slot in "[a-f0-9]{2}",
        ) {
            let prefix = format!("{year:04}{month:02}{day:02}-{hour:02}{minute:02}-4");
            let a = format!("{prefix}{tail_a}{slot}");
            let b = format!("{prefix}{tail_b}{slot}");
            let codec = IdCodec::new(true);
            prop_assert_eq!(codec.resolve(&a).unwrap().container(), codec.resolve(&b).unwrap().container());
        }

        #[test]
        fn extension_adds_exact_months(months in 0u8..=0x7f, day in 1u32..=28, month in 1u32..=12) {
            let id = format!("2023{month:02}{day:02}-10{:02x}-4abc-8def-0123456789ab", 0x80 | months);
            let resolved = IdCodec::new(true).resolve(&id).unwrap();
            let expected = NaiveDate::from_ymd_opt(2023, month, day).unwrap()
                .checked_add_months(chrono::Months::new(months.into()))
                .unwrap();
            prop_assert_eq!(resolved.bucket.year as i32, expected.year());
            prop_assert_eq!(resolved.bucket.month as u32, expected.month());
            prop_assert_eq!(resolved.bucket.day as u32, expected.day());
        }

        #[test]
        fn generated_identifiers_always_resolve(secs in 946_684_800i64..4_102_444_799i64) {
            let now = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
            let id = generate_identifier_at(now);
            let resolved = IdCodec::new(true).resolve(&id).unwrap();
            prop_assert_eq!(resolved.normalized, id);
            prop_assert_eq!(resolved.bucket.hour as u32, now.hour());
        }
    }
}
