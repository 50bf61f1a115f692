use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// File extension every container carries.
pub const CONTAINER_EXTENSION: &str = "tar";

/// The date/hour/sub-bucket triple a container path is derived from.
///
/// Ordering is chronological first, so sorting buckets sorts containers the
/// same way the eviction walk visits them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Bucket {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    /// Sub-bucket within the hour (rendered as two lowercase hex digits).
    pub slot: u8,
}

impl Bucket {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, slot: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            slot,
        }
    }

    /// Container path relative to the storage root:
    /// `YYYY/MM/DD/HH/<slot>.tar`.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(format!("{:04}", self.year))
            .join(format!("{:02}", self.month))
            .join(format!("{:02}", self.day))
            .join(format!("{:02}", self.hour))
            .join(format!("{:02x}.{CONTAINER_EXTENSION}", self.slot))
    }

    /// Start of the hour this bucket covers, if the fields form a real date.
    pub fn start_time(&self) -> Option<NaiveDateTime> {
        NaiveDate::from_ymd_opt(self.year.into(), self.month.into(), self.day.into())?
            .and_hms_opt(self.hour.into(), 0, 0)
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}/{:02}/{:02}/{:02}/{:02x}",
            self.year, self.month, self.day, self.hour, self.slot
        )
    }
}

/// Decode the bucket hour a container path belongs to.
///
/// Looks at the last five path components (`YYYY/MM/DD/HH/xx.tar`), so the
/// storage root may be any path. Returns `None` for anything that is not a
/// container path with a valid calendar date.
pub fn bucket_time_from_path(path: &Path) -> Option<NaiveDateTime> {
    if path.extension()? != CONTAINER_EXTENSION {
        return None;
    }
    let parts: Vec<&str> = path
        .components()
        .rev()
        .skip(1)
        .take(4)
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<_>>()?;
    if parts.len() != 4 {
        return None;
    }
    let [hour, day, month, year] = [parts[0], parts[1], parts[2], parts[3]];
    if year.len() != 4 || month.len() != 2 || day.len() != 2 || hour.len() != 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)?
        .and_hms_opt(hour.parse().ok()?, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_is_zero_padded() {
        let bucket = Bucket::new(2023, 1, 5, 7, 0x0a);
        assert_eq!(bucket.relative_path(), PathBuf::from("2023/01/05/07/0a.tar"));
        assert_eq!(bucket.to_string(), "2023/01/05/07/0a");
    }

    #[test]
    fn ordering_is_chronological() {
        let older = Bucket::new(2022, 12, 31, 23, 0xff);
        let newer = Bucket::new(2023, 1, 1, 0, 0x00);
        assert!(older < newer);
    }

    #[test]
    fn path_time_roundtrip() {
        let bucket = Bucket::new(2024, 2, 29, 13, 0x42);
        let path = Path::new("/srv/files").join(bucket.relative_path());
        assert_eq!(bucket_time_from_path(&path), bucket.start_time());
    }

    #[test]
    fn path_time_rejects_non_containers() {
        assert!(bucket_time_from_path(Path::new("files/2024/02/29/13/42.txt")).is_none());
        assert!(bucket_time_from_path(Path::new("13/42.tar")).is_none());
        assert!(bucket_time_from_path(Path::new("files/2024/13/01/00/00.tar")).is_none());
    }
}
