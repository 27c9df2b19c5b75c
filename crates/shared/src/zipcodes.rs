//! Zip code directory
//!
//! Read-only lookup from 5-digit zip code to IANA time zone and coordinates.
//! The dataset is a JSON object in the compact form
//! `{"78701": ["America/Chicago", 30.27, -97.74], ...}`; keys starting with `_`
//! carry metadata and are skipped. It is loaded once at startup and shared
//! behind an `Arc`.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::ZipLookupError;

/// US time zones supported by the service
pub const US_TIMEZONES: [Tz; 7] = [
    chrono_tz::America::New_York,
    chrono_tz::America::Chicago,
    chrono_tz::America::Denver,
    chrono_tz::America::Phoenix,
    chrono_tz::America::Los_Angeles,
    chrono_tz::America::Anchorage,
    chrono_tz::Pacific::Honolulu,
];

/// Latitude/longitude rounded to ~1km
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy)]
struct ZipRecord {
    timezone: Tz,
    coordinates: Coordinates,
}

/// Immutable zip → (time zone, coordinates) directory
#[derive(Debug, Clone)]
pub struct ZipDirectory {
    records: HashMap<String, ZipRecord>,
}

impl ZipDirectory {
    /// Load the dataset from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ZipLookupError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let directory = Self::from_json_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            zip_count = directory.len(),
            "Zip directory loaded"
        );
        Ok(directory)
    }

    /// Parse the dataset from its JSON text
    pub fn from_json_str(raw: &str) -> Result<Self, ZipLookupError> {
        let entries: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|e| ZipLookupError::InvalidDataset(e.to_string()))?;

        let mut records = HashMap::with_capacity(entries.len());
        for (zip, value) in entries {
            if zip.starts_with('_') {
                continue;
            }
            if zip.len() != 5 || !zip.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ZipLookupError::InvalidDataset(format!(
                    "key {:?} is not a 5-digit zip",
                    zip
                )));
            }

            let (tz_name, lat, lon): (String, f64, f64) = serde_json::from_value(value)
                .map_err(|e| ZipLookupError::InvalidDataset(format!("{}: {}", zip, e)))?;
            let timezone: Tz = tz_name
                .parse()
                .map_err(|e| ZipLookupError::InvalidDataset(format!("{}: {}", zip, e)))?;
            if !US_TIMEZONES.contains(&timezone) {
                return Err(ZipLookupError::InvalidDataset(format!(
                    "{}: unsupported time zone {}",
                    zip, tz_name
                )));
            }

            records.insert(
                zip,
                ZipRecord {
                    timezone,
                    coordinates: Coordinates { lat, lon },
                },
            );
        }

        Ok(Self { records })
    }

    /// Number of zip codes in the directory
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get the IANA time zone for a zip code
    pub fn timezone_for_zip(&self, zip_code: &str) -> Result<Tz, ZipLookupError> {
        self.record(zip_code).map(|r| r.timezone)
    }

    /// Get the coordinates for a zip code
    pub fn coordinates_for_zip(&self, zip_code: &str) -> Result<Coordinates, ZipLookupError> {
        self.record(zip_code).map(|r| r.coordinates)
    }

    /// Check whether a zip code is in the dataset
    pub fn is_supported_zip(&self, zip_code: &str) -> bool {
        self.records.contains_key(zip_code)
    }

    fn record(&self, zip_code: &str) -> Result<&ZipRecord, ZipLookupError> {
        self.records
            .get(zip_code)
            .ok_or_else(|| ZipLookupError::UnknownZip(zip_code.to_string()))
    }
}

/// Find every supported time zone whose local wall-clock hour at `now` equals `target_hour`
///
/// DST is resolved per zone from the tz database, so the result shifts with
/// the seasons. Two zones can share the same local hour (e.g. Phoenix and
/// Los Angeles in summer).
pub fn timezones_at_hour(now: DateTime<Utc>, target_hour: u32) -> Vec<Tz> {
    US_TIMEZONES
        .iter()
        .copied()
        .filter(|tz| now.with_timezone(tz).hour() == target_hour)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const DATASET: &str = include_str!("../../../data/zip-timezones.json");

    fn directory() -> ZipDirectory {
        ZipDirectory::from_json_str(DATASET).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_timezone_for_known_zips() {
        let zips = directory();
        assert_eq!(zips.timezone_for_zip("78701").unwrap().name(), "America/Chicago");
        assert_eq!(zips.timezone_for_zip("10001").unwrap().name(), "America/New_York");
        assert_eq!(
            zips.timezone_for_zip("90001").unwrap().name(),
            "America/Los_Angeles"
        );
    }

    #[test]
    fn test_unknown_zip_fails_both_lookups() {
        let zips = directory();
        for zip in ["00000", "99999"] {
            assert!(matches!(
                zips.timezone_for_zip(zip),
                Err(ZipLookupError::UnknownZip(z)) if z == zip
            ));
            assert!(matches!(
                zips.coordinates_for_zip(zip),
                Err(ZipLookupError::UnknownZip(_))
            ));
            assert!(!zips.is_supported_zip(zip));
        }
    }

    #[test]
    fn test_coordinates_for_austin() {
        let coords = directory().coordinates_for_zip("78701").unwrap();
        assert!((coords.lat - 30.27).abs() < 0.05);
        assert!((coords.lon - -97.74).abs() < 0.05);
    }

    #[test]
    fn test_metadata_keys_skipped() {
        let zips = ZipDirectory::from_json_str(
            r#"{"_comment": "x", "_total_zips": 1, "78701": ["America/Chicago", 30.27, -97.74]}"#,
        )
        .unwrap();
        assert_eq!(zips.len(), 1);
    }

    #[test]
    fn test_dataset_rejects_foreign_zone() {
        let err = ZipDirectory::from_json_str(r#"{"12345": ["Europe/Paris", 48.85, 2.35]}"#)
            .unwrap_err();
        assert!(matches!(err, ZipLookupError::InvalidDataset(_)));
    }

    #[test]
    fn test_dataset_rejects_malformed_record() {
        let err = ZipDirectory::from_json_str(r#"{"12345": {"tz": "America/Chicago"}}"#)
            .unwrap_err();
        assert!(matches!(err, ZipLookupError::InvalidDataset(_)));
    }

    #[test]
    fn test_8pm_central_in_winter() {
        // 02:00 UTC on Jan 15 is 8pm CST on Jan 14
        let zones = timezones_at_hour(utc(2025, 1, 15, 2), 20);
        assert_eq!(zones, vec![chrono_tz::America::Chicago]);
    }

    #[test]
    fn test_8pm_shifts_with_dst() {
        // Same UTC instant in July: Central is on CDT (9pm), Mountain on MDT (8pm)
        let zones = timezones_at_hour(utc(2025, 7, 15, 2), 20);
        assert_eq!(zones, vec![chrono_tz::America::Denver]);
    }

    #[test]
    fn test_two_zones_share_an_hour() {
        // Phoenix never observes DST, so it lines up with Denver in winter
        let winter = timezones_at_hour(utc(2025, 1, 15, 3), 20);
        assert_eq!(
            winter,
            vec![chrono_tz::America::Denver, chrono_tz::America::Phoenix]
        );

        // ...and with Los Angeles in summer
        let summer = timezones_at_hour(utc(2025, 7, 15, 3), 20);
        assert_eq!(
            summer,
            vec![chrono_tz::America::Phoenix, chrono_tz::America::Los_Angeles]
        );
    }

    #[test]
    fn test_alaska_and_hawaii() {
        assert_eq!(
            timezones_at_hour(utc(2025, 1, 15, 5), 20),
            vec![chrono_tz::America::Anchorage]
        );
        assert_eq!(
            timezones_at_hour(utc(2025, 1, 15, 6), 20),
            vec![chrono_tz::Pacific::Honolulu]
        );
    }

    #[test]
    fn test_spring_forward_day() {
        // Before the 2025-03-09 switch New York is UTC-5, after it UTC-4
        assert_eq!(
            timezones_at_hour(utc(2025, 3, 8, 1), 20),
            vec![chrono_tz::America::New_York]
        );
        assert_eq!(
            timezones_at_hour(utc(2025, 3, 10, 0), 20),
            vec![chrono_tz::America::New_York]
        );
    }

    #[test]
    fn test_matches_equal_local_hour_for_every_instant_of_a_day() {
        for hour in 0..24 {
            let now = utc(2025, 11, 2, hour);
            let zones = timezones_at_hour(now, 20);
            for tz in US_TIMEZONES {
                let is_eight = now.with_timezone(&tz).hour() == 20;
                assert_eq!(zones.contains(&tz), is_eight, "{} at {}", tz.name(), now);
            }
        }
    }

    #[test]
    fn test_impossible_hour_is_empty() {
        assert!(timezones_at_hour(utc(2025, 1, 15, 12), 25).is_empty());
    }
}
