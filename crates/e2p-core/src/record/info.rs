//! Partition taxonomy derived from a record's business fields.

use chrono::{DateTime, Datelike, Timelike, Utc};

/// Separator joining the four taxonomy fields into the composite key.
pub const KEY_SEPARATOR: char = '.';

/// Sentinel for a missing taxonomy segment.
pub const UNKNOWN_SEGMENT: &str = "unknown";

/// Derived partition taxonomy: capability, domain, service, application,
/// plus the cached composite key.
///
/// The key is a deterministic, order-preserving join of the four fields;
/// parsing a key reconstructs the same fields, padding missing trailing
/// segments with [`UNKNOWN_SEGMENT`] rather than failing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordInfo {
    capability: String,
    domain: String,
    service: String,
    application: String,
    key: String,
}

impl RecordInfo {
    /// Build info from the four taxonomy fields. Empty fields normalize to
    /// the unknown sentinel so keys and paths never embed empty segments.
    pub fn new(capability: &str, domain: &str, service: &str, application: &str) -> Self {
        let capability = segment(capability);
        let domain = segment(domain);
        let service = segment(service);
        let application = segment(application);
        let key = format!(
            "{}{sep}{}{sep}{}{sep}{}",
            capability,
            domain,
            service,
            application,
            sep = KEY_SEPARATOR
        );
        Self {
            capability,
            domain,
            service,
            application,
            key,
        }
    }

    /// Reconstruct info from a composite key, padding short keys.
    pub fn from_key(key: &str) -> Self {
        let mut parts = key.splitn(4, KEY_SEPARATOR);
        let capability = parts.next().unwrap_or(UNKNOWN_SEGMENT);
        let domain = parts.next().unwrap_or(UNKNOWN_SEGMENT);
        let service = parts.next().unwrap_or(UNKNOWN_SEGMENT);
        let application = parts.next().unwrap_or(UNKNOWN_SEGMENT);
        Self::new(capability, domain, service, application)
    }

    /// The composite partition key.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    /// Build the target path for a converted file.
    ///
    /// `when` is the conversion wall-clock time, not any record's own
    /// timestamp, so every record converted together lands in one hour
    /// partition. The generation id and content hash keep two flushes of the
    /// same key in the same hour from colliding.
    ///
    /// Format:
    /// `capability/year=YYYY/month=MM/day=DD/hour=HH/<id>-<key>-<hash>.parquet`
    pub fn target_path(
        &self,
        when: DateTime<Utc>,
        generation_id: &str,
        content_hash: &str,
    ) -> String {
        format!(
            "{}/year={:04}/month={:02}/day={:02}/hour={:02}/{}-{}-{}.parquet",
            self.capability,
            when.year(),
            when.month(),
            when.day(),
            when.hour(),
            generation_id,
            self.key,
            content_hash
        )
    }
}

fn segment(value: &str) -> String {
    if value.is_empty() {
        UNKNOWN_SEGMENT.to_string()
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_key_round_trip() {
        let info = RecordInfo::new("payments", "checkout", "gateway", "web");
        assert_eq!(info.key(), "payments.checkout.gateway.web");

        let parsed = RecordInfo::from_key(info.key());
        assert_eq!(parsed, info);
        assert_eq!(parsed.capability(), "payments");
        assert_eq!(parsed.domain(), "checkout");
        assert_eq!(parsed.service(), "gateway");
        assert_eq!(parsed.application(), "web");
    }

    #[test]
    fn test_short_key_pads_with_unknown() {
        let info = RecordInfo::from_key("cap");
        assert_eq!(info.capability(), "cap");
        assert_eq!(info.domain(), UNKNOWN_SEGMENT);
        assert_eq!(info.service(), UNKNOWN_SEGMENT);
        assert_eq!(info.application(), UNKNOWN_SEGMENT);
        assert_eq!(info.key(), "cap.unknown.unknown.unknown");
    }

    #[test]
    fn test_empty_fields_normalize() {
        let info = RecordInfo::new("", "checkout", "", "web");
        assert_eq!(info.key(), "unknown.checkout.unknown.web");
    }

    #[test]
    fn test_target_path_format() {
        let info = RecordInfo::new("payments", "checkout", "gateway", "web");
        let when = Utc.with_ymd_and_hms(2026, 3, 7, 9, 15, 0).unwrap();
        let path = info.target_path(when, "gen42", "deadbeef");
        assert_eq!(
            path,
            "payments/year=2026/month=03/day=07/hour=09/gen42-payments.checkout.gateway.web-deadbeef.parquet"
        );
    }
}
