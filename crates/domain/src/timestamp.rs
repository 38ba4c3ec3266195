use chrono::{DateTime, SecondsFormat, Utc};

/// Encodes a lock timestamp payload as an RFC 3339 UTC string.
#[must_use]
pub fn encode_timestamp(timestamp: DateTime<Utc>) -> Vec<u8> {
    timestamp
        .to_rfc3339_opts(SecondsFormat::Micros, true)
        .into_bytes()
}

/// Decodes a lock payload into a timestamp.
///
/// Empty, non UTF-8, or unparsable payloads carry no timestamp.
#[must_use]
pub fn decode_timestamp(payload: &[u8]) -> Option<DateTime<Utc>> {
    let content = std::str::from_utf8(payload).ok()?.trim();
    if content.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc3339(content)
        .ok()
        .map(|timestamp| timestamp.with_timezone(&Utc))
}
