//! S3 event notification parsing.
//!
//! Queue messages carry the standard S3 event notification JSON. The
//! dispatcher only needs the source object locator from the first record:
//! `Records[0].s3.bucket.name` and `Records[0].s3.object.key`.

use serde::Deserialize;

use crate::error::CoreError;

/// The source object a queue message points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObject {
    pub bucket: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
struct S3EventNotification {
    #[serde(rename = "Records")]
    records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
struct S3EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Debug, Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Debug, Deserialize)]
struct S3Object {
    key: String,
}

/// Extract the source object from a raw notification body.
///
/// Fails when the body is not valid notification JSON, when the record
/// list is empty, or when the bucket name or object key is empty.
pub fn parse_notification(body: &str) -> Result<SourceObject, CoreError> {
    let notification: S3EventNotification =
        serde_json::from_str(body).map_err(|e| CoreError::Notification(e.to_string()))?;

    let record = notification
        .records
        .into_iter()
        .next()
        .ok_or_else(|| CoreError::Notification("no records in notification".to_string()))?;

    let bucket = record.s3.bucket.name;
    let key = record.s3.object.key;

    if bucket.is_empty() || key.is_empty() {
        return Err(CoreError::Notification(
            "bucket name or object key is empty".to_string(),
        ));
    }

    Ok(SourceObject { bucket, key })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const BODY: &str =
        r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"in/img.jpg"}}}]}"#;

    #[test]
    fn parses_source_object() {
        let source = parse_notification(BODY).unwrap();
        assert_eq!(source.bucket, "b");
        assert_eq!(source.key, "in/img.jpg");
    }

    #[test]
    fn rejects_invalid_json() {
        assert_matches!(
            parse_notification("not json"),
            Err(CoreError::Notification(_))
        );
    }

    #[test]
    fn rejects_empty_record_list() {
        assert_matches!(
            parse_notification(r#"{"Records":[]}"#),
            Err(CoreError::Notification(_))
        );
    }

    #[test]
    fn rejects_empty_object_key() {
        let body = r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":""}}}]}"#;
        assert_matches!(parse_notification(body), Err(CoreError::Notification(_)));
    }

    #[test]
    fn rejects_missing_records_field() {
        assert_matches!(parse_notification(r#"{}"#), Err(CoreError::Notification(_)));
    }
}
