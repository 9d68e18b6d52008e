//! `bucket/prefix` location strings.
//!
//! The intermediate and output storage locations are configured as a
//! single `bucket/prefix` value. Parsing happens once at startup so a
//! malformed value is a configuration error, never a runtime panic.

use std::str::FromStr;

use crate::error::CoreError;

/// An S3 bucket plus a key prefix inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketLocation {
    pub bucket: String,
    pub prefix: String,
}

impl BucketLocation {
    /// Full key for a named object under this location's prefix.
    pub fn key_for(&self, name: &str) -> String {
        format!("{}/{}", self.prefix, name)
    }
}

impl FromStr for BucketLocation {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (bucket, prefix) = s
            .split_once('/')
            .ok_or_else(|| CoreError::Location(s.to_string()))?;
        if bucket.is_empty() || prefix.is_empty() {
            return Err(CoreError::Location(s.to_string()));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
        })
    }
}

impl std::fmt::Display for BucketLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.bucket, self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parses_bucket_and_prefix() {
        let loc: BucketLocation = "my-bucket/out".parse().unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert_eq!(loc.prefix, "out");
    }

    #[test]
    fn keeps_nested_prefix_intact() {
        let loc: BucketLocation = "my-bucket/out/results".parse().unwrap();
        assert_eq!(loc.prefix, "out/results");
    }

    #[test]
    fn rejects_missing_separator() {
        assert_matches!(
            "just-a-bucket".parse::<BucketLocation>(),
            Err(CoreError::Location(_))
        );
    }

    #[test]
    fn rejects_empty_parts() {
        assert_matches!("/out".parse::<BucketLocation>(), Err(CoreError::Location(_)));
        assert_matches!("bucket/".parse::<BucketLocation>(), Err(CoreError::Location(_)));
    }

    #[test]
    fn key_for_joins_prefix_and_name() {
        let loc: BucketLocation = "b/inter".parse().unwrap();
        assert_eq!(loc.key_for("abc.tar.gz"), "inter/abc.tar.gz");
    }
}
