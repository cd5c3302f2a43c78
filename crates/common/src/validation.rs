//! Input validation for external request fields
//!
//! Bucket names and object keys arrive straight from HTTP bodies and are
//! forwarded to object storage, so they are checked here before any I/O.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::sync::OnceLock;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length of an object key (S3 limit)
pub const MAX_OBJECT_KEY_LENGTH: usize = 1024;

/// Minimum length of a bucket name
pub const MIN_BUCKET_LENGTH: usize = 3;

/// Maximum length of a bucket name
pub const MAX_BUCKET_LENGTH: usize = 63;

/// Prefix used for derived keys when the source key has no source segment
pub const PROCESSED_PREFIX: &str = "processed";

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

// ============================================================================
// Object Storage Validation
// ============================================================================

fn bucket_pattern() -> Result<&'static Regex> {
    static PATTERN: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9.\-]*[a-z0-9]$"))
        .as_ref()
        .map_err(|e| anyhow!("invalid bucket pattern: {}", e))
}

/// Validate an S3-style bucket name
pub fn validate_bucket_name(bucket: &str) -> Result<()> {
    validate_non_empty(bucket, "bucket")?;

    if bucket.len() < MIN_BUCKET_LENGTH || bucket.len() > MAX_BUCKET_LENGTH {
        return Err(anyhow!(
            "bucket must be between {} and {} characters (got {})",
            MIN_BUCKET_LENGTH,
            MAX_BUCKET_LENGTH,
            bucket.len()
        ));
    }

    if !bucket_pattern()?.is_match(bucket) || bucket.contains("..") {
        return Err(anyhow!(
            "bucket may only contain lowercase letters, digits, '.' and '-'"
        ));
    }

    Ok(())
}

/// Validate an object key
pub fn validate_object_key(key: &str) -> Result<()> {
    validate_non_empty(key, "file")?;
    validate_length(key, MAX_OBJECT_KEY_LENGTH, "file")?;

    if key.starts_with('/') {
        return Err(anyhow!("file must be a relative object key"));
    }

    if key.chars().any(|c| c.is_control()) {
        return Err(anyhow!("file contains control characters"));
    }

    if key.split('/').any(|segment| segment == ".." || segment == ".") {
        return Err(anyhow!("file contains relative path segments"));
    }

    Ok(())
}

/// Derive the key an annotated image is stored under.
///
/// Every path segment equal to `source_segment` is replaced with
/// `processed_segment`. When the key has no such segment the result is
/// prefixed with [`PROCESSED_PREFIX`], so the derived key never equals the
/// source key.
pub fn processed_key_for(key: &str, source_segment: &str, processed_segment: &str) -> String {
    let mut replaced = false;
    let segments: Vec<&str> = key
        .split('/')
        .map(|segment| {
            if segment == source_segment {
                replaced = true;
                processed_segment
            } else {
                segment
            }
        })
        .collect();

    if replaced && source_segment != processed_segment {
        segments.join("/")
    } else {
        format!("{}/{}", PROCESSED_PREFIX, key)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_bucket_name() {
        assert!(validate_bucket_name("camera-frames").is_ok());
        assert!(validate_bucket_name("site.a.frames-01").is_ok());

        assert!(validate_bucket_name("").is_err());
        assert!(validate_bucket_name("ab").is_err());
        assert!(validate_bucket_name("UpperCase").is_err());
        assert!(validate_bucket_name("-leading").is_err());
        assert!(validate_bucket_name("double..dot").is_err());
        assert!(validate_bucket_name(&"a".repeat(64)).is_err());
    }

    #[test]
    fn test_validate_object_key() {
        assert!(validate_object_key("site/original/frame_0001.jpg").is_ok());
        assert!(validate_object_key("frame.jpg").is_ok());

        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("   ").is_err());
        assert!(validate_object_key("/absolute.jpg").is_err());
        assert!(validate_object_key("a/../b.jpg").is_err());
        assert!(validate_object_key("a\nb.jpg").is_err());
        assert!(validate_object_key(&"k".repeat(2000)).is_err());
    }

    #[test]
    fn test_processed_key_replaces_segment() {
        assert_eq!(
            processed_key_for("site-1/original/img.jpg", "original", "processed"),
            "site-1/processed/img.jpg"
        );
        assert_eq!(
            processed_key_for("original/img.jpg", "original", "processed"),
            "processed/img.jpg"
        );
    }

    #[test]
    fn test_processed_key_never_returns_source() {
        let key = "uploads/original_img.jpg";
        let derived = processed_key_for(key, "original", "processed");
        assert_ne!(derived, key);
        assert_eq!(derived, "processed/uploads/original_img.jpg");

        let same = processed_key_for("a/x/b.jpg", "x", "x");
        assert_ne!(same, "a/x/b.jpg");
    }
}
