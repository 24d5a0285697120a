//! Alert fingerprints
//!
//! Volatile tokens are replaced before hashing so that two occurrences of the
//! same failure in different runs collapse to one fingerprint:
//!
//! - UUIDs (run ids) become `<run>`
//! - `line 123` becomes `line <n>`
//! - any other number of 3+ digits becomes `<id>`
//!
//! Numbers of one or two digits are kept.

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
        .expect("UUID_RE is a valid regex pattern")
});

static LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bline\s+\d+").expect("LINE_RE is a valid regex pattern"));

static LONG_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3,}").expect("LONG_NUMBER_RE is a valid regex pattern"));

/// Message with volatile tokens replaced by fixed placeholders
pub fn normalize_message(message: &str) -> String {
    let message = UUID_RE.replace_all(message.trim(), "<run>");
    let message = LINE_RE.replace_all(&message, "line <n>");
    LONG_NUMBER_RE.replace_all(&message, "<id>").into_owned()
}

/// SHA-256 over (exception type, normalized message, source component)
pub fn fingerprint(exception_type: &str, message: &str, source_component: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [
        exception_type,
        normalize_message(message).as_str(),
        source_component,
    ] {
        hasher.update(part.len().to_string().as_bytes());
        hasher.update(b":");
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_and_long_numbers_collapse() {
        let a = "Run 3f2b6c1e-9a4d-4c1b-8e2f-0d6a7b5c4e3a failed on case 12345 at line 88";
        let b = "Run 0b1c2d3e-4f5a-6b7c-8d9e-0f1a2b3c4d5e failed on case 67890 at line 412";
        assert_eq!(normalize_message(a), normalize_message(b));
        assert_eq!(
            normalize_message(a),
            "Run <run> failed on case <id> at line <n>"
        );
    }

    #[test]
    fn test_short_numbers_preserved() {
        assert_eq!(normalize_message("retry 2 of 3"), "retry 2 of 3");
        assert_ne!(
            normalize_message("status 40 returned"),
            normalize_message("status 41 returned")
        );
        assert_eq!(normalize_message("item 99 vs 100"), "item 99 vs <id>");
    }

    #[test]
    fn test_fingerprint_identity() {
        let fp = fingerprint("BoardError::Network", "connection reset", "docket-sync");
        assert_eq!(fp.len(), 64);
        assert_eq!(
            fp,
            fingerprint("BoardError::Network", "connection reset", "docket-sync")
        );
    }

    #[test]
    fn test_fingerprint_differs_on_each_component() {
        let base = fingerprint("BoardError::Network", "connection reset", "docket-sync");
        assert_ne!(
            base,
            fingerprint("BoardError::Timeout", "connection reset", "docket-sync")
        );
        assert_ne!(
            base,
            fingerprint("BoardError::Network", "connection refused", "docket-sync")
        );
        assert_ne!(
            base,
            fingerprint("BoardError::Network", "connection reset", "scheduler")
        );
    }

    #[test]
    fn test_fingerprint_stable_across_runs() {
        assert_eq!(
            fingerprint("StoreError", "case 1001 failed", "docket-sync"),
            fingerprint("StoreError", "case 2002 failed", "docket-sync")
        );
    }
}
