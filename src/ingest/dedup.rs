// src/ingest/dedup.rs
// Dedup key derivation. This is the single most important correctness
// boundary in the pipeline: two fetches that resolve to the same key must
// merge into one row, never duplicate.

use sha2::{Digest, Sha256};

/// Stable composite key for a posting.
///
/// API/ATS sources carry a native identifier, so the key is
/// `"{source_id}:{native_id}"`. Scraped sources have no stable id; the key
/// is a SHA-256 over the normalized `title|company|location` triple,
/// `"{source_id}:h:{hex}"`, so cosmetic reformatting of the same posting
/// still lands on the same row.
pub fn dedup_key(
    source_id: &str,
    native_id: Option<&str>,
    title: &str,
    company: &str,
    location: &str,
) -> String {
    match native_id {
        Some(nid) if !nid.trim().is_empty() => format!("{}:{}", source_id, nid.trim()),
        _ => {
            let basis = format!(
                "{}|{}|{}",
                normalize_key_text(title),
                normalize_key_text(company),
                normalize_key_text(location)
            );
            let mut hasher = Sha256::new();
            hasher.update(basis.as_bytes());
            let hex: String = hasher
                .finalize()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect();
            format!("{}:h:{}", source_id, &hex[..16])
        }
    }
}

/// Key-text normalization: entity decode, lowercase, strip punctuation,
/// collapse whitespace. The hash must survive re-rendering noise in
/// scraped postings.
pub fn normalize_key_text(s: &str) -> String {
    let decoded = html_escape::decode_html_entities(s);
    let mut out = String::with_capacity(decoded.len());
    let mut prev_space = false;
    for ch in decoded.chars() {
        let c = ch.to_ascii_lowercase();
        if c.is_alphanumeric() {
            out.push(c);
            prev_space = false;
        } else if !prev_space && !out.is_empty() {
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}
