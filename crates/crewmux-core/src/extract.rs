//! Isolate new terminal output between two scrollback snapshots.
//!
//! When a pane's scrollback rotates, the earlier snapshot is no longer a
//! prefix of the later one; the overlap has to be found by matching the
//! longest suffix of `before` against a prefix of `after`.

/// Width of the probe taken from the start of `after` when searching for
/// the overlap inside `before`.
const CHUNK_SIZE: usize = 40;

/// Return the text added to a pane between the `before` and `after`
/// captures.
///
/// Contract:
/// - `after` extends `before` → the appended tail.
/// - scrolled: the longest suffix of `before` that is a prefix of `after`
///   is dropped from `after` (ties break toward the longest suffix, i.e.
///   the earliest start inside `before`).
/// - no overlap at all → `after` unchanged.
///
/// Pure and infallible. Legitimately repeated text can make the overlap
/// look longer than it was; the result then contains too much, which
/// callers tolerate.
pub fn extract_new_output(before: &str, after: &str) -> String {
    if before.is_empty() {
        return after.to_string();
    }
    if after.is_empty() {
        return String::new();
    }

    // Fast path: plain append.
    if let Some(tail) = after.strip_prefix(before) {
        return tail.to_string();
    }

    let b = before.as_bytes();
    let a = after.as_bytes();

    let chunk = &a[..CHUNK_SIZE.min(a.len())];

    // The overlap cannot be longer than `after`, so only the last
    // |after| bytes of `before` need scanning.
    let scan_start = b.len().saturating_sub(a.len());

    // Earliest chunk occurrence in the scan region = longest suffix.
    let mut from = scan_start;
    while let Some(rel) = find_subslice(&b[from..], chunk) {
        let abs = from + rel;
        let suffix_len = b.len() - abs;
        if a.len() >= suffix_len && a[..suffix_len] == b[abs..] {
            return after[suffix_len..].to_string();
        }
        from = abs + 1;
    }

    // The chunk was capped at CHUNK_SIZE, so overlaps shorter than the
    // chunk were never probed. Try them descending.
    if a.len() > CHUNK_SIZE {
        for k in (1..CHUNK_SIZE).rev() {
            if b[b.len() - k..] == a[..k] {
                return after[k..].to_string();
            }
        }
    }

    after.to_string()
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
