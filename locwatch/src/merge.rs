//! Bounded merge of captured log text.
//!
//! Buffers keep the most recent output: when a merge would exceed the ceiling, the oldest
//! bytes are dropped. The cut is moved forward to the next UTF-8 character boundary, so a
//! result can be a few bytes shorter than the ceiling but never longer.

/// Keep at most the last `max_bytes` bytes of `text`.
pub fn keep_suffix(mut text: String, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text;
    }
    let mut cut = text.len() - max_bytes;
    while !text.is_char_boundary(cut) {
        cut += 1;
    }
    text.drain(..cut);
    text
}

/// Append `incoming` to `existing`, trimming to the last `max_bytes` bytes.
///
/// Absent or empty `incoming` leaves `existing` untouched. Re-delivering a chunk that was
/// already merged duplicates its content; callers rely on the stream cursor to avoid it.
pub fn bounded_merge(
    existing: Option<String>,
    incoming: Option<&str>,
    max_bytes: usize,
) -> Option<String> {
    let incoming = match incoming {
        Some(chunk) if !chunk.is_empty() => chunk,
        _ => return existing,
    };
    let merged = match existing {
        Some(mut buffer) => {
            if incoming.len() >= max_bytes {
                // The new chunk alone fills the buffer.
                buffer.clear();
            }
            buffer.push_str(incoming);
            buffer
        }
        None => incoming.to_string(),
    };
    Some(keep_suffix(merged, max_bytes))
}
