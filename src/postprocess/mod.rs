//! Reply post-processing: pure string functions between the raw model output
//! and the outbound channel.
//!
//! The reasoning delimiters are a wire-level convention of the upstream
//! model, handled as plain substring search.

/// Opening reasoning delimiter emitted by the model.
const THINK_OPEN: &str = "<think>";
/// Closing reasoning delimiter; the user-facing answer follows the last one.
const THINK_CLOSE: &str = "</think>";

/// Number of trailing characters of a segment window in which a newline is
/// still considered a good split point.
const NEWLINE_SPLIT_TAIL: usize = 200;

/// Extract the user-facing portion of a raw reply.
///
/// Text after the *last* closing reasoning delimiter, trimmed. An empty
/// result means the model produced reasoning only. Without the delimiter the
/// whole trimmed input is the answer.
pub fn extract_final_answer(raw: &str) -> String {
    match raw.rfind(THINK_CLOSE) {
        Some(idx) => raw[idx + THINK_CLOSE.len()..].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Strip one layer of enclosing code-fence markup and remove every
/// reasoning-delimiter pair with its enclosed content. Idempotent.
pub fn clean(text: &str) -> String {
    let stripped = strip_code_fence(text.trim());
    strip_reasoning_spans(&stripped).trim().to_string()
}

/// Remove one enclosing code fence when both the opening and closing fences
/// are present; otherwise return the input unchanged. An optional language
/// tag on the opening fence line is dropped with it.
fn strip_code_fence(text: &str) -> String {
    let inner = match text
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    {
        Some(inner) => inner,
        None => return text.to_string(),
    };

    let body = match inner.find('\n') {
        Some(idx) if is_language_tag(inner[..idx].trim_end()) => &inner[idx + 1..],
        _ => inner,
    };

    body.strip_suffix('\n').unwrap_or(body).to_string()
}

fn is_language_tag(line: &str) -> bool {
    line.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '+')
}

/// Drop every `<think>...</think>` pair and its content. Unpaired delimiters
/// are left alone.
fn strip_reasoning_spans(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(THINK_OPEN) {
        match rest[start..].find(THINK_CLOSE) {
            Some(close) => {
                out.push_str(&rest[..start]);
                rest = &rest[start + close + THINK_CLOSE.len()..];
            }
            None => break,
        }
    }

    out.push_str(rest);
    out
}

/// Split `text` into non-empty pieces of at most `limit` characters for a
/// size-capped outbound channel.
///
/// Split-point preference inside each window: the last newline when it falls
/// in the window's final stretch, else the last space, else a hard cut at the
/// limit. Split characters are consumed and each piece is trimmed.
pub fn segment(text: &str, limit: usize) -> Vec<String> {
    let mut segments = Vec::new();
    if limit == 0 {
        return segments;
    }

    let mut rest = text.trim();
    while !rest.is_empty() {
        let window_end = match char_boundary_at(rest, limit) {
            Some(end) => end,
            None => {
                segments.push(rest.to_string());
                break;
            }
        };

        let window = &rest[..window_end];
        let (piece, next_start) = match pick_split(window) {
            Some(idx) => (&window[..idx], idx + 1),
            None => (window, window_end),
        };

        let piece = piece.trim();
        if !piece.is_empty() {
            segments.push(piece.to_string());
        }
        rest = rest[next_start..].trim_start();
    }

    segments
}

/// Byte index of the `limit`-th character, or `None` when the text already
/// fits within the limit.
fn char_boundary_at(text: &str, limit: usize) -> Option<usize> {
    let mut count = 0;
    for (byte_idx, _) in text.char_indices() {
        if count == limit {
            return Some(byte_idx);
        }
        count += 1;
    }
    None
}

fn pick_split(window: &str) -> Option<usize> {
    if let Some(idx) = window.rfind('\n') {
        if window[idx..].chars().count() <= NEWLINE_SPLIT_TAIL {
            return Some(idx);
        }
    }
    window.rfind(' ')
}
