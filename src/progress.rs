use std::time::Duration;

/// A single progress observation derived from the tool's stderr stream.
///
/// Transient by design: samples are re-derived from whatever the tool prints
/// and are not persisted. Progress is best-effort — the tool may exit before
/// ever printing 100%.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Percentage complete, 0-100.
    pub percent: u8,
    /// Wall-clock time since the job was launched.
    pub elapsed: Duration,
}

/// Extract the percentage from a progress line.
///
/// `pdf2zh` reports progress on stderr in tqdm style, e.g.
/// ` 60%|██████    | 12/20`. A line counts as a progress line when a decimal
/// integer (possibly space-padded) immediately precedes `%|`. Anything else —
/// no marker, garbage before the marker, a value over 100 — yields `None` and
/// leaves prior progress state untouched.
pub fn parse_percent(line: &str) -> Option<u8> {
    let (prefix, _) = line.split_once("%|")?;
    let digits = prefix.trim();
    // Bare decimal digits only; `str::parse` alone would also take `+5`.
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: u32 = digits.parse().ok()?;
    if value <= 100 {
        Some(value as u8)
    } else {
        None
    }
}
