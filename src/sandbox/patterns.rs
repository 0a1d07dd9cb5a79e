//! Cost limits for Lua pattern matching.
//!
//! `string.find`, `match`, `gmatch` and `gsub` run as C code, so the
//! instruction hook never sees them. A pattern with several backtracking
//! quantifiers over a long subject costs roughly `len ^ quantifiers` steps;
//! such calls are refused before they start.

/// Largest subject any pattern function accepts.
pub const MAX_SUBJECT_BYTES: usize = 1024 * 1024;

/// Worst-case backtracking steps allowed for one call.
pub const MAX_PATTERN_STEPS: f64 = 1.0e8;

/// Refuse pattern calls whose worst case is out of budget.
pub fn check(subject: &[u8], pattern: &[u8]) -> Result<(), String> {
    if subject.len() > MAX_SUBJECT_BYTES {
        return Err(format!(
            "subject of {} bytes exceeds the {} byte limit",
            subject.len(),
            MAX_SUBJECT_BYTES
        ));
    }

    // an unanchored pattern is retried at every subject position
    let anchored = pattern.first() == Some(&b'^');
    let exponent = backtracking_quantifiers(pattern) + u32::from(!anchored);
    if exponent <= 1 {
        return Ok(());
    }

    let steps = (subject.len() as f64 + 1.0).powi(exponent as i32);
    if steps > MAX_PATTERN_STEPS {
        return Err(format!(
            "pattern too expensive for a {}-byte subject",
            subject.len()
        ));
    }
    Ok(())
}

/// Count `*`, `+` and `-` quantifiers.
///
/// `?` matches at most once and `%b` / `%f` items take no quantifier.
pub fn backtracking_quantifiers(pattern: &[u8]) -> u32 {
    let mut count = 0;
    let mut i = usize::from(pattern.first() == Some(&b'^'));

    while i < pattern.len() {
        let quantifiable = match pattern[i] {
            b'(' | b')' => {
                i += 1;
                false
            }
            b'%' => match pattern.get(i + 1) {
                Some(b'b') => {
                    i += 4;
                    false
                }
                Some(b'f') => {
                    i = skip_set(pattern, i + 2);
                    false
                }
                Some(_) => {
                    i += 2;
                    true
                }
                None => {
                    i += 1;
                    false
                }
            },
            b'[' => {
                i = skip_set(pattern, i);
                true
            }
            _ => {
                i += 1;
                true
            }
        };

        if quantifiable {
            match pattern.get(i) {
                Some(b'*' | b'+' | b'-') => {
                    count += 1;
                    i += 1;
                }
                Some(b'?') => i += 1,
                _ => {}
            }
        }
    }
    count
}

/// Index just past the `[...]` set starting at `start`.
fn skip_set(pattern: &[u8], start: usize) -> usize {
    let mut i = start + 1;
    if pattern.get(i) == Some(&b'^') {
        i += 1;
    }
    // a leading `]` is literal
    if pattern.get(i) == Some(&b']') {
        i += 1;
    }
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b']' => return i + 1,
            _ => i += 1,
        }
    }
    pattern.len()
}
