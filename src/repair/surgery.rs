// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Error-driven text surgery.
//
// Each helper applies exactly one targeted fix derived from a parse error's
// kind and position. Fixes operate on the text the parser actually saw, so
// offsets computed from the error's line/column map directly onto it.

/// Scan the text outside string literals, returning the stack of currently
/// open `{`/`[` delimiters and whether the scan ended inside a string.
/// Mismatched closers are ignored rather than popped past their partner.
pub(super) fn scan_structure(text: &str) -> (Vec<char>, bool) {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    for ch in text.chars() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => stack.push(ch),
            '}' => {
                if stack.last() == Some(&'{') {
                    stack.pop();
                }
            }
            ']' => {
                if stack.last() == Some(&'[') {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    (stack, in_string)
}

/// The closers owed for an open-delimiter stack, innermost first.
pub(super) fn closing_suffix(stack: &[char]) -> String {
    stack
        .iter()
        .rev()
        .map(|c| if *c == '{' { '}' } else { ']' })
        .collect()
}

/// Apply exactly one fix for the given parse error.
///
/// Returns the input unchanged when no rule applies; the caller treats that
/// as "no textual progress" and falls back to truncation.
pub(super) fn apply_fix(text: &str, err: &serde_json::Error) -> String {
    let msg = err.to_string();
    let offset = clamp_to_boundary(text, byte_offset(text, err.line(), err.column()));

    if msg.contains("EOF while parsing a string") {
        return close_unterminated_string(text, offset);
    }
    if msg.contains("expected `,` or `}`") || msg.contains("expected `,` or `]`") {
        return fix_missing_separator(text, offset);
    }
    if msg.contains("control character") {
        return delete_control_char(text, offset);
    }
    if err.is_eof() {
        // Text ends mid-structure (outside a string): close what is open.
        let (stack, in_string) = scan_structure(text);
        if in_string {
            return close_unterminated_string(text, text.len());
        }
        return format!("{text}{}", closing_suffix(&stack));
    }
    delete_char_at(text, offset)
}

/// Salvage everything up to the last cleanly closed string value, then
/// force-close the structures still open at that point. Returns a minimal
/// empty object when nothing closed cleanly.
pub(super) fn truncate_and_close(text: &str) -> String {
    let mut in_string = false;
    let mut escape = false;
    let mut closed_ends = Vec::new();
    for (i, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
                closed_ends.push(i + 1);
            }
        } else if ch == '"' {
            in_string = true;
        }
    }

    // A closed string is a value (not a key) when the next non-whitespace
    // character is not a colon. A quote at end-of-input is ambiguous, so it
    // is skipped.
    let cut = closed_ends.into_iter().rev().find(|&end| {
        matches!(text[end..].trim_start().chars().next(), Some(c) if c != ':')
    });

    match cut {
        Some(end) => {
            let prefix = &text[..end];
            let (stack, _) = scan_structure(prefix);
            format!("{prefix}{}", closing_suffix(&stack))
        }
        None => "{}".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Individual fixes
// ---------------------------------------------------------------------------

/// Terminate an open string at the error offset and force-close every
/// structure open at that point, discarding any further content. Applies
/// only when the prefix holds an odd count of unescaped quotes.
fn close_unterminated_string(text: &str, offset: usize) -> String {
    let prefix = &text[..offset];
    let (_, in_string) = scan_structure(prefix);
    if !in_string {
        return text.to_string();
    }
    let mut out = String::with_capacity(prefix.len() + 8);
    out.push_str(prefix);
    out.push('"');
    let (stack, _) = scan_structure(&out);
    out.push_str(&closing_suffix(&stack));
    out
}

/// Handle an "expected `,`" error: insert a comma between a value-closer
/// and a value-opener, delete a stray control character (inserting the
/// comma its removal exposes), or delete a malformed character outright.
fn fix_missing_separator(text: &str, offset: usize) -> String {
    let before = &text[..offset];
    let after = &text[offset..];
    let trimmed = before.trim_end();
    let closes_value = matches!(trimmed.chars().last(), Some('"' | '}' | ']'));

    let Some(next) = after.chars().next() else {
        // Error at end of input: the separator the parser wanted will never
        // arrive, so close the open structures instead.
        let (stack, _) = scan_structure(text);
        return format!("{text}{}", closing_suffix(&stack));
    };

    if closes_value && matches!(next, '"' | '{' | '[') {
        let gap = &before[trimmed.len()..];
        return format!("{trimmed},{gap}{after}");
    }
    if next.is_control() {
        let rest = &after[next.len_utf8()..];
        let opens_next = matches!(rest.trim_start().chars().next(), Some('"' | '{' | '['));
        if closes_value && opens_next {
            return format!("{trimmed},{}", rest.trim_start());
        }
        return format!("{before}{rest}");
    }
    if !matches!(next, ',' | ']' | '}' | '"') && !next.is_whitespace() {
        return format!("{before}{}", &after[next.len_utf8()..]);
    }
    text.to_string()
}

/// Delete the control character at (or immediately before) the offset.
fn delete_control_char(text: &str, offset: usize) -> String {
    for candidate in [offset, offset.saturating_sub(1)] {
        let at = clamp_to_boundary(text, candidate);
        if let Some(ch) = text[at..].chars().next() {
            if ch.is_control() {
                return format!("{}{}", &text[..at], &text[at + ch.len_utf8()..]);
            }
        }
    }
    text.to_string()
}

/// Delete the single character at the offset.
fn delete_char_at(text: &str, offset: usize) -> String {
    let at = clamp_to_boundary(text, offset.min(text.len().saturating_sub(1)));
    match text[at..].chars().next() {
        Some(ch) => format!("{}{}", &text[..at], &text[at + ch.len_utf8()..]),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Offset arithmetic
// ---------------------------------------------------------------------------

/// Convert a parse error's 1-based line/column into a byte offset.
fn byte_offset(text: &str, line: usize, column: usize) -> usize {
    if line == 0 {
        return 0;
    }
    let mut line_start = 0;
    let mut remaining = line - 1;
    for (i, b) in text.bytes().enumerate() {
        if remaining == 0 {
            break;
        }
        if b == b'\n' {
            remaining -= 1;
            line_start = i + 1;
        }
    }
    (line_start + column.saturating_sub(1)).min(text.len())
}

/// Clamp an offset to the nearest char boundary at or below it.
fn clamp_to_boundary(text: &str, mut offset: usize) -> usize {
    offset = offset.min(text.len());
    while offset > 0 && !text.is_char_boundary(offset) {
        offset -= 1;
    }
    offset
}
