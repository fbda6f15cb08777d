// Copyright 2026 The Dugout Project
// SPDX-License-Identifier: Apache-2.0

// Tolerant JSON repair for model-generated payloads.
//
// The upstream process emits JSON incrementally and can stop mid-structure,
// mix in typographic punctuation, or drop separators. This module converts
// such text into a parsed value through bounded, targeted textual fixes.
// It only closes structures that are already open; it never fabricates
// content. When no valid parse is reachable the engine reports failure and
// the caller substitutes the canonical fallback payload.

use crate::payload::{self, InsightPayload};
use serde_json::Value;

mod surgery;

use surgery::{apply_fix, truncate_and_close};

/// Upper bound on error-driven repair iterations per input.
pub const MAX_REPAIR_ATTEMPTS: usize = 5;

/// Why the engine could not produce a parsed value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepairError {
    #[error("input is empty or whitespace-only")]
    EmptyInput,

    #[error("no valid parse after {attempts} repair attempts")]
    AttemptsExhausted { attempts: usize },
}

/// Repair possibly malformed JSON text into a parsed value.
///
/// Well-formed input short-circuits: the result is identical to parsing the
/// input directly. Otherwise the text is normalized, balanced, and run
/// through the error-driven fix loop, bounded to [`MAX_REPAIR_ATTEMPTS`]
/// iterations. Each iteration inspects the parse error, applies exactly one
/// fix to the previous iteration's output, and retries; the loop halts the
/// instant a parse succeeds.
pub fn repair_to_value(text: &str) -> Result<Value, RepairError> {
    if text.trim().is_empty() {
        return Err(RepairError::EmptyInput);
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Ok(value);
    }

    let mut current = balance(&normalize(text));
    let mut attempts = 0usize;
    loop {
        let err = match serde_json::from_str(&current) {
            Ok(value) => {
                tracing::debug!(attempts, "repair produced a valid parse");
                return Ok(value);
            }
            Err(e) => e,
        };
        if attempts >= MAX_REPAIR_ATTEMPTS {
            tracing::debug!(attempts, error = %err, "repair attempts exhausted");
            return Err(RepairError::AttemptsExhausted { attempts });
        }
        attempts += 1;
        tracing::debug!(attempt = attempts, error = %err, "applying targeted fix");
        let fixed = apply_fix(&current, &err);
        current = if fixed == current {
            // No textual progress: salvage everything up to the last cleanly
            // closed string value and force-close the rest.
            truncate_and_close(&current)
        } else {
            fixed
        };
    }
}

/// Run the full finalization pipeline over accumulated session text:
/// repair, validate the shape, then convert to the typed payload. Any
/// failure along the way degrades to the canonical fallback payload, so the
/// result is always schema-valid.
pub fn repair_or_fallback(text: &str) -> InsightPayload {
    let value = match repair_to_value(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "payload unrepairable, substituting fallback");
            return InsightPayload::fallback();
        }
    };
    if !payload::is_valid_shape(&value) {
        tracing::warn!("repaired payload failed structural validation, substituting fallback");
        return InsightPayload::fallback();
    }
    match serde_json::from_value(value) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "repaired payload failed typed conversion, substituting fallback");
            InsightPayload::fallback()
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 1: normalization
// ---------------------------------------------------------------------------

/// Normalize raw model output into plain-ASCII-punctuation JSON text:
/// markdown fences stripped, the object substring isolated, typographic
/// punctuation mapped to ASCII, and non-printable control characters
/// removed (standard whitespace preserved).
fn normalize(text: &str) -> String {
    let isolated = isolate_object(strip_code_fences(text));
    let mut out = String::with_capacity(isolated.len());
    for ch in isolated.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' => out.push('\''),
            '\u{201C}' | '\u{201D}' => out.push('"'),
            '\u{2013}' | '\u{2014}' => out.push('-'),
            '\u{2026}' => out.push_str("..."),
            '\u{00A0}' => out.push(' '),
            c if c.is_control() && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }
    out
}

/// Strip a surrounding markdown code fence, with or without a language tag.
fn strip_code_fences(text: &str) -> &str {
    let mut t = text.trim();
    if let Some(rest) = t.strip_prefix("```json") {
        t = rest.trim_start();
    } else if let Some(rest) = t.strip_prefix("```") {
        t = rest.trim_start();
    }
    if let Some(rest) = t.strip_suffix("```") {
        t = rest.trim_end();
    }
    t
}

/// Isolate the substring from the first opening brace to the last closing
/// brace. If the closing brace is missing the tail is kept; the balance
/// stage closes it. Text with no brace at all passes through unchanged.
fn isolate_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(first), Some(last)) if last > first => &text[first..=last],
        (Some(first), _) => &text[first..],
        _ => text,
    }
}

// ---------------------------------------------------------------------------
// Stage 2: structural balancing
// ---------------------------------------------------------------------------

/// Remove trailing commas and append the closers still owed at the end of
/// the text. Scanning is string-aware throughout, so commas and delimiters
/// inside string literals are never touched. When the text ends inside an
/// unterminated string no closers are appended; the error-driven loop owns
/// that case.
fn balance(text: &str) -> String {
    let trimmed = strip_trailing_commas(text);
    let (stack, in_string) = surgery::scan_structure(&trimmed);
    if in_string || stack.is_empty() {
        return trimmed;
    }
    let mut out = trimmed;
    out.push_str(&surgery::closing_suffix(&stack));
    out
}

/// Delete any comma that is followed by only whitespace and then a closing
/// brace or bracket.
fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                out.push(ch);
            }
            ',' => {
                let next = text[i + 1..].trim_start().chars().next();
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(ch);
                }
            }
            c => out.push(c),
        }
    }
    out
}
