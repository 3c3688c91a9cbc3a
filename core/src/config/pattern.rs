//! Helpers for the pattern and format-string options.
//!
//! Site configurations written for the webmail plugin carry delimited
//! patterns such as `/\|.*vacation/i` and printf-style format strings with a
//! single `%s`. Both are accepted here alongside bare regular expressions.

use regex::Regex;

use crate::errors::CoreError;

const DELIMITERS: [char; 7] = ['/', '#', '~', '!', '@', '%', ';'];

/// Compile a configured pattern.
///
/// A pattern that starts with one of the usual PCRE delimiters and contains
/// that delimiter again is treated as `<d>body<d>flags`; anything else is a
/// bare regular expression.
pub fn compile_pattern(raw: &str) -> Result<Regex, CoreError> {
    let source = translate_delimited(raw)?;
    Regex::new(&source).map_err(|e| CoreError::Pattern {
        pattern: raw.to_string(),
        source: e,
    })
}

fn translate_delimited(raw: &str) -> Result<String, CoreError> {
    let mut chars = raw.chars();
    let delim = match chars.next() {
        Some(c) if DELIMITERS.contains(&c) => c,
        _ => return Ok(raw.to_string()),
    };
    let end = match raw.rfind(delim) {
        Some(i) if i > 0 => i,
        _ => return Ok(raw.to_string()),
    };
    let body = &raw[1..end];
    let flags = &raw[end + 1..];

    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' | 'U' => inline.push(flag),
            // Rust regexes are always Unicode-aware.
            'u' => {}
            other => {
                return Err(CoreError::Config(format!(
                    "unsupported pattern flag '{other}' in {raw:?}"
                )))
            }
        }
    }

    if inline.is_empty() {
        Ok(body.to_string())
    } else {
        Ok(format!("(?{inline}){body}"))
    }
}

/// Substitute `arg` for the first `%s` in `template`; `%%` is a literal `%`.
pub fn format_printf(template: &str, arg: &str) -> String {
    let mut out = String::with_capacity(template.len() + arg.len());
    let mut substituted = false;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
                out.push('%');
            }
            Some('s') if !substituted => {
                chars.next();
                out.push_str(arg);
                substituted = true;
            }
            _ => out.push('%'),
        }
    }
    out
}
