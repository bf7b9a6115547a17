//! Placeholder scanner for `{NAME}` / `{NAME:argument}` syntax
//!
//! Arguments may contain balanced braces, so `{BASE64:{INPUT}}` is one
//! occurrence whose argument holds a nested occurrence.

use tether_domain::Placeholder;

/// Returns true if `byte` can start a placeholder name.
const fn is_name_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_'
}

/// Returns true if `byte` can continue a placeholder name.
const fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// A top-level occurrence and where its argument sits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Occurrence {
    pub start: usize,
    pub end: usize,
    pub name: String,
    /// Byte range of the argument within the template.
    pub argument: Option<(usize, usize)>,
}

/// Finds the outermost placeholder occurrences in `input`.
pub(crate) fn scan_top_level(input: &str) -> Vec<Occurrence> {
    let bytes = input.as_bytes();
    let mut found = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] == b'{' {
            if let Some(occurrence) = match_at(bytes, index) {
                index = occurrence.end;
                found.push(occurrence);
                continue;
            }
        }
        index += 1;
    }

    found
}

/// Tries to match one occurrence starting at the `{` at `start`.
fn match_at(bytes: &[u8], start: usize) -> Option<Occurrence> {
    let name_start = start + 1;
    if !bytes.get(name_start).copied().is_some_and(is_name_start) {
        return None;
    }
    let mut cursor = name_start;
    while bytes.get(cursor).copied().is_some_and(is_name_char) {
        cursor += 1;
    }
    // Only ASCII bytes were consumed, so these are char boundaries.
    let name = String::from_utf8_lossy(&bytes[name_start..cursor]).into_owned();

    match bytes.get(cursor)? {
        b'}' => Some(Occurrence {
            start,
            end: cursor + 1,
            name,
            argument: None,
        }),
        b':' => {
            let arg_start = cursor + 1;
            let mut depth = 0_usize;
            let mut pos = arg_start;
            while let Some(&byte) = bytes.get(pos) {
                match byte {
                    b'{' => depth += 1,
                    b'}' if depth == 0 => {
                        return Some(Occurrence {
                            start,
                            end: pos + 1,
                            name,
                            argument: Some((arg_start, pos)),
                        });
                    }
                    b'}' => depth -= 1,
                    _ => {}
                }
                pos += 1;
            }
            None
        }
        _ => None,
    }
}

/// Lists every placeholder occurrence in `template`, nested ones included,
/// in order of appearance. Nothing is resolved.
#[must_use]
pub fn extract_placeholders(template: &str) -> Vec<Placeholder> {
    let mut out = Vec::new();
    collect(template, 0, &mut out);
    out
}

fn collect(input: &str, offset: usize, out: &mut Vec<Placeholder>) {
    for occurrence in scan_top_level(input) {
        let argument = occurrence
            .argument
            .map(|(from, to)| input[from..to].to_string());
        out.push(Placeholder::new(
            occurrence.name,
            argument,
            offset + occurrence.start..offset + occurrence.end,
            &input[occurrence.start..occurrence.end],
        ));
        if let Some((from, to)) = occurrence.argument {
            collect(&input[from..to], offset + from, out);
        }
    }
}

/// Returns true if the template contains at least one placeholder.
#[must_use]
pub fn has_placeholders(template: &str) -> bool {
    !scan_top_level(template).is_empty()
}
