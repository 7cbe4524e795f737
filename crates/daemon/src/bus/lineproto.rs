// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-protocol parser for the event stream.
//!
//! One event per line:
//!
//! ```text
//! job,function=start_job event="<escaped JSON>" 1725600000000000000
//! nodestate event="<escaped JSON>"
//! ```
//!
//! A measurement with comma-separated `key=value` tags, a space, one or
//! more `key="value"` fields (strings escape `\"` and `\\`), and an
//! optional trailing nanosecond timestamp.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LineError {
    #[error("empty line")]
    Empty,

    #[error("missing fields section")]
    MissingFields,

    #[error("malformed tag: {0}")]
    BadTag(String),

    #[error("malformed field: {0}")]
    BadField(String),

    #[error("unterminated string value")]
    UnterminatedString,

    #[error("malformed timestamp: {0}")]
    BadTimestamp(String),
}

/// One parsed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusEvent {
    pub measurement: String,
    pub tags: Vec<(String, String)>,
    pub fields: Vec<(String, String)>,
    pub timestamp: Option<i64>,
}

impl BusEvent {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

pub fn parse_line(line: &str) -> Result<BusEvent, LineError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(LineError::Empty);
    }

    let (head, rest) = line.split_once(' ').ok_or(LineError::MissingFields)?;
    let mut sections = head.split(',');
    let measurement = sections.next().unwrap_or_default().to_string();
    if measurement.is_empty() {
        return Err(LineError::Empty);
    }
    let mut tags = Vec::new();
    for tag in sections {
        let (key, value) = tag.split_once('=').ok_or_else(|| LineError::BadTag(tag.into()))?;
        tags.push((key.to_string(), value.to_string()));
    }

    let (fields, timestamp_raw) = parse_fields(rest.trim_start())?;
    if fields.is_empty() {
        return Err(LineError::MissingFields);
    }
    let timestamp = match timestamp_raw {
        Some(raw) => {
            Some(raw.parse::<i64>().map_err(|_| LineError::BadTimestamp(raw.to_string()))?)
        }
        None => None,
    };

    Ok(BusEvent { measurement, tags, fields, timestamp })
}

/// Parse the field section; returns the fields and the remaining
/// timestamp token, if any.
fn parse_fields(input: &str) -> Result<(Vec<(String, String)>, Option<&str>), LineError> {
    let mut fields = Vec::new();
    let mut chars = input.char_indices().peekable();
    let mut key_start = 0;

    loop {
        // Key runs to '='
        let eq = loop {
            match chars.next() {
                Some((i, '=')) => break i,
                Some((_, ' ')) | None => {
                    return Err(LineError::BadField(input[key_start..].trim().to_string()))
                }
                Some(_) => {}
            }
        };
        let key = &input[key_start..eq];

        // Value: quoted string or bare token
        let value = match chars.peek() {
            Some((_, '"')) => {
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => match chars.next() {
                            Some((_, escaped)) => value.push(escaped),
                            None => return Err(LineError::UnterminatedString),
                        },
                        '"' => {
                            closed = true;
                            break;
                        }
                        other => value.push(other),
                    }
                }
                if !closed {
                    return Err(LineError::UnterminatedString);
                }
                value
            }
            _ => {
                let start = eq + 1;
                let mut end = input.len();
                for (i, c) in chars.by_ref() {
                    if c == ',' || c == ' ' {
                        end = i;
                        break;
                    }
                }
                let value = input[start..end].to_string();
                if value.is_empty() {
                    return Err(LineError::BadField(key.to_string()));
                }
                fields.push((key.to_string(), value));
                // The separator was already consumed; decide what follows
                if end == input.len() {
                    return Ok((fields, None));
                }
                let sep = &input[end..=end];
                if sep == " " {
                    let rest = input[end + 1..].trim();
                    return Ok((fields, if rest.is_empty() { None } else { Some(rest) }));
                }
                key_start = end + 1;
                continue;
            }
        };
        fields.push((key.to_string(), value));

        // After a quoted value: ',' continues, ' ' starts the timestamp,
        // end of input finishes.
        match chars.next() {
            None => return Ok((fields, None)),
            Some((_, ',')) => {
                key_start = match chars.peek() {
                    Some((i, _)) => *i,
                    None => return Err(LineError::MissingFields),
                };
            }
            Some((i, ' ')) => {
                let rest = input[i + 1..].trim();
                return Ok((fields, if rest.is_empty() { None } else { Some(rest) }));
            }
            Some((_, other)) => return Err(LineError::BadField(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "lineproto_tests.rs"]
mod tests;
