// Placeholder parsing for mogrify-style parameter binding
use crate::error::{Result, TransferError};

/// A piece of a query template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment<'a> {
    /// SQL text copied as-is
    Text(&'a str),
    /// A `%(name)s` placeholder
    Param(&'a str),
}

/// Split a query into text and `%(name)s` placeholders.
///
/// `%%` yields a literal `%`. Positional `%s` placeholders and any other
/// `%` sequence are rejected, since parameters are always named.
pub fn parse_placeholders(sql: &str) -> Result<Vec<Segment<'_>>> {
    let mut segments = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;
    let bytes = sql.as_bytes();

    while pos < bytes.len() {
        if bytes[pos] != b'%' {
            pos += 1;
            continue;
        }

        if text_start < pos {
            segments.push(Segment::Text(&sql[text_start..pos]));
        }

        match bytes.get(pos + 1) {
            Some(b'%') => {
                segments.push(Segment::Text("%"));
                pos += 2;
            }
            Some(b'(') => {
                let name_start = pos + 2;
                let close = sql[name_start..]
                    .find(')')
                    .map(|offset| name_start + offset)
                    .ok_or_else(|| {
                        TransferError::configuration(format!(
                            "unterminated placeholder at byte {} of query",
                            pos
                        ))
                    })?;
                if bytes.get(close + 1) != Some(&b's') {
                    return Err(TransferError::configuration(format!(
                        "placeholder '{}' must end with 's'",
                        &sql[pos..(close + 1).min(sql.len())]
                    )));
                }
                let name = &sql[name_start..close];
                if name.is_empty() {
                    return Err(TransferError::configuration("placeholder name must not be empty"));
                }
                segments.push(Segment::Param(name));
                pos = close + 2;
            }
            Some(b's') => {
                return Err(TransferError::configuration(
                    "positional %s placeholders are not supported, use %(name)s",
                ));
            }
            Some(_) => {
                return Err(TransferError::configuration(format!(
                    "unsupported format sequence at byte {} of query, write %% for a literal percent sign",
                    pos
                )));
            }
            None => {
                return Err(TransferError::configuration("query ends with an incomplete format sequence"));
            }
        }
        text_start = pos;
    }

    if text_start < bytes.len() {
        segments.push(Segment::Text(&sql[text_start..]));
    }

    Ok(segments)
}
