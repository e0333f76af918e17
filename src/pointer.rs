//! JSON pointer targets
//!
//! Resolves RFC 6901 pointers from patch operations into the shape the
//! overlay understands: a record inside a section, or a top-level value.

use crate::error::PatchError;
use crate::types::is_record_section;

/// Where a patch operation lands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchTarget {
    /// `/<section>/<key>[/<field>...]` inside `packages`, `packages.conda` or `signatures`
    Record {
        section: String,
        key: String,
        field: Vec<String>,
    },
    /// `/<name>[/<field>...]` for any other top-level key
    Top { name: String, field: Vec<String> },
}

impl PatchTarget {
    pub fn parse(pointer: &str) -> Result<Self, PatchError> {
        let tokens = split_pointer(pointer)?;
        let mut tokens = tokens.into_iter();
        let top = match tokens.next() {
            Some(top) => top,
            None => return Err(PatchError::pointer(pointer, "targets the whole document")),
        };

        if is_record_section(&top) {
            let key = tokens
                .next()
                .ok_or_else(|| PatchError::pointer(pointer, "targets a whole record section"))?;
            if key.is_empty() {
                return Err(PatchError::pointer(pointer, "empty package key"));
            }
            Ok(PatchTarget::Record {
                section: top,
                key,
                field: tokens.collect(),
            })
        } else {
            Ok(PatchTarget::Top {
                name: top,
                field: tokens.collect(),
            })
        }
    }

    /// Field path below the record or top-level value; empty for whole-value targets
    pub fn field(&self) -> &[String] {
        match self {
            PatchTarget::Record { field, .. } | PatchTarget::Top { field, .. } => field,
        }
    }
}

/// Split a pointer into unescaped reference tokens.
pub fn split_pointer(pointer: &str) -> Result<Vec<String>, PatchError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let rest = pointer
        .strip_prefix('/')
        .ok_or_else(|| PatchError::pointer(pointer, "must start with '/'"))?;
    rest.split('/')
        .map(|token| unescape(token).ok_or_else(|| PatchError::pointer(pointer, "invalid '~' escape")))
        .collect()
}

fn unescape(token: &str) -> Option<String> {
    if !token.contains('~') {
        return Some(token.to_string());
    }
    let mut out = String::with_capacity(token.len());
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c == '~' {
            match chars.next() {
                Some('0') => out.push('~'),
                Some('1') => out.push('/'),
                _ => return None,
            }
        } else {
            out.push(c);
        }
    }
    Some(out)
}
