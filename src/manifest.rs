//! # Manifest Codec
//!
//! Entry 0 of every archive is the manifest: the filenames of entries 1..N
//! joined with `\n`, no trailing separator, compressed through the block
//! pipeline like any other entry. This module builds and parses those bytes
//! and normalises paths before they are stored.

use crate::error::PsarcError;

/// Normalises one filename for storage in the manifest.
///
/// Backslashes become forward slashes and a leading drive-letter prefix is
/// dropped. With `trim`, only the basename survives. With `absolute`, the
/// name is given exactly one leading `/`; otherwise every leading `/` is
/// removed.
pub fn normalize_name(raw: &str, absolute: bool, trim: bool) -> String {
    let mut name = raw.replace('\\', "/");

    if name.len() >= 2 && name.as_bytes()[1] == b':' && name.as_bytes()[0].is_ascii_alphabetic() {
        name.drain(..2);
    }

    if trim {
        if let Some((_, base)) = name.rsplit_once('/') {
            name = base.to_string();
        }
    }

    if absolute {
        if !name.starts_with('/') {
            name.insert(0, '/');
        }
    } else {
        while name.starts_with('/') {
            name.remove(0);
        }
    }
    name
}

/// Joins already-normalised names into manifest bytes.
pub fn build(names: &[String]) -> Vec<u8> {
    names.join("\n").into_bytes()
}

/// Splits decompressed manifest bytes back into names.
///
/// The archive header fixes how many names must come out; anything else
/// means the manifest did not survive intact.
pub fn parse(bytes: &[u8], expected: usize) -> Result<Vec<String>, PsarcError> {
    if bytes.is_empty() {
        if expected == 0 {
            return Ok(Vec::new());
        }
        return Err(PsarcError::Truncated("manifest"));
    }
    let names: Vec<String> = bytes
        .split(|&b| b == b'\n')
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect();
    if names.len() != expected {
        return Err(PsarcError::Truncated("manifest"));
    }
    Ok(names)
}
