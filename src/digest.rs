//! Content digest handling for CDX rows.
//!
//! The CDX index's `digest` field is a Base32-encoded SHA-1 hash of the
//! captured content. This module computes and validates that encoding.

use data_encoding::BASE32;
use sha1::{Digest, Sha1};
use std::io::{BufWriter, Error, Read};

pub fn is_valid_digest(input: &str) -> bool {
    input.len() == 32
        && input
            .chars()
            .all(|c| ('2'..='7').contains(&c) || ('A'..='Z').contains(&c))
}

/// Decode a Base32 string into the SHA-1 bytes, returning `None` if the
/// input is not a valid Base32-encoded SHA-1 hash.
pub fn string_to_bytes(input: &str) -> Option<[u8; 20]> {
    if input.len() == 32 {
        let mut output = [0; 20];
        let count = BASE32.decode_mut(input.as_bytes(), &mut output).ok()?;

        if count == 20 {
            Some(output)
        } else {
            None
        }
    } else {
        None
    }
}

/// Encode a SHA-1 hash into a 32-character Base32 string.
pub fn bytes_to_string(bytes: &[u8; 20]) -> String {
    BASE32.encode(bytes)
}

/// Compute the SHA-1 hash for bytes read from a source and encode it as a
/// Base32 string, in the same form the CDX index's `digest` field uses.
pub fn compute_digest<R: Read>(input: &mut R) -> Result<String, Error> {
    let sha1 = Sha1::new();

    let mut buffered = BufWriter::new(sha1);
    std::io::copy(input, &mut buffered)?;

    let result = buffered.into_inner()?.finalize();

    let mut output = String::new();
    BASE32.encode_append(&result, &mut output);

    Ok(output)
}
