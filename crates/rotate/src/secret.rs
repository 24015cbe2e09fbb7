//! Secret generation
//!
//! Produces random credentials safe to embed in shell command lines and
//! in the site's config file. The alphabet deliberately excludes every
//! character the downstream quoting or the `'password' => '...'` field
//! pattern could trip on: quotes, backslash, pipe, redirection, glob,
//! braces, `$`, backtick, and `&`/`;`.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::RotateError;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const DIGITS: &[u8] = b"0123456789";
/// Punctuation that survives single-quoted shell tokens, the SQL
/// statement's own quoting, and the env file replacement pattern.
const PUNCT: &[u8] = b"!@#%^+=_-.,:";

/// Shortest length that can still hold one character of each class.
pub const MIN_LENGTH: usize = 4;

/// A freshly generated credential value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Generate a secret of the requested length containing at least one
/// uppercase letter, one lowercase letter, one digit, and one symbol
/// from the safe punctuation set. The guaranteed picks are shuffled into
/// the rest so class membership cannot be inferred from position.
pub fn generate(length: usize) -> Result<Secret, RotateError> {
    if length < MIN_LENGTH {
        return Err(RotateError::InvalidArgument(format!(
            "secret length must be at least {}, got {}",
            MIN_LENGTH, length
        )));
    }

    let mut rng = rand::thread_rng();
    let mut chars: Vec<char> = Vec::with_capacity(length);

    // One guaranteed pick per class, the remainder from the union.
    for class in [UPPER, LOWER, DIGITS, PUNCT] {
        chars.push(class[rng.gen_range(0..class.len())] as char);
    }

    let all: Vec<u8> = [UPPER, LOWER, DIGITS, PUNCT].concat();
    for _ in MIN_LENGTH..length {
        chars.push(all[rng.gen_range(0..all.len())] as char);
    }

    chars.shuffle(&mut rng);
    Ok(Secret(chars.into_iter().collect()))
}
