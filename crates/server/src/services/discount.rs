//! Discount codes handed out by reward emails.

use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_LENGTH: usize = 12;

/// Generate a 12-character code from `A-Z0-9`.
#[must_use]
pub fn generate_discount_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .filter_map(|_| {
            CODE_ALPHABET
                .get(rng.random_range(0..CODE_ALPHABET.len()))
                .map(|&b| char::from(b))
        })
        .collect()
}
