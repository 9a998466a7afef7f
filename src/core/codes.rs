// Redemption code generation

use rand::distributions::{Distribution, Uniform};
use rand::Rng;

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Random code of `len` characters drawn from `A-Z0-9`.
pub fn generate_code(len: usize) -> String {
    generate_code_with(&mut rand::thread_rng(), len)
}

pub fn generate_code_with<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    let dist = Uniform::from(0..CODE_ALPHABET.len());
    (0..len)
        .map(|_| CODE_ALPHABET[dist.sample(rng)] as char)
        .collect()
}
