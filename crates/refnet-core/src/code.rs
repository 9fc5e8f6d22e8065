//! Referral code generation.
//!
//! Codes are 8 characters drawn from a 32-symbol alphabet that excludes the
//! visually ambiguous glyphs 0, 1, I and O. Uniqueness is enforced by the
//! store; the directory retries generation on collision up to
//! [`MAX_CODE_ATTEMPTS`] times.

use rand::Rng;

/// 32 symbols, no 0/1/I/O.
pub const CODE_ALPHABET: &[u8; 32] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZ";

/// Length of every referral code.
pub const CODE_LEN: usize = 8;

/// Collision-retry budget for code generation.
pub const MAX_CODE_ATTEMPTS: u32 = 10;

/// Draw one candidate code. The caller owns the uniqueness check.
pub fn generate_candidate() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Whether `code` is syntactically a referral code this engine could have
/// issued.
pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LEN && code.bytes().all(|b| CODE_ALPHABET.contains(&b))
}
