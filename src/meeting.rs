//! Meeting code generation
//!
//! The meeting code is a fixed-length lowercase-alphanumeric string shared
//! alongside the negotiation codes as a human-friendly label. It carries no
//! uniqueness or cryptographic guarantee and is never validated against
//! anything; it exists purely so both parties can name the call they are
//! setting up.

use rand::Rng;

const MEETING_CODE_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generate a random meeting code of the given length
pub fn generate_meeting_code(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..MEETING_CODE_CHARS.len());
            MEETING_CODE_CHARS[idx] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meeting_code_length() {
        assert_eq!(generate_meeting_code(10).len(), 10);
        assert_eq!(generate_meeting_code(4).len(), 4);
        assert_eq!(generate_meeting_code(0).len(), 0);
    }

    #[test]
    fn test_meeting_code_charset() {
        let code = generate_meeting_code(64);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
