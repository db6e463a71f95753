use thiserror::Error;

/// The store path-naming alphabet. Omits `e`, `o`, `t` and `u` to avoid
/// accidental words in path names.
const BASE32_CHARS: [u8; 32] = *b"0123456789abcdfghijklmnpqrsvwxyz";

const BASE32_CHARS_REVERSE: [u8; 256] = {
    let mut ret = [0xFFu8; 256];
    let mut idx = 0u8;
    while idx < 32 {
        ret[BASE32_CHARS[idx as usize] as usize] = idx;
        idx += 1;
    }
    ret
};

#[derive(Error, Debug, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
    #[error("invalid base-32 symbol at position {0}")]
    Symbol(usize),
    #[error("non-zero trailing bits in base-32 input")]
    Trailing,
    #[error("invalid base-32 input length {0}")]
    Length(usize),
}

pub const fn encode_len(len: usize) -> usize {
    (8 * len).div_ceil(5)
}

pub const fn decode_len(len: usize) -> usize {
    5 * len / 8
}

/// Encodes `input` into the reversed-order base-32 form used for store path
/// hashes. The character at index 0 of the output holds the highest bits.
pub fn encode(input: &[u8]) -> String {
    let mut out = Vec::with_capacity(encode_len(input.len()));
    for n in (0..encode_len(input.len())).rev() {
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        let lo = input[i] >> j;
        // no carry when the group is byte-aligned; a shift by 8 would overflow
        let hi = if j > 0 && i + 1 < input.len() {
            input[i + 1] << (8 - j)
        } else {
            0
        };
        out.push(BASE32_CHARS[((lo | hi) & 0x1f) as usize]);
    }
    // The alphabet is ASCII, so this is always valid UTF-8.
    String::from_utf8(out).unwrap()
}

/// Decodes reversed-order base-32 `input`. Fails on symbols outside the
/// alphabet, on lengths that encode no whole byte count and on non-zero
/// bits past the end of the decoded buffer.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if encode_len(decode_len(input.len())) != input.len() {
        return Err(DecodeError::Length(input.len()));
    }
    let mut out = vec![0u8; decode_len(input.len())];
    for (n, ch) in input.iter().rev().enumerate() {
        let digit = BASE32_CHARS_REVERSE[*ch as usize];
        if digit == 0xFF {
            return Err(DecodeError::Symbol(input.len() - n - 1));
        }
        let b = n * 5;
        let i = b / 8;
        let j = b % 8;
        out[i] |= digit << j;
        let carry = (digit as u16) >> (8 - j);
        if i + 1 < out.len() {
            out[i + 1] |= carry as u8;
        } else if carry != 0 {
            return Err(DecodeError::Trailing);
        }
    }
    Ok(out)
}
