//! Decoding of C string-literal bodies into the bytes they denote.

use thiserror::Error;

/// An escape sequence that has no byte value. Decoding keeps the raw spelling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodingError {
    #[error("unknown escape sequence `{0}`")]
    UnknownEscape(String),
    #[error("escape sequence `{0}` is out of range")]
    OutOfRange(String),
}

/// Bytes of a literal body (text between the quotes) plus any escapes that
/// had to be kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Decoded {
    pub bytes: Vec<u8>,
    pub errors: Vec<EncodingError>,
}

impl Decoded {
    pub fn lossy(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub fn decode_body(body: &str) -> Decoded {
    let bytes = body.as_bytes();
    let mut out = Decoded::default();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.bytes.push(b);
            i += 1;
            continue;
        }
        let Some(&next) = bytes.get(i + 1) else {
            out.bytes.push(b'\\');
            out.errors.push(EncodingError::UnknownEscape("\\".into()));
            break;
        };
        let start = i;
        i += 2;
        match next {
            b'\n' => {}
            b'\r' if bytes.get(i) == Some(&b'\n') => i += 1,
            b'n' => out.bytes.push(b'\n'),
            b't' => out.bytes.push(b'\t'),
            b'r' => out.bytes.push(b'\r'),
            b'a' => out.bytes.push(0x07),
            b'b' => out.bytes.push(0x08),
            b'f' => out.bytes.push(0x0c),
            b'v' => out.bytes.push(0x0b),
            b'e' | b'E' => out.bytes.push(0x1b),
            b'\\' | b'\'' | b'"' | b'?' => out.bytes.push(next),
            b'0'..=b'7' => {
                let mut value = u32::from(next - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match bytes.get(i) {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            i += 1;
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                push_value(&mut out, value, &body[start..i]);
            }
            b'x' => {
                let digits_start = i;
                while bytes.get(i).is_some_and(u8::is_ascii_hexdigit) {
                    i += 1;
                }
                let raw = &body[start..i];
                if i == digits_start {
                    keep_raw(&mut out, raw, EncodingError::UnknownEscape(raw.into()));
                } else {
                    match u32::from_str_radix(&body[digits_start..i], 16) {
                        Ok(value) => push_value(&mut out, value, raw),
                        Err(_) => keep_raw(&mut out, raw, EncodingError::OutOfRange(raw.into())),
                    }
                }
            }
            b'u' | b'U' => {
                let width = if next == b'u' { 4 } else { 8 };
                let digits = body.get(i..i + width).filter(|d| d.bytes().all(|c| c.is_ascii_hexdigit()));
                match digits.and_then(|d| u32::from_str_radix(d, 16).ok()).and_then(char::from_u32) {
                    Some(ch) => {
                        i += width;
                        let mut buf = [0u8; 4];
                        out.bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                    }
                    None => {
                        let raw = &body[start..i];
                        keep_raw(&mut out, raw, EncodingError::OutOfRange(raw.into()));
                    }
                }
            }
            _ => {
                // Unknown escape: keep the backslash and the whole next character.
                let ch_len = body[start + 1..].chars().next().map(char::len_utf8).unwrap_or(1);
                i = start + 1 + ch_len;
                let raw = &body[start..i];
                keep_raw(&mut out, raw, EncodingError::UnknownEscape(raw.into()));
            }
        }
    }
    out
}

fn push_value(out: &mut Decoded, value: u32, raw: &str) {
    match u8::try_from(value) {
        Ok(byte) => out.bytes.push(byte),
        Err(_) => keep_raw(out, raw, EncodingError::OutOfRange(raw.into())),
    }
}

fn keep_raw(out: &mut Decoded, raw: &str, err: EncodingError) {
    out.bytes.extend_from_slice(raw.as_bytes());
    out.errors.push(err);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_octal_hex_and_universal_escapes() {
        let decoded = decode_body(r"a\n\t\x41\101\\é\?");
        assert_eq!(decoded.bytes, b"a\n\tAA\\\xc3\xa9?".to_vec());
        assert!(!decoded.lossy());
    }

    #[test]
    fn splices_vanish() {
        assert_eq!(decode_body("ab\\\ncd").bytes, b"abcd".to_vec());
        assert_eq!(decode_body("ab\\\r\ncd").bytes, b"abcd".to_vec());
    }

    #[test]
    fn unknown_and_out_of_range_escapes_are_kept_raw() {
        let decoded = decode_body(r"\q\x1FF\777");
        assert_eq!(decoded.bytes, br"\q\x1FF\777".to_vec());
        assert_eq!(decoded.errors.len(), 3);
    }

    #[test]
    fn octal_zero_yields_nul() {
        assert_eq!(decode_body(r"a\0b").bytes, vec![b'a', 0, b'b']);
    }
}
