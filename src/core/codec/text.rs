//! Escape-sequence handling for text payloads

/// Parse a payload string with escape sequences into raw bytes.
///
/// Handles `\xNN`, `\n`, `\r`, `\t`, `\\` and `\0`. Unknown or truncated
/// escapes keep the backslash literally.
pub fn parse_escapes(s: &str) -> Vec<u8> {
    let bytes = s.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'\\' || i + 1 >= bytes.len() {
            result.push(bytes[i]);
            i += 1;
            continue;
        }

        match bytes[i + 1] {
            b'x' | b'X' => {
                let value = bytes
                    .get(i + 2..i + 4)
                    .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|h| std::str::from_utf8(h).ok())
                    .and_then(|h| u8::from_str_radix(h, 16).ok());
                match value {
                    Some(v) => {
                        result.push(v);
                        i += 4;
                    }
                    None => {
                        result.push(b'\\');
                        i += 1;
                    }
                }
            }
            b'n' => {
                result.push(b'\n');
                i += 2;
            }
            b'r' => {
                result.push(b'\r');
                i += 2;
            }
            b't' => {
                result.push(b'\t');
                i += 2;
            }
            b'\\' => {
                result.push(b'\\');
                i += 2;
            }
            b'0' => {
                result.push(0);
                i += 2;
            }
            _ => {
                result.push(b'\\');
                i += 1;
            }
        }
    }

    result
}

/// Render bytes for a log line, showing control characters as escapes
pub fn escape_display(data: &[u8]) -> String {
    let mut output = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'\r' => output.push_str("\\r"),
            b'\n' => output.push_str("\\n"),
            b'\t' => output.push_str("\\t"),
            b'\\' => output.push_str("\\\\"),
            0x20..=0x7E => output.push(byte as char),
            _ => output.push_str(&format!("\\x{:02X}", byte)),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_payload() {
        assert_eq!(parse_escapes("8 18 13 \\r\\n"), b"8 18 13 \r\n".to_vec());
    }

    #[test]
    fn test_hex_and_literal_escapes() {
        assert_eq!(parse_escapes("\\x41\\x0d"), vec![0x41, 0x0D]);
        assert_eq!(parse_escapes("a\\\\b"), b"a\\b".to_vec());
        assert_eq!(parse_escapes("\\0"), vec![0]);
        assert_eq!(parse_escapes("\\q"), b"\\q".to_vec());
        assert_eq!(parse_escapes("\\xZZ"), b"\\xZZ".to_vec());
        assert_eq!(parse_escapes("end\\"), b"end\\".to_vec());
    }

    #[test]
    fn test_signed_hex_escape_is_literal() {
        assert_eq!(parse_escapes("\\x+F"), b"\\x+F".to_vec());
        assert_eq!(parse_escapes("\\x-1"), b"\\x-1".to_vec());
    }

    #[test]
    fn test_escape_display() {
        assert_eq!(escape_display(b"8 18 13 \r\n"), "8 18 13 \\r\\n");
        assert_eq!(escape_display(&[0x01]), "\\x01");
    }
}
