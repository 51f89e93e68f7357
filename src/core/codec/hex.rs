//! Hexadecimal rendering and parsing

use super::CodecError;

/// Render bytes as uppercase hex separated by single spaces ("5A 5A 45")
pub fn frame_hex(data: &[u8]) -> String {
    let mut output = String::with_capacity(data.len() * 3);
    for (i, byte) in data.iter().enumerate() {
        if i > 0 {
            output.push(' ');
        }
        output.push_str(&::hex::encode_upper([*byte]));
    }
    output
}

/// Parse hex text, ignoring whitespace, an optional `0x` prefix per token and
/// `:`/`,` separators.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, CodecError> {
    let cleaned: String = text
        .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
        .filter(|t| !t.is_empty())
        .map(|t| {
            t.strip_prefix("0x")
                .or_else(|| t.strip_prefix("0X"))
                .unwrap_or(t)
        })
        .collect();

    if cleaned.is_empty() {
        return Err(CodecError::InvalidFormat("empty hex string".to_string()));
    }

    Ok(::hex::decode(cleaned)?)
}
