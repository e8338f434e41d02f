//! Hex parsing and serde helpers
//!
//! Configuration documents write addresses and byte strings as hex with or
//! without a `0x` prefix, or as plain integers. These helpers accept all
//! three spellings.

use serde::{Deserialize, Deserializer};

/// Strip an optional `0x`/`0X` prefix.
pub fn strip_prefix(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Uppercase hex form without prefix; does not validate the characters.
pub fn normalize(s: &str) -> String {
    strip_prefix(s).to_ascii_uppercase()
}

/// Parse a hex string (with or without `0x`) into bytes. `None` on odd
/// length, empty input, or non-hex characters.
pub fn parse_bytes(s: &str) -> Option<Vec<u8>> {
    let s = strip_prefix(s);
    if s.is_empty() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// Render bytes as uppercase hex with no separators and no prefix.
pub fn to_upper_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02X}", b));
    }
    out
}

fn parse_u16(s: &str) -> Result<u16, String> {
    u16::from_str_radix(strip_prefix(s), 16).map_err(|e| format!("invalid hex '{}': {}", s, e))
}

fn parse_u8(s: &str) -> Result<u8, String> {
    u8::from_str_radix(strip_prefix(s), 16).map_err(|e| format!("invalid hex '{}': {}", s, e))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HexOrInt<T> {
    Hex(String),
    Int(T),
}

/// Deserialize a u16 from `"0x1000"`, `"1000"`, or `4096`.
pub fn u16_from_hex<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match HexOrInt::<u16>::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Hex(s) => parse_u16(&s).map_err(D::Error::custom),
    }
}

/// Deserialize an optional u16 with the same spellings.
pub fn opt_u16_from_hex<'de, D>(deserializer: D) -> Result<Option<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<HexOrInt<u16>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(n)) => Ok(Some(n)),
        Some(HexOrInt::Hex(s)) => parse_u16(&s).map(Some).map_err(D::Error::custom),
    }
}

/// Deserialize a list of u16 addresses with the same spellings.
pub fn u16_vec_from_hex<'de, D>(deserializer: D) -> Result<Vec<u16>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let items = Vec::<HexOrInt<u16>>::deserialize(deserializer)?;
    items
        .into_iter()
        .map(|item| match item {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Hex(s) => parse_u16(&s).map_err(D::Error::custom),
        })
        .collect()
}

/// Deserialize an optional u8 with the same spellings.
pub fn opt_u8_from_hex<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<HexOrInt<u8>>::deserialize(deserializer)? {
        None => Ok(None),
        Some(HexOrInt::Int(n)) => Ok(Some(n)),
        Some(HexOrInt::Hex(s)) => parse_u8(&s).map(Some).map_err(D::Error::custom),
    }
}

/// Deserialize a u8 from `"0x02"`, `"02"`, or `2`.
pub fn u8_from_hex<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match HexOrInt::<u8>::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(n),
        HexOrInt::Hex(s) => parse_u8(&s).map_err(D::Error::custom),
    }
}

/// Deserialize a list of u8 values with the same spellings.
pub fn u8_vec_from_hex<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let items = Vec::<HexOrInt<u8>>::deserialize(deserializer)?;
    items
        .into_iter()
        .map(|item| match item {
            HexOrInt::Int(n) => Ok(n),
            HexOrInt::Hex(s) => parse_u8(&s).map_err(D::Error::custom),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bytes() {
        assert_eq!(parse_bytes("22F190"), Some(vec![0x22, 0xF1, 0x90]));
        assert_eq!(parse_bytes("0x22f190"), Some(vec![0x22, 0xF1, 0x90]));
        assert_eq!(parse_bytes("22F19"), None);
        assert_eq!(parse_bytes(""), None);
        assert_eq!(parse_bytes("ZZ"), None);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("0x22f190"), "22F190");
        assert_eq!(normalize("22F190"), "22F190");
    }

    #[test]
    fn test_to_upper_hex() {
        assert_eq!(to_upper_hex(&[0x62, 0xF1, 0x90]), "62F190");
        assert_eq!(to_upper_hex(&[]), "");
    }

    #[test]
    fn test_u16_from_hex_spellings() {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(deserialize_with = "u16_from_hex")]
            addr: u16,
        }
        let hex: Doc = serde_yaml::from_str("addr: \"0x1000\"").unwrap();
        assert_eq!(hex.addr, 0x1000);
        let bare: Doc = serde_yaml::from_str("addr: \"1000\"").unwrap();
        assert_eq!(bare.addr, 0x1000);
        let int: Doc = serde_yaml::from_str("addr: 4096").unwrap();
        assert_eq!(int.addr, 4096);
    }
}
