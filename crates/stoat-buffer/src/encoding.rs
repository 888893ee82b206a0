//! String encodings supported by buffer conversions.

use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE_NO_PAD};

use crate::error::BufferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    Ascii,
    #[default]
    Utf8,
    Utf16Le,
    Ucs2,
    Base64,
    Base64Url,
    Latin1,
    Binary,
    Hex,
}

impl StringEncoding {
    pub fn name(&self) -> &'static str {
        match self {
            StringEncoding::Ascii => "ascii",
            StringEncoding::Utf8 => "utf8",
            StringEncoding::Utf16Le => "utf16le",
            StringEncoding::Ucs2 => "ucs2",
            StringEncoding::Base64 => "base64",
            StringEncoding::Base64Url => "base64url",
            StringEncoding::Latin1 => "latin1",
            StringEncoding::Binary => "binary",
            StringEncoding::Hex => "hex",
        }
    }

    /// Render bytes as a string in this encoding.
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            // High bit is masked off, matching historical behavior.
            StringEncoding::Ascii => bytes.iter().map(|b| (b & 0x7f) as char).collect(),
            StringEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            StringEncoding::Utf16Le | StringEncoding::Ucs2 => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .collect();
                String::from_utf16_lossy(&units)
            }
            StringEncoding::Base64 => STANDARD.encode(bytes),
            StringEncoding::Base64Url => URL_SAFE_NO_PAD.encode(bytes),
            StringEncoding::Latin1 | StringEncoding::Binary => {
                bytes.iter().map(|&b| b as char).collect()
            }
            StringEncoding::Hex => {
                let mut out = String::with_capacity(bytes.len() * 2);
                for b in bytes {
                    out.push(char::from_digit(u32::from(b >> 4), 16).unwrap_or('0'));
                    out.push(char::from_digit(u32::from(b & 0xf), 16).unwrap_or('0'));
                }
                out
            }
        }
    }

    /// Parse a string in this encoding into bytes.
    pub fn decode(&self, input: &str) -> Result<Vec<u8>, BufferError> {
        match self {
            StringEncoding::Ascii | StringEncoding::Latin1 | StringEncoding::Binary => {
                Ok(input.chars().map(|c| c as u32 as u8).collect())
            }
            StringEncoding::Utf8 => Ok(input.as_bytes().to_vec()),
            StringEncoding::Utf16Le | StringEncoding::Ucs2 => {
                let mut out = Vec::with_capacity(input.len() * 2);
                for unit in input.encode_utf16() {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(out)
            }
            StringEncoding::Base64 => {
                let trimmed: String = input.chars().filter(|c| !c.is_whitespace()).collect();
                STANDARD
                    .decode(&trimmed)
                    .or_else(|_| STANDARD_NO_PAD.decode(&trimmed))
                    .map_err(|e| BufferError::decode("base64", e.to_string()))
            }
            StringEncoding::Base64Url => URL_SAFE_NO_PAD
                .decode(input.trim_end_matches('='))
                .map_err(|e| BufferError::decode("base64url", e.to_string())),
            StringEncoding::Hex => {
                if input.len() % 2 != 0 {
                    return Err(BufferError::decode("hex", "odd number of digits"));
                }
                input
                    .as_bytes()
                    .chunks_exact(2)
                    .map(|pair| {
                        let hi = (pair[0] as char)
                            .to_digit(16)
                            .ok_or_else(|| BufferError::decode("hex", "invalid digit"))?;
                        let lo = (pair[1] as char)
                            .to_digit(16)
                            .ok_or_else(|| BufferError::decode("hex", "invalid digit"))?;
                        Ok((hi * 16 + lo) as u8)
                    })
                    .collect()
            }
        }
    }
}

impl FromStr for StringEncoding {
    type Err = BufferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "ascii" => Ok(StringEncoding::Ascii),
            "utf8" => Ok(StringEncoding::Utf8),
            "utf16le" => Ok(StringEncoding::Utf16Le),
            "ucs2" => Ok(StringEncoding::Ucs2),
            "base64" => Ok(StringEncoding::Base64),
            "base64url" => Ok(StringEncoding::Base64Url),
            "latin1" => Ok(StringEncoding::Latin1),
            "binary" => Ok(StringEncoding::Binary),
            "hex" => Ok(StringEncoding::Hex),
            other => Err(BufferError::UnknownEncoding(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_aliases() {
        assert_eq!(
            "UTF-8".parse::<StringEncoding>().unwrap(),
            StringEncoding::Utf8
        );
        assert_eq!(
            "utf16le".parse::<StringEncoding>().unwrap(),
            StringEncoding::Utf16Le
        );
        assert!("koi8".parse::<StringEncoding>().is_err());
    }

    #[test]
    fn hex_round_trip() {
        let bytes = [0x00, 0xde, 0xad, 0xbe, 0xef, 0xff];
        let s = StringEncoding::Hex.encode(&bytes);
        assert_eq!(s, "00deadbeefff");
        assert_eq!(StringEncoding::Hex.decode(&s).unwrap(), bytes);
        assert!(StringEncoding::Hex.decode("abc").is_err());
        assert!(StringEncoding::Hex.decode("zz").is_err());
    }

    #[test]
    fn base64_accepts_unpadded_input() {
        assert_eq!(StringEncoding::Base64.decode("aGk").unwrap(), b"hi");
        assert_eq!(StringEncoding::Base64.encode(b"hi"), "aGk=");
    }

    #[test]
    fn utf16le_round_trip() {
        let bytes = StringEncoding::Utf16Le.decode("héllo").unwrap();
        assert_eq!(StringEncoding::Utf16Le.encode(&bytes), "héllo");
    }

    #[test]
    fn ascii_masks_high_bit() {
        assert_eq!(StringEncoding::Ascii.encode(&[0xc1]), "A");
    }
}
