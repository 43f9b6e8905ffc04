//! Output text encodings and their byte-order marks.

/// Encodings the text stream can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf32Le,
}

impl TextEncoding {
    /// Wire name used by the worker protocol.
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf8",
            TextEncoding::Utf32Le => "utf32le",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "utf8" => Some(TextEncoding::Utf8),
            "utf32le" => Some(TextEncoding::Utf32Le),
            _ => None,
        }
    }

    /// File-level byte-order mark.
    pub fn bom(self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0xEF, 0xBB, 0xBF],
            TextEncoding::Utf32Le => &[0xFF, 0xFE, 0x00, 0x00],
        }
    }

    /// Whether a fresh byte-order mark precedes every page after the first,
    /// as the in-band page separator.
    pub fn separates_pages_with_bom(self) -> bool {
        matches!(self, TextEncoding::Utf32Le)
    }

    /// Append one scalar in this encoding.
    pub fn encode_char(self, c: char, out: &mut Vec<u8>) {
        match self {
            TextEncoding::Utf8 => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            TextEncoding::Utf32Le => {
                out.extend_from_slice(&(c as u32).to_le_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for encoding in [TextEncoding::Utf8, TextEncoding::Utf32Le] {
            assert_eq!(TextEncoding::parse(encoding.name()), Some(encoding));
        }
        assert_eq!(TextEncoding::parse("utf16"), None);
    }

    #[test]
    fn boms() {
        assert_eq!(TextEncoding::Utf8.bom(), &[0xEF, 0xBB, 0xBF]);
        assert_eq!(TextEncoding::Utf32Le.bom(), &[0xFF, 0xFE, 0x00, 0x00]);
    }

    #[test]
    fn encodes_astral_scalars() {
        let mut utf8 = Vec::new();
        TextEncoding::Utf8.encode_char('𝄞', &mut utf8);
        assert_eq!(utf8, "𝄞".as_bytes());

        let mut utf32 = Vec::new();
        TextEncoding::Utf32Le.encode_char('𝄞', &mut utf32);
        assert_eq!(utf32, 0x1D11E_u32.to_le_bytes());
    }
}
