//! Per-character JSONL records.
//!
//! One JSON object per character, ASCII-clean: `"` and `\` are escaped, C0
//! controls use their short forms where JSON has them, and everything past
//! 0x7F is written as `\uXXXX` (surrogate pairs for astral scalars), so the
//! stream survives transports that mangle raw UTF-8.

use std::io::{self, Write};

/// Everything the stream records about one character.
#[derive(Debug, Clone)]
pub struct CharRecord {
    pub ch: char,
    pub unicode: u32,
    pub bbox: [f64; 4],
    pub origin: [f64; 2],
    pub font_size: f64,
    pub font_name: String,
    pub font_flags: u32,
    pub font_weight: i32,
    pub fill_color: [u32; 4],
    pub stroke_color: [u32; 4],
    pub angle: f64,
    pub matrix: [f64; 6],
    pub is_generated: bool,
    pub is_hyphen: bool,
    pub has_unicode_error: bool,
}

/// Escape a string for embedding in a JSON record.
pub(crate) fn escape_json(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0C}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c if (c as u32) > 0x7F => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            c => out.push(c),
        }
    }
}

fn json_floats(values: &[f64]) -> String {
    let parts: Vec<String> = values.iter().map(|v| format!("{v}")).collect();
    format!("[{}]", parts.join(","))
}

fn json_u32s(values: &[u32]) -> String {
    let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

impl CharRecord {
    /// Write this record as one JSONL line.
    pub fn write_line(&self, out: &mut dyn Write) -> io::Result<()> {
        let mut ch = String::new();
        escape_json(&self.ch.to_string(), &mut ch);
        let mut font_name = String::new();
        escape_json(&self.font_name, &mut font_name);

        writeln!(
            out,
            "{{\"char\":\"{ch}\",\"unicode\":{unicode},\"bbox\":{bbox},\"origin\":{origin},\
             \"font_size\":{font_size},\"font_name\":\"{font_name}\",\"font_flags\":{font_flags},\
             \"font_weight\":{font_weight},\"fill_color\":{fill},\"stroke_color\":{stroke},\
             \"angle\":{angle},\"matrix\":{matrix},\"is_generated\":{is_generated},\
             \"is_hyphen\":{is_hyphen},\"has_unicode_error\":{has_unicode_error}}}",
            unicode = self.unicode,
            bbox = json_floats(&self.bbox),
            origin = json_floats(&self.origin),
            font_size = self.font_size,
            font_flags = self.font_flags,
            font_weight = self.font_weight,
            fill = json_u32s(&self.fill_color),
            stroke = json_u32s(&self.stroke_color),
            angle = self.angle,
            matrix = json_floats(&self.matrix),
            is_generated = self.is_generated,
            is_hyphen = self.is_hyphen,
            has_unicode_error = self.has_unicode_error,
        )
    }
}
