//! GSM 03.38 default alphabet and 7-bit packing

/// Encoding used to submit a message body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    /// Packed 7-bit default alphabet
    Gsm7,
    /// 16-bit UCS-2
    Ucs2,
}

const ESC: u8 = 0x1b;

/// Default alphabet, indexed by septet value. 0x1B is the escape to the extension table.
#[rustfmt::skip]
const GSM7_DEFAULT: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å',
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1b}', 'Æ', 'æ', 'ß', 'É',
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/',
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?',
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O',
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§',
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o',
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à',
];

/// Extension table, reached through the escape septet
fn gsm7_extension(septet: u8) -> Option<char> {
    match septet {
        0x0a => Some('\u{0c}'),
        0x14 => Some('^'),
        0x28 => Some('{'),
        0x29 => Some('}'),
        0x2f => Some('\\'),
        0x3c => Some('['),
        0x3d => Some('~'),
        0x3e => Some(']'),
        0x40 => Some('|'),
        0x65 => Some('€'),
        _ => None,
    }
}

/// True for characters sent as-is in 7-bit mode: ASCII members of the default
/// table. Escaped characters (`[`, `{`, `|`, ...) and the escape itself are excluded.
pub fn is_gsm7_safe(c: char) -> bool {
    c.is_ascii() && c != '\u{1b}' && GSM7_DEFAULT.contains(&c)
}

/// 7-bit if every character is 7-bit safe, UCS-2 otherwise
pub fn detect(body: &str) -> Alphabet {
    if body.chars().all(is_gsm7_safe) {
        Alphabet::Gsm7
    } else {
        Alphabet::Ucs2
    }
}

/// Extracts `count` septets from packed user data, starting at the first bit
pub fn unpack_septets(data: &[u8], count: usize) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let bit = i * 7;
        let byte = bit / 8;
        let shift = bit % 8;
        let mut value = (*data.get(byte)? as u16) >> shift;
        if shift > 1 {
            value |= (*data.get(byte + 1)? as u16) << (8 - shift);
        }
        out.push((value & 0x7f) as u8);
    }
    Some(out)
}

/// Maps septets to text, resolving escape sequences. Unknown escapes decode as space.
pub fn decode_septets(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut iter = septets.iter();
    while let Some(&s) = iter.next() {
        if s == ESC {
            match iter.next() {
                Some(&ext) => out.push(gsm7_extension(ext).unwrap_or(' ')),
                None => break,
            }
        } else {
            out.push(GSM7_DEFAULT[(s & 0x7f) as usize]);
        }
    }
    out
}

/// Big-endian UTF-16 as carried in UCS-2 user data. Broken surrogates become U+FFFD.
pub fn decode_ucs2(data: &[u8]) -> String {
    let units = data.chunks_exact(2).map(|c| u16::from_be_bytes([c[0], c[1]]));
    char::decode_utf16(units)
        .map(|r| r.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
}
