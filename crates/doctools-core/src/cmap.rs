//! Decoding shown strings through the page font
//!
//! A font's `/ToUnicode` CMap wins when it maps a code. Otherwise simple fonts
//! are read through their `/Encoding` (base encoding plus `/Differences`) and
//! composite fonts through a UCS-2 CMap name; Identity-encoded composite fonts
//! without a ToUnicode map have no recoverable text and yield U+FFFD per code.

use lopdf::{Dictionary, Document, Object, Stream};
use std::collections::{BTreeMap, HashMap};

/// Widest bfrange that is expanded
const MAX_RANGE_SPAN: u32 = 0xFFFF;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Hex(Vec<u8>),
    Name(String),
    ArrayStart,
    ArrayEnd,
    Word(String),
}

fn is_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b"()<>[]{}/%".contains(&b)
}

fn word_end(data: &[u8], start: usize) -> usize {
    data[start..]
        .iter()
        .position(|&b| is_delimiter(b))
        .map_or(data.len(), |p| start + p)
}

fn skip_literal(data: &[u8], start: usize) -> usize {
    let mut depth = 0i32;
    let mut i = start;
    while i < data.len() {
        match data[i] {
            b'\\' => i += 1,
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
        i += 1;
    }
    data.len()
}

/// Hex digits to bytes; an odd trailing digit is padded with 0
fn hex_bytes(digits: &[u8]) -> Vec<u8> {
    let nibbles: Vec<u8> = digits
        .iter()
        .filter_map(|&c| (c as char).to_digit(16))
        .map(|d| d as u8)
        .collect();
    nibbles
        .chunks(2)
        .map(|pair| (pair[0] << 4) | pair.get(1).copied().unwrap_or(0))
        .collect()
}

fn tokenize(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < data.len() {
        match data[i] {
            b'%' => {
                while i < data.len() && data[i] != b'\n' && data[i] != b'\r' {
                    i += 1;
                }
            }
            b'<' if data.get(i + 1) == Some(&b'<') => i += 2,
            b'>' if data.get(i + 1) == Some(&b'>') => i += 2,
            b'<' => {
                let end = data[i + 1..]
                    .iter()
                    .position(|&c| c == b'>')
                    .map_or(data.len(), |p| i + 1 + p);
                tokens.push(Token::Hex(hex_bytes(&data[i + 1..end])));
                i = end + 1;
            }
            b'[' => {
                tokens.push(Token::ArrayStart);
                i += 1;
            }
            b']' => {
                tokens.push(Token::ArrayEnd);
                i += 1;
            }
            b'(' => i = skip_literal(data, i),
            b'/' => {
                let end = word_end(data, i + 1);
                tokens.push(Token::Name(
                    String::from_utf8_lossy(&data[i + 1..end]).into_owned(),
                ));
                i = end;
            }
            b if b.is_ascii_whitespace() => i += 1,
            _ => {
                let end = word_end(data, i).max(i + 1);
                tokens.push(Token::Word(String::from_utf8_lossy(&data[i..end]).into_owned()));
                i = end;
            }
        }
    }
    tokens
}

/// Big-endian value of up to four code bytes
fn code_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, &b| (acc << 8) | b as u32)
}

fn utf16_units(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect()
}

/// bfchar/bfrange destination: UTF-16BE, or Latin-1 bytes when the length is odd
fn destination_text(bytes: &[u8]) -> String {
    if bytes.len() % 2 == 0 {
        String::from_utf16_lossy(&utf16_units(bytes))
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Code → text table parsed from a `/ToUnicode` CMap stream
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToUnicodeCMap {
    /// Inclusive codespace ranges; both ends have the same length
    codespace: Vec<(Vec<u8>, Vec<u8>)>,
    /// Keyed by (code length in bytes, code value)
    map: HashMap<(usize, u32), String>,
}

impl ToUnicodeCMap {
    pub fn parse(data: &[u8]) -> Self {
        let tokens = tokenize(data);
        let mut cmap = Self::default();
        let mut i = 0;
        while i < tokens.len() {
            match &tokens[i] {
                Token::Word(w) if w == "begincodespacerange" => {
                    i += 1;
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        if !lo.is_empty() && lo.len() == hi.len() {
                            cmap.codespace.push((lo.clone(), hi.clone()));
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfchar" => {
                    i += 1;
                    while let (Some(Token::Hex(src)), Some(dst)) = (tokens.get(i), tokens.get(i + 1))
                    {
                        let text = match dst {
                            Token::Hex(dst) => Some(destination_text(dst)),
                            Token::Name(glyph) => glyph_char(glyph.as_bytes()).map(String::from),
                            _ => None,
                        };
                        if let Some(text) = text {
                            cmap.insert(src.len(), code_value(src), text);
                        }
                        i += 2;
                    }
                }
                Token::Word(w) if w == "beginbfrange" => {
                    i += 1;
                    while let (Some(Token::Hex(lo)), Some(Token::Hex(hi))) =
                        (tokens.get(i), tokens.get(i + 1))
                    {
                        i += 2;
                        match tokens.get(i) {
                            Some(Token::Hex(dst)) => {
                                cmap.insert_range(lo, hi, dst);
                                i += 1;
                            }
                            Some(Token::ArrayStart) => {
                                i += 1;
                                let start = code_value(lo);
                                let mut offset = 0;
                                while let Some(Token::Hex(dst)) = tokens.get(i) {
                                    cmap.insert(lo.len(), start + offset, destination_text(dst));
                                    offset += 1;
                                    i += 1;
                                }
                                if tokens.get(i) == Some(&Token::ArrayEnd) {
                                    i += 1;
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => i += 1,
            }
        }
        cmap
    }

    fn insert(&mut self, len: usize, code: u32, text: String) {
        self.map.insert((len, code), text);
    }

    /// Consecutive codes map to consecutive values of the destination's last unit
    fn insert_range(&mut self, lo: &[u8], hi: &[u8], dst: &[u8]) {
        let (start, end) = (code_value(lo), code_value(hi));
        if end < start || end - start > MAX_RANGE_SPAN {
            return;
        }
        if dst.len() % 2 != 0 {
            let base = code_value(dst);
            for offset in 0..=end - start {
                if let Some(c) = char::from_u32(base + offset) {
                    self.insert(lo.len(), start + offset, c.to_string());
                }
            }
            return;
        }
        let base = utf16_units(dst);
        for offset in 0..=end - start {
            let mut units = base.clone();
            if let Some(last) = units.last_mut() {
                *last = last.wrapping_add(offset as u16);
            }
            self.insert(lo.len(), start + offset, String::from_utf16_lossy(&units));
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Length of the code starting at `bytes[0]`: the shortest codespace range
    /// that matches, else `default_len`
    fn code_len(&self, bytes: &[u8], default_len: usize) -> usize {
        self.codespace
            .iter()
            .filter(|(lo, hi)| {
                bytes.len() >= lo.len()
                    && bytes
                        .iter()
                        .zip(lo.iter().zip(hi))
                        .all(|(b, (l, h))| l <= b && b <= h)
            })
            .map(|(lo, _)| lo.len())
            .min()
            .unwrap_or(default_len)
            .clamp(1, bytes.len().max(1))
    }

    fn lookup(&self, code: &[u8]) -> Option<&str> {
        self.map
            .get(&(code.len(), code_value(code)))
            .map(String::as_str)
    }
}

/// How a font without a usable ToUnicode entry turns codes into text
#[derive(Debug, Clone, PartialEq)]
enum FontEncoding {
    /// One byte per code through a named base encoding and its differences
    Simple {
        base: String,
        differences: BTreeMap<u8, char>,
    },
    /// Two bytes per code; `ucs2` when the CMap name says the codes are UTF-16
    Composite { ucs2: bool },
}

/// Everything needed to turn the bytes of a `Tj` operand into text
#[derive(Debug, Clone, PartialEq)]
pub struct FontDecoder {
    to_unicode: Option<ToUnicodeCMap>,
    encoding: FontEncoding,
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Raw bytes of a stream, decompressed when it carries a filter
pub(crate) fn stream_bytes(stream: &Stream) -> Option<Vec<u8>> {
    if stream.dict.has(b"Filter") {
        stream.decompressed_content().ok()
    } else {
        Some(stream.content.clone())
    }
}

impl FontDecoder {
    pub fn from_font(doc: &Document, font: &Dictionary) -> Self {
        let to_unicode = font
            .get(b"ToUnicode")
            .ok()
            .map(|obj| resolve(doc, obj))
            .and_then(|obj| obj.as_stream().ok())
            .and_then(stream_bytes)
            .map(|data| ToUnicodeCMap::parse(&data))
            .filter(|cmap| !cmap.is_empty());

        let composite = font.get(b"Subtype").and_then(Object::as_name).ok() == Some(b"Type0".as_slice());
        let encoding = font.get(b"Encoding").ok().map(|obj| resolve(doc, obj));
        let encoding = if composite {
            let name = encoding
                .and_then(|obj| obj.as_name_str().ok())
                .unwrap_or("Identity-H");
            FontEncoding::Composite {
                ucs2: name.contains("UCS2") || name.contains("UTF16"),
            }
        } else {
            simple_encoding(encoding)
        };
        Self {
            to_unicode,
            encoding,
        }
    }

    fn default_code_len(&self) -> usize {
        match self.encoding {
            FontEncoding::Simple { .. } => 1,
            FontEncoding::Composite { .. } => 2,
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> String {
        let Some(cmap) = &self.to_unicode else {
            return self.decode_unmapped(bytes);
        };
        let mut text = String::new();
        let mut i = 0;
        while i < bytes.len() {
            let len = cmap.code_len(&bytes[i..], self.default_code_len());
            let code = &bytes[i..i + len];
            match cmap.lookup(code) {
                Some(mapped) => text.push_str(mapped),
                None => text.push_str(&self.decode_unmapped(code)),
            }
            i += len;
        }
        text
    }

    fn decode_unmapped(&self, bytes: &[u8]) -> String {
        match &self.encoding {
            FontEncoding::Simple { base, differences } if differences.is_empty() => {
                Document::decode_text(Some(base.as_str()), bytes)
            }
            FontEncoding::Simple { base, differences } => bytes
                .iter()
                .map(|b| match differences.get(b) {
                    Some(c) => c.to_string(),
                    None => Document::decode_text(Some(base.as_str()), &[*b]),
                })
                .collect(),
            FontEncoding::Composite { ucs2: true } => String::from_utf16_lossy(&utf16_units(bytes)),
            FontEncoding::Composite { ucs2: false } => {
                "\u{FFFD}".repeat(bytes.len().div_ceil(2))
            }
        }
    }
}

const BASE_ENCODINGS: [&str; 4] = [
    "WinAnsiEncoding",
    "MacRomanEncoding",
    "MacExpertEncoding",
    "StandardEncoding",
];

/// A missing or unknown base encoding is read as WinAnsi, which agrees with
/// ASCII over the printable range.
fn base_encoding(name: Option<&str>) -> String {
    name.filter(|name| BASE_ENCODINGS.contains(name))
        .unwrap_or("WinAnsiEncoding")
        .to_string()
}

fn simple_encoding(encoding: Option<&Object>) -> FontEncoding {
    match encoding {
        Some(Object::Dictionary(dict)) => {
            let base = base_encoding(dict.get(b"BaseEncoding").and_then(Object::as_name_str).ok());
            let differences = dict
                .get(b"Differences")
                .and_then(Object::as_array)
                .map(|items| parse_differences(items))
                .unwrap_or_default();
            FontEncoding::Simple { base, differences }
        }
        Some(obj) => FontEncoding::Simple {
            base: base_encoding(obj.as_name_str().ok()),
            differences: BTreeMap::new(),
        },
        None => FontEncoding::Simple {
            base: base_encoding(None),
            differences: BTreeMap::new(),
        },
    }
}

/// `[code /name /name code /name ...]`; names that cannot be read are skipped
fn parse_differences(items: &[Object]) -> BTreeMap<u8, char> {
    let mut differences = BTreeMap::new();
    let mut code: Option<i64> = None;
    for item in items {
        match item {
            Object::Integer(n) => code = Some(*n),
            Object::Name(name) => {
                if let Some(current) = code {
                    if let (Ok(byte), Some(c)) = (u8::try_from(current), glyph_char(name)) {
                        differences.insert(byte, c);
                    }
                    code = Some(current + 1);
                }
            }
            _ => {}
        }
    }
    differences
}

const GLYPH_NAMES: &[(&str, char)] = &[
    ("space", ' '),
    ("exclam", '!'),
    ("quotedbl", '"'),
    ("numbersign", '#'),
    ("dollar", '$'),
    ("percent", '%'),
    ("ampersand", '&'),
    ("quotesingle", '\''),
    ("parenleft", '('),
    ("parenright", ')'),
    ("asterisk", '*'),
    ("plus", '+'),
    ("comma", ','),
    ("hyphen", '-'),
    ("period", '.'),
    ("slash", '/'),
    ("zero", '0'),
    ("one", '1'),
    ("two", '2'),
    ("three", '3'),
    ("four", '4'),
    ("five", '5'),
    ("six", '6'),
    ("seven", '7'),
    ("eight", '8'),
    ("nine", '9'),
    ("colon", ':'),
    ("semicolon", ';'),
    ("less", '<'),
    ("equal", '='),
    ("greater", '>'),
    ("question", '?'),
    ("at", '@'),
    ("bracketleft", '['),
    ("backslash", '\\'),
    ("bracketright", ']'),
    ("asciicircum", '^'),
    ("underscore", '_'),
    ("grave", '`'),
    ("braceleft", '{'),
    ("bar", '|'),
    ("braceright", '}'),
    ("asciitilde", '~'),
    ("quoteleft", '\u{2018}'),
    ("quoteright", '\u{2019}'),
    ("quotedblleft", '\u{201C}'),
    ("quotedblright", '\u{201D}'),
    ("endash", '\u{2013}'),
    ("emdash", '\u{2014}'),
    ("bullet", '\u{2022}'),
    ("ellipsis", '\u{2026}'),
    ("fi", '\u{FB01}'),
    ("fl", '\u{FB02}'),
    ("ff", '\u{FB00}'),
    ("ffi", '\u{FB03}'),
    ("ffl", '\u{FB04}'),
    ("nbspace", '\u{A0}'),
    ("eacute", 'é'),
    ("egrave", 'è'),
    ("aacute", 'á'),
    ("agrave", 'à'),
    ("ccedilla", 'ç'),
    ("odieresis", 'ö'),
    ("udieresis", 'ü'),
    ("adieresis", 'ä'),
    ("germandbls", 'ß'),
];

/// Unicode value of a glyph name: `uniXXXX`, `uXXXX[XX]`, a single letter,
/// or a common AGL name. Suffixes such as `.sc` are ignored.
fn glyph_char(name: &[u8]) -> Option<char> {
    let name = std::str::from_utf8(name).ok()?;
    let name = name.split('.').next().unwrap_or(name);
    if let Some(hex) = name.strip_prefix("uni").filter(|h| h.len() == 4) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(hex) = name
        .strip_prefix('u')
        .filter(|h| (4..=6).contains(&h.len()))
    {
        if let Ok(value) = u32::from_str_radix(hex, 16) {
            return char::from_u32(value);
        }
    }
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if c.is_ascii_alphabetic() {
            return Some(c);
        }
    }
    GLYPH_NAMES
        .iter()
        .find(|(glyph, _)| *glyph == name)
        .map(|(_, c)| *c)
}
