//! Minimal structured field values (RFC 8941) for signature headers.
//!
//! Only dictionaries are parsed, which is all `Signature-Input`,
//! `Signature` and `Content-Digest` use.

use std::fmt::{self, Write as _};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::SignatureError;

/// A bare item value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BareItem {
    Integer(i64),
    Decimal(String),
    String(String),
    Token(String),
    ByteSeq(Vec<u8>),
    Boolean(bool),
}

/// Ordered parameters attached to an item or inner list.
pub(crate) type Params = Vec<(String, BareItem)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Item {
    pub bare: BareItem,
    pub params: Params,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Member {
    Item(Item),
    InnerList(Vec<Item>, Params),
}

pub(crate) fn param<'a>(params: &'a Params, name: &str) -> Option<&'a BareItem> {
    params.iter().find(|(key, _)| key == name).map(|(_, value)| value)
}

impl fmt::Display for BareItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(n) => write!(f, "{n}"),
            Self::Decimal(raw) | Self::Token(raw) => f.write_str(raw),
            Self::String(s) => {
                f.write_char('"')?;
                for c in s.chars() {
                    if c == '"' || c == '\\' {
                        f.write_char('\\')?;
                    }
                    f.write_char(c)?;
                }
                f.write_char('"')
            }
            Self::ByteSeq(bytes) => write!(f, ":{}:", STANDARD.encode(bytes)),
            Self::Boolean(true) => f.write_str("?1"),
            Self::Boolean(false) => f.write_str("?0"),
        }
    }
}

pub(crate) fn serialize_params(params: &Params) -> String {
    let mut out = String::new();
    for (key, value) in params {
        out.push(';');
        out.push_str(key);
        if *value != BareItem::Boolean(true) {
            out.push('=');
            out.push_str(&value.to_string());
        }
    }
    out
}

pub(crate) fn serialize_inner_list(items: &[Item], params: &Params) -> String {
    let inner = items
        .iter()
        .map(|item| format!("{}{}", item.bare, serialize_params(&item.params)))
        .collect::<Vec<_>>()
        .join(" ");
    format!("({inner}){}", serialize_params(params))
}

/// Parses a dictionary, preserving member order.
pub(crate) fn parse_dictionary(input: &str) -> Result<Vec<(String, Member)>, SignatureError> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };
    parser.skip_sp();
    let mut members: Vec<(String, Member)> = Vec::new();
    while !parser.eof() {
        let key = parser.key()?;
        let member = if parser.eat(b'=') {
            parser.member()?
        } else {
            Member::Item(Item {
                bare: BareItem::Boolean(true),
                params: parser.params()?,
            })
        };
        members.retain(|(existing, _)| *existing != key);
        members.push((key, member));

        parser.skip_ows();
        if parser.eof() {
            break;
        }
        if !parser.eat(b',') {
            return Err(parser.error("expected ','"));
        }
        parser.skip_ows();
        if parser.eof() {
            return Err(parser.error("trailing ','"));
        }
    }
    Ok(members)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error(&self, what: &str) -> SignatureError {
        SignatureError::Malformed(format!("{what} at offset {}", self.pos))
    }

    fn skip_sp(&mut self) {
        while self.peek() == Some(b' ') {
            self.pos += 1;
        }
    }

    fn skip_ows(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.pos += 1;
        }
        String::from_utf8_lossy(self.input.get(start..self.pos).unwrap_or_default()).into_owned()
    }

    fn key(&mut self) -> Result<String, SignatureError> {
        match self.peek() {
            Some(c) if c.is_ascii_lowercase() || c == b'*' => Ok(self.take_while(|c| {
                c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, b'_' | b'-' | b'.' | b'*')
            })),
            _ => Err(self.error("expected key")),
        }
    }

    fn member(&mut self) -> Result<Member, SignatureError> {
        if self.eat(b'(') {
            let mut items = Vec::new();
            loop {
                self.skip_sp();
                if self.eat(b')') {
                    break;
                }
                items.push(self.item()?);
                match self.peek() {
                    Some(b' ' | b')') => {}
                    _ => return Err(self.error("expected ' ' or ')' in inner list")),
                }
            }
            Ok(Member::InnerList(items, self.params()?))
        } else {
            Ok(Member::Item(self.item()?))
        }
    }

    fn item(&mut self) -> Result<Item, SignatureError> {
        let bare = self.bare_item()?;
        let params = self.params()?;
        Ok(Item { bare, params })
    }

    fn params(&mut self) -> Result<Params, SignatureError> {
        let mut params: Params = Vec::new();
        while self.eat(b';') {
            self.skip_sp();
            let key = self.key()?;
            let value = if self.eat(b'=') {
                self.bare_item()?
            } else {
                BareItem::Boolean(true)
            };
            params.retain(|(existing, _)| *existing != key);
            params.push((key, value));
        }
        Ok(params)
    }

    fn bare_item(&mut self) -> Result<BareItem, SignatureError> {
        match self.peek() {
            Some(c) if c == b'-' || c.is_ascii_digit() => {
                let raw = self.take_while(|c| c == b'-' || c == b'.' || c.is_ascii_digit());
                if raw.contains('.') {
                    Ok(BareItem::Decimal(raw))
                } else {
                    raw.parse()
                        .map(BareItem::Integer)
                        .map_err(|_| self.error("invalid integer"))
                }
            }
            Some(b'"') => {
                self.pos += 1;
                let mut out = String::new();
                loop {
                    match self.peek() {
                        Some(b'"') => {
                            self.pos += 1;
                            return Ok(BareItem::String(out));
                        }
                        Some(b'\\') => {
                            self.pos += 1;
                            match self.peek() {
                                Some(c @ (b'"' | b'\\')) => {
                                    out.push(char::from(c));
                                    self.pos += 1;
                                }
                                _ => return Err(self.error("invalid escape")),
                            }
                        }
                        Some(c) if (0x20..0x7f).contains(&c) => {
                            out.push(char::from(c));
                            self.pos += 1;
                        }
                        _ => return Err(self.error("unterminated string")),
                    }
                }
            }
            Some(b':') => {
                self.pos += 1;
                let encoded = self.take_while(|c| c != b':');
                if !self.eat(b':') {
                    return Err(self.error("unterminated byte sequence"));
                }
                STANDARD
                    .decode(encoded.as_bytes())
                    .map(BareItem::ByteSeq)
                    .map_err(|_| self.error("invalid base64"))
            }
            Some(b'?') => {
                self.pos += 1;
                if self.eat(b'1') {
                    Ok(BareItem::Boolean(true))
                } else if self.eat(b'0') {
                    Ok(BareItem::Boolean(false))
                } else {
                    Err(self.error("invalid boolean"))
                }
            }
            Some(c) if c.is_ascii_alphabetic() || c == b'*' => Ok(BareItem::Token(self.take_while(
                |c| c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~:/".contains(&c),
            ))),
            _ => Err(self.error("expected item")),
        }
    }
}
