//! Pulls the two host addresses out of a single connection-log line.
//!
//! Records are read lazily: keys are visited in order and reading stops as
//! soon as both hosts are known, so whatever follows them in the line is
//! never validated. Both the flat Zeek form (`"id.orig_h": ...`) and the
//! nested form (`"id": {"orig_h": ...}`) are accepted.
//!
//! When serde rejects a value before both hosts are found, the line is
//! walked again by `Scanner`, which steps over unrelated values by string
//! and bracket balance alone. Only broken structure (an unterminated string,
//! an unbalanced bracket, a missing `:` or `,`) makes the record malformed.

use std::fmt;

use serde::de::{Deserializer as _, IgnoredAny, MapAccess, Visitor};
use serde_json::Value;
use thiserror::Error;

use crate::models::domain::Role;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("malformed record: {reason}")]
    MalformedRecord { reason: String },

    #[error("missing string field {field}")]
    MissingField { field: &'static str },
}

/// Host fields of one connection record, still as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnRecord {
    pub orig_h: String,
    pub resp_h: String,
}

impl ConnRecord {
    pub fn host(&self, role: Role) -> &str {
        match role {
            Role::Originator => &self.orig_h,
            Role::Responder => &self.resp_h,
        }
    }
}

pub fn extract(line: &[u8]) -> Result<ConnRecord, RecordError> {
    let mut hosts = Hosts::default();

    let mut de = serde_json::Deserializer::from_slice(line);
    if let Err(e) = (&mut de).deserialize_map(HostVisitor { hosts: &mut hosts }) {
        if !hosts.complete() {
            hosts = Scanner::new(line)
                .hosts()
                .ok_or_else(|| RecordError::MalformedRecord {
                    reason: e.to_string(),
                })?;
        }
    }

    hosts.into_record()
}

#[derive(Debug, Default)]
struct Hosts {
    orig_h: Option<String>,
    resp_h: Option<String>,
}

impl Hosts {
    fn complete(&self) -> bool {
        self.orig_h.is_some() && self.resp_h.is_some()
    }

    fn into_record(self) -> Result<ConnRecord, RecordError> {
        match (self.orig_h, self.resp_h) {
            (Some(orig_h), Some(resp_h)) => Ok(ConnRecord { orig_h, resp_h }),
            (None, _) => Err(RecordError::MissingField {
                field: Role::Originator.field(),
            }),
            (Some(_), None) => Err(RecordError::MissingField {
                field: Role::Responder.field(),
            }),
        }
    }
}

struct HostVisitor<'a> {
    hosts: &'a mut Hosts,
}

impl<'de, 'a> Visitor<'de> for HostVisitor<'a> {
    type Value = ();

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<(), A::Error> {
        let hosts = self.hosts;
        while !hosts.complete() {
            let Some(key) = map.next_key::<String>()? else {
                break;
            };
            match key.as_str() {
                "id.orig_h" => fill(&mut hosts.orig_h, map.next_value::<Value>()?),
                "id.resp_h" => fill(&mut hosts.resp_h, map.next_value::<Value>()?),
                "id" => {
                    if let Value::Object(mut id) = map.next_value::<Value>()? {
                        if let Some(value) = id.remove("orig_h") {
                            fill(&mut hosts.orig_h, value);
                        }
                        if let Some(value) = id.remove("resp_h") {
                            fill(&mut hosts.resp_h, value);
                        }
                    }
                }
                _ => {
                    map.next_value::<IgnoredAny>()?;
                }
            }
        }
        Ok(())
    }
}

/// First string wins; non-string values count as absent.
fn fill(slot: &mut Option<String>, value: Value) {
    if slot.is_none() {
        if let Value::String(text) = value {
            *slot = Some(text);
        }
    }
}

/// Byte-level walk over one JSON object that only decodes keys and the two
/// host strings. Every other value is skipped without being validated.
struct Scanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// `None` when the structure breaks before both hosts are found.
    fn hosts(mut self) -> Option<Hosts> {
        let mut hosts = Hosts::default();
        self.object(&mut hosts, true)?;
        Some(hosts)
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> Option<()> {
        self.skip_ws();
        (self.peek() == Some(byte)).then(|| self.pos += 1)
    }

    /// `{ "key": value, ... }`. At the top level the flat host keys apply and
    /// an `id` object is descended into; inside it the bare names apply.
    fn object(&mut self, hosts: &mut Hosts, top: bool) -> Option<()> {
        self.eat(b'{')?;
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Some(());
        }

        loop {
            self.skip_ws();
            let key = self.string()?;
            self.eat(b':')?;
            self.skip_ws();
            match (top, key.as_str()) {
                (true, "id.orig_h") | (false, "orig_h") => self.host(&mut hosts.orig_h)?,
                (true, "id.resp_h") | (false, "resp_h") => self.host(&mut hosts.resp_h)?,
                (true, "id") if self.peek() == Some(b'{') => self.object(hosts, false)?,
                _ => self.skip_value()?,
            }
            if hosts.complete() {
                return Some(());
            }

            self.skip_ws();
            match self.peek()? {
                b',' => self.pos += 1,
                b'}' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn host(&mut self, slot: &mut Option<String>) -> Option<()> {
        if self.peek()? != b'"' {
            return self.skip_value();
        }
        let text = self.string()?;
        if slot.is_none() {
            *slot = Some(text);
        }
        Some(())
    }

    fn string(&mut self) -> Option<String> {
        let start = self.pos;
        self.skip_string()?;
        serde_json::from_slice(&self.bytes[start..self.pos]).ok()
    }

    fn skip_string(&mut self) -> Option<()> {
        if self.peek()? != b'"' {
            return None;
        }
        self.pos += 1;
        loop {
            match self.peek()? {
                b'\\' => self.pos += 2,
                b'"' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => self.pos += 1,
            }
        }
    }

    fn skip_value(&mut self) -> Option<()> {
        match self.peek()? {
            b'"' => self.skip_string(),
            b'{' | b'[' => self.skip_nested(),
            _ => {
                // Bare scalar, valid or not: runs to the next separator.
                let len = self.bytes[self.pos..]
                    .iter()
                    .position(|b| matches!(b, b',' | b'}'))?;
                (len > 0).then(|| self.pos += len)
            }
        }
    }

    fn skip_nested(&mut self) -> Option<()> {
        let mut depth = 0usize;
        loop {
            match self.peek()? {
                b'"' => {
                    self.skip_string()?;
                    continue;
                }
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        self.pos += 1;
                        return Some(());
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }
}
