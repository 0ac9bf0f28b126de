//! Store wire protocol
//!
//! One command per line, one reply per command. Keys are single tokens;
//! values are the rest of the line and may contain spaces but not line
//! breaks.
//!
//! ```text
//! PING                  -> PONG
//! GET <key>             -> VAL <value> | NIL
//! SET <key> <value>     -> OK
//! PSETEX <key> <ms> <v> -> OK
//! DEL <key>             -> INT 1 | INT 0
//! PTTL <key>            -> INT <ms> | INT -1 (no expiry) | INT -2 (missing)
//! PEXPIRE <key> <ms>    -> INT 1 | INT 0
//! KEYS <prefix>         -> ARR <n>, then n lines
//! ```
//!
//! Failures are answered with `ERR <message>`.

use aircoord_core::{Error, Result};
use std::time::Duration;

use crate::store::KeyTtl;

/// Store command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Get { key: String },
    Set { key: String, value: String },
    SetWithTtl { key: String, ttl: Duration, value: String },
    Del { key: String },
    Ttl { key: String },
    Expire { key: String, ttl: Duration },
    Keys { prefix: String },
}

/// Command parser
pub struct CommandParser;

impl CommandParser {
    /// Parse a command line
    pub fn parse(line: &str) -> std::result::Result<Command, String> {
        let line = line.trim_end_matches(['\r', '\n']);
        let line = line.trim_start();
        if line.trim().is_empty() {
            return Err("Empty command".to_string());
        }

        let (verb, rest) = split_token(line);
        let verb = verb.to_ascii_uppercase();

        match verb.as_str() {
            "PING" => Ok(Command::Ping),
            "GET" => Ok(Command::Get {
                key: Self::single_key(rest, "GET <key>")?,
            }),
            "DEL" => Ok(Command::Del {
                key: Self::single_key(rest, "DEL <key>")?,
            }),
            "PTTL" => Ok(Command::Ttl {
                key: Self::single_key(rest, "PTTL <key>")?,
            }),
            "KEYS" => Ok(Command::Keys {
                prefix: rest.trim().to_string(),
            }),
            "SET" => {
                let (key, value) = split_token(rest);
                if key.is_empty() {
                    return Err("Usage: SET <key> <value>".to_string());
                }
                Ok(Command::Set {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
            "PSETEX" => {
                let (key, rest) = split_token(rest);
                let (ms, value) = split_token(rest);
                if key.is_empty() || ms.is_empty() {
                    return Err("Usage: PSETEX <key> <milliseconds> <value>".to_string());
                }
                Ok(Command::SetWithTtl {
                    key: key.to_string(),
                    ttl: Self::parse_ms(ms)?,
                    value: value.to_string(),
                })
            }
            "PEXPIRE" => {
                let (key, ms) = split_token(rest);
                if key.is_empty() || ms.trim().is_empty() {
                    return Err("Usage: PEXPIRE <key> <milliseconds>".to_string());
                }
                Ok(Command::Expire {
                    key: key.to_string(),
                    ttl: Self::parse_ms(ms.trim())?,
                })
            }
            _ => Err(format!("Unknown command: {}", verb)),
        }
    }

    fn single_key(rest: &str, usage: &str) -> std::result::Result<String, String> {
        let key = rest.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            Err(format!("Usage: {}", usage))
        } else {
            Ok(key.to_string())
        }
    }

    fn parse_ms(ms: &str) -> std::result::Result<Duration, String> {
        ms.parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| format!("Invalid milliseconds: {}", ms))
    }
}

impl Command {
    /// Encode as a single request line (without the line terminator)
    pub fn encode(&self) -> Result<String> {
        let line = match self {
            Command::Ping => "PING".to_string(),
            Command::Get { key } => format!("GET {}", check_key(key)?),
            Command::Set { key, value } => {
                format!("SET {} {}", check_key(key)?, check_value(value)?)
            }
            Command::SetWithTtl { key, ttl, value } => format!(
                "PSETEX {} {} {}",
                check_key(key)?,
                ttl.as_millis(),
                check_value(value)?
            ),
            Command::Del { key } => format!("DEL {}", check_key(key)?),
            Command::Ttl { key } => format!("PTTL {}", check_key(key)?),
            Command::Expire { key, ttl } => {
                format!("PEXPIRE {} {}", check_key(key)?, ttl.as_millis())
            }
            Command::Keys { prefix } => format!("KEYS {}", check_value(prefix)?),
        };
        Ok(line)
    }
}

/// Store reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Pong,
    Value(String),
    Nil,
    Int(i64),
    Array(Vec<String>),
    Error(String),
}

impl Reply {
    /// Encode as response lines, each terminated by `\n`
    pub fn encode(&self) -> String {
        match self {
            Reply::Ok => "OK\n".to_string(),
            Reply::Pong => "PONG\n".to_string(),
            Reply::Value(v) => format!("VAL {}\n", v),
            Reply::Nil => "NIL\n".to_string(),
            Reply::Int(n) => format!("INT {}\n", n),
            Reply::Array(items) => {
                let mut out = format!("ARR {}\n", items.len());
                for item in items {
                    out.push_str(item);
                    out.push('\n');
                }
                out
            }
            Reply::Error(msg) => format!("ERR {}\n", msg.replace(['\r', '\n'], " ")),
        }
    }

    /// Encode a TTL the way PTTL reports it
    pub fn from_ttl(ttl: KeyTtl) -> Self {
        match ttl {
            KeyTtl::Missing => Reply::Int(-2),
            KeyTtl::Persistent => Reply::Int(-1),
            KeyTtl::Expires(d) => Reply::Int(d.as_millis().min(i64::MAX as u128) as i64),
        }
    }
}

/// First line of a reply; `ARR` still needs its item lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyHeader {
    Complete(Reply),
    ArrayOf(usize),
}

/// Parse the first line of a reply
pub fn parse_reply_line(line: &str) -> Result<ReplyHeader> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (tag, rest) = split_token(line);

    let reply = match tag {
        "OK" => Reply::Ok,
        "PONG" => Reply::Pong,
        "NIL" => Reply::Nil,
        "VAL" => Reply::Value(rest.to_string()),
        "ERR" => Reply::Error(rest.to_string()),
        "INT" => Reply::Int(
            rest.trim()
                .parse()
                .map_err(|_| Error::Protocol(format!("Bad integer reply: {}", line)))?,
        ),
        "ARR" => {
            let n = rest
                .trim()
                .parse()
                .map_err(|_| Error::Protocol(format!("Bad array reply: {}", line)))?;
            return Ok(ReplyHeader::ArrayOf(n));
        }
        _ => return Err(Error::Protocol(format!("Unexpected reply: {}", line))),
    };
    Ok(ReplyHeader::Complete(reply))
}

/// Decode a PTTL integer
pub fn ttl_from_int(n: i64) -> KeyTtl {
    match n {
        -1 => KeyTtl::Persistent,
        n if n < 0 => KeyTtl::Missing,
        n => KeyTtl::Expires(Duration::from_millis(n as u64)),
    }
}

fn split_token(s: &str) -> (&str, &str) {
    match s.split_once(' ') {
        Some((token, rest)) => (token, rest),
        None => (s, ""),
    }
}

fn check_key(key: &str) -> Result<&str> {
    if key.is_empty() || key.contains(char::is_whitespace) {
        Err(Error::Protocol(format!("Invalid key: {:?}", key)))
    } else {
        Ok(key)
    }
}

fn check_value(value: &str) -> Result<&str> {
    if value.contains(['\r', '\n']) {
        Err(Error::Protocol("Values must not contain line breaks".to_string()))
    } else {
        Ok(value)
    }
}
