//! MPlayer slave-mode protocol: call encoding and output line classification.
//!
//! Reference: http://www.mplayerhq.hu/DOCS/tech/slave.txt

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::catalog::CommandCatalog;

/// Printed once a file has been opened and playback begins.
const PLAYBACK_STARTED: &[u8] = b"Starting playback";
/// Printed after a `seek`; always followed by one extra line.
const SEEK_ECHO: &[u8] = b"\x1b[A\r\x1b[KPosition";
/// Prefix of every answer to a `get_*` query.
const ANSWER: &[u8] = b"ANS";
/// Token MPlayer uses for a missing value.
const NULL_TOKEN: &str = "(null)";

/// Usage errors detected before anything is sent to the player.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EncodeError {
  #[error("MPlayer does not respond to: {0}")]
  UnknownCommand(String),
  #[error("{command} expects arguments of format '{expected_signature}'")]
  ArgumentFormat {
    command: String,
    expected_signature: String,
  },
}

/// Argument and result values exchanged with MPlayer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
  Int(i64),
  Float(f64),
  Str(String),
  #[default]
  Null,
}

impl Value {
  pub fn is_null(&self) -> bool {
    matches!(self, Value::Null)
  }

  pub fn as_i64(&self) -> Option<i64> {
    match self {
      Value::Int(i) => Some(*i),
      _ => None,
    }
  }

  pub fn as_f64(&self) -> Option<f64> {
    match self {
      Value::Int(i) => Some(*i as f64),
      Value::Float(f) => Some(*f),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      Value::Str(s) => Some(s),
      _ => None,
    }
  }

  /// Decode an answer payload: integer, then float, then the null token, else text.
  pub fn from_answer(raw: &str) -> Self {
    if let Ok(i) = raw.parse::<i64>() {
      return Value::Int(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
      return Value::Float(f);
    }
    if raw == NULL_TOKEN {
      return Value::Null;
    }
    Value::Str(raw.to_string())
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Value::Int(i) => write!(f, "{}", i),
      Value::Float(x) => write!(f, "{}", x),
      Value::Str(s) => f.write_str(s),
      Value::Null => f.write_str("null"),
    }
  }
}

impl From<i64> for Value {
  fn from(value: i64) -> Self {
    Value::Int(value)
  }
}

impl From<i32> for Value {
  fn from(value: i32) -> Self {
    Value::Int(value.into())
  }
}

impl From<f64> for Value {
  fn from(value: f64) -> Self {
    Value::Float(value)
  }
}

impl From<&str> for Value {
  fn from(value: &str) -> Self {
    Value::Str(value.to_string())
  }
}

impl From<String> for Value {
  fn from(value: String) -> Self {
    Value::Str(value)
  }
}

/// Per-call overrides.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
  pub response_prefix: Option<String>,
  pub default: Option<Value>,
}

impl CallOptions {
  pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.response_prefix = Some(prefix.into());
    self
  }

  pub fn with_default(mut self, default: impl Into<Value>) -> Self {
    self.default = Some(default.into());
    self
  }
}

/// Fallbacks used when a call does not override them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallDefaults {
  pub response_prefix: String,
  pub default: Value,
}

/// An encoded call, ready to be written to the player.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
  pub name: String,
  pub response_prefix: String,
  /// Full protocol line including the trailing newline.
  pub line: String,
  pub default: Value,
  pub has_args: bool,
}

impl Call {
  /// `get_*` commands expect an `ANS` line back.
  pub fn is_query(&self) -> bool {
    self.name.starts_with("get")
  }

  /// The argument-less `pause` toggles between playing and paused.
  pub fn is_toggle(&self) -> bool {
    self.name == "pause" && !self.has_args
  }

  pub fn is_load(&self) -> bool {
    self.name.starts_with("load")
  }
}

/// Validate `args` against the catalog and render the protocol line.
pub fn encode(
  catalog: &CommandCatalog,
  name: &str,
  args: &[Value],
  options: &CallOptions,
  defaults: &CallDefaults,
) -> Result<Call, EncodeError> {
  let spec = catalog
    .get(name)
    .ok_or_else(|| EncodeError::UnknownCommand(name.to_string()))?;

  let format_error = || EncodeError::ArgumentFormat {
    command: name.to_string(),
    expected_signature: spec.signature(),
  };

  if args.len() > spec.slots.len() {
    return Err(format_error());
  }

  let mut parts = Vec::with_capacity(args.len() + 2);
  let response_prefix = options
    .response_prefix
    .clone()
    .unwrap_or_else(|| defaults.response_prefix.clone());
  if !response_prefix.is_empty() {
    parts.push(response_prefix.clone());
  }
  parts.push(name.to_string());

  for (arg, slot) in args.iter().zip(&spec.slots) {
    let coerced = slot.kind.coerce(arg).ok_or_else(format_error)?;
    parts.push(slot.kind.render(&coerced));
  }

  let mut line = parts.join(" ");
  line.push('\n');

  Ok(Call {
    name: name.to_string(),
    response_prefix,
    line,
    default: options
      .default
      .clone()
      .unwrap_or_else(|| defaults.default.clone()),
    has_args: !args.is_empty(),
  })
}

/// Classified line of player output.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
  /// Playback of a freshly loaded file has begun.
  PlaybackStarted,
  /// The bare newline MPlayer prints when playback stops.
  Stopped,
  /// First line of the two-line seek echo.
  SeekEcho,
  /// Answer to a query.
  Answer(Value),
  /// Anything else.
  Other,
}

impl OutputLine {
  /// Classify one raw line (trailing newline included).
  pub fn classify(line: &[u8]) -> Self {
    if line.starts_with(PLAYBACK_STARTED) {
      OutputLine::PlaybackStarted
    } else if line == b"\n" {
      OutputLine::Stopped
    } else if line.starts_with(SEEK_ECHO) {
      OutputLine::SeekEcho
    } else if line.starts_with(ANSWER) {
      OutputLine::Answer(parse_answer(line))
    } else {
      OutputLine::Other
    }
  }
}

/// Parse `ANS_key=value`, stripping quotes and line terminators from the value.
pub fn parse_answer(line: &[u8]) -> Value {
  let text = String::from_utf8_lossy(line);
  let raw = text.split_once('=').map(|(_, value)| value).unwrap_or("");
  Value::from_answer(raw.trim_matches(|c| c == '\'' || c == '\n' || c == '\r'))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mplayer::catalog::{ArgSlot, ArgType, CommandSpec};

  fn slot(kind: ArgType) -> ArgSlot {
    ArgSlot {
      kind,
      optional: false,
    }
  }

  fn catalog() -> CommandCatalog {
    CommandCatalog::from_specs([
      CommandSpec::new("seek", vec![slot(ArgType::Float), ArgSlot {
        kind: ArgType::Integer,
        optional: true,
      }]),
      CommandSpec::new("loadfile", vec![slot(ArgType::String)]),
      CommandSpec::new("get_time_pos", vec![]),
      CommandSpec::new("pause", vec![]),
    ])
  }

  fn encode_default(name: &str, args: &[Value]) -> Result<Call, EncodeError> {
    encode(&catalog(), name, args, &CallOptions::default(), &CallDefaults::default())
  }

  #[test]
  fn test_encode_seek() {
    let call = encode_default("seek", &[10.5.into()]).unwrap();
    assert_eq!(call.line, "seek 10.500000\n");
    assert!(!call.is_query());
  }

  #[test]
  fn test_encode_optional_slot_and_coercion() {
    let call = encode_default("seek", &["30".into(), Value::Float(2.0)]).unwrap();
    assert_eq!(call.line, "seek 30.000000 2\n");
  }

  #[test]
  fn test_encode_quotes_strings() {
    let call = encode_default("loadfile", &["a.mp4".into()]).unwrap();
    assert_eq!(call.line, "loadfile \"a.mp4\"\n");
    assert!(call.is_load());
  }

  #[test]
  fn test_encode_no_args() {
    let call = encode_default("pause", &[]).unwrap();
    assert_eq!(call.line, "pause\n");
    assert!(call.is_toggle());
  }

  #[test]
  fn test_encode_prefix_and_default() {
    let options = CallOptions::default()
      .with_prefix("pausing_keep")
      .with_default(-1);
    let call = encode(&catalog(), "get_time_pos", &[], &options, &CallDefaults::default()).unwrap();
    assert_eq!(call.line, "pausing_keep get_time_pos\n");
    assert_eq!(call.default, Value::Int(-1));
    assert!(call.is_query());
  }

  #[test]
  fn test_encode_falls_back_to_defaults() {
    let defaults = CallDefaults {
      response_prefix: "pausing_keep_force".into(),
      default: Value::Float(0.0),
    };
    let call = encode(&catalog(), "get_time_pos", &[], &CallOptions::default(), &defaults).unwrap();
    assert_eq!(call.line, "pausing_keep_force get_time_pos\n");
    assert_eq!(call.default, Value::Float(0.0));
  }

  #[test]
  fn test_encode_unknown_command() {
    let err = encode_default("frobnicate", &[]).unwrap_err();
    assert_eq!(err, EncodeError::UnknownCommand("frobnicate".into()));
  }

  #[test]
  fn test_encode_argument_errors() {
    let err = encode_default("seek", &["soon".into()]).unwrap_err();
    assert_eq!(
      err,
      EncodeError::ArgumentFormat {
        command: "seek".into(),
        expected_signature: "Float [Integer]".into(),
      }
    );

    let err = encode_default("get_time_pos", &[1.into()]).unwrap_err();
    assert!(matches!(err, EncodeError::ArgumentFormat { .. }));
  }

  #[test]
  fn test_classify_lines() {
    assert_eq!(
      OutputLine::classify(b"Starting playback...\n"),
      OutputLine::PlaybackStarted
    );
    assert_eq!(OutputLine::classify(b"\n"), OutputLine::Stopped);
    assert_eq!(
      OutputLine::classify(b"\x1b[A\r\x1b[KPosition: 10 %\n"),
      OutputLine::SeekEcho
    );
    assert_eq!(OutputLine::classify(b"Playing a.mp4.\n"), OutputLine::Other);
  }

  #[test]
  fn test_parse_answers() {
    assert_eq!(parse_answer(b"ANS_LENGTH=120\n"), Value::Int(120));
    assert_eq!(parse_answer(b"ANS_TIME_POSITION=12.3\n"), Value::Float(12.3));
    assert_eq!(
      parse_answer(b"ANS_FILENAME='a.mp4'\n"),
      Value::Str("a.mp4".into())
    );
    assert_eq!(parse_answer(b"ANS_META_TITLE=(null)\n"), Value::Null);
    assert_eq!(parse_answer(b"ANS_path=/tmp/a=b.mp4\n"), Value::Str("/tmp/a=b.mp4".into()));
  }
}
