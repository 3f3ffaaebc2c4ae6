//! Slave-mode command catalog.
//!
//! MPlayer describes its own command set through `-input cmdlist`, one command
//! per line: the name followed by its argument types, optional ones in brackets.
//!
//! ```text
//! seek                 Float [Integer]
//! get_time_pos
//! loadfile             String [Integer]
//! ```

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use super::protocol::Value;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("Command list is empty")]
  Empty,
  #[error("Failed to read command list: {0}")]
  Io(#[from] std::io::Error),
}

/// Argument type declared in the command list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
  String,
  Float,
  Integer,
}

impl ArgType {
  fn parse(token: &str) -> Option<Self> {
    match token {
      "String" => Some(Self::String),
      "Float" => Some(Self::Float),
      "Integer" => Some(Self::Integer),
      _ => None,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      Self::String => "String",
      Self::Float => "Float",
      Self::Integer => "Integer",
    }
  }

  /// Coerce a caller value to this type. `None` when the value does not fit.
  pub fn coerce(self, value: &Value) -> Option<Value> {
    match (self, value) {
      (_, Value::Null) => None,
      (Self::String, Value::Str(s)) => Some(Value::Str(s.clone())),
      (Self::String, Value::Int(i)) => Some(Value::Str(i.to_string())),
      (Self::String, Value::Float(f)) => Some(Value::Str(f.to_string())),
      (Self::Float, Value::Float(f)) => Some(Value::Float(*f)),
      (Self::Float, Value::Int(i)) => Some(Value::Float(*i as f64)),
      (Self::Float, Value::Str(s)) => s.trim().parse().ok().map(Value::Float),
      (Self::Integer, Value::Int(i)) => Some(Value::Int(*i)),
      (Self::Integer, Value::Float(f)) if f.is_finite() => Some(Value::Int(f.trunc() as i64)),
      (Self::Integer, Value::Float(_)) => None,
      (Self::Integer, Value::Str(s)) => s.trim().parse().ok().map(Value::Int),
    }
  }

  /// Render an already coerced value the way the slave protocol expects it.
  pub fn render(self, value: &Value) -> String {
    match (self, value) {
      (Self::String, Value::Str(s)) => format!("\"{}\"", s),
      (Self::Float, Value::Float(f)) => format!("{:.6}", f),
      (Self::Integer, Value::Int(i)) => i.to_string(),
      (_, other) => other.to_string(),
    }
  }
}

/// One positional argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSlot {
  pub kind: ArgType,
  pub optional: bool,
}

impl ArgSlot {
  fn parse(token: &str) -> Option<Self> {
    let optional = token.starts_with('[') && token.ends_with(']');
    let bare = token.trim_matches(|c| c == '[' || c == ']');
    ArgType::parse(bare).map(|kind| Self { kind, optional })
  }
}

impl fmt::Display for ArgSlot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.optional {
      write!(f, "[{}]", self.kind.name())
    } else {
      f.write_str(self.kind.name())
    }
  }
}

/// A command and its argument signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
  pub name: String,
  pub slots: Vec<ArgSlot>,
}

impl CommandSpec {
  pub fn new(name: impl Into<String>, slots: Vec<ArgSlot>) -> Self {
    Self {
      name: name.into(),
      slots,
    }
  }

  /// Space separated slot list, e.g. `Float [Integer]`.
  pub fn signature(&self) -> String {
    self
      .slots
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join(" ")
  }
}

/// Every command the running binary accepts.
#[derive(Debug, Clone, Default)]
pub struct CommandCatalog {
  commands: HashMap<String, CommandSpec>,
}

impl CommandCatalog {
  /// Parse `-input cmdlist` output.
  pub fn parse(output: &str) -> Result<Self, CatalogError> {
    let mut commands = HashMap::new();

    for line in output.lines() {
      let Some((name, rest)) = split_command_line(line) else {
        continue;
      };

      // Banner and help lines also start with a word; only keep well-typed ones.
      let Some(slots) = rest
        .split_whitespace()
        .map(ArgSlot::parse)
        .collect::<Option<Vec<_>>>()
      else {
        log::debug!("Skipping command list line: {}", line);
        continue;
      };

      commands.insert(name.to_string(), CommandSpec::new(name, slots));
    }

    if commands.is_empty() {
      return Err(CatalogError::Empty);
    }

    log::info!("Loaded {} MPlayer commands", commands.len());
    Ok(Self { commands })
  }

  /// Build a catalog from already known specs.
  pub fn from_specs(specs: impl IntoIterator<Item = CommandSpec>) -> Self {
    Self {
      commands: specs
        .into_iter()
        .map(|spec| (spec.name.clone(), spec))
        .collect(),
    }
  }

  pub fn get(&self, name: &str) -> Option<&CommandSpec> {
    self.commands.get(name)
  }

  pub fn contains(&self, name: &str) -> bool {
    self.commands.contains_key(name)
  }

  pub fn len(&self) -> usize {
    self.commands.len()
  }

  pub fn is_empty(&self) -> bool {
    self.commands.is_empty()
  }
}

/// Split `name   args...` into its word-character name and the remainder.
fn split_command_line(line: &str) -> Option<(&str, &str)> {
  let end = line
    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
    .unwrap_or(line.len());
  if end == 0 {
    return None;
  }
  let (name, rest) = line.split_at(end);
  // The name must be followed by whitespace (or nothing at all).
  if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
    return None;
  }
  Some((name, rest.trim()))
}

#[cfg(test)]
mod tests {
  use super::*;

  const CMDLIST: &str = "\
radio_step_channel   Integer
seek                 Float [Integer]
get_time_pos
loadfile             String [Integer]
pause
";

  #[test]
  fn test_parse_cmdlist() {
    let catalog = CommandCatalog::parse(CMDLIST).unwrap();
    assert_eq!(catalog.len(), 5);

    let seek = catalog.get("seek").unwrap();
    assert_eq!(seek.slots.len(), 2);
    assert_eq!(seek.slots[0].kind, ArgType::Float);
    assert!(!seek.slots[0].optional);
    assert!(seek.slots[1].optional);
    assert_eq!(seek.signature(), "Float [Integer]");

    assert!(catalog.get("get_time_pos").unwrap().slots.is_empty());
  }

  #[test]
  fn test_parse_skips_noise_lines() {
    let output = "MPlayer SVN-r38151 (C) 2000-2019 MPlayer Team\n\npause\n";
    let catalog = CommandCatalog::parse(output).unwrap();
    assert_eq!(catalog.len(), 1);
    assert!(catalog.contains("pause"));
  }

  #[test]
  fn test_parse_skips_unknown_types() {
    let err = CommandCatalog::parse("frobnicate Widget\n").unwrap_err();
    assert!(matches!(err, CatalogError::Empty));
  }

  #[test]
  fn test_parse_empty_is_error() {
    assert!(matches!(CommandCatalog::parse(""), Err(CatalogError::Empty)));
  }

  #[test]
  fn test_coercion() {
    assert_eq!(ArgType::Float.coerce(&Value::Int(3)), Some(Value::Float(3.0)));
    assert_eq!(ArgType::Integer.coerce(&Value::Float(10.9)), Some(Value::Int(10)));
    assert_eq!(ArgType::Integer.coerce(&Value::Str("7".into())), Some(Value::Int(7)));
    assert_eq!(ArgType::Integer.coerce(&Value::Str("7.5".into())), None);
    assert_eq!(ArgType::Float.coerce(&Value::Str("abc".into())), None);
    assert_eq!(ArgType::String.coerce(&Value::Int(2)), Some(Value::Str("2".into())));
    assert_eq!(ArgType::String.coerce(&Value::Null), None);
  }
}
