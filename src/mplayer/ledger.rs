//! Outstanding calls awaiting an answer.
//!
//! Answers carry no request id, so they are matched by order: the most recently
//! dispatched call that is still unanswered gets the next answer.

use tokio::sync::oneshot;

use super::protocol::Value;

/// Where a call's result goes.
pub type Responder = oneshot::Sender<Value>;

/// Default value and responder of a dispatched call.
#[derive(Debug)]
pub struct PendingEntry {
  pub name: String,
  pub default: Value,
  responder: Responder,
}

impl PendingEntry {
  pub fn new(name: impl Into<String>, default: Value, responder: Responder) -> Self {
    Self {
      name: name.into(),
      default,
      responder,
    }
  }

  /// Deliver `value`, or the default when `value` is `None`.
  pub fn resolve(self, value: Option<Value>) {
    let value = value.unwrap_or(self.default);
    log::info!("RESPONSE {}: {}", self.name, value);
    if self.responder.send(value).is_err() {
      log::debug!("Caller of {} went away before its result", self.name);
    }
  }
}

#[derive(Debug, Default)]
pub struct Ledger {
  entries: Vec<PendingEntry>,
}

impl Ledger {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&mut self, entry: PendingEntry) {
    self.entries.push(entry);
  }

  /// Resolve the newest entry. Returns false when nothing was pending.
  pub fn answer(&mut self, value: Option<Value>) -> bool {
    match self.entries.pop() {
      Some(entry) => {
        entry.resolve(value);
        true
      }
      None => false,
    }
  }

  /// Resolve every entry with its default, newest first.
  pub fn drain_defaults(&mut self) {
    while self.answer(None) {}
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn entry(name: &str, default: Value) -> (PendingEntry, oneshot::Receiver<Value>) {
    let (tx, rx) = oneshot::channel();
    (PendingEntry::new(name, default, tx), rx)
  }

  #[test]
  fn test_lifo_order() {
    let mut ledger = Ledger::new();
    let (first, mut first_rx) = entry("get_time_pos", Value::Int(1));
    let (second, mut second_rx) = entry("get_percent_pos", Value::Int(2));
    ledger.push(first);
    ledger.push(second);

    assert!(ledger.answer(Some(Value::Int(42))));
    assert_eq!(second_rx.try_recv().unwrap(), Value::Int(42));
    assert!(first_rx.try_recv().is_err());

    assert!(ledger.answer(None));
    assert_eq!(first_rx.try_recv().unwrap(), Value::Int(1));
    assert!(!ledger.answer(None));
  }

  #[test]
  fn test_drain_defaults() {
    let mut ledger = Ledger::new();
    let (a, mut a_rx) = entry("get_a", Value::Str("a".into()));
    let (b, mut b_rx) = entry("get_b", Value::Null);
    ledger.push(a);
    ledger.push(b);

    ledger.drain_defaults();
    assert!(ledger.is_empty());
    assert_eq!(a_rx.try_recv().unwrap(), Value::Str("a".into()));
    assert_eq!(b_rx.try_recv().unwrap(), Value::Null);
  }

  #[test]
  fn test_dropped_caller_is_tolerated() {
    let mut ledger = Ledger::new();
    let (a, rx) = entry("get_a", Value::Null);
    drop(rx);
    ledger.push(a);
    assert!(ledger.answer(Some(Value::Int(3))));
  }
}
