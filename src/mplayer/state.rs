//! Playback state machine.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
  Playing,
  Paused,
  Stopped,
}

impl PlaybackState {
  fn as_u8(self) -> u8 {
    match self {
      PlaybackState::Playing => 0,
      PlaybackState::Paused => 1,
      PlaybackState::Stopped => 2,
    }
  }

  fn from_u8(value: u8) -> Self {
    match value {
      0 => PlaybackState::Playing,
      1 => PlaybackState::Paused,
      _ => PlaybackState::Stopped,
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      PlaybackState::Playing => "playing",
      PlaybackState::Paused => "paused",
      PlaybackState::Stopped => "stopped",
    }
  }
}

/// Read-only view of the supervisor's state, shareable across threads.
#[derive(Debug, Clone)]
pub struct SharedState {
  state: Arc<AtomicU8>,
  loading: Arc<AtomicBool>,
}

impl SharedState {
  pub fn new() -> Self {
    Self {
      state: Arc::new(AtomicU8::new(PlaybackState::Stopped.as_u8())),
      loading: Arc::new(AtomicBool::new(false)),
    }
  }

  pub fn state(&self) -> PlaybackState {
    PlaybackState::from_u8(self.state.load(Ordering::Acquire))
  }

  pub fn is_loading(&self) -> bool {
    self.loading.load(Ordering::Acquire)
  }

  fn publish(&self, state: PlaybackState, loading: bool) {
    self.state.store(state.as_u8(), Ordering::Release);
    self.loading.store(loading, Ordering::Release);
  }
}

impl Default for SharedState {
  fn default() -> Self {
    Self::new()
  }
}

/// Owned by the supervisor; every change is mirrored into the [`SharedState`].
#[derive(Debug)]
pub struct PlaybackMachine {
  state: PlaybackState,
  loading: bool,
  shared: SharedState,
}

impl PlaybackMachine {
  pub fn new(shared: SharedState) -> Self {
    shared.publish(PlaybackState::Stopped, false);
    Self {
      state: PlaybackState::Stopped,
      loading: false,
      shared,
    }
  }

  pub fn state(&self) -> PlaybackState {
    self.state
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  /// Queries cannot be answered while stopped or while a file is loading.
  pub fn can_answer_queries(&self) -> bool {
    self.state != PlaybackState::Stopped && !self.loading
  }

  /// A load command was sent.
  pub fn begin_load(&mut self) {
    self.loading = true;
    self.publish();
  }

  /// Playback started. Returns the new state if it changed.
  pub fn playback_started(&mut self) -> Option<PlaybackState> {
    self.loading = false;
    self.transition(PlaybackState::Playing)
  }

  /// Playback stopped. Returns the new state if it changed.
  pub fn stopped(&mut self) -> Option<PlaybackState> {
    self.transition(PlaybackState::Stopped)
  }

  /// Parameterless `pause`: flips playing and paused, ignored when stopped.
  pub fn toggle(&mut self) -> Option<PlaybackState> {
    match self.state {
      PlaybackState::Playing => self.transition(PlaybackState::Paused),
      PlaybackState::Paused => self.transition(PlaybackState::Playing),
      PlaybackState::Stopped => None,
    }
  }

  fn transition(&mut self, next: PlaybackState) -> Option<PlaybackState> {
    let changed = next != self.state;
    self.state = next;
    self.publish();
    changed.then_some(next)
  }

  fn publish(&self) {
    self.shared.publish(self.state, self.loading);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_initial_state() {
    let shared = SharedState::new();
    let machine = PlaybackMachine::new(shared.clone());
    assert_eq!(machine.state(), PlaybackState::Stopped);
    assert_eq!(shared.state(), PlaybackState::Stopped);
    assert!(!machine.can_answer_queries());
  }

  #[test]
  fn test_transitions() {
    let shared = SharedState::new();
    let mut machine = PlaybackMachine::new(shared.clone());

    assert_eq!(machine.toggle(), None);
    assert_eq!(machine.playback_started(), Some(PlaybackState::Playing));
    assert_eq!(machine.toggle(), Some(PlaybackState::Paused));
    assert_eq!(shared.state(), PlaybackState::Paused);
    assert_eq!(machine.toggle(), Some(PlaybackState::Playing));
    assert_eq!(machine.stopped(), Some(PlaybackState::Stopped));
  }

  #[test]
  fn test_same_state_is_not_a_change() {
    let mut machine = PlaybackMachine::new(SharedState::new());
    assert_eq!(machine.stopped(), None);
    machine.playback_started();
    assert_eq!(machine.playback_started(), None);
  }

  #[test]
  fn test_loading_blocks_queries() {
    let shared = SharedState::new();
    let mut machine = PlaybackMachine::new(shared.clone());
    machine.playback_started();
    assert!(machine.can_answer_queries());

    machine.begin_load();
    assert!(shared.is_loading());
    assert!(!machine.can_answer_queries());

    machine.playback_started();
    assert!(!shared.is_loading());
    assert!(machine.can_answer_queries());
  }
}
