//! Supervisor loop driving a slave-mode MPlayer over its stdio pipes.
//!
//! One task owns the player's stdin, the pending-call ledger and the playback
//! state. It waits on two sources: calls submitted by [`Supervisor::submit`] and
//! lines printed by the player, which a separate reader task forwards so that a
//! half-read line is never lost when the other branch wins.
//!
//! Only one query is ever in flight: while a `get_*` line waits for its `ANS`,
//! later queries are held back and dispatched in order once it resolves.
//! Without request ids the ledger could not tell two answers apart otherwise.
//! Commands are never held; they resolve as soon as their line is written.

use std::collections::VecDeque;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::ledger::{Ledger, PendingEntry, Responder};
use super::protocol::{Call, OutputLine, Value};
use super::state::{PlaybackMachine, PlaybackState, SharedState};

/// Unread state notifications kept before the oldest is dropped.
pub const EVENT_CAPACITY: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SupervisorError {
  #[error("Supervisor is not running")]
  Closed,
}

/// A call together with the channel its result goes to.
struct Request {
  call: Call,
  responder: Responder,
}

/// Handle to a running supervisor task.
pub struct Supervisor {
  call_tx: Sender<Request>,
  event_rx: Receiver<PlaybackState>,
  shared: SharedState,
  cancel_token: CancellationToken,
  task_handle: Mutex<Option<JoinHandle<()>>>,
  reader_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Supervisor {
  /// Start supervising a player whose output is `reader` and input is `writer`.
  pub fn spawn<R, W>(reader: R, writer: W) -> Self
  where
    R: tokio::io::AsyncRead + Send + Unpin + 'static,
    W: tokio::io::AsyncWrite + Send + Unpin + 'static,
  {
    let shared = SharedState::new();
    let cancel_token = CancellationToken::new();

    let (call_tx, call_rx) = async_channel::unbounded::<Request>();
    let (event_tx, event_rx) = async_channel::bounded(EVENT_CAPACITY);
    let (line_tx, line_rx) = async_channel::unbounded::<Vec<u8>>();

    let reader_handle = tokio::spawn(async move {
      reader_loop(reader, line_tx).await;
    });

    let worker = Worker {
      writer,
      machine: PlaybackMachine::new(shared.clone()),
      ledger: Ledger::new(),
      held_queries: VecDeque::new(),
      event_tx,
      event_overflow: event_rx.clone(),
      skip_next_line: false,
    };
    let token = cancel_token.clone();
    let task_handle = tokio::spawn(async move {
      worker.run(call_rx, line_rx, token).await;
    });

    Self {
      call_tx,
      event_rx,
      shared,
      cancel_token,
      task_handle: Mutex::new(Some(task_handle)),
      reader_handle: Mutex::new(Some(reader_handle)),
    }
  }

  /// Queue a call and wait for its result.
  pub async fn submit(&self, call: Call) -> Result<Value, SupervisorError> {
    let (responder, rx) = oneshot::channel();
    self
      .call_tx
      .send(Request { call, responder })
      .await
      .map_err(|_| SupervisorError::Closed)?;
    rx.await.map_err(|_| SupervisorError::Closed)
  }

  pub fn state(&self) -> PlaybackState {
    self.shared.state()
  }

  pub fn is_loading(&self) -> bool {
    self.shared.is_loading()
  }

  /// Receiver for playback state changes.
  ///
  /// Holds at most [`EVENT_CAPACITY`] unread changes; older ones are dropped.
  pub fn events(&self) -> Receiver<PlaybackState> {
    self.event_rx.clone()
  }

  /// True once the loop has ended.
  pub fn is_closed(&self) -> bool {
    self.call_tx.is_closed()
  }

  /// Stop the loop, resolving anything outstanding with its default.
  pub async fn shutdown(&self, timeout: Duration) {
    self.cancel_token.cancel();

    let handle = self.task_handle.lock().take();
    if let Some(handle) = handle {
      if tokio::time::timeout(timeout, handle).await.is_err() {
        log::warn!("Supervisor did not stop within {:?}", timeout);
      }
    }

    if let Some(reader) = self.reader_handle.lock().take() {
      reader.abort();
    }
  }
}

impl Drop for Supervisor {
  fn drop(&mut self) {
    self.cancel_token.cancel();
    if let Some(reader) = self.reader_handle.lock().take() {
      reader.abort();
    }
  }
}

/// Forward raw output lines until the pipe closes.
async fn reader_loop<R: tokio::io::AsyncRead + Unpin>(reader: R, line_tx: Sender<Vec<u8>>) {
  log::info!("MPlayer output reader started");
  let mut buf_reader = BufReader::new(reader);

  loop {
    let mut line = Vec::new();
    match buf_reader.read_until(b'\n', &mut line).await {
      Ok(0) => {
        log::info!("MPlayer output closed");
        break;
      }
      Ok(_) => {
        if line_tx.send(line).await.is_err() {
          break;
        }
      }
      Err(e)
        if matches!(
          e.kind(),
          std::io::ErrorKind::Interrupted | std::io::ErrorKind::WouldBlock
        ) =>
      {
        continue;
      }
      Err(e) => {
        log::error!("MPlayer output read error: {}", e);
        break;
      }
    }
  }
}

struct Worker<W> {
  writer: W,
  machine: PlaybackMachine,
  ledger: Ledger,
  /// Queries that arrived while another query was waiting for its answer.
  held_queries: VecDeque<Request>,
  event_tx: Sender<PlaybackState>,
  /// Used to evict the oldest notification when nobody reads them.
  event_overflow: Receiver<PlaybackState>,
  skip_next_line: bool,
}

impl<W: tokio::io::AsyncWrite + Unpin> Worker<W> {
  async fn run(
    mut self,
    call_rx: Receiver<Request>,
    line_rx: Receiver<Vec<u8>>,
    cancel_token: CancellationToken,
  ) {
    log::info!("MPlayer supervisor loop started");

    loop {
      tokio::select! {
        biased;
        _ = cancel_token.cancelled() => {
          log::info!("MPlayer supervisor shutdown requested");
          break;
        }
        line = line_rx.recv() => match line {
          Ok(line) => {
            self.handle_line(&line);
            if !self.dispatch_held().await {
              break;
            }
          }
          Err(_) => {
            log::info!("MPlayer exited");
            self.mark_stopped();
            break;
          }
        },
        request = call_rx.recv() => match request {
          Ok(request) if request.call.is_query() && self.query_in_flight() => {
            log::info!("Holding {} until the outstanding query resolves", request.call.name);
            self.held_queries.push_back(request);
          }
          Ok(request) => {
            if !self.handle_call(request).await {
              break;
            }
          }
          Err(_) => {
            log::info!("Call queue closed");
            break;
          }
        },
      }
    }

    self.ledger.drain_defaults();
    for Request { call, responder } in self.held_queries.drain(..) {
      PendingEntry::new(call.name, call.default, responder).resolve(None);
    }

    // Calls still queued were never dispatched; dropping them fails their callers.
    call_rx.close();
    let mut dropped = 0;
    while call_rx.try_recv().is_ok() {
      dropped += 1;
    }
    if dropped > 0 {
      log::warn!("Dropped {} undispatched calls", dropped);
    }

    log::info!("MPlayer supervisor loop stopped");
  }

  /// Commands pop their entry right away, so anything left is a written query.
  fn query_in_flight(&self) -> bool {
    !self.ledger.is_empty()
  }

  /// Send held queries until one of them is written and awaits its answer.
  async fn dispatch_held(&mut self) -> bool {
    while !self.query_in_flight() {
      let Some(request) = self.held_queries.pop_front() else {
        break;
      };
      if !self.handle_call(request).await {
        return false;
      }
    }
    true
  }

  /// Dispatch one call. Returns false when the player's input is gone.
  async fn handle_call(&mut self, request: Request) -> bool {
    let Request { call, responder } = request;
    log::info!("CALLED: {}", call.line.trim_end());

    self
      .ledger
      .push(PendingEntry::new(call.name.clone(), call.default.clone(), responder));

    if call.is_query() {
      if !self.machine.can_answer_queries() {
        log::info!(
          "Answering {} with default (state: {}, loading: {})",
          call.name,
          self.machine.state().label(),
          self.machine.is_loading()
        );
        self.ledger.answer(None);
        return true;
      }
      if let Err(e) = self.write_line(&call.line).await {
        log::error!("MPlayer write error: {}", e);
        self.ledger.answer(None);
        return false;
      }
      return true;
    }

    if call.is_toggle() {
      if let Some(state) = self.machine.toggle() {
        self.notify(state);
      }
    } else if call.is_load() {
      log::info!("Loading started");
      self.machine.begin_load();
    }

    let written = self.write_line(&call.line).await;
    self.ledger.answer(Some(Value::Null));
    match written {
      Ok(()) => true,
      Err(e) => {
        log::error!("MPlayer write error: {}", e);
        false
      }
    }
  }

  fn handle_line(&mut self, line: &[u8]) {
    log::debug!("MPLAYER: {}", String::from_utf8_lossy(line).trim_end());

    if self.skip_next_line {
      self.skip_next_line = false;
      return;
    }

    match OutputLine::classify(line) {
      OutputLine::PlaybackStarted => {
        let was_loading = self.machine.is_loading();
        if let Some(state) = self.machine.playback_started() {
          self.notify(state);
        }
        if was_loading {
          log::info!("Loading finished");
        }
      }
      OutputLine::Stopped => {
        self.mark_stopped();
        if !self.ledger.is_empty() {
          log::info!("Playback stopped with a query outstanding, sending default");
          self.ledger.answer(None);
        }
      }
      OutputLine::SeekEcho => {
        self.skip_next_line = true;
      }
      OutputLine::Answer(value) => {
        if !self.ledger.answer(Some(value)) {
          log::warn!("Dropping answer with no outstanding query");
        }
      }
      OutputLine::Other => {}
    }
  }

  fn mark_stopped(&mut self) {
    if let Some(state) = self.machine.stopped() {
      self.notify(state);
    }
  }

  fn notify(&self, state: PlaybackState) {
    log::info!("STATE: {}", state.label());
    if let Err(async_channel::TrySendError::Full(state)) = self.event_tx.try_send(state) {
      let _ = self.event_overflow.try_recv();
      let _ = self.event_tx.try_send(state);
    }
  }

  async fn write_line(&mut self, line: &str) -> std::io::Result<()> {
    self.writer.write_all(line.as_bytes()).await?;
    self.writer.flush().await
  }
}
