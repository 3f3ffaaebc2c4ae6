//! Caller-facing MPlayer handle.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Receiver;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::process::Child;

use super::catalog::{CatalogError, CommandCatalog};
use super::process::{fetch_catalog, resolve_mplayer, spawn_mplayer, ProcessError};
use super::protocol::{encode, CallOptions, EncodeError, Value};
use super::state::PlaybackState;
use super::supervisor::Supervisor;
use crate::config::PlayerConfig;

#[derive(Error, Debug)]
pub enum MPlayerError {
  #[error("Process error: {0}")]
  Process(#[from] ProcessError),
  #[error("Command list error: {0}")]
  Catalog(#[from] CatalogError),
  #[error(transparent)]
  Encode(#[from] EncodeError),
  #[error("MPlayer instance not running")]
  NotRunning,
}

/// Supervised MPlayer process.
#[derive(Clone)]
pub struct MPlayer {
  config: Arc<RwLock<PlayerConfig>>,
  catalog: Arc<RwLock<Option<Arc<CommandCatalog>>>>,
  process: Arc<Mutex<Option<Child>>>,
  supervisor: Arc<Mutex<Option<Arc<Supervisor>>>>,
}

impl MPlayer {
  pub fn new(config: PlayerConfig) -> Self {
    Self {
      config: Arc::new(RwLock::new(config)),
      catalog: Arc::new(RwLock::new(None)),
      process: Arc::new(Mutex::new(None)),
      supervisor: Arc::new(Mutex::new(None)),
    }
  }

  /// Replace the configuration (path and args take effect on next start).
  ///
  /// A different executable path discards the cached command list.
  pub fn set_config(&self, config: PlayerConfig) {
    let mut current = self.config.write();
    if current.mplayer_path() != config.mplayer_path() {
      log::info!("MPlayer path changed, command list will be reloaded");
      *self.catalog.write() = None;
    }
    *current = config;
  }

  pub fn config(&self) -> PlayerConfig {
    self.config.read().clone()
  }

  /// Spawn MPlayer and start supervising it.
  ///
  /// The command list is read on first start and reused afterwards.
  pub async fn start(&self) -> Result<(), MPlayerError> {
    let running = self.supervisor.lock().is_some();
    if running {
      log::warn!("start() called while running, stopping the old instance first");
      self.stop().await;
    }

    let (mplayer_path, extra_args) = {
      let config = self.config.read();
      (config.mplayer_path(), config.mplayer_args.clone())
    };
    let mplayer_exe = resolve_mplayer(mplayer_path.as_deref())?;

    let cached = self.catalog.read().clone();
    if cached.is_none() {
      let catalog = fetch_catalog(&mplayer_exe).await?;
      *self.catalog.write() = Some(Arc::new(catalog));
    }

    let mut child = spawn_mplayer(&mplayer_exe, &extra_args)?;
    let stdin = child
      .stdin
      .take()
      .ok_or(ProcessError::MissingPipe("stdin"))?;
    let stdout = child
      .stdout
      .take()
      .ok_or(ProcessError::MissingPipe("stdout"))?;

    log::info!("MPlayer started (pid: {:?})", child.id());
    *self.process.lock() = Some(child);
    *self.supervisor.lock() = Some(Arc::new(Supervisor::spawn(stdout, stdin)));
    Ok(())
  }

  /// Stop supervising and kill the process.
  pub async fn stop(&self) {
    let timeout = Duration::from_millis(self.config.read().stop_timeout_ms);

    let supervisor = self.supervisor.lock().take();
    if let Some(supervisor) = supervisor {
      supervisor.shutdown(timeout).await;
    }

    let child = self.process.lock().take();
    if let Some(mut child) = child {
      match child.try_wait() {
        Ok(Some(status)) => log::info!("MPlayer already exited with: {}", status),
        _ => {
          log::info!("Killing MPlayer process (pid: {:?})", child.id());
          match child.kill().await {
            Ok(()) => log::info!("MPlayer process killed"),
            Err(e) => log::error!("kill() failed: {}", e),
          }
        }
      }
    }

    log::info!("MPlayer stopped");
  }

  /// Kill and respawn; playback state starts over as stopped.
  pub async fn restart(&self) -> Result<(), MPlayerError> {
    self.stop().await;
    self.start().await
  }

  /// True while the process is alive and supervised.
  pub fn is_running(&self) -> bool {
    self.running_supervisor().is_ok()
  }

  fn running_supervisor(&self) -> Result<Arc<Supervisor>, MPlayerError> {
    let supervisor = self
      .supervisor
      .lock()
      .clone()
      .ok_or(MPlayerError::NotRunning)?;
    if supervisor.is_closed() {
      return Err(MPlayerError::NotRunning);
    }

    let mut process = self.process.lock();
    let child = process.as_mut().ok_or(MPlayerError::NotRunning)?;
    match child.try_wait() {
      Ok(None) => Ok(supervisor),
      Ok(Some(status)) => {
        log::info!("MPlayer exited with: {}", status);
        Err(MPlayerError::NotRunning)
      }
      Err(e) => {
        log::error!("try_wait() failed: {}", e);
        Err(MPlayerError::NotRunning)
      }
    }
  }

  /// Send `name` with positional `args` and wait for the correlated result.
  ///
  /// Commands resolve to [`Value::Null`]; `get_*` queries resolve to the
  /// player's answer, or to the default when it cannot answer.
  pub async fn call(
    &self,
    name: &str,
    args: &[Value],
    options: CallOptions,
  ) -> Result<Value, MPlayerError> {
    let supervisor = self.running_supervisor()?;
    let catalog = self.catalog().ok_or(MPlayerError::NotRunning)?;
    let defaults = self.config.read().call_defaults();

    let call = encode(&catalog, name, args, &options, &defaults)?;
    supervisor
      .submit(call)
      .await
      .map_err(|_| MPlayerError::NotRunning)
  }

  /// [`MPlayer::call`] with the configured defaults.
  pub async fn command(&self, name: &str, args: &[Value]) -> Result<Value, MPlayerError> {
    self.call(name, args, CallOptions::default()).await
  }

  pub fn state(&self) -> PlaybackState {
    self
      .supervisor
      .lock()
      .as_ref()
      .map(|s| s.state())
      .unwrap_or(PlaybackState::Stopped)
  }

  pub fn is_loading(&self) -> bool {
    self
      .supervisor
      .lock()
      .as_ref()
      .is_some_and(|s| s.is_loading())
  }

  /// Playback state changes of the current process.
  pub fn events(&self) -> Option<Receiver<PlaybackState>> {
    self.supervisor.lock().as_ref().map(|s| s.events())
  }

  /// Commands the binary accepts, once started.
  pub fn catalog(&self) -> Option<Arc<CommandCatalog>> {
    self.catalog.read().clone()
  }
}
