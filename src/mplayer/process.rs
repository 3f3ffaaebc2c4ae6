//! MPlayer binary detection, spawning and command list discovery.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, Command};

use super::catalog::{CatalogError, CommandCatalog};

#[derive(Error, Debug)]
pub enum ProcessError {
  #[error("MPlayer executable not found")]
  NotFound,
  #[error("Failed to spawn MPlayer: {0}")]
  SpawnFailed(#[from] std::io::Error),
  #[error("MPlayer {0} pipe unavailable")]
  MissingPipe(&'static str),
}

/// Flags that put MPlayer in slave mode and keep it alive between files.
const SLAVE_ARGS: [&str; 3] = ["-idle", "-slave", "-quiet"];

/// Install locations checked when `mplayer` is not on PATH.
fn common_paths() -> &'static [&'static str] {
  if cfg!(windows) {
    &[
      r"C:\Program Files\MPlayer\mplayer.exe",
      r"C:\Program Files (x86)\MPlayer\mplayer.exe",
      r"C:\mplayer\mplayer.exe",
    ]
  } else if cfg!(target_os = "macos") {
    &["/usr/local/bin/mplayer", "/opt/homebrew/bin/mplayer"]
  } else {
    &["/usr/bin/mplayer", "/usr/local/bin/mplayer"]
  }
}

/// Locate the MPlayer executable: PATH first, then [`common_paths`].
pub fn find_mplayer() -> Option<PathBuf> {
  which::which("mplayer").ok().or_else(|| {
    common_paths()
      .iter()
      .map(PathBuf::from)
      .find(|p| p.exists())
  })
}

/// Use the configured path, falling back to detection.
pub fn resolve_mplayer(mplayer_path: Option<&Path>) -> Result<PathBuf, ProcessError> {
  mplayer_path
    .map(Path::to_path_buf)
    .or_else(find_mplayer)
    .ok_or(ProcessError::NotFound)
}

/// Spawn MPlayer in slave mode with piped stdin/stdout.
pub fn spawn_mplayer(mplayer_exe: &Path, extra_args: &[String]) -> Result<Child, ProcessError> {
  log::info!("Spawning MPlayer: {:?}", mplayer_exe);
  if !extra_args.is_empty() {
    log::info!("Extra MPlayer args: {:?}", extra_args);
  }

  let child = Command::new(mplayer_exe)
    .args(SLAVE_ARGS)
    .args(extra_args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::null())
    .kill_on_drop(true)
    .spawn()
    .map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ProcessError::NotFound,
      _ => ProcessError::SpawnFailed(e),
    })?;

  Ok(child)
}

/// Ask the binary for its slave command list (`-input cmdlist`).
pub async fn fetch_catalog(mplayer_exe: &Path) -> Result<CommandCatalog, CatalogError> {
  log::info!("Reading MPlayer command list from {:?}", mplayer_exe);

  let output = Command::new(mplayer_exe)
    .args(["-input", "cmdlist"])
    .stdin(Stdio::null())
    .stderr(Stdio::null())
    .output()
    .await?;

  CommandCatalog::parse(&String::from_utf8_lossy(&output.stdout))
}
