//! Supervise an MPlayer process through its slave-mode text protocol.
//!
//! ```no_run
//! use mplayer_slave::{MPlayer, PlayerConfig, Value};
//!
//! # async fn demo() -> Result<(), mplayer_slave::MPlayerError> {
//! let player = MPlayer::new(PlayerConfig::default());
//! player.start().await?;
//! player.command("loadfile", &["song.mp3".into()]).await?;
//! let position = player.command("get_time_pos", &[]).await?;
//! println!("at {}", position);
//! player.stop().await;
//! # Ok(())
//! # }
//! ```
//!
//! The crate logs through the `log` facade; install a logger in the host.

mod config;
mod mplayer;

pub use config::{ConfigError, PlayerConfig};
pub use mplayer::*;
