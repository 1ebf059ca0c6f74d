//! Live relay log viewer for the HavenKit console
//!
//! A thin, stateless wrapper around `logs -f`: no job lifecycle, no
//! buffering beyond the subprocess pipe. Each connected browser gets its
//! own follower process, reaped when the stream is dropped.

pub mod follow;
pub mod handlers;
pub mod plugin;

pub use follow::{LogFollowError, LogFollowService};
pub use plugin::LogsPlugin;
