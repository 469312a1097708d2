//! # CLI Behavior
//!
//! This is **one possible UI client** for the planner, not the application itself.
//! The CLI is the only place that knows about terminal I/O, exit codes, and output
//! formatting. For the sync model, see the `plannerapp` crate docs.
//!
//! ## Commands
//!
//! - `planner goals|notes|programs list` shows a resource, from the local cache when
//!   it is fresh. `--refresh` skips the cache, `--all` pages to the end.
//! - `add`, `edit` and `rm` apply the change locally, then close the surface, which
//!   sends the save before the process exits. A save that fails is reported and the
//!   exit code is 1.
//! - `planner profile show|set` reads or edits the single student profile.
//! - `planner cache status|clear` inspects or empties this user's cache directory.
//!
//! When the service cannot be reached, reads fall back to whatever is cached and say
//! so on stderr; they still exit 0.
//!
//! ## Module Structure
//!
//! - `commands`: Per-command handlers that drive the sync surfaces
//! - `render`: Output formatting (lists, profile, cache table, messages)
//! - `setup`: Argument parsing via clap

mod commands;
mod render;
pub mod setup;

pub use commands::run;
