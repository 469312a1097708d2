//! # Planner CLI
//!
//! The binary is intentionally thin: the CLI lives in `src/cli/`, while this file
//! only invokes `cli::run()` and handles process termination.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  CLI Layer (crates/planner/src/cli/)                     │
//! │  - clap argument parsing (setup.rs)                      │
//! │  - Surface wiring + dispatch (commands.rs)               │
//! │  - Terminal rendering (render.rs)                        │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Sync Layer (crates/plannerapp/src/sync.rs)              │
//! │  - Optimistic edits, debounced saves, retry policy       │
//! │  - Structured `SyncReport` results                       │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Cache + Remote (crates/plannerapp/src/{cache,remote})   │
//! │  - TTL cache on disk, HTTP client for the Data Store     │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
