//! # Planner Sync Architecture
//!
//! `plannerapp` is the **UI-agnostic synchronization core** of the academic planner.
//! Students and counselors edit goals, notes, saved programs and profile fields; every
//! surface that shows one of those collections talks to the server through this crate.
//!
//! The whole crate implements one pattern: *optimistic update, server reconciliation,
//! local cache*. Edits show up immediately, are persisted a little later in coalesced
//! batches, and the server's answer is folded back into both the visible state and a
//! TTL-bounded cache that survives restarts.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Surface Layer (sync.rs)                                    │
//! │  - ResourceSync: one per screen / CLI invocation            │
//! │  - load, load_more, create, edit, remove, tick, flush       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Policy Layer (mutator.rs, scheduler.rs, reconcile.rs)      │
//! │  - Two-tier optimistic failure policy                       │
//! │  - Idle/Armed debounce state machine                        │
//! │  - Merge-by-id, the only writer into the cache              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  I/O Layer (remote/, cache/)                                │
//! │  - RemoteStore trait: HttpRemote (prod), MemoryRemote       │
//! │  - CacheBackend trait: FsBackend (prod), MemBackend (tests) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## No I/O Assumptions in Core
//!
//! Nothing here prints, exits or reads the terminal. Time comes from an injected
//! [`clock::Clock`], persistence from an injected [`cache::backend::CacheBackend`] and
//! the network from an injected [`remote::RemoteStore`], so every behaviour is testable
//! with [`clock::ManualClock`], [`cache::mem_backend::MemBackend`] and
//! [`remote::memory::MemoryRemote`].
//!
//! ## Concurrency Model
//!
//! A [`sync::ResourceSync`] is driven cooperatively through `&mut self`: one event at a
//! time, suspending only while awaiting the network or a retry backoff. The
//! [`cache::LocalCache`] is the one value shared between surfaces; its entries are
//! replaced whole under a lock, so readers never observe a torn write.
//!
//! ## Module Overview
//!
//! - [`model`]: Records, schemas, pages and field patches
//! - [`remote`]: The Data Store client contract and its implementations
//! - [`cache`]: TTL-bounded local cache over pluggable backends
//! - [`reconcile`]: Page merging and the cache writer
//! - [`scheduler`]: Debounced persistence
//! - [`view`]: The visible record set of one surface
//! - [`mutator`]: Optimistic apply / confirm / fail
//! - [`sync`]: The per-surface orchestrator
//! - [`commands`]: Structured messages and reports returned to UIs
//! - [`config`], [`init`], [`session`], [`clock`], [`error`]: Ambient plumbing

pub mod cache;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod init;
pub mod model;
pub mod mutator;
pub mod reconcile;
pub mod remote;
pub mod scheduler;
pub mod session;
pub mod sync;
pub mod view;
