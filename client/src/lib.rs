//! # Game Client Library
//!
//! Client-side synchronization for a hosted werewolf game. The server owns all
//! game logic; the client polls it for changes, keeps a read-only mirror of the
//! latest state snapshot, and forwards the player's commands.
//!
//! ## Architecture Overview
//!
//! ### Polling
//! A cheap hash endpoint is checked on a self-rescheduling timer. Only when the
//! hash differs from the mirrored one is the full snapshot fetched. A
//! "game not found" answer makes the client join again.
//!
//! ### Snapshot Mirror
//! Each fetched snapshot replaces the previous one wholesale. Readers never see
//! a half-applied update and are told whenever a new snapshot lands.
//!
//! ### Config Reconciliation
//! The game configuration can be edited while the server pushes its own
//! version. A three-way merge against the last sent or adopted value decides
//! whether a push overwrites the local draft or the draft is sent to the
//! server.
//!
//! ### Actions
//! Commands are submitted one at a time. Their effect shows up through the
//! next snapshot, never through optimistic local changes.
//!
//! ## Module Organization
//!
//! ### Config Module (`config`)
//! Session settings and polling intervals.
//!
//! ### Network Module (`network`)
//! The `GameApi` trait and its HTTP implementation:
//! - URL construction with the per-client temporary id
//! - JSON decoding of snapshots and configs
//! - Mapping of non-2xx responses to `ApiError`
//!
//! ### Mirror Module (`mirror`)
//! The shared latest-snapshot cell and its read accessors.
//!
//! ### Sync Module (`sync`)
//! The hash-check cycle and the polling chain built on it.
//!
//! ### Reconciler Module (`reconciler`)
//! The three-way config merge and the task applying it to mirrored snapshots.
//!
//! ### Gateway Module (`gateway`)
//! Single-flight action submission, target selection and the error indicator.
//!
//! ### Overlay Module (`overlay`)
//! Timed overlay shown when the player is dealt into a running game.
//!
//! ### Session Module (`session`)
//! Wires all of the above together for one game.
//!
//! ## Usage Example
//!
//! ```no_run
//! use client::config::ClientConfig;
//! use client::session::Session;
//!
//! # async fn run() -> Result<(), client::network::ApiError> {
//! let session = Session::connect(&ClientConfig::new("http://127.0.0.1:8000", "brave-lunar-wolf"))?;
//! session.start();
//!
//! let mut snapshots = session.mirror().subscribe();
//! while snapshots.changed().await.is_ok() {
//!     println!("Stage is now {:?}", session.mirror().stage());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod gateway;
pub mod mirror;
pub mod network;
pub mod overlay;
pub mod reconciler;
pub mod session;
pub mod sync;
