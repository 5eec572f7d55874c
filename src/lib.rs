//! Capability Engine is the world-effect subsystem of a server for worlds made of
//! cubical cells: it reacts to world-mutation events (a cell being removed, an actor
//! being eliminated) by resolving which “capabilities” (enchantment-like modifiers)
//! are active on the acting actor's equipped tool, executing a bounded
//! connected-region extension of that action, and periodically broadcasting tiered
//! area effects from fixed world sources to nearby actors.
//!
//! This crate defines the engine core only. The command front end, localization,
//! persistent storage, and event-dispatch plumbing are external collaborators,
//! consumed through the narrow interfaces in [`host`] and [`config`].
//!
//! ## Data model
//!
//! * A [`Space`] is a 3D array of [`Material`]-tagged cells — the live game world
//!   grid. It has no internal locking; all mutation happens on the single
//!   simulation thread, enforced by `&mut` borrows.
//! * An [`Actor`] is a controllable entity with a position, an equipped [`Tool`],
//!   optionally a worn item, and an [`Inventory`]. Actors are externally owned;
//!   the engine borrows them for the duration of a trigger.
//! * A [`Tool`] carries capability levels (name → integer level) and a durability
//!   budget which the engine consumes.
//! * The [`CapabilityEngine`] is the entry point for trigger dispatch;
//!   the [`Broadcaster`] is the entry point for the scheduled area-effect job.
//! * [`StateCache`] instances hold per-actor cooldown and toggle state, and are the
//!   only structures in this crate intended to be shared across threads.
//!
//! ## Dependencies and global state
//!
//! `capability_engine` avoids having any global state other than the per-thread
//! reentrancy flag in [`engine`]. It writes log messages using the [`log`] crate and
//! is therefore subject to that global configuration.
//!
//! [`Space`]: crate::space::Space
//! [`Material`]: crate::material::Material
//! [`Actor`]: crate::actor::Actor
//! [`Tool`]: crate::inv::Tool
//! [`Inventory`]: crate::inv::Inventory
//! [`CapabilityEngine`]: crate::engine::CapabilityEngine
//! [`Broadcaster`]: crate::broadcast::Broadcaster
//! [`StateCache`]: crate::cache::StateCache

// Basic lint settings, which should be identical across all project crates.
// This list is sorted.
#![allow(clippy::collapsible_else_if)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::needless_update)]
#![allow(clippy::single_match)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![forbid(unsafe_code)]
#![warn(clippy::cast_lossless)]
#![warn(clippy::doc_markdown)]
#![warn(clippy::exhaustive_enums)]
#![warn(clippy::exhaustive_structs)]
#![warn(clippy::modulo_arithmetic)]
#![warn(clippy::return_self_not_must_use)]
#![warn(clippy::uninlined_format_args)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::wrong_self_convention)]
#![warn(explicit_outlives_requirements)]
#![warn(missing_debug_implementations)]
#![warn(missing_docs)]
#![warn(noop_method_call)]
#![warn(trivial_numeric_casts)]
#![warn(unused_extern_crates)]
#![warn(unused_lifetimes)]
// Lenience for tests.
#![cfg_attr(test,
    allow(clippy::float_cmp), // deterministic tests
    allow(clippy::redundant_clone), // prefer regularity over efficiency
)]

pub mod actor;
pub mod broadcast;
pub mod cache;
pub mod capability;
pub mod config;
pub mod engine;
pub mod host;
pub mod inv;
pub mod material;
pub mod math;
pub mod search;
pub mod space;
pub mod time;

/// Re-export the version of the `euclid` vector math library we're using.
pub use euclid;
