//! Interfaces to the collaborators surrounding the engine.
//!
//! The engine never talks to the outside world directly; the host supplies
//! implementations of these traits. Every call is cheap from the engine's point of
//! view: nothing here may block. Implementations which need to do I/O must hand the
//! work off (fire-and-forget) rather than perform it inline, because these methods
//! are called during the simulation tick.

use core::fmt;

use arcstr::ArcStr;

use crate::actor::ActorId;
use crate::math::Cube;

/// Recipient of a message sent through a [`NotificationSink`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum NoticeTarget {
    /// One specific actor.
    Actor(ActorId),
    /// Everyone the host considers in scope (e.g. all connected operators).
    Broadcast,
}

/// Authority which may veto the engine's synthetic cell mutations.
///
/// Consulted once per cell during an extension's `Applying` phase. A veto is an
/// expected, local outcome: the engine skips that cell only and continues.
pub trait PermissionAuthority: fmt::Debug + Send + Sync {
    /// Whether `actor` may have the engine act on `cube` on its behalf.
    fn may_apply(&self, actor: ActorId, cube: Cube) -> bool;
}

/// A [`PermissionAuthority`] which vetoes nothing.
#[derive(Clone, Copy, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct AllowAll;

impl PermissionAuthority for AllowAll {
    fn may_apply(&self, _actor: ActorId, _cube: Cube) -> bool {
        true
    }
}

/// Fire-and-forget outbound messages (cooldown notices, breakage warnings, results).
///
/// `message_key` names a message in the host's localization layer; `args` are its
/// substitution parameters. The engine never waits for, or learns of, delivery.
pub trait NotificationSink: fmt::Debug + Send + Sync {
    /// Delivers (or queues, or drops) one message.
    fn notify(&self, target: NoticeTarget, message_key: &str, args: &[ArcStr]);
}

/// A [`NotificationSink`] which discards all messages; suitable for filling the
/// parameter when no sink is wired up.
#[derive(Clone, Copy, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn notify(&self, _target: NoticeTarget, _message_key: &str, _args: &[ArcStr]) {}
}

/// Optional persistence for per-actor toggle state.
///
/// Reads are best-effort: a [`None`] simply leaves the cache cold and the default
/// policy (enabled) in force. Writes are fire-and-forget; the engine never learns
/// whether they succeeded.
pub trait StateStore: fmt::Debug + Send + Sync {
    /// Loads the actor's saved toggle preferences, if available right now.
    fn load_state(&self, actor: ActorId) -> Option<Vec<(ArcStr, bool)>>;

    /// Records one toggle preference.
    fn save_state(&self, actor: ActorId, capability: &ArcStr, enabled: bool);
}

/// A [`StateStore`] which stores nothing.
#[derive(Clone, Copy, Debug, Default)]
#[allow(clippy::exhaustive_structs)]
pub struct NoStore;

impl StateStore for NoStore {
    fn load_state(&self, _actor: ActorId) -> Option<Vec<(ArcStr, bool)>> {
        None
    }

    fn save_state(&self, _actor: ActorId, _capability: &ArcStr, _enabled: bool) {}
}
