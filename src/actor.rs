//! [`Actor`]s: controllable entities which hold tools and receive effects.

use core::fmt;
use std::time::{Duration, Instant};

use arcstr::ArcStr;
use hashbrown::HashMap;

use crate::capability::Level;
use crate::inv::{Inventory, Tool};
use crate::math::FreePoint;

/// Number of inventory slots an actor starts with.
const DEFAULT_INVENTORY_SIZE: usize = 36;

/// Unique identifier of an [`Actor`], assigned by the host.
///
/// Identifiers are never reused within one server run; per-actor cache entries are
/// keyed by them.
#[derive(Clone, Copy, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[allow(clippy::exhaustive_structs)]
pub struct ActorId(pub u64);

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

/// The interaction mode an [`Actor`] is in.
///
/// Capabilities only ever act for actors in [`ActorMode::Standard`]; the other modes
/// either bypass the tool rules entirely or cannot affect the world.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ActorMode {
    /// Normal play: tools wear out, capabilities apply.
    Standard,
    /// Unrestricted editing; tool rules are bypassed.
    Builder,
    /// May look but not touch.
    Observer,
}

/// Kind of a status effect an actor can bear, such as those applied by
/// [`broadcast`](crate::broadcast) sources.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct EffectKind(pub(crate) ArcStr);

impl EffectKind {
    /// Constructs an [`EffectKind`] with the given name.
    pub fn new(name: impl Into<ArcStr>) -> Self {
        Self(name.into())
    }

    /// The effect's name.
    pub fn name(&self) -> &ArcStr {
        &self.0
    }
}

impl fmt::Debug for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EffectKind({:?})", self.0)
    }
}

/// A status effect currently borne by an actor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct ActiveEffect {
    /// Strength of the effect.
    pub level: Level,
    /// When the effect lapses unless refreshed.
    pub until: Instant,
}

/// A controllable entity in the world, capable of holding a [`Tool`] and receiving
/// effects.
///
/// Actors are owned by the host (creation and destruction are not this crate's
/// business); the engine borrows them mutably for the duration of a trigger or a
/// broadcast tick.
#[derive(Clone, Debug)]
pub struct Actor {
    id: ActorId,
    position: FreePoint,
    mode: ActorMode,
    equipped: Option<Tool>,
    worn: Option<Tool>,
    inventory: Inventory,
    effects: HashMap<EffectKind, ActiveEffect>,
}

impl Actor {
    /// Constructs an [`Actor`] in [`ActorMode::Standard`] with empty hands and an
    /// empty inventory.
    pub fn new(id: ActorId, position: FreePoint) -> Self {
        Self {
            id,
            position,
            mode: ActorMode::Standard,
            equipped: None,
            worn: None,
            inventory: Inventory::new(DEFAULT_INVENTORY_SIZE),
            effects: HashMap::new(),
        }
    }

    /// The actor's identifier.
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// The actor's position.
    pub fn position(&self) -> FreePoint {
        self.position
    }

    /// Moves the actor.
    pub fn set_position(&mut self, position: FreePoint) {
        self.position = position;
    }

    /// The actor's interaction mode.
    pub fn mode(&self) -> ActorMode {
        self.mode
    }

    /// Changes the actor's interaction mode.
    pub fn set_mode(&mut self, mode: ActorMode) {
        self.mode = mode;
    }

    /// The tool the actor is holding, if any.
    pub fn equipped(&self) -> Option<&Tool> {
        self.equipped.as_ref()
    }

    /// Mutable access to the held tool, for wear.
    pub fn equipped_mut(&mut self) -> Option<&mut Tool> {
        self.equipped.as_mut()
    }

    /// Puts a tool in the actor's hands, returning the previously held one.
    pub fn equip(&mut self, tool: Option<Tool>) -> Option<Tool> {
        core::mem::replace(&mut self.equipped, tool)
    }

    /// The item the actor is wearing, if any.
    pub fn worn(&self) -> Option<&Tool> {
        self.worn.as_ref()
    }

    /// Puts an item on the actor, returning the previously worn one.
    pub fn wear(&mut self, item: Option<Tool>) -> Option<Tool> {
        core::mem::replace(&mut self.worn, item)
    }

    /// The actor's item storage.
    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Mutable access to the actor's item storage.
    pub fn inventory_mut(&mut self) -> &mut Inventory {
        &mut self.inventory
    }

    /// Applies (or refreshes) a status effect: the effect's remaining duration is
    /// reset to `duration` and its level replaced, not accumulated.
    ///
    /// An actor which stops being in range of whatever applies the effect simply
    /// stops receiving refreshes, and the effect lapses at its recorded instant.
    pub fn apply_effect(
        &mut self,
        kind: EffectKind,
        level: Level,
        duration: Duration,
        now: Instant,
    ) {
        self.effects.insert(
            kind,
            ActiveEffect {
                level,
                until: now + duration,
            },
        );
    }

    /// The level of the given effect if it is currently active, else [`None`].
    pub fn effect_level(&self, kind: &EffectKind, now: Instant) -> Option<Level> {
        match self.effects.get(kind) {
            Some(effect) if effect.until > now => Some(effect.level),
            _ => None,
        }
    }

    /// Discards lapsed effects. The host typically calls this once per tick; nothing
    /// else depends on it, since reads check expiry themselves.
    pub fn prune_effects(&mut self, now: Instant) {
        self.effects.retain(|_, effect| effect.until > now);
    }

    /// Number of distinct unexpired effects on this actor.
    pub fn active_effect_count(&self, now: Instant) -> usize {
        self.effects
            .values()
            .filter(|effect| effect.until > now)
            .count()
    }
}
