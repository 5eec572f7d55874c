//! Capability descriptors, the registry of them, and resolution of which capability
//! applies to a trigger.
//!
//! A *capability* is a named modifier attached to a tool at an integer level
//! (analogous to an enchantment). One generic registry, populated from a
//! declarative built-in list at startup, replaces any per-capability special
//! casing: adding a capability means adding a list entry, not new plumbing.

use core::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arcstr::ArcStr;
use std::collections::BTreeMap;

use crate::actor::{Actor, ActorMode};
use crate::cache::{CooldownCache, ToggleCache};
use crate::config::Config;
use crate::inv::{Tool, ToolKind};

/// Strength of a capability on a tool. Level 0 means “absent”.
pub type Level = u16;

/// Well-known capability names.
pub mod names {
    use arcstr::ArcStr;

    /// Extends a cell removal to the connected region of the same material.
    pub const CHAIN_HARVEST: ArcStr = arcstr::literal!("chain-harvest");
    /// Scales the experience yielded by eliminating an actor.
    pub const REAPING: ArcStr = arcstr::literal!("reaping");
    /// Receives area effects broadcast by capability sources.
    pub const ATTUNEMENT: ArcStr = arcstr::literal!("attunement");

    // Modifier capabilities, read from the same tool as the main capability.

    /// Yield-without-byproduct: cells yield their raw form.
    pub const PRESERVING: ArcStr = arcstr::literal!("preserving");
    /// Quantity multiplier: each cell's standard yield is multiplied by an
    /// independently rolled factor.
    pub const PLENTY: ArcStr = arcstr::literal!("plenty");
    /// Auto-collect: drops go to the actor's inventory instead of the ground.
    pub const MAGNET: ArcStr = arcstr::literal!("magnet");
    /// Experience multiplier, applied once to the accumulated total.
    pub const INSIGHT: ArcStr = arcstr::literal!("insight");
    /// Durability extension: each wear event is skipped with probability
    /// level / (level + 1).
    pub const ENDURANCE: ArcStr = arcstr::literal!("endurance");
}

/// What kind of event a capability reacts to.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum TriggerKind {
    /// A cell was removed by an actor's tool.
    CellRemoved,
    /// An actor was eliminated by another actor's tool.
    ActorEliminated,
    /// Not trigger-dispatched: applied periodically by the spatial broadcaster.
    Broadcast,
}

/// Static definition of one capability: what it reacts to, which tools may carry it,
/// and its tunables as resolved against configuration.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CapabilityDescriptor {
    /// The capability's name, as found on tools and in configuration paths.
    pub name: ArcStr,
    /// What kind of event this capability reacts to.
    pub trigger: TriggerKind,
    /// Tool categories this capability is compatible with.
    pub tool_kinds: &'static [ToolKind],
    /// Levels above this are treated as this.
    pub max_level: Level,
    /// How long the per-actor cooldown lasts after a successful application.
    pub cooldown: Duration,
}

/// Declarative pre-configuration form of a [`CapabilityDescriptor`].
#[derive(Clone, Debug)]
struct DescriptorTemplate {
    name: ArcStr,
    trigger: TriggerKind,
    tool_kinds: &'static [ToolKind],
    max_level: Level,
    default_cooldown: Duration,
}

/// The capabilities this engine ships with.
fn builtin_templates() -> [DescriptorTemplate; 3] {
    [
        DescriptorTemplate {
            name: names::CHAIN_HARVEST,
            trigger: TriggerKind::CellRemoved,
            tool_kinds: &[ToolKind::Pick, ToolKind::Axe, ToolKind::Shovel],
            max_level: 3,
            default_cooldown: Duration::from_secs(30),
        },
        DescriptorTemplate {
            name: names::REAPING,
            trigger: TriggerKind::ActorEliminated,
            tool_kinds: &[ToolKind::Blade],
            max_level: 3,
            default_cooldown: Duration::from_secs(60),
        },
        DescriptorTemplate {
            name: names::ATTUNEMENT,
            trigger: TriggerKind::Broadcast,
            tool_kinds: &[ToolKind::Worn],
            max_level: 3,
            default_cooldown: Duration::ZERO,
        },
    ]
}

/// A registry slot: capabilities are declared up front but only become usable once
/// [`CapabilityRegistry::load`] has resolved them against configuration.
///
/// `Loaded(None)` is the explicit “declared but not available” state (disabled by
/// configuration), as opposed to the never-declared case of a missing map entry.
#[derive(Clone, Debug)]
enum CapabilitySlot {
    Unloaded(DescriptorTemplate),
    Loaded(Option<Arc<CapabilityDescriptor>>),
}

/// All capabilities known to the engine, in two-phase (declare, then load) form.
pub struct CapabilityRegistry {
    slots: BTreeMap<ArcStr, CapabilitySlot>,
}

impl CapabilityRegistry {
    /// Constructs a registry declaring the [built-in capability list](names), with
    /// every slot unloaded. Call [`Self::load`] before use.
    pub fn with_builtin() -> Self {
        Self {
            slots: builtin_templates()
                .into_iter()
                .map(|template| (template.name.clone(), CapabilitySlot::Unloaded(template)))
                .collect(),
        }
    }

    /// Resolves every declared capability against configuration. Idempotent;
    /// typically called once at startup.
    ///
    /// Tunables consulted per capability `<name>`:
    /// `capabilities.<name>.enabled` (default true) and
    /// `capabilities.<name>.cooldown-seconds`.
    pub fn load(&mut self, config: &Config) {
        for (name, slot) in self.slots.iter_mut() {
            let template = match slot {
                CapabilitySlot::Unloaded(template) => template.clone(),
                CapabilitySlot::Loaded(_) => continue,
            };
            let enabled = config.bool(&format!("capabilities.{name}.enabled"), true);
            *slot = CapabilitySlot::Loaded(enabled.then(|| {
                let cooldown_seconds = config.float(
                    &format!("capabilities.{name}.cooldown-seconds"),
                    template.default_cooldown.as_secs_f64(),
                );
                Arc::new(CapabilityDescriptor {
                    name: name.clone(),
                    trigger: template.trigger,
                    tool_kinds: template.tool_kinds,
                    max_level: template.max_level,
                    cooldown: Duration::from_secs_f64(cooldown_seconds.max(0.0)),
                })
            }));
        }
    }

    /// Looks up a loaded capability by name.
    ///
    /// Returns [`None`] both for “declared but disabled” and for “never declared”.
    /// Consulting the registry before [`Self::load`] is a bug in the caller; it is
    /// logged and treated as absent rather than panicking.
    pub fn descriptor(&self, name: &str) -> Option<&Arc<CapabilityDescriptor>> {
        match self.slots.get(name) {
            Some(CapabilitySlot::Loaded(descriptor)) => descriptor.as_ref(),
            Some(CapabilitySlot::Unloaded(_)) => {
                log::error!("capability {name:?} consulted before registry load");
                None
            }
            None => None,
        }
    }

    /// All loaded, available capabilities reacting to the given trigger kind, in
    /// deterministic (name) order.
    pub fn loaded_for(
        &self,
        kind: TriggerKind,
    ) -> impl Iterator<Item = &Arc<CapabilityDescriptor>> + '_ {
        self.slots.values().filter_map(move |slot| match slot {
            CapabilitySlot::Loaded(Some(descriptor)) if descriptor.trigger == kind => {
                Some(descriptor)
            }
            _ => None,
        })
    }

    /// Determines which capability, if any, is active for a trigger of kind `kind`
    /// performed by `actor` with its equipped tool.
    ///
    /// This is a pure read: cooldown and toggle state are consulted but never
    /// written (writes happen only after a successful extension).
    pub fn resolve(
        &self,
        kind: TriggerKind,
        actor: &Actor,
        toggles: &ToggleCache,
        cooldowns: &CooldownCache,
        now: Instant,
    ) -> Result<ResolvedCapability, SkipReason> {
        if actor.mode() != ActorMode::Standard {
            return Err(SkipReason::IneligibleMode);
        }
        let tool = actor.equipped().ok_or(SkipReason::NoTool)?;
        let descriptor = self
            .loaded_for(kind)
            .find(|descriptor| descriptor.tool_kinds.contains(&tool.kind()))
            .ok_or(SkipReason::WrongToolKind)?;

        let level = tool.capability_level(&descriptor.name);
        if level == 0 {
            return Err(SkipReason::NoCapability);
        }
        if !toggles.is_enabled(actor.id(), &descriptor.name, now) {
            return Err(SkipReason::ToggledOff);
        }
        if let Some(remaining) = cooldowns.remaining(actor.id(), &descriptor.name, now) {
            return Err(SkipReason::OnCooldown { remaining });
        }

        Ok(ResolvedCapability {
            level: level.min(descriptor.max_level),
            modifiers: ModifierLevels::from_tool(tool),
            descriptor: descriptor.clone(),
        })
    }
}

impl fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.slots.iter().map(|(name, slot)| {
                (
                    name,
                    match slot {
                        CapabilitySlot::Unloaded(_) => "unloaded",
                        CapabilitySlot::Loaded(Some(_)) => "available",
                        CapabilitySlot::Loaded(None) => "not available",
                    },
                )
            }))
            .finish()
    }
}

/// A successfully resolved capability: what to run and at what strength.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct ResolvedCapability {
    /// The capability to run.
    pub descriptor: Arc<CapabilityDescriptor>,
    /// Effective level (clamped to the descriptor's maximum).
    pub level: Level,
    /// Levels of the co-located modifier capabilities on the same tool.
    pub modifiers: ModifierLevels,
}

/// Levels of the modifier capabilities found alongside a resolved capability on the
/// same tool. Zero means the modifier is absent.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct ModifierLevels {
    /// [`names::PRESERVING`].
    pub preserving: Level,
    /// [`names::PLENTY`].
    pub plenty: Level,
    /// [`names::MAGNET`].
    pub magnet: Level,
    /// [`names::INSIGHT`].
    pub insight: Level,
    /// [`names::ENDURANCE`].
    pub endurance: Level,
}

impl ModifierLevels {
    /// Reads all modifier levels from the given tool.
    pub fn from_tool(tool: &Tool) -> Self {
        Self {
            preserving: tool.capability_level(&names::PRESERVING),
            plenty: tool.capability_level(&names::PLENTY),
            magnet: tool.capability_level(&names::MAGNET),
            insight: tool.capability_level(&names::INSIGHT),
            endurance: tool.capability_level(&names::ENDURANCE),
        }
    }
}

/// Why a trigger produced no extension.
///
/// Most of these are routine (“the tool just doesn't have the capability”); none are
/// errors.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum SkipReason {
    /// The trigger occurred inside an in-progress `Applying` phase on this thread
    /// (a synthetic mutation observed as a new trigger) and was suppressed.
    Reentrant,
    /// The actor's mode does not participate in capabilities.
    IneligibleMode,
    /// The actor has nothing equipped.
    NoTool,
    /// No available capability for this trigger kind accepts the equipped tool's
    /// category.
    WrongToolKind,
    /// The tool does not carry the capability.
    NoCapability,
    /// The actor has disabled the capability.
    ToggledOff,
    /// A previous application's cooldown has not yet expired.
    OnCooldown {
        /// Time left until the capability may fire again.
        remaining: Duration,
    },
    /// The region search found no connected cells beyond the trigger itself.
    NoChain,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorId;
    use crate::cache::CachePolicy;
    use crate::config::TableConfig;
    use crate::math::FreePoint;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn loaded_registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::with_builtin();
        registry.load(&Config::defaults());
        registry
    }

    fn caches() -> (ToggleCache, CooldownCache) {
        let policy = CachePolicy {
            ttl: None,
            capacity: 100,
        };
        (ToggleCache::new(policy), CooldownCache::new(policy))
    }

    fn standard_actor_with_tool(tool: Tool) -> Actor {
        let mut actor = Actor::new(ActorId(1), FreePoint::new(0., 0., 0.));
        actor.equip(Some(tool));
        actor
    }

    #[test]
    fn descriptor_before_load_is_absent() {
        let registry = CapabilityRegistry::with_builtin();
        assert!(registry.descriptor("chain-harvest").is_none());
    }

    #[test]
    fn load_resolves_builtin() {
        let registry = loaded_registry();
        let descriptor = registry.descriptor("chain-harvest").unwrap();
        assert_eq!(descriptor.trigger, TriggerKind::CellRemoved);
        assert_eq!(descriptor.cooldown, Duration::from_secs(30));
    }

    #[test]
    fn config_can_disable_and_retune() {
        let config = TableConfig::new()
            .with_bool("capabilities.reaping.enabled", false)
            .with_float("capabilities.chain-harvest.cooldown-seconds", 3.0)
            .build();
        let mut registry = CapabilityRegistry::with_builtin();
        registry.load(&config);
        assert!(registry.descriptor("reaping").is_none());
        assert_eq!(
            registry.descriptor("chain-harvest").unwrap().cooldown,
            Duration::from_secs(3)
        );
    }

    #[test]
    fn load_is_idempotent() {
        let mut registry = CapabilityRegistry::with_builtin();
        registry.load(&Config::defaults());
        let first = registry.descriptor("chain-harvest").unwrap().clone();
        registry.load(
            &TableConfig::new()
                .with_float("capabilities.chain-harvest.cooldown-seconds", 99.0)
                .build(),
        );
        assert_eq!(registry.descriptor("chain-harvest").unwrap(), &first);
    }

    #[test]
    fn resolve_success_reads_modifiers() {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let actor = standard_actor_with_tool(
            Tool::new(ToolKind::Pick, 100)
                .with_capability(names::CHAIN_HARVEST, 2)
                .with_capability(names::PLENTY, 3)
                .with_capability(names::ENDURANCE, 1),
        );
        let resolved = registry
            .resolve(
                TriggerKind::CellRemoved,
                &actor,
                &toggles,
                &cooldowns,
                Instant::now(),
            )
            .unwrap();
        assert_eq!(resolved.level, 2);
        assert_eq!(
            resolved.modifiers,
            ModifierLevels {
                plenty: 3,
                endurance: 1,
                ..ModifierLevels::default()
            }
        );
    }

    #[test]
    fn resolve_clamps_level() {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let actor = standard_actor_with_tool(
            Tool::new(ToolKind::Pick, 100).with_capability(names::CHAIN_HARVEST, 200),
        );
        let resolved = registry
            .resolve(
                TriggerKind::CellRemoved,
                &actor,
                &toggles,
                &cooldowns,
                Instant::now(),
            )
            .unwrap();
        assert_eq!(resolved.level, 3);
    }

    #[rstest]
    #[case::observer(ActorMode::Observer)]
    #[case::builder(ActorMode::Builder)]
    fn resolve_ineligible_mode(#[case] mode: ActorMode) {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let mut actor = standard_actor_with_tool(
            Tool::new(ToolKind::Pick, 100).with_capability(names::CHAIN_HARVEST, 1),
        );
        actor.set_mode(mode);
        assert_eq!(
            registry.resolve(
                TriggerKind::CellRemoved,
                &actor,
                &toggles,
                &cooldowns,
                Instant::now()
            ),
            Err(SkipReason::IneligibleMode)
        );
    }

    #[test]
    fn resolve_failure_ladder() {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let now = Instant::now();

        // Nothing equipped.
        let bare = Actor::new(ActorId(1), FreePoint::new(0., 0., 0.));
        assert_eq!(
            registry.resolve(TriggerKind::CellRemoved, &bare, &toggles, &cooldowns, now),
            Err(SkipReason::NoTool)
        );

        // A blade cannot chain-harvest.
        let blade = standard_actor_with_tool(
            Tool::new(ToolKind::Blade, 100).with_capability(names::CHAIN_HARVEST, 1),
        );
        assert_eq!(
            registry.resolve(TriggerKind::CellRemoved, &blade, &toggles, &cooldowns, now),
            Err(SkipReason::WrongToolKind)
        );

        // Right kind of tool, no capability on it.
        let plain = standard_actor_with_tool(Tool::new(ToolKind::Pick, 100));
        assert_eq!(
            registry.resolve(TriggerKind::CellRemoved, &plain, &toggles, &cooldowns, now),
            Err(SkipReason::NoCapability)
        );
    }

    /// A toggle-cache miss means enabled; an explicit disable blocks resolution.
    #[test]
    fn resolve_toggle_default_on() {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let now = Instant::now();
        let actor = standard_actor_with_tool(
            Tool::new(ToolKind::Pick, 100).with_capability(names::CHAIN_HARVEST, 1),
        );

        assert!(
            registry
                .resolve(TriggerKind::CellRemoved, &actor, &toggles, &cooldowns, now)
                .is_ok(),
            "no toggle entry must mean enabled"
        );

        toggles.set_enabled(actor.id(), &names::CHAIN_HARVEST, false, now);
        assert_eq!(
            registry.resolve(TriggerKind::CellRemoved, &actor, &toggles, &cooldowns, now),
            Err(SkipReason::ToggledOff)
        );
    }

    #[test]
    fn resolve_respects_cooldown() {
        let registry = loaded_registry();
        let (toggles, cooldowns) = caches();
        let now = Instant::now();
        let actor = standard_actor_with_tool(
            Tool::new(ToolKind::Pick, 100).with_capability(names::CHAIN_HARVEST, 1),
        );

        cooldowns.begin(actor.id(), &names::CHAIN_HARVEST, Duration::from_secs(3), now);
        assert_eq!(
            registry.resolve(
                TriggerKind::CellRemoved,
                &actor,
                &toggles,
                &cooldowns,
                now + Duration::from_secs(1)
            ),
            Err(SkipReason::OnCooldown {
                remaining: Duration::from_secs(2)
            })
        );
        // Expired cooldown no longer blocks.
        assert!(
            registry
                .resolve(
                    TriggerKind::CellRemoved,
                    &actor,
                    &toggles,
                    &cooldowns,
                    now + Duration::from_secs(3)
                )
                .is_ok()
        );
    }
}
