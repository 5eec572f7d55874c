//! The action extension engine: reacts to world-mutation triggers by applying the
//! acting actor's resolved capability to the whole connected region.
//!
//! Each trigger runs the strictly sequential phases
//! `Resolving → (Skipped | Extending) → Applying`; the returned [`Outcome`] reports
//! which terminal state was reached. Nothing in here may abort the surrounding
//! simulation tick: vetoes and tool destruction are expected local outcomes, and
//! unexpected faults during `Applying` are caught at the dispatch boundary, logged,
//! and swallowed (the already-applied effects stand — the original single-cell
//! action completed before the engine was ever involved).

mod guard;

use std::sync::Arc;
use std::time::{Duration, Instant};

use arcstr::ArcStr;
use rand::rngs::SmallRng;
use rand::{Rng as _, SeedableRng as _};

use crate::actor::{Actor, ActorId};
use crate::cache::{CachePolicy, CooldownCache, ToggleCache};
use crate::capability::{
    CapabilityRegistry, ResolvedCapability, SkipReason, TriggerKind,
};
use crate::config::Config;
use crate::host::{
    AllowAll, NoStore, NoticeTarget, NotificationSink, NullSink, PermissionAuthority, StateStore,
};
use crate::inv::Stack;
use crate::material::{EMPTY, Material};
use crate::math::Cube;
use crate::search::find_connected;
use crate::space::{SetCellError, Space};

/// A world-mutation event delivered to the engine by the host's event dispatch.
///
/// The engine's contract starts here: how the host subscribes to and routes its own
/// events is not this crate's business. The acting actor is passed alongside the
/// trigger (mutably, since applying may wear its tool and fill its inventory).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Trigger {
    /// A cell was removed by the actor's tool. `material` is what the cell was made
    /// of before removal.
    CellRemoved {
        /// Where the removed cell was.
        cube: Cube,
        /// What the removed cell was made of.
        material: Material,
    },
    /// An actor was eliminated by the acting actor's tool.
    ActorEliminated {
        /// Where the victim was.
        at: Cube,
        /// The experience the elimination yields before capability scaling.
        base_experience: u32,
    },
}

impl Trigger {
    fn kind(&self) -> TriggerKind {
        match self {
            Trigger::CellRemoved { .. } => TriggerKind::CellRemoved,
            Trigger::ActorEliminated { .. } => TriggerKind::ActorEliminated,
        }
    }
}

/// What a call to [`CapabilityEngine::dispatch`] did.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum Outcome {
    /// No extension ran; the original single-cell action stands untouched.
    Skipped(SkipReason),
    /// An extension ran; the report says what it did.
    Applied(ExtensionReport),
}

/// Accounting of one applied extension.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ExtensionReport {
    /// Which capability ran.
    pub capability: ArcStr,
    /// Cells actually removed (excluding the trigger cell, which the host already
    /// removed).
    pub cells_processed: usize,
    /// Cells skipped because the permission authority vetoed them.
    pub cells_vetoed: usize,
    /// Drops routed into the actor's inventory (auto-collect).
    pub collected: Vec<Stack>,
    /// Drops routed to the world, with the cell each should appear at.
    pub spilled: Vec<(Cube, Stack)>,
    /// Total experience to reward, after the experience multiplier. Spawned as a
    /// single reward at [`Self::experience_at`], not one per cell.
    pub experience: u32,
    /// Where the experience reward appears: the trigger location.
    pub experience_at: Cube,
    /// Whether the tool was destroyed partway through (aborting the remainder).
    pub tool_destroyed: bool,
    /// Whether the region search hit its size bound.
    pub truncated: bool,
}

impl ExtensionReport {
    fn new(capability: ArcStr, experience_at: Cube) -> Self {
        Self {
            capability,
            cells_processed: 0,
            cells_vetoed: 0,
            collected: Vec::new(),
            spilled: Vec::new(),
            experience: 0,
            experience_at,
            tool_destroyed: false,
            truncated: false,
        }
    }
}

/// The capability-triggered world-effect engine.
///
/// One instance serves the whole server. [`Self::dispatch`] must only be called from
/// the single simulation thread (it takes `&mut Space`, which makes anything else a
/// compile error); the cooldown/toggle caches inside are shared with scheduled jobs
/// and synchronize internally.
#[derive(Debug)]
pub struct CapabilityEngine {
    registry: CapabilityRegistry,
    toggles: ToggleCache,
    cooldowns: CooldownCache,
    permissions: Arc<dyn PermissionAuthority>,
    notifier: Arc<dyn NotificationSink>,
    store: Arc<dyn StateStore>,
    max_region: usize,
    rng: SmallRng,
}

impl CapabilityEngine {
    /// Constructs an engine with the built-in capability list resolved against
    /// `config`, and null collaborators (allow-all permissions, discarded
    /// notifications, no persistence). Use the `with_*` methods to wire real ones.
    ///
    /// Tunables consulted here: `extension.max-cells` (default 150),
    /// `state.ttl-seconds` (default 3600), `state.max-entries` (default 4096), and
    /// the per-capability paths documented on
    /// [`CapabilityRegistry::load`].
    pub fn new(config: &Config) -> Self {
        let mut registry = CapabilityRegistry::with_builtin();
        registry.load(config);

        let policy = CachePolicy {
            ttl: Some(Duration::from_secs(
                config.int("state.ttl-seconds", 3600).max(1) as u64,
            )),
            capacity: config.usize("state.max-entries", 4096),
        };

        Self {
            registry,
            toggles: ToggleCache::new(policy),
            cooldowns: CooldownCache::new(policy),
            permissions: Arc::new(AllowAll),
            notifier: Arc::new(NullSink),
            store: Arc::new(NoStore),
            max_region: config.usize("extension.max-cells", 150),
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Replaces the permission authority.
    #[must_use]
    pub fn with_permission_authority(mut self, authority: Arc<dyn PermissionAuthority>) -> Self {
        self.permissions = authority;
        self
    }

    /// Replaces the notification sink.
    #[must_use]
    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.notifier = sink;
        self
    }

    /// Replaces the toggle persistence store.
    #[must_use]
    pub fn with_state_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    /// Reseeds the engine's random source, making yield and durability rolls
    /// reproducible. Intended for deterministic replays and tests.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// The capability registry in use.
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// The toggle cache, for sharing with scheduled jobs such as the
    /// [`Broadcaster`](crate::broadcast::Broadcaster).
    pub fn toggles(&self) -> &ToggleCache {
        &self.toggles
    }

    /// Records an actor's toggle preference and persists it (fire-and-forget).
    pub fn set_toggle(&self, actor: ActorId, capability: &ArcStr, enabled: bool, now: Instant) {
        self.toggles.set_enabled(actor, capability, enabled, now);
        self.store.save_state(actor, capability, enabled);
    }

    /// Warms the toggle cache from persistence when an actor enters. Best-effort:
    /// if the store has nothing (or nothing yet), the default-on policy covers it.
    pub fn actor_entered(&self, actor: ActorId, now: Instant) {
        if let Some(saved) = self.store.load_state(actor) {
            for (capability, enabled) in saved {
                self.toggles.set_enabled(actor, &capability, enabled, now);
            }
        }
    }

    /// Discards all cached state for an actor when it departs. (The actor object
    /// itself is externally owned and not this crate's to destroy.)
    pub fn actor_departed(&self, actor: ActorId) {
        self.toggles.purge_actor(actor);
        self.cooldowns.purge_actor(actor);
    }

    /// Handles one trigger, start to finish.
    ///
    /// Within one trigger, `Resolving → Extending → Applying` runs strictly
    /// sequentially; the reentrancy guard plus single-thread confinement guarantee
    /// it never interleaves with another trigger for the same actor.
    pub fn dispatch(
        &mut self,
        space: &mut Space,
        actor: &mut Actor,
        trigger: &Trigger,
        now: Instant,
    ) -> Outcome {
        // A trigger arriving while this thread is applying is one of our own
        // synthetic mutations echoed back; resolution must not even start.
        if guard::is_active() {
            return Outcome::Skipped(SkipReason::Reentrant);
        }

        // Resolving.
        let resolved = match self.registry.resolve(
            trigger.kind(),
            actor,
            &self.toggles,
            &self.cooldowns,
            now,
        ) {
            Ok(resolved) => resolved,
            Err(reason) => {
                if let SkipReason::OnCooldown { remaining } = &reason {
                    self.notifier.notify(
                        NoticeTarget::Actor(actor.id()),
                        "capability.cooldown",
                        &[ArcStr::from(remaining.as_secs().to_string())],
                    );
                }
                return Outcome::Skipped(reason);
            }
        };

        let outcome = match trigger {
            Trigger::CellRemoved { cube, material } => {
                self.extend_cell_removal(space, actor, &resolved, *cube, material, now)
            }
            Trigger::ActorEliminated {
                at,
                base_experience,
            } => self.extend_elimination(actor, &resolved, *at, *base_experience, now),
        };

        if let Outcome::Applied(report) = &outcome {
            log::trace!(
                "{}: {} cells, {} xp for {:?}",
                report.capability,
                report.cells_processed,
                report.experience,
                actor.id(),
            );
        }
        outcome
    }

    /// `Extending` and `Applying` for a cell-removal trigger.
    fn extend_cell_removal(
        &mut self,
        space: &mut Space,
        actor: &mut Actor,
        resolved: &ResolvedCapability,
        origin: Cube,
        material: &Material,
        now: Instant,
    ) -> Outcome {
        if material.is_empty() {
            return Outcome::Skipped(SkipReason::NoChain);
        }

        // Extending.
        let region = find_connected(space, origin, material, self.max_region);
        if region.len() <= 1 {
            return Outcome::Skipped(SkipReason::NoChain);
        }

        // Applying. The guard must be set before the first synthetic mutation and
        // is released on every exit path, early aborts and faults included.
        let Some(_applying) = guard::enter() else {
            return Outcome::Skipped(SkipReason::Reentrant);
        };

        let mut report = ExtensionReport::new(resolved.descriptor.name.clone(), origin);
        report.truncated = region.len() >= self.max_region;

        if let Err(fault) = self.apply_region(space, actor, resolved, &region, &mut report) {
            // Unexpected internal fault: already-applied effects stand, and the
            // tick must not die.
            log::error!("extension aborted by internal fault: {fault}");
        }

        // The experience multiplier applies once to the accumulated total, and the
        // reward is spawned once at the trigger location — unlike the per-cell
        // quantity rolls above.
        report.experience = report
            .experience
            .saturating_mul(u32::from(resolved.modifiers.insight) + 1);

        self.cooldowns.begin(
            actor.id(),
            &resolved.descriptor.name,
            resolved.descriptor.cooldown,
            now,
        );

        Outcome::Applied(report)
    }

    /// Processes every member of the extended region except the already-removed
    /// origin. Returns `Err` only for faults that should never happen in normal
    /// operation; expected conditions (vetoes, breakage) are handled in place.
    fn apply_region(
        &mut self,
        space: &mut Space,
        actor: &mut Actor,
        resolved: &ResolvedCapability,
        region: &[Cube],
        report: &mut ExtensionReport,
    ) -> Result<(), SetCellError> {
        let modifiers = resolved.modifiers;

        for &cell in &region[1..] {
            // An external authority may veto any single cell; that cell is skipped,
            // the rest continue.
            if !self.permissions.may_apply(actor.id(), cell) {
                report.cells_vetoed += 1;
                continue;
            }

            let material = space.get(cell).clone();
            space.set(cell, &EMPTY)?;
            report.cells_processed += 1;

            // Yield. Raw yield suppresses the byproduct entirely; otherwise each
            // cell rolls its own quantity multiplier.
            let attributes = material.attributes();
            let stack = if modifiers.preserving > 0 {
                attributes.raw_yield.clone()
            } else {
                attributes
                    .standard_yield
                    .clone()
                    .map(|stack| stack.multiplied(self.roll_quantity(modifiers.plenty)))
            };
            if let Some(stack) = stack {
                self.route_drop(actor, cell, stack, modifiers.magnet > 0, report);
            }

            report.experience += u32::from(attributes.experience);

            // Durability, with the probabilistic skip. Destruction aborts the rest
            // of the region immediately.
            if self.roll_wear(modifiers.endurance) {
                let destroyed = actor
                    .equipped_mut()
                    .is_some_and(|tool| tool.apply_wear());
                if destroyed {
                    actor.equip(None);
                    report.tool_destroyed = true;
                    self.notifier.notify(
                        NoticeTarget::Actor(actor.id()),
                        "tool.broken",
                        &[resolved.descriptor.name.clone()],
                    );
                    break;
                }
            }
        }

        Ok(())
    }

    /// `Applying` for an actor-elimination trigger: there is no region to extend,
    /// only the experience scaling and the cooldown.
    fn extend_elimination(
        &mut self,
        actor: &mut Actor,
        resolved: &ResolvedCapability,
        at: Cube,
        base_experience: u32,
        now: Instant,
    ) -> Outcome {
        let Some(_applying) = guard::enter() else {
            return Outcome::Skipped(SkipReason::Reentrant);
        };

        let mut report = ExtensionReport::new(resolved.descriptor.name.clone(), at);
        report.experience =
            base_experience.saturating_mul(u32::from(resolved.modifiers.insight) + 1);

        self.cooldowns.begin(
            actor.id(),
            &resolved.descriptor.name,
            resolved.descriptor.cooldown,
            now,
        );

        Outcome::Applied(report)
    }

    fn route_drop(
        &mut self,
        actor: &mut Actor,
        cell: Cube,
        stack: Stack,
        auto_collect: bool,
        report: &mut ExtensionReport,
    ) {
        if auto_collect {
            match actor.inventory_mut().insert(stack.clone()) {
                None => report.collected.push(stack),
                Some(overflow) => {
                    let kept = stack.count - overflow.count;
                    if kept > 0 {
                        report.collected.push(Stack::new(stack.item.clone(), kept));
                    }
                    // Overflow spills to the world at the cell it came from.
                    report.spilled.push((cell, overflow));
                }
            }
        } else {
            report.spilled.push((cell, stack));
        }
    }

    /// Per-cell quantity multiplier roll: uniform in `1..=level + 1`.
    fn roll_quantity(&mut self, level: u16) -> u32 {
        if level == 0 {
            1
        } else {
            self.rng.random_range(1..=u32::from(level) + 1)
        }
    }

    /// Whether a wear event actually lands. The durability-extension modifier skips
    /// it with probability `level / (level + 1)`.
    fn roll_wear(&mut self, level: u16) -> bool {
        let skip_probability = f64::from(level) / (f64::from(level) + 1.0);
        !self.rng.random_bool(skip_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::ActorMode;
    use crate::capability::names;
    use crate::config::TableConfig;
    use crate::inv::{Tool, ToolKind};
    use crate::material::Material;
    use crate::math::{FreePoint, GridAab};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// A sink which records message keys, for asserting on notifications.
    #[derive(Debug, Default)]
    struct RecordingSink(Mutex<Vec<String>>);
    impl NotificationSink for RecordingSink {
        fn notify(&self, _target: NoticeTarget, message_key: &str, _args: &[ArcStr]) {
            self.0.lock().unwrap().push(message_key.to_owned());
        }
    }
    impl RecordingSink {
        fn keys(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// An authority which vetoes a fixed list of cells.
    #[derive(Debug)]
    struct VetoList(Vec<Cube>);
    impl PermissionAuthority for VetoList {
        fn may_apply(&self, _actor: ActorId, cube: Cube) -> bool {
            !self.0.contains(&cube)
        }
    }

    /// An in-memory store, for testing warm-up and persistence calls.
    #[derive(Debug, Default)]
    struct MemoryStore(Mutex<Vec<(ActorId, ArcStr, bool)>>);
    impl StateStore for MemoryStore {
        fn load_state(&self, actor: ActorId) -> Option<Vec<(ArcStr, bool)>> {
            let rows: Vec<(ArcStr, bool)> = self
                .0
                .lock()
                .unwrap()
                .iter()
                .filter(|(a, _, _)| *a == actor)
                .map(|(_, capability, enabled)| (capability.clone(), *enabled))
                .collect();
            (!rows.is_empty()).then_some(rows)
        }
        fn save_state(&self, actor: ActorId, capability: &ArcStr, enabled: bool) {
            self.0.lock().unwrap().push((actor, capability.clone(), enabled));
        }
    }

    fn engine() -> CapabilityEngine {
        CapabilityEngine::new(
            &TableConfig::new()
                .with_float("capabilities.chain-harvest.cooldown-seconds", 3.0)
                .build(),
        )
        .with_rng_seed(0x5EED)
    }

    fn miner(tool: Tool) -> Actor {
        let mut actor = Actor::new(ActorId(1), FreePoint::new(0.5, 0.5, 0.5));
        actor.equip(Some(tool));
        actor
    }

    fn chain_pick() -> Tool {
        Tool::new(ToolKind::Pick, 1000).with_capability(names::CHAIN_HARVEST, 2)
    }

    /// A space with a +X line of `count` cells of `material`, starting at x = 1.
    /// The trigger cell at the origin is already removed, as it would be in real
    /// dispatch (the host removes it before the engine hears about it).
    fn vein(material: &Material, count: i32) -> (Space, Trigger) {
        let mut space = Space::empty(GridAab::from_lower_size([-1, -1, -1], [40, 3, 3]));
        for x in 1..=count {
            space.set(Cube::new(x, 0, 0), material).unwrap();
        }
        (
            space,
            Trigger::CellRemoved {
                cube: Cube::ORIGIN,
                material: material.clone(),
            },
        )
    }

    fn ore() -> Material {
        Material::new(
            "ore",
            crate::material::MaterialAttributes {
                standard_yield: Some(Stack::new("raw-ore", 1)),
                raw_yield: Some(Stack::new("ore", 1)),
                experience: 3,
                ..Default::default()
            },
        )
    }

    #[test]
    fn applied_extension_removes_whole_vein() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.cells_processed, 5);
        assert_eq!(report.cells_vetoed, 0);
        assert!(!report.truncated);
        for x in 1..=5 {
            assert!(space.get(Cube::new(x, 0, 0)).is_empty(), "cell {x} not removed");
        }
        // No auto-collect: all drops spill to the world.
        assert_eq!(report.collected, Vec::new());
        assert_eq!(report.spilled.len(), 5);
    }

    #[test]
    fn skipped_when_no_chain() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 0);
        let mut actor = miner(chain_pick());
        assert_eq!(
            engine.dispatch(&mut space, &mut actor, &trigger, Instant::now()),
            Outcome::Skipped(SkipReason::NoChain)
        );
    }

    /// Cooldown of 3 s: a second trigger 1 s later is skipped with ≈2 s remaining.
    #[test]
    fn second_trigger_within_cooldown_is_skipped() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 10);
        let mut actor = miner(chain_pick());
        let t0 = Instant::now();

        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0),
            Outcome::Applied(_)
        ));
        assert_eq!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0 + Duration::from_secs(1)),
            Outcome::Skipped(SkipReason::OnCooldown {
                remaining: Duration::from_secs(2)
            })
        );
        // After expiry the capability fires again.
        let (mut space, trigger) = vein(&ore, 10);
        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0 + Duration::from_secs(3)),
            Outcome::Applied(_)
        ));
    }

    /// Tool one wear from destruction, no durability extension, 5-cell vein:
    /// exactly one cell is processed, then the tool breaks and the rest survive.
    #[test]
    fn tool_destruction_aborts_remaining_cells() {
        let sink = Arc::new(RecordingSink::default());
        let mut engine = engine().with_notification_sink(sink.clone());
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let tool = Tool::new(ToolKind::Pick, 100)
            .with_capability(names::CHAIN_HARVEST, 2)
            .with_damage(99);
        let mut actor = miner(tool);

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.cells_processed, 1);
        assert!(report.tool_destroyed);
        assert_eq!(actor.equipped(), None, "destroyed tool must be unequipped");
        // Cells 2..=5 were never processed.
        for x in 2..=5 {
            assert_eq!(space.get(Cube::new(x, 0, 0)), &ore);
        }
        assert!(sink.keys().contains(&"tool.broken".to_owned()));
    }

    #[test]
    fn vetoed_cells_are_skipped_locally() {
        let vetoed = Cube::new(3, 0, 0);
        let mut engine = engine().with_permission_authority(Arc::new(VetoList(vec![vetoed])));
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.cells_processed, 4);
        assert_eq!(report.cells_vetoed, 1);
        assert_eq!(space.get(vetoed), &ore, "vetoed cell must be untouched");
    }

    #[test]
    fn region_bound_truncates() {
        let mut engine = CapabilityEngine::new(
            &TableConfig::new().with_int("extension.max-cells", 4).build(),
        )
        .with_rng_seed(1);
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 10);
        let mut actor = miner(chain_pick());

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        // Region = origin + 3 cells; origin is not processed.
        assert_eq!(report.cells_processed, 3);
        assert!(report.truncated);
    }

    #[test]
    fn experience_multiplier_applies_once_to_total() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick().with_capability(names::INSIGHT, 2));

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        // 5 cells × 3 xp, scaled once by (insight + 1) = 3, at the trigger cell.
        assert_eq!(report.experience, 45);
        assert_eq!(report.experience_at, Cube::ORIGIN);
    }

    #[test]
    fn quantity_multiplier_rolls_per_cell() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 20);
        let mut actor = miner(chain_pick().with_capability(names::PLENTY, 3));

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.spilled.len(), 20);
        // Each cell rolled independently: every count is a legal single roll, and
        // (with this seed and 20 cells) they are not all equal, which a
        // one-roll-scales-all implementation would produce.
        for (_, stack) in &report.spilled {
            assert!((1..=4).contains(&stack.count), "bad roll {}", stack.count);
        }
        let first = report.spilled[0].1.count;
        assert!(
            report.spilled.iter().any(|(_, stack)| stack.count != first),
            "all 20 rolls equal; multiplier looks like a single roll"
        );
    }

    #[test]
    fn preserving_yields_raw_form_unmultiplied() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(
            chain_pick()
                .with_capability(names::PRESERVING, 1)
                .with_capability(names::PLENTY, 3),
        );

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        for (_, stack) in &report.spilled {
            assert_eq!(stack, &Stack::new("ore", 1));
        }
    }

    #[test]
    fn magnet_collects_into_inventory() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick().with_capability(names::MAGNET, 1));

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.spilled, Vec::new());
        assert_eq!(actor.inventory().count_of("raw-ore"), 5);
    }

    #[test]
    fn magnet_overflow_spills_at_cell() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick().with_capability(names::MAGNET, 1));
        // Fill the whole inventory so nothing more fits.
        for i in 0..actor.inventory().slots().len() {
            actor
                .inventory_mut()
                .insert(Stack::new(format!("filler-{i}"), 64));
        }

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, Instant::now());
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.collected, Vec::new());
        assert_eq!(report.spilled.len(), 5);
        assert_eq!(actor.inventory().count_of("raw-ore"), 0);
    }

    #[test]
    fn reentrant_trigger_is_suppressed() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());

        let _applying = guard::enter().unwrap();
        assert_eq!(
            engine.dispatch(&mut space, &mut actor, &trigger, Instant::now()),
            Outcome::Skipped(SkipReason::Reentrant)
        );
        drop(_applying);
        // And the suppression ends with the scope.
        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, Instant::now()),
            Outcome::Applied(_)
        ));
    }

    #[test]
    fn elimination_scales_experience_and_cools_down() {
        let mut engine = engine();
        let mut space = Space::empty_positive(1, 1, 1);
        let mut actor = miner(
            Tool::new(ToolKind::Blade, 100)
                .with_capability(names::REAPING, 1)
                .with_capability(names::INSIGHT, 1),
        );
        let trigger = Trigger::ActorEliminated {
            at: Cube::new(4, 0, 2),
            base_experience: 10,
        };
        let t0 = Instant::now();

        let outcome = engine.dispatch(&mut space, &mut actor, &trigger, t0);
        let Outcome::Applied(report) = outcome else {
            panic!("expected Applied, got {outcome:?}");
        };
        assert_eq!(report.experience, 20);
        assert_eq!(report.experience_at, Cube::new(4, 0, 2));
        assert_eq!(report.cells_processed, 0);

        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0 + Duration::from_secs(1)),
            Outcome::Skipped(SkipReason::OnCooldown { .. })
        ));
    }

    #[test]
    fn observer_mode_is_skipped() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());
        actor.set_mode(ActorMode::Observer);
        assert_eq!(
            engine.dispatch(&mut space, &mut actor, &trigger, Instant::now()),
            Outcome::Skipped(SkipReason::IneligibleMode)
        );
    }

    #[test]
    fn actor_entered_warms_toggles_from_store() {
        let store = Arc::new(MemoryStore::default());
        store
            .0
            .lock()
            .unwrap()
            .push((ActorId(1), names::CHAIN_HARVEST, false));
        let mut engine = engine().with_state_store(store);
        let t0 = Instant::now();
        engine.actor_entered(ActorId(1), t0);

        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());
        assert_eq!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0),
            Outcome::Skipped(SkipReason::ToggledOff)
        );
    }

    #[test]
    fn set_toggle_persists() {
        let store = Arc::new(MemoryStore::default());
        let engine = engine().with_state_store(store.clone());
        engine.set_toggle(ActorId(9), &names::CHAIN_HARVEST, false, Instant::now());
        assert_eq!(
            store.0.lock().unwrap().clone(),
            vec![(ActorId(9), names::CHAIN_HARVEST, false)]
        );
    }

    #[test]
    fn actor_departed_clears_cooldowns() {
        let mut engine = engine();
        let ore = ore();
        let (mut space, trigger) = vein(&ore, 5);
        let mut actor = miner(chain_pick());
        let t0 = Instant::now();

        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0),
            Outcome::Applied(_)
        ));
        engine.actor_departed(actor.id());
        // With the cooldown purged, an immediate re-trigger fires again.
        let (mut space, trigger) = vein(&ore, 5);
        assert!(matches!(
            engine.dispatch(&mut space, &mut actor, &trigger, t0),
            Outcome::Applied(_)
        ));
    }

    /// For durability-extension level L the wear-skip rate converges to L/(L+1),
    /// and level 0 never skips.
    #[test]
    fn wear_skip_rate_converges() {
        let mut engine = CapabilityEngine::new(&Config::defaults()).with_rng_seed(0xD15C);

        for level in 0u16..=3 {
            let trials = 20_000;
            let mut wears = 0;
            for _ in 0..trials {
                if engine.roll_wear(level) {
                    wears += 1;
                }
            }
            let wear_rate = f64::from(wears) / f64::from(trials);
            let expected = 1.0 / (f64::from(level) + 1.0);
            if level == 0 {
                assert_eq!(wears, trials, "level 0 must always wear");
            } else {
                assert!(
                    (wear_rate - expected).abs() < 0.02,
                    "level {level}: wear rate {wear_rate} not near {expected}"
                );
            }
        }
    }
}
