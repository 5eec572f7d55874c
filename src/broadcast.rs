//! Periodic broadcasting of tiered area effects from fixed world sources.
//!
//! A [`CapabilitySource`] is a fixed-position structure (a cell of a designated
//! source material standing on concentric layers of a base material) which
//! periodically pushes status effects to nearby actors wearing an attuned item.
//! The [`Broadcaster`] runs on the host's fixed schedule, in two phases:
//!
//! 1. **Index refresh** (rate-limited): re-scan the grid for sources, compute each
//!    source's tier from the layers beneath it, and bucket sources by 16×16 column
//!    so that the application phase looks at a handful of buckets per actor instead
//!    of every source in the world.
//! 2. **Application** (every schedule tick): for each qualifying actor, find
//!    in-range sources in the column neighborhood covering the maximum effective
//!    range and refresh their effects on the actor. Effects are duration-reset,
//!    never accumulated, so leaving range just lets the effect lapse on its own.
//!
//! The refresh phase only reads the grid and tolerates slightly stale data; the
//! application phase mutates actors and therefore belongs to the simulation thread.

use std::time::{Duration, Instant};

use hashbrown::HashMap;

use crate::actor::{Actor, EffectKind};
use crate::cache::ToggleCache;
use crate::capability::{CapabilityRegistry, Level, names};
use crate::config::Config;
use crate::material::Material;
use crate::math::{Cube, FreePoint, GridCoordinate, GridVector};
use crate::space::Space;
use crate::time::{RateLimit, StepStats};

/// Effect kind: accelerated tool use.
pub const HASTE: EffectKind = EffectKind(arcstr::literal!("haste"));
/// Effect kind: reduced incoming damage. Broadcast as the secondary effect of
/// maximum-tier sources.
pub const RESILIENCE: EffectKind = EffectKind(arcstr::literal!("resilience"));

/// The highest tier a source can reach.
pub const MAX_TIER: u8 = 4;

/// A 16×16 column of the world (unbounded vertically), the spatial bucket unit for
/// the source index.
///
/// Column math is just like cube math, but we don't want to confuse the two and
/// forget to multiply or divide.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct ColumnPos {
    /// Column coordinate (cube x divided by the column size).
    pub x: GridCoordinate,
    /// Column coordinate (cube z divided by the column size).
    pub z: GridCoordinate,
}

impl ColumnPos {
    /// Edge length of a column in cubes.
    pub const SIZE: GridCoordinate = 16;

    /// The column containing the given cube.
    #[inline]
    pub fn containing_cube(cube: Cube) -> Self {
        Self {
            x: cube.x.div_euclid(Self::SIZE),
            z: cube.z.div_euclid(Self::SIZE),
        }
    }

    /// The column containing the given point, or [`None`] if the point overflows
    /// cube coordinates.
    #[inline]
    pub fn containing(point: FreePoint) -> Option<Self> {
        Cube::containing(point).map(Self::containing_cube)
    }

    /// The square of columns within `radius` columns of this one (inclusive), this
    /// column included.
    ///
    /// The broadcaster chooses `radius` so that the square covers its maximum
    /// effective range; this is what bounds each actor's lookup to a handful of
    /// buckets instead of a global source scan.
    pub fn neighborhood(self, radius: GridCoordinate) -> impl Iterator<Item = ColumnPos> {
        itertools::iproduct!(-radius..=radius, -radius..=radius).map(move |(dx, dz)| ColumnPos {
            x: self.x + dx,
            z: self.z + dz,
        })
    }
}

impl core::fmt::Debug for ColumnPos {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "ColumnPos({}, {})", self.x, self.z)
    }
}

/// One effect a source broadcasts.
#[derive(Clone, Debug, Eq, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct EffectDescriptor {
    /// What effect to apply.
    pub kind: EffectKind,
    /// At what strength (before any boost).
    pub level: Level,
}

/// A fixed-position tiered effect source, as found by the index refresh.
///
/// Sources are rebuilt from the grid on every refresh and never mutated by actors;
/// a stale index is therefore harmless (it corrects on the next refresh).
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct CapabilitySource {
    /// Where the source cell is.
    pub cube: Cube,
    /// Tier 0–4, derived from the base layers beneath the source.
    pub tier: u8,
    /// The effect every in-range attuned actor receives.
    pub primary: EffectDescriptor,
    /// An additional effect, present only on maximum-tier sources.
    pub secondary: Option<EffectDescriptor>,
}

/// Computes a source's tier by checking concentric square layers of `base` material
/// beneath `cube`: layer n is the (2n+1)×(2n+1) square at depth n. The tier is the
/// number of consecutive fully-valid layers, capped at [`MAX_TIER`].
///
/// The scan is fixed to the −Y direction; tiering sources in other orientations is
/// not supported.
pub fn source_tier(space: &Space, cube: Cube, base: &Material) -> u8 {
    for layer in 1..=GridCoordinate::from(MAX_TIER) {
        for (dx, dz) in itertools::iproduct!(-layer..=layer, -layer..=layer) {
            let Some(below) = cube.checked_add(GridVector::new(dx, -layer, dz)) else {
                return (layer - 1) as u8;
            };
            if space.get(below) != base {
                return (layer - 1) as u8;
            }
        }
    }
    MAX_TIER
}

/// Performance and coverage data returned by [`Broadcaster::run_tick`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub struct BroadcastStepInfo {
    /// Whether this tick performed an index refresh.
    pub refreshed: bool,
    /// Number of sources currently indexed.
    pub sources_indexed: usize,
    /// Number of actors that received at least one effect this tick.
    pub actors_affected: usize,
    /// Number of individual effect applications (refreshes) this tick.
    pub effects_applied: usize,
    /// Time spent in index refreshes.
    pub refresh_time: StepStats,
}

impl core::ops::AddAssign for BroadcastStepInfo {
    fn add_assign(&mut self, other: Self) {
        self.refreshed |= other.refreshed;
        self.sources_indexed = other.sources_indexed;
        self.actors_affected += other.actors_affected;
        self.effects_applied += other.effects_applied;
        self.refresh_time += other.refresh_time;
    }
}

/// The scheduled area-effect job.
///
/// Owns the source index; shares the toggle cache with the
/// [`CapabilityEngine`](crate::engine::CapabilityEngine). Each run is a short,
/// bounded, synchronous unit, so cancelling the host's schedule between runs needs
/// no coordination with this type.
#[derive(Debug)]
pub struct Broadcaster {
    source_material: Material,
    base_material: Material,

    /// Sources bucketed by the column containing them.
    index: HashMap<ColumnPos, Vec<CapabilitySource>>,
    sources_indexed: usize,
    refresh_limit: RateLimit,

    /// Range contributed per tier step: effective base range is
    /// `base_range_per_tier × (tier + 1)`.
    base_range_per_tier: f64,
    /// Range added per attunement level.
    bonus_per_level: f64,
    /// Whether maximum-level attunement earns a one-level effect boost.
    allow_boost: bool,
    /// Duration each application (re)sets on the effect.
    effect_duration: Duration,
}

impl Broadcaster {
    /// Constructs a broadcaster with an empty index.
    ///
    /// `source_material` marks source cells; `base_material` is what the tier
    /// layers beneath them must be made of. Tunables consulted:
    /// `broadcast.refresh-seconds` (default 10), `broadcast.base-range`
    /// (per-tier-step range, default 10), `broadcast.range-bonus-per-level`
    /// (default 10), `broadcast.allow-boost` (default true),
    /// `broadcast.effect-seconds` (default 12).
    pub fn new(config: &Config, source_material: Material, base_material: Material) -> Self {
        let base_range_per_tier = config.float("broadcast.base-range", 10.0).max(0.0);
        let bonus_per_level = config.float("broadcast.range-bonus-per-level", 10.0).max(0.0);
        Self {
            source_material,
            base_material,
            index: HashMap::new(),
            sources_indexed: 0,
            refresh_limit: RateLimit::new(Duration::from_secs(
                config.int("broadcast.refresh-seconds", 10).max(0) as u64,
            )),
            base_range_per_tier,
            bonus_per_level,
            allow_boost: config.bool("broadcast.allow-boost", true),
            effect_duration: Duration::from_secs(
                config.int("broadcast.effect-seconds", 12).max(1) as u64,
            ),
        }
    }

    /// Runs one scheduled tick: a rate-limited index refresh followed by
    /// application to the given actors.
    pub fn run_tick<'a>(
        &mut self,
        space: &Space,
        actors: impl IntoIterator<Item = &'a mut Actor>,
        registry: &CapabilityRegistry,
        toggles: &ToggleCache,
        now: Instant,
    ) -> BroadcastStepInfo {
        let mut info = BroadcastStepInfo::default();
        if self.refresh_limit.ready(now) {
            let start = Instant::now();
            self.refresh_index(space);
            info.refreshed = true;
            info.refresh_time += StepStats::one(start.elapsed());
        }
        info.sources_indexed = self.sources_indexed;
        self.apply(actors, registry, toggles, now, &mut info);
        info
    }

    /// Unconditionally re-scans the grid and rebuilds the source index.
    ///
    /// This phase is read-only with respect to the grid; if it is run from a worker
    /// thread against a snapshot, slightly stale results are acceptable because
    /// sources change rarely and the next refresh corrects them.
    pub fn refresh_index(&mut self, space: &Space) {
        self.index.clear();
        self.sources_indexed = 0;
        for cube in space.bounds().interior_iter() {
            if space.get(cube) != &self.source_material {
                continue;
            }
            let tier = source_tier(space, cube, &self.base_material);
            let source = CapabilitySource {
                cube,
                tier,
                primary: EffectDescriptor {
                    kind: HASTE,
                    level: 1,
                },
                secondary: (tier == MAX_TIER).then_some(EffectDescriptor {
                    kind: RESILIENCE,
                    level: 1,
                }),
            };
            self.index
                .entry(ColumnPos::containing_cube(cube))
                .or_default()
                .push(source);
            self.sources_indexed += 1;
        }
    }

    /// All currently indexed sources in the given column.
    pub fn sources_in(&self, column: ColumnPos) -> &[CapabilitySource] {
        self.index.get(&column).map_or(&[], Vec::as_slice)
    }

    /// The application phase: pushes effects to every qualifying actor near a
    /// source. Mutates actors, so it must run on the simulation thread.
    fn apply<'a>(
        &self,
        actors: impl IntoIterator<Item = &'a mut Actor>,
        registry: &CapabilityRegistry,
        toggles: &ToggleCache,
        now: Instant,
        info: &mut BroadcastStepInfo,
    ) {
        let Some(descriptor) = registry.descriptor(&names::ATTUNEMENT) else {
            // Capability disabled by configuration; the whole job is a no-op.
            return;
        };

        for actor in actors {
            let Some(worn) = actor.worn() else { continue };
            let level = worn
                .capability_level(&names::ATTUNEMENT)
                .min(descriptor.max_level);
            if level == 0 {
                continue;
            }
            if !toggles.is_enabled(actor.id(), &names::ATTUNEMENT, now) {
                continue;
            }
            let position = actor.position();
            let Some(column) = ColumnPos::containing(position) else {
                continue;
            };

            let boost = Level::from(self.allow_boost && level == descriptor.max_level);
            let mut applications: Vec<EffectDescriptor> = Vec::new();
            for neighbor in column.neighborhood(self.column_radius(descriptor.max_level)) {
                for source in self.sources_in(neighbor) {
                    if !self.in_range(source, position, level) {
                        continue;
                    }
                    applications.push(source.primary.clone());
                    if let Some(secondary) = &source.secondary {
                        applications.push(secondary.clone());
                    }
                }
            }

            if applications.is_empty() {
                continue;
            }
            info.actors_affected += 1;
            for effect in applications {
                actor.apply_effect(
                    effect.kind,
                    effect.level + boost,
                    self.effect_duration,
                    now,
                );
                info.effects_applied += 1;
            }
        }
    }

    /// How many columns out from the actor's own the lookup must reach to cover the
    /// maximum possible effective range.
    fn column_radius(&self, max_level: Level) -> GridCoordinate {
        let max_range = self.base_range_per_tier * (f64::from(MAX_TIER) + 1.0)
            + self.bonus_per_level * f64::from(max_level);
        (max_range / f64::from(ColumnPos::SIZE)).ceil() as GridCoordinate
    }

    /// Distance gate: horizontal (XZ-plane) distance only, against
    /// `base_range(tier) + bonus(level)`.
    fn in_range(&self, source: &CapabilitySource, position: FreePoint, level: Level) -> bool {
        let range = self.base_range_per_tier * (f64::from(source.tier) + 1.0)
            + self.bonus_per_level * f64::from(level);
        let center = source.cube.center();
        let dx = position.x - center.x;
        let dz = position.z - center.z;
        dx * dx + dz * dz <= range * range
    }
}
