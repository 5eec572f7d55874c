//! [`Tool`]s, [`Stack`]s of items, and [`Inventory`] for storing them.

use core::fmt;
use std::collections::BTreeMap;

use arcstr::ArcStr;

use crate::capability::Level;

/// Maximum number of items a single inventory slot can hold.
const STACK_LIMIT: u32 = 64;

/// A homogeneous pile of items, identified by name.
///
/// A `Stack` with a count of zero is not meaningful and is never produced by this
/// crate's operations.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct Stack {
    /// What the items are.
    pub item: ArcStr,
    /// How many of them there are.
    pub count: u32,
}

impl Stack {
    /// Constructs a [`Stack`] of `count` × `item`.
    pub fn new(item: impl Into<ArcStr>, count: u32) -> Self {
        Self {
            item: item.into(),
            count,
        }
    }

    /// Returns this stack with its count multiplied by `factor`.
    #[must_use]
    pub fn multiplied(mut self, factor: u32) -> Self {
        self.count = self.count.saturating_mul(factor);
        self
    }
}

/// Category of a [`Tool`], used to decide which capabilities it may carry.
///
/// A capability declares which kinds of tool it is compatible with; for example,
/// a chain-harvest capability on an axe does nothing when the actor removes stone.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[non_exhaustive]
pub enum ToolKind {
    /// Breaks mineral-like cells.
    Pick,
    /// Breaks wood-like cells.
    Axe,
    /// Breaks soil-like cells.
    Shovel,
    /// Used against actors rather than cells.
    Blade,
    /// Not wielded but worn; receives broadcast effects.
    Worn,
}

/// A `Tool` is an object an actor equips to have some effect in the game, such as
/// removing a cell. Tools carry capability levels and a durability budget which the
/// engine consumes.
///
/// Durability is tracked as accumulated damage: a fresh tool has zero damage, and the
/// tool is destroyed when its damage reaches the maximum. Damage never exceeds the
/// maximum (it saturates rather than going out of range).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Tool {
    kind: ToolKind,
    damage: u32,
    max_damage: u32,
    unbreakable: bool,
    capabilities: BTreeMap<ArcStr, Level>,
}

impl Tool {
    /// Constructs an undamaged tool with the given durability budget and no
    /// capabilities.
    pub fn new(kind: ToolKind, max_damage: u32) -> Self {
        Self {
            kind,
            damage: 0,
            max_damage,
            unbreakable: false,
            capabilities: BTreeMap::new(),
        }
    }

    /// Constructs a tool which never takes damage.
    pub fn new_unbreakable(kind: ToolKind) -> Self {
        Self {
            unbreakable: true,
            ..Self::new(kind, 1)
        }
    }

    /// Adds a capability at the given level. Level 0 means “absent” and is not stored.
    #[must_use]
    pub fn with_capability(mut self, name: impl Into<ArcStr>, level: Level) -> Self {
        if level > 0 {
            self.capabilities.insert(name.into(), level);
        }
        self
    }

    /// Sets the accumulated damage; for constructing partly-worn tools.
    ///
    /// Values above the maximum are clamped to it.
    #[must_use]
    pub fn with_damage(mut self, damage: u32) -> Self {
        self.damage = damage.min(self.max_damage);
        self
    }

    /// The tool's category.
    pub fn kind(&self) -> ToolKind {
        self.kind
    }

    /// Remaining durability: the number of further wear events the tool can absorb
    /// before being destroyed. Never negative (saturates at zero).
    pub fn durability_remaining(&self) -> u32 {
        self.max_damage.saturating_sub(self.damage)
    }

    /// Whether the tool has been destroyed by wear.
    pub fn is_destroyed(&self) -> bool {
        !self.unbreakable && self.damage >= self.max_damage
    }

    /// Whether this tool is exempt from wear.
    pub fn is_unbreakable(&self) -> bool {
        self.unbreakable
    }

    /// The level at which this tool carries the named capability, or 0 if it does not.
    pub fn capability_level(&self, name: &str) -> Level {
        self.capabilities.get(name).copied().unwrap_or(0)
    }

    /// All capabilities on this tool, in deterministic (name) order.
    pub fn capabilities(&self) -> impl Iterator<Item = (&ArcStr, Level)> + '_ {
        self.capabilities.iter().map(|(name, &level)| (name, level))
    }

    /// Applies one unit of wear. Returns whether the tool was destroyed by it.
    ///
    /// Unbreakable tools ignore wear entirely.
    pub fn apply_wear(&mut self) -> bool {
        if self.unbreakable {
            return false;
        }
        self.damage = self.damage.saturating_add(1).min(self.max_damage);
        self.is_destroyed()
    }
}

/// A collection of [`Stack`]s in a fixed number of slots.
///
/// Unlike many other game objects, an `Inventory` does not deliver change
/// notifications; its operations report their outcomes directly (in particular,
/// [`Inventory::insert`] returns the overflow) and the owner is responsible for
/// forwarding anything of interest.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Inventory {
    slots: Vec<Option<Stack>>,
}

impl Inventory {
    /// Constructs an [`Inventory`] with the specified number of empty slots.
    ///
    /// Ordinary game actions cannot change the number of slots.
    pub fn new(size: usize) -> Self {
        Self {
            slots: vec![None; size],
        }
    }

    /// The slots and their contents.
    pub fn slots(&self) -> &[Option<Stack>] {
        &self.slots
    }

    /// Inserts items, merging into existing stacks of the same item first and then
    /// filling empty slots. Returns the items that did not fit, if any.
    pub fn insert(&mut self, stack: Stack) -> Option<Stack> {
        let Stack { item, mut count } = stack;
        if count == 0 {
            return None;
        }

        // Top up existing stacks of the same item.
        for slot in self.slots.iter_mut() {
            if count == 0 {
                break;
            }
            if let Some(existing) = slot {
                if existing.item == item && existing.count < STACK_LIMIT {
                    let accepted = count.min(STACK_LIMIT - existing.count);
                    existing.count += accepted;
                    count -= accepted;
                }
            }
        }

        // Start new stacks in empty slots.
        for slot in self.slots.iter_mut() {
            if count == 0 {
                break;
            }
            if slot.is_none() {
                let accepted = count.min(STACK_LIMIT);
                *slot = Some(Stack::new(item.clone(), accepted));
                count -= accepted;
            }
        }

        (count > 0).then(|| Stack::new(item, count))
    }

    /// Total count of the named item across all slots.
    pub fn count_of(&self, item: &str) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.item == item)
            .map(|stack| stack.count)
            .sum()
    }
}

impl fmt::Display for Inventory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let occupied = self.slots.iter().flatten().count();
        write!(f, "Inventory({occupied}/{} slots used)", self.slots.len())
    }
}
