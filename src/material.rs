//! [`Material`]: the type/substance tag carried by each cell of a
//! [`Space`](crate::space::Space).

use core::fmt;

use arcstr::ArcStr;

use crate::inv::Stack;

/// The material which represents the absence of a cell; it cannot be removed and
/// yields nothing.
pub static EMPTY: Material = Material {
    name: arcstr::literal!("empty"),
    attributes: MaterialAttributes {
        removable: false,
        standard_yield: None,
        raw_yield: None,
        experience: 0,
    },
};

/// The substance making up a cell of the world grid.
///
/// Two cells are “the same type” for purposes such as connected-region search exactly
/// when their `Material` values are equal. Materials are cheap to clone; the name is
/// reference-counted and the attributes are small.
#[derive(Clone, Eq, Hash, PartialEq)]
pub struct Material {
    name: ArcStr,
    attributes: MaterialAttributes,
}

impl Material {
    /// Constructs a [`Material`] with the given name and attributes.
    pub fn new(name: impl Into<ArcStr>, attributes: MaterialAttributes) -> Self {
        Self {
            name: name.into(),
            attributes,
        }
    }

    /// Constructs a removable [`Material`] whose standard yield is one item of the
    /// same name, and which grants no experience.
    pub fn solid(name: impl Into<ArcStr>) -> Self {
        let name = name.into();
        Self {
            attributes: MaterialAttributes {
                standard_yield: Some(Stack::new(name.clone(), 1)),
                ..MaterialAttributes::default()
            },
            name,
        }
    }

    /// The material's name.
    pub fn name(&self) -> &ArcStr {
        &self.name
    }

    /// The material's attributes.
    pub fn attributes(&self) -> &MaterialAttributes {
        &self.attributes
    }

    /// Whether this material is [`EMPTY`]'s equal — that is, whether a cell of this
    /// material counts as no cell at all.
    pub fn is_empty(&self) -> bool {
        *self == EMPTY
    }
}

impl fmt::Debug for Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Material({:?})", self.name)
    }
}

/// Properties of a [`Material`] which the engine consults when a cell of it is
/// removed.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[allow(clippy::exhaustive_structs)]
pub struct MaterialAttributes {
    /// Whether cells of this material may be removed at all.
    pub removable: bool,
    /// What removing a cell of this material yields normally. [`None`] yields nothing.
    ///
    /// This is the yield which is subject to quantity multiplication.
    pub standard_yield: Option<Stack>,
    /// What removing a cell of this material yields under a raw-yield (byproduct-
    /// suppressing) modifier. [`None`] falls back to nothing, not to the standard
    /// yield.
    pub raw_yield: Option<Stack>,
    /// Experience granted per cell removed.
    pub experience: u16,
}

impl Default for MaterialAttributes {
    fn default() -> Self {
        Self {
            removable: true,
            standard_yield: None,
            raw_yield: None,
            experience: 0,
        }
    }
}

/// Generate a set of distinct removable [`Material`]s for tests.
///
/// Each is named `material-N` and yields one item of its own name.
#[doc(hidden)]
pub fn make_some_materials<const N: usize>() -> [Material; N] {
    core::array::from_fn(|i| Material::solid(format!("material-{i}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_not_removable() {
        assert!(!EMPTY.attributes().removable);
        assert!(EMPTY.is_empty());
    }

    #[test]
    fn solid_yields_itself() {
        let material = Material::solid("granite");
        assert_eq!(
            material.attributes().standard_yield,
            Some(Stack::new("granite", 1))
        );
        assert!(!material.is_empty());
    }

    #[test]
    fn make_some_materials_distinct() {
        let [a, b, c] = make_some_materials();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, c);
    }
}
