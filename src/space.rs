//! That which contains many cells: the live game-world grid.

use core::fmt;

use hashbrown::HashMap;

use crate::material::{EMPTY, Material};
use crate::math::{Cube, GridAab};

/// Number used to identify distinct materials within a [`Space`].
pub type MaterialIndex = u16;

/// Container for [`Material`]-tagged cells arranged in three-dimensional space.
/// The main “game world” data structure.
///
/// The cells are stored compactly: each distinct material is assigned an index, and
/// the grid contents are an array of indices. A `Space` has no internal locking, and
/// no operations for concurrent access; all mutation must happen on the single
/// simulation thread, which Rust enforces through the `&mut` receiver on [`Space::set`].
pub struct Space {
    bounds: GridAab,

    /// Lookup from `Material` value to the index by which it is represented in
    /// the array.
    material_to_index: HashMap<Material, MaterialIndex>,
    /// Lookup from arbitrarily assigned indices (used in `contents`) to data for them.
    palette: Vec<SpaceMaterialData>,

    /// The cells in the space, stored as indices into `self.palette`.
    ///
    /// Coordinates are transformed to indices by [`GridAab::index`].
    contents: Box<[MaterialIndex]>,
}

/// Information about the interpretation of a material index within a [`Space`];
/// chiefly, the material itself and its usage count.
#[derive(Clone, Debug, Eq, PartialEq)]
struct SpaceMaterialData {
    material: Material,
    /// Number of uses of this material in the space.
    count: usize,
}

impl Space {
    /// Constructs a [`Space`] that is entirely filled with [`EMPTY`].
    ///
    /// Panics if the volume of `bounds` exceeds `usize::MAX`.
    pub fn empty(bounds: GridAab) -> Space {
        let volume = bounds.volume().expect("Space volume too large");

        Space {
            bounds,
            material_to_index: {
                let mut map = HashMap::new();
                map.insert(EMPTY.clone(), 0);
                map
            },
            palette: vec![SpaceMaterialData {
                material: EMPTY.clone(),
                count: volume,
            }],
            contents: vec![0; volume].into_boxed_slice(),
        }
    }

    /// Constructs a `Space` that is entirely empty and whose coordinate system
    /// is in the +X+Y+Z octant. This is a shorthand intended mainly for tests.
    pub fn empty_positive(wx: u32, wy: u32, wz: u32) -> Space {
        Space::empty(GridAab::from_lower_size([0, 0, 0], [wx, wy, wz]))
    }

    /// Returns the [`GridAab`] describing the bounds of this space; no cells may
    /// exist outside it.
    pub fn bounds(&self) -> GridAab {
        self.bounds
    }

    /// Gets the material of the cell at the given position.
    ///
    /// If the position is out of bounds, returns [`EMPTY`].
    #[inline]
    pub fn get(&self, cube: Cube) -> &Material {
        match self.bounds.index(cube) {
            Some(index) => &self.palette[usize::from(self.contents[index])].material,
            None => &EMPTY,
        }
    }

    /// Replace the material in this space at the given position.
    ///
    /// Returns `Ok(true)` if the cell was changed, `Ok(false)` if it already contained
    /// the given material.
    pub fn set(&mut self, cube: Cube, material: &Material) -> Result<bool, SetCellError> {
        let contents_index = self
            .bounds
            .index(cube)
            .ok_or(SetCellError::OutOfBounds(self.bounds))?;

        let old_material_index = self.contents[contents_index];
        if self.palette[usize::from(old_material_index)].material == *material {
            // No change.
            return Ok(false);
        }

        // Find or allocate an index for the new material. This must be done before
        // other mutations since it can fail.
        let new_material_index = self.ensure_material_index(material)?;

        // Decrement count of old material, freeing its entry if it hits zero.
        let old_data = &mut self.palette[usize::from(old_material_index)];
        old_data.count -= 1;
        if old_data.count == 0 {
            self.material_to_index.remove(&old_data.material);
            *old_data = SpaceMaterialData::tombstone();
        }

        // Increment count of new material and write the actual change.
        self.palette[usize::from(new_material_index)].count += 1;
        self.contents[contents_index] = new_material_index;

        Ok(true)
    }

    /// Finds or assigns an index to denote the material.
    ///
    /// The caller is responsible for incrementing the entry's `count`.
    fn ensure_material_index(&mut self, material: &Material) -> Result<MaterialIndex, SetCellError> {
        if let Some(&index) = self.material_to_index.get(material) {
            return Ok(index);
        }
        // Look for if there is a previously used index to take.
        if let Some(reusable) = self.palette.iter().position(|data| data.count == 0) {
            let index = reusable as MaterialIndex;
            self.palette[reusable] = SpaceMaterialData {
                material: material.clone(),
                count: 0,
            };
            self.material_to_index.insert(material.clone(), index);
            return Ok(index);
        }
        if self.palette.len() >= usize::from(MaterialIndex::MAX) + 1 {
            return Err(SetCellError::TooManyMaterials());
        }
        let index = self.palette.len() as MaterialIndex;
        self.palette.push(SpaceMaterialData {
            material: material.clone(),
            count: 0,
        });
        self.material_to_index.insert(material.clone(), index);
        Ok(index)
    }

    /// Returns all distinct materials currently present in the space, in unspecified
    /// order.
    pub fn distinct_materials(&self) -> Vec<Material> {
        self.palette
            .iter()
            .filter(|data| data.count > 0)
            .map(|data| data.material.clone())
            .collect()
    }

    #[cfg(test)]
    #[track_caller]
    pub(crate) fn consistency_check(&self) {
        let mut problems = Vec::new();

        let mut actual_counts: HashMap<MaterialIndex, usize> = HashMap::new();
        for index in self.contents.iter().copied() {
            *actual_counts.entry(index).or_insert(0) += 1;
        }

        // Check that the palette has only correct counts.
        for (index, data) in self.palette.iter().enumerate() {
            let index = index as MaterialIndex;
            let actual_count = actual_counts.remove(&index).unwrap_or(0);
            if data.count != actual_count {
                problems.push(format!(
                    "index {index} appears {actual_count} times but {data:?}"
                ));
            }
        }

        // Check that the palette isn't missing any indices that appeared in contents.
        // (The previous section should have drained actual_counts.)
        if !actual_counts.is_empty() {
            problems.push(format!(
                "indices not present in palette: {actual_counts:?}"
            ));
        }

        // Check the reverse mapping.
        for (material, &index) in self.material_to_index.iter() {
            let data = self.palette.get(usize::from(index));
            if Some(material) != data.map(|data| &data.material) {
                problems.push(format!(
                    "material_to_index[{material:?}] points to {index} : {data:?}"
                ));
            }
        }

        if !problems.is_empty() {
            panic!(
                "Space consistency check failed:\n • {}\n",
                problems.join("\n • ")
            );
        }
    }
}

impl SpaceMaterialData {
    /// Value used to fill freed entries in the palette.
    fn tombstone() -> Self {
        Self {
            material: EMPTY.clone(),
            count: 0,
        }
    }
}

impl fmt::Debug for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Make the assumption that a Space is too big to print in its entirety.
        f.debug_struct("Space")
            .field("bounds", &self.bounds)
            .field("palette", &self.palette)
            .finish_non_exhaustive()
    }
}

/// Ways that [`Space::set`] can fail to make a change.
///
/// Note that “already contained the given material” is considered a success.
#[derive(Clone, Debug, Eq, Hash, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum SetCellError {
    /// The given cube is out of the bounds of this space.
    #[error("{0:?} does not contain the requested cube")]
    OutOfBounds(GridAab),
    /// More distinct materials were used than currently supported.
    #[error("more than {} distinct materials is not supported", u32::from(MaterialIndex::MAX) + 1)]
    TooManyMaterials(),
}
