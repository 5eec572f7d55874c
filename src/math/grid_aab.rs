//! Axis-aligned integer-coordinate box volumes ([`GridAab`]), and related algorithms.

use core::fmt;
use core::ops::Range;

use crate::math::{Cube, GridCoordinate, GridPoint, GridSize, GridSizeCoord, GridVector};

/// An axis-aligned box with integer coordinates, whose volume is between 0 and
/// `GridCoordinate::MAX.pow(3)`. [`GridAab`]s are used to specify the coordinate extent
/// of [`Space`](crate::space::Space)s and other discrete-coordinate bounds.
///
/// When we refer to “a cube” in a [`GridAab`], that is a unit cube which is identified
/// by the coordinates of its most negative corner, in the fashion of [`Cube`].
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct GridAab {
    lower_bounds: GridPoint,
    /// Constructor checks ensure this is non-negative and that adding it to
    /// `lower_bounds` will not overflow.
    sizes: GridSize,
}

impl GridAab {
    /// Box containing the unit cube from `[0, 0, 0]` to `[1, 1, 1]`.
    pub const ORIGIN_CUBE: GridAab = GridAab::single_cube(Cube::ORIGIN);

    /// Constructs a [`GridAab`] from coordinate lower bounds and sizes.
    ///
    /// For example, if on one axis the lower bound is 5 and the size is 10,
    /// then the positions where cells can exist are numbered 5 through 14
    /// (inclusive) and the occupied volume spans 5 to 15.
    ///
    /// Panics if the sizes are negative or the resulting range would cause
    /// numeric overflow.
    #[track_caller]
    pub fn from_lower_size(
        lower_bounds: impl Into<GridPoint>,
        sizes: impl Into<GridSize>,
    ) -> Self {
        Self::checked_from_lower_size(lower_bounds.into(), sizes.into())
            .expect("GridAab::from_lower_size() arguments are out of range")
    }

    /// Constructs a [`GridAab`] from inclusive lower bounds and exclusive upper bounds.
    ///
    /// For example, if on one axis the lower bound is 5 and the upper bound is 10,
    /// then the positions where cells can exist are numbered 5 through 9
    /// (inclusive) and the occupied volume spans 5 to 10.
    ///
    /// Panics if the `upper_bounds` are less than the `lower_bounds`.
    #[track_caller]
    pub fn from_lower_upper(
        lower_bounds: impl Into<GridPoint>,
        upper_bounds: impl Into<GridPoint>,
    ) -> GridAab {
        let lower_bounds = lower_bounds.into();
        let upper_bounds = upper_bounds.into();
        let difference = (upper_bounds - lower_bounds)
            .try_cast::<GridSizeCoord>()
            .unwrap_or_else(|| {
                panic!(
                    "GridAab::from_lower_upper() requires lower {lower_bounds:?} \
                     not exceeding upper {upper_bounds:?}"
                )
            });
        GridAab::from_lower_size(
            lower_bounds,
            GridSize::new(difference.x, difference.y, difference.z),
        )
    }

    /// [`Self::from_lower_size`], but returning [`None`] on out-of-range inputs.
    pub fn checked_from_lower_size(lower_bounds: GridPoint, sizes: GridSize) -> Option<Self> {
        // Checks that adding the size to the lower bounds stays in i32 range.
        fn axis_ok(lower: GridCoordinate, size: GridSizeCoord) -> bool {
            GridCoordinate::try_from(size)
                .ok()
                .and_then(|size| lower.checked_add(size))
                .is_some()
        }
        if axis_ok(lower_bounds.x, sizes.width)
            && axis_ok(lower_bounds.y, sizes.height)
            && axis_ok(lower_bounds.z, sizes.depth)
        {
            Some(GridAab {
                lower_bounds,
                sizes,
            })
        } else {
            None
        }
    }

    /// Constructs a [`GridAab`] with a volume of 1, containing the specified cube.
    #[inline]
    pub const fn single_cube(cube: Cube) -> GridAab {
        GridAab {
            lower_bounds: GridPoint::new(cube.x, cube.y, cube.z),
            sizes: GridSize::new(1, 1, 1),
        }
    }

    /// Computes the volume of this box in cubes, i.e. the product of all sizes.
    ///
    /// Returns [`None`] if the volume does not fit in a `usize`.
    pub fn volume(&self) -> Option<usize> {
        let sizes = self.sizes;
        usize::try_from(sizes.width)
            .ok()?
            .checked_mul(usize::try_from(sizes.height).ok()?)?
            .checked_mul(usize::try_from(sizes.depth).ok()?)
    }

    /// Returns whether the box contains no cubes (its volume is zero).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sizes.width == 0 || self.sizes.height == 0 || self.sizes.depth == 0
    }

    /// Inclusive lower bounds on cube coordinates, or the most negative corner of the
    /// box.
    #[inline]
    pub fn lower_bounds(&self) -> GridPoint {
        self.lower_bounds
    }

    /// Exclusive upper bounds on cube coordinates, or the most positive corner of the
    /// box.
    #[inline]
    pub fn upper_bounds(&self) -> GridPoint {
        // Cannot overflow due to constructor-enforced invariants.
        self.lower_bounds
            + GridVector::new(
                self.sizes.width as GridCoordinate,
                self.sizes.height as GridCoordinate,
                self.sizes.depth as GridCoordinate,
            )
    }

    /// Size of the box in each axis.
    #[inline]
    pub fn size(&self) -> GridSize {
        self.sizes
    }

    /// The range of X coordinates for cubes within the box.
    #[inline]
    pub fn x_range(&self) -> Range<GridCoordinate> {
        self.lower_bounds.x..self.upper_bounds().x
    }

    /// The range of Y coordinates for cubes within the box.
    #[inline]
    pub fn y_range(&self) -> Range<GridCoordinate> {
        self.lower_bounds.y..self.upper_bounds().y
    }

    /// The range of Z coordinates for cubes within the box.
    #[inline]
    pub fn z_range(&self) -> Range<GridCoordinate> {
        self.lower_bounds.z..self.upper_bounds().z
    }

    /// Returns whether the box includes the given cube.
    #[inline]
    pub fn contains_cube(&self, cube: Cube) -> bool {
        let point = cube.lower_bounds();
        self.x_range().contains(&point.x)
            && self.y_range().contains(&point.y)
            && self.z_range().contains(&point.z)
    }

    /// Determines the linear index, within the volume of this box, of the given cube.
    ///
    /// Returns [`None`] if `cube` is not within the box. The indexing scheme is
    /// guaranteed to be in X-major, Z-minor order (`[[[0, 1], [2, 3]], [[4, 5], ...`),
    /// matching [`Self::interior_iter`].
    #[inline]
    pub fn index(&self, cube: Cube) -> Option<usize> {
        if !self.contains_cube(cube) {
            return None;
        }
        let sizes = self.sizes;
        let deoffsetted = cube.lower_bounds() - self.lower_bounds;
        Some(
            ((deoffsetted.x as usize * sizes.height as usize) + deoffsetted.y as usize)
                * sizes.depth as usize
                + deoffsetted.z as usize,
        )
    }

    /// Iterate over all cubes within the box, in the same order as [`Self::index`].
    pub fn interior_iter(self) -> GridIter {
        GridIter::new(self)
    }
}

impl fmt::Debug for GridAab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GridAab({:?}, {:?}, {:?})",
            self.x_range(),
            self.y_range(),
            self.z_range()
        )
    }
}

/// Iterator produced by [`GridAab::interior_iter`].
#[derive(Clone, Debug)]
pub struct GridIter {
    x_range: Range<GridCoordinate>,
    y_range: Range<GridCoordinate>,
    z_range: Range<GridCoordinate>,
    cursor: GridPoint,
}

impl GridIter {
    fn new(bounds: GridAab) -> Self {
        Self {
            x_range: bounds.x_range(),
            y_range: bounds.y_range(),
            z_range: bounds.z_range(),
            cursor: if bounds.is_empty() {
                // The iterator works by checking the cursor against the ranges, so
                // an out-of-range start correctly yields nothing.
                GridPoint::new(bounds.x_range().end, bounds.y_range().start, bounds.z_range().start)
            } else {
                bounds.lower_bounds()
            },
        }
    }
}

impl Iterator for GridIter {
    type Item = Cube;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if !self.x_range.contains(&self.cursor.x) {
            return None;
        }
        let result = Cube::from(self.cursor);
        // Advance in Z-minor order.
        self.cursor.z += 1;
        if self.cursor.z >= self.z_range.end {
            self.cursor.z = self.z_range.start;
            self.cursor.y += 1;
            if self.cursor.y >= self.y_range.end {
                self.cursor.y = self.y_range.start;
                self.cursor.x += 1;
            }
        }
        Some(result)
    }
}
