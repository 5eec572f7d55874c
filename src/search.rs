//! Bounded connected-region search over the cell grid.

use std::collections::VecDeque;

use hashbrown::HashSet;

use crate::material::Material;
use crate::math::{Cube, GridVector};
use crate::space::Space;

/// Finds the connected region of cells matching `material`, starting from `origin`,
/// using 26-neighbor adjacency (the 3×3×3 neighborhood minus the center).
///
/// Returns the visited cells in breadth-first discovery order, beginning with
/// `origin`, with no duplicates; the vector therefore doubles as the result set.
/// The origin is included unconditionally — in the intended use the trigger cell
/// has often already been removed by the time the search runs — but every *other*
/// member currently matches `material`.
///
/// Only matching cells are ever marked visited. This asymmetry is load-bearing:
/// counting non-matching neighbors against the bound would silently truncate
/// legitimate matches long before `max_nodes` of them had been found, since most of
/// each cell's 26 neighbors are typically non-matching.
///
/// Traversal stops when the queue empties or `max_nodes` cells have been visited,
/// so the result never exceeds `max_nodes`. Deterministic given a fixed grid.
/// The `&Space` borrow enforces that the grid cannot be mutated mid-search.
pub fn find_connected(
    space: &Space,
    origin: Cube,
    material: &Material,
    max_nodes: usize,
) -> Vec<Cube> {
    let mut found: Vec<Cube> = Vec::new();
    if max_nodes == 0 {
        return found;
    }

    let mut visited: HashSet<Cube> = HashSet::new();
    let mut queue: VecDeque<Cube> = VecDeque::new();
    visited.insert(origin);
    found.push(origin);
    queue.push_back(origin);

    'traversal: while let Some(cube) = queue.pop_front() {
        for offset in neighbor_offsets() {
            let Some(neighbor) = cube.checked_add(offset) else {
                continue;
            };
            if visited.contains(&neighbor) {
                continue;
            }
            if space.get(neighbor) != material {
                // Not marked visited: non-matching cells never join the set, and
                // never count against the bound.
                continue;
            }
            if found.len() >= max_nodes {
                break 'traversal;
            }
            visited.insert(neighbor);
            found.push(neighbor);
            queue.push_back(neighbor);
        }
    }

    found
}

/// The 26 offsets of the 3×3×3 neighborhood, in a fixed deterministic order.
fn neighbor_offsets() -> impl Iterator<Item = GridVector> {
    itertools::iproduct!(-1..=1, -1..=1, -1..=1)
        .filter(|&offset| offset != (0, 0, 0))
        .map(|(dx, dy, dz)| GridVector::new(dx, dy, dz))
}
