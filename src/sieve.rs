//! Removal of small label patches from a classified raster.
//!
//! Patches are 4-connected groups of pixels sharing one label. Every patch
//! smaller than the threshold is merged into its largest neighbouring patch,
//! smallest patches first. No-data pixels never change and never absorb a patch.

use log::{debug, info};
use ndarray::Array2;
use std::collections::{BTreeSet, VecDeque};

const UNLABELED: usize = usize::MAX;

struct Patches {
    /// Patch id per pixel, `UNLABELED` for no-data
    ids: Array2<usize>,
    values: Vec<u8>,
    sizes: Vec<usize>,
}

fn find_patches(grid: &Array2<u8>, nodata: u8) -> Patches {
    let (rows, cols) = grid.dim();
    let mut ids = Array2::from_elem((rows, cols), UNLABELED);
    let mut values = Vec::new();
    let mut sizes = Vec::new();
    let mut queue = VecDeque::new();

    for r in 0..rows {
        for c in 0..cols {
            let value = grid[[r, c]];
            if value == nodata || ids[[r, c]] != UNLABELED {
                continue;
            }

            let id = values.len();
            let mut size = 0;
            ids[[r, c]] = id;
            queue.push_back((r, c));

            while let Some((pr, pc)) = queue.pop_front() {
                size += 1;
                for (nr, nc) in neighbours(pr, pc, rows, cols) {
                    if ids[[nr, nc]] == UNLABELED && grid[[nr, nc]] == value {
                        ids[[nr, nc]] = id;
                        queue.push_back((nr, nc));
                    }
                }
            }

            values.push(value);
            sizes.push(size);
        }
    }

    Patches { ids, values, sizes }
}

fn neighbours(
    r: usize,
    c: usize,
    rows: usize,
    cols: usize,
) -> impl Iterator<Item = (usize, usize)> {
    let up = r.checked_sub(1).map(|r| (r, c));
    let down = (r + 1 < rows).then(|| (r + 1, c));
    let left = c.checked_sub(1).map(|c| (r, c));
    let right = (c + 1 < cols).then(|| (r, c + 1));
    [up, down, left, right].into_iter().flatten()
}

fn adjacency(ids: &Array2<usize>, n_patches: usize) -> Vec<BTreeSet<usize>> {
    let (rows, cols) = ids.dim();
    let mut adjacent = vec![BTreeSet::new(); n_patches];

    for r in 0..rows {
        for c in 0..cols {
            let a = ids[[r, c]];
            if a == UNLABELED {
                continue;
            }
            // Right and down cover every 4-connected pair once
            for (nr, nc) in [(r, c + 1), (r + 1, c)] {
                if nr >= rows || nc >= cols {
                    continue;
                }
                let b = ids[[nr, nc]];
                if b != UNLABELED && b != a {
                    adjacent[a].insert(b);
                    adjacent[b].insert(a);
                }
            }
        }
    }

    adjacent
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

/// Attach root `from` under root `into`
fn merge(
    parent: &mut [usize],
    sizes: &mut [usize],
    adjacent: &mut [BTreeSet<usize>],
    from: usize,
    into: usize,
) {
    parent[from] = into;
    sizes[into] += sizes[from];
    let moved = std::mem::take(&mut adjacent[from]);
    adjacent[into].extend(moved);
}

/// Merge label patches smaller than `min_size` pixels into their largest neighbour.
///
/// A `min_size` of 0 or 1 leaves the grid unchanged.
pub fn sieve(grid: &Array2<u8>, min_size: usize, nodata: u8) -> Array2<u8> {
    if min_size <= 1 {
        return grid.clone();
    }

    let Patches {
        ids,
        values,
        mut sizes,
    } = find_patches(grid, nodata);
    let n_patches = values.len();
    let mut adjacent = adjacency(&ids, n_patches);
    let mut parent: Vec<usize> = (0..n_patches).collect();

    let mut order: Vec<usize> = (0..n_patches).filter(|&p| sizes[p] < min_size).collect();
    order.sort_by_key(|&p| (sizes[p], p));
    debug!(
        "Sieve: {} patches, {} below {} pixels",
        n_patches,
        order.len(),
        min_size
    );

    let mut merged = 0;
    for patch in order {
        let root = find(&mut parent, patch);
        if sizes[root] >= min_size {
            continue;
        }

        let candidates: BTreeSet<usize> = adjacent[root]
            .iter()
            .map(|&q| find(&mut parent, q))
            .filter(|&q| q != root)
            .collect();

        let target = candidates.iter().copied().max_by(|&a, &b| {
            sizes[a]
                .cmp(&sizes[b])
                .then_with(|| values[b].cmp(&values[a]))
                .then_with(|| b.cmp(&a))
        });
        let Some(target) = target else {
            continue;
        };

        let value = values[target];
        merge(&mut parent, &mut sizes, &mut adjacent, root, target);
        merged += 1;

        // Other neighbours with the same value are now connected to the target
        for &other in &candidates {
            let other_root = find(&mut parent, other);
            if other_root != target && values[other_root] == value {
                merge(&mut parent, &mut sizes, &mut adjacent, other_root, target);
            }
        }
    }

    info!("Sieve merged {} patches smaller than {} pixels", merged, min_size);

    let mut out = grid.clone();
    for ((r, c), &id) in ids.indexed_iter() {
        if id != UNLABELED {
            let root = find(&mut parent, id);
            out[[r, c]] = values[root];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_disabled() {
        let grid = arr2(&[[0u8, 1], [1, 0]]);
        assert_eq!(sieve(&grid, 0, 255), grid);
        assert_eq!(sieve(&grid, 1, 255), grid);
    }

    #[test]
    fn test_single_pixel_removed() {
        let grid = arr2(&[
            [0u8, 0, 0, 0],
            [0, 1, 0, 0],
            [0, 0, 0, 0],
        ]);
        let out = sieve(&grid, 2, 255);
        assert!(out.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_merges_into_largest_neighbour() {
        let grid = arr2(&[
            [0u8, 0, 0, 2, 2],
            [0, 0, 1, 2, 2],
            [0, 0, 0, 2, 2],
        ]);
        // Patch of 1 touches 0 (8 pixels) and 2 (6 pixels)
        let out = sieve(&grid, 2, 255);
        assert_eq!(out[[1, 2]], 0);
        assert_eq!(out[[0, 3]], 2);
    }

    #[test]
    fn test_large_patches_kept() {
        let grid = arr2(&[
            [0u8, 0, 1, 1],
            [0, 0, 1, 1],
        ]);
        assert_eq!(sieve(&grid, 4, 255), grid);
    }

    #[test]
    fn test_nodata_untouched() {
        let grid = arr2(&[
            [255u8, 255, 255],
            [255, 3, 255],
            [0, 0, 0],
        ]);
        let out = sieve(&grid, 3, 255);
        assert_eq!(out[[0, 0]], 255);
        assert_eq!(out[[1, 0]], 255);
        // The lone 3 only touches the 0 row
        assert_eq!(out[[1, 1]], 0);
    }

    #[test]
    fn test_isolated_small_patch_stays() {
        let grid = arr2(&[
            [255u8, 255, 255],
            [255, 4, 255],
            [255, 255, 255],
        ]);
        assert_eq!(sieve(&grid, 5, 255), grid);
    }

    #[test]
    fn test_diagonal_is_not_connected() {
        let grid = arr2(&[
            [1u8, 0, 0],
            [0, 1, 0],
            [0, 0, 0],
        ]);
        let out = sieve(&grid, 2, 255);
        assert!(out.iter().all(|&v| v == 0));
    }
}
