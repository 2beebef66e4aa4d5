// THEORY:
// The `RectMerger` collapses the candidate rectangles of one frame into a set of
// de-duplicated regions. Two rectangles belong together when the empty space
// between them is no wider than the merging gap on both axes.
//
// Algorithm steps:
// 1.  **Grouping**: Every pair within the gap is joined in a union-find forest,
//     so grouping is transitive (A~B and B~C puts A, B, C together even if A and
//     C are far apart).
// 2.  **Fixpoint**: Each group is replaced by its union box. A union box can reach
//     rectangles none of its members reached, so grouping runs again on the new
//     boxes until nothing changes.
// 3.  **Clipping & Ordering**: Boxes are clipped to the grid and sorted top-to-
//     bottom then left-to-right, which makes the output independent of input
//     order. Ids are assigned from 1 in that order.

use crate::core_modules::region::{CandidateRegion, GridRect, MergedRegion};

/// Merges nearby rectangles within a fixed grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RectMerger {
    bounds: GridRect,
}

impl RectMerger {
    /// `bounds` is the grid the merged rectangles are clipped to.
    pub fn new(bounds: GridRect) -> Self {
        Self { bounds }
    }

    /// Convenience constructor for a `grid_width` x `grid_height` grid.
    pub fn for_grid(grid_width: u32, grid_height: u32) -> Self {
        Self::new(GridRect::new(0, 0, grid_width as i32, grid_height as i32))
    }

    pub fn bounds(&self) -> GridRect {
        self.bounds
    }

    /// Merges `candidates` whose per-axis gap is at most `gap` cells.
    pub fn merge(&self, candidates: &[CandidateRegion], gap: i32) -> Vec<MergedRegion> {
        let mut rects: Vec<GridRect> = candidates
            .iter()
            .map(|candidate| candidate.rect)
            .filter(|rect| !rect.is_empty())
            .collect();

        loop {
            let merged = merge_pass(&rects, gap);
            if merged.len() == rects.len() {
                rects = merged;
                break;
            }
            rects = merged;
        }

        let mut clipped: Vec<GridRect> = rects
            .iter()
            .filter_map(|rect| self.clip(rect))
            .collect();
        clipped.sort_by_key(|rect| (rect.y, rect.x, rect.height, rect.width));
        clipped.dedup();

        clipped
            .into_iter()
            .enumerate()
            .map(|(index, rect)| MergedRegion {
                id: index as u32 + 1,
                rect,
            })
            .collect()
    }

    fn clip(&self, rect: &GridRect) -> Option<GridRect> {
        let left = rect.x.max(self.bounds.x);
        let top = rect.y.max(self.bounds.y);
        let right = rect.right().min(self.bounds.right());
        let bottom = rect.bottom().min(self.bounds.bottom());
        let clipped = GridRect::new(left, top, right - left, bottom - top);
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// One round of transitive grouping. Returns one union box per group.
fn merge_pass(rects: &[GridRect], gap: i32) -> Vec<GridRect> {
    let mut forest = DisjointSet::new(rects.len());
    for i in 0..rects.len() {
        for j in (i + 1)..rects.len() {
            let (gap_x, gap_y) = rects[i].gap_to(&rects[j]);
            if gap_x <= gap && gap_y <= gap {
                forest.union(i, j);
            }
        }
    }

    let mut groups: Vec<Option<GridRect>> = vec![None; rects.len()];
    for (index, rect) in rects.iter().enumerate() {
        let root = forest.find(index);
        groups[root] = Some(match groups[root] {
            Some(existing) => existing.union(rect),
            None => *rect,
        });
    }
    groups.into_iter().flatten().collect()
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, mut node: usize) -> usize {
        while self.parent[node] != node {
            self.parent[node] = self.parent[self.parent[node]];
            node = self.parent[node];
        }
        node
    }

    fn union(&mut self, a: usize, b: usize) {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a != root_b {
            self.parent[root_b.max(root_a)] = root_a.min(root_b);
        }
    }
}
