//! Automatic node placement.
//!
//! Nodes are arranged in depth columns: roots on the left, each link
//! pushing its target at least one column to the right of its source.
//! Graphs with no roots at all (pure cycles) fall back to a plain grid.

use std::collections::VecDeque;

use crate::spec::LinkSpec;

const COLUMN_SPACING: f32 = 300.0;
const ROW_SPACING: f32 = 250.0;

const GRID_PER_ROW: usize = 5;
const GRID_COLUMN_SPACING: f32 = 250.0;
const GRID_ROW_SPACING: f32 = 300.0;

/// Adjacency view of a link list. Links whose indices fall outside the
/// node range are ignored.
pub struct DepthGraph {
    children: Vec<Vec<usize>>,
    parents: Vec<Vec<usize>>,
}

impl DepthGraph {
    pub fn from_links(node_count: usize, links: &[LinkSpec]) -> DepthGraph {
        let mut children = vec![Vec::new(); node_count];
        let mut parents = vec![Vec::new(); node_count];
        for link in links {
            if link.from_node < node_count && link.to_node < node_count {
                children[link.from_node].push(link.to_node);
                parents[link.to_node].push(link.from_node);
            }
        }
        DepthGraph { children, parents }
    }

    pub fn node_count(&self) -> usize {
        self.children.len()
    }

    /// Nodes with no incoming links.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.node_count())
            .filter(|&i| self.parents[i].is_empty())
            .collect()
    }

    /// Longest-path depth from any root. A node on several paths lands at
    /// the deepest one; nodes unreachable from a root stay at depth 0.
    ///
    /// A simple path visits at most `node_count` nodes, so no depth can
    /// exceed `node_count - 1`; candidates past that bound come from a
    /// cycle and are dropped, which also guarantees termination.
    pub fn depths(&self) -> Vec<usize> {
        let max_depth = self.node_count().saturating_sub(1);
        let mut depth = vec![0usize; self.node_count()];
        let mut queue: VecDeque<usize> = self.roots().into();
        while let Some(n) = queue.pop_front() {
            for &child in &self.children[n] {
                let candidate = depth[n] + 1;
                if candidate > depth[child] && candidate <= max_depth {
                    depth[child] = candidate;
                    queue.push_back(child);
                }
            }
        }
        depth
    }
}

/// Positions every node: x by depth column, columns stacked vertically and
/// centered on zero.
pub fn layout(graph: &DepthGraph) -> Vec<(f32, f32)> {
    let n = graph.node_count();
    if n == 0 {
        return Vec::new();
    }
    if graph.roots().is_empty() {
        return grid(n);
    }

    let depths = graph.depths();
    let max_depth = depths.iter().copied().max().unwrap_or(0);

    let mut columns: Vec<Vec<usize>> = vec![Vec::new(); max_depth + 1];
    for (i, &d) in depths.iter().enumerate() {
        columns[d].push(i);
    }

    let mut positions = vec![(0.0f32, 0.0f32); n];
    for (d, column) in columns.iter().enumerate() {
        let x = d as f32 * COLUMN_SPACING;
        let top = (column.len() as f32 - 1.0) * ROW_SPACING / 2.0;
        for (row, &i) in column.iter().enumerate() {
            positions[i] = (x, top - row as f32 * ROW_SPACING);
        }
    }
    positions
}

/// Plain row-major grid, used when depth layout has nothing to anchor on.
pub fn grid(node_count: usize) -> Vec<(f32, f32)> {
    (0..node_count)
        .map(|i| {
            let col = i % GRID_PER_ROW;
            let row = i / GRID_PER_ROW;
            (
                col as f32 * GRID_COLUMN_SPACING,
                -(row as f32) * GRID_ROW_SPACING,
            )
        })
        .collect()
}
