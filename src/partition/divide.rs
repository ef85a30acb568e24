use std::ops::Range;

use super::prefix_sum::{edges_before, find_index_prefix_sum, DivisionWeights, EdgePrefixSum, SubRange};

/// Cumulative block boundaries giving each division its share of the weight.
///
/// Division `id` owns blocks `[bounds[id - 1], bounds[id])` (lower bound 0 for
/// the first division); the total number of blocks is the last bound.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScaleFactor {
    bounds: Vec<u64>,
}

impl ScaleFactor {
    /// One block per division.
    pub fn uniform(divisions: usize) -> Self {
        ScaleFactor {
            bounds: (1..=divisions as u64).collect(),
        }
    }

    /// Relative per-division block counts, e.g. `[1, 2, 1]` gives the middle
    /// division twice the weight of the others.
    pub fn from_weights(weights: &[u64]) -> Self {
        let mut total = 0;
        let bounds = weights
            .iter()
            .map(|w| {
                total += w;
                total
            })
            .collect();
        ScaleFactor { bounds }
    }

    /// Already cumulative boundaries.
    pub fn from_cumulative(bounds: Vec<u64>) -> Self {
        assert!(
            bounds.windows(2).all(|w| w[0] <= w[1]),
            "scale factor boundaries must be non-decreasing: {bounds:?}"
        );
        ScaleFactor { bounds }
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn num_blocks(&self) -> u64 {
        self.bounds.last().copied().unwrap_or(0)
    }

    /// `(lower, upper)` block boundary of division `id`.
    pub fn block_bounds(&self, id: usize) -> (u64, u64) {
        let lower = if id == 0 { 0 } else { self.bounds[id - 1] };
        (lower, self.bounds[id])
    }
}

/// Nodes and edges owned by one division.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GraphRange {
    pub nodes: Range<u64>,
    pub edges: Range<u64>,
}

impl GraphRange {
    pub fn empty() -> Self {
        GraphRange {
            nodes: 0..0,
            edges: 0..0,
        }
    }
}

/// Contiguous nodes and edges of division `id` out of `total`, balancing
/// `num_nodes * weights.node + (num_edges + 1) * weights.edge` across the
/// blocks named by `scale_factor` (uniform when `None`).
///
/// `window` lets the division run over a sub-range of a larger global
/// prefix sum; returned ranges are relative to the window.
pub fn divide_nodes_binary_search<P: EdgePrefixSum + ?Sized>(
    num_nodes: u64,
    num_edges: u64,
    weights: DivisionWeights,
    id: usize,
    total: usize,
    prefix: &P,
    scale_factor: Option<&ScaleFactor>,
    window: SubRange,
) -> GraphRange {
    if num_nodes == 0 {
        return GraphRange::empty();
    }

    assert!(
        weights.node != 0 || weights.edge != 0,
        "node and edge weight cannot both be zero"
    );
    assert!(total >= 1, "need at least one division");
    assert!(id < total, "division {id} out of range for {total} divisions");

    let uniform;
    let scale_factor = match scale_factor {
        Some(scale_factor) => {
            assert_eq!(
                scale_factor.len(),
                total,
                "scale factor must name one boundary per division"
            );
            scale_factor
        }
        None => {
            uniform = ScaleFactor::uniform(total);
            &uniform
        }
    };

    let weight = num_nodes * weights.node + (num_edges + 1) * weights.edge;
    let num_blocks = scale_factor.num_blocks();
    assert!(num_blocks >= 1, "scale factor assigns no blocks");
    let block_weight = weight.div_ceil(num_blocks);

    let (block_lower, block_upper) = scale_factor.block_bounds(id);
    assert!(
        block_lower <= block_upper,
        "block lower bound {block_lower} exceeds upper bound {block_upper}"
    );

    let nodes_lower = if block_lower == 0 {
        0
    } else {
        find_index_prefix_sum(
            weights,
            block_weight * block_lower,
            0,
            num_nodes,
            prefix,
            window,
        )
    };
    let nodes_upper = find_index_prefix_sum(
        weights,
        block_weight * block_upper,
        nodes_lower,
        num_nodes,
        prefix,
        window,
    );

    let edges_lower = edges_before(prefix, nodes_lower, window);
    let edges_upper = edges_before(prefix, nodes_upper, window);

    GraphRange {
        nodes: nodes_lower..nodes_upper,
        edges: edges_lower..edges_upper,
    }
}

/// Contiguous share `id` of `total` of the items behind `prefix`, cut where
/// the running edge count first reaches `k * num_edges / total`.
///
/// Targets are exact ratios compared as `edges * total >= k * num_edges`, so
/// every share differs from `num_edges / total` by less than the largest
/// single item. The last share always ends at `num_items`.
pub fn divide_prefix_sum<P: EdgePrefixSum + ?Sized>(
    num_items: u64,
    num_edges: u64,
    id: usize,
    total: usize,
    prefix: &P,
) -> GraphRange {
    assert!(total >= 1, "need at least one division");
    assert!(id < total, "division {id} out of range for {total} divisions");
    if num_items == 0 {
        return GraphRange::empty();
    }

    let weights = DivisionWeights::new(0, total as u64);
    let boundary = |k: usize, lb: u64| {
        if k == 0 {
            0
        } else if k == total {
            num_items
        } else {
            find_index_prefix_sum(
                weights,
                k as u64 * num_edges,
                lb,
                num_items,
                prefix,
                SubRange::default(),
            )
        }
    };

    let lower = boundary(id, 0);
    let upper = boundary(id + 1, lower);
    GraphRange {
        nodes: lower..upper,
        edges: edges_before(prefix, lower, SubRange::default())
            ..edges_before(prefix, upper, SubRange::default()),
    }
}

/// `units + 1` node boundaries splitting `[0, num_nodes)` into `units`
/// pieces of roughly equal `edges + node_alpha * nodes` weight.
pub fn determine_unit_ranges<P: EdgePrefixSum + ?Sized>(
    units: usize,
    prefix: &P,
    num_nodes: u64,
    node_alpha: u64,
) -> Vec<u64> {
    assert!(units > 0, "need at least one unit");

    let mut ranges = vec![0u64; units + 1];
    if num_nodes == 0 {
        return ranges;
    }

    let num_edges = prefix.edge_prefix_sum(num_nodes - 1);
    let weights = DivisionWeights::new(node_alpha, 1);
    for i in 0..units {
        let split = divide_nodes_binary_search(
            num_nodes,
            num_edges,
            weights,
            i,
            units,
            prefix,
            None,
            SubRange::default(),
        )
        .nodes;

        if split.start != split.end {
            debug_assert_eq!(ranges[i], split.start);
            ranges[i + 1] = split.end;
        } else {
            // unit got no nodes
            ranges[i + 1] = ranges[i];
        }
    }

    unit_range_sanity(units, 0, num_nodes, &ranges);
    ranges
}

/// Checks that `ranges` are `units + 1` non-decreasing boundaries from
/// `begin` to `end`.
pub fn unit_range_sanity(units: usize, begin: u64, end: u64, ranges: &[u64]) {
    assert_eq!(ranges.len(), units + 1, "expected {} boundaries", units + 1);
    assert_eq!(ranges[0], begin, "first boundary must be {begin}");
    assert_eq!(ranges[units], end, "last boundary must be {end}");
    for (i, pair) in ranges.windows(2).enumerate() {
        assert!(
            pair[0] <= pair[1],
            "unit {i} boundaries out of order: {} > {}",
            pair[0],
            pair[1]
        );
    }
}
