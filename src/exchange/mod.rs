//! Moving every edge to the host that owns its source node.
//!
//! The exchange takes two message rounds. In the count round each host tells
//! every other host how many edges it is about to send it. In the edge round
//! worker threads stream batched `(source, destinations)` records to owners
//! while this host's own edges go straight into its [`LocalAdjacency`]; the
//! driver thread then drains exactly the announced number of edges.

mod adjacency;
mod batch;

pub use adjacency::LocalAdjacency;

use std::time::Instant;

use rayon::prelude::*;

use crate::edge_list::Edge;
use crate::network::{unpack_from, HostContext, Network};
use crate::partition::{worker_slice, NodeMapping};
use batch::SendBatcher;

/// Send buffers towards a host are flushed once they grow past this many bytes.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1400;

/// Host owning `src`; a source outside the mapping is fatal.
pub fn owning_host(mapping: &NodeMapping, src: u64) -> usize {
    mapping
        .owner(src)
        .unwrap_or_else(|| panic!("node {src} has no owning host; mapping covers {} nodes", mapping.total_nodes()))
}

/// Number of local edges owned by each host.
pub fn count_edges_per_host(edges: &[Edge], mapping: &NodeMapping) -> Vec<u64> {
    let num_hosts = mapping.len();
    let workers = rayon::current_num_threads().max(1);
    (0..workers)
        .into_par_iter()
        .map(|w| {
            let mut counts = vec![0u64; num_hosts];
            for edge in worker_slice(edges, w, workers) {
                counts[owning_host(mapping, u64::from(edge.src))] += 1;
            }
            counts
        })
        .reduce(
            || vec![0u64; num_hosts],
            |mut a, b| {
                a.iter_mut().zip(b).for_each(|(x, y)| *x += y);
                a
            },
        )
}

/// Count round: announces per-host edge counts and returns how many edges
/// this host will receive from the others.
pub fn exchange_edge_counts<N: Network>(
    ctx: &mut HostContext<N>,
    edges: &[Edge],
    mapping: &NodeMapping,
) -> u64 {
    let me = ctx.id();
    let per_host = count_edges_per_host(edges, mapping);
    tracing::debug!(host = me, ?per_host, "sending edge counts");
    let incoming = ctx.personalized_all_to_all(&per_host);
    incoming
        .iter()
        .enumerate()
        .filter(|(sender, _)| *sender != me)
        .map(|(_, count)| count)
        .sum()
}

/// Sends every remote edge to its owner and inserts the local ones.
/// Does not receive anything.
pub fn send_assigned_edges<N: Network>(
    ctx: &HostContext<N>,
    edges: &[Edge],
    mapping: &NodeMapping,
    adjacency: &LocalAdjacency,
    flush_threshold: usize,
) {
    let me = ctx.id();
    let workers = rayon::current_num_threads().max(1);
    (0..workers).into_par_iter().for_each(|w| {
        let mut batcher = SendBatcher::new(me, ctx.num(), flush_threshold);
        for edge in worker_slice(edges, w, workers) {
            let src = u64::from(edge.src);
            let owner = owning_host(mapping, src);
            if owner == me {
                adjacency.push(src, edge.dst);
            } else {
                batcher.push(ctx, owner, src, edge.dst);
            }
        }
        batcher.finish(ctx);
    });
}

/// Drains edge records until `edges_to_receive` edges have arrived, then
/// ends the round.
pub fn receive_assigned_edges<N: Network>(
    ctx: &mut HostContext<N>,
    edges_to_receive: u64,
    mapping: &NodeMapping,
    adjacency: &LocalAdjacency,
) {
    let me = ctx.id();
    let mut pending = edges_to_receive;
    while pending > 0 {
        let (sender, payload) = ctx.receive();
        let mut rest = &payload[..];
        while !rest.is_empty() {
            let (src, dsts): (u64, Vec<u32>) = unpack_from(&mut rest);
            assert_eq!(
                owning_host(mapping, src),
                me,
                "host {sender} sent edges of node {src} to the wrong host"
            );
            let received = dsts.len() as u64;
            assert!(
                received <= pending,
                "host {sender} sent more edges than announced"
            );
            pending -= received;
            adjacency.extend(src, &dsts);
        }
    }
    ctx.advance_phase();
}

/// Runs both rounds and returns this host's adjacency.
pub fn exchange_edges<N: Network>(
    ctx: &mut HostContext<N>,
    edges: &[Edge],
    mapping: &NodeMapping,
    flush_threshold: usize,
) -> LocalAdjacency {
    let timer = Instant::now();
    let me = ctx.id();
    let edges_to_receive = exchange_edge_counts(ctx, edges, mapping);
    tracing::debug!(host = me, edges_to_receive, "edge counts exchanged");

    let adjacency = LocalAdjacency::new(mapping.range(me));
    send_assigned_edges(ctx, edges, mapping, &adjacency, flush_threshold);
    receive_assigned_edges(ctx, edges_to_receive, mapping, &adjacency);

    tracing::info!(
        host = me,
        nodes = adjacency.num_nodes(),
        edges = adjacency.num_edges(),
        elapsed = ?timer.elapsed(),
        "edges exchanged"
    );
    adjacency
}
