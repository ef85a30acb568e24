use std::ops::Range;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{ensure, Context};

use crate::edge_list::{load_local_edges, Edge, InputFormat};
use crate::exchange::{exchange_edges, DEFAULT_FLUSH_THRESHOLD};
use crate::gr::{read_gr, write_partition, GrHeader};
use crate::network::{HostContext, Network};
use crate::partition::{chunked_host_mapping, MappingStrategy, NodeMapping, DEFAULT_CHUNK_CAP};

/// Everything one conversion run needs; identical on every host.
#[derive(Clone, Debug)]
pub struct ConvertConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_format: InputFormat,
    pub mapping: MappingStrategy,
    /// Inferred from the largest node ID when `None`.
    pub num_nodes: Option<u64>,
    pub chunk_cap: u64,
    pub flush_threshold: usize,
    /// Host 0 reads the finished file back and checks it.
    pub verify: bool,
}

impl ConvertConfig {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        ConvertConfig {
            input: input.into(),
            output: output.into(),
            input_format: InputFormat::default(),
            mapping: MappingStrategy::default(),
            num_nodes: None,
            chunk_cap: DEFAULT_CHUNK_CAP,
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
            verify: false,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PhaseTimes {
    pub read: Duration,
    pub mapping: Duration,
    pub exchange: Duration,
    pub write: Duration,
}

impl PhaseTimes {
    pub fn total(&self) -> Duration {
        self.read + self.mapping + self.exchange + self.write
    }
}

/// What one host did during a run.
#[derive(Clone, Debug)]
pub struct ConversionReport {
    pub host: usize,
    pub num_hosts: usize,
    pub total_nodes: u64,
    pub total_edges: u64,
    /// Edges this host read from the input.
    pub edges_read: u64,
    pub nodes: Range<u64>,
    /// Edges of `nodes`, written by this host.
    pub edges_assigned: u64,
    pub edges_per_host: Vec<u64>,
    pub mapping: NodeMapping,
    pub times: PhaseTimes,
}

/// Converts the edge list named by `config` into a gr file. Every host
/// calls this with the same configuration.
pub fn convert<N: Network>(
    ctx: &mut HostContext<N>,
    config: &ConvertConfig,
) -> anyhow::Result<ConversionReport> {
    let me = ctx.id();
    let mut times = PhaseTimes::default();

    let timer = Instant::now();
    let edges = load_local_edges(&config.input, config.input_format, me, ctx.num())
        .with_context(|| format!("host {me} cannot read {}", config.input.display()))?;
    let edges_read = edges.len() as u64;
    tracing::info!(host = me, edges = edges_read, "local edges read");

    let total_edges = ctx.accumulate_value(edges_read);
    let total_nodes = total_node_count(ctx, &edges, config.num_nodes)?;
    if me == 0 {
        tracing::info!(total_nodes, total_edges, "graph size");
    }
    times.read = timer.elapsed();

    let timer = Instant::now();
    let mapping = match config.mapping {
        MappingStrategy::Flat => NodeMapping::flat(ctx.num(), total_nodes),
        MappingStrategy::Chunked => {
            chunked_host_mapping(ctx, &edges, total_nodes, total_edges, config.chunk_cap)
        }
    };
    times.mapping = timer.elapsed();

    let timer = Instant::now();
    let adjacency = exchange_edges(ctx, &edges, &mapping, config.flush_threshold);
    drop(edges);
    tracing::debug!(host = me, "local edge list freed");
    times.exchange = timer.elapsed();

    let timer = Instant::now();
    let summary = write_partition(ctx, &config.output, adjacency, total_nodes, total_edges)?;
    times.write = timer.elapsed();

    if config.verify && me == 0 {
        verify_output(config, total_nodes, total_edges)?;
        tracing::info!(path = %config.output.display(), "output verified");
    }

    let (first, end) = mapping.range(me);
    Ok(ConversionReport {
        host: me,
        num_hosts: ctx.num(),
        total_nodes,
        total_edges,
        edges_read,
        nodes: first..end,
        edges_assigned: summary.num_edges,
        edges_per_host: summary.edges_per_host,
        mapping,
        times,
    })
}

fn total_node_count<N: Network>(
    ctx: &mut HostContext<N>,
    edges: &[Edge],
    configured: Option<u64>,
) -> anyhow::Result<u64> {
    // the reduction runs even with a configured count so every host takes
    // the same number of rounds
    let local_bound = edges
        .iter()
        .map(|e| u64::from(e.src.max(e.dst)) + 1)
        .max()
        .unwrap_or(0);
    let inferred = ctx.reduce_max(local_bound);
    match configured {
        Some(num_nodes) => {
            ensure!(
                inferred <= num_nodes,
                "edge list names node {} but the graph has {num_nodes} nodes",
                inferred - 1
            );
            Ok(num_nodes)
        }
        None => Ok(inferred),
    }
}

fn verify_output(config: &ConvertConfig, total_nodes: u64, total_edges: u64) -> anyhow::Result<()> {
    let graph = read_gr(&config.output)
        .with_context(|| format!("cannot read back {}", config.output.display()))?;
    ensure!(
        graph.header == GrHeader::new(total_nodes, total_edges),
        "header {:?} does not match {total_nodes} nodes and {total_edges} edges",
        graph.header
    );
    graph.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::LocalNetwork;

    #[test]
    fn single_host_conversion_of_the_small_graph() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.el");
        std::fs::write(&input, "0 1\n0 2\n2 3\n3 0\n").unwrap();

        let mut config = ConvertConfig::new(&input, dir.path().join("small.gr"));
        config.verify = true;
        let mut ctx = HostContext::new(LocalNetwork::single());
        let report = convert(&mut ctx, &config).unwrap();

        assert_eq!(report.total_nodes, 4);
        assert_eq!(report.total_edges, 4);
        assert_eq!(report.nodes, 0..4);
        assert_eq!(report.edges_per_host, vec![4]);

        let graph = read_gr(&config.output).unwrap();
        assert_eq!(graph.offsets, vec![2, 2, 3, 4]);
        assert_eq!(graph.neighbors(2), &[3]);
    }

    #[test]
    fn configured_node_count_adds_isolated_nodes() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.el");
        std::fs::write(&input, "1 0\n").unwrap();

        let mut config = ConvertConfig::new(&input, dir.path().join("small.gr"));
        config.num_nodes = Some(6);
        config.mapping = MappingStrategy::Flat;
        let mut ctx = HostContext::new(LocalNetwork::single());
        convert(&mut ctx, &config).unwrap();

        let graph = read_gr(&config.output).unwrap();
        assert_eq!(graph.offsets, vec![0, 1, 1, 1, 1, 1]);
    }

    #[test]
    fn too_small_node_count_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("small.el");
        std::fs::write(&input, "1 7\n").unwrap();

        let mut config = ConvertConfig::new(&input, dir.path().join("small.gr"));
        config.num_nodes = Some(4);
        let mut ctx = HostContext::new(LocalNetwork::single());
        let err = convert(&mut ctx, &config).unwrap_err();
        assert!(err.to_string().contains("node 7"), "{err}");
    }

    #[test]
    fn missing_input_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConvertConfig::new(dir.path().join("absent.el"), dir.path().join("out.gr"));
        let mut ctx = HostContext::new(LocalNetwork::single());
        assert!(convert(&mut ctx, &config).is_err());
    }
}
