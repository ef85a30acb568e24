use std::fmt::Write as _;
use std::path::Path;

use lamellar_graph_convert::gr::read_gr;
use lamellar_graph_convert::{
    convert, ConversionReport, ConvertConfig, HostContext, InputFormat, LocalNetwork,
    MappingStrategy,
};

const NUM_NODES: u32 = 97;

// skewed: low node IDs get far more out-edges
fn generate_edges(count: usize) -> Vec<(u32, u32)> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    (0..count)
        .map(|_| {
            let a = (next() % u64::from(NUM_NODES)) as u32;
            let b = (next() % u64::from(NUM_NODES)) as u32;
            (a.min(b), (next() % u64::from(NUM_NODES)) as u32)
        })
        .collect()
}

fn write_text(path: &Path, edges: &[(u32, u32)]) {
    let mut text = String::from("# src dst weight\n");
    for (i, (s, d)) in edges.iter().enumerate() {
        if i % 3 == 0 {
            writeln!(text, "{s}\t{d}\t{i}").unwrap();
        } else {
            writeln!(text, "{s}\t{d}").unwrap();
        }
    }
    std::fs::write(path, text).unwrap();
}

fn write_binary(path: &Path, edges: &[(u32, u32)]) {
    let mut bytes = vec![];
    for (s, d) in edges {
        bytes.extend_from_slice(&s.to_le_bytes());
        bytes.extend_from_slice(&d.to_le_bytes());
    }
    std::fs::write(path, bytes).unwrap();
}

fn serial_csr(edges: &[(u32, u32)], num_nodes: usize) -> Vec<Vec<u32>> {
    let mut lists = vec![vec![]; num_nodes];
    for (s, d) in edges {
        lists[*s as usize].push(*d);
    }
    lists.iter_mut().for_each(|l| l.sort_unstable());
    lists
}

fn run_cluster(num_hosts: usize, config: &ConvertConfig) -> Vec<ConversionReport> {
    let nets = LocalNetwork::cluster(num_hosts);
    std::thread::scope(|s| {
        let handles: Vec<_> = nets
            .into_iter()
            .map(|net| {
                s.spawn(move || {
                    let mut ctx = HostContext::new(net);
                    convert(&mut ctx, config).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    })
}

fn check_against_serial(config: &ConvertConfig, edges: &[(u32, u32)], reports: &[ConversionReport]) {
    let expected = serial_csr(edges, NUM_NODES as usize);
    let graph = read_gr(&config.output).unwrap();
    graph.validate().unwrap();
    assert_eq!(graph.num_nodes(), u64::from(NUM_NODES));
    assert_eq!(graph.num_edges(), edges.len() as u64);
    for (node, want) in expected.iter().enumerate() {
        let mut got = graph.neighbors(node as u64).to_vec();
        got.sort_unstable();
        assert_eq!(&got, want, "node {node}");
    }

    let mapping = &reports[0].mapping;
    let mut next_start = 0;
    for (h, report) in reports.iter().enumerate() {
        assert_eq!(report.host, h);
        assert_eq!(&report.mapping, mapping);
        assert_eq!(report.total_edges, edges.len() as u64);
        assert_eq!(report.nodes.start, next_start);
        next_start = report.nodes.end;
        let owned: u64 = report.nodes.clone().map(|n| expected[n as usize].len() as u64).sum();
        assert_eq!(report.edges_assigned, owned);
    }
    assert_eq!(next_start, u64::from(NUM_NODES));
    assert_eq!(
        reports.iter().map(|r| r.edges_read).sum::<u64>(),
        edges.len() as u64
    );
}

#[test]
fn text_input_matches_serial_csr_on_every_cluster_size() {
    let dir = tempfile::tempdir().unwrap();
    let edges = generate_edges(2000);
    let input = dir.path().join("graph.el");
    write_text(&input, &edges);

    for strategy in [MappingStrategy::Flat, MappingStrategy::Chunked] {
        for num_hosts in 1..=4 {
            let mut config = ConvertConfig::new(
                &input,
                dir.path().join(format!("graph-{strategy:?}-{num_hosts}.gr")),
            );
            config.mapping = strategy;
            config.num_nodes = Some(u64::from(NUM_NODES));
            config.verify = true;
            let reports = run_cluster(num_hosts, &config);
            check_against_serial(&config, &edges, &reports);
        }
    }
}

#[test]
fn chunked_mapping_evens_out_skewed_degrees() {
    let dir = tempfile::tempdir().unwrap();
    let edges = generate_edges(4000);
    let input = dir.path().join("graph.el");
    write_text(&input, &edges);

    let mut spread = vec![];
    for strategy in [MappingStrategy::Flat, MappingStrategy::Chunked] {
        let mut config = ConvertConfig::new(&input, dir.path().join(format!("{strategy:?}.gr")));
        config.mapping = strategy;
        config.num_nodes = Some(u64::from(NUM_NODES));
        let reports = run_cluster(4, &config);
        let per_host = &reports[0].edges_per_host;
        spread.push(per_host.iter().max().unwrap() - per_host.iter().min().unwrap());
    }
    assert!(spread[1] < spread[0], "chunked {} vs flat {}", spread[1], spread[0]);
}

#[test]
fn binary_input_with_inferred_node_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut edges = generate_edges(500);
    // make the largest ID present so the inferred count is NUM_NODES
    edges.push((0, NUM_NODES - 1));
    let input = dir.path().join("graph.bin");
    write_binary(&input, &edges);

    let mut config = ConvertConfig::new(&input, dir.path().join("graph.gr"));
    config.input_format = InputFormat::Binary;
    config.flush_threshold = 64;
    config.verify = true;
    let reports = run_cluster(3, &config);
    assert!(reports.iter().all(|r| r.total_nodes == u64::from(NUM_NODES)));
    check_against_serial(&config, &edges, &reports);
}

#[test]
fn more_hosts_than_edges() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("tiny.el");
    std::fs::write(&input, "0 1\n1 0\n").unwrap();

    let mut config = ConvertConfig::new(&input, dir.path().join("tiny.gr"));
    config.verify = true;
    let reports = run_cluster(4, &config);
    assert_eq!(reports[0].edges_per_host.iter().sum::<u64>(), 2);

    let graph = read_gr(&config.output).unwrap();
    assert_eq!(graph.offsets, vec![1, 2]);
    assert_eq!(graph.dests, vec![1, 0]);
}
