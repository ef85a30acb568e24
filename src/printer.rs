use crate::convert::ConversionReport;

pub fn print_report(report: &ConversionReport) {
    if report.host == 0 {
        let t = &report.times;
        println!(
            "graph: {} nodes {} edges on {} hosts",
            report.total_nodes, report.total_edges, report.num_hosts
        );
        for (h, (first, end)) in report.mapping.ranges().iter().enumerate() {
            println!(
                "host {h}: nodes {first}..{end} edges {}",
                report.edges_per_host[h]
            );
        }
        println!(
            "times: read {:.6} mapping {:.6} exchange {:.6} write {:.6} total {:.6}",
            t.read.as_secs_f64(),
            t.mapping.as_secs_f64(),
            t.exchange.as_secs_f64(),
            t.write.as_secs_f64(),
            t.total().as_secs_f64()
        );
    }
}

/// Spread of assigned edges: `(min, avg, max)`.
pub fn edge_balance(edges_per_host: &[u64]) -> (u64, f64, u64) {
    let min = edges_per_host.iter().copied().min().unwrap_or(0);
    let max = edges_per_host.iter().copied().max().unwrap_or(0);
    let avg = if edges_per_host.is_empty() {
        0.0
    } else {
        edges_per_host.iter().sum::<u64>() as f64 / edges_per_host.len() as f64
    };
    (min, avg, max)
}

pub fn print_balance(host: usize, edges_per_host: &[u64]) {
    if host == 0 {
        let (min, avg, max) = edge_balance(edges_per_host);
        println!("edges per host min: {min} avg: {avg:<6.2} max: {max}");
    }
}
