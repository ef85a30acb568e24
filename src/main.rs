use clap::Parser;
use lamellar::active_messaging::prelude::*;
use tracing_subscriber::EnvFilter;

use lamellar_graph_convert::options::ConvertCli;
use lamellar_graph_convert::printer::{print_balance, print_report};
use lamellar_graph_convert::{convert, ConversionReport, HostContext, LamellarNetwork};

fn run(ctx: &mut HostContext<LamellarNetwork>, cli: &ConvertCli) -> anyhow::Result<ConversionReport> {
    let config = cli.config();
    match cli.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
            pool.install(|| convert(ctx, &config))
        }
        None => convert(ctx, &config),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = ConvertCli::parse();
    let world = lamellar::LamellarWorldBuilder::new().build();
    let my_pe = world.my_pe();
    if my_pe == 0 {
        cli.describe(world.num_pes());
    }

    let mut ctx = HostContext::new(LamellarNetwork::new(&world));
    match run(&mut ctx, &cli) {
        Ok(report) => {
            print_report(&report);
            print_balance(my_pe, &report.edges_per_host);
            ctx.network().quiesce();
        }
        Err(e) => {
            tracing::error!(host = my_pe, "conversion failed: {e:#}");
            std::process::abort();
        }
    }
}
