use std::path::PathBuf;

use clap::Parser;

use crate::convert::ConvertConfig;
use crate::edge_list::InputFormat;
use crate::exchange::DEFAULT_FLUSH_THRESHOLD;
use crate::partition::{MappingStrategy, DEFAULT_CHUNK_CAP};

#[derive(Parser, Debug)]
#[command(author, version, about = "Distributed edge list to gr converter", long_about = None)]
pub struct ConvertCli {
    /// Edge list to read
    #[arg(short, long)]
    pub input: PathBuf,

    /// gr file to write
    #[arg(short, long)]
    pub output: PathBuf,

    #[arg(value_enum, short = 'f', long, default_value_t = InputFormat::Text)]
    pub input_format: InputFormat,

    #[arg(value_enum, short, long, default_value_t = MappingStrategy::Chunked)]
    pub mapping: MappingStrategy,

    /// Total number of nodes; inferred from the largest node ID if omitted
    #[arg(short, long)]
    pub num_nodes: Option<u64>,

    /// Worker threads per host; rayon's default if omitted
    #[arg(short, long)]
    pub threads: Option<usize>,

    #[arg(long, env = "GRAPH_CONVERT_CHUNK_CAP", default_value_t = DEFAULT_CHUNK_CAP)]
    pub chunk_cap: u64,

    /// Bytes buffered per destination host before a send
    #[arg(long, env = "GRAPH_CONVERT_FLUSH_BYTES", default_value_t = DEFAULT_FLUSH_THRESHOLD)]
    pub flush_bytes: usize,

    /// Read the output back on host 0 and check it
    #[arg(long)]
    pub verify: bool,
}

impl ConvertCli {
    pub fn describe(&self, num_hosts: usize) {
        println!("hosts: {num_hosts}");
        println!("input: {} ({:?})", self.input.display(), self.input_format);
        println!("output: {}", self.output.display());
        println!("mapping: {:?}", self.mapping);
        println!("num nodes: {:?}", self.num_nodes);
        println!("threads: {:?}", self.threads);
        println!("chunk cap: {}", self.chunk_cap);
        println!("flush bytes: {}", self.flush_bytes);
        println!("verify: {}", self.verify);
    }

    pub fn config(&self) -> ConvertConfig {
        ConvertConfig {
            input: self.input.clone(),
            output: self.output.clone(),
            input_format: self.input_format,
            mapping: self.mapping,
            num_nodes: self.num_nodes,
            chunk_cap: self.chunk_cap,
            flush_threshold: self.flush_bytes,
            verify: self.verify,
        }
    }
}
