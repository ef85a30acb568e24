//! Distributed conversion of edge lists into the binary gr CSR format.
//!
//! Every host reads a slice of the input, agrees with the others on which
//! host owns which contiguous node range, ships each edge to the owner of
//! its source and writes its own slice of the output file.

pub mod convert;
pub mod edge_list;
pub mod exchange;
pub mod gr;
pub mod network;
pub mod options;
pub mod partition;
pub mod printer;

pub use convert::{convert, ConversionReport, ConvertConfig, PhaseTimes};
pub use edge_list::{Edge, InputFormat};
pub use network::{HostContext, LamellarNetwork, LocalNetwork, Network};
pub use partition::{MappingStrategy, NodeMapping};
