//! Network topology probes.
//!
//! The peer graph is a star around the node the RPC URL points at, built
//! from `/net_info` traffic counters. The co-signing graph links validators
//! that signed the same commits. Both are written as GraphViz DOT for
//! external layout, and as a PNG plus node positions using a fixed circular
//! layout.

pub mod graph;
pub mod peers;
pub mod validators;

pub use graph::{NodePosition, WeightedGraph};
pub use peers::{peer_topology, PeerLink, PeerTopology};
pub use validators::{collect_signatures, cosigning_graph, CoSigningSummary, ValidatorSignature};
