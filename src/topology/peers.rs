//! Peer graph of the queried node from `/net_info`.

use serde::{Deserialize, Serialize};

use super::graph::{NodeAttrs, WeightedGraph};
use crate::rpc::types::NetInfo;

pub const MIN_EDGE_WEIGHT: f64 = 0.1;
pub const MAX_EDGE_WEIGHT: f64 = 5.0;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerLink {
    pub peer_id: String,
    pub moniker: Option<String>,
    pub remote_ip: Option<String>,
    pub is_outbound: bool,
    pub send_bytes: u64,
    pub recv_bytes: u64,
    pub traffic_mb: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeerTopology {
    pub local_node: String,
    pub min_traffic_mb: f64,
    pub n_peers: usize,
    pub peers: Vec<PeerLink>,
    #[serde(skip)]
    pub graph: WeightedGraph,
}

/// One link per peer; peers without an id fall back to their address
pub fn peer_links(info: &NetInfo) -> Vec<PeerLink> {
    info.peers
        .iter()
        .enumerate()
        .map(|(i, peer)| {
            let send_bytes = peer.connection_status.send_monitor.bytes.unwrap_or(0);
            let recv_bytes = peer.connection_status.recv_monitor.bytes.unwrap_or(0);
            let peer_id = peer
                .node_info
                .id
                .clone()
                .or_else(|| peer.remote_ip.clone())
                .unwrap_or_else(|| format!("peer-{}", i));
            PeerLink {
                peer_id,
                moniker: peer.node_info.moniker.clone(),
                remote_ip: peer.remote_ip.clone(),
                is_outbound: peer.is_outbound,
                send_bytes,
                recv_bytes,
                traffic_mb: (send_bytes + recv_bytes) as f64 / BYTES_PER_MB,
            }
        })
        .collect()
}

pub fn edge_weight(traffic_mb: f64) -> f64 {
    traffic_mb.clamp(MIN_EDGE_WEIGHT, MAX_EDGE_WEIGHT)
}

/// Star graph around `local_node`: outbound peers get `local -> peer` edges
/// (blue), inbound ones `peer -> local` (green).
pub fn build_peer_graph(local_node: &str, links: &[PeerLink], min_traffic_mb: f64) -> WeightedGraph {
    let mut graph = WeightedGraph::directed();
    graph.add_node(
        local_node,
        NodeAttrs {
            label: Some(local_node.to_string()),
            color: Some("red".to_string()),
        },
    );

    for link in links.iter().filter(|l| l.traffic_mb >= min_traffic_mb) {
        graph.add_node(
            &link.peer_id,
            NodeAttrs {
                label: link.moniker.clone(),
                color: None,
            },
        );
        let weight = edge_weight(link.traffic_mb);
        if link.is_outbound {
            graph.set_edge(local_node, &link.peer_id, weight, Some("blue"));
        } else {
            graph.set_edge(&link.peer_id, local_node, weight, Some("green"));
        }
    }
    graph
}

pub fn peer_topology(local_node: &str, info: &NetInfo, min_traffic_mb: f64) -> PeerTopology {
    let peers = peer_links(info);
    let graph = build_peer_graph(local_node, &peers, min_traffic_mb);
    log::info!(
        "{} peers, {} above {} MB",
        peers.len(),
        graph.edge_count(),
        min_traffic_mb
    );
    PeerTopology {
        local_node: local_node.to_string(),
        min_traffic_mb,
        n_peers: peers.len(),
        peers,
        graph,
    }
}
