//! End-to-end tests for rst-node.
//!
//! Runs several nodes in one process, each with its own TCP listener on an
//! ephemeral port, and checks flooding and wave outcomes over real sockets.

use std::collections::BTreeSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use rst_core::protocol::{decode_frame, encode_frame};
use rst_core::{Channel, Intent, Message, NodeEvent, NodeId, WavePhase};
use rst_node::{Listener, Node, TcpTransport};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
const WAIT: Duration = Duration::from_secs(10);

/// A node serving its listener in a background task.
struct TestNode {
    node: Arc<Node<TcpTransport>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for TestNode {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Bind `count` listeners on random ports.
async fn bind_listeners(count: usize) -> Vec<Listener> {
    let mut listeners = Vec::new();
    for _ in 0..count {
        listeners.push(
            Listener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind listener"),
        );
    }
    listeners
}

/// Start a node on `listener` with the given neighbour ports.
fn start_node(listener: Listener, neighbours: &[u16]) -> TestNode {
    let id = NodeId::from(listener.port());
    let transport = Arc::new(TcpTransport::new(LOCALHOST, Duration::from_secs(2)));
    let neighbours = neighbours.iter().map(|p| NodeId::from(*p)).collect();
    let node = Arc::new(Node::new(id, neighbours, 1, transport).expect("Invalid node"));

    let (mut inbound_rx, accept_task) = listener.spawn();
    let serving = Arc::clone(&node);
    let serve_task = tokio::spawn(async move {
        while let Some(inbound) = inbound_rx.recv().await {
            serving.handle(inbound).await;
        }
    });

    TestNode {
        node,
        tasks: vec![accept_task, serve_task],
    }
}

/// Start one node per vertex of an undirected graph given as index pairs.
async fn start_graph(vertices: usize, edges: &[(usize, usize)]) -> Vec<TestNode> {
    let listeners = bind_listeners(vertices).await;
    let ports: Vec<u16> = listeners.iter().map(|l| l.port()).collect();

    listeners
        .into_iter()
        .enumerate()
        .map(|(i, listener)| {
            let neighbours: Vec<u16> = edges
                .iter()
                .filter_map(|&(a, b)| match (a == i, b == i) {
                    (true, _) => Some(ports[b]),
                    (_, true) => Some(ports[a]),
                    _ => None,
                })
                .collect();
            start_node(listener, &neighbours)
        })
        .collect()
}

async fn wait_for_completion(root: &TestNode) {
    timeout(
        WAIT,
        root.node.wait_for(
            |e| matches!(e, NodeEvent::AggregationComplete { .. }),
            |s| s.is_aggregation_complete(),
        ),
    )
    .await
    .expect("Timeout waiting for the wave to complete");
}

/// Poll until every node knows `expected` channels.
async fn wait_for_channels(nodes: &[TestNode], expected: usize) {
    timeout(WAIT, async {
        loop {
            let mut done = true;
            for n in nodes {
                if n.node.state().await.channels_known().len() < expected {
                    done = false;
                }
            }
            if done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Timeout waiting for flooding to converge");
}

// ============================================================================
// Wave
// ============================================================================

#[tokio::test]
async fn test_line_wave_over_tcp() {
    let nodes = start_graph(3, &[(0, 1), (1, 2)]).await;
    let (a, b, c) = (&nodes[0], &nodes[1], &nodes[2]);

    let report = a.node.start_wave("wave").await;
    assert_eq!(report.failed, 0);
    wait_for_completion(a).await;

    let a_state = a.node.snapshot().await;
    let b_state = b.node.snapshot().await;
    let c_state = c.node.snapshot().await;

    assert_eq!(b_state.parent.as_ref(), Some(a.node.id()));
    assert_eq!(c_state.parent.as_ref(), Some(b.node.id()));
    assert_eq!(a_state.children, vec![b.node.id().clone()]);
    assert_eq!(b_state.children, vec![c.node.id().clone()]);
    assert!(c_state.children.is_empty());

    let origins: BTreeSet<_> = a_state.value_set.iter().map(|v| v.origin.clone()).collect();
    assert_eq!(a_state.value_set.len(), 3);
    assert_eq!(origins.len(), 3);
    assert!(a_state.value_set.iter().all(|v| v.value == 1));
}

#[tokio::test]
async fn test_cycle_wave_over_tcp() {
    let nodes = start_graph(4, &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)]).await;
    nodes[2].node.start_wave("wave").await;
    wait_for_completion(&nodes[2]).await;

    // Let the last empty Backs land before checking every node
    timeout(WAIT, async {
        loop {
            let mut all_done = true;
            for n in &nodes {
                if n.node.snapshot().await.phase != WavePhase::Done {
                    all_done = false;
                }
            }
            if all_done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("Timeout waiting for every node to finish");

    let root = nodes[2].node.snapshot().await;
    assert_eq!(root.value_set.len(), 4);
    for n in &nodes {
        assert!(n.node.snapshot().await.parent.is_some());
    }
}

// ============================================================================
// Flooding
// ============================================================================

#[tokio::test]
async fn test_cycle_flooding_over_tcp() {
    let nodes = start_graph(4, &[(0, 1), (1, 2), (2, 3), (3, 0)]).await;
    nodes[0].node.flood().await;
    wait_for_channels(&nodes, 4).await;

    let ids: Vec<NodeId> = nodes.iter().map(|n| n.node.id().clone()).collect();
    let expected: Vec<Channel> = {
        let mut channels: Vec<_> = [(0, 1), (1, 2), (2, 3), (3, 0)]
            .iter()
            .map(|&(a, b)| Channel::new(ids[a].clone(), ids[b].clone()))
            .collect();
        channels.sort();
        channels
    };

    for n in &nodes {
        let state = n.node.snapshot().await;
        assert_eq!(state.channels_known, expected);
        assert!(state.processes_known.contains(&state.id));
        assert!(state.participating);
    }
}

// ============================================================================
// Faults
// ============================================================================

#[tokio::test]
async fn test_garbage_then_go_from_raw_peer() {
    // The "parent" is a bare socket we drive by hand
    let parent = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let parent_id = NodeId::from(parent.local_addr().unwrap().port());

    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr();
    let leaf = start_node(listener, &[parent.local_addr().unwrap().port()]);

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"this is not json\n").await.unwrap();
    stream
        .write_all(&encode_frame(&Message::go(parent_id.clone(), "wave")))
        .await
        .unwrap();

    // A leaf answers its parent at once with its own value
    let (reply, _) = timeout(WAIT, parent.accept()).await.unwrap().unwrap();
    let mut lines = BufReader::new(reply).lines();
    let line = timeout(WAIT, lines.next_line()).await.unwrap().unwrap().unwrap();
    let back = decode_frame(line.as_bytes()).unwrap();

    assert_eq!(back.intent, Intent::Back);
    assert_eq!(&back.source, leaf.node.id());
    let values = back.contribution().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(&values[0].origin, leaf.node.id());

    assert_eq!(leaf.node.snapshot().await.parent, Some(parent_id));
}

#[tokio::test]
async fn test_unreachable_neighbour_stalls() {
    let gone = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gone_port = gone.local_addr().unwrap().port();
    drop(gone);

    let listeners = bind_listeners(1).await;
    let root = start_node(listeners.into_iter().next().unwrap(), &[gone_port]);

    let report = root.node.start_wave("wave").await;
    assert_eq!(report.failed, 1);

    let state = root.node.snapshot().await;
    assert_eq!(state.phase, WavePhase::Active);
    assert_eq!(state.pending_replies, vec![NodeId::from(gone_port)]);
}
