//! `--mode=cli` operational subcommands: each operates directly on the
//! shared in-process adapters rather than issuing a network request.

use crate::cli::QueryCommands;
use colored::*;
use pipeline_adapter_coordination::CoordinatedJobQueue;
use pipeline_adapter_graph_memory::InMemoryGraphStore;
use pipeline_core::errors::ObjectStoreError;
use pipeline_core::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tabled::Tabled;

pub async fn handle_health_command(
    graph: &Arc<InMemoryGraphStore>,
    coordination: &Arc<dyn CoordinationStore>,
    object_store: &Arc<dyn ObjectStore>,
) -> Result<(), CoreError> {
    let graph_ok = graph.nodes().await.is_ok();
    let coordination_ok = coordination.hash_get_all("pipeline:health").await.is_ok();
    let object_store_ok = match object_store.resolve_name("pipeline:health").await {
        Ok(_) => true,
        Err(ObjectStoreError::NameNotFound(_)) => true,
        Err(_) => false,
    };

    println!("{:<20} {}", "graph store:", status_label(graph_ok));
    println!("{:<20} {}", "coordination store:", status_label(coordination_ok));
    println!("{:<20} {}", "object store:", status_label(object_store_ok));

    if graph_ok && coordination_ok && object_store_ok {
        Ok(())
    } else {
        Err(CoreError::Internal("one or more adapters are unreachable".to_string()))
    }
}

fn status_label(ok: bool) -> ColoredString {
    if ok {
        "ok".green()
    } else {
        "unreachable".red()
    }
}

#[derive(Tabled)]
struct NodeRow {
    id: String,
    #[tabled(rename = "type")]
    node_type: String,
    label: String,
}

pub async fn handle_query_command(command: QueryCommands, graph: &Arc<InMemoryGraphStore>) -> Result<(), CoreError> {
    match command {
        QueryCommands::Nodes { node_type, label } => {
            let nodes = graph.nodes().await.map_err(CoreError::Graph)?;
            let rows: Vec<NodeRow> = nodes
                .into_iter()
                .filter(|n| node_type.as_deref().map(|t| label_of(n.node_type) == t).unwrap_or(true))
                .filter(|n| label.as_deref().map(|l| n.label.to_lowercase().contains(&l.to_lowercase())).unwrap_or(true))
                .map(|n| NodeRow { id: n.id, node_type: label_of(n.node_type), label: n.label })
                .collect();

            if rows.is_empty() {
                println!("no matching nodes");
            } else {
                println!("{}", tabled::Table::new(rows));
            }
            Ok(())
        }
        QueryCommands::Subgraph { node_id, depth } => {
            if graph.get_node(&node_id).await.map_err(CoreError::Graph)?.is_none() {
                return Err(CoreError::Graph(GraphError::NodeNotFound(node_id)));
            }

            let mut visited: HashSet<String> = HashSet::from([node_id.clone()]);
            let mut frontier = vec![node_id];
            for _ in 0..depth {
                let mut next = Vec::new();
                for id in &frontier {
                    let mut edges = graph.edges_from(id).await.map_err(CoreError::Graph)?;
                    edges.extend(graph.edges_to(id).await.map_err(CoreError::Graph)?);
                    for edge in edges {
                        let neighbour = if &edge.source == id { edge.target } else { edge.source };
                        if visited.insert(neighbour.clone()) {
                            next.push(neighbour);
                        }
                    }
                }
                frontier = next;
                if frontier.is_empty() {
                    break;
                }
            }

            for id in &visited {
                if let Some(node) = graph.get_node(id).await.map_err(CoreError::Graph)? {
                    println!("{:<12} {:<20} {}", label_of(node.node_type), node.id, node.label);
                }
            }
            Ok(())
        }
    }
}

fn label_of(node_type: NodeType) -> String {
    serde_json::to_value(node_type).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "unknown".to_string())
}

pub async fn handle_export_command(graph: &Arc<InMemoryGraphStore>, output: &PathBuf) -> Result<(), CoreError> {
    let snapshot = graph.snapshot_json().await.map_err(CoreError::Graph)?;
    let bytes = serde_json::to_vec_pretty(&snapshot).map_err(CoreError::Serialization)?;
    tokio::fs::write(output, bytes).await.map_err(|e| CoreError::Internal(format!("failed to write export: {e}")))?;
    println!("wrote graph snapshot to {}", output.display());
    Ok(())
}

pub async fn handle_enqueue_command(coordination: Arc<dyn CoordinationStore>, file: &PathBuf) -> Result<(), CoreError> {
    if !file.exists() {
        return Err(CoreError::Configuration(format!("no such file: {}", file.display())));
    }
    let job_queue = CoordinatedJobQueue::new(coordination, "pipeline-cli");
    let job_id = job_queue.enqueue(&file.to_string_lossy(), serde_json::json!({})).await.map_err(CoreError::Coordination)?;
    println!("enqueued job {job_id} for {}", file.display());
    Ok(())
}
