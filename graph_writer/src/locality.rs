//! Locality and region detection over document text (§4.7), grounded on the
//! fixed Hampton Roads gazetteer. Detection is pure pattern matching; the
//! graph-attachment step (`add_locality_relations`) is the only part that
//! touches a `GraphStore`.

use once_cell::sync::Lazy;
use pipeline_core::prelude::*;
use regex::Regex;
use std::collections::HashMap;

fn word(pattern: &str) -> Regex {
    Regex::new(&format!(r"(?i)\b{pattern}\b")).expect("static locality pattern is valid regex")
}

static LOCALITY_PATTERNS: Lazy<HashMap<&'static str, Vec<Regex>>> = Lazy::new(|| {
    HashMap::from([
        ("NORFOLK", vec![word("Norfolk"), word("NFK")]),
        ("VIRGINIA BEACH", vec![word("Virginia Beach"), word("VA Beach"), word("VB")]),
        ("CHESAPEAKE", vec![word("Chesapeake")]),
        ("PORTSMOUTH", vec![word("Portsmouth")]),
        ("SUFFOLK", vec![word("Suffolk")]),
        ("HAMPTON", vec![word("Hampton")]),
        ("NEWPORT NEWS", vec![word("Newport News"), word("NN")]),
        ("WILLIAMSBURG", vec![word("Williamsburg")]),
        ("JAMES CITY", vec![word("James City"), word("James City County"), word("JCC")]),
        ("GLOUCESTER", vec![word("Gloucester"), word("Gloucester County")]),
        ("FRANKLIN", vec![word("Franklin"), word("Franklin County")]),
        ("POQUOSON", vec![word("Poquoson")]),
        ("ISLE OF WIGHT", vec![word("Isle of Wight"), word("IOW"), word("Isle of Wight County")]),
        ("SURRY", vec![word("Surry"), word("Surry County")]),
        ("SOUTHAMPTON", vec![word("Southampton"), word("Southampton County")]),
        ("SMITHFIELD", vec![word("Smithfield")]),
    ])
});

static REGION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        word("Hampton Roads"),
        word("HR"),
        word("Seven Cities"),
        word("Southeast Virginia"),
        word("Tidewater"),
    ]
});

pub fn normalize_locality_name(name: &str) -> String {
    name.to_lowercase().replace(' ', "_")
}

/// Mention counts per detected locality; empty on empty text.
pub fn detect_localities(text: &str) -> HashMap<String, usize> {
    if text.is_empty() {
        return HashMap::new();
    }
    let mut results = HashMap::new();
    for (locality, patterns) in LOCALITY_PATTERNS.iter() {
        let count: usize = patterns.iter().map(|p| p.find_iter(text).count()).sum();
        if count > 0 {
            results.insert((*locality).to_string(), count);
        }
    }
    results
}

pub fn detect_region(text: &str) -> bool {
    if text.is_empty() {
        return false;
    }
    REGION_PATTERNS.iter().any(|p| p.is_match(text))
}

/// Attaches `LOCATED_IN` edges from `document_id` to every detected locality
/// that already exists as a graph node, plus a region edge when the region
/// pattern set matches. Returns the locality ids actually attached.
pub async fn add_locality_relations(
    graph: &dyn GraphStore,
    document_id: &str,
    text: &str,
) -> Result<Vec<String>, GraphError> {
    let localities = detect_localities(text);
    let mut attached = Vec::new();

    for (locality, count) in localities {
        let locality_id = format!("loc_{}", normalize_locality_name(&locality));
        if graph.get_node(&locality_id).await?.is_none() {
            continue;
        }
        let confidence = (count as f64 / 10.0).min(1.0);
        let edge = GraphEdge::new(document_id, locality_id.as_str(), EdgeType::LocatedIn).with_confidence(confidence);
        graph.upsert_edge(edge).await?;
        attached.push(locality_id);
    }

    if detect_region(text) {
        let region_id = "region_hampton_roads";
        if graph.get_node(region_id).await?.is_some() {
            let mut edge = GraphEdge::new(document_id, region_id, EdgeType::LocatedIn);
            edge.subtype = Some("explicit_mention".to_string());
            graph.upsert_edge(edge).await?;
        }
    }

    Ok(attached)
}
