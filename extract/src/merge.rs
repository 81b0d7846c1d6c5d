//! Merges per-chunk extraction results into one document (§4.5 step 4),
//! generalising the original `smart_union` helper: array fields dedupe by
//! key, everything else keeps the first non-empty value seen across chunks.

use serde_json::Value;

const DEDUP_ARRAYS_BY_NAME: &[&str] = &["locations"];
const DEDUP_ARRAYS_BY_DATE: &[&str] = &["dates"];
const ENTITY_CATEGORIES: &[&str] = &["people", "organizations", "companies"];

pub fn smart_union(chunk_results: &[Value]) -> Value {
    let mut iter = chunk_results.iter();
    let Some(first) = iter.next() else {
        return Value::Object(Default::default());
    };

    let mut merged = first.clone();
    for chunk in iter {
        merge_arrays_by_key(&mut merged, chunk, "locations", "name");
        merge_entities(&mut merged, chunk);
        merge_arrays_by_key(&mut merged, chunk, "dates", "date");
        merge_scalars(&mut merged, chunk);
    }
    merged
}

fn merge_arrays_by_key(merged: &mut Value, chunk: &Value, field: &str, key: &str) {
    let Some(incoming) = chunk.get(field).and_then(Value::as_array) else { return };
    let Value::Object(map) = merged else { return };
    let existing = map.entry(field.to_string()).or_insert_with(|| Value::Array(Vec::new()));
    let Value::Array(existing_arr) = existing else { return };

    let mut seen: std::collections::HashSet<String> =
        existing_arr.iter().filter_map(|item| item.get(key)).filter_map(|v| v.as_str()).map(String::from).collect();

    for item in incoming {
        if let Some(k) = item.get(key).and_then(Value::as_str) {
            if !k.is_empty() && seen.insert(k.to_string()) {
                existing_arr.push(item.clone());
            }
        }
    }
}

fn merge_entities(merged: &mut Value, chunk: &Value) {
    let Some(incoming_entities) = chunk.get("entities") else { return };
    let Value::Object(map) = merged else { return };
    let entities = map.entry("entities".to_string()).or_insert_with(|| Value::Object(Default::default()));

    for category in ENTITY_CATEGORIES {
        let Some(incoming) = incoming_entities.get(category).and_then(Value::as_array) else { continue };
        let Value::Object(entities_map) = entities else { continue };
        let existing = entities_map.entry(category.to_string()).or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(existing_arr) = existing else { continue };

        let mut seen: std::collections::HashSet<String> =
            existing_arr.iter().filter_map(|item| item.get("name")).filter_map(Value::as_str).map(String::from).collect();

        for item in incoming {
            if let Some(name) = item.get("name").and_then(Value::as_str) {
                if !name.is_empty() && seen.insert(name.to_string()) {
                    existing_arr.push(item.clone());
                }
            }
        }
    }
}

/// Fills in any top-level field that is still null/missing/empty in
/// `merged` with the first non-empty value found in `chunk` -- the "first
/// non-empty wins" rule from the document spec, layered on top of the
/// original's dedup-only behaviour.
fn merge_scalars(merged: &mut Value, chunk: &Value) {
    let Value::Object(chunk_map) = chunk else { return };
    let Value::Object(merged_map) = merged else { return };

    for (key, chunk_value) in chunk_map {
        if DEDUP_ARRAYS_BY_NAME.contains(&key.as_str()) || DEDUP_ARRAYS_BY_DATE.contains(&key.as_str()) || key == "entities" {
            continue;
        }
        let is_empty_in_merged = match merged_map.get(key) {
            None => true,
            Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Object(o)) => o.is_empty(),
            Some(Value::Array(a)) => a.is_empty(),
            _ => false,
        };
        let is_nonempty_in_chunk = !matches!(chunk_value, Value::Null)
            && !matches!(chunk_value, Value::String(s) if s.is_empty())
            && !matches!(chunk_value, Value::Object(o) if o.is_empty());

        if is_empty_in_merged && is_nonempty_in_chunk {
            merged_map.insert(key.clone(), chunk_value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_input_yields_empty_object() {
        assert_eq!(smart_union(&[]), json!({}));
    }

    #[test]
    fn locations_dedupe_by_name() {
        let chunks = vec![
            json!({"locations": [{"name": "Norfolk"}]}),
            json!({"locations": [{"name": "Norfolk"}, {"name": "Hampton"}]}),
        ];
        let merged = smart_union(&chunks);
        let names: Vec<&str> = merged["locations"].as_array().unwrap().iter().map(|l| l["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Norfolk", "Hampton"]);
    }

    #[test]
    fn entities_dedupe_per_category() {
        let chunks = vec![
            json!({"entities": {"people": [{"name": "Alice"}]}}),
            json!({"entities": {"people": [{"name": "Alice"}, {"name": "Bob"}], "companies": [{"name": "Acme"}]}}),
        ];
        let merged = smart_union(&chunks);
        assert_eq!(merged["entities"]["people"].as_array().unwrap().len(), 2);
        assert_eq!(merged["entities"]["companies"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn scalar_fields_take_first_non_empty() {
        let chunks = vec![json!({"project": {}}), json!({"project": {"name": "Bridge Widening"}})];
        let merged = smart_union(&chunks);
        assert_eq!(merged["project"]["name"], json!("Bridge Widening"));
    }

    #[test]
    fn dates_dedupe_by_date() {
        let chunks = vec![json!({"dates": [{"date": "2024-01-01"}]}), json!({"dates": [{"date": "2024-01-01"}, {"date": "2024-02-01"}]})];
        let merged = smart_union(&chunks);
        assert_eq!(merged["dates"].as_array().unwrap().len(), 2);
    }
}
