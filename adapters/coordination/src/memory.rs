//! In-process `CoordinationStore` backed by ordinary collections under a
//! single mutex. Used for tests and single-node deployments; the wire
//! contract is identical to `RedisCoordinationStore` so `JobQueue`,
//! `WorkerRegistry`, and `StorageNodeRegistry` built atop `CoordinationStore`
//! work unchanged against either.

use async_trait::async_trait;
use pipeline_core::errors::CoordinationError;
use pipeline_core::traits::{CoordinationStore, StreamEntry};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<serde_json::Value>>,
    hashes: HashMap<String, HashMap<String, serde_json::Value>>,
    sets: HashMap<String, std::collections::HashSet<String>>,
    streams: HashMap<String, Vec<(u64, serde_json::Value)>>,
    stream_cursor: HashMap<(String, String), u64>,
    counters: HashMap<String, i64>,
    next_stream_id: u64,
}

pub struct InMemoryCoordinationStore {
    state: Mutex<State>,
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self { state: Mutex::new(State::default()) }
    }
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn list_push(&self, key: &str, value: serde_json::Value) -> Result<(), CoordinationError> {
        self.state.lock().unwrap().lists.entry(key.to_string()).or_default().push_back(value);
        Ok(())
    }

    async fn list_pop(&self, key: &str, timeout: Duration) -> Result<Option<serde_json::Value>, CoordinationError> {
        // A real blocking-list-pop waits on the remote store; this in-memory
        // variant only ever has what's already enqueued, so it returns
        // immediately rather than actually sleeping out `timeout`.
        let _ = timeout;
        Ok(self.state.lock().unwrap().lists.entry(key.to_string()).or_default().pop_front())
    }

    async fn hash_set(&self, key: &str, field: &str, value: serde_json::Value) -> Result<(), CoordinationError> {
        self.state.lock().unwrap().hashes.entry(key.to_string()).or_default().insert(field.to_string(), value);
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<serde_json::Value>, CoordinationError> {
        Ok(self.state.lock().unwrap().hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), CoordinationError> {
        if let Some(hash) = self.state.lock().unwrap().hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> Result<Vec<(String, serde_json::Value)>, CoordinationError> {
        Ok(self.state.lock().unwrap().hashes.get(key).map(|h| h.clone().into_iter().collect()).unwrap_or_default())
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), CoordinationError> {
        self.state.lock().unwrap().sets.entry(key.to_string()).or_default().insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<(), CoordinationError> {
        if let Some(set) = self.state.lock().unwrap().sets.get_mut(key) {
            set.remove(member);
        }
        Ok(())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, CoordinationError> {
        Ok(self.state.lock().unwrap().sets.get(key).map(|s| s.iter().cloned().collect()).unwrap_or_default())
    }

    async fn stream_append(&self, key: &str, payload: serde_json::Value) -> Result<String, CoordinationError> {
        let mut state = self.state.lock().unwrap();
        let id = state.next_stream_id;
        state.next_stream_id += 1;
        state.streams.entry(key.to_string()).or_default().push((id, payload));
        Ok(id.to_string())
    }

    async fn stream_read_group(
        &self,
        key: &str,
        group: &str,
        _consumer: &str,
        max: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, CoordinationError> {
        let _ = block;
        let mut state = self.state.lock().unwrap();
        let cursor = *state.stream_cursor.get(&(key.to_string(), group.to_string())).unwrap_or(&0);
        let entries: Vec<StreamEntry> = state
            .streams
            .get(key)
            .map(|events| {
                events
                    .iter()
                    .filter(|(id, _)| *id >= cursor)
                    .take(max)
                    .map(|(id, payload)| StreamEntry { id: id.to_string(), payload: payload.clone() })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(last) = entries.last() {
            let next = last.id.parse::<u64>().unwrap_or(cursor) + 1;
            state.stream_cursor.insert((key.to_string(), group.to_string()), next);
        }
        Ok(entries)
    }

    async fn stream_ack(&self, _key: &str, _group: &str, _id: &str) -> Result<(), CoordinationError> {
        // Acknowledgement in the real backend retires the message from the
        // consumer group's pending-entries list; the in-memory cursor above
        // already advances past read messages unconditionally, so there is
        // nothing further to retire here.
        Ok(())
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, CoordinationError> {
        let mut state = self.state.lock().unwrap();
        let counter = state.counters.entry(key.to_string()).or_insert(0);
        *counter += by;
        Ok(*counter)
    }
}
