//! Layered preference snapshots
//!
//! Each stored preference becomes a priority-tagged snapshot; snapshots merge
//! into one view where higher priority wins for scalars and map nodes merge
//! key-by-key. The view exposes typed accessors over dotted paths and can name
//! the layer that supplied a value, which feeds evaluation traces.

use serde_json::Value;

use crate::data::types::Metadata;

/// One policy layer: a scope's stored values tagged with its priority.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Layer label, e.g. `user:bob`, `tenant:acme`, `defaults`
    pub layer: String,
    pub priority: i32,
    pub values: Metadata,
}

impl Snapshot {
    pub fn new(layer: impl Into<String>, priority: i32, values: Metadata) -> Self {
        Self {
            layer: layer.into(),
            priority,
            values,
        }
    }
}

/// The merged, queryable view over all layers.
#[derive(Debug, Clone)]
pub struct MergedView {
    doc: Metadata,
    /// Layers sorted by priority descending, for source lookups
    layers: Vec<Snapshot>,
}

/// Merge snapshots by priority. Lower layers are applied first so higher
/// priorities overwrite scalar values; nested maps merge recursively.
pub fn merge(mut snapshots: Vec<Snapshot>) -> MergedView {
    snapshots.sort_by_key(|s| s.priority);
    let mut doc = Metadata::new();
    for snapshot in &snapshots {
        deep_merge(&mut doc, &snapshot.values);
    }
    snapshots.reverse();
    MergedView {
        doc,
        layers: snapshots,
    }
}

fn deep_merge(base: &mut Metadata, overlay: &Metadata) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

fn path_get<'a>(map: &'a Metadata, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = map.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

impl MergedView {
    pub fn get(&self, path: &str) -> Option<&Value> {
        path_get(&self.doc, path)
    }

    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path)?.as_bool()
    }

    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path)?.as_str().and_then(|s| {
            let s = s.trim();
            (!s.is_empty()).then_some(s)
        })
    }

    /// The highest-priority layer that carries the path, for traces.
    pub fn source_of(&self, path: &str) -> Option<&str> {
        self.layers
            .iter()
            .find(|layer| path_get(&layer.values, path).is_some())
            .map(|layer| layer.layer.as_str())
    }
}
