use crate::model::AtlasSnapshot;
use serde::Serialize;
use serde_json::{Value, json};

/// Serialize a snapshot as `{ regions: [...], meta }` (array-of-regions style).
/// Suitable for generic tooling and simple consumption.
pub fn to_json_array<K: Serialize>(snapshot: &AtlasSnapshot<K>) -> Value {
    let regions: Vec<Value> = snapshot
        .regions
        .iter()
        .map(|r| {
            json!({
                "key": r.key,
                "frame": {"x": r.frame.x, "y": r.frame.y, "w": r.frame.w, "h": r.frame.h},
                "scaleOffset": r.uv.to_array(),
            })
        })
        .collect();
    json!({ "regions": regions, "meta": meta(snapshot) })
}

/// Regions keyed by `key.to_string()`.
/// Shape: `{ frames: { key: { frame, scaleOffset } }, meta }`.
pub fn to_json_hash<K: ToString>(snapshot: &AtlasSnapshot<K>) -> Value {
    let mut frames = serde_json::Map::new();
    for r in &snapshot.regions {
        frames.insert(
            r.key.to_string(),
            json!({
                "frame": {"x": r.frame.x, "y": r.frame.y, "w": r.frame.w, "h": r.frame.h},
                "scaleOffset": r.uv.to_array(),
            }),
        );
    }
    json!({ "frames": frames, "meta": meta(snapshot) })
}

fn meta<K>(snapshot: &AtlasSnapshot<K>) -> Value {
    json!({
        "schemaVersion": "1",
        "app": "dynatlas",
        "version": env!("CARGO_PKG_VERSION"),
        "size": {"w": snapshot.width, "h": snapshot.height},
    })
}
