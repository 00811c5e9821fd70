use dynatlas_core::prelude::*;
use dynatlas_core::{to_json_array, to_json_hash};

#[test]
fn export_json_shapes() {
    let mut atlas: DynamicAtlas<String> = DynamicAtlas::new(64, 32, 8).unwrap();
    atlas.ensure_slot("a".into(), 16, 8).unwrap();
    atlas.ensure_slot("b".into(), 16, 8).unwrap();
    let snap = atlas.snapshot();

    let arr = to_json_array(&snap);
    let regions = arr["regions"].as_array().expect("regions array");
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[0]["key"], "a");
    assert_eq!(regions[1]["frame"]["y"], 8);
    assert_eq!(arr["meta"]["size"]["w"], 64);
    assert_eq!(arr["meta"]["app"], "dynatlas");

    let hash = to_json_hash(&snap);
    let b = &hash["frames"]["b"];
    assert_eq!(b["frame"]["w"], 16);
    assert_eq!(b["scaleOffset"][3], 0.25);
}
