//! Shared setup for the headless integration tests.

#![allow(dead_code)]

use quilt_engine::backend::RecordingBackend;
use quilt_engine::scene::SceneCollectionDescription;
use quilt_engine::{Engine, EngineConfig};

/// Surface size of every test engine
pub const SURFACE: (u32, u32) = (64, 32);

/// Engine on a recording backend with nothing loaded
pub fn engine() -> Engine<RecordingBackend> {
    Engine::new(RecordingBackend::new(SURFACE.0, SURFACE.1), EngineConfig::default())
        .expect("recording engine")
}

/// Engine with the scenes of `json` loaded
pub fn engine_with(json: &str) -> Engine<RecordingBackend> {
    let mut engine = engine();
    let collection = SceneCollectionDescription::from_json_str(json).expect("valid scene json");
    engine.load_scenes(&collection, None);
    engine
}

/// One plane in front of a rig at z = 10, focused on the plane
pub const SINGLE_PLANE: &str = r#"{
    "scenes": {
        "main": {
            "cameraSize": 2.0,
            "focus": 10.0,
            "transform": { "position": [0, 0, 10] },
            "meshes": [{ "meshName": "quad" }]
        }
    }
}"#;
