#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};

use approval_core::{
    load_approval_config_from_env, ActorId, ActorProfile, ApprovalEngine, SegmentRegistry,
};

static INIT: Once = Once::new();

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = fixture("test_approval_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test approval config at {}",
            config_path.display()
        );

        std::env::set_var("APPROVAL_CONFIG_PATH", &config_path);
    });
}

pub fn fixture_registry() -> Arc<SegmentRegistry> {
    let registry = SegmentRegistry::from_file(&fixture("segments.json"))
        .expect("fixture segments should load");
    Arc::new(registry)
}

/// Engine over the five fixture segments with `actors` registered lazily.
pub fn fixture_engine(actors: &[u32]) -> Arc<ApprovalEngine> {
    ensure_test_config();
    let engine = ApprovalEngine::new(fixture_registry(), load_approval_config_from_env());
    for actor in actors {
        engine
            .register_actor(ActorProfile::new(ActorId(*actor)))
            .expect("fixture actors are distinct");
    }
    Arc::new(engine)
}

pub fn assert_close(actual: f32, expected: f32, tolerance: f32) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}
