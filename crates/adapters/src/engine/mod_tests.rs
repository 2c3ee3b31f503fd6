// SPDX-License-Identifier: MIT

use super::*;
use serial_test::serial;

#[test]
fn metadata_builder() {
    let metadata = EngineMetadata::new("claude", "Claude CLI", EngineKind::Cli)
        .with_capability("code_gen")
        .with_capability("qa");
    assert_eq!(metadata.id, "claude");
    assert!(metadata.capabilities.contains("code_gen"));
    assert_eq!(
        serde_json::to_value(&metadata).unwrap()["kind"],
        "cli"
    );
}

#[test]
fn registry_register_get_unregister() {
    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(ScriptedEngine::new("a")));
    registry.register(Arc::new(ScriptedEngine::new("b")));
    assert_eq!(registry.ids(), vec!["a".to_string(), "b".to_string()]);
    assert!(registry.get("a").is_some());

    registry.unregister("a");
    assert!(!registry.has("a"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn reregistering_replaces() {
    let mut registry = EngineRegistry::new();
    registry.register(Arc::new(ScriptedEngine::new("a")));
    registry.register(Arc::new(ScriptedEngine::unavailable("a")));
    assert_eq!(registry.len(), 1);
}

#[test]
#[serial]
fn global_registry_round_trip() {
    reset_global_engine_registry();
    let registry = global_engine_registry();
    assert!(registry.read().is_empty());

    registry
        .write()
        .register(Arc::new(ScriptedEngine::new("probe")));
    assert!(global_engine_registry().read().has("probe"));

    reset_global_engine_registry();
    assert!(!global_engine_registry().read().has("probe"));
    reset_global_engine_registry();
}

#[tokio::test]
async fn scripted_engine_replays_responses() {
    let engine = ScriptedEngine::new("s")
        .respond_with("first")
        .fail_with("broken", 2);

    let request = EngineRequest {
        prompt: "p".into(),
        working_dir: std::path::PathBuf::from("."),
        model: None,
        env: vec![],
        timeout: Duration::from_secs(1),
    };
    let first = engine.execute(request.clone()).await.unwrap();
    assert_eq!(first.stdout, "first");
    let second = engine.execute(request).await.unwrap();
    assert_eq!(second.exit_code, 2);
    assert_eq!(engine.requests().len(), 2);
}
