// SPDX-License-Identifier: MIT

use super::*;
use yare::parameterized;

#[parameterized(
    log = { "stdout.log", ArtifactKind::Log },
    log_in_name = { "step-logs.txt", ArtifactKind::Log },
    diff = { "changes.diff", ArtifactKind::Diff },
    patch = { "fix.patch", ArtifactKind::Diff },
    report = { "qa-report.md", ArtifactKind::Report },
    qa_md = { "qa.md", ArtifactKind::Report },
    json = { "result.json", ArtifactKind::Json },
    text = { "notes.txt", ArtifactKind::Text },
    markdown = { "readme.md", ArtifactKind::Text },
    other = { "binary.bin", ArtifactKind::File },
)]
fn kind_inference(name: &str, expected: ArtifactKind) {
    assert_eq!(ArtifactKind::from_name(name), expected);
}

#[test]
fn serde_round_trip_preserves_equality() {
    let artifact = Artifact {
        id: ArtifactId::new(5),
        run_id: Some(RunId::new("r-1")),
        step_run_id: Some(StepRunId::new(2)),
        name: "stdout.log".into(),
        kind: ArtifactKind::Log,
        path: PathBuf::from("/tmp/steps/2/artifacts/stdout.log"),
        bytes: Some(128),
        created_at_ms: 3,
    };
    let json = serde_json::to_string(&artifact).unwrap();
    let back: Artifact = serde_json::from_str(&json).unwrap();
    assert_eq!(back, artifact);
}
