use assert_cmd::Command;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MANIFEST: &str = r#"{
  "manifest_id": "cli-manifest",
  "tags_version": "t-1",
  "archetypes": [
    {"uid": "comfort", "meals": [
      {"meal_id": "c1", "name": "Stew", "tags": {"Diet": ["Omnivore"]}},
      {"meal_id": "c2", "name": "Pie", "tags": {"Diet": ["Omnivore"]}}
    ]},
    {"uid": "fresh", "meals": [
      {"meal_id": "f1", "name": "Salad", "tags": {"Diet": ["Vegan"]}},
      {"meal_id": "f2", "name": "Poke", "tags": {}}
    ]}
  ]
}"#;

const TAGS: &str = r#"{"version": "t-1", "tags": []}"#;

const USERS: &str = r#"{
  "u1": {"feedback": {"liked": ["f2"], "disliked": ["c1"]}}
}"#;

fn fixtures(dir: &Path) {
    fs::write(dir.join("manifest.json"), MANIFEST).unwrap();
    fs::write(dir.join("tags.json"), TAGS).unwrap();
    fs::write(dir.join("users.json"), USERS).unwrap();
}

fn run(dir: &Path, args: &[&str]) -> (Option<i32>, Value) {
    let output = Command::cargo_bin("mealrec")
        .expect("binary")
        .current_dir(dir)
        .env_remove("MEALREC_DEADLINE_MS")
        .env_remove("MEALREC_TARGET_COUNT")
        .arg("--quiet")
        .args(args)
        .output()
        .expect("command run");
    let body: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    (output.status.code(), body)
}

#[test]
fn filter_prints_pool_with_limit() {
    let temp = tempdir().unwrap();
    fixtures(temp.path());

    let (code, body) = run(
        temp.path(),
        &[
            "filter",
            "--manifest",
            "manifest.json",
            "--tags",
            "tags.json",
            "--declined",
            "c2",
            "--limit",
            "2",
        ],
    );
    assert_eq!(code, Some(0));
    assert_eq!(body["total_candidates"], 3);
    assert_eq!(body["returned_count"], 2);
    assert!(body["candidate_pool_id"]
        .as_str()
        .unwrap()
        .starts_with("pool_"));
}

#[test]
fn offline_recommend_excludes_disliked_and_persists_latest() {
    let temp = tempdir().unwrap();
    fixtures(temp.path());

    let (code, body) = run(
        temp.path(),
        &[
            "recommend",
            "--manifest",
            "manifest.json",
            "--tags",
            "tags.json",
            "--users",
            "users.json",
            "--user",
            "u1",
            "--session",
            "s-cli",
            "--count",
            "3",
            "--deadline-ms",
            "0",
            "--offline",
            "--persist",
            "out.jsonl",
        ],
    );
    assert_eq!(code, Some(0));
    assert_eq!(body["manifest_id"], "cli-manifest");
    assert_eq!(body["session_id"], "s-cli");
    let ids: Vec<&str> = body["meals"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["meal_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&"c1"));

    let persisted = fs::read_to_string(temp.path().join("out.jsonl")).unwrap();
    let latest: Vec<Value> = persisted
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .filter(|record: &Value| record["kind"] == "latest_recommendations")
        .collect();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0]["user_id"], "u1");
}

#[test]
fn impossible_constraints_print_error_envelope() {
    let temp = tempdir().unwrap();
    fixtures(temp.path());

    let (code, body) = run(
        temp.path(),
        &[
            "recommend",
            "--manifest",
            "manifest.json",
            "--tags",
            "tags.json",
            "--user",
            "u1",
            "--offline",
            "--request",
            r#"{"overrides": {"diets": ["Keto"]}}"#,
        ],
    );
    assert_eq!(code, Some(2));
    assert_eq!(body["code"], "no_candidates");
    assert!(body["hint"].is_string());
}

#[test]
fn schema_lists_every_wire_type() {
    let temp = tempdir().unwrap();
    let (code, body) = run(temp.path(), &["schema"]);
    assert_eq!(code, Some(0));
    for key in [
        "filter_response",
        "recommendation_request",
        "recommendation_response",
        "error",
    ] {
        assert!(body.get(key).is_some(), "missing schema {key}");
    }
}
