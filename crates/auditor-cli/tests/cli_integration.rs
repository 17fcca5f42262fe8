#![allow(deprecated)]

use assert_cmd::Command;
use predicates::str::contains;

const RECORDS: &str = r#"[
  {"subject_name": "Ana Lima", "counterparty_id": "11.111.111/0001-11", "counterparty_name": "Posto Sol",
   "description": "fuel", "amount": 320.5, "occurred_on": "2024-02-03"},
  {"subject_name": "Bruno Reis", "counterparty_id": "11111111000111", "counterparty_name": "Posto Sol",
   "description": "fuel", "amount": 1250.0, "occurred_on": "2024-03-10"},
  {"subject_name": "Carla Dias", "counterparty_id": "22222222000122", "counterparty_name": "Grafica Lua",
   "description": "printing", "amount": 80.0, "occurred_on": "2024-01-15"}
]"#;

const ENV_OVERRIDES: [&str; 7] = [
    "QDRANT_URL",
    "OPENAI_API_KEY",
    "AUDITOR_GENERATION_ENDPOINT",
    "AUDITOR_INDEX_DIR",
    "AUDITOR_GRAPH_SNAPSHOT",
    "AUDITOR_EMBEDDING_ENDPOINT",
    "AUDITOR_TOP_N",
];

fn auditor(cwd: &std::path::Path) -> Command {
    let mut cmd = Command::cargo_bin("ledger-auditor").expect("binary");
    cmd.current_dir(cwd);
    for key in ENV_OVERRIDES {
        cmd.env_remove(key);
    }
    cmd
}

fn loaded_workspace() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    std::fs::write(tmp.path().join("records.json"), RECORDS).expect("write records");
    auditor(tmp.path())
        .args(["load", "records.json"])
        .assert()
        .success()
        .stdout(contains("loaded 3 records (vectors=0)"));
    tmp
}

#[test]
fn load_then_retrieve_by_subject() {
    let tmp = loaded_workspace();

    auditor(tmp.path())
        .args(["retrieve", "fuel spending", "--subject", "ana"])
        .assert()
        .success()
        .stdout(contains("Transaction 1:\n- Subject: Ana Lima"))
        .stdout(contains("- Amount: 320.50"));
}

#[test]
fn graph_fanin_reports_json() {
    let tmp = loaded_workspace();

    auditor(tmp.path())
        .args([
            "retrieve",
            "who paid Posto Sol?",
            "--graph-mode",
            "counterparty-fanin",
            "--graph-param",
            "11.111.111/0001-11",
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains("\"kind\": \"records\""))
        .stdout(contains("\"strategy\": \"graph_pattern\""))
        .stdout(contains("Bruno Reis"));
}

#[test]
fn ask_without_matches_prints_fixed_message() {
    let tmp = loaded_workspace();
    std::fs::write(
        tmp.path().join("auditor.toml"),
        "[generation]\napi_key = \"sk-test\"\nendpoint = \"http://127.0.0.1:9/v1/chat/completions\"\n",
    )
    .expect("write config");

    auditor(tmp.path())
        .args(["ask", "who?", "--subject", "nobody"])
        .assert()
        .success()
        .stdout(contains("no relevant transaction records were found"));
}

#[test]
fn ask_without_generation_settings_fails() {
    let tmp = loaded_workspace();

    auditor(tmp.path())
        .args(["ask", "who?", "--subject", "nobody"])
        .assert()
        .failure()
        .stderr(contains("generation.api_key"));
}

#[test]
fn unconfigured_semantic_and_bad_threshold_fail() {
    let tmp = loaded_workspace();

    auditor(tmp.path())
        .args(["retrieve", "fuel"])
        .assert()
        .failure()
        .stderr(contains("semantic"));

    auditor(tmp.path())
        .args([
            "retrieve",
            "big ones",
            "--graph-mode",
            "amount-threshold",
            "--graph-param",
            "lots",
        ])
        .assert()
        .failure();
}
