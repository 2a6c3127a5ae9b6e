//! End-to-end tests for the `importsync` binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let ws = Self {
            dir: TempDir::new().unwrap(),
        };
        ws.write("config.json", "{}");
        ws
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.path(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("importsync").unwrap();
        cmd.current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.path("config.json"));
        cmd
    }

    fn sync(&self, extra: &[&str]) -> Command {
        let mut cmd = self.cmd();
        cmd.args(["sync", "--key", "id"]).args(extra);
        cmd
    }
}

fn stdout_json(output: &std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn seed_files(ws: &Workspace) {
    ws.write(
        "source.jsonl",
        "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"B\"}\n{\"id\":4,\"name\":\"d\"}\n",
    );
    ws.write(
        "dest.jsonl",
        "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n{\"id\":3,\"name\":\"c\"}\n",
    );
}

#[test]
fn test_full_sync_writes_output_and_changes() {
    let ws = Workspace::new();
    seed_files(&ws);

    let output = ws
        .sync(&[
            "-s", "source.jsonl", "-d", "dest.jsonl", "-o", "out.jsonl", "--changes",
            "changes.jsonl",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let json = stdout_json(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["summary"]["strategy"], "full");
    assert_eq!(json["summary"]["added"], 1);
    assert_eq!(json["summary"]["changed"], 1);
    assert_eq!(json["summary"]["removed"], 1);
    assert_eq!(json["summary"]["chunks"], 1);

    let out = read_lines(&ws.path("out.jsonl"));
    let names: Vec<&str> = out.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["a", "B", "d"]);
    assert_eq!(out[2]["id"], 4);

    let changes = read_lines(&ws.path("changes.jsonl"));
    let kinds: Vec<&str> = changes.iter().map(|c| c["type"].as_str().unwrap()).collect();
    assert_eq!(kinds, vec!["added", "changed", "removed"]);
    assert_eq!(changes[1]["before"]["name"], "b");
    assert_eq!(changes[1]["after"]["name"], "B");
}

#[test]
fn test_output_may_replace_the_destination_file() {
    let ws = Workspace::new();
    seed_files(&ws);

    ws.sync(&["-s", "source.jsonl", "-d", "dest.jsonl", "-o", "dest.jsonl", "--chunk-size", "1"])
        .assert()
        .success();

    let out = read_lines(&ws.path("dest.jsonl"));
    let names: Vec<&str> = out.iter().map(|r| r["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["a", "B", "d"]);
    assert!(!ws.path("dest.jsonl.tmp").exists());
}

#[test]
fn test_failed_run_writes_no_output() {
    let ws = Workspace::new();
    ws.write("source.jsonl", "{\"id\":1}\n{\"id\":3}\n{\"id\":2}\n");
    ws.write("dest.jsonl", "{\"id\":1}\n");

    let output = ws
        .sync(&[
            "-s", "source.jsonl", "-d", "dest.jsonl", "--chunk-size", "1", "-o", "out.jsonl",
            "--changes", "changes.jsonl",
        ])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    for name in ["out.jsonl", "out.jsonl.tmp", "changes.jsonl", "changes.jsonl.tmp"] {
        assert!(!ws.path(name).exists(), "{name}");
    }
}

#[test]
fn test_additive_sync_keeps_stale_records() {
    let ws = Workspace::new();
    seed_files(&ws);

    let output = ws
        .sync(&[
            "-s", "source.jsonl", "-d", "dest.jsonl", "--strategy", "additive", "--chunk-size",
            "1", "-o", "out.jsonl",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json = stdout_json(&output);
    assert_eq!(json["summary"]["removed"], 0);
    assert_eq!(json["summary"]["added"], 1);
    assert_eq!(read_lines(&ws.path("out.jsonl")).len(), 4);
}

#[test]
fn test_resync_of_output_is_a_noop() {
    let ws = Workspace::new();
    seed_files(&ws);

    ws.sync(&["-s", "source.jsonl", "-d", "dest.jsonl", "-o", "out.jsonl"])
        .assert()
        .success();
    let output = ws
        .sync(&["-s", "source.jsonl", "-d", "out.jsonl"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["summary"]["added"], 0);
    assert_eq!(json["summary"]["changed"], 0);
    assert_eq!(json["summary"]["removed"], 0);
}

#[test]
fn test_typed_csv_source_matches_json_destination() {
    let ws = Workspace::new();
    ws.write("source.csv", "id,name\n1,a\n2,b\n");
    ws.write("dest.jsonl", "{\"id\":1,\"name\":\"a\"}\n{\"id\":2,\"name\":\"b\"}\n");

    let output = ws
        .sync(&["-s", "source.csv", "-d", "dest.jsonl", "--typed"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["summary"]["changed"], 0);
    assert_eq!(stdout_json(&output)["summary"]["added"], 0);
}

#[test]
fn test_unsorted_input_is_rejected_unless_flagged() {
    let ws = Workspace::new();
    ws.write("source.jsonl", "{\"id\":2}\n{\"id\":1}\n");
    ws.write("dest.jsonl", "");

    let output = ws
        .sync(&["-s", "source.jsonl", "-d", "dest.jsonl"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "UNORDERED_STREAM");

    let output = ws
        .sync(&["-s", "source.jsonl", "-d", "dest.jsonl", "--unsorted"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["summary"]["added"], 2);
}

#[test]
fn test_missing_key_field_fails_build() {
    let ws = Workspace::new();
    ws.write("source.jsonl", "{\"name\":\"x\"}\n");
    ws.write("dest.jsonl", "");

    let output = ws
        .sync(&["-s", "source.jsonl", "-d", "dest.jsonl"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "BUILD_FAILED");
}

#[test]
fn test_database_destination_applies_changes() {
    let ws = Workspace::new();
    seed_files(&ws);
    let db = ws.path("items.db");
    let db_arg = db.to_str().unwrap();

    let output = ws
        .sync(&[
            "-s", "source.jsonl", "--db", db_arg, "--table", "items", "--content", "name",
            "--chunk-size", "2",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["summary"]["added"], 3);
    assert_eq!(json["applied"]["inserted"], 3);

    let conn = rusqlite::Connection::open(&db).unwrap();
    let names: Vec<String> = conn
        .prepare("SELECT name FROM items ORDER BY id")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["a", "B", "d"]);
    drop(conn);

    let output = ws
        .sync(&[
            "-s", "dest.jsonl", "--db", db_arg, "--table", "items", "--content", "name",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["applied"]["inserted"], 1);
    assert_eq!(json["applied"]["updated"], 1);
    assert_eq!(json["applied"]["deleted"], 1);
}

#[test]
fn test_dry_run_leaves_destination_untouched() {
    let ws = Workspace::new();
    seed_files(&ws);
    let db = ws.path("items.db");

    let output = ws
        .sync(&[
            "--dry-run", "-s", "source.jsonl", "--db", db.to_str().unwrap(), "--table", "items",
            "--content", "name",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["dry_run"], true);
    assert_eq!(json["summary"]["added"], 3);
    assert_eq!(json["applied"]["inserted"], 0);

    ws.sync(&["--dry-run", "-s", "source.jsonl", "-d", "dest.jsonl", "-o", "out.jsonl"])
        .assert()
        .success();
    assert!(!ws.path("out.jsonl").exists());
}

#[test]
fn test_db_requires_content_fields() {
    let ws = Workspace::new();
    seed_files(&ws);
    let output = ws
        .sync(&["-s", "source.jsonl", "--db", "x.db", "--table", "items"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
}

#[test]
fn test_invalid_config_file() {
    let ws = Workspace::new();
    seed_files(&ws);
    ws.write("config.json", "{\"chunk_size\":0}");
    let output = ws
        .sync(&["-s", "source.jsonl", "-d", "dest.jsonl"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(6));
}

#[test]
fn test_version_json() {
    let ws = Workspace::new();
    let output = ws.cmd().args(["version", "--json"]).output().unwrap();
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["name"], "importsync");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}
