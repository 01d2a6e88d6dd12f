use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;

fn json_lines(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("every stdout line should be json"))
        .collect()
}

fn write(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("fixture dir should be created");
    }
    fs::write(&path, bytes).expect("fixture should be written");
    path
}

#[test]
fn classify_emits_stable_json_contract() {
    let output = cargo_bin_cmd!("docket-preview")
        .arg("classify")
        .arg("Exhibit-A.PDF")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value, serde_json::json!({"name": "Exhibit-A.PDF", "category": "document"}));
}

#[test]
fn classify_prefers_declared_content_type() {
    cargo_bin_cmd!("docket-preview")
        .arg("classify")
        .arg("recording.bin")
        .arg("--content-type")
        .arg("video/mp4; codecs=avc1")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""category":"video""#));
}

#[test]
fn classify_falls_back_to_unsupported() {
    cargo_bin_cmd!("docket-preview")
        .arg("classify")
        .arg("bundle.zip")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""category":"unsupported""#));
}

#[test]
fn inspect_text_file_reports_loading_then_ready() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "notes.txt", b"first page\x0csecond page");

    let output = cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event"], "loading");
    assert_eq!(events[0]["name"], "notes.txt");
    assert_eq!(events[1]["event"], "ready");
    assert_eq!(events[1]["category"], "plain_text");
    assert!(events[1]["source"]
        .as_str()
        .is_some_and(|source| source.starts_with("blob:docket-preview/")));
}

#[test]
fn inspect_document_resolves_signed_url() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "cases/1042/brief.pdf", b"%PDF-1.7\n");

    let output = cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .arg("--root")
        .arg(temp.path())
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    let ready = events.last().expect("a terminal event");
    assert_eq!(ready["category"], "document");
    assert!(ready["source"]
        .as_str()
        .is_some_and(|source| source.starts_with("file://") && source.contains("cases/1042/brief.pdf?expires=")));
}

#[test]
fn inspect_sniffs_files_without_extension() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "upload-17", b"\x89PNG\r\n\x1a\nnot really a png");

    cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""kind":"decode_failure""#))
        .stderr(predicate::str::contains("preview failed"));
}

#[test]
fn inspect_unsupported_offers_no_renderer() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "bundle.zip", b"PK\x03\x04");

    let output = cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let events = json_lines(&output);
    assert_eq!(events.last().expect("a terminal event")["event"], "unsupported");
}

#[test]
fn inspect_fails_for_invalid_text() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "notes.txt", &[0xff, 0xfe, 0x00]);

    cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""event":"error""#))
        .stderr(predicate::str::contains("preview failed: could not decode file"));
}

#[test]
fn inspect_fails_for_missing_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn inspect_rejects_file_outside_root() {
    let root = tempfile::tempdir().expect("temp dir should be created");
    let other = tempfile::tempdir().expect("temp dir should be created");
    let file = write(other.path(), "memo.txt", b"memo");

    cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .arg("--root")
        .arg(root.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("is not inside"));
}

#[test]
fn inspect_rejects_invalid_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "notes.txt", b"text");
    let config = write(temp.path(), "preview.toml", b"max_attempts = 0\n");

    cargo_bin_cmd!("docket-preview")
        .arg("inspect")
        .arg(&file)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[test]
fn inspect_applies_environment_configuration() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "notes.txt", b"text");

    cargo_bin_cmd!("docket-preview")
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env("DOCKET_PREVIEW_MAX_ATTEMPTS", "0")
        .arg("inspect")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load configuration"));
}

#[cfg(target_os = "linux")]
#[test]
fn inspect_reads_default_config_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "notes.txt", b"text");
    write(
        temp.path(),
        "config/docket-preview/preview.toml",
        b"handle_budget_mb = 0\n",
    );

    cargo_bin_cmd!("docket-preview")
        .env("XDG_CONFIG_HOME", temp.path().join("config"))
        .env_remove("DOCKET_PREVIEW_HANDLE_BUDGET_MB")
        .arg("inspect")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid value for configuration key: handle_budget_mb"));
}

#[test]
fn search_lists_matching_pages() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(
        temp.path(),
        "transcript.txt",
        b"Q. State your name.\x0cA. Objection.\x0cQ. Objection noted. OBJECTION sustained.",
    );

    let output = cargo_bin_cmd!("docket-preview")
        .arg("search")
        .arg(&file)
        .arg("objection")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value: Value = serde_json::from_slice(&output).expect("stdout should contain valid json");
    assert_eq!(value["page_count"], 3);
    assert_eq!(value["total_occurrences"], 3);
    assert_eq!(
        value["matches"],
        serde_json::json!([
            {"page": 2, "occurrences": 1},
            {"page": 3, "occurrences": 2}
        ])
    );
}

#[test]
fn search_fails_for_binary_file() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let file = write(temp.path(), "blob.txt", &[0xc3, 0x28]);

    cargo_bin_cmd!("docket-preview")
        .arg("search")
        .arg(&file)
        .arg("x")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to decode text file"));
}

#[test]
fn version_prints_crate_version() {
    cargo_bin_cmd!("docket-preview")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
