use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use pickup_ingest::fixtures;
use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_recogidas<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_recogidas"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute recogidas binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_recogidas(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "recogidas command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn payload_len(value: &Value) -> usize {
    value
        .get("payload")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or_else(|| panic!("missing array payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn write_workbook(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes)
        .unwrap_or_else(|err| panic!("failed to write workbook {}: {err}", path.display()));
    path
}

#[test]
fn import_list_search_export_and_clear_flow() {
    let dir = unique_temp_dir("recogidas-cli");
    let db = dir.join("recogidas.sqlite3");
    let db = path_str(&db);
    let workbook = write_workbook(
        &dir,
        "recogidas.xlsx",
        &fixtures::pickup_workbook(&[
            ["ACME", "Calle Mayor 1", "Madrid", "28001", "R12", "Ruta Norte"],
            ["ACME", "Calle Mayor 1", "Madrid", "28001", "R12", "Ruta Norte"],
            ["Globex", "Av. Oeste 9", "Sevilla", "41005", "R7", "Ruta Sur"],
            ["Initech", "", "Madrid", "28004", "R12", "Ruta Norte"],
        ])
        .unwrap_or_else(|err| panic!("failed to build workbook: {err}")),
    );

    let imported = run_json(["--db", db, "import", "--file", path_str(&workbook)]);
    assert_eq!(imported.get("contract_version").and_then(Value::as_str), Some("cli.v1"));
    assert_eq!(as_u64(&imported, "inserted"), 3);
    assert_eq!(as_u64(&imported, "skipped"), 1);

    assert_eq!(payload_len(&run_json(["--db", db, "list"])), 2);
    assert_eq!(payload_len(&run_json(["--db", db, "list", "--raw"])), 3);
    assert_eq!(payload_len(&run_json(["--db", db, "search", "--query", "sevilla"])), 1);

    let out = dir.join("out").join("recogidas.csv");
    let exported = run_json(["--db", db, "export", "--out", path_str(&out)]);
    assert_eq!(as_u64(&exported, "records"), 3);
    let body = fs::read_to_string(&out)
        .unwrap_or_else(|err| panic!("failed to read export {}: {err}", out.display()));
    assert_eq!(body.lines().count(), 4);

    let cleared = run_json(["--db", db, "clear"]);
    assert_eq!(as_u64(&cleared, "deleted"), 3);
    assert_eq!(as_u64(&run_json(["--db", db, "status"]), "records"), 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn import_of_narrow_workbook_fails_without_inserting() {
    let dir = unique_temp_dir("recogidas-cli-narrow");
    let db = dir.join("recogidas.sqlite3");
    let db = path_str(&db);
    let workbook = write_workbook(
        &dir,
        "narrow.xlsx",
        &fixtures::narrow_workbook(30, 2)
            .unwrap_or_else(|err| panic!("failed to build workbook: {err}")),
    );

    let output = run_recogidas(["--db", db, "import", "--file", path_str(&workbook)]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("required columns"), "unexpected stderr: {stderr}");

    assert_eq!(as_u64(&run_json(["--db", db, "status"]), "records"), 0);

    let _ = fs::remove_dir_all(&dir);
}
