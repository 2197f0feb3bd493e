//! E2E tests for the `sreg` binary.
//!
//! Each test runs `sreg` as a subprocess against a register in its own temp
//! directory and checks the JSON contract.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Test Harness
// ---------------------------------------------------------------------------

fn db_path(dir: &Path) -> PathBuf {
    dir.join("register.sqlite3")
}

/// Build a Command targeting the sreg binary with its database in `dir`.
fn sreg(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sreg"));
    cmd.current_dir(dir);
    cmd.arg("--db").arg(db_path(dir));
    cmd.env("SREG_USER", "e2e");
    cmd.env("SREG_LOG", "error");
    cmd.env_remove("SREG_DB");
    cmd.env_remove("SREG_WRITABLE");
    cmd.env_remove("FORMAT");
    cmd
}

fn init_register(dir: &Path) {
    sreg(dir).args(["init", "--json"]).assert().success();
}

/// Run a command expected to succeed and parse its JSON stdout.
fn json_ok(dir: &Path, args: &[&str]) -> Value {
    let output = sreg(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("sreg should not crash");
    assert!(
        output.status.success(),
        "{args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON on stdout")
}

/// Run a command expected to fail and return the `error` object from stderr.
fn json_err(dir: &Path, args: &[&str]) -> Value {
    let output = sreg(dir)
        .args(args)
        .arg("--json")
        .output()
        .expect("sreg should not crash");
    assert!(!output.status.success(), "{args:?} unexpectedly succeeded");
    let value: Value = serde_json::from_slice(&output.stderr).expect("valid JSON on stderr");
    value["error"].clone()
}

fn create(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["unit", "create"];
    full.extend_from_slice(args);
    json_ok(dir, &full)["ref"]
        .as_str()
        .expect("ref field")
        .to_string()
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn init_creates_database_and_config() {
    let dir = TempDir::new().unwrap();
    let first = json_ok(dir.path(), &["init"]);
    assert_eq!(first["created"], true);
    assert_eq!(first["config_written"], true);
    assert_eq!(first["schema_version"], 2);
    assert!(dir.path().join("config.toml").exists());

    let second = json_ok(dir.path(), &["init"]);
    assert_eq!(second["created"], false);
    assert_eq!(second["config_written"], false);
}

#[test]
fn commands_before_init_report_not_initialized() {
    let dir = TempDir::new().unwrap();
    let error = json_err(dir.path(), &["unit", "list"]);
    assert_eq!(error["error_code"], "E1001");
    assert!(error["suggestion"].as_str().unwrap().contains("sreg init"));
}

#[test]
fn broken_config_reports_parse_error() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    std::fs::write(dir.path().join("config.toml"), "[graph\nmax_hops = ").unwrap();
    let error = json_err(dir.path(), &["unit", "list"]);
    assert_eq!(error["error_code"], "E1002");
}

// ---------------------------------------------------------------------------
// Units and links
// ---------------------------------------------------------------------------

#[test]
fn create_with_parent_sets_pointer() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let group = create(dir.path(), &["enterprise_group", "--name", "Holding"]);
    assert_eq!(group, "enterprise_group:1");

    let created = json_ok(
        dir.path(),
        &["unit", "create", "enterprise_unit", "--name", "Works", "--parent", &group],
    );
    assert_eq!(created["ref"], "enterprise_unit:1");
    assert_eq!(created["unit_type"], "enterprise_unit");
    assert_eq!(created["ent_group_id"], 1);
    assert_eq!(created["change_reason"], "create");
    assert_eq!(created["user_id"], "e2e");

    let error = json_err(
        dir.path(),
        &["unit", "create", "local_unit", "--name", "Shop", "--parent", &group],
    );
    assert_eq!(error["error_code"], "E2002");
}

#[test]
fn link_lifecycle_and_duplicate_errors() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let enterprise = create(dir.path(), &["enterprise_unit", "--name", "Works"]);
    let legal = create(dir.path(), &["legal_unit", "--name", "Acme"]);

    let linked = json_ok(dir.path(), &["link", "create", &enterprise, &legal]);
    assert_eq!(linked["child"], legal.as_str());
    assert_eq!(linked["parent"], enterprise.as_str());

    let check = json_ok(dir.path(), &["link", "check", &legal, &enterprise]);
    assert_eq!(check["exists"], true);
    assert_eq!(check["can_link"], true);
    assert_eq!(check["column"], "enterprise_unit_id");

    let duplicate = json_err(dir.path(), &["link", "create", &legal, &enterprise]);
    assert_eq!(duplicate["error_code"], "E2003");

    json_ok(dir.path(), &["link", "delete", &legal, &enterprise]);
    let missing = json_err(dir.path(), &["link", "delete", &legal, &enterprise]);
    assert_eq!(missing["error_code"], "E2004");

    let history = json_ok(dir.path(), &["unit", "history", &legal]);
    assert_eq!(history.as_array().unwrap().len(), 3);
    let verify = json_ok(dir.path(), &["unit", "verify", &legal]);
    assert_eq!(verify["versions"], 3);
    assert_eq!(verify["violations"].as_array().unwrap().len(), 0);
}

#[test]
fn unrelated_types_cannot_be_linked() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let error = json_err(dir.path(), &["link", "create", "local_unit:1", "enterprise_group:1"]);
    assert_eq!(error["error_code"], "E2002");
}

#[test]
fn legal_unit_takes_enterprise_or_group_not_both() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let group = create(dir.path(), &["enterprise_group", "--name", "Holding"]);
    let enterprise = create(dir.path(), &["enterprise_unit", "--name", "Works"]);

    let error = json_err(
        dir.path(),
        &["unit", "create", "legal_unit", "--name", "Acme", "--parent", &enterprise, "--parent", &group],
    );
    assert_eq!(error["error_code"], "E2007");

    let legal = create(dir.path(), &["legal_unit", "--name", "Acme", "--parent", &enterprise]);
    json_ok(dir.path(), &["link", "create", &legal, &group]);
    let old = json_ok(dir.path(), &["link", "check", &legal, &enterprise]);
    assert_eq!(old["exists"], false);
    assert_eq!(old["can_link"], false);
}

#[test]
fn graph_shows_chain_with_highlight() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let legal = create(dir.path(), &["legal_unit", "--name", "Acme"]);
    let local = create(dir.path(), &["local_unit", "--name", "Shop", "--parent", &legal]);

    let forest = json_ok(dir.path(), &["graph", &local]);
    let roots = forest.as_array().unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0]["unit"]["unit_type"], "legal_unit");
    assert_eq!(roots[0]["highlighted"], false);
    let children = roots[0]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["unit"]["unit_type"], "local_unit");
    assert_eq!(children[0]["highlighted"], true);
}

#[test]
fn graph_text_output_is_tab_separated() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let legal = create(dir.path(), &["legal_unit", "--name", "Acme"]);
    create(dir.path(), &["local_unit", "--name", "Shop", "--parent", &legal]);

    sreg(dir.path())
        .args(["--format", "text", "graph", "local_unit:1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0\tlegal_unit:1\t0\t0\tAcme"))
        .stdout(predicate::str::contains("1\tlocal_unit:1\t1\t0\tShop"));
}

#[test]
fn edit_and_diff_show_changed_fields() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let legal = create(dir.path(), &["legal_unit", "--name", "Acme", "--stat-id", "100"]);

    let edited = json_ok(
        dir.path(),
        &["unit", "edit", &legal, "--name", "Acme Ltd", "--correction", "--comment", "typo"],
    );
    assert_eq!(edited["name"], "Acme Ltd");
    assert_eq!(edited["change_reason"], "correction");
    assert_eq!(edited["edit_comment"], "typo");

    let diff = json_ok(dir.path(), &["unit", "diff", &legal]);
    let changes = diff.as_array().unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0]["field"], "name");
    assert_eq!(changes[0]["before"], "Acme");
    assert_eq!(changes[0]["after"], "Acme Ltd");

    let nothing = json_err(dir.path(), &["unit", "edit", &legal]);
    assert!(nothing["message"].as_str().unwrap().contains("nothing to edit"));
}

#[test]
fn writable_allow_list_is_enforced() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let legal = create(dir.path(), &["legal_unit", "--name", "Acme"]);

    let denied = json_err(
        dir.path(),
        &["--writable", "legal_unit.stat_id", "unit", "edit", &legal, "--name", "X"],
    );
    assert_eq!(denied["error_code"], "E2005");

    json_ok(
        dir.path(),
        &["--writable", "legal_unit.stat_id", "unit", "edit", &legal, "--stat-id", "9"],
    );
}

#[test]
fn delete_is_idempotent_and_hides_unit() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    let group = create(dir.path(), &["enterprise_group", "--name", "Holding"]);

    assert_eq!(json_ok(dir.path(), &["unit", "delete", &group])["changed"], true);
    assert_eq!(json_ok(dir.path(), &["unit", "delete", &group])["changed"], false);

    let error = json_err(dir.path(), &["unit", "show", &group]);
    assert_eq!(error["error_code"], "E2001");
    let shown = json_ok(dir.path(), &["unit", "show", &group, "--include-deleted"]);
    assert_eq!(shown["is_deleted"], true);

    assert_eq!(json_ok(dir.path(), &["unit", "list"]).as_array().unwrap().len(), 0);
    assert_eq!(json_ok(dir.path(), &["unit", "history", &group]).as_array().unwrap().len(), 2);

    assert_eq!(json_ok(dir.path(), &["unit", "undelete", &group])["changed"], true);
    assert_eq!(json_ok(dir.path(), &["unit", "list"]).as_array().unwrap().len(), 1);
}

// ---------------------------------------------------------------------------
// Classifications
// ---------------------------------------------------------------------------

const REGIONS: &str = r#"[
  {"id": 10, "code": "R0", "name": "Country"},
  {"id": 11, "code": "R1", "name": "Province", "parent_id": 10, "level": 1},
  {"id": 12, "code": "R2", "name": "District", "parent_id": 11, "level": 2}
]"#;

fn import_regions(dir: &Path) {
    std::fs::write(dir.join("regions.json"), REGIONS).unwrap();
    let report = json_ok(dir, &["class", "import", "region", "regions.json"]);
    assert_eq!(report["imported"], 3);
}

#[test]
fn ancestor_lookup_and_out_of_range_level() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    import_regions(dir.path());

    let ancestor = json_ok(dir.path(), &["class", "ancestor", "region", "12", "1"]);
    assert_eq!(ancestor["id"], 11);
    assert_eq!(ancestor["code"], "R1");

    let code = json_ok(
        dir.path(),
        &["class", "ancestor", "region", "12", "0", "--field", "code"],
    );
    assert_eq!(code["value"], "R0");

    let error = json_err(dir.path(), &["class", "ancestor", "region", "12", "5"]);
    assert_eq!(error["error_code"], "E4002");

    let missing = json_err(dir.path(), &["class", "path", "region", "99"]);
    assert_eq!(missing["error_code"], "E4001");
}

#[test]
fn path_and_subtree() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    import_regions(dir.path());

    let path = json_ok(dir.path(), &["class", "path", "region", "12"]);
    let codes: Vec<&str> = path
        .as_array()
        .unwrap()
        .iter()
        .map(|node| node["code"].as_str().unwrap())
        .collect();
    assert_eq!(codes, vec!["R0", "R1", "R2"]);

    let subtree = json_ok(dir.path(), &["class", "subtree", "region", "11"]);
    assert_eq!(subtree["ids"], serde_json::json!([11, 12]));
}

#[test]
fn list_by_region_subtree_and_rollup() {
    let dir = TempDir::new().unwrap();
    init_register(dir.path());
    import_regions(dir.path());
    create(dir.path(), &["local_unit", "--name", "Bakery", "--region", "12"]);
    create(dir.path(), &["local_unit", "--name", "Capital office", "--region", "10"]);
    create(dir.path(), &["local_unit", "--name", "Kiosk"]);

    let in_province = json_ok(dir.path(), &["unit", "list", "--region", "11"]);
    let names: Vec<&str> = in_province
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Bakery"]);

    let rollup = json_ok(dir.path(), &["unit", "rollup", "--level", "1"]);
    assert_eq!(rollup["counts"]["11"], 1);
    assert_eq!(rollup["unassigned"], 2);

    let shown = json_ok(dir.path(), &["unit", "show", "local_unit:1"]);
    let labels = shown["classifications"].as_array().unwrap();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0]["tree"], "region");
    assert_eq!(labels[0]["node"]["code"], "R2");
    assert_eq!(labels[0]["ancestor"]["code"], "R0");
}
