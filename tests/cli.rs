use std::fs::{create_dir_all, write};
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn write_package(base: &Path, name: &str, root: &str, files: &[(&str, &str)]) -> PathBuf {
    let pkg = base.join(name);
    let vault = pkg.join("META-INF").join("vault");
    create_dir_all(&vault).expect("mkdir vault");
    write(
        vault.join("properties.xml"),
        format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE properties SYSTEM \"http://java.sun.com/dtd/properties.dtd\">\n\
             <properties>\n\
             <entry key=\"group\">acme</entry>\n\
             <entry key=\"name\">{name}</entry>\n\
             <entry key=\"version\">1.0</entry>\n\
             </properties>\n"
        ),
    )
    .expect("write properties.xml");
    write(
        vault.join("filter.xml"),
        format!("<workspaceFilter version=\"1.0\"><filter root=\"{root}\"/></workspaceFilter>\n"),
    )
    .expect("write filter.xml");
    for (repo_path, content) in files {
        let file = pkg.join("jcr_root").join(repo_path.trim_start_matches('/'));
        create_dir_all(file.parent().expect("parent")).expect("mkdir content");
        write(file, content).expect("write content");
    }
    pkg
}

fn pkgvet() -> Command {
    Command::cargo_bin("pkgvet").expect("binary")
}

#[test]
fn clean_package_passes() {
    let td = tempdir().expect("tempdir");
    let pkg = write_package(td.path(), "site", "/content/acme", &[("/content/acme/index.txt", "hi")]);

    pkgvet()
        .args(["scan", pkg.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: PASSED"))
        .stdout(predicate::str::contains("acme:site:1.0"));
}

#[test]
fn denied_paths_fail_the_scan() {
    let td = tempdir().expect("tempdir");
    let pkg = write_package(td.path(), "overlay", "/libs/acme", &[("/libs/acme/x.txt", "x")]);

    let assert = pkgvet()
        .args(["scan", pkg.to_str().unwrap(), "--format", "json"])
        .assert()
        .code(1);
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).expect("json report");
    assert_eq!(report["passed"], false);
    assert_eq!(report["overall_severity"], "MAJOR");
    assert!(report["violations"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["description"].as_str().unwrap().contains("/libs/acme")));

    pkgvet()
        .args(["scan", pkg.to_str().unwrap(), "--fail-on", "SEVERE"])
        .assert()
        .success();
}

#[test]
fn unknown_plan_is_fatal() {
    let td = tempdir().expect("tempdir");
    let pkg = write_package(td.path(), "site", "/content/acme", &[]);

    pkgvet()
        .args(["scan", pkg.to_str().unwrap(), "--plan", "no-such-plan", "--format", "json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"complete\": false"))
        .stderr(predicate::str::contains("unknown plan"));
}

#[test]
fn plan_files_configure_checks_and_pre_install() {
    let td = tempdir().expect("tempdir");
    let base = write_package(td.path(), "base", "/content/shared", &[("/content/shared/a.txt", "a")]);
    let pkg = write_package(td.path(), "site", "/content/shared/site", &[("/content/shared/site/b.txt", "b")]);
    let plan = td.path().join("plan.json");
    write(
        &plan,
        r#"{
  "checks": [{"name": "overlaps", "impl": "overlaps"}],
  "preInstallUrls": ["base"],
  "installHookPolicy": "PROHIBIT"
}"#,
    )
    .expect("write plan");

    let assert = pkgvet()
        .args(["scan", pkg.to_str().unwrap(), "--plan", plan.to_str().unwrap(), "--format", "json"])
        .assert()
        .code(1);
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).expect("json report");
    assert_eq!(report["pre_install"][0], "acme:base:1.0");
    assert!(base.exists());
    let violation = &report["violations"][0];
    assert!(violation["description"].as_str().unwrap().contains("overlaps the filter of acme:base:1.0"));
}

#[test]
fn report_renders_html() {
    let td = tempdir().expect("tempdir");
    let pkg = write_package(td.path(), "overlay", "/libs/acme", &[("/libs/acme/x.txt", "x")]);
    let json = td.path().join("report.json");
    let html = td.path().join("report.html");

    pkgvet()
        .args(["scan", pkg.to_str().unwrap(), "--format", "json", "--output", json.to_str().unwrap()])
        .assert()
        .code(1);
    pkgvet()
        .args(["report", json.to_str().unwrap(), "--output", html.to_str().unwrap()])
        .assert()
        .code(1);

    let rendered = std::fs::read_to_string(html).expect("read html");
    assert!(rendered.contains("<h1>Package Scan Report</h1>"));
    assert!(rendered.contains("<td>MAJOR</td>"));

    pkgvet()
        .args(["report", json.to_str().unwrap(), "--format", "text", "--fail-on", "SEVERE"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Result: PASSED (fail on SEVERE)"));

    pkgvet()
        .args(["report", json.to_str().unwrap(), "--format", "text", "--fail-on", "MINOR"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Result: FAILED (fail on MINOR)"));
}

#[test]
fn checks_lists_effective_checks() {
    pkgvet()
        .args(["checks"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pkgvet/basic/paths [paths]"))
        .stdout(predicate::str::contains("pkgvet/basic/overlaps [overlaps]"));

    pkgvet()
        .args(["checks", "--list-plans"])
        .assert()
        .success()
        .stdout(predicate::str::contains("empty"));
}
