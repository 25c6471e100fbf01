use assert_cmd::Command;
use assert_cmd::cargo;
use mockito::Server;
use predicates::prelude::*;
use tempfile::tempdir;

fn tooldrop() -> Command {
    let mut cmd = Command::new(cargo::cargo_bin!("tooldrop"));
    cmd.env_remove("TOOLDROP_BASE");
    cmd
}

#[test]
fn test_dryrun_install_touches_nothing() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/pypi/foo/json")
        .with_status(200)
        .with_body(r#"{"info": {"version": "1.0"}}"#)
        .create();
    let base = tempdir().unwrap();

    tooldrop()
        .arg("-n")
        .arg("--base")
        .arg(base.path())
        .arg("--index")
        .arg(format!("{}/simple", server.url()))
        .args(["--packager", "pex", "install", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "Would install foo 1.0 (as pex symlink, channel: latest)",
        ));

    assert_eq!(std::fs::read_dir(base.path()).unwrap().count(), 0);
}

#[test]
fn test_check_reports_not_installed() {
    let mut server = Server::new();
    let _mock = server
        .mock("GET", "/pypi/foo/json")
        .with_status(200)
        .with_body(r#"{"info": {"version": "2.1"}}"#)
        .create();
    let base = tempdir().unwrap();

    tooldrop()
        .env("TOOLDROP_BASE", base.path())
        .arg("--index")
        .arg(server.url())
        .args(["check", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("foo 2.1 is not installed"));
}

#[test]
fn test_list_without_packages() {
    let base = tempdir().unwrap();
    tooldrop()
        .arg("--base")
        .arg(base.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No packages installed."));
}

#[test]
fn test_unknown_packager() {
    let base = tempdir().unwrap();
    tooldrop()
        .arg("--base")
        .arg(base.path())
        .args(["--packager", "conda", "install", "foo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown packager 'conda'"));
}

#[test]
fn test_uninstall_unknown_package() {
    let base = tempdir().unwrap();
    tooldrop()
        .arg("--base")
        .arg(base.path())
        .args(["uninstall", "foo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("foo was not installed with tooldrop"));
}

#[test]
fn test_invalid_config_file() {
    let base = tempdir().unwrap();
    let meta = base.path().join(".tooldrop");
    std::fs::create_dir_all(&meta).unwrap();
    std::fs::write(meta.join("config.json"), "{ not json").unwrap();

    tooldrop()
        .arg("--base")
        .arg(base.path())
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid config file"));
}

#[test]
fn test_install_requires_a_name() {
    tooldrop()
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}
