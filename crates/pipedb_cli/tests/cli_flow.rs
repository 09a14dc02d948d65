use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::tempdir;

fn cli_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("pipedb"))
}

fn write(dir: &Path, name: &str, body: &str) -> String {
    let p = dir.join(name);
    std::fs::write(&p, body).expect("write fixture");
    p.to_str().unwrap().to_string()
}

const VERTEX: &str = "#version 450\nvoid main() { gl_Position = vec4(0.0, 0.0, 0.0, 1.0); }\n";

#[test]
fn build_info_extract() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path();
    write(dir, "quad.vert", VERTEX);
    let mat = write(
        dir,
        "quad.json",
        r#"{ "name": "quad", "renderpass": "forward", "depth_test": true, "shader_files": ["quad.vert"] }"#,
    );
    let db = dir.join("db.bin");
    let db = db.to_str().unwrap();

    cli_cmd()
        .args(["build", &mat, "-o", db])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 1 pipelines"));

    cli_cmd()
        .args(["info", db])
        .assert()
        .success()
        .stdout(predicate::str::contains("records=1"))
        .stdout(predicate::str::contains("[0] quad"))
        .stdout(predicate::str::contains("renderpass=forward"))
        .stdout(predicate::str::contains("stage 0: vertex offset=0"));

    let spv = dir.join("quad.spv");
    cli_cmd()
        .args(["extract", db, "--pipeline", "quad", "--stage", "0", "-o", spv.to_str().unwrap()])
        .assert()
        .success();
    let bytes = std::fs::read(&spv).unwrap();
    assert_eq!(u32::from_ne_bytes(bytes[..4].try_into().unwrap()), 0x0723_0203);
}

#[test]
fn missing_shader_is_skipped_or_rejected() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path();
    let mat = write(dir, "m.json", r#"{ "name": "lonely", "shader_files": ["absent.frag"] }"#);
    let db = dir.join("skip.bin");
    let db = db.to_str().unwrap();

    cli_cmd()
        .args(["build", &mat, "-o", db])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 1 pipelines"))
        .stderr(predicate::str::contains("absent.frag"));
    cli_cmd()
        .args(["info", db])
        .assert()
        .success()
        .stdout(predicate::str::contains("[0] lonely"))
        .stdout(predicate::str::contains("stage 0").not());

    let rejected = dir.join("reject.bin");
    cli_cmd()
        .args(["build", &mat, "--reject-partial", "-o", rejected.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 0 pipelines"));
}

#[test]
fn bad_material_does_not_fail_the_build() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path();
    let broken = write(dir, "broken.json", "{ not json");
    let good = write(dir, "good.json", r#"{ "pipelines": [ { "name": "a" }, { "name": "b" } ] }"#);
    let db = dir.join("out.bin");

    cli_cmd()
        .args(["build", &broken, &good, "-o", db.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote 2 pipelines"))
        .stderr(predicate::str::contains("broken.json"));
}

#[test]
fn tiny_arena_is_fatal() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path();
    let mat = write(dir, "m.json", r#"{ "name": "a" }"#);
    let db = dir.join("out.bin");

    cli_cmd()
        .args(["build", &mat, "--data-capacity", "64", "-o", db.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("out of space"));
    assert!(!db.exists());
}

#[test]
fn lookups_fail_loudly() {
    let tmp = tempdir().expect("tempdir");
    let dir = tmp.path();
    let mat = write(dir, "m.json", r#"{ "name": "a" }"#);
    let db = dir.join("out.bin");
    let db = db.to_str().unwrap();
    cli_cmd().args(["build", &mat, "-o", db]).assert().success();

    cli_cmd()
        .args(["extract", db, "--pipeline", "b", "--stage", "0", "-o", "unused.spv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("pipeline not found: b"));

    let garbage = write(dir, "garbage.bin", "xy");
    cli_cmd().args(["info", &garbage]).assert().failure();
}
