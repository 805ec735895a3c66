use assert_cmd::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const ASSETS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/assets");

fn copy_assets() -> TempDir {
    let tmp = TempDir::new().expect("temp asset dir");
    for sub in ["shader", "texture"] {
        let source = Path::new(ASSETS).join(sub);
        let target = tmp.path().join(sub);
        fs::create_dir_all(&target).expect("create asset subdir");
        for entry in fs::read_dir(&source).expect("read bundled assets") {
            let entry = entry.expect("asset entry");
            fs::copy(entry.path(), target.join(entry.file_name())).expect("copy asset");
        }
    }
    tmp
}

fn heat_render() -> Command {
    Command::cargo_bin("heat-render").expect("binary exists")
}

#[test]
fn check_links_the_default_lesson() {
    heat_render()
        .args(["--check", "--assets", ASSETS])
        .assert()
        .success()
        .stdout(contains("Lesson multi-light"))
        .stdout(contains("program main_cube"))
        .stdout(contains("program lamp"))
        .stdout(contains("texture texture/spec_img.png: 256x256"))
        .stdout(contains("All 2 program(s) compiled and linked."));
}

#[test]
fn check_accepts_every_listed_lesson() {
    for lesson in ["triangle", "textured-quad", "cube", "lit-cube", "multi-light"] {
        heat_render()
            .args(["--check", "--assets", ASSETS, "--lesson", lesson])
            .assert()
            .success()
            .stdout(contains(format!("Lesson {lesson}")));
    }
}

#[test]
fn list_prints_lesson_names() {
    heat_render()
        .arg("--list")
        .assert()
        .success()
        .stdout(contains("triangle").and(contains("lit-cube")).and(contains("multi-light")));
}

#[test]
fn broken_shader_reports_the_faulty_line() {
    let assets = copy_assets();
    fs::write(
        assets.path().join("shader/lamp.frag.wgsl"),
        "@fragment\nfn fs_main() -> @location(0) vec4<f32> {\n    return vec4<f32>(1.0, 1.0 1.0, 1.0);\n}\n",
    )
    .expect("write broken shader");

    heat_render()
        .args(["--check", "--lesson", "lit-cube", "--assets"])
        .arg(assets.path())
        .assert()
        .failure()
        .stderr(contains("Error:"))
        .stderr(contains("lamp.frag.wgsl"))
        .stderr(contains("return vec4<f32>(1.0, 1.0 1.0, 1.0);"));
}

#[test]
fn missing_texture_is_fatal() {
    let assets = copy_assets();
    fs::remove_file(assets.path().join("texture/brick_01.png")).expect("remove texture");

    heat_render()
        .args(["--check", "--lesson", "cube", "--assets"])
        .arg(assets.path())
        .assert()
        .failure()
        .stderr(contains("brick_01.png"));
}

#[test]
fn unknown_arguments_are_rejected() {
    heat_render()
        .arg("--fullscreen")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"))
        .stderr(contains("Usage: heat-render"));
}

#[test]
fn unknown_lesson_is_rejected() {
    heat_render()
        .args(["--check", "--lesson", "teapot"])
        .assert()
        .failure()
        .stderr(contains("unknown lesson `teapot`"));
}
