use std::fs;

use predicates::prelude::*;
use tempfile::tempdir;

const SAMPLE: &str = "#include <stdio.h>\n\n/* greeting */\nstatic int counter = 40;\n\nint main(void)\n{\n    const char *msg = \"hello world\";\n    counter += 2;\n    puts(msg);\n    return counter == 42 ? 0 : 1;\n}\n";

fn veil() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("veil");
    // Keep tests independent of a local clang install.
    cmd.env("VEIL_CLANG_BIN", "/nonexistent/veil-test-clang");
    cmd.env_remove("VEIL_CLANG_FAKE_JSON");
    cmd
}

/// Default output lands next to the input as `<stem>_obf.<ext>`.
#[test]
fn obfuscate_writes_default_output() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("hello.c");
    fs::write(&input, SAMPLE).expect("write input");

    veil()
        .arg("obfuscate")
        .arg(&input)
        .arg("--seed")
        .arg("7")
        .assert()
        .success()
        .stdout(predicate::str::contains("Obfuscated source:"))
        .stdout(predicate::str::contains("Strategy: token-based (fallback:"));

    let output = fs::read_to_string(dir.path().join("hello_obf.c")).expect("output written");
    assert!(output.starts_with("#include <stdio.h>\n"));
    assert!(!output.contains("\"hello world\""));
    assert!(!output.contains("greeting"));
    assert!(output.contains("int main(void)"));
}

/// The same seed yields byte-identical output.
#[test]
fn seeded_runs_are_reproducible() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    fs::write(&input, SAMPLE).expect("write input");
    let (a, b) = (dir.path().join("a.c"), dir.path().join("b.c"));

    for out in [&a, &b] {
        veil().arg("obfuscate").arg(&input).arg("-o").arg(out).arg("--seed").arg("99").assert().success();
    }
    assert_eq!(fs::read(&a).expect("a"), fs::read(&b).expect("b"));
}

/// --json emits the report with the flags reflected in it.
#[test]
fn json_report_reflects_flags() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    let out = dir.path().join("out.c");
    fs::write(&input, SAMPLE).expect("write input");

    let assert = veil()
        .arg("obfuscate")
        .arg(&input)
        .arg("--output")
        .arg(&out)
        .arg("--seed")
        .arg("3")
        .arg("--no-strings")
        .arg("--no-rename")
        .arg("--garbage-count")
        .arg("3")
        .arg("--no-opaque")
        .arg("--json")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("utf8");
    let json: serde_json::Value = serde_json::from_str(&stdout).expect("json output");
    let report = &json["report"];
    assert_eq!(report["seed"], 3);
    assert_eq!(report["renames"].as_object().map(|m| m.len()), Some(0));
    assert_eq!(report["literals"].as_array().map(Vec::len), Some(0));
    assert_eq!(report["dead_functions"].as_array().map(Vec::len), Some(3));
    assert_eq!(report["opaque_predicates"], 0);
    assert_eq!(json["output_sha256"].as_str().map(str::len), Some(64));
    assert!(fs::read_to_string(&out).expect("out").contains("\"hello world\""));
}

/// A YAML config file drives the pipeline.
#[test]
fn config_file_is_honored() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    let config = dir.path().join("veil.yaml");
    let out = dir.path().join("out.c");
    fs::write(&input, SAMPLE).expect("write input");
    fs::write(
        &config,
        "seed: 11\nenable_string_encryption: false\nenable_comment_stripping: false\npreserve_names: [counter]\n",
    )
    .expect("write config");

    veil().arg("obfuscate").arg(&input).arg("-o").arg(&out).arg("--config").arg(&config).assert().success();

    let output = fs::read_to_string(&out).expect("out");
    assert!(output.contains("/* greeting */"));
    assert!(output.contains("counter"));
    assert!(output.contains("\"hello world\""));
}

#[test]
fn invalid_coverage_is_rejected() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    fs::write(&input, SAMPLE).expect("write input");

    veil()
        .arg("obfuscate")
        .arg(&input)
        .arg("--coverage")
        .arg("1.5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("rename_coverage_ratio"));
    assert!(!dir.path().join("unit_obf.c").exists());
}

#[test]
fn missing_input_fails() {
    let dir = tempdir().expect("tempdir");
    veil()
        .arg("obfuscate")
        .arg(dir.path().join("missing.c"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read input file"));
}

#[test]
fn schemes_lists_presets() {
    veil()
        .arg("schemes")
        .assert()
        .success()
        .stdout(predicate::str::contains("- easy:"))
        .stdout(predicate::str::contains("- diff:"));

    let assert = veil().arg("schemes").arg("--json").assert().success();
    let json: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json output");
    assert_eq!(json[0]["name"], "easy");
    assert_eq!(json[0]["config"]["enable_string_encryption"], false);
    assert_eq!(json[1]["config"]["dead_code_count"], 2);
}

#[test]
fn inspect_prints_candidates() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    fs::write(&input, SAMPLE).expect("write input");

    veil()
        .arg("inspect")
        .arg(&input)
        .assert()
        .success()
        .stdout(predicate::str::contains("Strategy: token-based"))
        .stdout(predicate::str::contains("- counter [variable] x3"))
        .stdout(predicate::str::contains("main").not());

    let assert = veil().arg("inspect").arg(&input).arg("--json").assert().success();
    let json: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("json output");
    assert_eq!(json["strategy"], "token_based");
    assert_eq!(json["candidates"][0]["name"], "counter");
}

#[test]
fn unknown_scheme_is_a_usage_error() {
    let dir = tempdir().expect("tempdir");
    let input = dir.path().join("unit.c");
    fs::write(&input, SAMPLE).expect("write input");
    veil().arg("obfuscate").arg(&input).arg("--scheme").arg("hard").assert().failure();
}
