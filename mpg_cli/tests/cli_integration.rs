use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

// Fixed fuel factor so results do not depend on the injector derivation
fn write_config(dir: &Path, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[vehicle]
pulses_per_distance = 5008
micros_per_quantity = 15500000

[engine]
arithmetic = "primitive"
{extra}
"#
    );
    let path = dir.join("mpg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn mpg(cfg: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mpg").unwrap();
    cmd.arg("--config").arg(cfg);
    cmd
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["programs"], 0, "fuel_econ", "stdout")]
#[case(&["programs", "--program", "speed"], 0, "ldtrip", "stdout")]
#[case(&["settings"], 0, "pulses_per_distance", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["evaluate"], 2, "required", "stderr")]
#[case(&["evaluate", "--quantity", "warp-factor"], 2, "no quantity called 'warp-factor'", "stderr")]
#[case(&["programs", "--program", "nope"], 2, "no program called", "stderr")]
#[case(&["settings", "--set", "tank_size"], 2, "NAME=VALUE", "stderr")]
#[case(&["settings", "--set", "injector_count=300"], 1, "does not fit", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let assert = mpg(&cfg).args(args).assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[test]
fn evaluate_reports_fuel_economy() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = mpg(&cfg)
        .args([
            "--json",
            "evaluate",
            "--quantity",
            "fuel-econ",
            "--trip",
            "tank",
            "--vss-pulses",
            "10016",
            "--inj-open-cycles",
            "484375",
        ])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["raw"], 20_000);
    assert_eq!(v["text"], "20.00");
    assert_eq!(v["overflow"], false);
}

#[test]
fn evaluate_without_fuel_overflows() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    mpg(&cfg)
        .args(["evaluate", "--quantity", "fuel-econ", "--vss-pulses", "100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fuel-econ (current): ----"));
}

#[test]
fn simulate_highway_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = mpg(&cfg)
        .args([
            "--json", "simulate", "--speed", "60", "--rpm", "2000", "--seconds", "6", "--trip",
            "tank",
        ])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    // 5008 pulses per mile at 60 mph is ~83 edges a second
    let speed = v["trips"]["tank"]["speed"]["raw"].as_u64().unwrap();
    assert!((59_800..=60_300).contains(&speed), "speed {speed}");
    assert!(v["vss_edges"].as_u64().unwrap() > 450);
    assert!(v["trips"]["tank"]["fuel-econ"]["value"].is_u64());
    assert!(v["trips"].get("instant").is_none());
}

#[test]
fn saved_trip_shows_in_listing() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mpg.eeprom");
    let extra = format!("\n[storage]\nimage = {:?}\n", image.to_str().unwrap());
    let cfg = write_config(dir.path(), &extra);

    mpg(&cfg)
        .args(["simulate", "--seconds", "2", "--save", "5"])
        .assert()
        .success();
    assert!(image.exists());

    let out = mpg(&cfg).args(["--json", "trips"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let slot = &v.as_array().unwrap()[5];
    assert!(slot["trip"]["vss_pulses"].as_u64().unwrap() > 0);
    assert!(v[0]["trip"].is_null());
}

#[test]
fn edited_setting_persists_across_runs() {
    let dir = tempdir().unwrap();
    let image = dir.path().join("mpg.eeprom");
    let extra = format!("\n[storage]\nimage = {:?}\n", image.to_str().unwrap());
    let cfg = write_config(dir.path(), &extra);

    let out = mpg(&cfg)
        .args(["--json", "settings", "--set", "tank_size=15000"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["tank_size"], 15_000);

    let out = mpg(&cfg).args(["--json", "settings"]).output().unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["tank_size"], 15_000);
    // pinned by the config file
    assert_eq!(v["micros_per_quantity"], 15_500_000);
}

#[test]
fn config_decimal_is_written_to_settings() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "\n[behavior]\nfuel_cost = \"2.459\"\n");
    let out = mpg(&cfg).args(["--json", "settings"]).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["fuel_cost"], 2_459);
}

#[test]
fn metric_switch_converts_settings() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "");
    let out = mpg(&cfg)
        .args(["--json", "settings", "--set", "metric_mode=1"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(v["metric_mode"], 1);
    assert_eq!(v["tank_size"], 68_137);
}

#[test]
fn invalid_config_is_explained() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "tick_cycles = 3");
    mpg(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("engine.tick_cycles must be a power of two"));
}

#[test]
fn json_errors_are_structured() {
    let dir = tempdir().unwrap();
    let cfg = write_config(dir.path(), "cycles_per_second = \"fast\"");
    let out = mpg(&cfg).args(["--json", "self-check"]).output().unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(v["reason"], "InvalidConfig");
    assert_eq!(v["code"], 3);
}
