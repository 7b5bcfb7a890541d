//! Smoke tests -- verify the binary runs and rejects bad setups.

use assert_cmd::Command;

const LOCATIONS: &str = r#"[{"iata": "ABC", "lat": 0, "lon": 0, "cca2": "US", "region": "North America", "city": "Abc City"}]"#;

#[test]
fn test_cli_help() {
    Command::cargo_bin("edgescout")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("fastest reachable CDN edge"))
        .stdout(predicates::str::contains("--speedtest"))
        .stdout(predicates::str::contains("--tcpurl"));
}

#[test]
fn test_cli_help_shows_defaults() {
    let output = Command::cargo_bin("edgescout")
        .unwrap()
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());

    let help = String::from_utf8(output.stdout).unwrap();
    for default in [
        "[default: ip.txt]",
        "[default: ip.csv]",
        "[default: 20]",
        "[default: 0]",
        "[default: www.speedtest.net]",
        "[default: speed.bestip.one/__down?bytes=50000000]",
    ] {
        assert!(help.contains(default), "help is missing {default}");
    }
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("edgescout")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("edgescout"));
}

#[test]
fn test_zero_concurrency_rejected() {
    Command::cargo_bin("edgescout")
        .unwrap()
        .args(["--max", "0"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("max concurrency must be at least 1"));
}

#[test]
fn test_missing_candidate_file_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let locations = dir.path().join("locations.json");
    std::fs::write(&locations, LOCATIONS).unwrap();
    let output = dir.path().join("ip.csv");

    Command::cargo_bin("edgescout")
        .unwrap()
        .arg("--file")
        .arg(dir.path().join("missing.txt"))
        .arg("--outfile")
        .arg(&output)
        .arg("--locations")
        .arg(&locations)
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to read candidate file"));

    assert!(!output.exists());
}

#[test]
fn test_bad_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("scan.toml");
    std::fs::write(&config, "[probe\nmax_concurrency = ").unwrap();

    Command::cargo_bin("edgescout")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicates::str::contains("failed to parse config file"));
}
