use std::{
    fs, io,
    path::Path,
    process::{Command, Output},
};

use calseries_core::naming::format_file_name;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn cli_bin() -> &'static str {
    env!("CARGO_BIN_EXE_calseries")
}

fn run_cli(args: &[&str]) -> io::Result<Output> {
    Command::new(cli_bin()).args(args).output()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn assert_cli_success(output: &Output) {
    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn at(m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap()
}

/// One-minute files with a row every 10 seconds, under a day folder.
fn write_minutes(root: &Path, minutes: impl IntoIterator<Item = u32>) -> io::Result<()> {
    let day = root.join("2024_01_01");
    fs::create_dir_all(&day)?;
    for m in minutes {
        let mut body = String::from("time,strain\n");
        for i in 0..6 {
            let ts = at(m) + Duration::seconds(i * 10);
            body.push_str(&format!(
                "{},{}\n",
                ts.format("%Y-%m-%dT%H:%M:%S%.6fZ"),
                f64::from(m) + i as f64 / 10.0
            ));
        }
        fs::write(day.join(format_file_name("bidon", at(m), 1, 0)), body)?;
    }
    Ok(())
}

fn query_args<'a>(folder: &'a str, start: &'a str, stop: &'a str) -> Vec<&'a str> {
    vec!["--folder", folder, "--start", start, "--stop", stop, "--margin", "0"]
}

#[test]
fn locate_prints_candidates_in_order() -> TestResult {
    let tmp = TempDir::new()?;
    write_minutes(tmp.path(), 0..10)?;
    let folder = tmp.path().to_string_lossy().into_owned();

    let mut args = vec!["locate"];
    args.extend(query_args(&folder, "2024-01-01T00:02", "2024-01-01T00:07"));
    let output = run_cli(&args)?;
    assert_cli_success(&output);

    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].ends_with("bidon_1M_2024_01_01_00h02m_0_CALIBRATED.csv"));
    assert!(lines[4].ends_with("bidon_1M_2024_01_01_00h06m_0_CALIBRATED.csv"));
    Ok(())
}

#[test]
fn check_fails_on_gap() -> TestResult {
    let tmp = TempDir::new()?;
    write_minutes(tmp.path(), (0..10).filter(|m| *m != 5))?;
    let folder = tmp.path().to_string_lossy().into_owned();

    let mut args = vec!["check"];
    args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:10"));
    let output = run_cli(&args)?;
    assert!(!output.status.success());
    assert!(stdout(&output).contains("first gap"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not continuous"));

    let mut args = vec!["check"];
    args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:05"));
    let output = run_cli(&args)?;
    assert_cli_success(&output);
    assert!(stdout(&output).contains("continuous"));
    Ok(())
}

#[test]
fn merge_prints_preview() -> TestResult {
    let tmp = TempDir::new()?;
    write_minutes(tmp.path(), 0..10)?;
    let folder = tmp.path().to_string_lossy().into_owned();

    let mut args = vec!["merge"];
    args.extend(query_args(&folder, "2024-01-01T00:02", "2024-01-01T00:07"));
    args.extend(["--max-rows", "3"]);
    let output = run_cli(&args)?;
    assert_cli_success(&output);

    let out = stdout(&output);
    assert!(out.contains("Preview output"));
    assert!(out.contains("2024-01-01T00:02:00.000000Z"));
    assert!(out.contains("30 row(s)"));
    Ok(())
}

#[test]
fn merge_writes_csv_output() -> TestResult {
    let tmp = TempDir::new()?;
    let data = tmp.path().join("data");
    write_minutes(&data, 0..10)?;
    let folder = data.to_string_lossy().into_owned();
    let out_path = tmp.path().join("out").join("merged.csv");
    let out_str = out_path.to_string_lossy().into_owned();

    let mut args = vec!["merge"];
    args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:10"));
    args.extend(["--output", out_str.as_str()]);
    let output = run_cli(&args)?;
    assert_cli_success(&output);

    let text = fs::read_to_string(&out_path)?;
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("time,strain"));
    assert_eq!(text.lines().count(), 1 + 60);
    Ok(())
}

#[test]
fn merge_split_writes_one_file_per_window() -> TestResult {
    let tmp = TempDir::new()?;
    let data = tmp.path().join("data");
    write_minutes(&data, 0..10)?;
    let folder = data.to_string_lossy().into_owned();
    let out_dir = tmp.path().join("split");
    let out_str = out_dir.to_string_lossy().into_owned();

    let mut args = vec!["merge"];
    args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:10"));
    args.extend([
        "--split-minutes",
        "5",
        "--output-dir",
        out_str.as_str(),
        "--jobs",
        "2",
    ]);
    let output = run_cli(&args)?;
    assert_cli_success(&output);

    let mut names: Vec<String> = fs::read_dir(&out_dir)?
        .filter_map(|e| e.ok()?.file_name().into_string().ok())
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            "merged_5M_2024_01_01_00h00m_0_CALIBRATED.csv",
            "merged_5M_2024_01_01_00h05m_0_CALIBRATED.csv",
        ]
    );
    Ok(())
}

#[test]
fn merge_split_reports_failed_windows() -> TestResult {
    let tmp = TempDir::new()?;
    let data = tmp.path().join("data");
    write_minutes(&data, (0..10).filter(|m| *m != 7))?;
    let folder = data.to_string_lossy().into_owned();
    let out_dir = tmp.path().join("split");
    let out_str = out_dir.to_string_lossy().into_owned();

    let mut args = vec!["merge"];
    args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:10"));
    args.extend(["--split-minutes", "5", "--output-dir", out_str.as_str()]);
    let output = run_cli(&args)?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("1 of 2 window(s) failed"));
    // The healthy first window is still written.
    assert!(
        out_dir
            .join("merged_5M_2024_01_01_00h00m_0_CALIBRATED.csv")
            .exists()
    );
    Ok(())
}

#[test]
fn huge_split_minutes_is_rejected_cleanly() -> TestResult {
    let tmp = TempDir::new()?;
    write_minutes(tmp.path(), 0..2)?;
    let folder = tmp.path().to_string_lossy().into_owned();
    let out_dir = tmp.path().join("split");
    let out_str = out_dir.to_string_lossy().into_owned();

    for minutes in ["9223372036854775807", "0"] {
        let mut args = vec!["merge"];
        args.extend(query_args(&folder, "2024-01-01T00:00", "2024-01-01T00:02"));
        args.extend(["--split-minutes", minutes, "--output-dir", out_str.as_str()]);
        let output = run_cli(&args)?;
        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Invalid --split-minutes"), "stderr:\n{stderr}");
        assert!(!stderr.contains("panicked"));
    }
    Ok(())
}

#[test]
fn reject_inverted_flag() -> TestResult {
    let tmp = TempDir::new()?;
    write_minutes(tmp.path(), 0..5)?;
    let folder = tmp.path().to_string_lossy().into_owned();

    let mut args = vec!["locate"];
    args.extend(query_args(&folder, "2024-01-01T00:04", "2024-01-01T00:00"));
    let swapped = run_cli(&args)?;
    assert_cli_success(&swapped);
    assert_eq!(stdout(&swapped).lines().count(), 4);

    args.push("--reject-inverted");
    let rejected = run_cli(&args)?;
    assert!(!rejected.status.success());
    assert!(String::from_utf8_lossy(&rejected.stderr).contains("Invalid query range"));
    Ok(())
}

#[test]
fn bad_instant_is_reported() -> TestResult {
    let tmp = TempDir::new()?;
    let folder = tmp.path().to_string_lossy().into_owned();
    let mut args = vec!["locate"];
    args.extend(query_args(&folder, "tomorrow", "2024-01-01T00:00"));
    let output = run_cli(&args)?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid instant 'tomorrow'"));
    Ok(())
}
