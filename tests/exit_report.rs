//! The exit-time leak report runs from an `atexit` handler, so it is checked
//! by re-running this test binary as a child process that leaks on purpose.

use std::process::Command;

use guardheap::heap::{self, AllocKind};
use guardheap::Origin;

const CHILD_ENV: &str = "GUARDHEAP_EXIT_REPORT_CHILD";

fn run_child(mode: &str) -> std::process::Output {
    let output = Command::new(std::env::current_exe().unwrap())
        .args(["--exact", "exit_child", "--nocapture", "--test-threads=1"])
        .env(CHILD_ENV, mode)
        .output()
        .unwrap();
    assert!(output.status.success(), "child failed: {output:?}");
    output
}

/// Does nothing unless spawned by `run_child`. In `leak` mode two blocks are
/// left live; in `clean` mode everything is freed before exit.
#[test]
fn exit_child() {
    let Some(mode) = std::env::var_os(CHILD_ENV) else {
        return;
    };
    assert!(heap::install_exit_report());
    let tracker = heap::global();
    let v = tracker
        .allocate(24, Origin::new("exit.rs", 7), AllocKind::Vector)
        .unwrap();
    let s = tracker
        .allocate(0, Origin::new("exit.rs", 8), AllocKind::Scalar)
        .unwrap();
    if mode == "clean" {
        tracker.deallocate(v.as_ptr(), AllocKind::Vector).unwrap();
        tracker.deallocate(s.as_ptr(), AllocKind::Scalar).unwrap();
    }
}

#[test]
fn leaks_are_reported_at_exit() {
    let output = run_child("leak");
    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines: Vec<&str> = stderr.lines().collect();
    let start = lines
        .iter()
        .position(|l| *l == "Memory leaks detected")
        .unwrap_or_else(|| panic!("no leak report in child stderr:\n{stderr}"));
    let report = &lines[start..];

    assert!(report.contains(&"Scalar objects"));
    assert!(report.contains(&"Vector objects"));
    assert!(report.iter().any(|l| l.starts_with("exit.rs(7): 24 bytes at 0x")));
    assert!(report.iter().any(|l| l.starts_with("exit.rs(8): 1 bytes at 0x")));
    assert!(report.contains(&"Total bytes: 25"));
}

#[test]
fn clean_exit_prints_no_report() {
    let output = run_child("clean");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("Memory leaks detected"));
}
