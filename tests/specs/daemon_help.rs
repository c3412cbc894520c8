// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Black-box checks of the ovd binary's fast paths.

use assert_cmd::Command;

#[test]
fn help_prints_usage_and_exits_zero() {
    Command::cargo_bin("ovd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Overseer Daemon"));
}

#[test]
fn version_prints_the_package_version() {
    Command::cargo_bin("ovd")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn unexpected_arguments_exit_nonzero() {
    Command::cargo_bin("ovd")
        .unwrap()
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(predicates::str::contains("unexpected argument"));
}
