//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::process::Command;
use tempfile::TempDir;

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("moreright").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("wallet"));
}

#[test]
fn test_chat_help_shows_flags() {
    let mut cmd = Command::cargo_bin("moreright").unwrap();
    cmd.arg("chat").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--provider"))
        .stdout(predicate::str::contains("--server-url"))
        .stdout(predicate::str::contains("--debug"));
}

#[test]
fn test_wallet_address_from_env() {
    let tmp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("moreright").unwrap();
    cmd.current_dir(tmp.path())
        .env("WALLET_PRIVATE_KEY", DEV_KEY)
        .arg("wallet")
        .arg("address");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266",
        ));
}

#[test]
fn test_wallet_address_without_key_fails() {
    let tmp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("moreright").unwrap();
    cmd.current_dir(tmp.path())
        .env_remove("WALLET_PRIVATE_KEY")
        .arg("wallet")
        .arg("address");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("WALLET_PRIVATE_KEY is not set"));
}

#[test]
fn test_wallet_new_save_writes_env_file() {
    let tmp = TempDir::new().unwrap();

    let mut cmd = Command::cargo_bin("moreright").unwrap();
    cmd.current_dir(tmp.path())
        .arg("wallet")
        .arg("new")
        .arg("--save");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Address:"))
        .stdout(predicate::str::contains("0x"));

    let env = std::fs::read_to_string(tmp.path().join(".env")).unwrap();
    assert!(env.starts_with("WALLET_PRIVATE_KEY=0x"));
    assert_eq!(env.trim().len(), "WALLET_PRIVATE_KEY=".len() + 66);
}
