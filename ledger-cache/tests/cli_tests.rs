//! CLI integration tests for the cache inspection tool

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use assert_cmd::Command;
use chrono::NaiveDate;
use ledger_core::{BinaryWriter, CodecConfig, Entry, EntryState, Journal, Transaction};
use predicates::prelude::*;
use tempfile::TempDir;

fn sample_journal() -> Journal {
    let mut journal = Journal::new();
    let cash = journal.find_account("Assets:Cash", true).unwrap();
    let food = journal.find_account("Expenses:Food", true).unwrap();
    let spent = journal.commodities.parse_amount("4.50 USD").unwrap();
    let paid = journal.commodities.parse_amount("-4.50 USD").unwrap();
    journal.add_entry(
        Entry::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), "Coffee Shop")
            .with_state(EntryState::Cleared)
            .with_transaction(Transaction::new(food, spent))
            .with_transaction(Transaction::new(cash, paid)),
    );
    journal
}

fn set_mtime(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
}

/// Write a journal file and a cache built from it, returning both paths
fn cached_journal(dir: &TempDir, guards: bool) -> (PathBuf, PathBuf) {
    let source = dir.path().join("main.ledger");
    fs::write(&source, "2024/01/15 * Coffee Shop\n").unwrap();
    set_mtime(&source, 1_700_000_000);

    let cache = dir.path().join("main.cache");
    BinaryWriter::new(CodecConfig::default().with_guards(guards))
        .save_to_path(&cache, &sample_journal(), &[source.clone()])
        .unwrap();
    (source, cache)
}

fn ledger_cache() -> Command {
    let mut cmd = Command::cargo_bin("ledger-cache").unwrap();
    cmd.env_remove("LEDGER_CACHE_GUARDS").env_remove("LEDGER_CACHE_TRUST_MISSING");
    cmd
}

#[test]
fn test_help_output() {
    ledger_cache()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Inspect and validate Ledger binary journal caches"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_info_describes_image() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, false);

    ledger_cache()
        .arg("info")
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("format: plain"))
        .stdout(predicate::str::contains(source.display().to_string()))
        .stdout(predicate::str::contains("2023-11-14 22:13:20 UTC"))
        .stdout(predicate::str::contains("accounts: 4"))
        .stdout(predicate::str::contains("commodities: 1"))
        .stdout(predicate::str::contains("entries: 1"))
        .stdout(predicate::str::contains("transactions: 2"));
}

#[test]
fn test_info_detects_guarded_variant() {
    let dir = TempDir::new().unwrap();
    let (_, cache) = cached_journal(&dir, true);

    ledger_cache()
        .arg("info")
        .arg(&cache)
        .assert()
        .success()
        .stdout(predicate::str::contains("format: guarded"))
        .stdout(predicate::str::contains("entries: 1"));
}

#[test]
fn test_info_rejects_other_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "just some text that is not a cache").unwrap();

    ledger_cache()
        .arg("info")
        .arg(&path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not a ledger cache"));
}

#[test]
fn test_check_fresh_cache() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, false);

    ledger_cache()
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh: 1 entries"));
}

#[test]
fn test_check_modified_source_is_stale() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, false);
    set_mtime(&source, 1_800_000_000);

    ledger_cache()
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("stale:"));
}

#[test]
fn test_check_other_journal_is_stale() {
    let dir = TempDir::new().unwrap();
    let (_, cache) = cached_journal(&dir, false);
    let other = dir.path().join("other.ledger");
    fs::write(&other, "").unwrap();

    ledger_cache()
        .arg("check")
        .arg(&cache)
        .arg("-f")
        .arg(&other)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("stale:"));
}

#[test]
fn test_check_missing_source_policy() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, false);
    fs::remove_file(&source).unwrap();

    ledger_cache()
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .code(1)
        .stdout(predicate::str::starts_with("stale:"));

    ledger_cache()
        .arg("--trust-missing")
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh: 1 entries"));
}

#[test]
fn test_check_requires_matching_variant() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, true);

    ledger_cache()
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("image uses the guarded variant, expected plain"))
        .stdout(predicate::str::contains("--guards"));

    ledger_cache()
        .arg("--guards")
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("fresh: 1 entries"));
}

#[test]
fn test_check_reports_plain_variant_under_guards() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, false);

    ledger_cache()
        .arg("--guards")
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("image uses the plain variant, expected guarded"));
}

#[test]
fn test_check_rejects_other_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "just some text that is not a cache").unwrap();

    ledger_cache()
        .arg("check")
        .arg(&path)
        .arg("--file")
        .arg(dir.path().join("main.ledger"))
        .assert()
        .code(1)
        .stdout(predicate::str::diff("not a ledger cache\n"));
}

#[test]
fn test_guards_from_environment() {
    let dir = TempDir::new().unwrap();
    let (source, cache) = cached_journal(&dir, true);

    ledger_cache()
        .env("LEDGER_CACHE_GUARDS", "1")
        .arg("check")
        .arg(&cache)
        .arg("--file")
        .arg(&source)
        .assert()
        .success();
}

#[test]
fn test_missing_cache_file_is_an_error() {
    let dir = TempDir::new().unwrap();

    ledger_cache()
        .arg("info")
        .arg(dir.path().join("absent.cache"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("cannot open cache"));
}
