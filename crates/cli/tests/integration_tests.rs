/// Integration tests for the StrataKV CLI.
/// They drive the built binary over stdin with zero step delay.
use std::io::Write;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

/// Runs the CLI with `env`, feeds it `commands` followed by EXIT, and returns
/// stdout.
fn run_cli(env: &[(&str, &str)], commands: &str) -> Result<String> {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("STRATA_STEP_DELAY_MS", "0")
        .env("STRATA_SEED", "7")
        .env("RUST_LOG", "off")
        .envs(env.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn cli")?;

    {
        let stdin = child.stdin.as_mut().context("failed to open stdin")?;
        stdin.write_all(commands.as_bytes())?;
        stdin.write_all(b"EXIT\n")?;
    }

    let output = child.wait_with_output()?;
    assert!(output.status.success(), "cli exited with {}", output.status);
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

#[test]
fn put_then_get() -> Result<()> {
    let out = run_cli(&[], "PUT 1 one\nGET 1\n")?;
    assert!(out.contains("OK 1=one"));
    assert!(out.contains("one [memtable]"));
    assert!(out.contains("bye"));
    Ok(())
}

#[test]
fn set_alias_and_multi_word_value() -> Result<()> {
    let out = run_cli(&[], "SET 3 hello world\nGET 3\n")?;
    assert!(out.contains("hello world [memtable]"));
    Ok(())
}

#[test]
fn delete_hides_key() -> Result<()> {
    let out = run_cli(&[], "PUT 5 five\nDEL 5\nGET 5\n")?;
    assert!(out.contains("OK deleted 5"));
    assert!(out.contains("(nil) [deleted in memtable]"));
    Ok(())
}

#[test]
fn get_missing_key() -> Result<()> {
    let out = run_cli(&[], "GET 42\n")?;
    assert!(out.contains("(nil)"));
    Ok(())
}

#[test]
fn invalid_input_reports_errors() -> Result<()> {
    let out = run_cli(&[], "GET\nPUT abc v\nRANGE 1\nBOGUS\n")?;
    assert_eq!(out.matches("ERR").count(), 3, "{}", out);
    assert!(out.contains("unknown command: BOGUS"));
    Ok(())
}

#[test]
fn flush_lands_in_sstable() -> Result<()> {
    let commands = "PUT 1 a\nPUT 2 b\nWAIT\nGET 1\nSHOW\n";
    let out = run_cli(&[("STRATA_MEMTABLE_CAPACITY", "2")], commands)?;
    assert!(out.contains("a [sstable-0]"), "{}", out);
    assert!(out.contains("sstable-0 (gen 1, 2 entries)"));
    assert!(out.contains("wal (0): []"));
    Ok(())
}

#[test]
fn string_keys_and_range() -> Result<()> {
    let env = [("STRATA_KEY_KIND", "string"), ("STRATA_MEMTABLE_CAPACITY", "3")];
    let commands = "PUT a 1\nPUT b 2\nPUT c 3\nWAIT\nPUT b 22\nDEL c\nRANGE a z\n";
    let out = run_cli(&env, commands)?;
    assert!(out.contains("a = 1 [sstable-0]"), "{}", out);
    assert!(out.contains("b = 22 [memtable]"));
    assert!(!out.contains("c = 3"));
    assert!(out.contains("(2 entries)"));
    Ok(())
}

#[test]
fn leveled_strategy_from_env() -> Result<()> {
    let env = [
        ("STRATA_STRATEGY", "leveled"),
        ("STRATA_MEMTABLE_CAPACITY", "2"),
        ("STRATA_L0_THRESHOLD", "2"),
    ];
    let out = run_cli(&env, "PUT 1 a\nPUT 2 b\nPUT 3 c\nPUT 4 d\nWAIT\nSHOW\n")?;
    assert!(out.contains("strategy=leveled"));
    assert!(out.contains("L0 (0 files"), "{}", out);
    assert!(out.contains("L1 (1 files"));
    Ok(())
}

#[test]
fn config_command_switches_after_reset() -> Result<()> {
    let commands = "PUT 1 a\nCONFIG strategy leveled\nRESET\nCONFIG strategy leveled\nCONFIG bloom on\n";
    let out = run_cli(&[], commands)?;
    assert!(out.contains("ERR"), "{}", out);
    assert!(out.contains("OK reset"));
    assert!(out.contains("OK compaction strategy = leveled"));
    assert!(out.contains("OK bloom filters = true"));
    Ok(())
}

#[test]
fn stats_and_log() -> Result<()> {
    let commands = "PUT 1 a\nPUT 2 b\nFILL 2\nWAIT\nSTATS\nLOG\n";
    let out = run_cli(&[("STRATA_MEMTABLE_CAPACITY", "2")], commands)?;
    assert!(out.contains("OK (2 writes)"));
    assert!(out.contains("writes=4"), "{}", out);
    assert!(out.contains("write_amplification="));
    assert!(out.contains("FLUSH"));
    Ok(())
}

#[test]
fn malformed_env_fails_startup() -> Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("STRATA_MEMTABLE_CAPACITY", "lots")
        .env("RUST_LOG", "off")
        .stdin(Stdio::null())
        .output()?;
    assert!(!output.status.success());
    Ok(())
}
