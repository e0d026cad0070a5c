//! # CLI - StrataKV Interactive Shell
//!
//! A REPL over the simulated LSM engine. Reads commands from stdin, runs
//! them against the engine and prints results to stdout. Diagnostics go to
//! stderr through `tracing`. Works interactively or with commands piped in.
//!
//! ## Commands
//!
//! ```text
//! PUT [key] [value]     Insert or update (SET is an alias); missing parts are random
//! GET key               Look up a key (prints "value [source]" or "(nil)")
//! DEL key               Delete a key (writes a tombstone)
//! RANGE start end       Inclusive range query (SCAN is an alias)
//! FILL n                n random puts
//! CONFIG name value     memtable|strategy|threshold|l0|bloom|fence|delay
//! WAIT                  Block until flushes and compactions settle
//! SHOW                  Dump memtables, WAL and tables
//! STATS                 Counters and write amplification
//! LOG                   Recent engine events
//! RESET                 Discard all data, keep configuration
//! EXIT / QUIT           Shut down
//! ```
//!
//! ## Configuration
//!
//! Start-up settings come from `STRATA_*` environment variables (see
//! [`config::EngineConfig::from_env`]). Log filtering follows `RUST_LOG`,
//! defaulting to `warn,engine=info`.
//!
//! ## Example
//!
//! ```text
//! $ STRATA_STEP_DELAY_MS=0 cargo run -p cli
//! StrataKV started (strategy=size-tiered, memtable=5, keys=integer)
//! > PUT 1 one
//! OK 1=one
//! > GET 1
//! one [memtable]
//! > EXIT
//! bye
//! ```

use anyhow::Result;
use config::EngineConfig;
use engine::{Command, CommandOutcome, Engine, EngineSnapshot, Setting, TableStore};
use std::io::Write;
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "warn,engine=info";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cfg = EngineConfig::from_env()?;
    let engine = Engine::new(cfg.clone())?;
    info!(?cfg, "engine started");

    println!(
        "StrataKV started (strategy={}, memtable={}, keys={})",
        cfg.compaction_strategy, cfg.memtable_capacity, cfg.key_kind
    );
    println!("Commands: PUT [k] [v] | GET k | DEL k | RANGE s e | FILL n | CONFIG name value");
    println!("          WAIT | SHOW | STATS | LOG | RESET | EXIT");
    prompt();

    let mut lines = BufReader::new(io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            prompt();
            continue;
        };
        let args: Vec<&str> = parts.collect();
        debug!(cmd, ?args, "command");

        match cmd.to_uppercase().as_str() {
            "PUT" | "SET" => {
                let key = args.first().map(|s| s.to_string());
                let value = (args.len() > 1).then(|| args[1..].join(" "));
                run(&engine, Command::Put { key, value }).await;
            }
            "GET" => {
                let key = args.first().map(|s| s.to_string());
                run(&engine, Command::Get { key }).await;
            }
            "DEL" | "DELETE" => {
                let key = args.first().map(|s| s.to_string());
                run(&engine, Command::Delete { key }).await;
            }
            "RANGE" | "SCAN" => {
                let start = args.first().map(|s| s.to_string());
                let end = args.get(1).map(|s| s.to_string());
                run(&engine, Command::Range { start, end }).await;
            }
            "FILL" => match args.first().map(|n| n.parse::<usize>()) {
                Some(Ok(n)) => fill(&engine, n).await,
                _ => println!("ERR usage: FILL n"),
            },
            "CONFIG" => match (args.first(), args.get(1)) {
                (Some(name), Some(value)) => match Setting::parse(name, value) {
                    Ok(setting) => run(&engine, Command::Configure(setting)).await,
                    Err(e) => println!("ERR {}", e),
                },
                _ => println!("ERR usage: CONFIG <{}> value", Setting::NAMES.join("|")),
            },
            "WAIT" => {
                engine.wait_idle().await;
                println!("OK");
            }
            "SHOW" => show(&engine.snapshot()),
            "STATS" => stats(&engine.snapshot()),
            "LOG" => {
                for event in engine.snapshot().events {
                    println!("{}", event);
                }
            }
            "RESET" => run(&engine, Command::Reset).await,
            "EXIT" | "QUIT" => {
                println!("bye");
                break;
            }
            other => println!("unknown command: {}", other),
        }

        prompt();
    }

    engine.wait_idle().await;
    Ok(())
}

fn prompt() {
    print!("> ");
    std::io::stdout().flush().ok();
}

/// Executes `command` and prints its outcome.
async fn run(engine: &Engine, command: Command) {
    match engine.execute(command).await {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => println!("ERR {}", e),
    }
}

fn print_outcome(outcome: &CommandOutcome) {
    match outcome {
        CommandOutcome::Written(r) => println!("OK {}={}", r.key, r.display_value()),
        CommandOutcome::Deleted(r) => println!("OK deleted {}", r.key),
        CommandOutcome::Lookup(res) => println!("{}", res),
        CommandOutcome::Range(rows) if rows.is_empty() => println!("(empty)"),
        CommandOutcome::Range(rows) => {
            for row in rows {
                println!("{}", row);
            }
            println!("({} entries)", rows.len());
        }
        CommandOutcome::Reset => println!("OK reset"),
        CommandOutcome::Configured(setting) => println!("OK {}", setting),
    }
}

async fn fill(engine: &Engine, n: usize) {
    for _ in 0..n {
        if let Err(e) = engine.put_random(None).await {
            println!("ERR {}", e);
            return;
        }
    }
    println!("OK ({} writes)", n);
}

fn show(snap: &EngineSnapshot) {
    let join = |records: &[engine::Record]| {
        records
            .iter()
            .map(|r| format!("{}={}", r.key, r.display_value()))
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!(
        "memtable ({}/{}): [{}]",
        snap.memtable.len(),
        snap.config.memtable_capacity,
        join(&snap.memtable)
    );
    match &snap.immutable_memtable {
        Some(imm) => println!("immutable ({}): [{}]", imm.len(), join(imm)),
        None => println!("immutable: -"),
    }
    println!("wal ({}): [{}]", snap.wal.len(), join(&snap.wal));

    match &snap.tables {
        TableStore::SizeTiered(tables) => {
            for (i, t) in tables.iter().enumerate() {
                println!(
                    "sstable-{} (gen {}, {} entries): [{}]",
                    i,
                    t.generation(),
                    t.len(),
                    join(t.records())
                );
            }
        }
        TableStore::Leveled(levels) => {
            for (level, files) in levels.iter().enumerate() {
                let records: usize = files.iter().map(|f| f.len()).sum();
                println!("L{} ({} files, {} entries)", level, files.len(), records);
                for (i, f) in files.iter().enumerate() {
                    println!(
                        "  L{}-{} (gen {}): [{}]",
                        level,
                        i,
                        f.generation(),
                        join(f.records())
                    );
                }
            }
        }
    }
    println!(
        "generation={} round={} flushing={} compacting={}",
        snap.generation, snap.compaction_round, snap.flushing, snap.compacting
    );
}

fn stats(snap: &EngineSnapshot) {
    let s = &snap.stats;
    let c = &snap.counters;
    println!(
        "writes={} flushes={} flushed={} compactions={} compacted_in={} compacted_out={} tombstones_dropped={}",
        s.user_writes,
        s.flushes,
        s.records_flushed,
        s.compactions,
        s.records_compacted_in,
        s.records_compacted_out,
        s.tombstones_dropped
    );
    println!("write_amplification={:.2}", s.write_amplification());
    println!(
        "bloom_skips={} bloom_false_positives={} blocks_skipped={} files_skipped_by_range={}",
        c.bloom_skips, c.bloom_false_positives, c.blocks_skipped, c.files_skipped_by_range
    );
}
