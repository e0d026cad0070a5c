use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use config::{EngineConfig, EngineConfigBuilder};
use memtable::Key;
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::{Engine, Scheduler, Stage};

/// Zero-delay, seeded configuration.
pub fn config() -> EngineConfigBuilder {
    EngineConfig::builder()
        .step_delay(Duration::ZERO)
        .rng_seed(7)
}

pub fn engine(cfg: EngineConfigBuilder) -> Engine {
    Engine::new(cfg.build()).unwrap()
}

pub fn s(k: &str) -> Key {
    Key::from(k)
}

pub fn int(n: i64) -> Key {
    Key::Int(n)
}

/// Puts `key=value` for every pair.
pub async fn put_all(engine: &Engine, pairs: &[(Key, &str)]) -> anyhow::Result<()> {
    for (k, v) in pairs {
        engine.put(k.clone(), *v).await?;
    }
    Ok(())
}

/// Records every stage and holds one of them until the gate opens.
pub struct GatedScheduler {
    gated: Stage,
    open: watch::Receiver<bool>,
    seen: Mutex<Vec<Stage>>,
}

impl GatedScheduler {
    pub fn new(gated: Stage) -> (Arc<Self>, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let sched = Arc::new(Self {
            gated,
            open: rx,
            seen: Mutex::new(Vec::new()),
        });
        (sched, tx)
    }

    pub fn seen(&self) -> Vec<Stage> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Scheduler for GatedScheduler {
    async fn pause(&self, stage: Stage, _delay: Duration) {
        self.seen.lock().push(stage);
        if stage == self.gated {
            let mut rx = self.open.clone();
            let opened = rx.wait_for(|open| *open).await.is_ok();
            assert!(opened, "gate sender dropped");
        } else {
            tokio::task::yield_now().await;
        }
    }
}

pub fn gated_engine(cfg: EngineConfigBuilder, stage: Stage) -> (Engine, Arc<GatedScheduler>, watch::Sender<bool>) {
    let (sched, gate) = GatedScheduler::new(stage);
    let engine = Engine::with_scheduler(cfg.build(), sched.clone()).unwrap();
    (engine, sched, gate)
}

/// Lets spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
