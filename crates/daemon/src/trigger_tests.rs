use super::*;
use crate::coalescer::ChangeKind;
use openduckbill_core::config::{BackupMethod as RawBackupMethod, GlobalConfig as CoreGlobalConfig};
use openduckbill_core::FakeClock;
use std::sync::atomic::{AtomicUsize, Ordering};

fn local_destination() -> Arc<Destination> {
    let config = CoreGlobalConfig {
        backup_method: RawBackupMethod::Local,
        sync_interval_secs: 10,
        commit_threshold: 5,
        maintain_previous: false,
        retain_backups: true,
        retention_secs: 604_800,
        server: None,
        remote_mount: None,
        local_mount: Some("/mnt/bk".into()),
        ssh_port: 22,
        ssh_user: None,
        global_excludes: vec![],
    };
    Arc::new(Destination::new(&config, crate::command::CommandRunner::new(false)))
}

#[derive(Default)]
struct CountingFlushRunner {
    count: AtomicUsize,
}

#[async_trait]
impl FlushRunner for CountingFlushRunner {
    async fn flush(&self, _snapshot: Snapshot) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

fn engine(commit_threshold: u64) -> TriggerEngine<FakeClock> {
    TriggerEngine::new(
        Coalescer::new(),
        local_destination(),
        Duration::from_secs(10),
        commit_threshold,
        FakeClock::new(),
    )
}

#[tokio::test]
async fn idle_tick_with_no_events_does_nothing() {
    let e = engine(5);
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle);
}

#[tokio::test]
async fn volume_threshold_flushes_exactly_once_and_resets_the_coalescer() {
    let e = engine(5);
    for _ in 0..6 {
        e.coalescer.record(ChangeKind::Modify, PathBuf::from("/home/u/docs/a.txt"));
    }
    let runner = Arc::new(CountingFlushRunner::default());
    let dyn_runner: Arc<dyn FlushRunner> = runner.clone();

    assert_eq!(e.tick(&dyn_runner).await, TickOutcome::Flushed);

    // allow the spawned worker to run
    tokio::task::yield_now().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(runner.count.load(Ordering::SeqCst), 1);

    let snap = e.coalescer.snapshot();
    assert_eq!(snap.counter, 0);
    assert!(snap.paths.is_empty());

    // a second tick with no new events must not flush again
    assert_eq!(e.tick(&dyn_runner).await, TickOutcome::Idle);
}

#[tokio::test]
async fn quiescence_rule_flushes_on_the_third_consecutive_equal_snapshot() {
    let e = engine(100);
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/a"));
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/b"));
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/c"));
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());

    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "first observation, no streak yet");
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "idle_ticks == 1");
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "idle_ticks == 2");
    assert_eq!(e.tick(&runner).await, TickOutcome::Flushed, "idle_ticks == 3, quiescence flush");
}

#[tokio::test]
async fn a_change_in_the_counter_resets_the_idle_streak() {
    let e = engine(100);
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/a"));
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());

    assert_eq!(e.tick(&runner).await, TickOutcome::Idle);
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle);

    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/b"));
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "counter changed, idle streak resets to 0");
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "idle_ticks == 1 again");
    assert_eq!(e.tick(&runner).await, TickOutcome::Idle, "idle_ticks == 2");
    assert_eq!(e.tick(&runner).await, TickOutcome::Flushed, "idle_ticks == 3");
}

#[tokio::test]
async fn saturated_workers_skip_the_flush_and_grow_the_interval() {
    let e = engine(1);
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/a"));
    {
        let mut state = e.state.lock();
        for _ in 0..MAX_WORKERS {
            state.workers.push(tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }));
        }
    }
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());

    let before = e.current_interval();
    assert_eq!(e.tick(&runner).await, TickOutcome::WorkersSaturated);
    assert!(e.current_interval() > before, "interval grows by current_interval / 2 on saturation");
}

#[tokio::test]
async fn current_interval_never_drops_below_sync_interval() {
    let e = engine(1);
    {
        let mut state = e.state.lock();
        state.current_interval = Duration::from_secs(11);
    }
    e.coalescer.record(ChangeKind::Modify, PathBuf::from("/a"));
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());

    assert_eq!(e.tick(&runner).await, TickOutcome::Flushed);
    assert_eq!(e.current_interval(), Duration::from_secs(10), "halving clamps at sync_interval");
}

#[tokio::test]
async fn destination_unavailable_increments_fail_counter_until_self_terminate() {
    let config = CoreGlobalConfig {
        backup_method: RawBackupMethod::Nfs,
        sync_interval_secs: 10,
        commit_threshold: 5,
        maintain_previous: false,
        retain_backups: true,
        retention_secs: 604_800,
        server: Some("server".into()),
        remote_mount: Some("/export/backup".into()),
        local_mount: Some("/mnt/nonexistent-bk-mountpoint".into()),
        ssh_port: 22,
        ssh_user: None,
        global_excludes: vec![],
    };
    let destination = Arc::new(Destination::new(&config, crate::command::CommandRunner::new(false)));
    let e = TriggerEngine::new(
        Coalescer::new(),
        destination,
        Duration::from_secs(10),
        5,
        FakeClock::new(),
    );
    let runner: Arc<dyn FlushRunner> = Arc::new(CountingFlushRunner::default());

    for _ in 0..9 {
        assert_eq!(e.tick(&runner).await, TickOutcome::DestinationUnavailable);
    }
    assert!(e.destination_unavailable());
    assert_eq!(e.tick(&runner).await, TickOutcome::SelfTerminate, "fail_counter reached 10x sync_interval");
}
