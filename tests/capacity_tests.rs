use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use rec_postproc::storage::{
    Capacity, CapacityBackend, CleanupScheduler, LocalDrive, RemovableStream, ensure_capacity,
};
use tempfile::TempDir;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

fn write_file(path: &Path, size: usize, age_secs: u64) {
    let mut file = File::create(path).expect("create file");
    file.write_all(&vec![0u8; size]).expect("write file");
    file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .expect("set mtime");
}

fn age_dir(path: &Path, age_secs: u64) {
    File::open(path)
        .expect("open dir")
        .set_modified(SystemTime::now() - Duration::from_secs(age_secs))
        .expect("set dir mtime");
}

/// Local drive whose free space is a fixed base plus whatever was deleted,
/// so results do not depend on the host disk.
struct MeasuredDrive {
    drive: LocalDrive,
    base: Capacity,
    initial: Capacity,
}

impl MeasuredDrive {
    fn new(drive: LocalDrive, base: Capacity) -> Self {
        let initial = used(&drive);
        Self {
            drive,
            base,
            initial,
        }
    }
}

fn used(drive: &LocalDrive) -> Capacity {
    drive
        .scan()
        .expect("scan")
        .iter()
        .map(|entry| entry.size)
        .sum()
}

#[async_trait]
impl CapacityBackend for MeasuredDrive {
    fn name(&self) -> String {
        self.drive.name()
    }

    async fn available_capacity(&self) -> anyhow::Result<Capacity> {
        Ok(self.base + self.initial - used(&self.drive))
    }

    async fn removables(&self, cancel: CancellationToken) -> anyhow::Result<RemovableStream> {
        self.drive.removables(cancel).await
    }

    fn eviction_lease(&self) -> Option<&Mutex<()>> {
        self.drive.eviction_lease()
    }
}

#[tokio::test]
async fn test_local_evicts_only_the_oldest_file_needed() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("old.flv"), 5, 200);
    write_file(&dir.path().join("new.flv"), 10, 100);

    let backend = MeasuredDrive::new(LocalDrive::new(dir.path()), 0);
    ensure_capacity(&CancellationToken::new(), 5, &backend)
        .await
        .expect("capacity");

    assert!(!dir.path().join("old.flv").exists());
    assert!(dir.path().join("new.flv").exists());
}

#[tokio::test]
async fn test_local_evicts_both_files_for_larger_target() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("old.flv"), 5, 200);
    write_file(&dir.path().join("new.flv"), 10, 100);

    let backend = MeasuredDrive::new(LocalDrive::new(dir.path()), 0);
    ensure_capacity(&CancellationToken::new(), 12, &backend)
        .await
        .expect("capacity");

    assert!(!dir.path().join("old.flv").exists());
    assert!(!dir.path().join("new.flv").exists());
    assert!(dir.path().exists(), "root is never removed");
}

#[tokio::test]
async fn test_empty_subdirectory_is_evicted_first() {
    let dir = TempDir::new().expect("tempdir");
    let empty = dir.path().join("1234-someone");
    fs::create_dir(&empty).expect("mkdir");
    age_dir(&empty, 500);
    write_file(&dir.path().join("a.flv"), 5, 100);

    let backend = MeasuredDrive::new(LocalDrive::new(dir.path()), 0);
    ensure_capacity(&CancellationToken::new(), 5, &backend)
        .await
        .expect("capacity");

    assert!(!empty.exists());
    assert!(!dir.path().join("a.flv").exists());
}

#[tokio::test]
async fn test_unreachable_target_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("a.flv"), 5, 100);

    let backend = MeasuredDrive::new(LocalDrive::new(dir.path()), 0);
    let err = ensure_capacity(&CancellationToken::new(), 1_000, &backend)
        .await
        .expect_err("not enough data to free");

    assert!(err.is_exhausted());
    assert!(!dir.path().join("a.flv").exists());
}

#[tokio::test]
async fn test_empty_root_yields_nothing() {
    let dir = TempDir::new().expect("tempdir");
    let drive = LocalDrive::new(dir.path());

    let mut stream = drive
        .removables(CancellationToken::new())
        .await
        .expect("listing");
    assert!(stream.recv().await.is_none());
}

async fn wait_until_gone(path: &Path, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if !path.exists() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    !path.exists()
}

#[tokio::test]
async fn test_scheduler_cleans_on_signal() {
    let dir = TempDir::new().expect("tempdir");
    let room = dir.path().join("room");
    fs::create_dir(&room).expect("mkdir");
    write_file(&room.join("a.flv"), 5, 100);

    // unreachable reserve: every pass deletes all it can see
    let scheduler =
        CleanupScheduler::new(LocalDrive::new(dir.path()), Duration::from_secs(3600), u64::MAX);
    let cancel = CancellationToken::new();
    let (handle, join) = scheduler.spawn(cancel.clone());

    assert!(handle.request(1).expect("queued"));
    assert!(wait_until_gone(&room.join("a.flv"), Duration::from_secs(5)).await);

    cancel.cancel();
    join.await.expect("scheduler exits");
}

#[tokio::test]
async fn test_scheduler_cleans_on_timer() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir.path().join("a.flv"), 5, 100);

    let scheduler =
        CleanupScheduler::new(LocalDrive::new(dir.path()), Duration::from_millis(100), u64::MAX);
    let cancel = CancellationToken::new();
    let (_handle, join) = scheduler.spawn(cancel.clone());

    assert!(wait_until_gone(&dir.path().join("a.flv"), Duration::from_secs(5)).await);

    cancel.cancel();
    join.await.expect("scheduler exits");
}

#[tokio::test]
async fn test_scheduler_stops_on_cancel() {
    let dir = TempDir::new().expect("tempdir");
    let scheduler =
        CleanupScheduler::new(LocalDrive::new(dir.path()), Duration::from_secs(3600), 0);
    let cancel = CancellationToken::new();
    let (handle, join) = scheduler.spawn(cancel.clone());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), join)
        .await
        .expect("prompt exit")
        .expect("no panic");

    assert!(handle.request(1).is_err(), "signal queue closed after exit");
}
