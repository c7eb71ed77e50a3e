//! Upload coordination
//!
//! Drives concurrent file transfer tasks against the injected
//! [`FileTransport`], one tokio task per file plus one supervisor per
//! batch. The coordinator owns the per-task event ordering: zero or more
//! progress events (monotonically non-decreasing), then exactly one
//! terminal event (`complete` or `error`), and a single `batch end` once
//! every task in the batch has resolved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::FileTransport;
use crate::types::error::Result;
use crate::types::{StagedFile, UploadId};

/// Abort handle for one in-flight transfer
///
/// Cloned into the transport task and stored on the ledger entry; tripping
/// it from either side is safe and idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the abort flag. Returns `true` on the first call, `false` on repeats.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Handed back synchronously for each file passed to [`UploadCoordinator::start_uploads`]
#[derive(Debug, Clone)]
pub struct UploadHandle {
    pub file: StagedFile,
    pub upload_id: UploadId,
    pub cancel: CancelHandle,
}

/// Typed event stages for a batch of uploads
///
/// Implementations receive, per task: `on_progress` zero or more times,
/// then exactly one of `on_complete` / `on_error`; `on_batch_end` fires
/// once after every task in the batch resolved. The coordinator enforces
/// this ordering, observers do not need to defend against replays.
#[async_trait]
pub trait UploadObserver: Send + Sync {
    async fn on_progress(&self, _file: &StagedFile, _upload_id: &UploadId, _percent: u8) {}

    async fn on_error(&self, _file: &StagedFile, _upload_id: &UploadId, _reason: &str) {}

    async fn on_complete(&self, _file: &StagedFile, _upload_id: &UploadId, _attachment_id: &str) {}

    async fn on_batch_end(&self, _completed: &[UploadId], _failed: &[UploadId]) {}
}

/// A started batch whose transfer tasks are parked behind a gate
///
/// The tasks and the batch supervisor are already spawned, but no
/// transfer touches the transport until [`UploadBatch::begin`] releases
/// the gate. Callers stage the ledger entries for the allocated upload
/// ids first, so no task callback can outrun its own entry.
#[must_use = "transfers stay parked until begin() releases them"]
pub struct UploadBatch {
    handles: Vec<UploadHandle>,
    gate: Arc<Semaphore>,
}

impl UploadBatch {
    /// Release the transfer tasks and hand back the per-file handles
    pub fn begin(self) -> Vec<UploadHandle> {
        self.gate.add_permits(self.handles.len());
        self.handles
    }

    pub fn handles(&self) -> &[UploadHandle] {
        &self.handles
    }
}

/// Starts and supervises upload batches
pub struct UploadCoordinator {
    transport: Arc<dyn FileTransport>,
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn FileTransport>) -> Self {
        Self { transport }
    }

    /// Start one upload task per file
    ///
    /// Synchronously allocates an upload id and a cancel handle per file;
    /// the transfers run on spawned tasks and report through `observer`
    /// once the returned batch is released. An empty file list yields an
    /// empty batch: no tasks, no batch-end event.
    pub fn start_uploads(
        &self,
        files: Vec<StagedFile>,
        observer: Arc<dyn UploadObserver>,
    ) -> UploadBatch {
        let gate = Arc::new(Semaphore::new(0));

        if files.is_empty() {
            debug!("start_uploads called with no files");
            return UploadBatch {
                handles: Vec::new(),
                gate,
            };
        }

        let mut handles = Vec::with_capacity(files.len());
        let mut tasks = Vec::with_capacity(files.len());

        for file in files {
            let upload_id: UploadId = Uuid::new_v4().to_string();
            let cancel = CancelHandle::new();

            let handle = UploadHandle {
                file: file.clone(),
                upload_id: upload_id.clone(),
                cancel: cancel.clone(),
            };

            let transport = self.transport.clone();
            let observer = observer.clone();
            let task_gate = gate.clone();
            let task_id = upload_id.clone();
            tasks.push(tokio::spawn(async move {
                if let Ok(permit) = task_gate.acquire().await {
                    permit.forget();
                }
                let ok = run_task(transport, file, task_id.clone(), cancel, observer).await;
                (task_id, ok)
            }));

            handles.push(handle);
        }

        // Supervisor: waits for the whole batch, then fires the single
        // batch-end event with the completed/failed id partition.
        tokio::spawn(async move {
            let mut completed = Vec::new();
            let mut failed = Vec::new();
            for task in tasks {
                match task.await {
                    Ok((upload_id, true)) => completed.push(upload_id),
                    Ok((upload_id, false)) => failed.push(upload_id),
                    Err(err) => {
                        warn!("upload task aborted unexpectedly: {err}");
                    }
                }
            }
            observer.on_batch_end(&completed, &failed).await;
        });

        UploadBatch { handles, gate }
    }
}

/// Drive one transfer and forward its events in order
///
/// Progress sent by the transport just before it returned is drained and
/// forwarded before the terminal event, so observers never see progress
/// after completion. Decreasing percentages are dropped to keep the
/// reported sequence monotonic.
async fn run_task(
    transport: Arc<dyn FileTransport>,
    file: StagedFile,
    upload_id: UploadId,
    cancel: CancelHandle,
    observer: Arc<dyn UploadObserver>,
) -> bool {
    let (progress_tx, progress_rx) = flume::unbounded::<u8>();
    let mut transfer = Box::pin(transport.upload(&file, &upload_id, progress_tx, cancel));

    let mut last_percent = 0u8;
    let mut forward = |percent: u8| -> Option<u8> {
        let percent = percent.min(100);
        if percent < last_percent {
            debug!(
                "dropping out-of-order progress {percent} (at {last_percent}) for upload {upload_id}"
            );
            return None;
        }
        last_percent = percent;
        Some(percent)
    };

    let result: Result<String> = loop {
        tokio::select! {
            res = &mut transfer => break res,
            event = progress_rx.recv_async() => match event {
                Ok(percent) => {
                    if let Some(percent) = forward(percent) {
                        observer.on_progress(&file, &upload_id, percent).await;
                    }
                }
                // Transport dropped its sender; wait for the outcome.
                Err(_) => break (&mut transfer).await,
            },
        }
    };

    while let Ok(percent) = progress_rx.try_recv() {
        if let Some(percent) = forward(percent) {
            observer.on_progress(&file, &upload_id, percent).await;
        }
    }

    match result {
        Ok(attachment_id) => {
            debug!("upload {upload_id} completed as attachment {attachment_id}");
            observer
                .on_complete(&file, &upload_id, &attachment_id)
                .await;
            true
        }
        Err(err) => {
            warn!("upload {upload_id} failed: {err}");
            observer.on_error(&file, &upload_id, &err.to_string()).await;
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::error::ComposeError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Progress(String, u8),
        Error(String, String),
        Complete(String, String),
        BatchEnd(Vec<UploadId>, Vec<UploadId>),
    }

    struct Recorder {
        events: Mutex<Vec<Event>>,
        batch_done: flume::Sender<()>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, flume::Receiver<()>) {
            let (tx, rx) = flume::unbounded();
            (
                Arc::new(Self {
                    events: Mutex::new(Vec::new()),
                    batch_done: tx,
                }),
                rx,
            )
        }

        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UploadObserver for Recorder {
        async fn on_progress(&self, file: &StagedFile, _upload_id: &UploadId, percent: u8) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Progress(file.filename.clone(), percent));
        }

        async fn on_error(&self, file: &StagedFile, _upload_id: &UploadId, reason: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Error(file.filename.clone(), reason.to_string()));
        }

        async fn on_complete(&self, file: &StagedFile, _upload_id: &UploadId, attachment_id: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Complete(file.filename.clone(), attachment_id.to_string()));
        }

        async fn on_batch_end(&self, completed: &[UploadId], failed: &[UploadId]) {
            self.events
                .lock()
                .unwrap()
                .push(Event::BatchEnd(completed.to_vec(), failed.to_vec()));
            let _ = self.batch_done.send(());
        }
    }

    /// Scripted per-filename outcomes: progress percentages, then Ok/Err
    struct ScriptedTransport {
        scripts: Mutex<HashMap<String, (Vec<u8>, Result<String>)>>,
    }

    impl ScriptedTransport {
        fn new() -> Self {
            Self {
                scripts: Mutex::new(HashMap::new()),
            }
        }

        fn script(self, filename: &str, progress: Vec<u8>, outcome: Result<String>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert(filename.to_string(), (progress, outcome));
            self
        }
    }

    #[async_trait]
    impl FileTransport for ScriptedTransport {
        async fn upload(
            &self,
            file: &StagedFile,
            _upload_id: &UploadId,
            progress: flume::Sender<u8>,
            _cancel: CancelHandle,
        ) -> Result<String> {
            let (steps, outcome) = self
                .scripts
                .lock()
                .unwrap()
                .remove(&file.filename)
                .expect("unscripted file");
            for percent in steps {
                let _ = progress.send(percent);
                tokio::task::yield_now().await;
            }
            outcome
        }
    }

    /// Spins until its cancel handle trips, then reports the abort
    struct HangingTransport;

    #[async_trait]
    impl FileTransport for HangingTransport {
        async fn upload(
            &self,
            _file: &StagedFile,
            _upload_id: &UploadId,
            _progress: flume::Sender<u8>,
            cancel: CancelHandle,
        ) -> Result<String> {
            loop {
                if cancel.is_cancelled() {
                    return Err(ComposeError::Cancelled);
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        }
    }

    fn staged(name: &str) -> StagedFile {
        StagedFile {
            filename: name.to_string(),
            content_type: "application/octet-stream".to_string(),
            size: 42,
        }
    }

    #[tokio::test]
    async fn test_batch_partitions_completed_and_failed() {
        let transport = ScriptedTransport::new()
            .script("ok.txt", vec![30, 100], Ok("att-1".to_string()))
            .script("bad.txt", vec![10], Err(ComposeError::Transport("boom".into())));
        let coordinator = UploadCoordinator::new(Arc::new(transport));
        let (recorder, batch_done) = Recorder::new();

        let handles = coordinator
            .start_uploads(vec![staged("ok.txt"), staged("bad.txt")], recorder.clone())
            .begin();
        assert_eq!(handles.len(), 2);
        assert_ne!(handles[0].upload_id, handles[1].upload_id);

        batch_done.recv_async().await.unwrap();

        let events = recorder.events();
        let batch = events
            .iter()
            .filter_map(|e| match e {
                Event::BatchEnd(c, f) => Some((c.clone(), f.clone())),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(batch.len(), 1, "batch end must fire exactly once");
        let (completed, failed) = &batch[0];
        assert_eq!(completed, &vec![handles[0].upload_id.clone()]);
        assert_eq!(failed, &vec![handles[1].upload_id.clone()]);

        // Terminal events come last per file, after that file's progress.
        let ok_events: Vec<_> = events
            .iter()
            .filter(|e| {
                matches!(e, Event::Progress(f, _) | Event::Complete(f, _) if f == "ok.txt")
            })
            .collect();
        assert_eq!(
            ok_events.last(),
            Some(&&Event::Complete("ok.txt".to_string(), "att-1".to_string()))
        );
        assert!(events.contains(&Event::Error("bad.txt".to_string(), "Transport error: boom".to_string())));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let transport =
            ScriptedTransport::new().script("f.bin", vec![50, 40, 60], Ok("att-2".to_string()));
        let coordinator = UploadCoordinator::new(Arc::new(transport));
        let (recorder, batch_done) = Recorder::new();

        coordinator
            .start_uploads(vec![staged("f.bin")], recorder.clone())
            .begin();
        batch_done.recv_async().await.unwrap();

        let percents: Vec<u8> = recorder
            .events()
            .iter()
            .filter_map(|e| match e {
                Event::Progress(_, p) => Some(*p),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![50, 60]);
    }

    #[tokio::test]
    async fn test_cancel_handle_is_idempotent() {
        let coordinator = UploadCoordinator::new(Arc::new(HangingTransport));
        let (recorder, batch_done) = Recorder::new();

        let handles = coordinator
            .start_uploads(vec![staged("big.iso")], recorder.clone())
            .begin();
        let cancel = handles[0].cancel.clone();

        assert!(cancel.cancel(), "first cancel trips the flag");
        assert!(!cancel.cancel(), "second cancel is a no-op");
        assert!(cancel.is_cancelled());

        batch_done.recv_async().await.unwrap();
        let events = recorder.events();
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::Error(f, _) if f == "big.iso")));
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::BatchEnd(c, f) if c.is_empty() && f.len() == 1)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let coordinator = UploadCoordinator::new(Arc::new(ScriptedTransport::new()));
        let (recorder, _batch_done) = Recorder::new();

        let handles = coordinator.start_uploads(Vec::new(), recorder.clone()).begin();
        assert!(handles.is_empty());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(recorder.events().is_empty());
    }
}
