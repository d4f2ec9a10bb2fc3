//! Fetch orchestration against counting fake transports and an on-disk record store.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use datafetch_core::control::AbortToken;
use datafetch_core::transport::{
    DirectDownload, PollStatus, QueueSubmit, RemoteState, RemoteStatus, ResolveUrl,
    TransportError,
};
use datafetch_core::{
    FetchError, FetchOptions, FetchOutcome, Fetcher, RecordStatus, RecordStore,
    ResourceDescriptor, Route,
};
use tempfile::{tempdir, TempDir};

/// Job API fake: ids `Q1`, `Q2`, ... and a scripted poll sequence
/// (`pending` once the script runs out).
#[derive(Default)]
struct FakeJobs {
    submits: AtomicUsize,
    polls: AtomicUsize,
    reject_submit: bool,
    script: Mutex<VecDeque<RemoteStatus>>,
}

impl FakeJobs {
    fn new(script: Vec<RemoteStatus>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        })
    }

    fn push(&self, status: RemoteStatus) {
        self.script.lock().unwrap().push_back(status);
    }

    fn submits(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl QueueSubmit for FakeJobs {
    fn submit(&self, _: &ResourceDescriptor) -> Result<String, TransportError> {
        let n = self.submits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_submit {
            return Err(TransportError::Http {
                code: 403,
                message: Some("licence not accepted".into()),
            });
        }
        Ok(format!("Q{}", n))
    }
}

impl PollStatus for FakeJobs {
    fn poll(&self, _: &str, _: &AbortToken) -> Result<RemoteStatus, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(RemoteStatus::pending))
    }
}

/// Download fake: writes the URL as file content, optionally failing or blocking until aborted.
#[derive(Default)]
struct FakeDownload {
    calls: AtomicUsize,
    fail: bool,
    block_until_abort: bool,
    urls: Mutex<Vec<String>>,
}

impl FakeDownload {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DirectDownload for FakeDownload {
    fn download(&self, url: &str, tmp: &Path, abort: &AbortToken) -> Result<u64, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.urls.lock().unwrap().push(url.to_string());
        std::fs::write(tmp, url.as_bytes())?;
        if self.block_until_abort {
            while !abort.is_aborted() {
                std::thread::sleep(Duration::from_millis(10));
            }
            return Err(TransportError::Aborted);
        }
        if self.fail {
            return Err(TransportError::Incomplete {
                expected: 100,
                received: url.len() as u64,
            });
        }
        Ok(url.len() as u64)
    }
}

struct Prefix(&'static str);

impl ResolveUrl for Prefix {
    fn resolve(&self, d: &ResourceDescriptor) -> Result<String, TransportError> {
        Ok(format!("{}{}", self.0, d.name))
    }
}

struct Env {
    _state: TempDir,
    out: TempDir,
    store: RecordStore,
}

async fn env() -> Env {
    let state = tempdir().unwrap();
    let store = RecordStore::open_at(state.path().join("records.db"))
        .await
        .unwrap();
    Env {
        _state: state,
        out: tempdir().unwrap(),
        store,
    }
}

fn queued_fetcher(store: &RecordStore, jobs: &Arc<FakeJobs>, dl: &Arc<FakeDownload>) -> Fetcher {
    let route = Route::Queued {
        submit: jobs.clone(),
        poll: jobs.clone(),
    };
    Fetcher::new(store, route, dl.clone()).with_polling(Duration::from_millis(10), 60)
}

fn x_a1() -> ResourceDescriptor {
    ResourceDescriptor::new("X").param("a", 1i64)
}

fn downloaded_path(out: FetchOutcome) -> PathBuf {
    match out {
        FetchOutcome::Downloaded(p) => p,
        other => panic!("expected a download, got {:?}", other),
    }
}

#[tokio::test]
async fn end_to_end_queued_job_then_idempotent_refetch() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::completed("http://host/f")]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path());

    let path = downloaded_path(fetcher.fetch(&x_a1(), &opts).await.unwrap());
    assert_eq!(path, env.out.path().join("f"));
    assert_eq!(std::fs::read(&path).unwrap(), b"http://host/f");
    assert_eq!((jobs.submits(), jobs.polls(), dl.calls()), (1, 1, 1));

    let record = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(record.status, RecordStatus::Downloaded);
    assert_eq!(record.queue_id.as_deref(), Some("Q1"));
    assert_eq!(record.origin_url.as_deref(), Some("http://host/f"));
    assert_eq!(record.filepath.as_deref(), Some(path.to_str().unwrap()));
    assert_eq!(record.size, Some(13));
    assert!(record.date_queued.is_some() && record.date_queued_and_ready.is_some());
    assert!(record.date_start.is_some() && record.date_stop.is_some());

    // Same descriptor with params in another order: no remote calls at all.
    let again = ResourceDescriptor::new("X").param("a", 1i64);
    let path2 = downloaded_path(fetcher.fetch(&again, &opts).await.unwrap());
    assert_eq!(path2, path);
    assert_eq!((jobs.submits(), jobs.polls(), dl.calls()), (1, 1, 1));
}

#[tokio::test]
async fn pending_job_is_polled_not_resubmitted() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path());

    let out = fetcher.fetch(&x_a1(), &opts).await.unwrap();
    assert_eq!(
        out,
        FetchOutcome::Pending {
            queue_id: "Q1".into(),
            state: RemoteState::Pending
        }
    );

    jobs.push(RemoteStatus::completed("http://host/f"));
    let out = fetcher.fetch(&x_a1(), &opts).await.unwrap();
    assert_eq!(out.path(), Some(env.out.path().join("f").as_path()));
    assert_eq!((jobs.submits(), jobs.polls(), dl.calls()), (1, 2, 1));
}

#[tokio::test]
async fn bounded_polling_gives_up_pending() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl).with_polling(Duration::from_millis(10), 2);
    let opts = FetchOptions::new(env.out.path()).wait_until_complete(true);

    let out = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&x_a1(), &opts))
        .await
        .expect("bounded")
        .unwrap();
    assert!(out.is_pending());
    assert_eq!(jobs.polls(), 2);
    assert_eq!(dl.calls(), 0);
}

#[tokio::test]
async fn waiting_polls_until_completion() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![
        RemoteStatus::pending(),
        RemoteStatus::pending(),
        RemoteStatus::completed("http://host/data.grib"),
    ]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path()).wait_until_complete(true);

    let path = downloaded_path(fetcher.fetch(&x_a1(), &opts).await.unwrap());
    assert!(path.ends_with("data.grib"));
    assert_eq!(jobs.polls(), 3);
}

#[tokio::test]
async fn force_new_gets_a_new_queue_id() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path());

    fetcher.fetch(&x_a1(), &opts).await.unwrap();
    let first = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(first.status, RecordStatus::Queued);

    let out = fetcher
        .fetch(&x_a1(), &opts.clone().force_new(true))
        .await
        .unwrap();
    let second = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_ne!(second.queue_id, first.queue_id);
    assert_eq!(second.queue_id.as_deref(), Some("Q2"));
    assert_ne!(second.id, first.id);
    assert!(matches!(out, FetchOutcome::Pending { ref queue_id, .. } if queue_id == "Q2"));
    assert_eq!(env.store.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn crashed_download_is_restarted() {
    let env = env().await;
    let key = x_a1().key();
    let (mut r, _) = env.store.get_or_create(&key).await.unwrap();
    r.set_queued("Q7").unwrap();
    r.set_queued_and_ready("http://host/f").unwrap();
    r.set_start(None).unwrap();
    env.store.save(&mut r).await.unwrap();
    // Leftover temp file from the dead process.
    std::fs::write(env.out.path().join("f.tmp"), b"partial").unwrap();

    let jobs = FakeJobs::new(vec![]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let path = downloaded_path(
        fetcher
            .fetch(&x_a1(), &FetchOptions::new(env.out.path()))
            .await
            .unwrap(),
    );

    assert_eq!(std::fs::read(&path).unwrap(), b"http://host/f");
    assert!(!env.out.path().join("f.tmp").exists());
    assert_eq!((jobs.submits(), jobs.polls(), dl.calls()), (0, 0, 1));
    let r = env.store.get(&key).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Downloaded);
    assert_eq!(r.nb_try, 2);
}

#[tokio::test]
async fn deleted_file_is_downloaded_again() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::completed("http://host/f")]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path());

    let path = downloaded_path(fetcher.fetch(&x_a1(), &opts).await.unwrap());
    std::fs::remove_file(&path).unwrap();

    let path2 = downloaded_path(fetcher.fetch(&x_a1(), &opts).await.unwrap());
    assert_eq!(path2, path);
    assert!(path2.is_file());
    assert_eq!((jobs.submits(), jobs.polls(), dl.calls()), (1, 1, 2));
}

#[tokio::test]
async fn submission_failure_is_recorded() {
    let env = env().await;
    let jobs = Arc::new(FakeJobs {
        reject_submit: true,
        ..FakeJobs::default()
    });
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);

    let err = fetcher
        .fetch(&x_a1(), &FetchOptions::new(env.out.path()))
        .await
        .unwrap_err();
    match err {
        FetchError::Submission { message, .. } => assert!(message.contains("licence not accepted")),
        other => panic!("expected submission error, got {other}"),
    }
    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Failed);
    assert!(r.queue_id.is_none());
    assert_eq!(r.nb_try, 1);
    assert_eq!(jobs.submits(), 1);
}

#[tokio::test]
async fn remote_failure_keeps_error_text() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::failed("no data for 1850")]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);

    let err = fetcher
        .fetch(&x_a1(), &FetchOptions::new(env.out.path()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::RemoteJobFailed { ref queue_id, ref message, .. }
            if queue_id == "Q1" && message == "no data for 1850")
    );
    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Failed);
    assert_eq!(r.error.as_deref(), Some("no data for 1850"));
    assert_eq!(dl.calls(), 0);
}

#[tokio::test]
async fn unrecognized_state_is_fatal_and_untouched() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus {
        state: RemoteState::Unrecognized("hibernating".into()),
        origin_url: None,
        error: None,
    }]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let opts = FetchOptions::new(env.out.path()).wait_until_complete(true);

    let err = fetcher.fetch(&x_a1(), &opts).await.unwrap_err();
    assert!(matches!(err, FetchError::PollProtocol { .. }), "{err}");
    assert_eq!(jobs.polls(), 1);
    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Queued);
}

#[tokio::test]
async fn transfer_failure_leaves_no_partial_file() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::completed("http://host/f")]);
    let dl = Arc::new(FakeDownload {
        fail: true,
        ..FakeDownload::default()
    });
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);

    let err = fetcher
        .fetch(&x_a1(), &FetchOptions::new(env.out.path()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::Transfer { ref url, .. } if url == "http://host/f"));
    assert!(!env.out.path().join("f").exists());
    assert!(!env.out.path().join("f.tmp").exists());

    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Failed);
    assert_eq!(r.origin_url.as_deref(), Some("http://host/f"));

    // The retry goes straight to the download step.
    let ok_dl = Arc::new(FakeDownload::default());
    let retry = queued_fetcher(&env.store, &jobs, &ok_dl);
    retry
        .fetch(&x_a1(), &FetchOptions::new(env.out.path()))
        .await
        .unwrap();
    assert_eq!((jobs.submits(), jobs.polls(), ok_dl.calls()), (1, 1, 1));
}

#[tokio::test]
async fn cancellation_during_download() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::completed("http://host/f")]);
    let dl = Arc::new(FakeDownload {
        block_until_abort: true,
        ..FakeDownload::default()
    });
    let fetcher = queued_fetcher(&env.store, &jobs, &dl);
    let token = AbortToken::new();
    let _timer = token.cancel_after(Duration::from_millis(100));
    let opts = FetchOptions::new(env.out.path()).abort_token(token);

    let err = fetcher.fetch(&x_a1(), &opts).await.unwrap_err();
    assert!(matches!(err, FetchError::Cancelled { .. }), "{err}");
    assert!(!env.out.path().join("f.tmp").exists());
    assert!(!env.out.path().join("f").exists());
    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Downloading);
}

#[tokio::test]
async fn cancellation_during_poll_wait() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = queued_fetcher(&env.store, &jobs, &dl).with_polling(Duration::from_secs(30), 10);
    let token = AbortToken::new();
    let opts = FetchOptions::new(env.out.path())
        .wait_until_complete(true)
        .abort_token(token.clone());

    let abort_via_control = {
        let control = Arc::clone(fetcher.control());
        let key = x_a1().key();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            control.request_abort(&key)
        })
    };
    let err = tokio::time::timeout(Duration::from_secs(5), fetcher.fetch(&x_a1(), &opts))
        .await
        .expect("poll wait must wake on abort")
        .unwrap_err();
    assert!(matches!(err, FetchError::Cancelled { .. }));
    assert!(abort_via_control.await.unwrap());
    assert!(token.is_aborted());
    let r = env.store.get(&x_a1().key()).await.unwrap().unwrap();
    assert_eq!(r.status, RecordStatus::Queued);
}

#[tokio::test]
async fn concurrent_fetches_of_one_key_submit_once() {
    let env = env().await;
    let jobs = FakeJobs::new(vec![RemoteStatus::completed("http://host/f")]);
    let dl = Arc::new(FakeDownload::default());
    let fetcher = Arc::new(queued_fetcher(&env.store, &jobs, &dl));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let fetcher = Arc::clone(&fetcher);
        let dir = env.out.path().to_path_buf();
        handles.push(tokio::spawn(async move {
            fetcher.fetch(&x_a1(), &FetchOptions::new(dir)).await
        }));
    }
    for h in handles {
        assert!(h.await.unwrap().unwrap().path().is_some());
    }
    assert_eq!((jobs.submits(), dl.calls()), (1, 1));
}

#[tokio::test]
async fn direct_route_resolves_and_redownloads_after_failure() {
    let env = env().await;
    let failing = Arc::new(FakeDownload {
        fail: true,
        ..FakeDownload::default()
    });
    let route = Route::Direct(Arc::new(Prefix("http://mirror/")));
    let d = ResourceDescriptor::new("obs.csv");
    let opts = FetchOptions::new(env.out.path());

    let fetcher = Fetcher::new(&env.store, route.clone(), failing.clone());
    assert!(matches!(
        fetcher.fetch(&d, &opts).await,
        Err(FetchError::Transfer { .. })
    ));

    let dl = Arc::new(FakeDownload::default());
    let fetcher = Fetcher::new(&env.store, route, dl.clone());
    let path = downloaded_path(fetcher.fetch(&d, &opts).await.unwrap());
    assert_eq!(path, env.out.path().join("obs.csv"));
    assert_eq!(dl.urls.lock().unwrap().as_slice(), ["http://mirror/obs.csv"]);

    fetcher.fetch(&d, &opts).await.unwrap();
    assert_eq!(dl.calls(), 1);
    let r = env.store.get(&d.key()).await.unwrap().unwrap();
    assert_eq!(r.nb_try, 2);
    assert!(r.queue_id.is_none());
}
