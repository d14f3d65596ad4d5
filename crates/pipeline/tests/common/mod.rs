#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use studio_core::generation::EditParameters;
use studio_core::notification::ProviderReport;
use studio_db::models::job::Job;
use studio_db::repositories::AccountRepo;
use studio_pipeline::fetch::{ArtifactFetcher, FetchError};
use studio_pipeline::storage::{ArtifactStorage, StorageError};
use studio_pipeline::watermark::{WatermarkError, Watermarker};
use studio_pipeline::{Admission, GenerationRequest, OutcomeProcessor, PipelineConfig, Poller};
use studio_provider::{DispatchError, TaskDispatcher};

pub const DEVICE: &str = "device-1";
pub const IP: &str = "203.0.113.9";
pub const OUTPUT_URL: &str = "https://provider.example.com/outputs/result.jpg";
pub const ARTIFACT: &[u8] = b"provider jpeg bytes";

// ---------------------------------------------------------------------------
// Fake collaborators
// ---------------------------------------------------------------------------

/// Hands out sequential task ids; poll answers come from a queue.
#[derive(Default)]
pub struct FakeDispatcher {
    pub reject_submit: Mutex<Option<String>>,
    pub submissions: Mutex<Vec<(String, EditParameters, String)>>,
    pub poll_answers: Mutex<VecDeque<Result<ProviderReport, String>>>,
    pub polls: AtomicUsize,
    next_id: AtomicUsize,
}

impl FakeDispatcher {
    pub fn queue_poll(&self, answer: Result<ProviderReport, String>) {
        self.poll_answers.lock().unwrap().push_back(answer);
    }
}

#[async_trait]
impl TaskDispatcher for FakeDispatcher {
    async fn submit(
        &self,
        input_ref: &str,
        params: &EditParameters,
        callback_url: &str,
    ) -> Result<String, DispatchError> {
        if let Some(body) = self.reject_submit.lock().unwrap().clone() {
            return Err(DispatchError::Rejected { status: 422, body });
        }
        self.submissions.lock().unwrap().push((
            input_ref.to_string(),
            params.clone(),
            callback_url.to_string(),
        ));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("task-{n}"))
    }

    async fn poll(&self, _external_task_id: &str) -> Result<ProviderReport, DispatchError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.poll_answers.lock().unwrap().pop_front() {
            Some(Ok(report)) => Ok(report),
            Some(Err(msg)) => Err(DispatchError::Unreachable(msg)),
            None => Ok(ProviderReport::from_parts("processing", None, None)),
        }
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    pub fail: Mutex<bool>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl ArtifactFetcher for FakeFetcher {
    async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail.lock().unwrap() {
            return Err(FetchError::HttpStatus(502));
        }
        Ok(ARTIFACT.to_vec())
    }
}

/// Prefixes the bytes with `WM:` so tests can see it ran.
#[derive(Default)]
pub struct FakeWatermarker {
    pub calls: AtomicUsize,
}

impl Watermarker for FakeWatermarker {
    fn apply(&self, bytes: &[u8]) -> Result<Vec<u8>, WatermarkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = b"WM:".to_vec();
        out.extend_from_slice(bytes);
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_store: Mutex<bool>,
    pub stores: AtomicUsize,
    pub deletes: AtomicUsize,
    next: AtomicUsize,
}

impl MemoryStorage {
    pub fn get(&self, output_ref: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(output_ref).cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }
}

#[async_trait]
impl ArtifactStorage for MemoryStorage {
    async fn store(&self, bytes: Vec<u8>, ext: &str) -> Result<String, StorageError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if *self.fail_store.lock().unwrap() {
            return Err(StorageError::Backend("disk full".into()));
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        let output_ref = format!("/storage/{n}.{ext}");
        self.objects.lock().unwrap().insert(output_ref.clone(), bytes);
        Ok(output_ref)
    }

    async fn delete(&self, output_ref: &str) -> Result<(), StorageError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().remove(output_ref);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        public_base_url: Some("https://studio.example.com".to_string()),
        poll_after: Duration::ZERO,
        poll_interval: Duration::from_millis(1),
        poll_max_attempts: 3,
        ..PipelineConfig::default()
    }
}

pub struct Harness {
    pub pool: PgPool,
    pub config: Arc<PipelineConfig>,
    pub dispatcher: Arc<FakeDispatcher>,
    pub fetcher: Arc<FakeFetcher>,
    pub watermarker: Arc<FakeWatermarker>,
    pub storage: Arc<MemoryStorage>,
    pub processor: Arc<OutcomeProcessor>,
    pub admission: Admission,
    pub poller: Poller,
}

pub fn harness(pool: PgPool) -> Harness {
    harness_with(pool, test_config())
}

pub fn harness_with(pool: PgPool, config: PipelineConfig) -> Harness {
    let config = Arc::new(config);
    let dispatcher = Arc::new(FakeDispatcher::default());
    let fetcher = Arc::new(FakeFetcher::default());
    let watermarker = Arc::new(FakeWatermarker::default());
    let storage = Arc::new(MemoryStorage::default());

    let processor = Arc::new(OutcomeProcessor::new(
        pool.clone(),
        fetcher.clone(),
        watermarker.clone(),
        storage.clone(),
    ));
    let admission = Admission::new(pool.clone(), dispatcher.clone(), config.clone());
    let poller = Poller::new(pool.clone(), dispatcher.clone(), processor.clone(), &config);

    Harness {
        pool,
        config,
        dispatcher,
        fetcher,
        watermarker,
        storage,
        processor,
        admission,
        poller,
    }
}

pub fn request() -> GenerationRequest {
    GenerationRequest {
        input_ref: "https://cdn.example.com/uploads/in.png".to_string(),
        params: EditParameters::new("turn the sky purple", None, None),
    }
}

pub fn completed() -> ProviderReport {
    ProviderReport::completed(vec![OUTPUT_URL.to_string()])
}

impl Harness {
    /// A free job that has been dispatched and is now processing.
    pub async fn free_job(&self) -> Job {
        self.admission
            .submit_free(DEVICE, IP, request())
            .await
            .expect("free admission should succeed")
    }

    /// A paid job for a fresh account holding `balance` credits.
    pub async fn paid_job(&self, balance: i32) -> (i64, Job) {
        let account = AccountRepo::create(&self.pool, &format!("{}@example.com", uuid::Uuid::new_v4()))
            .await
            .unwrap();
        if balance > 0 {
            studio_db::repositories::CreditRepo::credit_for_purchase(
                &self.pool,
                account.id,
                &format!("cs_seed_{}", account.id),
                balance,
            )
            .await
            .unwrap();
        }
        let job = self
            .admission
            .submit_paid(account.id, request())
            .await
            .expect("paid admission should succeed");
        (account.id, job)
    }
}

pub fn task_id(job: &Job) -> String {
    job.external_task_id.clone().expect("dispatched job has a task id")
}
