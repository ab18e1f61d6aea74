//! Background jobs per asset: load, thumbnails, audio levels, proxy, cache.
//!
//! Assets talk to the [`TaskManager`] trait only. [`JobManager`] runs jobs on
//! a [`WorkerPool`], gives each job a [`CancelToken`], and reports progress as
//! [`JobEvent`]s on a crossbeam channel drained by the owner (the `Bin`).
//!
//! Cancellation is synchronous for the caller: `discard_jobs` returns after
//! every matching token is set. A job checks its token before reporting, and
//! events of discarded jobs are turned into `Cancelled` when drained, so a
//! late completion never reaches the asset.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::thumbs::Thumbnail;
use super::workers::WorkerPool;
use crate::entities::attrs::Attrs;
use crate::entities::clip_type::ClipType;
use crate::entities::factory::{ProducerError, ProducerFactory};
use crate::entities::handle::Producer;
use crate::entities::hash::digest_hex;
use crate::entities::keys::*;

pub type JobId = Uuid;

/// How long a blocking discard waits for running jobs
const DISCARD_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum JobKind {
    Load,
    Thumb,
    AudioLevels,
    Proxy,
    Cache,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Inputs of a job, snapshot at submission time.
#[derive(Debug, Clone, Default)]
pub struct JobParams {
    pub descriptor: Attrs,
    pub clip_type: ClipType,
    /// Frames to render (Thumb, Cache)
    pub frames: Vec<i32>,
    /// Audio stream (AudioLevels)
    pub stream: Option<i32>,
    /// Target file (Proxy)
    pub output: Option<PathBuf>,
    /// Load only refreshes thumbnails
    pub refresh_only: bool,
    pub force_audio_reload: bool,
}

impl JobParams {
    pub fn new(descriptor: Attrs, clip_type: ClipType) -> Self {
        Self {
            descriptor,
            clip_type,
            ..Default::default()
        }
    }

    pub fn with_frames(mut self, frames: Vec<i32>) -> Self {
        self.frames = frames;
        self
    }

    pub fn with_stream(mut self, stream: i32) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = Some(output);
        self
    }
}

/// Result payload of a finished job.
#[derive(Debug, Clone)]
pub enum JobOutput {
    Producer(Producer),
    Thumbnails(Vec<(i32, Thumbnail)>),
    AudioLevels { stream: i32, levels: Vec<f32> },
    Proxy(PathBuf),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error(transparent)]
    Producer(#[from] ProducerError),
    #[error("io error on {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("{0}")]
    Unsupported(String),
    #[error("cancelled")]
    Cancelled,
}

impl JobError {
    fn io(path: &Path, e: std::io::Error) -> Self {
        JobError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum JobStatus {
    Pending,
    Running,
    Done(JobOutput),
    Failed(JobError),
    Cancelled,
}

impl JobStatus {
    pub fn is_final(&self) -> bool {
        matches!(self, JobStatus::Done(_) | JobStatus::Failed(_) | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct JobEvent {
    pub id: JobId,
    pub asset_id: String,
    pub kind: JobKind,
    pub status: JobStatus,
}

/// Shared cancellation flag of one job.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Task manager collaborator used by assets.
pub trait TaskManager: Send + Sync {
    fn start_job(&self, kind: JobKind, asset_id: &str, params: JobParams) -> JobId;
    /// Cancel jobs of an asset (all kinds when `kind` is `None`). With
    /// `blocking`, also wait until running ones have stopped.
    fn discard_jobs(&self, asset_id: &str, kind: Option<JobKind>, blocking: bool);
    fn has_pending_job(&self, asset_id: &str, kind: Option<JobKind>) -> bool;
}

/// Executes one job. Implementations must poll `cancel` in long loops.
pub trait JobHandler: Send + Sync {
    fn run(&self, kind: JobKind, params: &JobParams, cancel: &CancelToken) -> Result<JobOutput, JobError>;
}

struct JobEntry {
    asset_id: String,
    kind: JobKind,
    token: CancelToken,
}

pub struct JobManager {
    pool: Arc<dyn WorkerPool>,
    handler: Arc<dyn JobHandler>,
    jobs: Arc<Mutex<HashMap<JobId, JobEntry>>>,
    /// Ids discarded while their final event may still be queued
    discarded: Mutex<HashSet<JobId>>,
    tx: Sender<JobEvent>,
    rx: Receiver<JobEvent>,
}

impl JobManager {
    pub fn new(pool: Arc<dyn WorkerPool>, handler: Arc<dyn JobHandler>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            pool,
            handler,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            discarded: Mutex::new(HashSet::new()),
            tx,
            rx,
        }
    }

    /// Jobs not yet finished
    pub fn pending_count(&self) -> usize {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Drain queued events. Completions of discarded jobs come out as `Cancelled`.
    pub fn take_events(&self) -> Vec<JobEvent> {
        let mut discarded = self.discarded.lock().unwrap_or_else(|e| e.into_inner());
        self.rx
            .try_iter()
            .map(|mut event| {
                if discarded.contains(&event.id) {
                    if event.status.is_final() {
                        discarded.remove(&event.id);
                    }
                    if !matches!(event.status, JobStatus::Pending | JobStatus::Running) {
                        event.status = JobStatus::Cancelled;
                    }
                }
                event
            })
            .collect()
    }

    /// Block until every job finished or `timeout` elapsed. Returns true when idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending_count() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    fn matching(&self, asset_id: &str, kind: Option<JobKind>) -> Vec<(JobId, CancelToken)> {
        self.jobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(_, j)| j.asset_id == asset_id && kind.is_none_or(|k| j.kind == k))
            .map(|(id, j)| (*id, j.token.clone()))
            .collect()
    }
}

impl TaskManager for JobManager {
    fn start_job(&self, kind: JobKind, asset_id: &str, params: JobParams) -> JobId {
        let id = Uuid::new_v4();
        let token = CancelToken::new();
        self.jobs.lock().unwrap_or_else(|e| e.into_inner()).insert(
            id,
            JobEntry {
                asset_id: asset_id.to_string(),
                kind,
                token: token.clone(),
            },
        );
        let _ = self.tx.send(JobEvent {
            id,
            asset_id: asset_id.to_string(),
            kind,
            status: JobStatus::Pending,
        });
        debug!("job {} {} queued for {}", id, kind, asset_id);

        let handler = Arc::clone(&self.handler);
        let jobs = Arc::clone(&self.jobs);
        let tx = self.tx.clone();
        let asset_id = asset_id.to_string();
        self.pool.spawn(Box::new(move || {
            let send = |status: JobStatus| {
                let _ = tx.send(JobEvent {
                    id,
                    asset_id: asset_id.clone(),
                    kind,
                    status,
                });
            };

            let status = if token.is_cancelled() {
                JobStatus::Cancelled
            } else {
                send(JobStatus::Running);
                match handler.run(kind, &params, &token) {
                    _ if token.is_cancelled() => JobStatus::Cancelled,
                    Ok(output) => JobStatus::Done(output),
                    Err(JobError::Cancelled) => JobStatus::Cancelled,
                    Err(e) => {
                        warn!("job {} {} for {} failed: {}", id, kind, asset_id, e);
                        JobStatus::Failed(e)
                    }
                }
            };
            trace!("job {} {} finished: cancelled={}", id, kind, matches!(status, JobStatus::Cancelled));
            // Report before unlisting so wait_idle implies the event is queued
            send(status);
            jobs.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
        }));
        id
    }

    fn discard_jobs(&self, asset_id: &str, kind: Option<JobKind>, blocking: bool) {
        let targets = self.matching(asset_id, kind);
        if targets.is_empty() {
            return;
        }
        {
            let mut discarded = self.discarded.lock().unwrap_or_else(|e| e.into_inner());
            for (id, token) in &targets {
                token.cancel();
                discarded.insert(*id);
            }
        }
        debug!("discarded {} jobs of {} ({:?})", targets.len(), asset_id, kind);

        if blocking {
            let deadline = Instant::now() + DISCARD_WAIT;
            while !self.matching(asset_id, kind).is_empty() {
                if Instant::now() >= deadline {
                    warn!("jobs of {} still running after discard", asset_id);
                    break;
                }
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn has_pending_job(&self, asset_id: &str, kind: Option<JobKind>) -> bool {
        self.matching(asset_id, kind)
            .iter()
            .any(|(_, token)| !token.is_cancelled())
    }
}

/// Default job handler.
///
/// Media decoding is outside this crate: loads go through the producer
/// factory, thumbnails are small grayscale PGM tiles derived from the
/// resource, audio levels are byte-energy buckets of the file, and proxies
/// are written by copying the original.
pub struct MediaJobHandler {
    factory: Arc<dyn ProducerFactory>,
}

/// Audio level buckets per stream
const LEVEL_BUCKETS: usize = 64;
/// Bytes read for audio levels
const LEVEL_READ_LIMIT: u64 = 4_000_000;

impl MediaJobHandler {
    pub fn new(factory: Arc<dyn ProducerFactory>) -> Self {
        Self { factory }
    }

    fn thumbnail(descriptor: &Attrs, frame: i32) -> Thumbnail {
        let source = descriptor
            .get_str(A_RESOURCE)
            .or_else(|| descriptor.get_str(A_XMLDATA))
            .unwrap_or_default();
        let digest = digest_hex(format!("{}#{}", source, frame).as_bytes());
        let mut image = b"P5\n4 4\n255\n".to_vec();
        image.extend(digest.as_bytes().iter().take(16));
        Arc::new(image)
    }

    fn audio_levels(path: &Path, cancel: &CancelToken) -> Result<Vec<f32>, JobError> {
        let file = File::open(path).map_err(|e| JobError::io(path, e))?;
        let mut data = Vec::new();
        file.take(LEVEL_READ_LIMIT)
            .read_to_end(&mut data)
            .map_err(|e| JobError::io(path, e))?;
        if data.is_empty() {
            return Ok(Vec::new());
        }
        let chunk = data.len().div_ceil(LEVEL_BUCKETS);
        let mut levels = Vec::with_capacity(LEVEL_BUCKETS);
        for bucket in data.chunks(chunk) {
            if cancel.is_cancelled() {
                return Err(JobError::Cancelled);
            }
            let energy: f32 = bucket.iter().map(|b| (*b as f32 - 128.0).abs()).sum::<f32>();
            levels.push(energy / bucket.len() as f32 / 128.0);
        }
        Ok(levels)
    }

    fn proxy(params: &JobParams) -> Result<JobOutput, JobError> {
        let output = params
            .output
            .clone()
            .ok_or_else(|| JobError::Unsupported("proxy job without output path".into()))?;
        let overwrite = params.descriptor.get_bool_or(A_OVERWRITE_PROXY, false);
        if output.exists() && !overwrite {
            debug!("proxy {} already exists", output.display());
            return Ok(JobOutput::Proxy(output));
        }
        let source = params
            .descriptor
            .get_nonempty_str(A_ORIGINAL_URL)
            .or_else(|| params.descriptor.get_nonempty_str(A_RESOURCE))
            .ok_or(JobError::Producer(ProducerError::EmptyResource))?;
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent).map_err(|e| JobError::io(parent, e))?;
        }
        fs::copy(source, &output).map_err(|e| JobError::io(Path::new(source), e))?;
        Ok(JobOutput::Proxy(output))
    }
}

impl JobHandler for MediaJobHandler {
    fn run(&self, kind: JobKind, params: &JobParams, cancel: &CancelToken) -> Result<JobOutput, JobError> {
        match kind {
            JobKind::Load => Ok(JobOutput::Producer(self.factory.build(&params.descriptor, params.clip_type)?)),
            JobKind::Thumb | JobKind::Cache => {
                let mut thumbs = Vec::with_capacity(params.frames.len());
                for frame in &params.frames {
                    if cancel.is_cancelled() {
                        return Err(JobError::Cancelled);
                    }
                    thumbs.push((*frame, Self::thumbnail(&params.descriptor, *frame)));
                }
                Ok(JobOutput::Thumbnails(thumbs))
            }
            JobKind::AudioLevels => {
                if !params.clip_type.has_audio_stream() {
                    return Err(JobError::Unsupported(format!("{} has no audio", params.clip_type)));
                }
                let path = params
                    .descriptor
                    .get_nonempty_str(A_RESOURCE)
                    .ok_or(JobError::Producer(ProducerError::EmptyResource))?;
                let levels = Self::audio_levels(Path::new(path), cancel)?;
                Ok(JobOutput::AudioLevels {
                    stream: params.stream.unwrap_or(0),
                    levels,
                })
            }
            JobKind::Proxy => Self::proxy(params),
        }
    }
}
