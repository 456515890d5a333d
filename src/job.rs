//! Job parsing, validation and deduplication
//!
//! A job arrives either embedded in the login result or as a `job`
//! notification. Validation runs in a fixed order and every step has its own
//! [`JobError`] code, so a rejected job can be diagnosed from the log alone.

use crate::config::PoolConfig;
use crate::error::JobError;
use crate::utils::{read_u32_le, read_u64_le, target_to_difficulty};
use crate::Algorithm;
use serde_json::{Map, Value};
use std::fmt;

/// Smallest accepted work blob in bytes
pub const MIN_BLOB_SIZE: usize = 76;
/// Largest accepted work blob in bytes (exclusive)
pub const MAX_BLOB_SIZE: usize = 408;
/// Offset of the 32-bit nonce inside the blob
pub const NONCE_OFFSET: usize = 39;
/// Seed hash length in bytes
pub const SEED_HASH_SIZE: usize = 32;

/// One unit of work assigned by the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    id: String,
    client_id: Option<String>,
    algorithm: Option<Algorithm>,
    blob: Vec<u8>,
    target: u64,
    diff: u64,
    height: u64,
    seed_hash: Option<Vec<u8>>,
    sig_key: Option<String>,
    extra_nonce: Option<String>,
    pool_wallet: Option<String>,
    nicehash: bool,
}

impl Job {
    fn empty(nicehash: bool, algorithm: Option<Algorithm>, client_id: Option<&str>) -> Self {
        Self {
            id: String::new(),
            client_id: client_id.map(str::to_string),
            algorithm,
            blob: Vec::new(),
            target: 0,
            diff: 0,
            height: 0,
            seed_hash: None,
            sig_key: None,
            extra_nonce: None,
            pool_wallet: None,
            nicehash,
        }
    }

    /// Job identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity token of the session that received the job
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// Resolved algorithm
    pub fn algorithm(&self) -> Option<Algorithm> {
        self.algorithm
    }

    /// Work blob (empty in self-select mode)
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    /// 64-bit target
    pub fn target(&self) -> u64 {
        self.target
    }

    /// Difficulty implied by the target
    pub fn diff(&self) -> u64 {
        self.diff
    }

    /// Block height, 0 when not sent
    pub fn height(&self) -> u64 {
        self.height
    }

    /// Seed hash for RandomX-family algorithms
    pub fn seed_hash(&self) -> Option<&[u8]> {
        self.seed_hash.as_deref()
    }

    /// Signature key, when the pool sends one
    pub fn sig_key(&self) -> Option<&str> {
        self.sig_key.as_deref()
    }

    /// Self-select extra nonce
    pub fn extra_nonce(&self) -> Option<&str> {
        self.extra_nonce.as_deref()
    }

    /// Self-select pool wallet
    pub fn pool_wallet(&self) -> Option<&str> {
        self.pool_wallet.as_deref()
    }

    /// Whether the pool owns the top nonce byte
    pub fn is_nicehash(&self) -> bool {
        self.nicehash
    }

    /// Whether the job carries all mode-dependent fields
    pub fn is_valid(&self) -> bool {
        let has_work = !self.blob.is_empty()
            || (self.extra_nonce.is_some() && self.pool_wallet.is_some());
        !self.id.is_empty() && self.algorithm.is_some() && self.target > 0 && has_work
    }

    fn set_blob(&mut self, hex_blob: Option<&str>) -> bool {
        let Some(hex_blob) = hex_blob else {
            return false;
        };

        if hex_blob.len() % 2 != 0 {
            return false;
        }

        let size = hex_blob.len() / 2;
        if !(MIN_BLOB_SIZE..MAX_BLOB_SIZE).contains(&size) {
            return false;
        }

        let Ok(blob) = hex::decode(hex_blob) else {
            return false;
        };

        if !self.nicehash && read_u32_le(&blob, NONCE_OFFSET).is_some_and(|nonce| nonce != 0) {
            self.nicehash = true;
        }

        self.blob = blob;
        true
    }

    fn set_target(&mut self, hex_target: Option<&str>) -> bool {
        let Some(raw) = hex_target.and_then(|t| hex::decode(t).ok()) else {
            return false;
        };

        let target = match raw.len() {
            4 => match read_u32_le(&raw, 0) {
                Some(compact) if compact > 0 => {
                    u64::MAX / (u64::from(u32::MAX) / u64::from(compact))
                }
                _ => return false,
            },
            8 => match read_u64_le(&raw, 0) {
                Some(target) if target > 0 => target,
                _ => return false,
            },
            _ => return false,
        };

        self.target = target;
        self.diff = target_to_difficulty(target);
        true
    }

    fn set_seed_hash(&mut self, hex_seed: Option<&str>) -> bool {
        match hex_seed.and_then(|s| hex::decode(s).ok()) {
            Some(seed) if seed.len() == SEED_HASH_SIZE => {
                self.seed_hash = Some(seed);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (algo {}, diff {}, height {})",
            self.id,
            self.algorithm.map(|a| a.name()).unwrap_or("unknown"),
            self.diff,
            self.height
        )
    }
}

/// Session facts the parser needs
#[derive(Debug, Clone, Copy)]
pub struct JobContext<'a> {
    /// Pool settings (algorithm, coin, mode)
    pub pool: &'a PoolConfig,
    /// Nicehash extension active for this session
    pub nicehash: bool,
    /// Identity token assigned at login
    pub rpc_id: Option<&'a str>,
}

fn get_str<'a>(params: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

/// Validate a job payload
///
/// `verify` is the caller's capability check for the resolved algorithm; it is
/// only consulted for algorithms this crate recognises.
pub fn parse_job<F>(params: &Value, ctx: &JobContext<'_>, verify: F) -> Result<Job, JobError>
where
    F: FnOnce(&Algorithm) -> bool,
{
    let params = params.as_object().ok_or(JobError::NotObject)?;

    let mut job = Job::empty(ctx.nicehash, ctx.pool.algo, ctx.rpc_id);

    match get_str(params, "job_id") {
        Some(id) if !id.is_empty() => job.id = id.to_string(),
        _ => return Err(JobError::InvalidId),
    }

    let algo = get_str(params, "algo");
    let blob = get_str(params, "blob");
    if let Some(name) = algo {
        job.algorithm = Algorithm::parse(name);
    } else if let Some(coin) = ctx.pool.coin {
        let version = blob
            .and_then(|b| b.get(..2))
            .and_then(|b| u8::from_str_radix(b, 16).ok())
            .unwrap_or(0);
        job.algorithm = Some(coin.algorithm(version));
    }

    if ctx.pool.is_self_select() {
        job.extra_nonce = get_str(params, "extra_nonce").map(str::to_string);
        job.pool_wallet = get_str(params, "pool_wallet").map(str::to_string);

        if job.extra_nonce.is_none() || job.pool_wallet.is_none() {
            return Err(JobError::MissingSelfSelectFields);
        }
    } else if !job.set_blob(blob) {
        return Err(JobError::InvalidBlob);
    }

    if !job.set_target(get_str(params, "target")) {
        return Err(JobError::InvalidTarget);
    }

    job.height = params.get("height").and_then(Value::as_u64).unwrap_or(0);

    let algorithm = match job.algorithm {
        Some(algorithm) if verify(&algorithm) => algorithm,
        Some(algorithm) => return Err(JobError::Algorithm(Some(algorithm.name().to_string()))),
        None => return Err(JobError::Algorithm(algo.map(str::to_string))),
    };

    let seed_hash = get_str(params, "seed_hash");
    if !ctx.pool.is_self_select() && algorithm.family().requires_seed_hash() {
        if !job.set_seed_hash(seed_hash) {
            return Err(JobError::InvalidSeedHash);
        }
    } else if seed_hash.is_some() {
        job.set_seed_hash(seed_hash);
    }

    job.sig_key = get_str(params, "sig_key").map(str::to_string);

    Ok(job)
}

/// Outcome of offering a validated job to the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New current job
    Accepted,
    /// Exact repeat of the current job
    Duplicate,
}

/// Holds the current job and the per-session acceptance count
#[derive(Debug, Default)]
pub struct JobTracker {
    current: Option<Job>,
    accepted: u64,
}

impl JobTracker {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a validated job
    ///
    /// The first job of a session is accepted even when it equals the current
    /// one; later exact repeats are reported as duplicates and leave the
    /// current job untouched.
    pub fn admit(&mut self, job: Job) -> Admission {
        if self.accepted > 0 && self.current.as_ref() == Some(&job) {
            return Admission::Duplicate;
        }

        self.current = Some(job);
        self.accepted += 1;
        Admission::Accepted
    }

    /// Start counting a new session; the current job is kept
    pub fn begin_session(&mut self) {
        self.accepted = 0;
    }

    /// Forget the current job and the count
    pub fn clear(&mut self) {
        self.current = None;
        self.accepted = 0;
    }

    /// Current job, if any
    pub fn current(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    /// Jobs accepted this session
    pub fn accepted(&self) -> u64 {
        self.accepted
    }
}

/// A solved share, ready to be submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobResult {
    /// Caller-assigned share id, kept in the submission record
    pub id: i64,
    /// Job the share was found for
    pub job_id: String,
    /// Identity token of the session that issued the job
    pub client_id: String,
    /// Winning nonce
    pub nonce: u32,
    /// Resulting hash
    pub result: [u8; 32],
    /// Signature, for pools that require one
    pub sig: Option<[u8; 64]>,
    /// Difficulty the share was solved against
    pub diff: u64,
    /// Difficulty the hash actually reached
    pub actual_diff: u64,
    /// Algorithm used
    pub algorithm: Option<Algorithm>,
    /// Tag of the backend that produced the share
    pub backend: String,
}

impl JobResult {
    /// Build a result for a job
    pub fn new(job: &Job, nonce: u32, result: [u8; 32]) -> Self {
        let actual_diff = read_u64_le(&result, 24)
            .map(target_to_difficulty)
            .unwrap_or(0);

        Self {
            id: 0,
            job_id: job.id.clone(),
            client_id: job.client_id.clone().unwrap_or_default(),
            nonce,
            result,
            sig: None,
            diff: job.diff,
            actual_diff,
            algorithm: job.algorithm,
            backend: "cpu".to_string(),
        }
    }

    /// Nonce as 4 little-endian bytes in hex
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce.to_le_bytes())
    }

    /// Result hash in hex
    pub fn result_hex(&self) -> String {
        hex::encode(self.result)
    }

    /// Signature in hex
    pub fn sig_hex(&self) -> Option<String> {
        self.sig.map(hex::encode)
    }
}
