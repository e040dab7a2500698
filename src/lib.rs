//! # selas-rs
//!
//! Async Rust client for the Selas image generation API: stable diffusion,
//! BLIP captioning, CLIP interrogation and dreambooth fine-tuning, served
//! from a Supabase backend.
//!
//! Jobs are posted through the backend's `post_job` procedure and executed
//! by a remote worker fleet. Their results land in per-task tables, which
//! this crate polls until the job's expected number of results is stored.
//! Customer, credit and token management are thin wrappers over the same
//! row store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use selas_rs::{ImageResult, SelasClient, SelasConfig, StableDiffusionRequest};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = SelasClient::new(SelasConfig::from_env()?);
//!
//! // Submit a job (never retried: the backend bills on acceptance)
//! let request = StableDiffusionRequest::new("cute maine coon trending on artstation")
//!     .batch_size(2);
//! let job = client.run_stable_diffusion(&request, None).await?;
//!
//! // Poll the results table until both images are stored
//! let images: Vec<ImageResult> = client
//!     .await_results(&job, Duration::from_secs(60))
//!     .await?;
//!
//! for image in &images {
//!     println!("{}", image.uri);
//! }
//! # Ok(())
//! # }
//! ```

pub mod awaiter;
pub mod client;
pub mod config;
pub mod error;
pub mod job;
pub mod request;
pub mod types;

pub use awaiter::{
    AwaitOutcome, AwaitState, IntervalScheduler, ResultSource, Scheduler, Step, DEFAULT_POLL_INTERVAL,
    DEFAULT_TIMEOUT,
};
pub use client::SelasClient;
pub use config::{Credential, SelasConfig, DEFAULT_URL};
pub use error::{AwaitError, Result, SelasError, SubmissionError};
pub use job::{
    BlipConfig, ClipInterrogateConfig, DiffusionConfig, DreamboothConfig, ImageFormat, ImagePrompt,
    InputImage, IoConfig, Job, JobConfig, JobStatus, Mask, Perceptor, Prompt, Resize, Sampler,
    TaskConfig, TaskKind, TextPrompt, WorkerConfig,
};
pub use request::{blip_caption, clip_interrogate, DreamboothOptions, DreamboothRequest, StableDiffusionRequest};
pub use types::{
    BlipResult, ClipInterrogateResult, ClipInterrogation, CreditBalance, Customer, DreamboothResult,
    ImageResult, ResultRow, Session, SessionUser, TextRank, Token,
};
