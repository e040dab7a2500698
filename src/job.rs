use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Lifecycle status of a job, as reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Accepted,
    Completed,
    Failed,
}

/// Worker-affinity descriptor: which worker build should pick up the job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub branch: String,
    pub is_dirty: bool,
    pub name: String,
}

/// A job as recorded by the backend. Read-only on the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub worker_name: Option<String>,
    #[serde(default)]
    pub token_key: Option<String>,
    pub config: JobConfig,
    #[serde(default)]
    pub job_cost: Option<f64>,
    #[serde(default)]
    pub worker_config: Option<WorkerConfig>,
}

/// Everything the backend needs to run one job: exactly one task bundle
/// plus an optional worker-affinity descriptor.
///
/// Serializes to `{"<task>": {...}, "worker": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    #[serde(flatten)]
    pub task: TaskConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerConfig>,
}

impl JobConfig {
    pub fn new(task: TaskConfig) -> Self {
        Self { task, worker: None }
    }

    /// Pin the job to a worker build.
    pub fn with_worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn kind(&self) -> TaskKind {
        self.task.kind()
    }

    /// Number of results this job will eventually produce.
    ///
    /// Diffusion jobs produce `batch_size` images; a missing or zero batch
    /// size yields `None`. Every other task produces exactly one result.
    pub fn expected_results(&self) -> Option<usize> {
        match &self.task {
            TaskConfig::Diffusion(d) => d.batch_size.filter(|b| *b > 0).map(|b| b as usize),
            TaskConfig::Blip(_) | TaskConfig::ClipInterrogate(_) | TaskConfig::Dreambooth(_) => {
                Some(1)
            }
        }
    }
}

impl From<TaskConfig> for JobConfig {
    fn from(task: TaskConfig) -> Self {
        Self::new(task)
    }
}

/// Task-specific parameter bundle. Exactly one per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskConfig {
    Diffusion(DiffusionConfig),
    Blip(BlipConfig),
    ClipInterrogate(ClipInterrogateConfig),
    Dreambooth(DreamboothConfig),
}

impl TaskConfig {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskConfig::Diffusion(_) => TaskKind::Diffusion,
            TaskConfig::Blip(_) => TaskKind::Blip,
            TaskConfig::ClipInterrogate(_) => TaskKind::ClipInterrogate,
            TaskConfig::Dreambooth(_) => TaskKind::Dreambooth,
        }
    }
}

/// Discriminant of [`TaskConfig`], used to match result tables to jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Diffusion,
    Blip,
    ClipInterrogate,
    Dreambooth,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Diffusion => "diffusion",
            TaskKind::Blip => "blip",
            TaskKind::ClipInterrogate => "clip_interrogate",
            TaskKind::Dreambooth => "dreambooth",
        };
        f.write_str(name)
    }
}

// ── Diffusion ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    Plms,
    Ddim,
    KLms,
    KEuler,
    KEulerA,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Avif,
    Webp,
}

/// Output encoding options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IoConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_format: Option<ImageFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_quality: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurhash: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate: Option<bool>,
}

/// How the backend fits an input image to the target resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resize {
    Crop,
    CenterCrop,
    Scale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputImage {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resize: Option<Resize>,
}

impl InputImage {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            resize: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Perceptor {
    #[serde(rename = "vit-l")]
    VitL,
    #[serde(rename = "vit-h")]
    VitH,
    #[serde(rename = "vit-b")]
    VitB,
    #[serde(rename = "vit-g")]
    VitG,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TextPrompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concepts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_attention_editing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cross_attention_weights: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ImagePrompt {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InputImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cutout_n: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perceptor: Option<Perceptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(TextPrompt),
    Image(ImagePrompt),
}

impl Prompt {
    /// A plain text prompt with no weight.
    pub fn text(text: impl Into<String>) -> Self {
        Prompt::Text(TextPrompt {
            text: Some(text.into()),
            ..Default::default()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mask {
    Image(InputImage),
    Prompt(Prompt),
}

/// Parameters for a stable diffusion job. Absent fields are left to the
/// backend's defaults and never sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub io: Option<IoConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfw_filter: Option<bool>,
    pub sampler: Sampler,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance_scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Vec<Prompt>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_image: Option<InputImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Mask>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_guidance: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diffusion_model: Option<String>,
}

impl DiffusionConfig {
    /// An otherwise empty config using `sampler`.
    pub fn new(sampler: Sampler) -> Self {
        Self {
            io: None,
            seed: None,
            steps: None,
            skip_steps: None,
            batch_size: None,
            nsfw_filter: None,
            sampler,
            guidance_scale: None,
            width: None,
            height: None,
            prompts: None,
            init_image: None,
            mask: None,
            external_guidance: None,
            diffusion_model: None,
        }
    }
}

// ── Captioning / interrogation ──────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlipConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InputImage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipInterrogateConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InputImage>,
}

// ── Fine-tuning ─────────────────────────────────────────────────────

/// Parameters for a dreambooth fine-tuning job.
///
/// Only the instance prompt, instance images and model name are required;
/// every other field is omitted from the request when `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DreamboothConfig {
    pub instance_prompt: String,
    pub instance_images: Vec<InputImage>,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_images: Option<Vec<InputImage>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretrained_model_name_or_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_class_images: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_train_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_train_epochs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_scheduler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_warmup_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_lr: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_accumulation_steps: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gradient_checkpointing: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_text_encoder: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub with_prior_preservation: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_loss_weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mixed_precision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub use_8bit_adam: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adam_beta1: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adam_beta2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adam_weight_decay: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adam_epsilon: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub center_crop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_grad_norm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn diffusion(batch_size: Option<u32>) -> JobConfig {
        let mut d = DiffusionConfig::new(Sampler::KLms);
        d.batch_size = batch_size;
        JobConfig::new(TaskConfig::Diffusion(d))
    }

    #[test]
    fn test_task_is_externally_tagged() {
        let config = JobConfig::new(TaskConfig::Blip(BlipConfig {
            image: Some(InputImage::new("https://example.com/a.jpg")),
        }));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value, json!({"blip": {"image": {"url": "https://example.com/a.jpg"}}}));
    }

    #[test]
    fn test_worker_serialized_next_to_task() {
        let worker = WorkerConfig {
            branch: "main".into(),
            is_dirty: false,
            name: "gpu-1".into(),
        };
        let value = serde_json::to_value(diffusion(Some(1)).with_worker(worker)).unwrap();
        assert_eq!(value["worker"]["branch"], "main");
        assert_eq!(value["diffusion"]["batch_size"], 1);
    }

    #[test]
    fn test_absent_fields_are_omitted() {
        let value = serde_json::to_value(diffusion(None)).unwrap();
        assert_eq!(value, json!({"diffusion": {"sampler": "k_lms"}}));
    }

    #[test]
    fn test_sampler_wire_names() {
        let names: Vec<Value> = [
            Sampler::Plms,
            Sampler::Ddim,
            Sampler::KLms,
            Sampler::KEuler,
            Sampler::KEulerA,
        ]
        .iter()
        .map(|s| serde_json::to_value(s).unwrap())
        .collect();
        assert_eq!(names, vec![json!("plms"), json!("ddim"), json!("k_lms"), json!("k_euler"), json!("k_euler_a")]);
    }

    #[test]
    fn test_expected_results() {
        assert_eq!(diffusion(Some(4)).expected_results(), Some(4));
        assert_eq!(diffusion(None).expected_results(), None);
        assert_eq!(diffusion(Some(0)).expected_results(), None);

        let blip = JobConfig::new(TaskConfig::Blip(BlipConfig::default()));
        assert_eq!(blip.expected_results(), Some(1));
        let clip = JobConfig::new(TaskConfig::ClipInterrogate(ClipInterrogateConfig::default()));
        assert_eq!(clip.expected_results(), Some(1));
    }

    #[test]
    fn test_parse_job_record() {
        let job: Job = serde_json::from_value(json!({
            "id": 34259,
            "created_at": "2022-10-28T12:00:00.123456+00:00",
            "status": "pending",
            "user_id": "b6a8c2f0",
            "accepted_at": null,
            "worker_name": null,
            "token_key": null,
            "job_cost": 2.5,
            "config": {
                "diffusion": {
                    "prompts": [{"text": "a cat"}],
                    "sampler": "k_euler_a",
                    "batch_size": 2,
                    "io": {"image_format": "avif", "image_quality": 100}
                },
                "worker": null
            },
            "worker_config": null
        }))
        .unwrap();

        assert_eq!(job.id, Some(34259));
        assert_eq!(job.status, Some(JobStatus::Pending));
        assert_eq!(job.job_cost, Some(2.5));
        assert!(job.created_at.is_some());
        assert!(job.accepted_at.is_none());
        assert_eq!(job.config.kind(), TaskKind::Diffusion);
        assert_eq!(job.config.expected_results(), Some(2));
        match &job.config.task {
            TaskConfig::Diffusion(d) => {
                assert_eq!(d.prompts, Some(vec![Prompt::text("a cat")]));
                assert_eq!(d.io.as_ref().unwrap().image_format, Some(ImageFormat::Avif));
            }
            other => panic!("unexpected task {:?}", other),
        }
    }

    #[test]
    fn test_prompt_variants() {
        let image: Prompt = serde_json::from_value(json!({
            "image": {"url": "https://example.com/x.png", "resize": "center_crop"},
            "perceptor": "vit-l"
        }))
        .unwrap();
        match image {
            Prompt::Image(p) => {
                assert_eq!(p.perceptor, Some(Perceptor::VitL));
                assert_eq!(p.image.unwrap().resize, Some(Resize::CenterCrop));
            }
            other => panic!("expected image prompt, got {:?}", other),
        }

        let text: Prompt = serde_json::from_value(json!({"text": "sky", "weight": 0.5})).unwrap();
        assert!(matches!(text, Prompt::Text(_)));
    }

    #[test]
    fn test_task_kind_display() {
        assert_eq!(TaskKind::ClipInterrogate.to_string(), "clip_interrogate");
        assert_eq!(TaskKind::Diffusion.to_string(), "diffusion");
    }
}
