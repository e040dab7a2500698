use crate::job::{
    BlipConfig, ClipInterrogateConfig, DiffusionConfig, DreamboothConfig, ImageFormat, InputImage,
    IoConfig, JobConfig, Prompt, Sampler, TaskConfig, WorkerConfig,
};

/// Builder for a text-to-image stable diffusion job.
///
/// Defaults: 512x512, 50 steps, guidance 7.5, `k_lms`, one image, AVIF at
/// quality 100, no prompt translation, diffusion model `"1.5"`.
///
/// # Example
/// ```
/// use selas_rs::{StableDiffusionRequest, Sampler};
///
/// let config = StableDiffusionRequest::new("cute maine coon trending on artstation")
///     .size(768, 768)
///     .sampler(Sampler::KEulerA)
///     .batch_size(4)
///     .build();
///
/// assert_eq!(config.expected_results(), Some(4));
/// ```
#[derive(Debug, Clone)]
pub struct StableDiffusionRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub guidance_scale: f64,
    pub sampler: Sampler,
    pub batch_size: u32,
    pub image_format: ImageFormat,
    pub translate: bool,
    pub diffusion_model: String,
    pub seed: Option<i64>,
    pub nsfw_filter: Option<bool>,
    pub worker: Option<WorkerConfig>,
}

impl StableDiffusionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 512,
            height: 512,
            steps: 50,
            guidance_scale: 7.5,
            sampler: Sampler::KLms,
            batch_size: 1,
            image_format: ImageFormat::Avif,
            translate: false,
            diffusion_model: "1.5".to_string(),
            seed: None,
            nsfw_filter: None,
            worker: None,
        }
    }

    /// Set output dimensions. The backend accepts 512 and 768.
    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.steps = steps;
        self
    }

    pub fn guidance_scale(mut self, scale: f64) -> Self {
        self.guidance_scale = scale;
        self
    }

    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Number of images to generate (1 to 4).
    pub fn batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }

    pub fn image_format(mut self, format: ImageFormat) -> Self {
        self.image_format = format;
        self
    }

    /// Ask the backend to translate the prompt to English first.
    pub fn translate(mut self, translate: bool) -> Self {
        self.translate = translate;
        self
    }

    pub fn diffusion_model(mut self, model: impl Into<String>) -> Self {
        self.diffusion_model = model.into();
        self
    }

    /// Fix the seed. Left to the backend when unset.
    pub fn seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn nsfw_filter(mut self, enabled: bool) -> Self {
        self.nsfw_filter = Some(enabled);
        self
    }

    pub fn worker(mut self, worker: WorkerConfig) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn build(&self) -> JobConfig {
        let diffusion = DiffusionConfig {
            prompts: Some(vec![Prompt::text(self.prompt.clone())]),
            width: Some(self.width),
            height: Some(self.height),
            steps: Some(self.steps),
            sampler: self.sampler,
            guidance_scale: Some(self.guidance_scale),
            batch_size: Some(self.batch_size),
            io: Some(IoConfig {
                image_format: Some(self.image_format),
                image_quality: Some(100),
                blurhash: Some(false),
                translate: Some(self.translate),
            }),
            diffusion_model: Some(self.diffusion_model.clone()),
            seed: self.seed,
            nsfw_filter: self.nsfw_filter,
            ..DiffusionConfig::new(self.sampler)
        };

        JobConfig {
            task: TaskConfig::Diffusion(diffusion),
            worker: self.worker.clone(),
        }
    }
}

/// Optional dreambooth training parameters.
///
/// Every field is sent only when it is set *and* non-empty: `None`, `0`,
/// `0.0`, `false` and `""` are all left out of the request so the backend
/// fills in its own default. `class_images` is sent whenever it is `Some`,
/// even if the list is empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DreamboothOptions {
    pub model_description: Option<String>,
    pub class_prompt: Option<String>,
    pub class_images: Option<Vec<String>>,
    pub num_class_images: Option<u32>,
    pub max_train_steps: Option<u32>,
    pub num_train_epochs: Option<u32>,
    pub learning_rate: Option<f64>,
    pub train_text_encoder: Option<bool>,
    pub with_prior_preservation: Option<bool>,
}

/// Builder for a dreambooth fine-tuning job.
#[derive(Debug, Clone)]
pub struct DreamboothRequest {
    pub instance_prompt: String,
    pub instance_images: Vec<String>,
    pub model_name: String,
    pub options: DreamboothOptions,
}

impl DreamboothRequest {
    /// `instance_images` are URLs of the subject's training pictures.
    pub fn new<I, S>(instance_prompt: impl Into<String>, instance_images: I, model_name: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            instance_prompt: instance_prompt.into(),
            instance_images: instance_images.into_iter().map(Into::into).collect(),
            model_name: model_name.into(),
            options: DreamboothOptions::default(),
        }
    }

    pub fn options(mut self, options: DreamboothOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(&self) -> JobConfig {
        let o = &self.options;
        let dreambooth = DreamboothConfig {
            instance_prompt: self.instance_prompt.clone(),
            instance_images: urls_to_images(&self.instance_images),
            model_name: self.model_name.clone(),
            model_description: non_empty(&o.model_description),
            class_prompt: non_empty(&o.class_prompt),
            class_images: o.class_images.as_deref().map(urls_to_images),
            num_class_images: o.num_class_images.filter(|n| *n != 0),
            max_train_steps: o.max_train_steps.filter(|n| *n != 0),
            num_train_epochs: o.num_train_epochs.filter(|n| *n != 0),
            learning_rate: o.learning_rate.filter(|r| *r != 0.0 && !r.is_nan()),
            train_text_encoder: o.train_text_encoder.filter(|b| *b),
            with_prior_preservation: o.with_prior_preservation.filter(|b| *b),
            ..Default::default()
        };
        JobConfig::new(TaskConfig::Dreambooth(dreambooth))
    }
}

/// Config for a BLIP caption job on the image at `url`.
pub fn blip_caption(url: impl Into<String>) -> JobConfig {
    JobConfig::new(TaskConfig::Blip(BlipConfig {
        image: Some(InputImage::new(url)),
    }))
}

/// Config for a CLIP interrogation job on the image at `url`.
pub fn clip_interrogate(url: impl Into<String>) -> JobConfig {
    JobConfig::new(TaskConfig::ClipInterrogate(ClipInterrogateConfig {
        image: Some(InputImage::new(url)),
    }))
}

fn urls_to_images(urls: &[String]) -> Vec<InputImage> {
    urls.iter().map(|url| InputImage::new(url.as_str())).collect()
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stable_diffusion_defaults() {
        let value = serde_json::to_value(StableDiffusionRequest::new("a cat").build()).unwrap();
        assert_eq!(
            value,
            json!({
                "diffusion": {
                    "prompts": [{"text": "a cat"}],
                    "width": 512,
                    "height": 512,
                    "steps": 50,
                    "sampler": "k_lms",
                    "guidance_scale": 7.5,
                    "batch_size": 1,
                    "io": {
                        "image_format": "avif",
                        "image_quality": 100,
                        "blurhash": false,
                        "translate": false
                    },
                    "diffusion_model": "1.5"
                }
            })
        );
    }

    #[test]
    fn test_stable_diffusion_overrides() {
        let worker = WorkerConfig {
            branch: "main".into(),
            is_dirty: false,
            name: String::new(),
        };
        let config = StableDiffusionRequest::new("a cat")
            .size(768, 512)
            .steps(30)
            .guidance_scale(9.0)
            .sampler(Sampler::Ddim)
            .batch_size(3)
            .image_format(ImageFormat::Jpg)
            .translate(true)
            .diffusion_model("")
            .seed(42)
            .worker(worker)
            .build();
        let value = serde_json::to_value(&config).unwrap();

        let d = &value["diffusion"];
        assert_eq!(d["width"], 768);
        assert_eq!(d["height"], 512);
        assert_eq!(d["sampler"], "ddim");
        assert_eq!(d["io"]["image_format"], "jpg");
        assert_eq!(d["io"]["translate"], true);
        assert_eq!(d["diffusion_model"], "");
        assert_eq!(d["seed"], 42);
        assert!(d.get("nsfw_filter").is_none());
        assert_eq!(value["worker"]["branch"], "main");
        assert_eq!(config.expected_results(), Some(3));
    }

    #[test]
    fn test_dreambooth_required_fields_only() {
        let config = DreamboothRequest::new("a sks man", ["https://x/1.jpg", "https://x/2.jpg"], "leo").build();
        let value = serde_json::to_value(config).unwrap();
        assert_eq!(
            value,
            json!({
                "dreambooth": {
                    "instance_prompt": "a sks man",
                    "instance_images": [{"url": "https://x/1.jpg"}, {"url": "https://x/2.jpg"}],
                    "model_name": "leo"
                }
            })
        );
    }

    #[test]
    fn test_dreambooth_falsy_options_are_omitted() {
        let options = DreamboothOptions {
            model_description: Some(String::new()),
            class_prompt: None,
            class_images: None,
            num_class_images: Some(0),
            max_train_steps: Some(0),
            num_train_epochs: None,
            learning_rate: Some(0.0),
            train_text_encoder: Some(false),
            with_prior_preservation: Some(false),
        };
        let config = DreamboothRequest::new("p", ["https://x/1.jpg"], "m").options(options).build();
        let value = serde_json::to_value(config).unwrap();
        let fields = value["dreambooth"].as_object().unwrap();
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_dreambooth_truthy_options_are_sent() {
        let options = DreamboothOptions {
            model_description: Some("first test".into()),
            class_prompt: Some("a man".into()),
            class_images: Some(vec![]),
            num_class_images: Some(200),
            max_train_steps: Some(800),
            num_train_epochs: Some(1),
            learning_rate: Some(5e-6),
            train_text_encoder: Some(true),
            with_prior_preservation: Some(true),
        };
        let config = DreamboothRequest::new("p", ["https://x/1.jpg"], "m").options(options).build();
        let value = serde_json::to_value(config).unwrap();
        let d = &value["dreambooth"];
        assert_eq!(d["model_description"], "first test");
        assert_eq!(d["class_prompt"], "a man");
        assert_eq!(d["class_images"], json!([]));
        assert_eq!(d["num_class_images"], 200);
        assert_eq!(d["max_train_steps"], 800);
        assert_eq!(d["num_train_epochs"], 1);
        assert_eq!(d["learning_rate"], 5e-6);
        assert_eq!(d["train_text_encoder"], true);
        assert_eq!(d["with_prior_preservation"], true);
    }

    #[test]
    fn test_caption_and_interrogate_configs() {
        let blip = serde_json::to_value(blip_caption("https://x/cat.jpg")).unwrap();
        assert_eq!(blip, json!({"blip": {"image": {"url": "https://x/cat.jpg"}}}));

        let clip = serde_json::to_value(clip_interrogate("https://x/cat.jpg")).unwrap();
        assert_eq!(clip, json!({"clip_interrogate": {"image": {"url": "https://x/cat.jpg"}}}));
    }
}
