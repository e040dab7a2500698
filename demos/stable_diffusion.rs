//! Generate images from a text prompt and print their URLs.
//!
//! ```sh
//! SELAS_ANON_KEY=... SELAS_TOKEN=... cargo run --example stable_diffusion -- "a lighthouse at dusk"
//! ```

use selas_rs::{AwaitError, ImageResult, Sampler, SelasClient, StableDiffusionRequest};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("selas_rs=info")))
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "cute maine coon trending on artstation".to_string());
    let client = SelasClient::from_env()?;

    let request = StableDiffusionRequest::new(prompt)
        .sampler(Sampler::KEulerA)
        .steps(30)
        .batch_size(2);
    let job = client.run_stable_diffusion(&request, None).await?;
    println!("Job {:?} posted, cost {:?}", job.id, job.job_cost);

    match client.await_results::<ImageResult>(&job, Duration::from_secs(120)).await {
        Ok(images) => {
            for image in &images {
                println!("{}", image.uri);
            }
        }
        Err(AwaitError::TimedOut { received, expected, .. }) => {
            eprintln!("Only {}/{} images arrived in time", received, expected);
        }
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
