//! Caption and interrogate an image by URL.
//!
//! ```sh
//! SELAS_ANON_KEY=... cargo run --example caption -- https://example.com/cat.jpg
//! ```

use selas_rs::{AwaitOutcome, BlipResult, ClipInterrogateResult, SelasClient};
use std::time::Duration;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let url = std::env::args().nth(1).ok_or("usage: caption <image-url>")?;
    let client = SelasClient::from_env()?;

    let caption_job = client.run_blip_caption(&url, None).await?;
    let interrogate_job = client.run_clip_interrogate(&url, None).await?;

    let captions: Vec<BlipResult> = client.await_results(&caption_job, Duration::from_secs(60)).await?;
    for caption in &captions {
        println!("Caption: {}", caption.caption);
    }

    match client
        .await_outcome::<ClipInterrogateResult>(&interrogate_job, Duration::from_secs(60))
        .await?
    {
        AwaitOutcome::Complete(results) => {
            for result in &results {
                let ranks = &result.interrogation;
                for (category, entries) in [("medium", &ranks.medium), ("artist", &ranks.artist), ("flavors", &ranks.flavors)] {
                    for entry in entries {
                        println!("{:<8} {:.3} {}", category, entry.confidence, entry.text);
                    }
                }
            }
        }
        AwaitOutcome::TimedOut { elapsed, .. } => eprintln!("Interrogation not done after {:?}", elapsed),
    }

    Ok(())
}
