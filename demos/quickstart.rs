//! Quick-start walkthrough for the AnyMotion Rust SDK.
//!
//! Run with:
//!   ANYMOTION_CLIENT_ID=... ANYMOTION_CLIENT_SECRET=... \
//!   RUST_LOG=anymotion=debug cargo run --example quickstart -- squat.mp4

use anymotion::{Client, DownloadOptions, DrawingRequest, ExtractionRequest, JobStatus};
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anymotion::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "squat.mp4".to_string());

    // -----------------------------------------------------------------------
    // 1. Create a client (reads ANYMOTION_* from the environment)
    // -----------------------------------------------------------------------
    let client = Client::from_env()?;

    // -----------------------------------------------------------------------
    // 2. Upload and extract keypoints
    // -----------------------------------------------------------------------
    let upload = client.upload(&path, None).await?;
    println!("Uploaded: {upload:?}");

    let keypoint_id = client
        .extract_keypoint(ExtractionRequest {
            image_id: upload.image_id,
            movie_id: upload.movie_id,
            data: None,
        })
        .await?;
    let extraction = client.wait_for_extraction(keypoint_id).await?;
    println!("Extraction {keypoint_id}: {}", extraction.status());
    if extraction.status() != JobStatus::Success {
        if let Some(detail) = extraction.failure_detail() {
            println!("  {detail}");
        }
        return Ok(());
    }

    // -----------------------------------------------------------------------
    // 3. Draw a stick picture and download it
    // -----------------------------------------------------------------------
    let request = DrawingRequest::keypoint(keypoint_id)
        .rule(json!({"drawingType": "stickPicture", "pattern": "all", "color": "red"}))
        .background_rule(json!({"skeletonOnly": true}));
    let drawing_id = client.draw_keypoint(request).await?;
    let drawing = client.wait_for_drawing(drawing_id).await?;
    println!("Drawing {drawing_id}: {}", drawing.status());

    if drawing.status() == JobStatus::Success {
        let saved = client
            .download(drawing_id, DownloadOptions::to(".").exist_ok(true))
            .await?;
        println!("Saved to {}", saved.display());
    }

    // -----------------------------------------------------------------------
    // 4. List everything extracted so far
    // -----------------------------------------------------------------------
    for keypoint in client.get_keypoints(&[]).await? {
        println!("  keypoint {} | {}", keypoint["id"], keypoint["execStatus"]);
    }

    Ok(())
}
