// Example: submit one image to the processing backend and check its status once
use std::fs;
use std::path::Path;

use vision_client::{BackendClient, ImageBackend, ImageUpload, SubmissionMetadata};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: cargo run --example image_pipeline <IMAGE_PATH> <CLASS_NAME> [THRESHOLD]");
        eprintln!("\nThe backend URL is read from BACKEND_URL (default http://localhost:8000).");
        return Ok(());
    }

    let image_path = Path::new(&args[1]);
    let class_name = &args[2];
    let threshold: i64 = args.get(3).map(|s| s.parse()).transpose()?.unwrap_or(220);

    let bytes = fs::read(image_path)?;
    let file_name = image_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image.png".to_string());
    println!("Loaded {} ({} bytes)", file_name, bytes.len());

    let client = BackendClient::from_env()?;
    println!("Backend: {}\n", client.config().base_url());

    let upload = ImageUpload::new(file_name, "image/png", bytes);
    let metadata = SubmissionMetadata::new(class_name.as_str(), threshold)?;

    let response = client.submit_image(&upload, &metadata).await?;
    let Some(id) = response.accepted_id() else {
        eprintln!("Backend accepted the upload but returned no proceso_id");
        return Ok(());
    };
    println!("Submitted, process id: {}", id);

    let record = client.fetch_status(id).await?;
    println!("Status: {}", record.status);
    for (name, value) in &record.metrics {
        println!("  {}: {}", name, value);
    }
    for (key, payload) in record.present_artifacts() {
        println!("  {} ({} base64 chars)", key.label(), payload.len());
    }

    Ok(())
}
