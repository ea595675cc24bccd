// Headless driver for the image-processing backend
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use image::ImageFormat;
use tracing::info;
use tracing_subscriber::EnvFilter;
use vision_client::{
    decode_base64_payload, BackendClient, BackendConfig, ImageBackend, ImageUpload, ProcessId,
    BACKEND_URL_VAR, DEFAULT_BACKEND_URL,
};
use workbench_core::{
    analyze_image, encode_png, poll_all, render_boxes, submit_all, Action, CaptureSource,
    InMemoryPreviews, TrainingPlot, Workbench, DEFAULT_THRESHOLD,
};

#[derive(Parser)]
#[command(author, version, about = "Drive the image classification backend from a terminal")]
struct Args {
    /// Backend base URL (overrides BACKEND_URL)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload images one by one and print the process ids
    Submit {
        #[arg(long = "class")]
        class_name: String,
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: i64,
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Query the status of processes
    Poll {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Write the artifacts of completed processes here
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Detect and classify the objects in one image
    Regions {
        image: PathBuf,
        /// Write the image with every region outlined
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Summarise the classifier's training set
    Training,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let url = match args.backend_url {
        Some(url) => url,
        None => std::env::var(BACKEND_URL_VAR).unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
    };
    let client = BackendClient::new(BackendConfig::new(&url)?);
    info!("Backend: {}", client.config().base_url());

    match args.command {
        Command::Submit {
            class_name,
            threshold,
            images,
        } => submit(&client, class_name, threshold, &images).await,
        Command::Poll { ids, out } => poll(&client, ids, out.as_deref()).await,
        Command::Regions { image, out } => regions(&client, &image, out.as_deref()).await,
        Command::Training => training(&client).await,
    }
}

fn load_image(path: &Path) -> anyhow::Result<ImageUpload> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime_type = ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    Ok(ImageUpload::new(file_name, mime_type, bytes))
}

async fn submit(
    client: &BackendClient,
    class_name: String,
    threshold: i64,
    images: &[PathBuf],
) -> anyhow::Result<()> {
    let files = images
        .iter()
        .map(|p| load_image(p))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut workbench = Workbench::new(InMemoryPreviews::new());
    workbench.dispatch(Action::FilesAdded {
        source: CaptureSource::FilePicker,
        files,
    });
    workbench.dispatch(Action::ClassNameChanged(class_name));
    workbench.dispatch(Action::ThresholdChanged(threshold));

    let Some(batch) = workbench.start_submission() else {
        bail!("nothing to submit: class name must not be blank and threshold must be within 0..=255");
    };

    let report = submit_all(client, batch, |a| workbench.dispatch(a)).await;

    for id in &report.accepted {
        println!("{}", id);
    }
    if let Some(notice) = workbench.notice() {
        eprintln!("{}", notice.text);
    }
    if report.accepted.is_empty() {
        bail!("no image was accepted");
    }
    Ok(())
}

async fn poll(client: &BackendClient, ids: Vec<String>, out: Option<&Path>) -> anyhow::Result<()> {
    let mut workbench = Workbench::new(InMemoryPreviews::new());
    let epoch = workbench.epoch();
    for id in ids {
        workbench.dispatch(Action::SubmissionAccepted {
            epoch,
            id: ProcessId::new(id),
        });
    }

    if let Some(batch) = workbench.start_poll() {
        poll_all(client, batch, |a| workbench.dispatch(a)).await;
    }

    for (id, record) in workbench.records() {
        println!("{}: {}", id, record.status);
    }
    for card in workbench.result_cards() {
        println!("\n{}", card.id);
        if let Some(dims) = &card.dimensions {
            println!("  dimensions: {}", dims);
        }
        if let Some(c) = &card.compactness_factor {
            println!("  compactness: {}", c);
        }
        if let Some(u) = card.unique_color_int {
            println!("  unique colour: {}", u);
        }
        for image in &card.thumbnails {
            println!("  artifact: {}", image.label);
        }
    }
    if let Some(notice) = workbench.notice() {
        eprintln!("{}", notice.text);
    }

    if let Some(dir) = out {
        fs::create_dir_all(dir)?;
        for (id, record) in workbench.results() {
            for (key, payload) in record.present_artifacts() {
                let path = dir.join(format!("{}_{}.png", id, key.stem()));
                fs::write(&path, decode_base64_payload(payload)?)?;
                info!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}

async fn regions(client: &BackendClient, path: &Path, out: Option<&Path>) -> anyhow::Result<()> {
    let image = load_image(path)?;
    let analysis = analyze_image(client, &image).await?;

    if let Some(id) = &analysis.process_id {
        println!("Process: {}", id);
    }
    println!("Regions: {}", analysis.regions.len());
    for (class, count) in &analysis.class_counts {
        println!("  {}: {}", class, count);
    }
    for (i, region) in analysis.regions.iter().enumerate() {
        let b = &region.region.bbox;
        println!(
            "  #{} [{:.0}, {:.0}, {:.0}, {:.0}] {}",
            i + 1,
            b.x1,
            b.y1,
            b.x2,
            b.y2,
            region.label
        );
    }

    if let Some(out) = out {
        let annotated = render_boxes(&image.bytes, &analysis.annotations())?;
        fs::write(out, encode_png(&annotated)?)?;
        info!("Wrote {}", out.display());
    }
    Ok(())
}

async fn training(client: &BackendClient) -> anyhow::Result<()> {
    let points = client.training_points().await?;
    let plot = TrainingPlot::from_points(&points);

    println!("{} training points in {} classes", points.len(), plot.series.len());
    for (series, prototype) in plot.series.iter().zip(&plot.prototypes) {
        let [c, area, colour] = prototype.position;
        println!(
            "  {:<16} n={:<5} mean compactness {:.2}, relative area {:.2}%, colour {:.0}",
            series.class,
            series.points.len(),
            c,
            area,
            colour
        );
    }
    Ok(())
}
