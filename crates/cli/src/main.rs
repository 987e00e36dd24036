use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use agelens_core::annotation::domain::frame_annotator::FrameAnnotator;
use agelens_core::annotation::infrastructure::box_label_annotator::BoxLabelAnnotator;
use agelens_core::annotation::infrastructure::label_font::LabelFont;
use agelens_core::classification::infrastructure::onnx_age_classifier::OnnxAgeClassifier;
use agelens_core::detection::infrastructure::cascade_localizer::CascadeFaceLocalizer;
use agelens_core::pipeline::annotate_images_use_case::{AnnotateImagesUseCase, MediaUpload};
use agelens_core::pipeline::annotate_video_use_case::AnnotateVideoUseCase;
use agelens_core::pipeline::face_analyzer::FaceAnalyzer;
use agelens_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use agelens_core::pipeline::skip_frame_analyzer::SkipFrameAnalyzer;
use agelens_core::pipeline::streaming_session::StreamingSession;
use agelens_core::shared::constants::{CASCADE_NAME, CASCADE_URL, IMAGE_EXTENSIONS};
use agelens_core::shared::model_resolver;
use agelens_core::shared::settings::{OutputImageFormat, Settings, VideoCodec};
use agelens_core::video::domain::image_codec::{ImageCodec, ImageEncoding};
use agelens_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use agelens_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use agelens_core::video::infrastructure::image_codec::ImageCrateCodec;

/// Face detection with age labels for images, videos and live frames.
#[derive(Parser)]
#[command(name = "agelens")]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct CommonArgs {
    /// Age classifier ONNX model.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Haar cascade XML (default: frontal face cascade, downloaded on first use).
    #[arg(long, global = true)]
    cascade: Option<PathBuf>,

    /// Label file, one label per line in model output order.
    #[arg(long, global = true)]
    labels: Option<PathBuf>,

    /// JSON settings file; flags below override it.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Pyramid scale step between detection passes (> 1.0).
    #[arg(long, global = true)]
    scale_factor: Option<f64>,

    /// Neighbouring hits required to keep a face.
    #[arg(long, global = true)]
    min_neighbors: Option<u32>,

    /// Smallest face side in pixels.
    #[arg(long, global = true)]
    min_size: Option<u32>,

    /// Run detection every Nth frame in videos and streams.
    #[arg(long, global = true)]
    detection_interval: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Annotate still images and write them to a ZIP archive.
    Images {
        /// Input image files.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output archive.
        #[arg(long, short)]
        output: PathBuf,

        /// Archive entry format: png, bmp or tiff.
        #[arg(long)]
        format: Option<String>,
    },
    /// Annotate every frame of a video file.
    Video {
        input: PathBuf,

        /// Output video file.
        #[arg(long, short)]
        output: PathBuf,

        /// Output codec: mpeg4 or h264.
        #[arg(long)]
        codec: Option<String>,
    },
    /// Annotate a live stream: one base64 frame per stdin line, one reply per stdout line.
    Stream,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.common)?;

    match &cli.command {
        Command::Images { format, .. } => {
            if let Some(name) = format {
                settings.output_image_format = OutputImageFormat::from_name(name)
                    .ok_or_else(|| format!("Unknown image format '{name}'"))?;
            }
        }
        Command::Video { codec, .. } => {
            if let Some(name) = codec {
                settings.video.codec = VideoCodec::from_name(name)
                    .ok_or_else(|| format!("Unknown codec '{name}'"))?;
            }
        }
        Command::Stream => {}
    }
    settings.validate()?;

    let analyzer = build_analyzer(&cli.common, &settings)?;
    let font = LabelFont::resolve(settings.annotation.font_path.as_deref())?;
    let annotator: Arc<dyn FrameAnnotator> = Arc::new(BoxLabelAnnotator::with_font(
        settings.annotation.clone(),
        font,
    ));

    match cli.command {
        Command::Images { inputs, output, .. } => {
            run_images(&inputs, &output, analyzer, annotator, &settings)
        }
        Command::Video { input, output, .. } => {
            run_video(&input, &output, analyzer, annotator, &settings)
        }
        Command::Stream => run_stream(analyzer, annotator, &settings),
    }
}

fn load_settings(args: &CommonArgs) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &args.settings {
        Some(path) => Settings::load_from(path)?,
        None => Settings::default(),
    };
    if let Some(scale_factor) = args.scale_factor {
        settings.detection.scale_factor = scale_factor;
    }
    if let Some(min_neighbors) = args.min_neighbors {
        settings.detection.min_neighbors = min_neighbors;
    }
    if let Some(min_size) = args.min_size {
        settings.detection.min_size = (min_size, min_size);
    }
    if let Some(interval) = args.detection_interval {
        settings.streaming.detection_interval = interval;
    }
    if let Some(path) = &args.labels {
        settings.classifier.labels = read_labels(path)?;
    }
    Ok(settings)
}

fn read_labels(path: &Path) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let labels: Vec<String> = fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if labels.is_empty() {
        return Err(format!("No labels in {}", path.display()).into());
    }
    Ok(labels)
}

fn build_analyzer(
    args: &CommonArgs,
    settings: &Settings,
) -> Result<FaceAnalyzer, Box<dyn std::error::Error>> {
    let model = args
        .model
        .as_deref()
        .ok_or("--model is required (age classifier ONNX file)")?;
    if !model.exists() {
        return Err(format!("Model file not found: {}", model.display()).into());
    }

    log::info!("Resolving cascade: {CASCADE_NAME}");
    let cascade_path = model_resolver::resolve(
        CASCADE_NAME,
        CASCADE_URL,
        args.cascade.as_deref(),
        Some(Box::new(download_progress)),
    )?;

    let localizer = CascadeFaceLocalizer::from_file(&cascade_path, settings.detection.clone())?;
    let classifier = OnnxAgeClassifier::new(model, &settings.classifier)?;
    Ok(FaceAnalyzer::new(Arc::new(localizer), Arc::new(classifier)))
}

fn run_images(
    inputs: &[PathBuf],
    output: &Path,
    analyzer: FaceAnalyzer,
    annotator: Arc<dyn FrameAnnotator>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut uploads = Vec::with_capacity(inputs.len());
    for path in inputs {
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("Invalid file name: {}", path.display()))?;
        uploads.push(MediaUpload::new(filename, content_type(path), fs::read(path)?));
    }

    let use_case = AnnotateImagesUseCase::new(
        analyzer,
        annotator,
        Arc::new(ImageCrateCodec::new()),
        ImageEncoding::from(settings.output_image_format),
    );
    let batch = use_case.execute(&uploads)?;
    fs::write(output, &batch.archive)?;

    for skipped in &batch.skipped {
        eprintln!("Skipped {}: {}", skipped.filename, skipped.reason);
    }
    log::info!(
        "Wrote {} image(s) to {}",
        batch.entries.len(),
        output.display()
    );
    Ok(())
}

fn run_video(
    input: &Path,
    output: &Path,
    analyzer: FaceAnalyzer,
    annotator: Arc<dyn FrameAnnotator>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    if !input.exists() {
        return Err(format!("Input file not found: {}", input.display()).into());
    }
    let bytes = fs::read(input)?;
    let extension = input
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let progress: Box<dyn Fn(usize, usize) -> bool + Send> = Box::new(|current, total| {
        eprint!("\rProcessing frame {current}/{total}");
        true
    });

    let mut use_case = AnnotateVideoUseCase::new(
        Box::new(FfmpegReader::new()),
        Box::new(FfmpegWriter::new(settings.video.codec)),
        SkipFrameAnalyzer::new(analyzer, settings.streaming.detection_interval)?,
        annotator,
        &settings.video.container,
    )
    .with_logger(Box::new(StdoutPipelineLogger::default()))
    .with_progress(progress);

    let video = use_case.execute(&bytes, extension)?;
    eprintln!();
    fs::write(output, &video.bytes)?;
    log::info!(
        "Wrote {} frames at {} fps to {}",
        video.frames,
        video.frame_rate,
        output.display()
    );
    Ok(())
}

fn run_stream(
    analyzer: FaceAnalyzer,
    annotator: Arc<dyn FrameAnnotator>,
    settings: &Settings,
) -> Result<(), Box<dyn std::error::Error>> {
    let codec: Arc<dyn ImageCodec> = Arc::new(ImageCrateCodec::new());
    let mut session = StreamingSession::new(analyzer, annotator, codec, &settings.streaming)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        // One reply line per frame keeps the caller in lockstep, even on failure.
        match session.process_base64(&line) {
            Ok(reply) => writeln!(out, "{reply}")?,
            Err(e) => {
                log::warn!("Frame rejected: {e}");
                writeln!(out)?;
            }
        }
        out.flush()?;
    }
    log::info!("Stream closed after {} frames", session.frames_processed());
    Ok(())
}

fn content_type(path: &Path) -> String {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return "application/octet-stream".to_string();
    }
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "tif" => "image/tiff".to_string(),
        other => format!("image/{other}"),
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face cascade... {pct}%");
    } else {
        eprint!("\rDownloading face cascade... {downloaded} bytes");
    }
}
