use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};

use rollcall_core::attendance::domain::voter::AttendanceVoter;
use rollcall_core::detection::domain::detector_settings::DetectorStrategy;
use rollcall_core::detection::infrastructure::detector_factory::create_detector;
use rollcall_core::pipeline::config::PipelineConfig;
use rollcall_core::pipeline::error::PipelineError;
use rollcall_core::pipeline::extract_faces_use_case::{ExtractFacesUseCase, ProgressFn};
use rollcall_core::pipeline::input::validate_video_path;
use rollcall_core::pipeline::register_faces_use_case::RegisterFacesUseCase;
use rollcall_core::pipeline::scratch_space::ScratchSpace;
use rollcall_core::pipeline::take_attendance_use_case::TakeAttendanceUseCase;
use rollcall_core::recognition::domain::cluster_engine::ClusterEngine;
use rollcall_core::recognition::domain::face_embedder::FaceEmbedder;
use rollcall_core::recognition::domain::roster::{filter_by_class, RosterIdentity};
use rollcall_core::recognition::infrastructure::onnx_arcface_embedder::OnnxArcfaceEmbedder;
use rollcall_core::shared::constants::{EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL};
use rollcall_core::shared::model_resolver;
use rollcall_core::tracking::domain::face_tracker::FaceTracker;
use rollcall_core::tracking::domain::tracking_policy::TrackingPolicy;
use rollcall_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use rollcall_core::video::infrastructure::image_file_reader::ImageFileReader;
use rollcall_core::video::infrastructure::image_file_writer::ImageFileWriter;

/// Face registration and attendance from classroom video.
#[derive(Parser)]
#[command(name = "rollcall")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Subcommand)]
enum Command {
    /// Find the distinct people in a video and print one cluster per person.
    Register {
        /// Input video file.
        video: PathBuf,
    },
    /// Match the faces in a session video against a roster.
    Attendance {
        /// Input video file.
        video: PathBuf,

        /// JSON array of students with id, name, embedding, embeddings_list.
        #[arg(long)]
        roster: PathBuf,

        /// Only consider roster entries with this classId.
        #[arg(long)]
        class_id: Option<String>,

        /// Maximum cosine distance for a match to count as a vote.
        #[arg(long)]
        threshold: Option<f64>,

        /// Votes needed before a student is marked present.
        #[arg(long)]
        min_votes: Option<usize>,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// JSON pipeline configuration; missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the lightweight face detector.
    #[arg(long, alias = "lightweight", global = true)]
    resource_constrained: bool,

    /// Raise the detector's confidence and minimum face size for attendance
    /// too; registration always uses the strict floors.
    #[arg(long, global = true)]
    strict: bool,

    /// Directory for per-run working files (default: system temp dir).
    #[arg(long, global = true)]
    scratch_dir: Option<PathBuf>,

    /// Directory searched for model files before the user cache.
    #[arg(long, global = true)]
    models_dir: Option<PathBuf>,

    /// Keep the run's face crops after exiting.
    #[arg(long, global = true)]
    keep_scratch: bool,
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
    let mut config = load_config(&cli.common)?;

    let json = match cli.command {
        Command::Register { video } => {
            validate_video_path(&video)?;
            run_register(&video, &config, &cli.common)?
        }
        Command::Attendance {
            video,
            roster,
            class_id,
            threshold,
            min_votes,
        } => {
            if let Some(t) = threshold {
                config.voting.accept_threshold = t;
            }
            if let Some(n) = min_votes {
                config.voting.min_votes = n;
            }
            config.validate()?;
            validate_video_path(&video)?;
            let roster = load_roster(&roster, class_id.as_deref())?;
            run_attendance(&video, &roster, &config, &cli.common)?
        }
    };

    println!("{json}");
    Ok(())
}

fn run_register(
    video: &Path,
    config: &PipelineConfig,
    common: &CommonArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let scratch = open_scratch(common)?;
    let extractor = build_extractor(config, config.registration_tracking.clone(), &scratch, common)?;
    let mut use_case = RegisterFacesUseCase::new(
        extractor,
        load_embedder(common),
        Box::new(ImageFileReader::new()),
        ClusterEngine::new(config.clustering.clone()),
    );

    let report = use_case.execute(video);
    eprintln!();
    Ok(serde_json::to_string_pretty(&report?)?)
}

fn run_attendance(
    video: &Path,
    roster: &[RosterIdentity],
    config: &PipelineConfig,
    common: &CommonArgs,
) -> Result<String, Box<dyn std::error::Error>> {
    let scratch = open_scratch(common)?;
    let extractor = build_extractor(config, config.attendance_tracking.clone(), &scratch, common)?;
    let mut use_case = TakeAttendanceUseCase::new(
        extractor,
        load_embedder(common),
        Box::new(ImageFileReader::new()),
        AttendanceVoter::new(config.voting.clone()),
        config.attendance_min_sharpness,
    );

    let report = use_case.execute(video, roster);
    eprintln!();
    Ok(serde_json::to_string_pretty(&report?)?)
}

fn load_config(common: &CommonArgs) -> Result<PipelineConfig, PipelineError> {
    let mut config = match &common.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if common.resource_constrained {
        config.detector.strategy = DetectorStrategy::Lightweight;
    }
    config.detector = config.detector.with_strict_quality(common.strict);
    Ok(config)
}

fn load_roster(
    path: &Path,
    class_id: Option<&str>,
) -> Result<Vec<RosterIdentity>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read roster {}: {e}", path.display()))?;
    let roster: Vec<RosterIdentity> = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid roster {}: {e}", path.display()))?;
    let roster = match class_id {
        Some(class_id) => filter_by_class(roster, class_id),
        None => roster,
    };
    log::info!("Loaded roster of {} students", roster.len());
    Ok(roster)
}

fn open_scratch(common: &CommonArgs) -> Result<ScratchSpace, PipelineError> {
    let base = common
        .scratch_dir
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("rollcall"));
    let mut scratch = ScratchSpace::create(&base)?;
    if common.keep_scratch {
        scratch.keep();
        log::info!("Keeping face crops in {}", scratch.faces_dir().display());
    }
    Ok(scratch)
}

fn build_extractor(
    config: &PipelineConfig,
    policy: TrackingPolicy,
    scratch: &ScratchSpace,
    common: &CommonArgs,
) -> Result<ExtractFacesUseCase, PipelineError> {
    let settings = config.detector_for(&policy);
    let strategy = settings.strategy;
    log::info!("Resolving model: {}", strategy.model_name());
    let model_path = model_resolver::resolve(
        strategy.model_name(),
        strategy.model_url(),
        common.models_dir.as_deref(),
        Some(Box::new(download_progress)),
    )
    .map_err(|e| PipelineError::Detector(e.to_string()))?;
    let detector = create_detector(&settings, &model_path)
        .map_err(|e| PipelineError::Detector(e.to_string()))?;

    let reader = FfmpegReader::with_stride(policy.frame_stride);
    let tracker = FaceTracker::new(policy, Box::new(ImageFileWriter::new()), scratch.faces_dir())
        .with_track_limit(config.max_faces);

    let progress: ProgressFn = Box::new(|current, total| {
        eprint!("\rScanning frame {current}/{total}");
        true
    });

    Ok(ExtractFacesUseCase::new(
        Box::new(reader),
        detector,
        tracker,
        Some(progress),
    ))
}

/// A missing embedding model degrades the run instead of failing it.
fn load_embedder(common: &CommonArgs) -> Option<Box<dyn FaceEmbedder>> {
    let loaded = model_resolver::resolve(
        EMBEDDING_MODEL_NAME,
        Some(EMBEDDING_MODEL_URL),
        common.models_dir.as_deref(),
        Some(Box::new(download_progress)),
    )
    .map_err(|e| e.to_string())
    .and_then(|path| OnnxArcfaceEmbedder::new(&path).map_err(|e| e.to_string()));

    match loaded {
        Ok(embedder) => Some(Box::new(embedder)),
        Err(e) => {
            log::warn!("{}", PipelineError::Embedder(e));
            None
        }
    }
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
