use clap::{Parser, ValueEnum};
use image::ImageReader;
use std::path::PathBuf;

use roulette_digits::{AreaRegime, PipelineConfig, RasterImage, ReadingOrder, RecognitionPipeline};

#[derive(Clone, Copy, ValueEnum)]
enum Regime {
    Loose,
    Strict,
}

impl From<Regime> for AreaRegime {
    fn from(regime: Regime) -> Self {
        match regime {
            Regime::Loose => AreaRegime::Loose,
            Regime::Strict => AreaRegime::Strict,
        }
    }
}

#[derive(Parser)]
#[command(name = "roulette-digits")]
#[command(about = "Read the sequence of roulette numbers shown in a captured image")]
struct Cli {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Save preprocessing variants to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,

    /// JSON file with pipeline options; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Geometric filter regime
    #[arg(long, value_enum)]
    regime: Option<Regime>,

    /// Width of the fusion buckets in pixels
    #[arg(long, value_name = "PX")]
    bucket_width: Option<u32>,

    /// Drop repeated values, keeping the first occurrence
    #[arg(long)]
    unique: bool,

    /// Report the sequence right to left
    #[arg(long)]
    right_to_left: bool,

    /// Join neighbouring digits at most this far apart into one number
    #[arg(long, value_name = "PX")]
    join_gap: Option<u32>,

    /// Run detectors on worker threads
    #[arg(long)]
    parallel: bool,

    /// Print the full recognition as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    anyhow::anyhow!("Failed to read config {}: {}", path.display(), e)
                })?;
                PipelineConfig::from_json_str(&text)
                    .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?
            }
            None => PipelineConfig::default(),
        };

        if let Some(regime) = self.regime {
            config.area_bounds_regime = regime.into();
        }
        if let Some(width) = self.bucket_width {
            config.bucket_width_px = Some(width);
        }
        if self.join_gap.is_some() {
            config.digit_join_gap_px = self.join_gap;
        }
        config.unique_mode |= self.unique;
        config.parallel |= self.parallel;
        if self.right_to_left {
            config.reading_order = ReadingOrder::RightToLeft;
        }
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    log::debug!("Loading image: {:?}", args.image_path);

    // Load image
    let img = ImageReader::open(&args.image_path)?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    log::debug!("Image loaded: {}x{}", img.width(), img.height());

    let config = args.pipeline_config()?;
    let mut pipeline = RecognitionPipeline::new(config);
    log::debug!("Pipeline config: {:?}", pipeline.config());

    // Enable debug mode if requested
    if let Some(debug_dir) = args.debug_out.clone() {
        pipeline = pipeline.with_debug(debug_dir)?;
    }

    let recognition = pipeline.run(&RasterImage::from(img))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&recognition)?);
        return Ok(());
    }

    println!("=== Recognised Sequence ===");
    if recognition.numbers.is_empty() {
        println!("No numbers recognised.");
    } else {
        let values: Vec<String> = recognition.numbers.iter().map(u8::to_string).collect();
        println!("{}", values.join(" "));
    }

    if args.verbose {
        println!("\nFused candidates:");
        for c in &recognition.fused {
            println!(
                "  {} at ({}, {}) - confidence: {:.1} [{}]",
                c.digit,
                c.bbox.x,
                c.bbox.y,
                c.confidence,
                c.source_method()
            );
        }
        let report = &recognition.report;
        println!(
            "\nRegions: {}, classified: {}, fused: {}, in range: {}",
            report.regions, report.classified, report.fused, report.in_range
        );
        for stage in &report.degraded {
            println!("  degraded {}: {}", stage.stage, stage.reason);
        }
    }

    Ok(())
}
