use std::path::{Path, PathBuf};
use std::sync::mpsc;

use serde::Serialize;

use crate::config::{PipelineConfig, ReadingOrder};
use crate::detection::classify::RegionClassifier;
use crate::detection::contours::RegionDetector;
use crate::detection::fusion::Fuser;
use crate::detection::preprocessing::{preprocess, VariantSet};
use crate::detection::sequence::{build_sequence, group_numbers, MAX_VALUE};
use crate::error::{RecognizeError, StageError};
use crate::models::{
    Candidate, CandidateRegion, DetectorKind, FusedNumber, RasterImage, ResultSequence, VariantKind,
};

/// One detector scanning one variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectorJob {
    pub detector: DetectorKind,
    pub variant: VariantKind,
}

/// Region count produced by a detector job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub detector: DetectorKind,
    pub variant: VariantKind,
    pub regions: usize,
}

/// A stage that could not contribute to the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedStage {
    pub stage: String,
    pub reason: String,
}

/// Per-stage counts of one run. An empty sequence with no degraded stages
/// means nothing was found; degraded entries show which sources were lost.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageReport {
    pub variants: Vec<VariantKind>,
    pub jobs: Vec<JobReport>,
    pub degraded: Vec<DegradedStage>,
    pub regions: usize,
    pub classified: usize,
    pub fused: usize,
    pub in_range: usize,
}

impl StageReport {
    fn degrade(&mut self, stage: impl Into<String>, err: &StageError) {
        self.degraded.push(DegradedStage {
            stage: stage.into(),
            reason: err.to_string(),
        });
    }
}

/// Full output of a run: the sequence plus everything that led to it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Recognition {
    pub numbers: ResultSequence,
    /// Every classified proposal, before fusion
    pub candidates: Vec<Candidate>,
    /// One candidate per bucket, left to right
    pub fused: Vec<Candidate>,
    pub report: StageReport,
}

/// Preprocess, detect, classify, fuse and build the sequence for a raster.
#[derive(Debug, Clone, Default)]
pub struct RecognitionPipeline {
    config: PipelineConfig,
    debug_dir: Option<PathBuf>,
}

impl RecognitionPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            debug_dir: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self, RecognizeError> {
        let io_err = |source| RecognizeError::DebugDir {
            path: output_dir.clone(),
            source,
        };
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir).map_err(io_err)?;
            if entries.next().is_some() {
                return Err(RecognizeError::DebugDirNotEmpty(output_dir));
            }
        } else {
            std::fs::create_dir_all(&output_dir).map_err(io_err)?;
        }

        self.debug_dir = Some(output_dir);
        Ok(self)
    }

    /// Detector/variant pairs for this run, in a fixed order.
    pub fn jobs(variants: &VariantSet) -> Vec<DetectorJob> {
        DetectorKind::ALL
            .iter()
            .flat_map(|&detector| {
                detector
                    .source_variants()
                    .iter()
                    .map(move |&variant| DetectorJob { detector, variant })
            })
            .filter(|job| variants.contains(job.variant))
            .collect()
    }

    /// Run the pipeline on one raster
    pub fn run(&self, image: &RasterImage) -> Result<Recognition, RecognizeError> {
        image.validate()?;
        log::debug!(
            "Recognising {}x{} raster ({} channels)",
            image.width(),
            image.height(),
            image.channels()
        );

        let mut report = StageReport::default();

        // Step 1: Preprocess
        let variants = preprocess(image);
        if variants.is_empty() {
            log::warn!("No preprocessing variant survived");
        }
        report.variants = variants.kinds();
        for (kind, err) in variants.degraded() {
            report.degrade(format!("preprocess/{kind}"), err);
        }
        if let Some(dir) = &self.debug_dir {
            save_debug_variants(dir, &variants);
        }

        // Step 2: Detect regions
        let jobs = Self::jobs(&variants);
        let results = if self.config.parallel {
            self.detect_parallel(&variants, &jobs)
        } else {
            jobs.iter()
                .map(|job| self.detect_one(&variants, job))
                .collect()
        };

        let mut regions = Vec::new();
        for (job, result) in jobs.iter().zip(results) {
            match result {
                Ok(found) => {
                    report.jobs.push(JobReport {
                        detector: job.detector,
                        variant: job.variant,
                        regions: found.len(),
                    });
                    regions.extend(found);
                }
                Err(err) => {
                    log::warn!("Detector {} on `{}` lost: {}", job.detector, job.variant, err);
                    report.degrade(format!("detect/{}/{}", job.detector, job.variant), &err);
                }
            }
        }
        report.regions = regions.len();
        log::debug!("{} candidate regions from {} jobs", regions.len(), jobs.len());

        // Step 3: Classify
        let classifier = RegionClassifier::new(self.config.min_template_score);
        let candidates: Vec<Candidate> = regions
            .iter()
            .filter_map(|r| classifier.candidate(r))
            .collect();
        report.classified = candidates.len();
        log::debug!("{} regions classified", candidates.len());

        // Step 4: Fuse
        let fuser = Fuser::new(self.config.bucket_width())
            .with_min_confidence(self.config.min_classifier_confidence);
        let fused = fuser.fuse(&candidates);
        report.fused = fused.len();
        for c in &fused {
            log::debug!(
                "Fused {} at x={} (confidence {:.1}, {})",
                c.digit,
                c.x(),
                c.confidence,
                c.source_method()
            );
        }

        // Step 5: Range filter and sequence
        let mut numbers: Vec<FusedNumber> = group_numbers(&fused, self.config.digit_join_gap_px);
        if self.config.reading_order == ReadingOrder::RightToLeft {
            numbers.reverse();
        }
        let sequence = build_sequence(&numbers, self.config.unique_mode);
        report.in_range = numbers.iter().filter(|n| n.value <= MAX_VALUE).count();

        log::info!("Recognised sequence {:?}", sequence);

        Ok(Recognition {
            numbers: sequence,
            candidates,
            fused,
            report,
        })
    }

    fn detect_one(
        &self,
        variants: &VariantSet,
        job: &DetectorJob,
    ) -> Result<Vec<CandidateRegion>, StageError> {
        let lookup = |kind: VariantKind| {
            variants.get(kind).ok_or(StageError::MissingVariant {
                detector: job.detector.name(),
                variant: kind.name(),
            })
        };
        let variant = lookup(job.variant)?;
        let gray = lookup(VariantKind::Gray)?;
        RegionDetector::new(job.detector, self.config.area_bounds_regime)
            .detect(variant, &gray.image)
    }

    /// Each job on its own scoped thread. Results come back over a channel
    /// tagged by job index and are put back in job order.
    fn detect_parallel(
        &self,
        variants: &VariantSet,
        jobs: &[DetectorJob],
    ) -> Vec<Result<Vec<CandidateRegion>, StageError>> {
        let (sender, receiver) = mpsc::channel();

        std::thread::scope(|scope| {
            for (idx, job) in jobs.iter().enumerate() {
                let sender = sender.clone();
                scope.spawn(move || {
                    let result = self.detect_one(variants, job);
                    // The receiver outlives the scope
                    let _ = sender.send((idx, result));
                });
            }
        });
        drop(sender);

        let mut tagged: Vec<(usize, Result<Vec<CandidateRegion>, StageError>)> =
            receiver.iter().collect();
        tagged.sort_by_key(|(idx, _)| *idx);
        tagged.into_iter().map(|(_, result)| result).collect()
    }
}

fn save_debug_variants(dir: &Path, variants: &VariantSet) {
    for (idx, variant) in variants.iter().enumerate() {
        let path = dir.join(format!("{:02}_{}.png", idx + 1, variant.kind));
        match variant.image.save(&path) {
            Ok(()) => log::debug!("Debug: saved {}", path.display()),
            Err(e) => log::warn!("Failed to save debug image {}: {}", path.display(), e),
        }
    }
}

/// Recognise the number sequence in `image` with `config`.
pub fn recognize(
    image: &RasterImage,
    config: &PipelineConfig,
) -> Result<ResultSequence, RecognizeError> {
    Ok(RecognitionPipeline::new(config.clone()).run(image)?.numbers)
}
