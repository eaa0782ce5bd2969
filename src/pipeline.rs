//! Pipeline composition
//!
//! Stage 1 runs OCR over the screenshots, stage 2 filters the records into
//! three CSV tables, stage 3 merges table B with human labels. Stages hand
//! their results to the next stage in memory when run together, and read the
//! previous stage's files when run alone.

use anyhow::{anyhow, bail, Context, Result};
use rayon::prelude::*;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

use crate::analysis::{aggregate, evaluate, merge, ExportTables, FilteredUnfilteredRow, MergedRow};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::ocr::{clean_fragments, TextRecognizer};
use crate::storage::tables::{DIFF_CSV, FILTERED_ONLY_CSV, FILTERED_UNFILTERED_CSV, MERGED_CSV};
use crate::storage::{file_name, list_files, read_labels, read_table, write_merged, write_table, StageStore};
use crate::vision::{filter, FilterResult, ImageRecord};

/// Pipeline stage, numbered as on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Ocr = 1,
    Filter = 2,
    Merge = 3,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ocr, Stage::Filter, Stage::Merge];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn title(self) -> &'static str {
        match self {
            Stage::Ocr => "OCR -> JSON",
            Stage::Filter => "Keyboard & Status Bar Filtering -> CSVs",
            Stage::Merge => "Merge with Human Labels -> merged_results.csv",
        }
    }
}

impl TryFrom<u8> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Stage::Ocr),
            2 => Ok(Stage::Filter),
            3 => Ok(Stage::Merge),
            other => Err(anyhow!("Unknown stage '{}'. Valid stages: 1, 2, 3", other)),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "STEP {}: {}", self.index(), self.title())
    }
}

/// Counts from an OCR stage run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OcrSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Three-stage screenshot pipeline
pub struct Pipeline {
    config: PipelineConfig,
    store: StageStore,
    recognizer: Option<Box<dyn TextRecognizer>>,
}

impl Pipeline {
    /// Create a pipeline without an OCR recognizer (stages 2 and 3 only)
    pub fn new(config: PipelineConfig) -> Self {
        let store = StageStore::new(config.paths.ocr_data_dir.clone());
        Self {
            config,
            store,
            recognizer: None,
        }
    }

    /// Attach the recognizer used by stage 1
    pub fn with_recognizer(mut self, recognizer: Box<dyn TextRecognizer>) -> Self {
        self.recognizer = Some(recognizer);
        self
    }

    /// Clear stored OCR records
    pub fn reset(&self) -> Result<()> {
        self.store
            .reset()
            .with_context(|| format!("Failed to reset {}", self.store.root().display()))
    }

    /// Fresh full run: reset, then every stage
    pub fn run_all(&self) -> Result<()> {
        self.reset()?;
        self.run_stages(&Stage::ALL)
    }

    /// Run the stages asked for on the command line; the complete 1 2 3 list is a full run
    pub fn run_requested(&self, stages: &[Stage]) -> Result<()> {
        if stages == Stage::ALL.as_slice() {
            info!("Full run: clearing OCR data first");
            self.run_all()
        } else {
            self.run_stages(stages)
        }
    }

    /// Run a single stage
    pub fn run_stage(&self, stage: Stage) -> Result<()> {
        self.run_stages(&[stage])
    }

    /// Run stages in the given order; never resets
    pub fn run_stages(&self, stages: &[Stage]) -> Result<()> {
        let mut table_b: Option<Vec<FilteredUnfilteredRow>> = None;

        for &stage in stages {
            info!("{}", "=".repeat(60));
            info!("  {}", stage);
            info!("{}", "=".repeat(60));

            match stage {
                Stage::Ocr => {
                    let summary = self.run_ocr()?;
                    if summary.failed > 0 {
                        warn!("{} screenshot(s) have no OCR record", summary.failed);
                    }
                }
                Stage::Filter => {
                    let tables = self.run_filter()?;
                    table_b = Some(tables.filtered_unfiltered);
                }
                Stage::Merge => {
                    self.run_merge(table_b.as_deref())?;
                }
            }
        }

        info!("Pipeline complete.");
        Ok(())
    }

    /// Stage 1: one JSON record per screenshot. Existing records are kept.
    pub fn run_ocr(&self) -> Result<OcrSummary> {
        let recognizer = self
            .recognizer
            .as_deref()
            .ok_or_else(|| anyhow!("No OCR command configured (set [ocr] command)"))?;

        let input_dir = &self.config.paths.input_dir;
        if !input_dir.is_dir() {
            return Err(PipelineError::MissingInput {
                stage: Stage::Ocr.index(),
                path: input_dir.clone(),
            }
            .into());
        }

        let images = list_files(input_dir, &self.config.ocr.image_extensions)
            .with_context(|| format!("Failed to list {}", input_dir.display()))?;

        let mut summary = OcrSummary::default();
        if images.is_empty() {
            warn!("No images found in {}", input_dir.display());
            return Ok(summary);
        }

        self.store.ensure()?;
        info!("Found {} image(s) in {}", images.len(), input_dir.display());

        let total = images.len();
        for (idx, image_path) in images.iter().enumerate() {
            let filename = file_name(image_path);

            if self.store.contains(&filename) {
                info!("[{}/{}] SKIP (already done): {}", idx + 1, total, filename);
                summary.skipped += 1;
                continue;
            }

            info!("[{}/{}] Processing: {}", idx + 1, total, filename);
            let fragments = match recognizer.recognize(image_path) {
                Ok(fragments) => fragments,
                Err(e) => {
                    error!("  OCR error on {}: {:#}", filename, e);
                    summary.failed += 1;
                    continue;
                }
            };

            let fragments = clean_fragments(fragments, self.config.filter.min_confidence);
            let mut record = ImageRecord::new(filename.clone(), fragments);
            match image::image_dimensions(image_path) {
                Ok((width, height)) => record = record.with_dimensions(width, height),
                Err(e) => warn!("  Could not read dimensions of {}: {}", filename, e),
            }

            let saved = self.store.save(&record)?;
            info!("  Saved {} fragment(s) -> {}", record.fragments.len(), saved.display());
            summary.processed += 1;
        }

        info!("Done. Processed: {}, Skipped: {}, Failed: {}", summary.processed, summary.skipped, summary.failed);
        Ok(summary)
    }

    /// Stage 2: filter every stored record and write the three tables
    pub fn run_filter(&self) -> Result<ExportTables> {
        let stage = Stage::Filter.index();
        let files = self.store.list(stage)?;
        if files.is_empty() {
            return Err(PipelineError::MissingInput {
                stage,
                path: self.store.root().to_path_buf(),
            }
            .into());
        }

        let input_dir = &self.config.paths.input_dir;
        if input_dir.is_dir() {
            let images = list_files(input_dir, &self.config.ocr.image_extensions)
                .with_context(|| format!("Failed to list {}", input_dir.display()))?;
            self.store.require_records(&images, stage)?;
        }

        info!("Found {} JSON file(s) in {}", files.len(), self.store.root().display());

        let records = files
            .iter()
            .map(|path| StageStore::load(path).with_context(|| format!("Failed to load {}", path.display())))
            .collect::<Result<Vec<ImageRecord>>>()?;

        let settings = &self.config.filter;
        let results: Vec<(String, FilterResult)> = records
            .par_iter()
            .map(|record| (record.filename.clone(), filter(record, settings)))
            .collect();

        let total = results.len();
        for (idx, (filename, result)) in results.iter().enumerate() {
            info!(
                "[{}/{}] {}  Fragments: {}  Status bar: {}  Keyboard: {}",
                idx + 1,
                total,
                filename,
                result.unfiltered_count(),
                if result.has_status_bar() { "yes" } else { "no" },
                if result.has_keyboard() { "yes" } else { "no" }
            );
        }

        let tables = aggregate(results, self.config.export.duplicates)?;
        self.write_tables(&tables)?;

        info!("Done. {} screenshot(s) processed.", tables.len());
        Ok(tables)
    }

    fn write_tables(&self, tables: &ExportTables) -> Result<()> {
        let out = &self.config.paths.output_dir;
        std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;

        let path = out.join(FILTERED_ONLY_CSV);
        write_table(&path, &tables.filtered_only).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved -> {}", path.display());

        let path = out.join(FILTERED_UNFILTERED_CSV);
        write_table(&path, &tables.filtered_unfiltered).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved -> {}", path.display());

        let path = out.join(DIFF_CSV);
        write_table(&path, &tables.diff).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved -> {}", path.display());

        Ok(())
    }

    /// Stage 3: merge table B with the human labels.
    ///
    /// Without `table_b` the rows come from the stage 2 CSV.
    pub fn run_merge(&self, table_b: Option<&[FilteredUnfilteredRow]>) -> Result<Vec<MergedRow>> {
        let stage = Stage::Merge.index();
        let labels_path = &self.config.paths.labels_csv;
        if !labels_path.is_file() {
            return Err(PipelineError::MissingInput {
                stage,
                path: labels_path.clone(),
            }
            .into());
        }

        let settings = &self.config.labels;
        let labels = read_labels(labels_path, settings)
            .with_context(|| format!("Failed to read labels from {}", labels_path.display()))?;
        if labels.is_empty() {
            warn!("No labels in {}; every row will be unlabelled", labels_path.display());
        } else {
            info!("Loaded {} label(s) from {}", labels.len(), labels_path.display());
        }

        let loaded;
        let rows = match table_b {
            Some(rows) => rows,
            None => {
                let path = self.table_b_path();
                if !path.is_file() {
                    return Err(PipelineError::MissingInput { stage, path }.into());
                }
                loaded = read_table::<FilteredUnfilteredRow>(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                loaded.as_slice()
            }
        };

        let merged = merge(rows, &labels, settings.join);

        let out = &self.config.paths.output_dir;
        std::fs::create_dir_all(out).with_context(|| format!("Failed to create {}", out.display()))?;
        let path = out.join(MERGED_CSV);
        write_merged(&path, &merged, &settings.no_label_marker)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved -> {}", path.display());

        let summary = evaluate(&merged);
        info!(
            "Labelled: {}  Unlabelled: {}  Similarity filtered: {:.3}  unfiltered: {:.3}  Improved: {}",
            summary.labelled,
            summary.unlabelled,
            summary.filtered_similarity,
            summary.unfiltered_similarity,
            summary.improved
        );

        Ok(merged)
    }

    fn table_b_path(&self) -> PathBuf {
        self.config.paths.output_dir.join(FILTERED_UNFILTERED_CSV)
    }
}

/// Parse stage indices, rejecting unknown ones before anything runs
pub fn parse_stages(indices: &[u8]) -> Result<Vec<Stage>> {
    if indices.is_empty() {
        bail!("No stages given");
    }
    indices.iter().map(|&i| Stage::try_from(i)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::merge::JoinPolicy;
    use crate::vision::regions::KeyboardBoundary;
    use crate::vision::{BoxGeometry, Fragment};
    use std::path::Path;

    /// Recognizer that answers from a fixed script keyed by file name
    struct ScriptedRecognizer;

    impl TextRecognizer for ScriptedRecognizer {
        fn recognize(&self, image_path: &Path) -> Result<Vec<Fragment>> {
            match file_name(image_path).as_str() {
                "shot_1.png" => Ok(vec![
                    Fragment::new("Hello", BoxGeometry::rect(10.0, 200.0, 300.0, 260.0), 0.95),
                    Fragment::new("q w e r t y", BoxGeometry::rect(10.0, 1700.0, 900.0, 1760.0), 0.60),
                    Fragment::new("smudge", BoxGeometry::rect(10.0, 900.0, 300.0, 940.0), 0.10),
                ]),
                "shot_12.png" => Ok(vec![Fragment::new(
                    "Good morning",
                    BoxGeometry::rect(10.0, 400.0, 500.0, 460.0),
                    0.9,
                )]),
                "broken.png" => Err(anyhow!("engine crashed")),
                _ => Ok(vec![]),
            }
        }
    }

    fn setup(root: &Path) -> PipelineConfig {
        let input = root.join("screenshots");
        std::fs::create_dir_all(&input).unwrap();
        for name in ["shot_12.png", "shot_1.png", "blank.png"] {
            image::GrayImage::new(1000, 2000).save(input.join(name)).unwrap();
        }
        std::fs::write(input.join("notes.txt"), b"not a screenshot").unwrap();
        std::fs::write(root.join("labels.csv"), "filename,label\nshot_1.png,Hello\nshot_99.png,orphan\n").unwrap();

        let mut config = PipelineConfig::default();
        config.paths.input_dir = input;
        config.paths.ocr_data_dir = root.join("OCR_data");
        config.paths.output_dir = root.join("out");
        config.paths.labels_csv = root.join("labels.csv");
        config.filter.keyboard = KeyboardBoundary::BottomFraction(0.30);
        config
    }

    fn pipeline(root: &Path) -> Pipeline {
        Pipeline::new(setup(root)).with_recognizer(Box::new(ScriptedRecognizer))
    }

    /// Screenshot the recognizer fails on
    fn add_broken(root: &Path) {
        std::fs::create_dir_all(root.join("screenshots")).unwrap();
        image::GrayImage::new(1000, 2000)
            .save(root.join("screenshots").join("broken.png"))
            .unwrap();
    }

    #[test]
    fn test_parse_stages() {
        assert_eq!(parse_stages(&[2, 3]).unwrap(), vec![Stage::Filter, Stage::Merge]);
        assert!(parse_stages(&[2, 7]).is_err());
        assert!(parse_stages(&[]).is_err());
    }

    #[test]
    fn test_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        pipeline.run_all().unwrap();

        let out = dir.path().join("out");
        let merged = std::fs::read_to_string(out.join(MERGED_CSV)).unwrap();
        assert_eq!(
            merged,
            "filename,unfiltered_text,filtered_text,human_labelled\n\
             blank.png,,,<no label>\n\
             shot_1.png,Hello q w e r t y,Hello,Hello\n\
             shot_12.png,Good morning,Good morning,<no label>\n"
        );

        let diff = std::fs::read_to_string(out.join(DIFF_CSV)).unwrap();
        assert!(diff.contains("shot_1.png,Hello q w e r t y,Hello,,q w e r t y\n"));
        assert!(!diff.contains("smudge"));
    }

    #[test]
    fn test_full_run_fails_when_ocr_failed() {
        let dir = tempfile::tempdir().unwrap();
        add_broken(dir.path());
        let pipeline = pipeline(dir.path());

        let err = pipeline.run_all().unwrap_err();

        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::MissingInput { stage, path }) => {
                assert_eq!(*stage, 2);
                assert_eq!(path, &dir.path().join("OCR_data").join("broken.json"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!dir.path().join("out").join(DIFF_CSV).exists());
    }

    #[test]
    fn test_filter_fails_on_deleted_record() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_ocr().unwrap();
        let removed = dir.path().join("OCR_data").join("shot_12.json");
        std::fs::remove_file(&removed).unwrap();

        let err = pipeline.run_filter().unwrap_err();

        match err.downcast_ref::<PipelineError>() {
            Some(PipelineError::MissingInput { stage, path }) => {
                assert_eq!(*stage, 2);
                assert_eq!(path, &removed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_filter_without_screenshot_dir_uses_records() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_ocr().unwrap();
        std::fs::remove_dir_all(dir.path().join("screenshots")).unwrap();

        let tables = pipeline.run_filter().unwrap();

        assert_eq!(tables.len(), 3);
    }

    #[test]
    fn test_ocr_skips_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        add_broken(dir.path());
        let pipeline = pipeline(dir.path());

        let first = pipeline.run_ocr().unwrap();
        assert_eq!(first, OcrSummary { processed: 3, skipped: 0, failed: 1 });

        let second = pipeline.run_ocr().unwrap();
        assert_eq!(second, OcrSummary { processed: 0, skipped: 3, failed: 1 });
    }

    #[test]
    fn test_filter_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_ocr().unwrap();
        let out = dir.path().join("out");

        pipeline.run_stage(Stage::Filter).unwrap();
        let first: Vec<Vec<u8>> = [FILTERED_ONLY_CSV, FILTERED_UNFILTERED_CSV, DIFF_CSV]
            .iter()
            .map(|name| std::fs::read(out.join(name)).unwrap())
            .collect();

        pipeline.run_stage(Stage::Filter).unwrap();
        let second: Vec<Vec<u8>> = [FILTERED_ONLY_CSV, FILTERED_UNFILTERED_CSV, DIFF_CSV]
            .iter()
            .map(|name| std::fs::read(out.join(name)).unwrap())
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn test_filter_without_ocr_data() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let err = pipeline.run_stage(Stage::Filter).unwrap_err();
        let err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(err, PipelineError::MissingInput { stage: 2, .. }));
    }

    #[test]
    fn test_merge_alone_reads_table_b() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_stages(&[Stage::Ocr, Stage::Filter]).unwrap();

        let merged = pipeline.run_merge(None).unwrap();

        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|r| r.filename != "shot_99.png"));
    }

    #[test]
    fn test_merge_without_table_b() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let err = pipeline.run_merge(None).unwrap_err();
        let err = err.downcast_ref::<PipelineError>().unwrap();
        assert!(matches!(err, PipelineError::MissingInput { stage: 3, .. }));
    }

    #[test]
    fn test_merge_schema_mismatch_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.labels.key_column = "image".to_string();
        let pipeline = Pipeline::new(config);
        let rows = vec![FilteredUnfilteredRow {
            filename: "a.png".to_string(),
            unfiltered_text: "a".to_string(),
            filtered_text: "a".to_string(),
        }];

        let err = pipeline.run_merge(Some(&rows)).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::SchemaMismatch { .. })
        ));
        assert!(!dir.path().join("out").join(MERGED_CSV).exists());
    }

    #[test]
    fn test_full_outer_merge() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = setup(dir.path());
        config.labels.join = JoinPolicy::FullOuter;
        let pipeline = Pipeline::new(config).with_recognizer(Box::new(ScriptedRecognizer));

        pipeline.run_all().unwrap();

        let merged = std::fs::read_to_string(dir.path().join("out").join(MERGED_CSV)).unwrap();
        assert!(merged.ends_with("shot_99.png,,,orphan\n"));
    }

    #[test]
    fn test_ocr_requires_recognizer() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(setup(dir.path()));

        assert!(pipeline.run_stage(Stage::Ocr).is_err());
    }

    #[test]
    fn test_reset_only_on_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_ocr().unwrap();
        let stale = dir.path().join("OCR_data").join("stale.json");
        std::fs::write(&stale, r#"{"filename": "stale.png", "fragments": []}"#).unwrap();

        pipeline.run_stages(&[Stage::Filter]).unwrap();
        assert!(stale.exists());

        pipeline.run_all().unwrap();
        assert!(!stale.exists());
    }

    #[test]
    fn test_explicit_all_stages_is_full_run() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());
        pipeline.run_ocr().unwrap();
        let stale = dir.path().join("OCR_data").join("stale.json");
        std::fs::write(&stale, r#"{"filename": "stale.png", "fragments": []}"#).unwrap();

        pipeline.run_requested(&[Stage::Ocr, Stage::Filter]).unwrap();
        assert!(stale.exists());

        pipeline.run_requested(&parse_stages(&[1, 2, 3]).unwrap()).unwrap();
        assert!(!stale.exists());
    }
}
