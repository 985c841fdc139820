//! Experiment result facade.
//!
//! [`ResultSaver`] is what acquisition code talks to for the whole run. It owns
//! the cage roster (active cages, subject IDs), the per-cage frame sequences,
//! and the output collaborators (path resolver, record writer, image saver,
//! ROI decoder), all injected at construction.
//!
//! Frames accumulate in memory between checkpoints. Tables are never buffered:
//! each [`ResultSaver::save_table`] call renders and appends one complete
//! snapshot.
//!
//! Every persistence operation takes a [`PathScope`]. Live and archive output,
//! with or without a session directory, go through the same code and differ
//! only in where the resolver points.
//!
//! # Example
//!
//! ```no_run
//! use cage_results::{
//!     config::ExperimentConfig,
//!     frame::Frame,
//!     paths::PathScope,
//!     saver::ResultSaverBuilder,
//!     stack_store::SequenceKind,
//! };
//!
//! # fn main() -> Result<(), cage_results::error::ResultsError> {
//! let config = ExperimentConfig::load_from("experiment.toml")?;
//! let backgrounds = vec![Frame::filled(320, 240, 0); config.experiment.cage_count];
//! let saver = ResultSaverBuilder::new(&config).build(&backgrounds)?;
//! saver.set_subject_ids(vec!["M1".into(), "M2".into(), "M3".into(), "M4".into()])?;
//!
//! saver.append_frame(0, SequenceKind::Primary, Some(&Frame::filled(320, 240, 40)))?;
//! saver.fold_mean(0)?;
//! saver.save_sequence(SequenceKind::Mean, &PathScope::live(), None)?;
//! # Ok(())
//! # }
//! ```

use crate::config::ExperimentConfig;
use crate::error::{ResultsError, ResultsResult};
use crate::frame::{Frame, RawFrame};
use crate::image_saver::{ImageSaver, TiffStackSaver};
use crate::paths::{DirectoryLayout, PathResolver, PathScope, ResultKind};
use crate::provenance::Provenance;
use crate::roi::{ImageJRoiDecoder, RoiDecoder};
use crate::roster::CageRoster;
use crate::stack_store::{DebugAppend, SequenceKind, StackStore};
use crate::table::{RespectiveHeader, RespectiveQueue, ResultTable, TableContext, VersionInfo};
use crate::writer::{RecordWriter, TextFileWriter};
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;

/// Builder for [`ResultSaver`].
///
/// Collaborators default to the filesystem implementations: a
/// [`DirectoryLayout`] from the config's `[paths]`, [`TextFileWriter`],
/// [`TiffStackSaver`] and [`ImageJRoiDecoder`].
pub struct ResultSaverBuilder {
    config: ExperimentConfig,
    resolver: Option<Arc<dyn PathResolver>>,
    records: Option<Arc<dyn RecordWriter>>,
    images: Option<Arc<dyn ImageSaver>>,
    roi_decoder: Option<Arc<dyn RoiDecoder>>,
}

impl ResultSaverBuilder {
    /// Start a builder for `config`.
    pub fn new(config: &ExperimentConfig) -> Self {
        Self {
            config: config.clone(),
            resolver: None,
            records: None,
            images: None,
            roi_decoder: None,
        }
    }

    /// Use a custom path resolver.
    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use a custom text writer.
    pub fn record_writer(mut self, records: Arc<dyn RecordWriter>) -> Self {
        self.records = Some(records);
        self
    }

    /// Use a custom image saver.
    pub fn image_saver(mut self, images: Arc<dyn ImageSaver>) -> Self {
        self.images = Some(images);
        self
    }

    /// Use a custom ROI decoder.
    pub fn roi_decoder(mut self, decoder: Arc<dyn RoiDecoder>) -> Self {
        self.roi_decoder = Some(decoder);
        self
    }

    /// Validate the configuration and create empty sequences from one
    /// background frame per cage.
    pub fn build(self, backgrounds: &[Frame]) -> ResultsResult<ResultSaver> {
        self.config.validate()?;
        let cage_count = self.config.experiment.cage_count;
        let stacks = StackStore::new(cage_count, backgrounds)?;

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(DirectoryLayout::from_config(&self.config.paths)));

        tracing::info!(
            cages = cage_count,
            program = ?self.config.experiment.program,
            "Result saver ready"
        );

        Ok(ResultSaver {
            roster: RwLock::new(CageRoster::new(cage_count)),
            stacks,
            resolver,
            records: self.records.unwrap_or_else(|| Arc::new(TextFileWriter)),
            images: self.images.unwrap_or_else(|| Arc::new(TiffStackSaver)),
            roi_decoder: self.roi_decoder.unwrap_or_else(|| Arc::new(ImageJRoiDecoder)),
            provenance: Provenance::from_config(&self.config),
            version: VersionInfo::new(self.config.application.engine_version.clone()),
            total_header: self.config.experiment.total_header.clone(),
            xy_header: self.config.experiment.xy_header.clone(),
            bin_count: self.config.bin_count(),
        })
    }
}

/// Public surface for persisting experiment results.
pub struct ResultSaver {
    roster: RwLock<CageRoster>,
    stacks: StackStore,
    resolver: Arc<dyn PathResolver>,
    records: Arc<dyn RecordWriter>,
    images: Arc<dyn ImageSaver>,
    roi_decoder: Arc<dyn RoiDecoder>,
    provenance: Provenance,
    version: VersionInfo,
    total_header: Vec<String>,
    xy_header: String,
    bin_count: usize,
}

fn result_kind(kind: SequenceKind) -> ResultsResult<ResultKind> {
    match kind {
        SequenceKind::Primary => Ok(ResultKind::Image),
        SequenceKind::Mean => Ok(ResultKind::Mean),
        SequenceKind::Trace => Ok(ResultKind::Trace),
        SequenceKind::Subtract => Ok(ResultKind::Subtract),
        SequenceKind::Xor => Ok(ResultKind::Xor),
        SequenceKind::Debug => Err(ResultsError::Configuration(
            "debug sequences are saved with save_debug".to_string(),
        )),
    }
}

impl ResultSaver {
    /// Number of cages.
    pub fn cage_count(&self) -> usize {
        self.stacks.cage_count()
    }

    // Roster snapshots keep the roster lock out of per-cage critical sections.
    fn roster(&self) -> CageRoster {
        self.roster.read().clone()
    }

    /// Assign subject IDs, one per cage. Required before any save.
    pub fn set_subject_ids(&self, ids: Vec<String>) -> ResultsResult<()> {
        self.roster.write().set_subject_ids(ids)
    }

    /// Select which cages produce output.
    pub fn set_active_cages(&self, active: Vec<bool>) -> ResultsResult<()> {
        self.roster.write().set_active(active)
    }

    /// Whether `cage` produces output.
    pub fn is_active(&self, cage: usize) -> bool {
        self.roster.read().is_active(cage)
    }

    /// Set the debug flag of every cage.
    pub fn set_debug_flag(&self, flag: bool) {
        self.stacks.set_all_debug_flags(flag);
    }

    /// Set the debug flag of one cage.
    pub fn set_cage_debug_flag(&self, cage: usize, flag: bool) -> ResultsResult<()> {
        self.stacks.set_debug_flag(cage, flag)
    }

    /// Current debug flag of `cage`.
    pub fn debug_flag(&self, cage: usize) -> ResultsResult<bool> {
        self.stacks.debug_flag(cage)
    }

    /// Materialize the trace, subtract or xor sequence for every cage.
    pub fn enable_sequence(&self, kind: SequenceKind, backgrounds: &[Frame]) -> ResultsResult<()> {
        self.stacks.enable(kind, backgrounds)
    }

    /// Frames currently held in one of `cage`'s sequences.
    pub fn sequence_len(&self, cage: usize, kind: SequenceKind) -> ResultsResult<usize> {
        self.stacks.len(cage, kind)
    }

    /// Normalize and append one acquisition frame. `None` is ignored.
    pub fn append(&self, cage: usize, kind: SequenceKind, frame: Option<&RawFrame>) -> ResultsResult<()> {
        let frame = frame.map(Frame::from_raw);
        self.stacks.append(cage, kind, frame.as_ref())
    }

    /// Append an already 8-bit frame. `None` is ignored.
    pub fn append_frame(&self, cage: usize, kind: SequenceKind, frame: Option<&Frame>) -> ResultsResult<()> {
        self.stacks.append(cage, kind, frame)
    }

    /// Append to the debug sequence; a full capture is saved as
    /// `<name>_debug<label>.tif` in `scope`.
    pub fn append_debug(
        &self,
        cage: usize,
        frame: Option<&RawFrame>,
        label: &str,
        scope: &PathScope,
    ) -> ResultsResult<DebugAppend> {
        let roster = self.roster();
        let frame = frame.map(Frame::from_raw);
        self.stacks.append_debug(cage, frame.as_ref(), |frames| {
            self.write_debug(&roster, cage, frames, label, scope)
        })
    }

    /// Save and empty the cage's debug sequence; clears its debug flag.
    pub fn save_debug(&self, cage: usize, label: &str, scope: &PathScope) -> ResultsResult<usize> {
        let roster = self.roster();
        self.stacks.flush_debug(cage, |frames| {
            self.write_debug(&roster, cage, frames, label, scope)
        })
    }

    fn write_debug(
        &self,
        roster: &CageRoster,
        cage: usize,
        frames: &[Frame],
        label: &str,
        scope: &PathScope,
    ) -> ResultsResult<()> {
        if !roster.is_active(cage) {
            tracing::debug!(cage, "Skipping debug capture of inactive cage");
            return Ok(());
        }
        let id = roster.subject_id(cage)?;
        let path = self
            .resolver
            .cage_path(&ResultKind::Debug(label.to_string()), scope, cage, id);
        self.images.save(&path, frames)?;
        tracing::info!(path = ?path, frames = frames.len(), "Saved debug capture");
        Ok(())
    }

    /// Hourly fold: append the mean of the primary sequence to the mean
    /// sequence and empty the primary sequence.
    pub fn fold_mean(&self, cage: usize) -> ResultsResult<bool> {
        self.stacks.fold_mean(cage)
    }

    /// Persist one sequence kind for every active cage.
    ///
    /// For primary and trace sequences, `backgrounds` (one per cage) supplies a
    /// closing background frame that is written after the sequence's frames;
    /// the stored sequence itself is not modified. Empty or disabled sequences
    /// are skipped. Returns the files written.
    pub fn save_sequence(
        &self,
        kind: SequenceKind,
        scope: &PathScope,
        backgrounds: Option<&[Frame]>,
    ) -> ResultsResult<Vec<PathBuf>> {
        let result_kind = result_kind(kind)?;
        let roster = self.roster();
        if let Some(bgs) = backgrounds {
            roster.expect_per_cage("background frame", bgs.len())?;
        }

        let mut written = Vec::new();
        for (cage, id) in roster.active_subjects()? {
            let background = backgrounds.map(|bgs| &bgs[cage]);
            if let Some(path) = self.write_sequence(kind, &result_kind, scope, cage, id, background)? {
                written.push(path);
            }
        }
        Ok(written)
    }

    /// Persist one sequence kind for a single cage.
    ///
    /// Same rules as [`ResultSaver::save_sequence`]. Returns `None` when the cage
    /// is inactive or its sequence is empty or disabled.
    pub fn save_cage_sequence(
        &self,
        kind: SequenceKind,
        scope: &PathScope,
        cage: usize,
        background: Option<&Frame>,
    ) -> ResultsResult<Option<PathBuf>> {
        let result_kind = result_kind(kind)?;
        let roster = self.roster();
        roster.check_cage(cage)?;
        if !roster.is_active(cage) {
            tracing::debug!(sequence = %kind, cage, "Skipping sequence of inactive cage");
            return Ok(None);
        }
        let id = roster.subject_id(cage)?;
        self.write_sequence(kind, &result_kind, scope, cage, id, background)
    }

    fn write_sequence(
        &self,
        kind: SequenceKind,
        result_kind: &ResultKind,
        scope: &PathScope,
        cage: usize,
        id: &str,
        background: Option<&Frame>,
    ) -> ResultsResult<Option<PathBuf>> {
        let background = background.filter(|_| matches!(kind, SequenceKind::Primary | SequenceKind::Trace));
        let path = self.resolver.cage_path(result_kind, scope, cage, id);
        let saved = self.stacks.with_sequence(cage, kind, |frames| -> ResultsResult<bool> {
            if frames.is_empty() && background.is_none() {
                return Ok(false);
            }
            match background {
                Some(bg) => {
                    let mut snapshot = frames.to_vec();
                    snapshot.push(bg.clone());
                    self.images.save(&path, &snapshot)?;
                }
                None => self.images.save(&path, frames)?,
            }
            Ok(true)
        })?;

        match saved {
            Some(Ok(true)) => {
                tracing::info!(path = ?path, sequence = %kind, cage, "Saved sequence");
                Ok(Some(path))
            }
            Some(Ok(false)) => {
                tracing::debug!(sequence = %kind, cage, "Skipping empty sequence");
                Ok(None)
            }
            Some(Err(e)) => Err(e),
            None => {
                tracing::debug!(sequence = %kind, cage, "Skipping disabled sequence");
                Ok(None)
            }
        }
    }

    /// Render `table` and append it to its file in `scope`. Returns the file written.
    pub fn save_table(&self, scope: &PathScope, table: &ResultTable<'_>) -> ResultsResult<PathBuf> {
        self.write_table(&self.roster(), scope, table)
    }

    /// Split `queue` across the active cages, `per_row` items each in cage
    /// order, and append the respective table `name` in `scope`.
    ///
    /// Items are taken from the queue only for cages that produce a row. Once
    /// the queue runs dry, rows carry just the subject ID.
    pub fn save_respective(
        &self,
        scope: &PathScope,
        name: &str,
        header: Option<RespectiveHeader<'_>>,
        version: bool,
        queue: &mut RespectiveQueue,
        per_row: usize,
    ) -> ResultsResult<PathBuf> {
        let roster = self.roster();
        // Fail before anything is taken from the queue.
        roster.subject_ids()?;
        let rows = queue.rows_for(&roster, per_row);
        let table = ResultTable::Respective {
            name,
            rows: &rows,
            header,
            version,
        };
        self.write_table(&roster, scope, &table)
    }

    fn write_table(
        &self,
        roster: &CageRoster,
        scope: &PathScope,
        table: &ResultTable<'_>,
    ) -> ResultsResult<PathBuf> {
        let path = match table {
            ResultTable::Hourly { path, .. } => path.to_path_buf(),
            ResultTable::Total { .. } | ResultTable::SingleTotal { .. } => {
                self.resolver.path(&ResultKind::TotalResult, scope)
            }
            ResultTable::Bin { name, .. } | ResultTable::Respective { name, .. } => self
                .resolver
                .path(&ResultKind::BinResult((*name).to_string()), scope),
        };

        let provenance = if table.wants_provenance() {
            self.provenance.lines(self.roi_decoder.as_ref())
        } else {
            Vec::new()
        };

        let ctx = TableContext {
            roster,
            area: scope.area,
            version: &self.version,
            total_header: &self.total_header,
            bin_count: self.bin_count,
            provenance: &provenance,
        };
        let lines = table.render(&ctx)?;

        for line in &lines {
            self.records.write_line(&path, line, true)?;
        }

        tracing::info!(
            path = ?path,
            table = table.kind_name(),
            lines = lines.len(),
            scope = %scope,
            "Wrote result table"
        );
        Ok(path)
    }

    /// Overwrite a cage's XY data file with the XY header followed by `lines`.
    ///
    /// Returns `None` for an inactive cage.
    pub fn save_xy(&self, cage: usize, scope: &PathScope, lines: &[String]) -> ResultsResult<Option<PathBuf>> {
        let roster = self.roster();
        roster.check_cage(cage)?;
        if !roster.is_active(cage) {
            tracing::debug!(cage, "Skipping XY data of inactive cage");
            return Ok(None);
        }
        let id = roster.subject_id(cage)?;
        let path = self.resolver.cage_path(&ResultKind::Xy, scope, cage, id);

        self.records.write_line(&path, &self.xy_header, false)?;
        for line in lines {
            self.records.write_line(&path, line, true)?;
        }
        tracing::info!(path = ?path, lines = lines.len(), "Saved XY data");
        Ok(Some(path))
    }

    /// Append the current date and time to the total-result file and/or the
    /// named bin-result files.
    pub fn stamp_date(&self, scope: &PathScope, total: bool, bin_files: &[&str]) -> ResultsResult<()> {
        if total {
            let path = self.resolver.path(&ResultKind::TotalResult, scope);
            self.records.append_timestamp(&path)?;
        }
        for name in bin_files {
            let path = self
                .resolver
                .path(&ResultKind::BinResult((*name).to_string()), scope);
            self.records.append_timestamp(&path)?;
        }
        Ok(())
    }

    /// Append `"<start> - <now>"` to the total-result file.
    pub fn stamp_session_span(&self, scope: &PathScope, start: &str) -> ResultsResult<()> {
        let now = chrono::Local::now().format(crate::writer::TIMESTAMP_FORMAT);
        let path = self.resolver.path(&ResultKind::TotalResult, scope);
        self.records.append_text(&path, &format!("{start} - {now}"))
    }
}
