//! Per-cage image sequences.
//!
//! Each cage owns six append-only frame sequences:
//!
//! | Sequence | Created | Fed by |
//! |---|---|---|
//! | primary  | at construction | [`StackStore::append`] |
//! | mean     | at construction | [`StackStore::fold_mean`] |
//! | debug    | at construction | [`StackStore::append_debug`] |
//! | trace, subtract, xor | [`StackStore::enable`] | [`StackStore::append`] |
//!
//! A cage's sequences live behind their own mutex, so acquisition threads
//! working on different cages never contend. Sequences start empty: the
//! background frame handed to the constructor only fixes the cage's frame
//! geometry.
//!
//! # Debug capture
//!
//! The debug sequence keeps a short look-back window around anomalies. While
//! the cage's debug flag is clear, it holds at most [`DEBUG_WINDOW`] frames and
//! drops the oldest on each append. Once the flag is set, frames accumulate;
//! when the sequence reaches [`DEBUG_FLUSH_AT`] frames it is flushed, emptied,
//! and the flag is cleared again.

use crate::error::{ResultsError, ResultsResult};
use crate::frame::{mean_projection, Frame};
use parking_lot::Mutex;
use std::fmt;

/// Frames kept in the debug sequence while the debug flag is clear.
pub const DEBUG_WINDOW: usize = 5;

/// Debug sequence size that triggers an automatic flush.
pub const DEBUG_FLUSH_AT: usize = 10;

/// The per-cage frame sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceKind {
    /// Raw acquisition frames
    Primary,
    /// Hourly mean projections
    Mean,
    /// Look-back capture around anomalies
    Debug,
    /// Trace frames
    Trace,
    /// Background-subtracted frames
    Subtract,
    /// XOR frames
    Xor,
}

impl SequenceKind {
    /// Sequences that only exist after [`StackStore::enable`].
    pub fn is_optional(self) -> bool {
        matches!(
            self,
            SequenceKind::Trace | SequenceKind::Subtract | SequenceKind::Xor
        )
    }
}

impl fmt::Display for SequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SequenceKind::Primary => "primary",
            SequenceKind::Mean => "mean",
            SequenceKind::Debug => "debug",
            SequenceKind::Trace => "trace",
            SequenceKind::Subtract => "subtract",
            SequenceKind::Xor => "xor",
        };
        f.write_str(name)
    }
}

/// Result of [`StackStore::append_debug`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAppend {
    /// No frame was supplied.
    Skipped,
    /// The frame was appended.
    Appended {
        /// New sequence size
        len: usize,
    },
    /// The append reached the flush threshold; `frames` were handed to the
    /// flush callback and the sequence is now empty.
    Flushed {
        /// Frames handed to the flush callback
        frames: usize,
    },
}

#[derive(Debug)]
struct CageStacks {
    width: u32,
    height: u32,
    primary: Vec<Frame>,
    mean: Vec<Frame>,
    debug: Vec<Frame>,
    trace: Option<Vec<Frame>>,
    subtract: Option<Vec<Frame>>,
    xor: Option<Vec<Frame>>,
    debug_flag: bool,
}

impl CageStacks {
    fn new(background: &Frame) -> Self {
        Self {
            width: background.width(),
            height: background.height(),
            primary: Vec::new(),
            mean: Vec::new(),
            debug: Vec::new(),
            trace: None,
            subtract: None,
            xor: None,
            debug_flag: false,
        }
    }

    fn sequence(&self, kind: SequenceKind) -> Option<&Vec<Frame>> {
        match kind {
            SequenceKind::Primary => Some(&self.primary),
            SequenceKind::Mean => Some(&self.mean),
            SequenceKind::Debug => Some(&self.debug),
            SequenceKind::Trace => self.trace.as_ref(),
            SequenceKind::Subtract => self.subtract.as_ref(),
            SequenceKind::Xor => self.xor.as_ref(),
        }
    }

    fn sequence_mut(&mut self, kind: SequenceKind) -> Option<&mut Vec<Frame>> {
        match kind {
            SequenceKind::Primary => Some(&mut self.primary),
            SequenceKind::Mean => Some(&mut self.mean),
            SequenceKind::Debug => Some(&mut self.debug),
            SequenceKind::Trace => self.trace.as_mut(),
            SequenceKind::Subtract => self.subtract.as_mut(),
            SequenceKind::Xor => self.xor.as_mut(),
        }
    }

    /// Frames must match the geometry fixed by the cage's background.
    fn check_geometry(&self, cage: usize, frame: &Frame) -> ResultsResult<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(ResultsError::Configuration(format!(
                "Cage {cage} frame is {}x{}, expected {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    fn slot_mut(&mut self, kind: SequenceKind) -> Option<&mut Option<Vec<Frame>>> {
        match kind {
            SequenceKind::Trace => Some(&mut self.trace),
            SequenceKind::Subtract => Some(&mut self.subtract),
            SequenceKind::Xor => Some(&mut self.xor),
            _ => None,
        }
    }
}

/// Owns every cage's frame sequences.
#[derive(Debug)]
pub struct StackStore {
    cages: Vec<Mutex<CageStacks>>,
}

impl StackStore {
    /// Create empty sequences for `cage_count` cages from their background frames.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `backgrounds.len() != cage_count`.
    pub fn new(cage_count: usize, backgrounds: &[Frame]) -> ResultsResult<Self> {
        if backgrounds.len() != cage_count {
            return Err(ResultsError::cardinality(
                "background frame",
                cage_count,
                backgrounds.len(),
            ));
        }
        let cages = backgrounds
            .iter()
            .map(|bg| Mutex::new(CageStacks::new(bg)))
            .collect();
        Ok(Self { cages })
    }

    /// Number of cages.
    pub fn cage_count(&self) -> usize {
        self.cages.len()
    }

    fn cage(&self, cage: usize) -> ResultsResult<&Mutex<CageStacks>> {
        self.cages.get(cage).ok_or(ResultsError::CageOutOfRange {
            cage,
            cage_count: self.cages.len(),
        })
    }

    /// Materialize an optional sequence (trace, subtract or xor) as empty for every cage.
    ///
    /// Enabling an already-enabled sequence discards its frames. Each background
    /// must have its cage's geometry.
    pub fn enable(&self, kind: SequenceKind, backgrounds: &[Frame]) -> ResultsResult<()> {
        if !kind.is_optional() {
            return Err(ResultsError::Configuration(format!(
                "{kind} sequence is always enabled"
            )));
        }
        if backgrounds.len() != self.cages.len() {
            return Err(ResultsError::cardinality(
                "background frame",
                self.cages.len(),
                backgrounds.len(),
            ));
        }
        for (cage, (stacks, bg)) in self.cages.iter().zip(backgrounds).enumerate() {
            stacks.lock().check_geometry(cage, bg)?;
        }
        for stacks in &self.cages {
            let mut stacks = stacks.lock();
            if let Some(slot) = stacks.slot_mut(kind) {
                *slot = Some(Vec::new());
            }
        }
        tracing::debug!(sequence = %kind, cages = self.cages.len(), "Enabled sequence");
        Ok(())
    }

    /// Whether `kind` exists for `cage`.
    pub fn is_enabled(&self, cage: usize, kind: SequenceKind) -> ResultsResult<bool> {
        Ok(self.cage(cage)?.lock().sequence(kind).is_some())
    }

    /// Append one frame to the primary, trace, subtract or xor sequence.
    ///
    /// `None` is a dropped acquisition frame and is ignored. A frame whose size
    /// differs from the cage's background is rejected.
    pub fn append(&self, cage: usize, kind: SequenceKind, frame: Option<&Frame>) -> ResultsResult<()> {
        if matches!(kind, SequenceKind::Mean | SequenceKind::Debug) {
            return Err(ResultsError::Configuration(format!(
                "{kind} sequence cannot be appended to directly"
            )));
        }
        let stacks = self.cage(cage)?;
        let Some(frame) = frame else {
            return Ok(());
        };

        let mut stacks = stacks.lock();
        stacks.check_geometry(cage, frame)?;
        let sequence = stacks.sequence_mut(kind).ok_or_else(|| {
            ResultsError::Configuration(format!("{kind} sequence is not enabled"))
        })?;
        sequence.push(frame.clone());
        Ok(())
    }

    /// Append one frame to the debug sequence under the bounded-buffer policy.
    ///
    /// `flush` receives the full sequence when it reaches [`DEBUG_FLUSH_AT`]
    /// frames. On success the sequence is emptied and the debug flag cleared;
    /// if `flush` fails the frames and flag are kept and the error returned.
    pub fn append_debug<F>(
        &self,
        cage: usize,
        frame: Option<&Frame>,
        flush: F,
    ) -> ResultsResult<DebugAppend>
    where
        F: FnOnce(&[Frame]) -> ResultsResult<()>,
    {
        let stacks = self.cage(cage)?;
        let Some(frame) = frame else {
            return Ok(DebugAppend::Skipped);
        };

        let mut stacks = stacks.lock();
        stacks.check_geometry(cage, frame)?;
        if !stacks.debug_flag && stacks.debug.len() >= DEBUG_WINDOW {
            stacks.debug.remove(0);
        }
        stacks.debug.push(frame.clone());

        if stacks.debug.len() >= DEBUG_FLUSH_AT {
            flush(&stacks.debug)?;
            let frames = stacks.debug.len();
            stacks.debug.clear();
            stacks.debug_flag = false;
            tracing::info!(cage, frames, "Flushed debug capture");
            return Ok(DebugAppend::Flushed { frames });
        }

        Ok(DebugAppend::Appended {
            len: stacks.debug.len(),
        })
    }

    /// Hand the debug sequence to `flush`, then empty it and clear the debug flag.
    ///
    /// An empty sequence is not flushed. Returns the number of frames flushed.
    pub fn flush_debug<F>(&self, cage: usize, flush: F) -> ResultsResult<usize>
    where
        F: FnOnce(&[Frame]) -> ResultsResult<()>,
    {
        let mut stacks = self.cage(cage)?.lock();
        let frames = stacks.debug.len();
        if frames > 0 {
            flush(&stacks.debug)?;
            stacks.debug.clear();
        }
        stacks.debug_flag = false;
        Ok(frames)
    }

    /// Set the debug flag of one cage.
    pub fn set_debug_flag(&self, cage: usize, flag: bool) -> ResultsResult<()> {
        self.cage(cage)?.lock().debug_flag = flag;
        Ok(())
    }

    /// Set the debug flag of every cage.
    pub fn set_all_debug_flags(&self, flag: bool) {
        for stacks in &self.cages {
            stacks.lock().debug_flag = flag;
        }
    }

    /// Current debug flag of `cage`.
    pub fn debug_flag(&self, cage: usize) -> ResultsResult<bool> {
        Ok(self.cage(cage)?.lock().debug_flag)
    }

    /// Fold the primary sequence into one mean frame appended to the mean
    /// sequence, then empty the primary sequence.
    ///
    /// Returns `false` without touching anything when the primary sequence is empty.
    pub fn fold_mean(&self, cage: usize) -> ResultsResult<bool> {
        let mut stacks = self.cage(cage)?.lock();
        if stacks.primary.is_empty() {
            tracing::debug!(cage, "No primary frames to fold");
            return Ok(false);
        }
        let mean = mean_projection(&stacks.primary)?;
        stacks.mean.push(mean);
        stacks.primary.clear();
        Ok(true)
    }

    /// Number of frames in a sequence; 0 for a sequence that is not enabled.
    pub fn len(&self, cage: usize, kind: SequenceKind) -> ResultsResult<usize> {
        Ok(self.cage(cage)?.lock().sequence(kind).map_or(0, Vec::len))
    }

    /// Frame geometry recorded from the cage's background.
    pub fn dimensions(&self, cage: usize) -> ResultsResult<(u32, u32)> {
        let stacks = self.cage(cage)?.lock();
        Ok((stacks.width, stacks.height))
    }

    /// Run `f` over a sequence while holding the cage's lock.
    ///
    /// Returns `None` if the sequence is not enabled.
    pub fn with_sequence<R>(
        &self,
        cage: usize,
        kind: SequenceKind,
        f: impl FnOnce(&[Frame]) -> R,
    ) -> ResultsResult<Option<R>> {
        let stacks = self.cage(cage)?.lock();
        Ok(stacks.sequence(kind).map(|frames| f(frames)))
    }
}
