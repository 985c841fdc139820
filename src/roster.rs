//! Cage roster: cage count, active-cage set and subject IDs.
//!
//! The active set only governs output. Sequence state is kept for every cage
//! whether it is active or not; every table row and every per-cage file write
//! consults the roster and skips inactive cages entirely (no empty rows).

use crate::error::{ResultsError, ResultsResult};

/// Per-cage identity and output selection.
#[derive(Debug, Clone)]
pub struct CageRoster {
    cage_count: usize,
    active: Vec<bool>,
    subject_ids: Option<Vec<String>>,
}

impl CageRoster {
    /// All cages start active, with no subject IDs assigned.
    pub fn new(cage_count: usize) -> Self {
        Self {
            cage_count,
            active: vec![true; cage_count],
            subject_ids: None,
        }
    }

    /// Number of cages.
    pub fn cage_count(&self) -> usize {
        self.cage_count
    }

    /// Assign subject IDs; the list must have one entry per cage.
    pub fn set_subject_ids(&mut self, ids: Vec<String>) -> ResultsResult<()> {
        if ids.len() != self.cage_count {
            return Err(ResultsError::cardinality("subject ID", self.cage_count, ids.len()));
        }
        self.subject_ids = Some(ids);
        Ok(())
    }

    /// Replace the active set; the mask must have one entry per cage.
    pub fn set_active(&mut self, active: Vec<bool>) -> ResultsResult<()> {
        if active.len() != self.cage_count {
            return Err(ResultsError::cardinality("active cage", self.cage_count, active.len()));
        }
        self.active = active;
        Ok(())
    }

    /// Whether `cage` produces output. Out-of-range cages are inactive.
    pub fn is_active(&self, cage: usize) -> bool {
        self.active.get(cage).copied().unwrap_or(false)
    }

    /// Number of active cages.
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Reject a cage index outside `0..cage_count`.
    pub fn check_cage(&self, cage: usize) -> ResultsResult<()> {
        if cage >= self.cage_count {
            return Err(ResultsError::CageOutOfRange {
                cage,
                cage_count: self.cage_count,
            });
        }
        Ok(())
    }

    /// Subject IDs, or a configuration error if they were never set.
    pub fn subject_ids(&self) -> ResultsResult<&[String]> {
        self.subject_ids.as_deref().ok_or_else(|| {
            ResultsError::Configuration("subject IDs must be set before saving".to_string())
        })
    }

    /// Subject ID of `cage`. Fails when IDs are unset or `cage` is out of range.
    pub fn subject_id(&self, cage: usize) -> ResultsResult<&str> {
        self.check_cage(cage)?;
        Ok(&self.subject_ids()?[cage])
    }

    /// `(cage, subject id)` for every active cage, in cage order.
    pub fn active_subjects(&self) -> ResultsResult<Vec<(usize, &str)>> {
        let ids = self.subject_ids()?;
        Ok(ids
            .iter()
            .enumerate()
            .filter(|(cage, _)| self.active[*cage])
            .map(|(cage, id)| (cage, id.as_str()))
            .collect())
    }

    /// Fail unless `len` equals the cage count.
    pub fn expect_per_cage(&self, what: &str, len: usize) -> ResultsResult<()> {
        if len != self.cage_count {
            return Err(ResultsError::cardinality(what, self.cage_count, len));
        }
        Ok(())
    }
}
