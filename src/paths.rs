//! Output path resolution.
//!
//! Every save operation is parameterized by a [`PathScope`]: which output area
//! (the live-run area or the archival area) and, optionally, a session
//! subdirectory. A [`PathResolver`] maps a [`ResultKind`] plus scope to a
//! concrete location. [`DirectoryLayout`] is the on-disk layout used by the
//! acquisition software:
//!
//! ```text
//! <area root>/
//!   Images/[<session>/]<name>.tif, <name>_mean.tif, <name>_debug<label>.tif, ...
//!   Traces/[<session>/]<name>.tif
//!   XY_Data/[<session>/]<name>.txt
//!   Results/[<session>/]TotalResult.txt, <bin file>.txt
//! ```

use crate::config::{FileNaming, PathsConfig};
use std::fmt;
use std::path::{Path, PathBuf};

/// Which output area a save targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputArea {
    /// Output of the live run ("online")
    Live,
    /// Separate archival area for post-hoc analysis ("offline")
    Archive,
}

impl OutputArea {
    /// Tag used in version marker lines.
    pub fn label(self) -> &'static str {
        match self {
            OutputArea::Live => "Online",
            OutputArea::Archive => "Offline",
        }
    }
}

/// Output area plus optional session subdirectory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathScope {
    /// Output area
    pub area: OutputArea,
    /// Session subdirectory, if any
    pub session: Option<String>,
}

impl PathScope {
    /// The live-run area without a session.
    pub fn live() -> Self {
        Self {
            area: OutputArea::Live,
            session: None,
        }
    }

    /// The archive area without a session.
    pub fn archive() -> Self {
        Self {
            area: OutputArea::Archive,
            session: None,
        }
    }

    /// Nest output under a session subdirectory.
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }
}

impl fmt::Display for PathScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session {
            Some(session) => write!(f, "{}/{}", self.area.label(), session),
            None => f.write_str(self.area.label()),
        }
    }
}

/// Logical kind of a result file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResultKind {
    /// Primary image sequence
    Image,
    /// Trace sequence
    Trace,
    /// Hourly mean projections
    Mean,
    /// Debug capture; the label is appended to the file name.
    Debug(String),
    /// Background-subtracted frames
    Subtract,
    /// XOR frames
    Xor,
    /// Per-cage XY coordinate data
    Xy,
    /// Shared total-result file
    TotalResult,
    /// Named bin or respective result file.
    BinResult(String),
}

/// Maps result kinds to file locations.
///
/// Resolvers are read-only and shared between threads.
pub trait PathResolver: Send + Sync {
    /// Directory holding files of `kind` in `scope`.
    fn dir(&self, kind: &ResultKind, scope: &PathScope) -> PathBuf;

    /// File for one cage.
    fn cage_path(&self, kind: &ResultKind, scope: &PathScope, cage: usize, subject_id: &str)
        -> PathBuf;

    /// File shared by all cages (total and bin results).
    fn path(&self, kind: &ResultKind, scope: &PathScope) -> PathBuf;
}

/// Directory-tree layout rooted at the two configured output areas.
#[derive(Debug, Clone)]
pub struct DirectoryLayout {
    live_root: PathBuf,
    archive_root: PathBuf,
    naming: FileNaming,
}

impl DirectoryLayout {
    /// Layout with subject-ID naming.
    pub fn new(live_root: impl Into<PathBuf>, archive_root: impl Into<PathBuf>) -> Self {
        Self {
            live_root: live_root.into(),
            archive_root: archive_root.into(),
            naming: FileNaming::SubjectId,
        }
    }

    /// Layout from the `[paths]` section.
    pub fn from_config(paths: &PathsConfig) -> Self {
        Self {
            live_root: paths.live_root.clone(),
            archive_root: paths.archive_root.clone(),
            naming: paths.naming,
        }
    }

    /// Override per-cage file naming.
    pub fn with_naming(mut self, naming: FileNaming) -> Self {
        self.naming = naming;
        self
    }

    fn root(&self, area: OutputArea) -> &Path {
        match area {
            OutputArea::Live => &self.live_root,
            OutputArea::Archive => &self.archive_root,
        }
    }

    fn base_name(&self, scope: &PathScope, cage: usize, subject_id: &str) -> String {
        // Session directories are always keyed by subject.
        match (self.naming, &scope.session) {
            (FileNaming::CageIndex, None) => format!("cage{:02}", cage + 1),
            _ => subject_id.to_string(),
        }
    }
}

impl PathResolver for DirectoryLayout {
    fn dir(&self, kind: &ResultKind, scope: &PathScope) -> PathBuf {
        let sub = match kind {
            ResultKind::Image
            | ResultKind::Mean
            | ResultKind::Debug(_)
            | ResultKind::Subtract
            | ResultKind::Xor => "Images",
            ResultKind::Trace => "Traces",
            ResultKind::Xy => "XY_Data",
            ResultKind::TotalResult | ResultKind::BinResult(_) => "Results",
        };
        let mut dir = self.root(scope.area).join(sub);
        if let Some(session) = &scope.session {
            dir.push(session);
        }
        dir
    }

    fn cage_path(
        &self,
        kind: &ResultKind,
        scope: &PathScope,
        cage: usize,
        subject_id: &str,
    ) -> PathBuf {
        let name = self.base_name(scope, cage, subject_id);
        let file = match kind {
            ResultKind::Image | ResultKind::Trace => format!("{name}.tif"),
            ResultKind::Mean => format!("{name}_mean.tif"),
            ResultKind::Debug(label) => format!("{name}_debug{label}.tif"),
            ResultKind::Subtract => format!("{name}_subtract.tif"),
            ResultKind::Xor => format!("{name}_xor.tif"),
            ResultKind::Xy => format!("{name}.txt"),
            ResultKind::TotalResult | ResultKind::BinResult(_) => {
                return self.path(kind, scope);
            }
        };
        self.dir(kind, scope).join(file)
    }

    fn path(&self, kind: &ResultKind, scope: &PathScope) -> PathBuf {
        let dir = self.dir(kind, scope);
        match kind {
            ResultKind::TotalResult => dir.join("TotalResult.txt"),
            ResultKind::BinResult(name) => dir.join(format!("{name}.txt")),
            _ => dir,
        }
    }
}
