//! # Cage Results
//!
//! Persistence core for multi-cage behavioral experiments. Acquisition code pushes
//! per-cage image frames and numeric results in throughout a long run; at
//! checkpoints (hourly, end of block, end of session) this crate folds and
//! saves image sequences and writes tab-separated result tables.
//!
//! ## Crate Structure
//!
//! - **`saver`**: `ResultSaver`, the facade acquisition code talks to.
//! - **`stack_store`**: per-cage frame sequences behind per-cage locks, including the
//!   bounded debug capture buffer and the hourly mean fold.
//! - **`table`**: pure builders for hourly, total, bin and respective result tables.
//! - **`provenance`**: the `##` parameter and ROI block at the top of total-result files.
//! - **`roster`**: cage count, active cages and subject IDs.
//! - **`paths`**: output areas, session scoping and the on-disk directory layout.
//! - **`writer`** / **`image_saver`**: text line writer and atomic multi-page TIFF saver.
//! - **`frame`**, **`roi`**, **`stamp`**: frame normalization and mean projection,
//!   ImageJ ROI bounds, 12-hour start stamps.
//! - **`config`** / **`logging`** / **`error`**: configuration, tracing setup and
//!   the `ResultsError` type.
//!
//! The crate is write-only: nothing here reads results back.

pub mod config;
pub mod error;
pub mod frame;
pub mod image_saver;
pub mod logging;
pub mod paths;
pub mod provenance;
pub mod roi;
pub mod roster;
pub mod saver;
pub mod stack_store;
pub mod stamp;
pub mod table;
pub mod writer;

pub use error::{ResultsError, ResultsResult};
pub use frame::{Frame, RawFrame};
pub use paths::{OutputArea, PathScope, ResultKind};
pub use saver::{ResultSaver, ResultSaverBuilder};
pub use stack_store::{DebugAppend, SequenceKind};
pub use table::{Preamble, RespectiveHeader, RespectiveQueue, ResultTable};
