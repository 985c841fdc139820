//! End-to-end tests for the result saver against a temporary output tree.

use cage_results::config::{ExperimentConfig, Program};
use cage_results::frame::Frame;
use cage_results::paths::PathScope;
use cage_results::provenance::ROI_MARKER;
use cage_results::saver::{ResultSaver, ResultSaverBuilder};
use cage_results::stack_store::{DebugAppend, SequenceKind};
use cage_results::stamp::CaptureStamp;
use cage_results::table::{Preamble, RespectiveHeader, RespectiveQueue, ResultTable};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SUBJECTS: [&str; 4] = ["M1", "M2", "M3", "M4"];

fn roi_bytes(left: i16, top: i16, right: i16, bottom: i16) -> Vec<u8> {
    let mut bytes = vec![0u8; 64];
    bytes[0..4].copy_from_slice(b"Iout");
    bytes[8..10].copy_from_slice(&top.to_be_bytes());
    bytes[10..12].copy_from_slice(&left.to_be_bytes());
    bytes[12..14].copy_from_slice(&bottom.to_be_bytes());
    bytes[14..16].copy_from_slice(&right.to_be_bytes());
    bytes
}

fn config_in(dir: &Path, program: Program) -> ExperimentConfig {
    let mut config = ExperimentConfig::default();
    config.experiment.program = program;
    config.experiment.duration = 100;
    config.experiment.bin_duration = 30;
    config.paths.live_root = dir.join("live");
    config.paths.archive_root = dir.join("archive");
    config.paths.preference_dir = dir.join("prefs");
    config.paths.parameter_file = dir.join("prefs").join("parameters.txt");
    config
}

fn setup(program: Program) -> (TempDir, ResultSaver) {
    let dir = TempDir::new().unwrap();
    let prefs = dir.path().join("prefs");
    fs::create_dir_all(&prefs).unwrap();
    fs::write(prefs.join("parameters.txt"), "duration=100\nbinDuration=30\n").unwrap();
    fs::write(prefs.join("Arena.roi"), roi_bytes(10, 12, 210, 192)).unwrap();
    fs::write(prefs.join("ArenaOuter.roi"), roi_bytes(0, 0, 220, 200)).unwrap();

    let config = config_in(dir.path(), program);
    let backgrounds = vec![Frame::filled(4, 3, 0); config.experiment.cage_count];
    let saver = ResultSaverBuilder::new(&config).build(&backgrounds).unwrap();
    saver
        .set_subject_ids(SUBJECTS.iter().map(|s| s.to_string()).collect())
        .unwrap();
    (dir, saver)
}

fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn page_count(path: &Path) -> usize {
    let file = fs::File::open(path).unwrap();
    let mut decoder = tiff::decoder::Decoder::new(std::io::BufReader::new(file)).unwrap();
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image().unwrap();
        pages += 1;
    }
    pages
}

fn string_rows(n: usize) -> Vec<Vec<String>> {
    (0..n)
        .map(|cage| vec![format!("{}", cage * 10), format!("{}", cage * 10 + 1)])
        .collect()
}

#[test]
fn test_total_result_with_provenance() {
    let (dir, saver) = setup(Program::Ym);
    saver
        .set_active_cages(vec![true, false, true, true])
        .unwrap();

    let stamp = CaptureStamp {
        year: 2024,
        month: 3,
        day: 7,
        hour12: 12,
        minute: 5,
        second: 9,
        pm: false,
    };
    let rows = string_rows(4);
    let stamps = [stamp; 4];
    let path = saver
        .save_table(
            &PathScope::live(),
            &ResultTable::Total {
                rows: &rows,
                stamps: &stamps,
                preamble: Preamble::full(),
            },
        )
        .unwrap();

    assert_eq!(path, dir.path().join("live/Results/TotalResult.txt"));
    let lines = read_lines(&path);
    assert_eq!(
        lines[0],
        "ID\tDistance\tExperimentDate(MMDDYY)\tExperimentTime(HH:MM:SS)"
    );
    assert!(lines[1].starts_with("#Online, "));
    assert_eq!(lines[2], "##duration=100");
    assert_eq!(lines[3], "##binDuration=30");
    assert_eq!(lines[4], ROI_MARKER);
    assert_eq!(lines[5], "##Arena.roi=10\t12\t200\t180");
    assert_eq!(
        &lines[6..],
        &[
            "M1\t0\t1\t030724\t00:05:09".to_string(),
            "M3\t20\t21\t030724\t00:05:09".to_string(),
            "M4\t30\t31\t030724\t00:05:09".to_string(),
        ]
    );
}

#[test]
fn test_outer_roi_listed_for_home_cage_program() {
    let (_dir, saver) = setup(Program::Hc1);
    let path = saver
        .save_table(
            &PathScope::live(),
            &ResultTable::SingleTotal {
                row: &["5".to_string()],
                preamble: Preamble::full(),
            },
        )
        .unwrap();

    let lines = read_lines(&path);
    assert!(lines.contains(&"##ArenaOuter.roi=0\t0\t220\t200".to_string()));
    assert_eq!(lines.last().unwrap(), "M1\t5");
}

#[test]
fn test_rows_only_for_active_cages() {
    let (_dir, saver) = setup(Program::Of);
    saver
        .set_active_cages(vec![false, true, false, true])
        .unwrap();

    let rows = string_rows(4);
    let path = saver
        .save_table(
            &PathScope::live(),
            &ResultTable::Bin {
                name: "Distance",
                rows: &rows,
                header: false,
                bin_labels: true,
                version: false,
            },
        )
        .unwrap();

    let lines = read_lines(&path);
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("M2\t"));
    assert!(lines[1].starts_with("M4\t"));
}

#[test]
fn test_bin_header_uses_ceiling_bin_count() {
    let (dir, saver) = setup(Program::Of);
    let rows = string_rows(4);
    saver
        .save_table(
            &PathScope::archive(),
            &ResultTable::Bin {
                name: "Distance",
                rows: &rows,
                header: true,
                bin_labels: true,
                version: true,
            },
        )
        .unwrap();

    let lines = read_lines(&dir.path().join("archive/Results/Distance.txt"));
    assert_eq!(lines[0], "ID\tbin1\tbin2\tbin3\tbin4");
    assert!(lines[1].starts_with("#Offline, "));
    assert_eq!(lines.len(), 2 + 4);
}

#[test]
fn test_tables_append_across_saves() {
    let (_dir, saver) = setup(Program::Of);
    let rows = string_rows(4);
    let table = ResultTable::Bin {
        name: "Distance",
        rows: &rows,
        header: false,
        bin_labels: false,
        version: false,
    };
    saver.save_table(&PathScope::live(), &table).unwrap();
    let path = saver.save_table(&PathScope::live(), &table).unwrap();
    assert_eq!(read_lines(&path).len(), 8);
}

#[test]
fn test_row_count_mismatch_writes_nothing() {
    let (dir, saver) = setup(Program::Of);
    let rows = string_rows(3);
    let err = saver
        .save_table(
            &PathScope::live(),
            &ResultTable::Bin {
                name: "Distance",
                rows: &rows,
                header: true,
                bin_labels: true,
                version: false,
            },
        )
        .unwrap_err();

    assert!(err.is_configuration());
    assert!(!dir.path().join("live/Results/Distance.txt").exists());
}

#[test]
fn test_hourly_result_goes_to_given_path() {
    let (dir, saver) = setup(Program::Hc1);
    let target = dir.path().join("hourly").join("Hour01.txt");
    let rows: Vec<Vec<f64>> = (0..4).map(|c| vec![c as f64, 0.5]).collect();

    saver
        .save_table(
            &PathScope::live(),
            &ResultTable::Hourly {
                path: &target,
                rows: &rows,
            },
        )
        .unwrap();

    assert_eq!(
        read_lines(&target),
        vec!["M1\t0.0\t0.5", "M2\t1.0\t0.5", "M3\t2.0\t0.5", "M4\t3.0\t0.5"]
    );
}

#[test]
fn test_respective_rows_drain_queue_per_active_cage() {
    let (dir, saver) = setup(Program::Bt);
    saver
        .set_active_cages(vec![true, false, true, false])
        .unwrap();
    let scope = PathScope::live().with_session("day1");
    let header = Some(RespectiveHeader {
        label: "Trial",
        count: 3,
    });

    let mut queue = RespectiveQueue::new((1..=6).map(|i| format!("t{i}")));
    saver
        .save_respective(&scope, "Latency", header, false, &mut queue, 3)
        .unwrap();
    assert!(queue.is_empty());

    let path = saver
        .save_respective(&scope, "Latency", None, false, &mut queue, 3)
        .unwrap();

    assert_eq!(path, dir.path().join("live/Results/day1/Latency.txt"));
    assert_eq!(
        read_lines(&path),
        vec![
            "TrialName\tTrial1\tTrial2\tTrial3",
            "M1\tt1\tt2\tt3",
            "M3\tt4\tt5\tt6",
            "M1",
            "M3",
        ]
    );
}

#[test]
fn test_respective_without_subject_ids_keeps_queue() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), Program::Bt);
    let backgrounds = vec![Frame::filled(4, 3, 0); 4];
    let saver = ResultSaverBuilder::new(&config).build(&backgrounds).unwrap();

    let mut queue = RespectiveQueue::new(["a".to_string(), "b".to_string()]);
    assert!(saver
        .save_respective(&PathScope::live(), "Latency", None, false, &mut queue, 1)
        .is_err());
    assert_eq!(queue.len(), 2);
}

#[test]
fn test_single_cage_sequence_save() {
    let (dir, saver) = setup(Program::Hc1);
    for cage in 0..4 {
        saver
            .append_frame(cage, SequenceKind::Primary, Some(&Frame::filled(4, 3, 1)))
            .unwrap();
    }

    let background = Frame::filled(4, 3, 99);
    let path = saver
        .save_cage_sequence(SequenceKind::Primary, &PathScope::live(), 2, Some(&background))
        .unwrap();

    let expected = dir.path().join("live/Images/M3.tif");
    assert_eq!(path, Some(expected.clone()));
    assert_eq!(page_count(&expected), 2);
    let images: Vec<_> = fs::read_dir(dir.path().join("live/Images"))
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(images, vec![std::ffi::OsString::from("M3.tif")]);

    assert!(saver
        .save_cage_sequence(SequenceKind::Primary, &PathScope::live(), 4, None)
        .is_err());
    saver
        .set_active_cages(vec![true, true, false, true])
        .unwrap();
    assert_eq!(
        saver
            .save_cage_sequence(SequenceKind::Primary, &PathScope::live(), 2, None)
            .unwrap(),
        None
    );
}

#[test]
fn test_wrong_frame_size_is_rejected_and_hourly_fold_continues() {
    let (_dir, saver) = setup(Program::Hc1);
    saver
        .append_frame(0, SequenceKind::Primary, Some(&Frame::filled(4, 3, 10)))
        .unwrap();
    let err = saver
        .append_frame(0, SequenceKind::Primary, Some(&Frame::filled(8, 8, 10)))
        .unwrap_err();
    assert!(err.is_configuration());

    assert!(saver.fold_mean(0).unwrap());
    assert_eq!(saver.sequence_len(0, SequenceKind::Primary).unwrap(), 0);
    assert_eq!(saver.sequence_len(0, SequenceKind::Mean).unwrap(), 1);
}

#[test]
fn test_mean_fold_and_save() {
    let (dir, saver) = setup(Program::Hc1);
    saver
        .append_frame(0, SequenceKind::Primary, Some(&Frame::filled(4, 3, 10)))
        .unwrap();
    saver
        .append_frame(0, SequenceKind::Primary, Some(&Frame::filled(4, 3, 21)))
        .unwrap();

    assert!(saver.fold_mean(0).unwrap());
    assert!(!saver.fold_mean(1).unwrap());
    assert_eq!(saver.sequence_len(0, SequenceKind::Primary).unwrap(), 0);
    assert_eq!(saver.sequence_len(0, SequenceKind::Mean).unwrap(), 1);

    let written = saver
        .save_sequence(SequenceKind::Mean, &PathScope::live(), None)
        .unwrap();
    let expected = dir.path().join("live/Images/M1_mean.tif");
    assert_eq!(written, vec![expected.clone()]);
    assert_eq!(page_count(&expected), 1);
}

#[test]
fn test_primary_save_appends_background_without_storing_it() {
    let (dir, saver) = setup(Program::Hc1);
    saver
        .set_active_cages(vec![true, false, false, false])
        .unwrap();
    for value in [1, 2] {
        saver
            .append_frame(0, SequenceKind::Primary, Some(&Frame::filled(4, 3, value)))
            .unwrap();
    }

    let backgrounds = vec![Frame::filled(4, 3, 99); 4];
    let written = saver
        .save_sequence(
            SequenceKind::Primary,
            &PathScope::archive().with_session("s2"),
            Some(&backgrounds),
        )
        .unwrap();

    let expected = dir.path().join("archive/Images/s2/M1.tif");
    assert_eq!(written, vec![expected.clone()]);
    assert_eq!(page_count(&expected), 3);
    assert_eq!(saver.sequence_len(0, SequenceKind::Primary).unwrap(), 2);
}

#[test]
fn test_disabled_trace_is_skipped_and_rejects_appends() {
    let (_dir, saver) = setup(Program::Hc1);
    assert!(saver
        .append_frame(0, SequenceKind::Trace, Some(&Frame::filled(4, 3, 1)))
        .is_err());
    let written = saver
        .save_sequence(SequenceKind::Trace, &PathScope::live(), None)
        .unwrap();
    assert!(written.is_empty());
}

#[test]
fn test_enabled_trace_saves_only_cages_with_frames() {
    let (dir, saver) = setup(Program::Hc1);
    let backgrounds = vec![Frame::filled(4, 3, 7); 4];
    saver
        .enable_sequence(SequenceKind::Trace, &backgrounds)
        .unwrap();
    saver
        .append_frame(2, SequenceKind::Trace, Some(&Frame::filled(4, 3, 1)))
        .unwrap();

    assert_eq!(saver.sequence_len(2, SequenceKind::Trace).unwrap(), 1);
    let written = saver
        .save_sequence(SequenceKind::Trace, &PathScope::live(), None)
        .unwrap();
    let expected = dir.path().join("live/Traces/M3.tif");
    assert_eq!(written, vec![expected.clone()]);
    assert_eq!(page_count(&expected), 1);
}

#[test]
fn test_debug_capture_flushes_at_ten_frames() {
    let (dir, saver) = setup(Program::Hc1);
    let scope = PathScope::live();
    let frame = Frame::from(image::GrayImage::from_pixel(4, 3, image::Luma([5])));
    let raw = cage_results::frame::RawFrame::Gray8(frame.as_image().clone());

    for _ in 0..7 {
        saver.append_debug(0, Some(&raw), "17", &scope).unwrap();
    }
    assert_eq!(saver.sequence_len(0, SequenceKind::Debug).unwrap(), 5);

    saver.set_cage_debug_flag(0, true).unwrap();
    let mut last = DebugAppend::Skipped;
    for _ in 0..5 {
        last = saver.append_debug(0, Some(&raw), "17", &scope).unwrap();
    }

    assert_eq!(last, DebugAppend::Flushed { frames: 10 });
    assert!(!saver.debug_flag(0).unwrap());
    assert_eq!(saver.sequence_len(0, SequenceKind::Debug).unwrap(), 0);
    assert_eq!(page_count(&dir.path().join("live/Images/M1_debug17.tif")), 10);
}

#[test]
fn test_explicit_debug_save() {
    let (dir, saver) = setup(Program::Hc1);
    let raw = cage_results::frame::RawFrame::Gray8(image::GrayImage::from_pixel(4, 3, image::Luma([1])));
    saver.set_debug_flag(true);
    for _ in 0..3 {
        saver.append_debug(1, Some(&raw), "x", &PathScope::live()).unwrap();
    }

    assert_eq!(saver.save_debug(1, "x", &PathScope::live()).unwrap(), 3);
    assert!(!saver.debug_flag(1).unwrap());
    assert!(saver.debug_flag(0).unwrap());
    assert_eq!(page_count(&dir.path().join("live/Images/M2_debugx.tif")), 3);
}

#[test]
fn test_inactive_cage_debug_capture_is_discarded() {
    let (dir, saver) = setup(Program::Hc1);
    saver
        .set_active_cages(vec![true, true, false, true])
        .unwrap();
    let raw = cage_results::frame::RawFrame::Gray8(image::GrayImage::from_pixel(4, 3, image::Luma([1])));
    saver.append_debug(2, Some(&raw), "a", &PathScope::live()).unwrap();

    assert_eq!(saver.save_debug(2, "a", &PathScope::live()).unwrap(), 1);
    assert!(!dir.path().join("live/Images/M3_debuga.tif").exists());
    assert_eq!(saver.sequence_len(2, SequenceKind::Debug).unwrap(), 0);
}

#[test]
fn test_save_xy_overwrites_with_header() {
    let (dir, saver) = setup(Program::Of);
    let scope = PathScope::live();
    saver
        .save_xy(1, &scope, &["0\t1\t2".to_string()])
        .unwrap();
    let path = saver
        .save_xy(1, &scope, &["1\t3\t4".to_string(), "2\t5\t6".to_string()])
        .unwrap()
        .unwrap();

    assert_eq!(path, dir.path().join("live/XY_Data/M2.txt"));
    assert_eq!(read_lines(&path), vec!["Time\tX\tY", "1\t3\t4", "2\t5\t6"]);

    saver
        .set_active_cages(vec![true, false, true, true])
        .unwrap();
    assert!(saver.save_xy(1, &scope, &[]).unwrap().is_none());
}

#[test]
fn test_date_stamps() {
    let (dir, saver) = setup(Program::Of);
    let scope = PathScope::live();
    saver.stamp_date(&scope, true, &["Distance"]).unwrap();
    saver.stamp_session_span(&scope, "2024/03/07 09:00:00").unwrap();

    let total = read_lines(&dir.path().join("live/Results/TotalResult.txt"));
    assert_eq!(total.len(), 2);
    assert_eq!(total[0].len(), "2024/03/07 09:00:00".len());
    assert!(total[1].starts_with("2024/03/07 09:00:00 - "));

    let bin = read_lines(&dir.path().join("live/Results/Distance.txt"));
    assert_eq!(bin.len(), 1);
}

#[test]
fn test_saves_require_subject_ids() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), Program::Of);
    let backgrounds = vec![Frame::filled(4, 3, 0); 4];
    let saver = ResultSaverBuilder::new(&config).build(&backgrounds).unwrap();

    let rows = string_rows(4);
    let result = saver.save_table(
        &PathScope::live(),
        &ResultTable::Bin {
            name: "Distance",
            rows: &rows,
            header: false,
            bin_labels: true,
            version: false,
        },
    );
    assert!(result.is_err());
}

#[test]
fn test_concurrent_appends_to_different_cages() {
    let (_dir, saver) = setup(Program::Hc1);
    let saver = std::sync::Arc::new(saver);

    let handles: Vec<_> = (0..4)
        .map(|cage| {
            let saver = saver.clone();
            std::thread::spawn(move || {
                for i in 0..50u8 {
                    saver
                        .append_frame(cage, SequenceKind::Primary, Some(&Frame::filled(4, 3, i)))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for cage in 0..4 {
        assert_eq!(saver.sequence_len(cage, SequenceKind::Primary).unwrap(), 50);
    }
}
