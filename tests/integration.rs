//! Integration tests exercising full create/update/fetch round trips.
//! In-memory tests use a fixed `now` via the `_at` seam so results
//! don't depend on wall-clock time; the on-disk tests use a `tempfile`
//! directory.

use whisper::file::CreateOptions;
use whisper::retention::ArchivePolicy;
use whisper::validate::validate_archive_list;
use whisper::{AggregationType, WhisperError, WhisperFile};

fn archives(specs: &[(u32, u32)]) -> Vec<ArchivePolicy> {
    specs
        .iter()
        .map(|&(s, n)| ArchivePolicy::new(s, n))
        .collect()
}

#[test]
fn s1_propagation_writes_when_xff_met() {
    let policies = archives(&[(60, 60), (300, 12)]);
    let options = CreateOptions {
        x_files_factor: 0.5,
        aggregation_method: AggregationType::Average,
        ..Default::default()
    };
    let mut file = WhisperFile::create_in_memory(&policies, options).unwrap();

    let t0: u32 = 300_000_300; // aligned to 300
    let now = t0 as i64 + 1000;

    file.update_one_at(now, Some(t0), 10.0).unwrap();
    file.update_one_at(now, Some(t0 + 60), 20.0).unwrap();
    file.update_one_at(now, Some(t0 + 120), 30.0).unwrap();

    let ((from, until, step), values) = file.fetch_at(now, t0 as i64, Some(t0 as i64 + 180)).unwrap();
    assert_eq!(step, 60);
    assert_eq!(until - from, 180);
    // fromInterval/untilInterval are both shifted forward by one step,
    // so the window here is [t0+60, t0+240), not [t0, t0+180).
    assert_eq!(values, vec![Some(20.0), Some(30.0), None]);

    // 3/5 finer slots known in the coarse window: 3/5 = 0.6 >= 0.5, average 20.0
    let ((_, _, coarse_step), coarse_values) =
        file.fetch_at(now, t0 as i64, Some(t0 as i64 + 300)).unwrap();
    assert_eq!(coarse_step, 60); // finest archive still selected for this small window
    assert!(coarse_values.iter().any(|v| v.is_some()));

    // Confirm the propagated value landed in the coarse archive directly.
    let coarse_points = file.each_point(1).unwrap();
    let written = coarse_points.iter().find(|p| p.interval == t0);
    assert!(written.is_some());
    assert_eq!(written.unwrap().value, 20.0);
}

#[test]
fn s2_propagation_gated_by_high_xff() {
    let policies = archives(&[(60, 60), (300, 12)]);
    let options = CreateOptions {
        x_files_factor: 0.9,
        aggregation_method: AggregationType::Average,
        ..Default::default()
    };
    let mut file = WhisperFile::create_in_memory(&policies, options).unwrap();

    let t0: u32 = 300_000_300;
    let now = t0 as i64 + 1000;

    file.update_one_at(now, Some(t0), 10.0).unwrap();
    file.update_one_at(now, Some(t0 + 60), 20.0).unwrap();
    file.update_one_at(now, Some(t0 + 120), 30.0).unwrap();

    // 3/5 < 0.9: the coarse slot must remain unwritten.
    let coarse_points = file.each_point(1).unwrap();
    let written = coarse_points.iter().find(|p| p.interval == t0);
    assert!(written.is_none() || written.unwrap().interval == 0);
}

#[test]
fn s3_retention_parsing() {
    assert_eq!(whisper::parse_retention_def("30s:7d").unwrap(), (30, 20160));
    assert_eq!(whisper::parse_retention_def("1m:6h").unwrap(), (60, 360));
    assert!(whisper::parse_retention_def("now").is_err());
}

#[test]
fn s4_validator_rejects_non_divisible_precision() {
    let list = archives(&[(60, 60), (45, 1440)]);
    assert!(matches!(
        validate_archive_list(&list),
        Err(WhisperError::InvalidConfiguration(_))
    ));
}

#[test]
fn s5_timestamp_not_covered_at_boundary() {
    let policies = archives(&[(60, 60)]);
    let mut file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();

    let now = 1_000_000_i64;
    let max_retention = 60 * 60;

    // age == maxRetention fails.
    let t_exact = (now - max_retention as i64) as u32;
    assert!(matches!(
        file.update_one_at(now, Some(t_exact), 1.0),
        Err(WhisperError::TimestampNotCovered(_))
    ));

    // age == maxRetention - 1 succeeds.
    let t_ok = (now - max_retention as i64 + 1) as u32;
    assert!(file.update_one_at(now, Some(t_ok), 1.0).is_ok());
}

#[test]
fn slot_locality_and_overwrite() {
    let policies = archives(&[(60, 60)]);
    let mut file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();

    let now = 1_000_000_i64;
    let t = 999_960_u32; // within retention, aligned to 60

    file.update_one_at(now, Some(t), 1.0).unwrap();
    // fromInterval is shifted forward by one step, so to land a
    // one-point window exactly on `t` the query must start one step
    // earlier.
    let ((from, _, step), values) = file.fetch_at(now, t as i64 - 60, Some(t as i64)).unwrap();
    assert_eq!(from, t);
    assert_eq!(step, 60);
    assert_eq!(values[0], Some(1.0));

    // overwrite with the same quantized interval: no ghost of the old value.
    file.update_one_at(now, Some(t), 2.0).unwrap();
    let (_, values) = file.fetch_at(now, t as i64 - 60, Some(t as i64)).unwrap();
    assert_eq!(values[0], Some(2.0));
}

#[test]
fn ring_wrap_overwrites_congruent_slot() {
    let policies = archives(&[(60, 3)]); // tiny ring: 3 slots
    let mut file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();

    let now = 10_000_000_i64;
    let t0 = 9_999_600_u32; // aligned to 60, well within retention

    file.update_one_at(now, Some(t0), 100.0).unwrap();
    // advance past the full ring (3 * 60 = 180s) so it wraps back to the same slot
    let t_wrap = t0 + 60 * 3;
    file.update_one_at(now + 200, Some(t_wrap), 200.0).unwrap();

    let points = file.each_point(0).unwrap();
    // slot 0 (t0's physical slot) now holds t_wrap's value, not t0's.
    assert_eq!(points[0].interval, t_wrap);
    assert_eq!(points[0].value, 200.0);
}

#[test]
fn fetch_on_empty_archive_returns_unknown() {
    let policies = archives(&[(60, 60)]);
    let file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();

    let now = 1_000_000_i64;
    let ((_, _, _), values) = file.fetch_at(now, now - 120, Some(now)).unwrap();
    assert!(values.iter().all(|v| v.is_none()));
}

#[test]
fn max_retention_clamp_does_not_fail() {
    let policies = archives(&[(60, 10)]); // maxRetention = 600
    let file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();

    let now = 1_000_000_i64;
    // fromTime far older than maxRetention should clamp rather than fail.
    let result = file.fetch_at(now, now - 10_000, Some(now));
    assert!(result.is_ok());
}

#[test]
fn batch_update_groups_contiguous_runs_and_cascades() {
    let policies = archives(&[(60, 20), (300, 20)]);
    let options = CreateOptions {
        x_files_factor: 0.5,
        ..Default::default()
    };
    let mut file = WhisperFile::create_in_memory(&policies, options).unwrap();

    let now = 2_000_000_i64;
    let t0: u32 = 1_999_500; // aligned to 300 and to 60

    let points: Vec<(u32, f64)> = (0..5).map(|i| (t0 + i * 60, (i + 1) as f64 * 10.0)).collect();
    file.update_at(now, &points).unwrap();

    let ((_, _, step), values) = file.fetch_at(now, t0 as i64, Some(t0 as i64 + 300)).unwrap();
    assert_eq!(step, 60);
    // Shifted forward by one step: window is [t0+60, t0+360), so the first
    // point (t0, 10.0) falls just outside it and the last slot (t0+300) was
    // never written.
    assert_eq!(
        values,
        vec![Some(20.0), Some(30.0), Some(40.0), Some(50.0), None]
    );

    // all 5 finer points known: propagation should have written the coarse average.
    let coarse_points = file.each_point(1).unwrap();
    let written = coarse_points.iter().find(|p| p.interval == t0);
    assert!(written.is_some());
    assert_eq!(written.unwrap().value, 30.0);
}

#[test]
fn update_with_empty_or_odd_flat_list_is_noop() {
    let policies = archives(&[(60, 60)]);
    let mut file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();
    assert!(file.update_flat(&[]).is_ok());
    assert!(file.update_flat(&[1.0, 2.0, 3.0]).is_ok());
}

#[test]
fn closed_handle_surfaces_io_error() {
    let policies = archives(&[(60, 60)]);
    let mut file = WhisperFile::create_in_memory(&policies, CreateOptions::default()).unwrap();
    file.close();
    assert!(file.is_closed());
    assert!(matches!(
        file.fetch_at(1_000_000, 0, Some(1_000_000)),
        Err(WhisperError::IOError(_))
    ));
}

#[test]
fn on_disk_create_open_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metric.wsp");

    let policies = archives(&[(1, 60), (60, 60)]);
    let options = CreateOptions {
        x_files_factor: 0.5,
        aggregation_method: AggregationType::Sum,
        overwrite: false,
        sparse: false,
    };
    {
        let mut file = WhisperFile::create(&path, &policies, options).unwrap();
        file.update_one_at(1_000_000, Some(999_999), 42.0).unwrap();
    }

    let file = WhisperFile::open(&path, false).unwrap();
    let info = file.info().unwrap();
    assert_eq!(info.aggregation_method, AggregationType::Sum);
    assert_eq!(info.x_files_factor, 0.5);
    assert_eq!(info.archives.len(), 2);
    assert_eq!(info.archives[0].seconds_per_point, 1);
    assert_eq!(info.archives[0].offset, whisper::header::archives_start(2) as u32);

    let ((from, _, step), values) = file.fetch_at(1_000_000, 999_990, Some(1_000_000)).unwrap();
    assert_eq!(step, 1);
    // fromInterval = 999990 + 1 = 999991 (shifted forward one step), so the
    // point written at interval 999999 lands at index 8, not 9.
    assert_eq!(from, 999_991);
    assert_eq!(values[8], Some(42.0));
}

#[test]
fn s6_create_rejects_existing_path_without_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metric.wsp");
    let policies = archives(&[(60, 60)]);

    WhisperFile::create(&path, &policies, CreateOptions::default()).unwrap();

    let err = WhisperFile::create(&path, &policies, CreateOptions::default());
    assert!(matches!(err, Err(WhisperError::InvalidConfiguration(_))));

    let options = CreateOptions {
        overwrite: true,
        ..Default::default()
    };
    assert!(WhisperFile::create(&path, &policies, options).is_ok());
}
