//! The file handle: create/open/close, fetch, single-point and batch
//! update, and the propagation cascade.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::path::Path;

use crate::aggregation::AggregationType;
use crate::archive;
use crate::codec::{self, Point, POINT_SIZE};
use crate::container::{BufferContainer, MmapContainer, WhisperContainer};
use crate::error::{Result, WhisperError};
use crate::header::{ArchiveDescriptor, Header};
use crate::retention::ArchivePolicy;
use crate::validate::validate_archive_list;

/// Options recognized on create.
#[derive(Debug, Clone, Copy)]
pub struct CreateOptions {
    pub x_files_factor: f32,
    pub aggregation_method: AggregationType,
    pub sparse: bool,
    pub overwrite: bool,
}

impl Default for CreateOptions {
    fn default() -> CreateOptions {
        CreateOptions {
            x_files_factor: 0.5,
            aggregation_method: AggregationType::Average,
            sparse: false,
            overwrite: false,
        }
    }
}

fn validate_options(options: &CreateOptions) -> Result<()> {
    if !(0.0..=1.0).contains(&options.x_files_factor) {
        return Err(WhisperError::InvalidConfiguration(format!(
            "xFilesFactor {} is outside [0.0, 1.0]",
            options.x_files_factor
        )));
    }
    if options.aggregation_method == AggregationType::Unknown {
        return Err(WhisperError::InvalidConfiguration(
            "aggregation method code 0 is reserved and cannot be used on create".to_string(),
        ));
    }
    Ok(())
}

fn now_seconds() -> i64 {
    time::get_time().sec
}

/// The header summary exposed as `handle.header` / `handle.info`.
#[derive(Debug, Clone)]
pub struct WhisperInfo {
    pub max_retention: u32,
    pub x_files_factor: f32,
    pub aggregation_method: AggregationType,
    pub archives: Vec<ArchiveDescriptor>,
}

/// A value series returned by `fetch`: the aligned time window plus one
/// value per slot, `None` at gaps ("unknown").
pub type TimeInfo = (u32, u32, u32);

pub struct WhisperFile<C: WhisperContainer> {
    container: C,
    header: Header,
    auto_flush: bool,
    closed: bool,
}

impl WhisperFile<MmapContainer> {
    /// Creates a new whisper file on disk. Parameters are frozen for the
    /// life of the file; only point slots change afterward.
    pub fn create<P: AsRef<Path>>(
        path: P,
        policies: &[ArchivePolicy],
        options: CreateOptions,
    ) -> Result<WhisperFile<MmapContainer>> {
        validate_options(&options)?;
        validate_archive_list(policies)?;

        let path_ref = path.as_ref();
        if path_ref.exists() {
            if !options.overwrite {
                return Err(WhisperError::InvalidConfiguration(format!(
                    "{} already exists",
                    path_ref.display()
                )));
            }
            std::fs::remove_file(path_ref)?;
        }

        let header = build_header(policies, &options);
        let total_size = header
            .archives
            .last()
            .map(|a| (a.offset + a.size_bytes) as u64)
            .unwrap_or(crate::header::archives_start(0) as u64);

        let mut container = MmapContainer::create(path_ref, total_size, options.sparse)?;
        header.write_to(container.as_mut_slice());
        container.flush()?;
        if let Err(e) = container.sync() {
            log::warn!("fsync after create failed (ignored): {e}");
        }

        Ok(WhisperFile {
            container,
            header,
            auto_flush: false,
            closed: false,
        })
    }

    /// Opens an existing whisper file, reading and decoding its header.
    pub fn open<P: AsRef<Path>>(path: P, auto_flush: bool) -> Result<WhisperFile<MmapContainer>> {
        let container = MmapContainer::open(path)?;
        let header = Header::read_from(container.as_slice())?;
        Ok(WhisperFile {
            container,
            header,
            auto_flush,
            closed: false,
        })
    }
}

impl WhisperFile<BufferContainer> {
    /// Creates a transient, never-persisted whisper file backed by an
    /// in-memory buffer. Used by tests and by callers that want the
    /// engine's semantics without a filesystem.
    pub fn create_in_memory(
        policies: &[ArchivePolicy],
        options: CreateOptions,
    ) -> Result<WhisperFile<BufferContainer>> {
        validate_options(&options)?;
        validate_archive_list(policies)?;

        let header = build_header(policies, &options);
        let total_size = header
            .archives
            .last()
            .map(|a| (a.offset + a.size_bytes) as usize)
            .unwrap_or_else(|| crate::header::archives_start(0));

        let mut container = BufferContainer::new(total_size);
        header.write_to(container.as_mut_slice());

        Ok(WhisperFile {
            container,
            header,
            auto_flush: false,
            closed: false,
        })
    }
}

fn build_header(policies: &[ArchivePolicy], options: &CreateOptions) -> Header {
    let start = crate::header::archives_start(policies.len()) as u32;
    let mut archives = Vec::with_capacity(policies.len());
    let mut offset = start;
    for policy in policies {
        archives.push(ArchiveDescriptor::new(
            offset,
            policy.seconds_per_point,
            policy.points,
        ));
        offset += policy.size_on_disk();
    }
    let max_retention = archives.iter().map(|a| a.retention).max().unwrap_or(0);
    Header::new(options.aggregation_method, max_retention, options.x_files_factor, archives)
}

impl<C: WhisperContainer> WhisperFile<C> {
    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(WhisperError::IOError(io::Error::new(
                io::ErrorKind::Other,
                "operation on a closed whisper file handle",
            )))
        } else {
            Ok(())
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn set_auto_flush(&mut self, auto_flush: bool) {
        self.auto_flush = auto_flush;
    }

    pub fn info(&self) -> Result<WhisperInfo> {
        self.check_open()?;
        Ok(WhisperInfo {
            max_retention: self.header.max_retention,
            x_files_factor: self.header.x_files_factor,
            aggregation_method: self.header.aggregation_type,
            archives: self.header.archives.clone(),
        })
    }

    pub fn archive_count(&self) -> usize {
        self.header.archives.len()
    }

    /// Raw physical-order dump of one archive's points, used by `info`
    /// style tooling, not by fetch (which is anchor-relative).
    pub fn each_point(&self, archive_index: usize) -> Result<Vec<Point>> {
        self.check_open()?;
        let archive = self
            .header
            .archives
            .get(archive_index)
            .copied()
            .ok_or_else(|| WhisperError::InvalidConfiguration(format!("no archive {archive_index}")))?;
        let start = archive.offset as usize;
        let end = (archive.offset + archive.size_bytes) as usize;
        Ok(codec::decode_points(&self.container.as_slice()[start..end]))
    }

    /// Fetches a value series for a time window, against the real wall clock.
    pub fn fetch(&self, from_time: i64, until_time: Option<i64>) -> Result<(TimeInfo, Vec<Option<f64>>)> {
        self.fetch_at(now_seconds(), from_time, until_time)
    }

    /// Same as `fetch`, but against an explicit `now` rather than the
    /// real wall clock. Tests and any caller wanting deterministic
    /// behavior use this directly.
    pub fn fetch_at(&self, now: i64, from_time: i64, until_time: Option<i64>) -> Result<(TimeInfo, Vec<Option<f64>>)> {
        self.check_open()?;

        let oldest = now - self.header.max_retention as i64;

        let from_time = if from_time < oldest { oldest } else { from_time };
        let mut until_time = until_time.unwrap_or(now);

        if from_time >= until_time {
            return Err(WhisperError::InvalidTimeInterval(format!(
                "fromTime {from_time} must be strictly before untilTime {until_time}"
            )));
        }
        if until_time > now || until_time < from_time {
            until_time = now;
        }

        let diff = now - from_time;
        let archive = self
            .header
            .archives
            .iter()
            .find(|a| a.retention as i64 >= diff)
            .copied()
            .ok_or_else(|| {
                WhisperError::InvalidTimeInterval(format!(
                    "no archive retains data back to {from_time}"
                ))
            })?;

        let s = archive.seconds_per_point as i64;
        let from_interval = (from_time - from_time.rem_euclid(s)) + s;
        let until_interval = (until_time - until_time.rem_euclid(s)) + s;
        let step = archive.seconds_per_point;
        let n_points = ((until_interval - from_interval) / s).max(0) as usize;

        let base = archive::base_interval(self.container.as_slice(), &archive);
        if base == 0 {
            return Ok(((from_interval as u32, until_interval as u32, step), vec![None; n_points]));
        }

        let from_offset = archive::slot_offset(&archive, base, from_interval as u32);
        let until_offset = archive::slot_offset(&archive, base, until_interval as u32);
        let buf = archive::read_range(self.container.as_slice(), &archive, from_offset, until_offset);
        let points = codec::decode_points(&buf);

        let mut values = Vec::with_capacity(points.len());
        let mut current = from_interval as u32;
        for p in &points {
            if p.interval == current {
                values.push(Some(p.value));
            } else {
                values.push(None);
            }
            current = current.wrapping_add(step);
        }

        Ok(((from_interval as u32, until_interval as u32, step), values))
    }

    /// Canonical update entry point: routes to single-point or batch
    /// update depending on how many points are given (an empty slice is
    /// a no-op).
    pub fn update(&mut self, points: &[(u32, f64)]) -> Result<()> {
        self.update_at(now_seconds(), points)
    }

    /// Same as `update`, but against an explicit `now`.
    pub fn update_at(&mut self, now: i64, points: &[(u32, f64)]) -> Result<()> {
        self.check_open()?;
        match points.len() {
            0 => Ok(()),
            1 => self.update_one_at(now, Some(points[0].0), points[0].1),
            _ => self.update_many_at(now, points),
        }
    }

    /// Adapter for the legacy variadic call surface: a flat, alternating
    /// `[timestamp, value, timestamp, value, ...]` list, as produced by
    /// flattening a mixture of scalar pairs and nested lists. An empty
    /// or odd-length input is rejected by doing nothing.
    pub fn update_flat(&mut self, flattened: &[f64]) -> Result<()> {
        if flattened.is_empty() || flattened.len() % 2 != 0 {
            return Ok(());
        }
        let points: Vec<(u32, f64)> = flattened
            .chunks(2)
            .map(|pair| (pair[0] as u32, pair[1]))
            .collect();
        self.update(&points)
    }

    /// Single-point update, at `t` (defaulting to now), against the real
    /// wall clock.
    pub fn update_one(&mut self, t: Option<u32>, v: f64) -> Result<()> {
        self.update_one_at(now_seconds(), t, v)
    }

    /// Same as `update_one`, but against an explicit `now`.
    pub fn update_one_at(&mut self, now: i64, t: Option<u32>, v: f64) -> Result<()> {
        self.check_open()?;
        let t = t.unwrap_or(now as u32);
        let age = now - t as i64;
        if age < 0 || age as u32 >= self.header.max_retention {
            return Err(WhisperError::TimestampNotCovered(format!(
                "timestamp {t} is {age}s old, outside retention {}",
                self.header.max_retention
            )));
        }

        let archive_idx = self
            .header
            .archives
            .iter()
            .position(|a| a.retention as i64 > age)
            .ok_or_else(|| {
                WhisperError::TimestampNotCovered(format!("no archive covers age {age}"))
            })?;
        let archive = self.header.archives[archive_idx];

        let quantized = archive::quantize(t, archive.seconds_per_point);
        let base = archive::base_interval(self.container.as_slice(), &archive);
        let offset = archive::slot_offset(&archive, base, quantized);

        let mut encoded = [0u8; POINT_SIZE];
        Point::new(quantized, v).encode(&mut encoded);
        archive::write_point_at(self.container.as_mut_slice(), offset, &encoded);

        let mut higher = archive;
        for lower_idx in (archive_idx + 1)..self.header.archives.len() {
            let lower = self.header.archives[lower_idx];
            let propagated = propagate(
                &mut self.container,
                self.header.aggregation_type,
                self.header.x_files_factor,
                quantized,
                &higher,
                &lower,
            )?;
            log::debug!(
                "propagate {}s -> {}s at {}: {}",
                higher.seconds_per_point,
                lower.seconds_per_point,
                quantized,
                if propagated { "wrote" } else { "skipped (not enough data)" }
            );
            if !propagated {
                break;
            }
            higher = lower;
        }

        if self.auto_flush {
            self.container.flush()?;
        }
        Ok(())
    }

    /// Batch update: sorts newest-first, splits across archives by age,
    /// writes each archive's batch as packed contiguous spans, then
    /// cascades propagation using the distinct set of quantized lower
    /// intervals the batch covers.
    fn update_many_at(&mut self, now: i64, points: &[(u32, f64)]) -> Result<()> {
        let mut sorted: Vec<(u32, f64)> = points.to_vec();
        sorted.sort_by(|a, b| b.0.cmp(&a.0));

        let mut remaining: &[(u32, f64)] = &sorted[..];
        let archive_count = self.header.archives.len();

        for archive_idx in 0..archive_count {
            if remaining.is_empty() {
                break;
            }
            let retention = self.header.archives[archive_idx].retention as i64;
            let split = remaining
                .iter()
                .position(|&(t, _)| now - t as i64 > retention)
                .unwrap_or(remaining.len());
            let (batch, rest) = remaining.split_at(split);
            remaining = rest;

            if batch.is_empty() {
                continue;
            }
            let mut chronological: Vec<(u32, f64)> = batch.to_vec();
            chronological.reverse();
            self.write_batch_to_archive(archive_idx, &chronological)?;
        }

        if !remaining.is_empty() {
            log::debug!(
                "{} point(s) older than the coarsest archive were dropped",
                remaining.len()
            );
        }

        if self.auto_flush {
            self.container.flush()?;
        }
        Ok(())
    }

    fn write_batch_to_archive(&mut self, archive_idx: usize, points: &[(u32, f64)]) -> Result<()> {
        let archive = self.header.archives[archive_idx];
        let s = archive.seconds_per_point;

        let mut quantized: Vec<(u32, f64)> = points
            .iter()
            .map(|&(t, v)| (archive::quantize(t, s), v))
            .collect();
        quantized.sort_by_key(|&(t, _)| t);

        let mut deduped: Vec<(u32, f64)> = Vec::with_capacity(quantized.len());
        for (t, v) in quantized {
            if let Some(last) = deduped.last_mut() {
                if last.0 == t {
                    last.1 = v;
                    continue;
                }
            }
            deduped.push((t, v));
        }

        let spans = pack_spans(&deduped, s);

        let mut base = archive::base_interval(self.container.as_slice(), &archive);
        for (start_interval, bytes) in &spans {
            let start_offset = if base == 0 {
                archive.offset
            } else {
                archive::slot_offset(&archive, base, *start_interval)
            };
            archive::write_span(self.container.as_mut_slice(), &archive, start_offset, bytes)?;
            if base == 0 {
                base = *start_interval;
            }
        }

        let mut higher = archive;
        for lower_idx in (archive_idx + 1)..self.header.archives.len() {
            let lower = self.header.archives[lower_idx];

            let mut intervals = BTreeSet::new();
            for &(t, _) in &deduped {
                intervals.insert(archive::quantize(t, lower.seconds_per_point));
            }

            let mut any_not_enough = false;
            for lower_start in intervals {
                let propagated = propagate(
                    &mut self.container,
                    self.header.aggregation_type,
                    self.header.x_files_factor,
                    lower_start,
                    &higher,
                    &lower,
                )?;
                if !propagated {
                    any_not_enough = true;
                    break;
                }
            }
            if any_not_enough {
                break;
            }
            higher = lower;
        }

        Ok(())
    }
}

/// Groups points (already quantized to `s` and sorted ascending, de-duplicated)
/// into maximal runs of consecutive multiples of `s`, each packed into one
/// contiguous byte span ready for `archive::write_span`.
fn pack_spans(points: &[(u32, f64)], s: u32) -> Vec<(u32, Vec<u8>)> {
    let mut spans = Vec::new();
    let mut current_start: Option<u32> = None;
    let mut current_bytes: Vec<u8> = Vec::new();
    let mut expected_next: u32 = 0;

    for &(t, v) in points {
        let mut encoded = [0u8; POINT_SIZE];
        Point::new(t, v).encode(&mut encoded);

        match current_start {
            Some(_) if t == expected_next => {
                current_bytes.extend_from_slice(&encoded);
                expected_next = t.wrapping_add(s);
            }
            Some(start) => {
                spans.push((start, std::mem::take(&mut current_bytes)));
                current_start = Some(t);
                current_bytes = encoded.to_vec();
                expected_next = t.wrapping_add(s);
            }
            None => {
                current_start = Some(t);
                current_bytes = encoded.to_vec();
                expected_next = t.wrapping_add(s);
            }
        }
    }
    if let Some(start) = current_start {
        spans.push((start, current_bytes));
    }
    spans
}

/// Recomputes `lower`'s slot for the window covering `t` (already
/// quantized to `higher.seconds_per_point`) from `higher`'s
/// neighborhood, gated by `xff`. Returns `Ok(false)` for "not enough
/// data", which is not an error; it just halts further cascading for
/// this point.
fn propagate<C: WhisperContainer>(
    container: &mut C,
    aggregation: AggregationType,
    xff: f32,
    t: u32,
    higher: &ArchiveDescriptor,
    lower: &ArchiveDescriptor,
) -> Result<bool> {
    let lower_start = archive::quantize(t, lower.seconds_per_point);

    let higher_base = archive::base_interval(container.as_slice(), higher);
    let higher_first_offset = if higher_base == 0 {
        higher.offset
    } else {
        archive::slot_offset(higher, higher_base, lower_start)
    };

    let points_per_bucket = (lower.seconds_per_point / higher.seconds_per_point) as usize;
    let window_bytes = points_per_bucket as u32 * POINT_SIZE as u32;
    let higher_last_offset = higher.offset
        + ((higher_first_offset - higher.offset + window_bytes) % higher.size_bytes);

    let buf = archive::read_range(container.as_slice(), higher, higher_first_offset, higher_last_offset);
    let points = codec::decode_points(&buf);

    let mut known = Vec::with_capacity(points_per_bucket);
    let mut current = lower_start;
    for p in &points {
        if p.interval == current {
            known.push(p.value);
        }
        current = current.wrapping_add(higher.seconds_per_point);
    }

    if known.is_empty() {
        return Ok(false);
    }
    let ratio = known.len() as f32 / points_per_bucket as f32;
    if ratio < xff {
        return Ok(false);
    }

    let aggregate = aggregation.aggregate(&known)?;

    let lower_base = archive::base_interval(container.as_slice(), lower);
    let offset = archive::slot_offset(lower, lower_base, lower_start);
    let mut encoded = [0u8; POINT_SIZE];
    Point::new(lower_start, aggregate).encode(&mut encoded);
    archive::write_point_at(container.as_mut_slice(), offset, &encoded);

    Ok(true)
}

impl<C: WhisperContainer> fmt::Debug for WhisperFile<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "aggregation method: {}\nmax retention: {}\nxFilesFactor: {}\n",
            self.header.aggregation_type.name(),
            self.header.max_retention,
            self.header.x_files_factor
        )?;
        for (index, archive) in self.header.archives.iter().enumerate() {
            writeln!(
                f,
                "archive {index}: offset={} secondsPerPoint={} points={} retention={} size={}",
                archive.offset, archive.seconds_per_point, archive.points, archive.retention, archive.size_bytes
            )?;
        }
        Ok(())
    }
}
