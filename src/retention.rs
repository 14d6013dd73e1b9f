//! Retention-spec string parsing ("30s:7d" -> (secondsPerPoint, points))
//! and the `ArchivePolicy`/`Schema` types built from parsed specs.

use crate::error::{Result, WhisperError};

fn unit_multiplier(unit: char) -> Option<u32> {
    match unit {
        's' => Some(1),
        'm' => Some(60),
        'h' => Some(3_600),
        'd' => Some(86_400),
        'w' => Some(604_800),
        'y' => Some(31_536_000),
        _ => None,
    }
}

/// Parses a bare integer or `<integer><unit>` into a plain integer count
/// (seconds for precision fields, points for bare retention fields).
fn parse_integer_or_unit(text: &str) -> Result<u64> {
    if text.is_empty() {
        return Err(WhisperError::ValueError(
            "empty retention field".to_string(),
        ));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Ok(n);
    }
    let mut chars = text.chars();
    let unit = chars.next_back().ok_or_else(|| {
        WhisperError::ValueError(format!("malformed retention field '{text}'"))
    })?;
    let digits: String = chars.collect();
    let multiplier = unit_multiplier(unit).ok_or_else(|| {
        WhisperError::ValueError(format!("unrecognized unit '{unit}' in '{text}'"))
    })?;
    let n: u64 = digits
        .parse()
        .map_err(|_| WhisperError::ValueError(format!("malformed retention field '{text}'")))?;
    Ok(n * multiplier as u64)
}

/// Parses precision: a bare integer is seconds; `<int><unit>` is also
/// seconds (via the unit multiplier table).
fn parse_precision(text: &str) -> Result<u32> {
    let seconds = parse_integer_or_unit(text)?;
    u32::try_from(seconds)
        .map_err(|_| WhisperError::ValueError(format!("precision '{text}' out of range")))
}

/// Parses retention: a bare integer is a point count directly; a
/// `<int><unit>` duration is divided by `precision_seconds` with integer
/// truncation.
fn parse_points(text: &str, precision_seconds: u32) -> Result<u32> {
    if text.chars().all(|c| c.is_ascii_digit()) {
        let n: u64 = text
            .parse()
            .map_err(|_| WhisperError::ValueError(format!("malformed retention field '{text}'")))?;
        return u32::try_from(n)
            .map_err(|_| WhisperError::ValueError(format!("retention '{text}' out of range")));
    }
    let duration_seconds = parse_integer_or_unit(text)?;
    if precision_seconds == 0 {
        return Err(WhisperError::ValueError(
            "precision must be nonzero to interpret a duration retention".to_string(),
        ));
    }
    let points = duration_seconds / precision_seconds as u64;
    u32::try_from(points)
        .map_err(|_| WhisperError::ValueError(format!("retention '{text}' out of range")))
}

/// Parses a single `"<precision>:<retention>"` spec into
/// `(secondsPerPoint, points)`.
pub fn parse_retention_def(spec: &str) -> Result<(u32, u32)> {
    let mut parts = spec.splitn(2, ':');
    let precision_text = parts.next().unwrap_or("");
    let retention_text = match parts.next() {
        Some(r) => r,
        None => {
            return Err(WhisperError::ValueError(format!(
                "retention definition '{spec}' must contain a ':'"
            )))
        }
    };
    let precision = parse_precision(precision_text)?;
    if precision == 0 {
        return Err(WhisperError::ValueError(format!(
            "precision in '{spec}' must be > 0"
        )));
    }
    let points = parse_points(retention_text, precision)?;
    Ok((precision, points))
}

/// One archive's retention policy as declared by a create call, before
/// it becomes an on-disk descriptor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchivePolicy {
    pub seconds_per_point: u32,
    pub points: u32,
}

impl ArchivePolicy {
    pub fn new(seconds_per_point: u32, points: u32) -> ArchivePolicy {
        ArchivePolicy {
            seconds_per_point,
            points,
        }
    }

    pub fn from_spec(spec: &str) -> Result<ArchivePolicy> {
        let (seconds_per_point, points) = parse_retention_def(spec)?;
        Ok(ArchivePolicy::new(seconds_per_point, points))
    }

    pub fn retention(&self) -> u32 {
        self.seconds_per_point.saturating_mul(self.points)
    }

    pub fn size_on_disk(&self) -> u32 {
        self.points * crate::codec::POINT_SIZE as u32
    }
}

/// The ordered set of archive policies a new file is created with.
#[derive(Debug, Clone)]
pub struct Schema {
    pub retention_policies: Vec<ArchivePolicy>,
}

impl Schema {
    pub fn new(retention_policies: Vec<ArchivePolicy>) -> Schema {
        Schema { retention_policies }
    }

    pub fn new_from_retention_specs<S: AsRef<str>>(specs: &[S]) -> Result<Schema> {
        let mut policies = Vec::with_capacity(specs.len());
        for spec in specs {
            policies.push(ArchivePolicy::from_spec(spec.as_ref())?);
        }
        Ok(Schema::new(policies))
    }

    pub fn max_retention(&self) -> u32 {
        self.retention_policies
            .iter()
            .map(|p| p.retention())
            .max()
            .unwrap_or(0)
    }

    pub fn size_on_disk(&self) -> u64 {
        let archives_start = crate::header::archives_start(self.retention_policies.len());
        let points_bytes: u64 = self
            .retention_policies
            .iter()
            .map(|p| p.size_on_disk() as u64)
            .sum();
        archives_start as u64 + points_bytes
    }
}
