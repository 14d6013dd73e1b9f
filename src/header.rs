//! Header and archive descriptor materialization.

use crate::aggregation::AggregationType;
use crate::codec::{ArchiveInfoRecord, MetadataRecord, ARCHIVE_INFO_SIZE, METADATA_SIZE, POINT_SIZE};
use crate::error::{Result, WhisperError};

/// Byte offset of the first archive descriptor for an N-archive file:
/// `16 + 12*A`. Also doubles as the start of the descriptor table.
pub fn archives_start(archive_count: usize) -> usize {
    METADATA_SIZE + ARCHIVE_INFO_SIZE * archive_count
}

/// A decoded archive descriptor, enriched with derived fields
/// (`retention`, `size_bytes`) so callers never recompute them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveDescriptor {
    pub offset: u32,
    pub seconds_per_point: u32,
    pub points: u32,
    pub retention: u32,
    pub size_bytes: u32,
}

impl ArchiveDescriptor {
    pub fn new(offset: u32, seconds_per_point: u32, points: u32) -> ArchiveDescriptor {
        ArchiveDescriptor {
            offset,
            seconds_per_point,
            points,
            retention: seconds_per_point.saturating_mul(points),
            size_bytes: points.saturating_mul(POINT_SIZE as u32),
        }
    }

    fn from_record(record: ArchiveInfoRecord) -> ArchiveDescriptor {
        ArchiveDescriptor::new(record.offset, record.seconds_per_point, record.points)
    }

    fn to_record(self) -> ArchiveInfoRecord {
        ArchiveInfoRecord {
            offset: self.offset,
            seconds_per_point: self.seconds_per_point,
            points: self.points,
        }
    }
}

/// The decoded file header: metadata plus every archive descriptor, in
/// file-declared (finest-first) order.
#[derive(Debug, Clone)]
pub struct Header {
    pub aggregation_type: AggregationType,
    pub max_retention: u32,
    pub x_files_factor: f32,
    pub archives: Vec<ArchiveDescriptor>,
}

impl Header {
    pub fn new(
        aggregation_type: AggregationType,
        max_retention: u32,
        x_files_factor: f32,
        archives: Vec<ArchiveDescriptor>,
    ) -> Header {
        Header {
            aggregation_type,
            max_retention,
            x_files_factor,
            archives,
        }
    }

    /// Materializes a header from the first bytes of a whisper file.
    /// Any malformed record is wrapped as `CorruptFile` rather than
    /// propagated as a raw decode panic (the codec is total, so this
    /// only triggers on truncated input / short reads, not on bad
    /// byte content).
    pub fn read_from(buf: &[u8]) -> Result<Header> {
        if buf.len() < METADATA_SIZE {
            return Err(WhisperError::CorruptFile(format!(
                "file too short for metadata header: {} bytes",
                buf.len()
            )));
        }
        let metadata = MetadataRecord::decode(&buf[0..METADATA_SIZE]);
        let aggregation_type = AggregationType::from_code(metadata.aggregation_type)
            .unwrap_or(AggregationType::Unknown);

        let archive_count = metadata.archive_count as usize;
        let descriptors_end = archives_start(archive_count);
        if buf.len() < descriptors_end {
            return Err(WhisperError::CorruptFile(format!(
                "file too short for {archive_count} archive descriptors"
            )));
        }

        let mut archives = Vec::with_capacity(archive_count);
        for i in 0..archive_count {
            let start = METADATA_SIZE + i * ARCHIVE_INFO_SIZE;
            let record = ArchiveInfoRecord::decode(&buf[start..start + ARCHIVE_INFO_SIZE]);
            archives.push(ArchiveDescriptor::from_record(record));
        }

        let computed_max_retention = archives.iter().map(|a| a.retention).max().unwrap_or(0);
        if computed_max_retention != metadata.max_retention {
            log::warn!(
                "header maxRetention ({}) does not match the sum of archive retentions ({}); trusting the header value",
                metadata.max_retention,
                computed_max_retention
            );
        }

        Ok(Header {
            aggregation_type,
            max_retention: metadata.max_retention,
            x_files_factor: metadata.x_files_factor,
            archives,
        })
    }

    /// Encodes the metadata + descriptor table into `buf`, which must be
    /// at least `archives_start(self.archives.len())` bytes.
    pub fn write_to(&self, buf: &mut [u8]) {
        let metadata = MetadataRecord {
            aggregation_type: self.aggregation_type.to_code(),
            max_retention: self.max_retention,
            x_files_factor: self.x_files_factor,
            archive_count: self.archives.len() as u32,
        };
        metadata.encode(&mut buf[0..METADATA_SIZE]);

        for (i, archive) in self.archives.iter().enumerate() {
            let start = METADATA_SIZE + i * ARCHIVE_INFO_SIZE;
            archive
                .to_record()
                .encode(&mut buf[start..start + ARCHIVE_INFO_SIZE]);
        }
    }
}
