//! Big-endian binary layouts for the three fixed record kinds: file
//! metadata, archive descriptors, and points. All widths are fixed; the
//! point codec is total (any 12-byte slice decodes without failing).

use byteorder::{BigEndian, ByteOrder};

pub const METADATA_SIZE: usize = 16;
pub const ARCHIVE_INFO_SIZE: usize = 12;
pub const POINT_SIZE: usize = 12;

/// One (interval, value) sample. `interval == 0` is the unwritten-slot
/// sentinel; any non-zero interval is authoritative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub interval: u32,
    pub value: f64,
}

impl Point {
    pub fn new(interval: u32, value: f64) -> Point {
        Point { interval, value }
    }

    pub fn is_unwritten(&self) -> bool {
        self.interval == 0
    }

    pub fn decode(buf: &[u8]) -> Point {
        debug_assert!(buf.len() >= POINT_SIZE);
        let interval = BigEndian::read_u32(&buf[0..4]);
        let value = BigEndian::read_f64(&buf[4..12]);
        Point { interval, value }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= POINT_SIZE);
        BigEndian::write_u32(&mut buf[0..4], self.interval);
        BigEndian::write_f64(&mut buf[4..12], self.value);
    }
}

/// Decodes every whole point in `buf`, in order. `buf.len()` need not be
/// a multiple of POINT_SIZE; any trailing partial record is ignored.
pub fn decode_points(buf: &[u8]) -> Vec<Point> {
    buf.chunks(POINT_SIZE)
        .filter(|c| c.len() == POINT_SIZE)
        .map(Point::decode)
        .collect()
}

/// The 16-byte file header record, decoded/encoded verbatim (semantic
/// validation lives in `header.rs`/`validate.rs`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetadataRecord {
    pub aggregation_type: u32,
    pub max_retention: u32,
    pub x_files_factor: f32,
    pub archive_count: u32,
}

impl MetadataRecord {
    pub fn decode(buf: &[u8]) -> MetadataRecord {
        debug_assert!(buf.len() >= METADATA_SIZE);
        MetadataRecord {
            aggregation_type: BigEndian::read_u32(&buf[0..4]),
            max_retention: BigEndian::read_u32(&buf[4..8]),
            x_files_factor: BigEndian::read_f32(&buf[8..12]),
            archive_count: BigEndian::read_u32(&buf[12..16]),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= METADATA_SIZE);
        BigEndian::write_u32(&mut buf[0..4], self.aggregation_type);
        BigEndian::write_u32(&mut buf[4..8], self.max_retention);
        BigEndian::write_f32(&mut buf[8..12], self.x_files_factor);
        BigEndian::write_u32(&mut buf[12..16], self.archive_count);
    }
}

/// The 12-byte archive descriptor record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArchiveInfoRecord {
    pub offset: u32,
    pub seconds_per_point: u32,
    pub points: u32,
}

impl ArchiveInfoRecord {
    pub fn decode(buf: &[u8]) -> ArchiveInfoRecord {
        debug_assert!(buf.len() >= ARCHIVE_INFO_SIZE);
        ArchiveInfoRecord {
            offset: BigEndian::read_u32(&buf[0..4]),
            seconds_per_point: BigEndian::read_u32(&buf[4..8]),
            points: BigEndian::read_u32(&buf[8..12]),
        }
    }

    pub fn encode(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= ARCHIVE_INFO_SIZE);
        BigEndian::write_u32(&mut buf[0..4], self.offset);
        BigEndian::write_u32(&mut buf[4..8], self.seconds_per_point);
        BigEndian::write_u32(&mut buf[8..12], self.points);
    }
}
