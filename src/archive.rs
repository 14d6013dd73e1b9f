//! Per-archive ring primitives: base-point read, slot-to-offset mapping
//! with wraparound, and ranged reads/writes across the ring seam.
//! Offsets are absolute file offsets, not archive-relative.

use byteorder::{BigEndian, ByteOrder};

use crate::codec::POINT_SIZE;
use crate::error::{Result, WhisperError};
use crate::header::ArchiveDescriptor;

/// `t - (t mod seconds_per_point)`: the unique interval a slot records.
#[inline]
pub fn quantize(t: u32, seconds_per_point: u32) -> u32 {
    t - t % seconds_per_point
}

/// Interval stored in an archive's first slot; zero means never written.
pub fn base_interval(container: &[u8], archive: &ArchiveDescriptor) -> u32 {
    let start = archive.offset as usize;
    BigEndian::read_u32(&container[start..start + 4])
}

/// Maps a timestamp to its absolute byte offset within the archive's
/// ring. Uses mathematical (non-negative) modulo on the signed byte
/// delta so negative deltas never produce a negative offset.
pub fn slot_offset(archive: &ArchiveDescriptor, base: u32, t: u32) -> u32 {
    if base == 0 {
        return archive.offset;
    }
    let quantized = quantize(t, archive.seconds_per_point) as i64;
    let delta = quantized - base as i64;
    let point_delta = delta / archive.seconds_per_point as i64;
    let byte_delta = point_delta * POINT_SIZE as i64;
    let size_bytes = archive.size_bytes as i64;
    let wrapped = ((byte_delta % size_bytes) + size_bytes) % size_bytes;
    archive.offset + wrapped as u32
}

/// Reads `[first_offset, last_offset)`, wrapping around the seam if
/// `first_offset >= last_offset`.
pub fn read_range(container: &[u8], archive: &ArchiveDescriptor, first_offset: u32, last_offset: u32) -> Vec<u8> {
    let archive_end = archive.offset + archive.size_bytes;
    if first_offset < last_offset {
        container[first_offset as usize..last_offset as usize].to_vec()
    } else {
        let mut buf = Vec::new();
        buf.extend_from_slice(&container[first_offset as usize..archive_end as usize]);
        buf.extend_from_slice(&container[archive.offset as usize..last_offset as usize]);
        buf
    }
}

/// Writes a single 12-byte point record at `offset`.
pub fn write_point_at(container: &mut [u8], offset: u32, encoded: &[u8; POINT_SIZE]) {
    let start = offset as usize;
    container[start..start + POINT_SIZE].copy_from_slice(encoded);
}

/// Writes a contiguous run of packed point bytes starting at
/// `start_offset`, splitting across the ring seam if the span runs past
/// the archive's end.
pub fn write_span(
    container: &mut [u8],
    archive: &ArchiveDescriptor,
    start_offset: u32,
    bytes: &[u8],
) -> Result<()> {
    let archive_end = archive.offset + archive.size_bytes;
    let avail_to_end = archive_end.saturating_sub(start_offset);
    let len = bytes.len() as u32;

    if len <= avail_to_end {
        let start = start_offset as usize;
        container[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    } else {
        let prefix_len = avail_to_end as usize;
        let split_point = start_offset + prefix_len as u32;
        if split_point != archive_end {
            return Err(WhisperError::ArchiveBoundaryExceeded(format!(
                "prefix write ended at {split_point}, expected archive end {archive_end}"
            )));
        }
        container[start_offset as usize..archive_end as usize].copy_from_slice(&bytes[..prefix_len]);

        let suffix = &bytes[prefix_len..];
        container[archive.offset as usize..archive.offset as usize + suffix.len()]
            .copy_from_slice(suffix);
        Ok(())
    }
}
