//! Read-only Zip32 reader for model-container templates.
//!
//! Templates are small, so the whole container is held in memory and every
//! offset/size from the central directory is checked against its length.
//!
//! Supported: Zip32 (EOCD + central directory), stored (method 0) and deflate
//! (method 8) entries. Not supported: Zip64, multi-disk archives, encrypted
//! entries. CRCs are not verified.

use crate::error::TemplateError;
use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::Path;

const SIG_EOCD: u32 = 0x0605_4b50;
const SIG_CDFH: u32 = 0x0201_4b50;
const SIG_LFH: u32 = 0x0403_4b50;

const EOCD_MIN_LEN: usize = 22;
const EOCD_SEARCH_MAX: usize = 66 * 1024;
const CDFH_LEN: usize = 46;
const LFH_LEN: usize = 30;

/// Upper bound for a single inflated entry.
const MAX_ENTRY_SIZE: u64 = 64 * 1024 * 1024;
/// Upper bound for the up-front buffer of an inflated entry.
const PREALLOC_MAX: u64 = 64 * 1024;

#[derive(Clone, Debug)]
struct ZipEntry {
    name: String,
    flags: u16,
    method: u16,
    compressed_size: u64,
    uncompressed_size: u64,
    local_header_offset: u64,
}

pub struct ZipArchive {
    bytes: Vec<u8>,
    entries: Vec<ZipEntry>,
}

impl ZipArchive {
    pub fn open(path: &Path) -> Result<Self, TemplateError> {
        let bytes = std::fs::read(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, TemplateError> {
        let entries = read_central_directory(&bytes)?;
        Ok(Self { bytes, entries })
    }

    /// Entry names in central-directory order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Read and decompress an entry by exact name.
    pub fn read(&self, name: &str) -> Result<Vec<u8>, TemplateError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| TemplateError::MissingEntry(name.to_string()))?;

        if entry.flags & 0x0001 != 0 {
            return Err(TemplateError::Archive(format!("entry '{}' is encrypted", name)));
        }

        let lfh = usize::try_from(entry.local_header_offset)
            .map_err(|_| malformed("local header offset out of range"))?;
        let header = slice(&self.bytes, lfh, LFH_LEN)?;
        if le_u32(&header[0..4]) != SIG_LFH {
            return Err(malformed("bad local header signature"));
        }
        let name_len = le_u16(&header[26..28]) as usize;
        let extra_len = le_u16(&header[28..30]) as usize;
        let data_start = lfh + LFH_LEN + name_len + extra_len;
        let compressed_len = usize::try_from(entry.compressed_size)
            .map_err(|_| malformed("compressed size out of range"))?;
        let data = slice(&self.bytes, data_start, compressed_len)?;

        match entry.method {
            0 => Ok(data.to_vec()),
            8 => {
                let limit = entry.uncompressed_size.min(MAX_ENTRY_SIZE);
                let mut out = Vec::with_capacity(inflate_capacity(limit));
                DeflateDecoder::new(data)
                    .take(limit)
                    .read_to_end(&mut out)
                    .map_err(|e| TemplateError::Archive(format!("inflate '{}' failed: {}", name, e)))?;
                Ok(out)
            }
            other => Err(TemplateError::Archive(format!(
                "entry '{}' uses unsupported compression method {}",
                name, other
            ))),
        }
    }

    pub fn read_to_string_lossy(&self, name: &str) -> Result<String, TemplateError> {
        let bytes = self.read(name)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn read_central_directory(bytes: &[u8]) -> Result<Vec<ZipEntry>, TemplateError> {
    if bytes.len() < EOCD_MIN_LEN {
        return Err(malformed("file too short for end of central directory"));
    }

    let eocd_off = find_eocd(bytes).ok_or_else(|| malformed("end of central directory not found"))?;
    let eocd = &bytes[eocd_off..];

    let disk_no = le_u16(&eocd[4..6]);
    let cd_disk = le_u16(&eocd[6..8]);
    let entries_disk = le_u16(&eocd[8..10]);
    let entries_total = le_u16(&eocd[10..12]);
    let cd_size = le_u32(&eocd[12..16]);
    let cd_off = le_u32(&eocd[16..20]);

    if disk_no != 0 || cd_disk != 0 || entries_disk != entries_total {
        return Err(TemplateError::Archive("multi-disk archives are not supported".into()));
    }
    if entries_total == 0xFFFF || cd_size == 0xFFFF_FFFF || cd_off == 0xFFFF_FFFF {
        return Err(TemplateError::Archive("zip64 archives are not supported".into()));
    }

    let cd_off = cd_off as usize;
    let cd_end = cd_off
        .checked_add(cd_size as usize)
        .filter(|end| *end <= bytes.len())
        .ok_or_else(|| malformed("central directory out of bounds"))?;

    let mut entries = Vec::with_capacity(entries_total as usize);
    let mut pos = cd_off;
    for _ in 0..entries_total {
        if pos >= cd_end {
            return Err(malformed("central directory truncated"));
        }
        let hdr = slice(bytes, pos, CDFH_LEN)?;
        if le_u32(&hdr[0..4]) != SIG_CDFH {
            return Err(malformed("bad central directory signature"));
        }
        let flags = le_u16(&hdr[8..10]);
        let method = le_u16(&hdr[10..12]);
        let compressed_size = le_u32(&hdr[20..24]) as u64;
        let uncompressed_size = le_u32(&hdr[24..28]) as u64;
        let name_len = le_u16(&hdr[28..30]) as usize;
        let extra_len = le_u16(&hdr[30..32]) as usize;
        let comment_len = le_u16(&hdr[32..34]) as usize;
        let local_header_offset = le_u32(&hdr[42..46]) as u64;

        let name_bytes = slice(bytes, pos + CDFH_LEN, name_len)?;
        entries.push(ZipEntry {
            name: String::from_utf8_lossy(name_bytes).into_owned(),
            flags,
            method,
            compressed_size,
            uncompressed_size,
            local_header_offset,
        });

        pos += CDFH_LEN + name_len + extra_len + comment_len;
    }

    Ok(entries)
}

/// Scan backward for an EOCD record whose comment fits inside the file.
fn find_eocd(bytes: &[u8]) -> Option<usize> {
    let window_start = bytes.len().saturating_sub(EOCD_SEARCH_MAX);
    let last = bytes.len() - EOCD_MIN_LEN;
    (window_start..=last).rev().find(|&i| {
        le_u32(&bytes[i..i + 4]) == SIG_EOCD && {
            let comment_len = le_u16(&bytes[i + 20..i + 22]) as usize;
            i + EOCD_MIN_LEN + comment_len <= bytes.len()
        }
    })
}

fn slice(bytes: &[u8], start: usize, len: usize) -> Result<&[u8], TemplateError> {
    start
        .checked_add(len)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| malformed("entry data out of bounds"))
}

fn malformed(what: &str) -> TemplateError {
    TemplateError::Archive(format!("malformed zip: {}", what))
}

#[inline]
fn le_u16(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

/// Buffer size hint for an entry whose declared size is not yet verified.
fn inflate_capacity(declared: u64) -> usize {
    declared.min(PREALLOC_MAX) as usize
}

#[inline]
fn le_u32(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal single-entry stored archive.
    fn stored_zip(name: &str, payload: &[u8]) -> Vec<u8> {
        single_entry_zip(name, 0, payload, payload.len() as u32)
    }

    /// Single-entry archive with an arbitrary method and declared size.
    fn single_entry_zip(name: &str, method: u16, data: &[u8], uncompressed: u32) -> Vec<u8> {
        let [m0, m1] = method.to_le_bytes();
        let mut out = Vec::new();
        out.extend_from_slice(&SIG_LFH.to_le_bytes());
        out.extend_from_slice(&[20, 0, 0, 0, m0, m1, 0, 0, 0, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&uncompressed.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);

        let cd_off = out.len() as u32;
        out.extend_from_slice(&SIG_CDFH.to_le_bytes());
        out.extend_from_slice(&[20, 0, 20, 0, 0, 0, m0, m1, 0, 0, 0, 0]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(&uncompressed.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&[0; 12]);
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        let cd_size = out.len() as u32 - cd_off;

        out.extend_from_slice(&SIG_EOCD.to_le_bytes());
        out.extend_from_slice(&[0, 0, 0, 0, 1, 0, 1, 0]);
        out.extend_from_slice(&cd_size.to_le_bytes());
        out.extend_from_slice(&cd_off.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out
    }

    fn deflate(payload: &[u8]) -> Vec<u8> {
        use flate2::Compression;
        use flate2::write::DeflateEncoder;
        use std::io::Write;
        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn reads_stored_entry() {
        let archive = ZipArchive::from_bytes(stored_zip("a/b.xml", b"<x/>")).unwrap();
        assert!(archive.contains("a/b.xml"));
        assert_eq!(archive.names().collect::<Vec<_>>(), vec!["a/b.xml"]);
        assert_eq!(archive.read("a/b.xml").unwrap(), b"<x/>");
    }

    #[test]
    fn missing_entry_is_reported() {
        let archive = ZipArchive::from_bytes(stored_zip("a.xml", b"1")).unwrap();
        assert!(matches!(archive.read("b.xml"), Err(TemplateError::MissingEntry(_))));
    }

    #[test]
    fn rejects_non_zip_bytes() {
        assert!(ZipArchive::from_bytes(b"not a zip".to_vec()).is_err());
        assert!(ZipArchive::from_bytes(vec![0u8; 128]).is_err());
    }

    #[test]
    fn rejects_truncated_central_directory() {
        let mut bytes = stored_zip("a.xml", b"payload");
        let len = bytes.len();
        // Point the central directory past the end of the file.
        bytes[len - 6..len - 2].copy_from_slice(&(len as u32).to_le_bytes());
        assert!(ZipArchive::from_bytes(bytes).is_err());
    }

    #[test]
    fn reads_deflated_entry() {
        let payload = b"<model><block/><block/><block/></model>".repeat(8);
        let zip = single_entry_zip("m.xml", 8, &deflate(&payload), payload.len() as u32);
        let archive = ZipArchive::from_bytes(zip).unwrap();
        assert_eq!(archive.read("m.xml").unwrap(), payload);
    }

    #[test]
    fn declared_size_does_not_drive_allocation() {
        assert_eq!(inflate_capacity(0), 0);
        assert_eq!(inflate_capacity(512), 512);
        assert_eq!(inflate_capacity(MAX_ENTRY_SIZE), PREALLOC_MAX as usize);

        // Central directory claims ~4 GiB for a few bytes of deflate data.
        let zip = single_entry_zip("big.xml", 8, &deflate(b"<x/>"), u32::MAX);
        let archive = ZipArchive::from_bytes(zip).unwrap();
        let out = archive.read("big.xml").unwrap();
        assert_eq!(out, b"<x/>");
        assert!(out.capacity() <= PREALLOC_MAX as usize);
    }
}
