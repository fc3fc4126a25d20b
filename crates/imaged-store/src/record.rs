//! On-disk entry records.
//!
//! One file per key under `entries/`, named `<hex(key)>.imgd`:
//!
//! ```text
//! [4 bytes: magic "imgd"]
//! [1 byte:  record version]
//! [1 byte:  channels]
//! [1 byte:  color tag]
//! [1 byte:  sample kind (0 = uint, 1 = float)]
//! [1 byte:  bits per sample]
//! [8 bytes: width (little-endian u64)]
//! [8 bytes: height (little-endian u64)]
//! [4 bytes: key length (little-endian u32)]
//! [N bytes: key, UTF-8]
//! [4 bytes: CRC32 of everything above (little-endian u32)]
//! [num_bytes: samples, little-endian]
//! ```
//!
//! Records are never modified in place. Every write goes to a `.tmp` file
//! first and is then linked (create) or renamed (replace) into position.
//! Temp files are named `<record>.<pid>.<seq>.tmp` after the writing
//! process.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use imaged_image::{Color, ImageMeta, SampleType};

use crate::config::SyncMode;

/// Magic bytes at the start of every record.
pub const MAGIC: &[u8; 4] = b"imgd";

/// Current record format version.
pub const RECORD_VERSION: u8 = 2;

/// Extension of committed records.
pub const RECORD_EXT: &str = "imgd";

/// Extension of in-flight writes.
pub const TEMP_EXT: &str = "tmp";

/// Longest accepted key, in bytes. Keeps hex file names within common
/// filesystem limits.
pub const MAX_KEY_LEN: usize = 120;

const FIXED_LEN: usize = 29;
const CRC_LEN: usize = 4;

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Decoded record header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub key: String,
    pub meta: ImageMeta,
    /// Offset of the first sample byte.
    pub data_offset: usize,
}

/// How a freshly written temp file is moved into place.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Commit {
    /// Fail with `AlreadyExists` if the record is present.
    CreateNew,
    /// Atomically replace the existing record.
    Replace,
}

/// File name for `key`, without directory.
pub fn record_file_name(key: &str) -> String {
    format!("{}.{RECORD_EXT}", hex::encode(key.as_bytes()))
}

/// Recover the key from a record file name. `None` for temp files and
/// anything that is not hex-encoded UTF-8.
pub fn key_from_file_name(name: &str) -> Option<String> {
    let stem = name.strip_suffix(RECORD_EXT)?.strip_suffix('.')?;
    let bytes = hex::decode(stem).ok()?;
    String::from_utf8(bytes).ok()
}

pub fn encode_header(key: &str, meta: &ImageMeta) -> Vec<u8> {
    let mut buf = Vec::with_capacity(FIXED_LEN + key.len() + CRC_LEN);
    buf.extend_from_slice(MAGIC);
    buf.push(RECORD_VERSION);
    buf.push(meta.channels);
    buf.push(meta.color.tag());
    buf.push(meta.ty.kind_byte());
    buf.push(meta.ty.bits());
    buf.extend_from_slice(&meta.width.to_le_bytes());
    buf.extend_from_slice(&meta.height.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(key.as_bytes());
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Parse and validate a complete record: header checksum, metadata, and
/// that exactly `num_bytes` of samples follow.
pub fn decode_record(bytes: &[u8]) -> Result<RecordHeader, String> {
    if bytes.len() < FIXED_LEN + CRC_LEN {
        return Err(format!("record too short: {} bytes", bytes.len()));
    }
    if &bytes[0..4] != MAGIC {
        return Err(format!(
            "bad magic: expected {:?}, found {:?}",
            String::from_utf8_lossy(MAGIC),
            String::from_utf8_lossy(&bytes[0..4])
        ));
    }
    if bytes[4] != RECORD_VERSION {
        return Err(format!("unsupported record version {}", bytes[4]));
    }
    let channels = bytes[5];
    let color = Color::from_tag(bytes[6]).ok_or_else(|| format!("unknown color tag {}", bytes[6]))?;
    let ty = SampleType::from_parts(bytes[7], bytes[8])
        .ok_or_else(|| format!("unknown sample type: kind {} bits {}", bytes[7], bytes[8]))?;
    let width = le_u64(&bytes[9..17]);
    let height = le_u64(&bytes[17..25]);
    let key_len = le_u32(&bytes[25..29]) as usize;

    let key_end = FIXED_LEN
        .checked_add(key_len)
        .filter(|end| end + CRC_LEN <= bytes.len())
        .ok_or_else(|| format!("key length {key_len} runs past end of record"))?;
    let stored_crc = le_u32(&bytes[key_end..key_end + CRC_LEN]);
    let computed_crc = crc32fast::hash(&bytes[..key_end]);
    if stored_crc != computed_crc {
        return Err(format!(
            "header checksum mismatch: stored {stored_crc:#010x}, computed {computed_crc:#010x}"
        ));
    }
    let key = std::str::from_utf8(&bytes[FIXED_LEN..key_end])
        .map_err(|e| format!("key is not UTF-8: {e}"))?
        .to_string();

    let meta = ImageMeta { width, height, channels, color, ty };
    meta.validate().map_err(|e| e.to_string())?;

    let data_offset = key_end + CRC_LEN;
    let data_len = (bytes.len() - data_offset) as u64;
    if data_len != meta.num_bytes() {
        return Err(format!(
            "expected {} sample bytes for {meta}, found {data_len}",
            meta.num_bytes()
        ));
    }
    Ok(RecordHeader { key, meta, data_offset })
}

/// Write a complete record for `key` at `path` through a temp file.
///
/// `None` zero-fills the samples by extending the file, which leaves a hole
/// on filesystems that support sparse files. With [`SyncMode::EveryWrite`]
/// the file and its directory entry are both on disk before this returns.
pub(crate) fn write_record(
    path: &Path,
    key: &str,
    meta: &ImageMeta,
    data: Option<&[u8]>,
    sync: SyncMode,
    commit: Commit,
) -> io::Result<()> {
    let tmp = temp_path(path);
    let result = write_temp(&tmp, key, meta, data, sync).and_then(|()| match commit {
        Commit::CreateNew => fs::hard_link(&tmp, path),
        Commit::Replace => fs::rename(&tmp, path),
    });
    if commit == Commit::CreateNew || result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result?;

    if sync == SyncMode::EveryWrite {
        if let Err(e) = sync_parent(path) {
            if commit == Commit::CreateNew {
                let _ = fs::remove_file(path);
            }
            return Err(e);
        }
    }
    Ok(())
}

fn write_temp(tmp: &Path, key: &str, meta: &ImageMeta, data: Option<&[u8]>, sync: SyncMode) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(tmp)?;
    let header = encode_header(key, meta);
    file.write_all(&header)?;
    match data {
        Some(data) => file.write_all(data)?,
        None => file.set_len(header.len() as u64 + meta.num_bytes())?,
    }
    if sync == SyncMode::EveryWrite {
        file.sync_all()?;
    }
    Ok(())
}

/// `fsync` the directory holding `path`, so a link, rename, or unlink in it
/// survives a crash.
#[cfg(unix)]
pub(crate) fn sync_parent(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) => fs::File::open(dir)?.sync_all(),
        None => Ok(()),
    }
}

/// Directories cannot be opened for syncing here; renames are flushed by
/// the filesystem.
#[cfg(not(unix))]
pub(crate) fn sync_parent(_path: &Path) -> io::Result<()> {
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.{seq}.{TEMP_EXT}", std::process::id()));
    path.with_file_name(name)
}

/// Process id embedded in a temp file name.
pub(crate) fn temp_owner(name: &str) -> Option<u32> {
    let rest = name.strip_suffix(TEMP_EXT)?.strip_suffix('.')?;
    let (rest, seq) = rest.rsplit_once('.')?;
    seq.parse::<u64>().ok()?;
    let (_, pid) = rest.rsplit_once('.')?;
    pid.parse().ok()
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(key: &str) -> (ImageMeta, Vec<u8>) {
        let meta = ImageMeta::new(3, 2, 2, SampleType::U16);
        let mut bytes = encode_header(key, &meta);
        bytes.extend((0..meta.num_bytes()).map(|i| i as u8));
        (meta, bytes)
    }

    #[test]
    fn header_layout() {
        let meta = ImageMeta::new(4, 4, 3, SampleType::U8);
        let header = encode_header("a", &meta);
        assert_eq!(&header[0..4], b"imgd");
        assert_eq!(header[4], RECORD_VERSION);
        assert_eq!(&header[5..9], &[3, Color::Rgb.tag(), 0, 8]);
        assert_eq!(le_u64(&header[9..17]), 4);
        assert_eq!(le_u32(&header[25..29]), 1);
        assert_eq!(header[29], b'a');
        assert_eq!(header.len(), FIXED_LEN + 1 + CRC_LEN);
    }

    #[test]
    fn decode_valid_record() {
        let (meta, bytes) = sample_record("photos/cat");
        let header = decode_record(&bytes).unwrap();
        assert_eq!(header.key, "photos/cat");
        assert_eq!(header.meta, meta);
        assert_eq!(bytes.len() - header.data_offset, 24);
    }

    #[test]
    fn color_survives_the_header() {
        let meta = ImageMeta::with_color(2, 1, Color::LabA, SampleType::F32);
        let mut bytes = encode_header("lab", &meta);
        bytes.resize(bytes.len() + meta.num_bytes() as usize, 0);
        assert_eq!(decode_record(&bytes).unwrap().meta, meta);

        let mut unknown = encode_header("lab", &meta);
        unknown[6] = 6;
        unknown.truncate(unknown.len() - CRC_LEN);
        let crc = crc32fast::hash(&unknown);
        unknown.extend_from_slice(&crc.to_le_bytes());
        unknown.resize(unknown.len() + meta.num_bytes() as usize, 0);
        assert!(decode_record(&unknown).unwrap_err().contains("color tag"));
    }

    #[test]
    fn decode_rejects_damage() {
        let (_, bytes) = sample_record("k");

        let mut flipped = bytes.clone();
        flipped[10] ^= 0xff;
        assert!(decode_record(&flipped).unwrap_err().contains("checksum"));

        let mut versioned = bytes.clone();
        versioned[4] = 9;
        assert!(decode_record(&versioned).unwrap_err().contains("version"));

        let truncated = &bytes[..bytes.len() - 1];
        assert!(decode_record(truncated).unwrap_err().contains("sample bytes"));

        let mut padded = bytes.clone();
        padded.push(0);
        assert!(decode_record(&padded).is_err());

        assert!(decode_record(b"imgd").is_err());
        assert!(decode_record(&[0u8; 40]).unwrap_err().contains("magic"));
    }

    proptest::proptest! {
        #[test]
        fn any_header_byte_flip_is_detected(index in 0usize..FIXED_LEN + 6 + CRC_LEN, mask in 1u8..=255) {
            let (_, mut bytes) = sample_record("photos");
            bytes[index] ^= mask;
            proptest::prop_assert!(decode_record(&bytes).is_err());
        }
    }

    #[test]
    fn file_names_roundtrip_keys() {
        let name = record_file_name("a/b c");
        assert!(name.ends_with(".imgd"));
        assert_eq!(key_from_file_name(&name).as_deref(), Some("a/b c"));
        assert_eq!(key_from_file_name("61.imgd.123.0.tmp"), None);
        assert_eq!(key_from_file_name("zz.imgd"), None);
        assert_eq!(record_file_name(&"k".repeat(MAX_KEY_LEN)).len(), 245);
    }

    #[test]
    fn create_new_refuses_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(record_file_name("a"));
        let meta = ImageMeta::new(1, 1, 1, SampleType::U8);

        write_record(&path, "a", &meta, Some(&[7]), SyncMode::EveryWrite, Commit::CreateNew).unwrap();
        let err = write_record(&path, "a", &meta, Some(&[8]), SyncMode::OsDefault, Commit::CreateNew).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);

        write_record(&path, "a", &meta, Some(&[9]), SyncMode::OsDefault, Commit::Replace).unwrap();
        let bytes = fs::read(&path).unwrap();
        let header = decode_record(&bytes).unwrap();
        assert_eq!(&bytes[header.data_offset..], &[9]);

        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn zero_fill_extends_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(record_file_name("big"));
        let meta = ImageMeta::new(256, 256, 4, SampleType::F64);

        write_record(&path, "big", &meta, None, SyncMode::EveryWrite, Commit::CreateNew).unwrap();
        let bytes = fs::read(&path).unwrap();
        let header = decode_record(&bytes).unwrap();
        assert_eq!(header.meta, meta);
        assert_eq!((bytes.len() - header.data_offset) as u64, meta.num_bytes());
        assert!(bytes[header.data_offset..].iter().all(|b| *b == 0));
    }

    #[test]
    fn sync_parent_opens_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(record_file_name("a"));
        sync_parent(&path).unwrap();
    }

    #[test]
    fn temp_names_carry_the_writer_pid() {
        let tmp = temp_path(Path::new("/store/entries/61.imgd"));
        let name = tmp.file_name().unwrap().to_str().unwrap();
        assert_eq!(temp_owner(name), Some(std::process::id()));
        assert_eq!(temp_owner("61.imgd.4242.17.tmp"), Some(4242));
        assert_eq!(temp_owner("61.imgd.tmp"), None);
        assert_eq!(temp_owner("61.imgd.x.1.tmp"), None);
        assert_eq!(temp_owner("61.imgd"), None);
    }
}
