//! Binary index format.
//!
//! Layout: `[magic: 8][version: u32][crc32: u32][payload_len: u64][payload]`,
//! integers little-endian. The payload is a bincode-encoded `IndexSnapshot`
//! and the CRC covers the payload only.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{IvfError, Result};
use crate::index::IvfFlatIndex;
use crate::persistence::serialization::{self, IndexSnapshot};

const MAGIC: &[u8; 8] = b"IVFFLAT\0";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 24;

/// Write `index` to `writer`.
pub fn save<W: Write>(index: &IvfFlatIndex, mut writer: W) -> Result<()> {
    let payload = serialization::to_bincode(&IndexSnapshot::capture(index))?;
    let crc = crc32fast::hash(&payload);

    writer.write_all(MAGIC)?;
    writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
    writer.write_all(&crc.to_le_bytes())?;
    writer.write_all(&(payload.len() as u64).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.flush()?;

    tracing::debug!(bytes = HEADER_SIZE + payload.len(), "saved index");
    Ok(())
}

/// Read an index previously written by [`save`].
pub fn load<R: Read>(mut reader: R) -> Result<IvfFlatIndex> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact_or_corrupt(&mut reader, &mut header, "header")?;
    let (crc, len) = decode_header(&header)?;

    let len = usize::try_from(len).map_err(|_| IvfError::corrupt("payload too large"))?;
    let mut payload = Vec::new();
    reader.take(len as u64).read_to_end(&mut payload)?;
    if payload.len() != len {
        return Err(IvfError::corrupt(format!(
            "truncated payload: expected {} bytes, got {}",
            len,
            payload.len()
        )));
    }

    decode_payload(&payload, crc)
}

/// Serialize an index into an in-memory buffer.
pub fn to_bytes(index: &IvfFlatIndex) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    save(index, &mut buf)?;
    Ok(buf)
}

/// Deserialize an index from a complete buffer. Trailing bytes are rejected.
pub fn from_bytes(bytes: &[u8]) -> Result<IvfFlatIndex> {
    if bytes.len() < HEADER_SIZE {
        return Err(IvfError::corrupt("truncated header"));
    }
    let (header, rest) = bytes.split_at(HEADER_SIZE);
    let (crc, len) = decode_header(header)?;
    if rest.len() as u64 != len {
        return Err(IvfError::corrupt(format!(
            "declared payload of {} bytes, found {}",
            len,
            rest.len()
        )));
    }
    decode_payload(rest, crc)
}

/// Save an index to a file, replacing any existing content.
pub fn save_file(index: &IvfFlatIndex, path: impl AsRef<Path>) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path.as_ref())?;
    let mut writer = BufWriter::new(file);
    save(index, &mut writer)?;
    writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    tracing::info!(path = %path.as_ref().display(), size = index.len(), "index written");
    Ok(())
}

/// Load an index from a file, memory-mapping it when possible.
pub fn load_file(path: impl AsRef<Path>) -> Result<IvfFlatIndex> {
    let path = path.as_ref();
    let file = File::open(path)?;

    // Safety: the mapping is read-only and dropped before returning; the file
    // must not be truncated by another process while it is being decoded.
    let index = match unsafe { memmap2::Mmap::map(&file) } {
        Ok(mmap) => from_bytes(&mmap)?,
        Err(e) => {
            tracing::debug!(error = %e, "mmap failed, falling back to buffered read");
            load(BufReader::new(file))?
        }
    };

    tracing::info!(path = %path.display(), size = index.len(), "index loaded");
    Ok(index)
}

fn decode_header(header: &[u8]) -> Result<(u32, u64)> {
    if &header[0..8] != MAGIC {
        return Err(IvfError::corrupt("bad magic: not an IVF-Flat index"));
    }
    let version = u32::from_le_bytes(le_bytes(&header[8..12])?);
    if version != FORMAT_VERSION {
        return Err(IvfError::corrupt(format!(
            "unsupported format version {}",
            version
        )));
    }
    let crc = u32::from_le_bytes(le_bytes(&header[12..16])?);
    let len = u64::from_le_bytes(le_bytes(&header[16..24])?);
    Ok((crc, len))
}

fn decode_payload(payload: &[u8], expected_crc: u32) -> Result<IvfFlatIndex> {
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        return Err(IvfError::corrupt(format!(
            "checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }
    let snapshot: IndexSnapshot = serialization::from_bincode(payload)?;
    snapshot.restore()
}

fn le_bytes<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| IvfError::corrupt("truncated header"))
}

fn read_exact_or_corrupt<R: Read>(reader: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(IvfError::corrupt(format!("truncated {}", what)))
        }
        Err(e) => Err(IvfError::IoError(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distance::DistanceMetric;
    use crate::params::IndexParams;
    use crate::resources::Resources;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn sample_index() -> IvfFlatIndex {
        let res = Resources::new().unwrap();
        let data = Array2::from_shape_fn((30, 3), |(i, j)| ((i * 13 + j * 5) % 29) as f32 * 0.5);
        let params = IndexParams::new(3, DistanceMetric::Cosine).with_trainset_fraction(1.0);
        IvfFlatIndex::build(&res, &params, data.view()).unwrap()
    }

    #[test]
    fn test_bytes_roundtrip() {
        let index = sample_index();
        let bytes = to_bytes(&index).unwrap();
        assert_eq!(&bytes[..8], MAGIC);

        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_stream_roundtrip() {
        let index = sample_index();
        let bytes = to_bytes(&index).unwrap();
        let loaded = load(bytes.as_slice()).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.ivf");
        let index = sample_index();

        save_file(&index, &path).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn test_flipped_payload_byte_is_corrupt() {
        let mut bytes = to_bytes(&sample_index()).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(from_bytes(&bytes), Err(IvfError::CorruptData(_))));
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = to_bytes(&sample_index()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(from_bytes(&bytes), Err(IvfError::CorruptData(_))));

        let mut bytes = to_bytes(&sample_index()).unwrap();
        bytes[8] = 9;
        assert!(matches!(from_bytes(&bytes), Err(IvfError::CorruptData(_))));
    }

    #[test]
    fn test_truncated_stream() {
        let bytes = to_bytes(&sample_index()).unwrap();
        for cut in [0, 10, HEADER_SIZE, bytes.len() - 1] {
            assert!(
                matches!(load(&bytes[..cut]), Err(IvfError::CorruptData(_))),
                "cut at {}",
                cut
            );
            assert!(matches!(from_bytes(&bytes[..cut]), Err(IvfError::CorruptData(_))));
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            load_file(dir.path().join("absent.ivf")),
            Err(IvfError::IoError(_))
        ));
    }
}
