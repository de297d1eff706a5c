//! Random-access streams over a file's sectors
//!
//! A GCF file's content is the concatenation of its sectors in logical
//! order, trimmed to the file's declared size. The sectors need not be
//! adjacent, or even in ascending order, in the archive.
//!
//! [`SectorStream`] offers two interfaces:
//!
//! - [`SectorStream::read_bytes`] and [`SectorStream::seek_to`] are strict:
//!   any position outside `[0, item_size]` fails with
//!   [`CacheError::OutOfRange`] and leaves the stream untouched.
//! - The [`Read`] and [`Seek`] implementations behave like std files and
//!   clamp at the end, so the stream can be wrapped in a `BufReader` or
//!   passed to `std::io::copy`.

use std::io::{self, Read, Seek, SeekFrom};
use std::str::FromStr;

use tracing::trace;

use super::data_header::DataHeader;
use super::error::{CacheError, CacheResult};

/// How a file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    /// Bytes are returned unchanged
    #[default]
    Binary,
    /// Carriage returns are removed from everything read
    Text,
}

impl FromStr for OpenMode {
    type Err = CacheError;

    /// Parse a C-style mode string; only read modes are accepted
    fn from_str(mode: &str) -> CacheResult<Self> {
        if !mode.contains('r') || mode.contains(['w', 'a', '+']) {
            return Err(CacheError::UnsupportedMode(mode.to_string()));
        }
        Ok(if mode.contains('b') {
            Self::Binary
        } else {
            Self::Text
        })
    }
}

/// Seekable reader over a file's sector sequence
#[derive(Debug)]
pub struct SectorStream<'a, R> {
    reader: &'a mut R,
    sectors: &'a [u32],
    sector_size: u64,
    data_offset: u64,
    item_size: u64,
    position: u64,
    mode: OpenMode,
}

impl<'a, R: Read + Seek> SectorStream<'a, R> {
    /// Create a stream over `sectors` of the archive behind `reader`
    pub fn new(
        reader: &'a mut R,
        sectors: &'a [u32],
        data_header: &DataHeader,
        item_size: u64,
        mode: OpenMode,
    ) -> Self {
        Self {
            reader,
            sectors,
            sector_size: u64::from(data_header.sector_size),
            data_offset: u64::from(data_header.first_sector_offset),
            item_size,
            position: 0,
            mode,
        }
    }

    /// Declared file size
    pub fn len(&self) -> u64 {
        self.item_size
    }

    /// Whether the file is empty
    pub fn is_empty(&self) -> bool {
        self.item_size == 0
    }

    /// Current position
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Mode the stream was opened with
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Read `size` bytes, or everything up to the end when `size` is 0
    ///
    /// Reading past the end fails without moving the position. In text mode
    /// carriage returns are removed after reading, so the result may be
    /// shorter than `size` while the position still advances by `size`.
    pub fn read_bytes(&mut self, size: usize) -> CacheResult<Vec<u8>> {
        let size = if size == 0 {
            self.item_size - self.position
        } else {
            size as u64
        };
        let Some(end) = self
            .position
            .checked_add(size)
            .filter(|&end| end <= self.item_size)
        else {
            return Err(CacheError::OutOfRange {
                position: i128::from(self.position) + i128::from(size),
                size: self.item_size,
            });
        };

        // Nothing is allocated for content the sectors cannot hold
        let available = self.stored_len();
        if end > available {
            return Err(CacheError::Incomplete {
                position: available.max(self.position),
                available,
            });
        }

        let mut data = vec![0u8; size as usize];
        self.read_at(self.position, &mut data)?;
        self.position = end;

        if self.mode == OpenMode::Text {
            data.retain(|&b| b != b'\r');
        }
        Ok(data)
    }

    /// Read from the current position to the end
    pub fn read_to_end_bytes(&mut self) -> CacheResult<Vec<u8>> {
        self.read_bytes(0)
    }

    /// Move the position, failing if the target is outside the file
    pub fn seek_to(&mut self, pos: SeekFrom) -> CacheResult<u64> {
        let target = self.target(pos);
        if target < 0 || target > i128::from(self.item_size) {
            return Err(CacheError::OutOfRange {
                position: target,
                size: self.item_size,
            });
        }
        self.position = target as u64;
        Ok(self.position)
    }

    /// Writing is not supported; the data is discarded
    pub fn write(&mut self, data: &[u8]) -> usize {
        trace!("discarding {} bytes written to read-only stream", data.len());
        0
    }

    fn target(&self, pos: SeekFrom) -> i128 {
        match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.item_size) + i128::from(delta),
        }
    }

    /// Bytes backed by the file's sectors
    fn stored_len(&self) -> u64 {
        (self.sectors.len() as u64).saturating_mul(self.sector_size)
    }

    /// Fill `buf` with content starting at logical offset `position`
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> CacheResult<()> {
        let available = self.stored_len();
        let mut position = position;
        let mut filled = 0usize;

        while filled < buf.len() {
            let missing = CacheError::Incomplete {
                position,
                available,
            };
            if self.sector_size == 0 {
                return Err(missing);
            }
            let logical = position / self.sector_size;
            let offset = position % self.sector_size;
            let Some(&sector) = self.sectors.get(logical as usize) else {
                return Err(missing);
            };

            let chunk = ((self.sector_size - offset) as usize).min(buf.len() - filled);
            let physical = self.data_offset + u64::from(sector) * self.sector_size + offset;
            self.reader.seek(SeekFrom::Start(physical))?;
            match self.reader.read_exact(&mut buf[filled..filled + chunk]) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(missing),
                Err(e) => return Err(e.into()),
            }

            filled += chunk;
            position += chunk as u64;
        }
        Ok(())
    }
}

impl<R: Read + Seek> Read for SectorStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let remaining = self.item_size - self.position;
            let n = (buf.len() as u64).min(remaining) as usize;
            if n == 0 {
                return Ok(0);
            }

            self.read_at(self.position, &mut buf[..n]).map_err(to_io_error)?;
            self.position += n as u64;

            let kept = match self.mode {
                OpenMode::Binary => n,
                OpenMode::Text => strip_carriage_returns(&mut buf[..n]),
            };
            if kept > 0 {
                return Ok(kept);
            }
        }
    }
}

impl<R: Read + Seek> Seek for SectorStream<'_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = self.target(pos);
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.position = target.min(i128::from(self.item_size)) as u64;
        Ok(self.position)
    }
}

/// An open archive file
pub enum FileHandle<'a, R> {
    /// GCF content served from sectors
    Sector(SectorStream<'a, R>),
    /// NCF content served by the filesystem mirror
    Mirror(Box<dyn Read + 'a>, OpenMode),
}

impl<'a, R: Read + Seek> FileHandle<'a, R> {
    /// Read everything from the current position
    pub fn read_all(&mut self) -> CacheResult<Vec<u8>> {
        match self {
            Self::Sector(stream) => stream.read_to_end_bytes(),
            Self::Mirror(..) => {
                let mut data = Vec::new();
                self.read_to_end(&mut data)?;
                Ok(data)
            }
        }
    }

    /// The sector stream, for GCF files
    pub fn as_sector_stream(&mut self) -> Option<&mut SectorStream<'a, R>> {
        match self {
            Self::Sector(stream) => Some(stream),
            Self::Mirror(..) => None,
        }
    }
}

impl<R: Read + Seek> Read for FileHandle<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Sector(stream) => stream.read(buf),
            Self::Mirror(reader, OpenMode::Binary) => reader.read(buf),
            Self::Mirror(reader, OpenMode::Text) => loop {
                let n = reader.read(buf)?;
                if n == 0 {
                    return Ok(0);
                }
                let kept = strip_carriage_returns(&mut buf[..n]);
                if kept > 0 {
                    return Ok(kept);
                }
            },
        }
    }
}

/// Remove `\r` bytes in place, returning the new length
fn strip_carriage_returns(buf: &mut [u8]) -> usize {
    let mut kept = 0;
    for i in 0..buf.len() {
        if buf[i] != b'\r' {
            buf[kept] = buf[i];
            kept += 1;
        }
    }
    kept
}

fn to_io_error(err: CacheError) -> io::Error {
    match err {
        CacheError::Io(e) => e,
        CacheError::Incomplete { .. } => {
            io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string())
        }
        other => io::Error::other(other.to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::header::CacheHeader;
    use std::io::{BufRead, BufReader, Cursor};

    /// Archive bytes with 4-byte sectors at offset 8; sector `i` holds `fill(i)`
    fn backing(sector_count: u32, fill: impl Fn(u32) -> [u8; 4]) -> (Cursor<Vec<u8>>, DataHeader) {
        let container = CacheHeader::new_gcf(1, 1, 4, sector_count);
        let header = DataHeader::for_container(&container, 8, sector_count);
        let mut data = vec![0xEE; 8];
        for i in 0..sector_count {
            data.extend_from_slice(&fill(i));
        }
        (Cursor::new(data), header)
    }

    fn lettered(i: u32) -> [u8; 4] {
        let base = b'a' + (i as u8) * 4;
        [base, base + 1, base + 2, base + 3]
    }

    #[test]
    fn test_reads_in_logical_order() {
        let (mut reader, header) = backing(3, lettered);
        let sectors = [2, 0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 10, OpenMode::Binary);

        assert_eq!(stream.read_bytes(0).unwrap(), b"ijklabcdef");
        assert_eq!(stream.position(), 10);
    }

    #[test]
    fn test_partial_reads_cross_sectors() {
        let (mut reader, header) = backing(3, lettered);
        let sectors = [2, 0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 10, OpenMode::Binary);

        stream.seek_to(SeekFrom::Start(3)).unwrap();
        assert_eq!(stream.read_bytes(3).unwrap(), b"lab");
        assert_eq!(stream.read_bytes(4).unwrap(), b"cdef");
    }

    #[test]
    fn test_end_of_file() {
        let (mut reader, header) = backing(3, lettered);
        let sectors = [2, 0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 10, OpenMode::Binary);

        assert_eq!(stream.read_bytes(10).unwrap().len(), 10);
        let err = stream.read_bytes(1).unwrap_err();
        assert!(matches!(err, CacheError::OutOfRange { .. }));
        assert_eq!(stream.position(), 10);

        // At the end, "read everything" yields nothing
        assert!(stream.read_bytes(0).unwrap().is_empty());

        assert!(stream.seek_to(SeekFrom::Start(11)).is_err());
        assert_eq!(stream.position(), 10);
        assert!(stream.seek_to(SeekFrom::Current(-11)).is_err());
        assert!(stream.seek_to(SeekFrom::End(1)).is_err());

        // Still usable after the failures
        assert_eq!(stream.seek_to(SeekFrom::End(-2)).unwrap(), 8);
        assert_eq!(stream.read_bytes(0).unwrap(), b"ef");
    }

    #[test]
    fn test_text_mode_strips_carriage_returns() {
        let (mut reader, header) = backing(2, |i| if i == 0 { *b"a\r\nb" } else { *b"\r\nc\r" });
        let sectors = [0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 8, OpenMode::Text);

        assert_eq!(stream.read_bytes(0).unwrap(), b"a\nb\nc");
        assert_eq!(stream.position(), 8);
    }

    #[test]
    fn test_std_traits() {
        let (mut reader, header) = backing(2, |i| if i == 0 { *b"one\r" } else { *b"\ntwo" });
        let sectors = [0, 1];
        let stream = SectorStream::new(&mut reader, &sectors, &header, 8, OpenMode::Text);

        let lines: Vec<String> = BufReader::new(stream).lines().map(Result::unwrap).collect();
        assert_eq!(lines, vec!["one", "two"]);
    }

    #[test]
    fn test_std_seek_clamps() {
        let (mut reader, header) = backing(3, lettered);
        let sectors = [2, 0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 10, OpenMode::Binary);

        assert_eq!(stream.seek(SeekFrom::Start(50)).unwrap(), 10);
        assert!(stream.seek(SeekFrom::Current(-20)).is_err());

        stream.seek(SeekFrom::Start(6)).unwrap();
        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"cdef");
    }

    #[test]
    fn test_missing_sectors() {
        let (mut reader, header) = backing(1, lettered);
        let sectors = [0];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 6, OpenMode::Binary);

        let err = stream.read_bytes(0).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Incomplete {
                position: 4,
                available: 4
            }
        ));
        assert_eq!(stream.position(), 0);
        assert_eq!(stream.read_bytes(4).unwrap(), b"abcd");
    }

    #[test]
    fn test_oversized_read_is_out_of_range() {
        let (mut reader, header) = backing(3, lettered);
        let sectors = [2, 0, 1];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 10, OpenMode::Binary);

        stream.seek_to(SeekFrom::Start(1)).unwrap();
        let err = stream.read_bytes(usize::MAX).unwrap_err();
        assert!(matches!(err, CacheError::OutOfRange { size: 10, .. }));
        assert_eq!(stream.position(), 1);
        assert_eq!(stream.read_bytes(3).unwrap(), b"jkl");
    }

    #[test]
    fn test_declared_size_beyond_sectors() {
        let (mut reader, header) = backing(1, lettered);
        let sectors = [0];
        let size = u64::from(u32::MAX);
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, size, OpenMode::Binary);

        stream.seek_to(SeekFrom::Start(2)).unwrap();
        let err = stream.read_bytes(0).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Incomplete {
                position: 4,
                available: 4
            }
        ));

        stream.seek_to(SeekFrom::Start(100)).unwrap();
        let err = stream.read_bytes(8).unwrap_err();
        assert!(matches!(
            err,
            CacheError::Incomplete {
                position: 100,
                available: 4
            }
        ));
        assert_eq!(stream.position(), 100);
    }

    #[test]
    fn test_write_is_discarded() {
        let (mut reader, header) = backing(1, lettered);
        let sectors = [0];
        let mut stream = SectorStream::new(&mut reader, &sectors, &header, 4, OpenMode::Binary);
        assert_eq!(stream.write(b"xyz"), 0);
        assert_eq!(stream.read_bytes(0).unwrap(), b"abcd");
    }

    #[test]
    fn test_open_modes() {
        assert_eq!("rb".parse::<OpenMode>().unwrap(), OpenMode::Binary);
        assert_eq!("r".parse::<OpenMode>().unwrap(), OpenMode::Text);
        assert_eq!("rt".parse::<OpenMode>().unwrap(), OpenMode::Text);
        assert!("wb".parse::<OpenMode>().is_err());
        assert!("r+b".parse::<OpenMode>().is_err());
    }

    #[test]
    fn test_strip_in_place() {
        let mut buf = *b"\r\ra\rb\r";
        let kept = strip_carriage_returns(&mut buf);
        assert_eq!(&buf[..kept], b"ab");
    }
}
