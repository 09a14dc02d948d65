//! Database image: 8-byte header followed by self-delimiting pipeline records.
//!
//! Header (native-endian):
//!   total_size[4]   = header + sum(record.total_size)
//!   record_count[4]
//!
//! `total_size` is only known after every record has been written, so the
//! writer emits a provisional header and backpatches that one field at the end.
//! Files are written through a temp file in the destination directory and
//! atomically persisted; a failed dump leaves the destination untouched.

use crate::consts::{IMAGE_HEADER_SIZE, IMG_OFF_RECORD_COUNT, IMG_OFF_TOTAL_SIZE, REC_OFF_TOTAL_SIZE, RECORD_HEADER_SIZE};
use crate::errors::{PipeDbError, Result};
use crate::record::PipelineView;
use crate::utils::{get_u32, write_u32};
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
fn fsync_dir(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let f = std::fs::OpenOptions::new().read(true).custom_flags(libc::O_DIRECTORY).open(dir)?;
    f.sync_all()
}
#[cfg(not(unix))]
fn fsync_dir(_path: &Path) -> std::io::Result<()> { Ok(()) }

/// Streams records into `W`, then backpatches the header's `total_size`.
pub struct ImageWriter<W: Write + Seek> {
    out: W,
    start: u64,
    declared: u32,
    written: u32,
    len: u64,
}

impl<W: Write + Seek> ImageWriter<W> {
    /// Writes the provisional header (`total_size = 0`).
    pub fn new(mut out: W, record_count: u32) -> Result<Self> {
        let start = out.stream_position()?;
        write_u32(&mut out, 0)?;
        write_u32(&mut out, record_count)?;
        Ok(Self { out, start, declared: record_count, written: 0, len: IMAGE_HEADER_SIZE as u64 })
    }

    /// Append one encoded record verbatim.
    pub fn append(&mut self, record: &[u8]) -> Result<()> {
        if self.written == self.declared {
            return Err(PipeDbError::corrupt(format!("more than {} records appended", self.declared)));
        }
        self.out.write_all(record)?;
        self.len += record.len() as u64;
        self.written += 1;
        Ok(())
    }

    /// Backpatch `total_size` and hand the sink back, positioned at the image end.
    pub fn finish(mut self) -> Result<W> {
        if self.written != self.declared {
            return Err(PipeDbError::corrupt(format!(
                "declared {} records, wrote {}",
                self.declared, self.written
            )));
        }
        let total = u32::try_from(self.len)
            .map_err(|_| PipeDbError::corrupt(format!("image of {} bytes exceeds u32", self.len)))?;
        self.out.seek(SeekFrom::Start(self.start + IMG_OFF_TOTAL_SIZE as u64))?;
        write_u32(&mut self.out, total)?;
        self.out.seek(SeekFrom::Start(self.start + self.len))?;
        self.out.flush()?;
        debug!(records = self.written, total_size = total, "image written");
        Ok(self.out)
    }
}

/// Write all `records` as one image into `out`.
pub fn write_image<'r, W, I>(out: W, records: I) -> Result<W>
where
    W: Write + Seek,
    I: IntoIterator<Item = &'r [u8]>,
    I::IntoIter: ExactSizeIterator,
{
    let records = records.into_iter();
    let count = u32::try_from(records.len())
        .map_err(|_| PipeDbError::corrupt("too many records for one image"))?;
    let mut w = ImageWriter::new(out, count)?;
    for r in records {
        w.append(r)?;
    }
    w.finish()
}

pub fn encode_image<'r, I>(records: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'r [u8]>,
    I::IntoIter: ExactSizeIterator,
{
    Ok(write_image(Cursor::new(Vec::new()), records)?.into_inner())
}

/// Atomically publish an image at `path`.
pub fn write_image_to_file<'r, I>(path: impl AsRef<Path>, records: I) -> Result<PathBuf>
where
    I: IntoIterator<Item = &'r [u8]>,
    I::IntoIter: ExactSizeIterator,
{
    let path_final = path.as_ref().to_path_buf();
    let dir = match path_final.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new().prefix("pipedb_").tempfile_in(dir)?;
    let tmp = write_image(tmp, records)?;
    tmp.as_file().sync_all()?;
    tmp.persist(&path_final)?;
    let _ = fsync_dir(&path_final);
    Ok(path_final)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageHeader {
    pub total_size: u32,
    pub record_count: u32,
}

impl ImageHeader {
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < IMAGE_HEADER_SIZE {
            return Err(PipeDbError::corrupt(format!("image header truncated ({} bytes)", bytes.len())));
        }
        let hdr = Self {
            total_size: get_u32(bytes, IMG_OFF_TOTAL_SIZE),
            record_count: get_u32(bytes, IMG_OFF_RECORD_COUNT),
        };
        if (hdr.total_size as usize) < IMAGE_HEADER_SIZE {
            return Err(PipeDbError::corrupt(format!("bad image size {}", hdr.total_size)));
        }
        if hdr.total_size as usize > bytes.len() {
            return Err(PipeDbError::corrupt(format!(
                "image declares {} bytes, buffer has {}",
                hdr.total_size,
                bytes.len()
            )));
        }
        Ok(hdr)
    }
}

/// Location of one record inside an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub name: String,
    pub offset: usize,
    pub len: usize,
}

/// Walks an image buffer using each record's self-declared size.
pub struct ImageReader<'a> {
    bytes: &'a [u8],
    header: ImageHeader,
}

impl<'a> ImageReader<'a> {
    /// Bytes past the declared `total_size` are ignored.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        let header = ImageHeader::read(bytes)?;
        Ok(Self { bytes: &bytes[..header.total_size as usize], header })
    }

    pub fn header(&self) -> ImageHeader { self.header }
    pub fn as_bytes(&self) -> &'a [u8] { self.bytes }

    pub fn records(&self) -> RecordIter<'a> {
        RecordIter { bytes: self.bytes, pos: IMAGE_HEADER_SIZE, remaining: self.header.record_count, failed: false }
    }

    /// Walk every record and check the image is fully and exactly covered.
    pub fn entries(&self) -> Result<Vec<RecordEntry>> {
        let mut out = Vec::with_capacity(self.header.record_count as usize);
        let mut end = IMAGE_HEADER_SIZE;
        for rec in self.records() {
            let (offset, view) = rec?;
            end = offset + view.as_bytes().len();
            let name = std::str::from_utf8(view.name_bytes())
                .map_err(|_| PipeDbError::corrupt(format!("record at {offset} has a non-UTF-8 name")))?;
            out.push(RecordEntry { name: name.to_string(), offset, len: view.as_bytes().len() });
        }
        if end != self.bytes.len() {
            return Err(PipeDbError::corrupt(format!(
                "records end at {end}, image declares {}",
                self.bytes.len()
            )));
        }
        Ok(out)
    }
}

pub struct RecordIter<'a> {
    bytes: &'a [u8],
    pos: usize,
    remaining: u32,
    failed: bool,
}

impl<'a> Iterator for RecordIter<'a> {
    type Item = Result<(usize, PipelineView<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.failed {
            return None;
        }
        self.remaining -= 1;
        let pos = self.pos;
        let rest = &self.bytes[pos..];
        if rest.len() < RECORD_HEADER_SIZE {
            self.failed = true;
            return Some(Err(PipeDbError::corrupt(format!("record at {pos} truncated"))));
        }
        let size = get_u32(rest, REC_OFF_TOTAL_SIZE) as usize;
        if size > rest.len() {
            self.failed = true;
            return Some(Err(PipeDbError::corrupt(format!("record at {pos} overruns image"))));
        }
        match PipelineView::new(&rest[..size]) {
            Ok(view) => {
                self.pos += size;
                Some(Ok((pos, view)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::Arena;
    use crate::record::RecordWriter;
    use crate::vk::StageKind;

    fn two_records(arena: &mut Arena) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for (name, n) in [("a", 8usize), ("b", 20)] {
            let mut w = RecordWriter::begin(arena).unwrap();
            w.set_name(name);
            w.append_stage(StageKind::Vertex, &vec![0x0723_0203; n / 4]).unwrap();
            let span = w.finish();
            out.push(arena.bytes(span).to_vec());
        }
        out
    }

    #[test]
    fn header_is_backpatched() {
        let mut arena = Arena::with_capacity(4096);
        let recs = two_records(&mut arena);
        let img = encode_image(recs.iter().map(|r| r.as_slice())).unwrap();
        let hdr = ImageHeader::read(&img).unwrap();
        assert_eq!(hdr.record_count, 2);
        assert_eq!(hdr.total_size as usize, img.len());
        assert_eq!(img.len(), IMAGE_HEADER_SIZE + recs[0].len() + recs[1].len());
        // records are copied verbatim
        assert_eq!(&img[IMAGE_HEADER_SIZE..IMAGE_HEADER_SIZE + recs[0].len()], &recs[0][..]);

        let entries = ImageReader::new(&img).unwrap().entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "b");
        assert_eq!(entries[1].offset, IMAGE_HEADER_SIZE + recs[0].len());
    }

    #[test]
    fn writer_at_nonzero_stream_offset() {
        let mut cur = Cursor::new(Vec::new());
        cur.write_all(b"PAD!").unwrap();
        let cur = write_image(cur, std::iter::empty::<&[u8]>()).unwrap();
        let buf = cur.into_inner();
        assert_eq!(&buf[..4], b"PAD!");
        assert_eq!(ImageHeader::read(&buf[4..]).unwrap(), ImageHeader { total_size: 8, record_count: 0 });
    }

    #[test]
    fn record_count_must_match() {
        let w = ImageWriter::new(Cursor::new(Vec::new()), 1).unwrap();
        assert!(matches!(w.finish(), Err(PipeDbError::CorruptImage(_))));
        let mut w = ImageWriter::new(Cursor::new(Vec::new()), 0).unwrap();
        assert!(w.append(&[0u8; 192]).is_err());
    }

    #[test]
    fn corrupt_images_are_rejected() {
        let mut arena = Arena::with_capacity(4096);
        let recs = two_records(&mut arena);
        let img = encode_image(recs.iter().map(|r| r.as_slice())).unwrap();

        assert!(ImageReader::new(&img[..4]).is_err());
        assert!(ImageReader::new(&img[..img.len() - 4]).is_err());

        // claim one more record than present
        let mut bad = img.clone();
        crate::utils::put_u32(&mut bad, IMG_OFF_RECORD_COUNT, 3);
        assert!(ImageReader::new(&bad).unwrap().entries().is_err());

        // claim one fewer: trailing bytes are not covered
        let mut bad = img.clone();
        crate::utils::put_u32(&mut bad, IMG_OFF_RECORD_COUNT, 1);
        assert!(ImageReader::new(&bad).unwrap().entries().is_err());

        // first record claims to run past the image
        let mut bad = img.clone();
        crate::utils::put_u32(&mut bad, IMAGE_HEADER_SIZE, 4096);
        assert!(ImageReader::new(&bad).unwrap().entries().is_err());
    }

    #[test]
    fn non_utf8_names_are_rejected() {
        let mut arena = Arena::with_capacity(4096);
        let recs = two_records(&mut arena);
        let mut img = encode_image(recs.iter().map(|r| r.as_slice())).unwrap();
        // "b" followed by a lone continuation byte
        img[IMAGE_HEADER_SIZE + recs[0].len() + crate::consts::REC_OFF_NAME + 1] = 0x80;
        let err = ImageReader::new(&img).unwrap().entries().unwrap_err();
        assert!(matches!(err, PipeDbError::CorruptImage(ref m) if m.contains("non-UTF-8")), "{err}");
    }

    #[test]
    fn file_publish_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let mut arena = Arena::with_capacity(4096);
        let recs = two_records(&mut arena);
        let path = dir.path().join("db.bin");
        write_image_to_file(&path, recs.iter().map(|r| r.as_slice())).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(ImageHeader::read(&bytes).unwrap().total_size as usize, bytes.len());

        // destination directory missing: nothing is created
        let missing = dir.path().join("nope").join("db.bin");
        assert!(write_image_to_file(&missing, recs.iter().map(|r| r.as_slice())).is_err());
        assert!(!missing.exists());
        // no temp files left behind
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
