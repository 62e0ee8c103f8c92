use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Bytes of framing around each payload: length prefix + CRC trailer.
const FRAME_OVERHEAD: u64 = 8;

/// Larger length prefixes are treated as corruption rather than allocated.
const MAX_RECORD_LEN: u32 = 16 * 1024 * 1024;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes; `Ok(false)` on a clean or torn EOF.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Result of scanning a log file.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte length of the valid prefix. Anything after it is a torn or corrupt tail.
    pub valid_len: u64,
}

/// Append-only write-ahead log of [`Event`]s.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// A torn last entry (crash mid-write) or a CRC mismatch ends replay, and
/// [`Wal::open`] cuts the file back to the last good entry before appending.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, truncating any invalid tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let replay = Self::replay(path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() > replay.valid_len {
            tracing::warn!(
                "truncating WAL {} to {} bytes (discarding invalid tail)",
                path.display(),
                replay.valid_len
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }
        drop(file);
        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one event and fsync. Production code batches with
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a compacted event set to a sibling temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::tmp_path(path))?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Scan the log, returning every valid event and the length of the valid prefix.
    /// A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf);
            if len > MAX_RECORD_LEN {
                break;
            }

            let mut payload = vec![0u8; len as usize];
            if !read_frame_part(&mut reader, &mut payload)? {
                break;
            }

            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => replay.events.push(event),
                Err(_) => break,
            }
            replay.valid_len += u64::from(len) + FRAME_OVERHEAD;
        }

        Ok(replay)
    }
}
