use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Write one record: `[u32 payload len][bincode payload][u32 crc32]`,
/// all little endian. The length covers the payload only, not the CRC.
fn write_frame(out: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload = bincode::serialize(event).map_err(io::Error::other)?;
    out.write_all(&(payload.len() as u32).to_le_bytes())?;
    out.write_all(&payload)?;
    out.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read one record, or `None` at a clean end of file. A torn write or a
/// CRC mismatch also yields `None`: everything from the damaged record on
/// is dropped, since nothing after it can be trusted either.
fn read_frame(input: &mut impl Read) -> io::Result<Option<Event>> {
    let Some(len_bytes) = read_exact_or_eof::<4>(input)? else {
        return Ok(None);
    };
    let mut payload = vec![0u8; u32::from_le_bytes(len_bytes) as usize];
    match input.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let Some(crc_bytes) = read_exact_or_eof::<4>(input)? else {
        return Ok(None);
    };
    if u32::from_le_bytes(crc_bytes) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize(&payload).ok())
}

fn read_exact_or_eof<const N: usize>(input: &mut impl Read) -> io::Result<Option<[u8; N]>> {
    let mut buf = [0u8; N];
    match input.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("compacting")
}

/// Append-only write-ahead log of engine events.
///
/// Appends go through a `BufWriter`; nothing is durable until `commit`
/// flushes and fsyncs, which lets the writer task amortize one fsync over
/// a whole batch. Compaction stages a rewritten file next to the log and
/// renames it into place.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open the log at `path`, creating it if needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: BufWriter::new(append_handle(path)?),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer one event. Not durable until the next `commit`.
    pub fn buffer(&mut self, event: &Event) -> io::Result<()> {
        write_frame(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered events and fsync the file.
    pub fn commit(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    /// Buffer and commit a single event. Test convenience; the engine's
    /// writer task batches instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.buffer(event)?;
        self.commit()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write `events` to the staging file beside `path` and fsync it.
    /// The slow half of compaction; runs before the log is touched.
    pub fn write_compacted(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(staging_path(path))?);
        for event in events {
            write_frame(&mut out, event)?;
        }
        out.flush()?;
        out.get_ref().sync_all()
    }

    /// Rename the staging file over the log and reopen it. The rename is
    /// atomic, so a crash leaves either the old log or the finished new one.
    pub fn install_compacted(&mut self) -> io::Result<()> {
        fs::rename(staging_path(&self.path), &self.path)?;
        self.writer = BufWriter::new(append_handle(&self.path)?);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Both compaction halves in one call, for tests.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compacted(&self.path, events)?;
        self.install_compacted()
    }

    /// Read every intact event from `path`. A missing file is an empty
    /// log; a damaged tail is cut off silently.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = read_frame(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}

fn append_handle(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}
