use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Magic bytes at the start of every journal file: name plus format version.
pub const HEADER: &[u8; 6] = b"PBWAL\x01";

/// Bytes of framing around each payload: length prefix and CRC trailer.
const FRAME_OVERHEAD: u64 = 8;

/// Larger length prefixes are treated as corruption rather than allocated.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Encode a single event as `[len][bincode][crc32]`. Returns the frame size.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(u64::from(len) + FRAME_OVERHEAD)
}

/// Read one frame. `Ok(None)` marks the end of the usable log: clean EOF, a
/// torn write, a CRC mismatch, or an undecodable payload.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_fully(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    if !read_fully(reader, &mut payload)? {
        return Ok(None);
    }

    let mut crc_buf = [0u8; 4];
    if !read_fully(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }

    match bincode::deserialize::<Event>(&payload) {
        Ok(event) => Ok(Some((event, len as u64 + FRAME_OVERHEAD))),
        Err(_) => Ok(None),
    }
}

/// `read_exact` that reports a short read as `false` instead of an error.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Every intact event in the file plus the byte offset where they end.
/// A missing file reads as empty.
fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
        Err(e) => return Err(e),
    };
    let mut reader = BufReader::new(file);

    let mut header = [0u8; HEADER.len()];
    if !read_fully(&mut reader, &mut header)? {
        // Crashed while writing the header: nothing was ever committed.
        return Ok((Vec::new(), 0));
    }
    if &header != HEADER {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not a placebook journal", path.display()),
        ));
    }

    let mut events = Vec::new();
    let mut valid_len = HEADER.len() as u64;
    while let Some((event, frame_len)) = read_frame(&mut reader)? {
        events.push(event);
        valid_len += frame_len;
    }
    Ok((events, valid_len))
}

/// Append-only journal of state transitions.
///
/// File layout: `HEADER`, then one frame per event:
/// `[u32 le: len][bincode: Event][u32 le: crc32 of payload]`.
/// A torn or corrupt tail is dropped on replay and cut off on open, so new
/// appends never land behind garbage. A failed flush is rolled back to the
/// last synced length, so an event whose caller saw an error never replays.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length covered by the last successful `flush_sync`.
    synced_len: u64,
    /// Bytes and events buffered since then.
    pending_len: u64,
    pending_appends: u64,
    /// Set when a rollback itself failed; the file tail is then unknown.
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the journal at `path`, truncating any invalid tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (_, valid_len) = scan(path)?;
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        if file.metadata()?.len() != valid_len {
            file.set_len(valid_len)?;
        }
        let mut writer = BufWriter::new(file);
        if valid_len == 0 {
            writer.write_all(HEADER)?;
        }
        let synced_len = writer.seek(SeekFrom::End(0))?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            appends_since_compact: 0,
            synced_len,
            pending_len: 0,
            pending_appends: 0,
            poisoned: false,
        })
    }

    /// Append one event and fsync. The group-commit writer uses
    /// `append_buffered` + `flush_sync` instead.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without flushing. Durable only after `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other("journal tail is in an unknown state"));
        }
        self.pending_len += encode_event(&mut self.writer, event)?;
        self.pending_appends += 1;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.synced_len += self.pending_len;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Drop everything appended since the last successful `flush_sync`,
    /// whether it is still buffered or already reached the file. If the
    /// truncate fails the journal refuses further appends.
    pub fn rollback(&mut self) -> io::Result<()> {
        let result = self.truncate_to_synced();
        self.appends_since_compact -= self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn truncate_to_synced(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        // The old writer may push its buffer out on drop; the truncate below
        // removes those bytes.
        drop(std::mem::replace(&mut self.writer, BufWriter::new(file)));
        self.writer.get_ref().set_len(self.synced_len)?;
        self.writer.seek(SeekFrom::Start(self.synced_len))?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write a complete replacement journal next to `path` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let file = File::create(Self::compact_path(path))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(HEADER)?;
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the replacement over the live journal and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_path(&self.path), &self.path)?;
        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.synced_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// All intact events, in append order.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        scan(path).map(|(events, _)| events)
    }
}
