use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use rkyv::{Archive, Deserialize as RkyvDeserialize, Serialize as RkyvSerialize};
use rkyv::{AlignedVec, Deserialize};
use tracing::warn;

// Refuse to allocate for a corrupt length prefix.
const MAX_ENTRY_SIZE: usize = 16 * 1024 * 1024;

/// One framed write in the segment. Later entries for the same key win.
#[derive(Archive, RkyvDeserialize, RkyvSerialize, Debug, Clone, PartialEq)]
#[archive(check_bytes)]
pub struct Entry {
    pub key: String,
    /// Embedding payload; empty for JSON-only entries.
    pub vector: Vec<f32>,
    pub payload: Vec<u8>,
    /// When the entry was written (ms since epoch).
    pub tx_time: u64,
}

impl Entry {
    pub fn json(key: String, payload: Vec<u8>, tx_time: u64) -> Self {
        Self { key, vector: Vec::new(), payload, tx_time }
    }
}

/// Append-only log file: `[Length (4b)][rkyv Entry (N bytes)]*`.
#[derive(Debug)]
pub struct Segment {
    pub file_path: PathBuf,
    file: File,
    strict: bool,
    current_offset: u64,
}

impl Segment {
    /// Opens (or creates) the segment. A torn tail left by a crash is cut off.
    pub fn new(path: &Path, strict: bool) -> io::Result<Self> {
        let file = OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)?;

        let mut segment = Self {
            file_path: path.to_path_buf(),
            file,
            strict,
            current_offset: 0,
        };

        let len = segment.file.metadata()?.len();
        let valid_end = segment.scan_valid_end(len)?;
        if valid_end < len {
            warn!(path = %path.display(), valid_end, len, "truncating torn segment tail");
            segment.file.set_len(valid_end)?;
        }
        segment.current_offset = valid_end;
        Ok(segment)
    }

    fn scan_valid_end(&self, len: u64) -> io::Result<u64> {
        let mut offset = 0;
        while offset < len {
            match self.read_framed(offset) {
                Ok((_, next)) if next <= len => offset = next,
                _ => break,
            }
        }
        Ok(offset)
    }

    fn encode(entry: &Entry) -> io::Result<AlignedVec> {
        rkyv::to_bytes::<_, 4096>(entry)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }

    /// Appends one entry and returns its offset.
    pub fn append(&mut self, entry: &Entry) -> io::Result<u64> {
        let offsets = self.append_batch(std::slice::from_ref(entry))?;
        Ok(offsets[0])
    }

    /// Appends entries with a single write and a single sync.
    pub fn append_batch(&mut self, entries: &[Entry]) -> io::Result<Vec<u64>> {
        let mut buf = Vec::new();
        let mut offsets = Vec::with_capacity(entries.len());
        for entry in entries {
            let bytes = Self::encode(entry)?;
            offsets.push(self.current_offset + buf.len() as u64);
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&bytes);
        }

        // Bytes past the last committed frame belong to a failed write.
        let file_len = self.file.metadata()?.len();
        if file_len != self.current_offset {
            warn!(path = %self.file_path.display(), committed = self.current_offset, file_len, "cutting uncommitted bytes");
            self.file.set_len(self.current_offset)?;
        }

        if let Err(e) = self.write_durable(&buf) {
            if let Err(cut) = self.file.set_len(self.current_offset) {
                warn!(path = %self.file_path.display(), error = %cut, "could not roll back partial write");
            }
            return Err(e);
        }
        self.current_offset += buf.len() as u64;
        Ok(offsets)
    }

    fn write_durable(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)?;
        if self.strict {
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn read(&self, offset: u64) -> io::Result<Entry> {
        self.read_framed(offset).map(|(entry, _)| entry)
    }

    /// Every entry in write order, with its offset.
    pub fn scan(&self) -> io::Result<Vec<(u64, Entry)>> {
        let mut out = Vec::new();
        let mut offset = 0;
        while offset < self.current_offset {
            let (entry, next) = self.read_framed(offset)?;
            out.push((offset, entry));
            offset = next;
        }
        Ok(out)
    }

    pub fn len_bytes(&self) -> u64 {
        self.current_offset
    }

    fn read_framed(&self, offset: u64) -> io::Result<(Entry, u64)> {
        // Clone file handle for the read; appends ignore the cursor
        let mut file = self.file.try_clone()?;
        file.seek(SeekFrom::Start(offset))?;

        let mut len_buf = [0u8; 4];
        file.read_exact(&mut len_buf)?;
        let len = u32::from_le_bytes(len_buf) as usize;
        if len > MAX_ENTRY_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, format!("entry length {} too large", len)));
        }

        let mut bytes = vec![0u8; len];
        file.read_exact(&mut bytes)?;

        let mut aligned = AlignedVec::with_capacity(len);
        aligned.extend_from_slice(&bytes);

        let archived = rkyv::check_archived_root::<Entry>(&aligned[..])
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{:?}", e)))?;
        let entry: Entry = archived
        .deserialize(&mut rkyv::Infallible)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "undecodable entry"))?;

        Ok((entry, offset + 4 + len as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let mut seg = Segment::new(&path, false).unwrap();

        let a = Entry { key: "k1".into(), vector: vec![0.5, -1.0], payload: b"one".to_vec(), tx_time: 1 };
        let b = Entry::json("k2".into(), b"two".to_vec(), 2);
        let off_a = seg.append(&a).unwrap();
        let offs = seg.append_batch(&[b.clone(), a.clone()]).unwrap();

        assert_eq!(off_a, 0);
        assert_eq!(seg.read(offs[0]).unwrap(), b);
        assert_eq!(seg.read(offs[1]).unwrap(), a);
        assert_eq!(seg.scan().unwrap().len(), 3);
    }

    #[test]
    fn reopen_cuts_torn_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        {
            let mut seg = Segment::new(&path, true).unwrap();
            seg.append(&Entry::json("k".into(), b"v".to_vec(), 1)).unwrap();
        }
        let good_len = std::fs::metadata(&path).unwrap().len();
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[200, 0, 0, 0, 1, 2, 3]).unwrap();
        }

        let seg = Segment::new(&path, false).unwrap();
        assert_eq!(seg.len_bytes(), good_len);
        assert_eq!(seg.scan().unwrap().len(), 1);
    }

    #[test]
    fn append_after_partial_write_keeps_offsets_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.dat");
        let mut seg = Segment::new(&path, false).unwrap();
        let first = Entry::json("k1".into(), b"one".to_vec(), 1);
        seg.append(&first).unwrap();

        // Half a frame left behind by a write that errored out.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[64, 0, 0, 0, 9, 9]).unwrap();
        }

        let second = Entry::json("k2".into(), b"two".to_vec(), 2);
        let off = seg.append(&second).unwrap();
        assert_eq!(seg.read(off).unwrap(), second);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), seg.len_bytes());

        let entries: Vec<Entry> = seg.scan().unwrap().into_iter().map(|(_, e)| e).collect();
        assert_eq!(entries, vec![first, second]);
    }
}
