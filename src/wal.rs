use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::model::LedgerRecord;

const LEN_BYTES: u64 = 4;
const CRC_BYTES: u64 = 4;

/// One frame: `[u32 le: payload len][bincode payload][u32 le: crc32 of payload]`.
fn encode_frame(record: &LedgerRecord) -> io::Result<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "ledger record too large"))?;
    let mut frame = Vec::with_capacity(payload.len() + (LEN_BYTES + CRC_BYTES) as usize);
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(&payload);
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    Ok(frame)
}

/// Fill `buf` completely. `Ok(false)` means the input ended first.
fn fill(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Sequential reader over ledger frames.
///
/// Stops at the end of input or at the first frame that is cut short, fails
/// its checksum or does not decode. `valid_len` is the byte length of the
/// frames accepted so far.
pub struct LedgerReader<R> {
    inner: R,
    valid_len: u64,
}

impl<R: Read> LedgerReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            valid_len: 0,
        }
    }

    pub fn valid_len(&self) -> u64 {
        self.valid_len
    }

    pub fn next_record(&mut self) -> io::Result<Option<LedgerRecord>> {
        let mut len_buf = [0u8; LEN_BYTES as usize];
        if !fill(&mut self.inner, &mut len_buf)? {
            return Ok(None);
        }
        let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
        let mut crc_buf = [0u8; CRC_BYTES as usize];
        if !fill(&mut self.inner, &mut payload)? || !fill(&mut self.inner, &mut crc_buf)? {
            return Ok(None);
        }
        if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
            return Ok(None);
        }
        let Ok(record) = bincode::deserialize::<LedgerRecord>(&payload) else {
            return Ok(None);
        };
        self.valid_len += LEN_BYTES + payload.len() as u64 + CRC_BYTES;
        Ok(Some(record))
    }

    /// Read every remaining good record.
    pub fn read_all(&mut self) -> io::Result<Vec<LedgerRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}

/// Append-only booking ledger on disk. Entries are never rewritten; the file
/// is the full commit history in commit order.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends: u64,
}

impl Wal {
    /// Open (or create) the ledger for appending. A damaged tail left by a
    /// crash is cut off first so new frames follow the last good one.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let valid_len = {
            let mut reader = LedgerReader::new(BufReader::new(&file));
            reader.read_all()?;
            reader.valid_len()
        };
        let file_len = file.metadata()?.len();
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                discarded_bytes = file_len - valid_len,
                "truncating damaged ledger tail"
            );
            file.set_len(valid_len)?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends: 0,
        })
    }

    /// Buffer one record. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, record: &LedgerRecord) -> io::Result<()> {
        self.writer.write_all(&encode_frame(record)?)?;
        self.appends += 1;
        Ok(())
    }

    /// Flush buffered frames and fsync the file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn appends(&self) -> u64 {
        self.appends
    }

    /// All good records in commit order. A missing file is an empty ledger.
    pub fn replay(path: &Path) -> io::Result<Vec<LedgerRecord>> {
        match File::open(path) {
            Ok(file) => LedgerReader::new(BufReader::new(file)).read_all(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Booking, Metadata};
    use std::fs;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("stagegate_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn record(entity: u64, stage: &str, arrival: i64) -> LedgerRecord {
        LedgerRecord::BookingCommitted {
            booking: Booking::new(entity, stage.into(), arrival, arrival, 30, Metadata::new("A1")),
            new_entity: stage == "Admission",
        }
    }

    fn write(path: &Path, records: &[LedgerRecord]) {
        let mut wal = Wal::open(path).unwrap();
        for r in records {
            wal.append_buffered(r).unwrap();
        }
        wal.flush_sync().unwrap();
        assert_eq!(wal.appends(), records.len() as u64);
    }

    #[test]
    fn append_and_replay_in_commit_order() {
        let path = tmp_path("append_and_replay.wal");
        let records = vec![record(1, "Admission", 480), record(1, "Intake", 490)];
        write(&path, &records);
        assert_eq!(Wal::replay(&path).unwrap(), records);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("does_not_exist.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn reopen_appends_after_existing() {
        let path = tmp_path("reopen.wal");
        write(&path, &[record(1, "Admission", 10)]);
        write(&path, &[record(2, "Admission", 20)]);
        assert_eq!(Wal::replay(&path).unwrap().len(), 2);
    }

    #[test]
    fn truncated_tail_is_discarded() {
        let path = tmp_path("truncated.wal");
        write(&path, &[record(1, "Admission", 10), record(2, "Admission", 20)]);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![record(1, "Admission", 10)]);
    }

    #[test]
    fn corrupt_crc_stops_replay() {
        let path = tmp_path("corrupt_crc.wal");
        write(&path, &[record(1, "Admission", 10), record(2, "Admission", 20)]);
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert_eq!(Wal::replay(&path).unwrap().len(), 1);
    }

    #[test]
    fn open_cuts_damaged_tail_before_appending() {
        let path = tmp_path("reopen_after_crash.wal");
        write(&path, &[record(1, "Admission", 10), record(2, "Admission", 20)]);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 5]).unwrap();

        write(&path, &[record(3, "Admission", 30)]);
        assert_eq!(
            Wal::replay(&path).unwrap(),
            vec![record(1, "Admission", 10), record(3, "Admission", 30)]
        );
    }

    #[test]
    fn reader_reports_valid_length() {
        let path = tmp_path("valid_len.wal");
        write(&path, &[record(1, "Admission", 10)]);
        let full = fs::metadata(&path).unwrap().len();
        let mut bytes = fs::read(&path).unwrap();
        bytes.extend_from_slice(&[7, 0, 0]);

        let mut reader = LedgerReader::new(bytes.as_slice());
        assert_eq!(reader.read_all().unwrap().len(), 1);
        assert_eq!(reader.valid_len(), full);
    }
}
