//! A durable [`Log`] implementation backed by a directory of two flat
//! files: an append-only log of entries encoded in the same `term(8) |
//! index(8) | type(1) | data_len(4) | data | timestamp_ms(8) | client_id(2)`
//! layout the wire protocol uses for `AppendEntries` entries, and a small
//! fixed-size metadata file holding `current_term`, `voted_for`, and the
//! snapshot marker. Satisfies "persistent state must survive process
//! restarts".
//!
//! This is a straightforward implementation, not a log-structured store:
//! `truncate_suffix` rewrites the tail of the file and `truncate_prefix`
//! rewrites the whole file minus the discarded prefix. Good enough for the
//! entry volumes a control-plane Raft group sees; a high-throughput data
//! log would want segment files instead.

use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::{Log, NodeIdOpt};
use crate::message::{EntryType, LogEntry, LogIndex, SnapshotMeta, Term};

const META_LEN: usize = 8 + 2 + 8 + 8;

#[derive(thiserror::Error, Debug)]
pub enum FileLogError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt log entry at byte offset {0}")]
    Corrupt(u64),
}

pub struct FileLog {
    dir: PathBuf,
    entries: Vec<LogEntry>,
    offset: LogIndex,
    current_term: Term,
    voted_for: NodeIdOpt,
    snapshot_meta: SnapshotMeta,
}

impl FileLog {
    /// Opens (creating if absent) a durable log rooted at `dir`, replaying
    /// any entries already on disk.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, FileLogError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut log = FileLog {
            dir,
            entries: Vec::new(),
            offset: 0,
            current_term: 0,
            voted_for: None,
            snapshot_meta: SnapshotMeta::default(),
        };
        log.load_meta()?;
        log.replay_entries()?;
        Ok(log)
    }

    fn meta_path(&self) -> PathBuf {
        self.dir.join("meta")
    }

    fn entries_path(&self) -> PathBuf {
        self.dir.join("entries")
    }

    fn load_meta(&mut self) -> Result<(), FileLogError> {
        let path = self.meta_path();
        if !path.exists() {
            return Ok(());
        }
        let mut buf = [0u8; META_LEN];
        let mut f = File::open(path)?;
        if f.read_exact(&mut buf).is_err() {
            return Ok(());
        }
        self.current_term = u64::from_be_bytes(buf[0..8].try_into().unwrap());
        let voted = u16::from_be_bytes(buf[8..10].try_into().unwrap());
        self.voted_for = if voted == 0 { None } else { Some(voted) };
        self.snapshot_meta.last_included_index =
            u64::from_be_bytes(buf[10..18].try_into().unwrap());
        self.snapshot_meta.last_included_term =
            u64::from_be_bytes(buf[18..26].try_into().unwrap());
        self.offset = self.snapshot_meta.last_included_index;
        Ok(())
    }

    fn persist_meta(&self) -> Result<(), FileLogError> {
        let mut buf = Vec::with_capacity(META_LEN);
        buf.extend_from_slice(&self.current_term.to_be_bytes());
        buf.extend_from_slice(&self.voted_for.unwrap_or(0).to_be_bytes());
        buf.extend_from_slice(&self.snapshot_meta.last_included_index.to_be_bytes());
        buf.extend_from_slice(&self.snapshot_meta.last_included_term.to_be_bytes());
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(self.meta_path())?;
        f.write_all(&buf)?;
        f.sync_data()?;
        Ok(())
    }

    fn replay_entries(&mut self) -> Result<(), FileLogError> {
        let path = self.entries_path();
        if !path.exists() {
            return Ok(());
        }
        let mut f = File::open(path)?;
        let mut out = Vec::new();
        loop {
            let offset = f.seek(SeekFrom::Current(0))?;
            match read_entry(&mut f) {
                Ok(Some(entry)) => out.push(entry),
                Ok(None) => break,
                Err(_) => {
                    log::warn!("truncating corrupt raft log tail at offset {}", offset);
                    break;
                }
            }
        }
        self.entries = out;
        Ok(())
    }

    fn rewrite_entries(&self) -> Result<(), FileLogError> {
        let tmp = self.dir.join("entries.tmp");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            for entry in &self.entries {
                write_entry(&mut f, entry)?;
            }
            f.sync_data()?;
        }
        std::fs::rename(tmp, self.entries_path())?;
        Ok(())
    }

    fn position(&self, index: LogIndex) -> Option<usize> {
        if index <= self.offset {
            return None;
        }
        let pos = (index - self.offset - 1) as usize;
        if pos < self.entries.len() {
            Some(pos)
        } else {
            None
        }
    }
}

impl Log for FileLog {
    type Error = FileLogError;

    fn append(&mut self, entry: LogEntry) -> Result<(), Self::Error> {
        let mut f = OpenOptions::new().create(true).append(true).open(self.entries_path())?;
        write_entry(&mut f, &entry)?;
        f.sync_data()?;
        self.entries.push(entry);
        Ok(())
    }

    fn truncate_suffix(&mut self, from_index: LogIndex) -> Result<usize, Self::Error> {
        let removed = match self.position(from_index) {
            Some(pos) => {
                let removed = self.entries.len() - pos;
                self.entries.truncate(pos);
                removed
            }
            None => 0,
        };
        if removed > 0 {
            self.rewrite_entries()?;
        }
        Ok(removed)
    }

    fn truncate_prefix(&mut self, upto_index: LogIndex) -> Result<(), Self::Error> {
        let mut changed = false;
        while let Some(front) = self.entries.first() {
            if front.index <= upto_index {
                self.entries.remove(0);
                self.offset += 1;
                changed = true;
            } else {
                break;
            }
        }
        if upto_index > self.offset {
            self.offset = upto_index;
            changed = true;
        }
        if changed {
            self.rewrite_entries()?;
        }
        Ok(())
    }

    fn get(&self, index: LogIndex) -> Option<LogEntry> {
        self.position(index).map(|pos| self.entries[pos].clone())
    }

    fn last_index(&self) -> LogIndex {
        self.offset + self.entries.len() as LogIndex
    }

    fn save_term_and_vote(&mut self, term: Term, voted_for: NodeIdOpt) -> Result<(), Self::Error> {
        self.current_term = term;
        self.voted_for = voted_for;
        self.persist_meta()
    }

    fn load_term_and_vote(&self) -> (Term, NodeIdOpt) {
        (self.current_term, self.voted_for)
    }

    fn save_snapshot_meta(&mut self, meta: SnapshotMeta) -> Result<(), Self::Error> {
        self.snapshot_meta = meta;
        self.persist_meta()
    }

    fn snapshot_meta(&self) -> SnapshotMeta {
        self.snapshot_meta
    }
}

fn write_entry<W: Write>(w: &mut W, entry: &LogEntry) -> Result<(), FileLogError> {
    w.write_all(&entry.term.to_be_bytes())?;
    w.write_all(&entry.index.to_be_bytes())?;
    w.write_all(&[entry.entry_type as u8])?;
    w.write_all(&(entry.data.len() as u32).to_be_bytes())?;
    w.write_all(&entry.data)?;
    w.write_all(&entry.timestamp_ms.to_be_bytes())?;
    w.write_all(&entry.client_id.to_be_bytes())?;
    Ok(())
}

fn read_entry<R: Read>(r: &mut R) -> Result<Option<LogEntry>, FileLogError> {
    let mut head = [0u8; 8 + 8 + 1 + 4];
    match r.read_exact(&mut head) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let term = u64::from_be_bytes(head[0..8].try_into().unwrap());
    let index = u64::from_be_bytes(head[8..16].try_into().unwrap());
    let entry_type = EntryType::from_u8(head[16]).ok_or(FileLogError::Corrupt(0))?;
    let data_len = u32::from_be_bytes(head[17..21].try_into().unwrap()) as usize;

    let mut data = vec![0u8; data_len];
    r.read_exact(&mut data)?;

    let mut tail = [0u8; 8 + 2];
    r.read_exact(&mut tail)?;
    let timestamp_ms = u64::from_be_bytes(tail[0..8].try_into().unwrap());
    let client_id = u16::from_be_bytes(tail[8..10].try_into().unwrap());

    Ok(Some(LogEntry {
        term,
        index,
        entry_type,
        data,
        timestamp_ms,
        client_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(index: LogIndex, term: Term) -> LogEntry {
        LogEntry {
            term,
            index,
            entry_type: EntryType::Command,
            data: b"hello".to_vec(),
            timestamp_ms: 42,
            client_id: 7,
        }
    }

    #[test]
    fn survives_reopen() {
        let dir = tempdir();
        {
            let mut log = FileLog::open(&dir).unwrap();
            log.append(entry(1, 1)).unwrap();
            log.append(entry(2, 1)).unwrap();
            log.save_term_and_vote(3, Some(9)).unwrap();
        }
        let log = FileLog::open(&dir).unwrap();
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.get(2).unwrap().data, b"hello");
        assert_eq!(log.load_term_and_vote(), (3, Some(9)));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn truncate_suffix_persists() {
        let dir = tempdir();
        {
            let mut log = FileLog::open(&dir).unwrap();
            for i in 1..=4 {
                log.append(entry(i, 1)).unwrap();
            }
            log.truncate_suffix(3).unwrap();
        }
        let log = FileLog::open(&dir).unwrap();
        assert_eq!(log.last_index(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("swimraft-filelog-test-{}", std::process::id()));
        p.push(format!("{:p}", &p as *const _));
        p
    }
}
