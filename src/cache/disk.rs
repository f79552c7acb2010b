// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Disk backed shared string table
//!
//! Strings are grouped in batches of `batch_len` consecutive indices. A full
//! batch is encoded and appended to a session temporary file. At most
//! `max_active_batches` batches are kept decoded in memory, least recently
//! used ones are dropped and read back from disk on the next access.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;

use super::{CacheOptions, SharedStringCache};
use crate::errors::{Error, SharedKind};

const NONE_LEN: u32 = u32::MAX;

type Batch = Vec<Option<String>>;

#[derive(Debug, Clone, Copy)]
struct Segment {
    offset: u64,
    len: usize,
}

/// Shared strings stored in a temporary file, loaded back batch by batch
#[derive(Debug)]
pub struct DiskCache {
    file: File,
    end: u64,
    batch_len: usize,
    max_active_batches: usize,
    segments: HashMap<usize, Segment>,
    filling: HashMap<usize, Batch>,
    active: HashMap<usize, Batch>,
    lru: VecDeque<usize>,
    len: usize,
}

impl DiskCache {
    /// Creates a cache backed by a new anonymous temporary file.
    ///
    /// The file is removed by the OS once the cache is dropped.
    pub fn new(options: &CacheOptions) -> Result<Self, Error> {
        let file = tempfile::tempfile()?;
        Ok(DiskCache {
            file,
            end: 0,
            batch_len: options.batch_len.max(1),
            max_active_batches: options.max_active_batches.max(1),
            segments: HashMap::new(),
            filling: HashMap::new(),
            active: HashMap::new(),
            lru: VecDeque::new(),
            len: 0,
        })
    }

    /// Number of batches currently decoded in memory
    pub fn resident_batches(&self) -> usize {
        self.filling.len() + self.active.len()
    }

    fn flush(&mut self, batch: usize) -> Result<(), Error> {
        let Some(entries) = self.filling.remove(&batch) else {
            return Ok(());
        };
        let mut buf = Vec::with_capacity(entries.len() * 16);
        buf.write_u32::<LittleEndian>(entries.len() as u32)?;
        for entry in &entries {
            match entry {
                Some(s) => {
                    buf.write_u32::<LittleEndian>(s.len() as u32)?;
                    buf.extend_from_slice(s.as_bytes());
                }
                None => buf.write_u32::<LittleEndian>(NONE_LEN)?,
            }
        }
        self.file.seek(SeekFrom::Start(self.end))?;
        self.file.write_all(&buf)?;
        self.segments.insert(
            batch,
            Segment {
                offset: self.end,
                len: buf.len(),
            },
        );
        self.end += buf.len() as u64;
        Ok(())
    }

    fn read_segment(&mut self, segment: Segment) -> Result<Batch, Error> {
        let mut buf = vec![0; segment.len];
        self.file.seek(SeekFrom::Start(segment.offset))?;
        self.file.read_exact(&mut buf)?;
        let mut r = &buf[..];
        let count = r.read_u32::<LittleEndian>()? as usize;
        let mut entries = Vec::with_capacity(count);
        for _ in 0..count {
            let len = r.read_u32::<LittleEndian>()?;
            if len == NONE_LEN {
                entries.push(None);
                continue;
            }
            let len = len as usize;
            if r.len() < len {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let (s, rest) = r.split_at(len);
            let s = String::from_utf8(s.to_vec())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            entries.push(Some(s));
            r = rest;
        }
        Ok(entries)
    }

    /// Makes `batch` resident, reading it from disk if needed
    fn fault(&mut self, batch: usize) -> Result<(), Error> {
        if self.active.contains_key(&batch) {
            if let Some(pos) = self.lru.iter().position(|b| *b == batch) {
                self.lru.remove(pos);
            }
            self.lru.push_back(batch);
            return Ok(());
        }
        let Some(segment) = self.segments.get(&batch).copied() else {
            return Ok(());
        };
        let entries = self.read_segment(segment)?;
        while self.active.len() >= self.max_active_batches {
            match self.lru.pop_front() {
                Some(old) => {
                    self.active.remove(&old);
                }
                None => break,
            }
        }
        self.active.insert(batch, entries);
        self.lru.push_back(batch);
        Ok(())
    }
}

impl SharedStringCache for DiskCache {
    fn put(&mut self, index: usize, value: String) -> Result<(), Error> {
        let batch = index / self.batch_len;
        let slot = index % self.batch_len;
        if !self.filling.contains_key(&batch) {
            // late write into a batch already on disk: bring it back
            let entries = match self.segments.remove(&batch) {
                Some(segment) => {
                    self.active.remove(&batch);
                    self.lru.retain(|b| *b != batch);
                    self.read_segment(segment)?
                }
                None => Vec::new(),
            };
            self.filling.insert(batch, entries);
        }
        let Some(entries) = self.filling.get_mut(&batch) else {
            return Ok(());
        };
        if entries.len() <= slot {
            entries.resize(slot + 1, None);
        }
        if entries[slot].replace(value).is_none() {
            self.len += 1;
        }
        let full = entries.len() == self.batch_len && entries.iter().all(Option::is_some);
        if full {
            self.flush(batch)?;
        } else if self.filling.len() > self.max_active_batches {
            if let Some(oldest) = self.filling.keys().min().copied() {
                self.flush(oldest)?;
            }
        }
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<&str, Error> {
        let batch = index / self.batch_len;
        let slot = index % self.batch_len;
        if !self.filling.contains_key(&batch) {
            self.fault(batch)?;
        }
        self.filling
            .get(&batch)
            .or_else(|| self.active.get(&batch))
            .and_then(|entries| entries.get(slot))
            .and_then(|s| s.as_deref())
            .ok_or(Error::UnresolvedSharedReference {
                kind: SharedKind::String,
                index,
            })
    }

    fn clear(&mut self) {
        self.segments.clear();
        self.filling.clear();
        self.active.clear();
        self.lru.clear();
        self.end = 0;
        self.len = 0;
        if let Err(e) = self.file.set_len(0) {
            debug!("cannot truncate shared strings temporary file: {e}");
        }
    }

    fn finish_loading(&mut self) -> Result<(), Error> {
        let mut pending: Vec<usize> = self.filling.keys().copied().collect();
        pending.sort_unstable();
        for batch in pending {
            self.flush(batch)?;
        }
        self.file.flush()?;
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}
