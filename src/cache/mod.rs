// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

//! Shared string tables
//!
//! Small tables live in memory, large ones in a disk backed batched store.
//! The choice is made once per document from the byte size of the shared
//! strings part, see [`select_cache`].

mod disk;
mod memory;

use std::io::BufRead;

use log::debug;

pub use self::disk::DiskCache;
pub use self::memory::MemoryCache;
use crate::errors::Error;
use crate::xml::{TagEvent, TagParser};

/// Key to string store holding the shared strings of one document
pub trait SharedStringCache {
    /// Stores the string at `index`
    fn put(&mut self, index: usize, value: String) -> Result<(), Error>;

    /// Gets the string at `index`.
    ///
    /// Fails with [`Error::UnresolvedSharedReference`] when nothing was stored.
    fn get(&mut self, index: usize) -> Result<&str, Error>;

    /// Drops every entry and releases storage
    fn clear(&mut self);

    /// Called once all strings are stored
    fn finish_loading(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Number of stored strings
    fn len(&self) -> usize;

    /// True when nothing is stored
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache tier selection
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Choose from the shared strings part size
    #[default]
    Auto,
    /// Always keep strings in memory
    Memory,
    /// Always use the disk backed store
    Disk,
}

/// Concrete cache implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// [`MemoryCache`]
    Memory,
    /// [`DiskCache`]
    Disk,
}

/// Shared string cache configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Tier selection
    pub mode: CacheMode,
    /// Part size (bytes) from which `Auto` picks the disk backed store
    pub threshold: u64,
    /// Strings per disk batch
    pub batch_len: usize,
    /// Disk batches kept decoded in memory
    pub max_active_batches: usize,
}

impl Default for CacheOptions {
    fn default() -> Self {
        CacheOptions {
            mode: CacheMode::Auto,
            threshold: 5_000_000,
            batch_len: 100,
            max_active_batches: 20,
        }
    }
}

/// Chooses the cache implementation for a shared strings part of `size` bytes
pub fn select_cache(size: u64, options: &CacheOptions) -> CacheKind {
    match options.mode {
        CacheMode::Memory => CacheKind::Memory,
        CacheMode::Disk => CacheKind::Disk,
        CacheMode::Auto if size < options.threshold => CacheKind::Memory,
        CacheMode::Auto => CacheKind::Disk,
    }
}

pub(crate) fn new_cache(
    kind: CacheKind,
    options: &CacheOptions,
) -> Result<Box<dyn SharedStringCache>, Error> {
    debug!("using {kind:?} shared strings cache");
    Ok(match kind {
        CacheKind::Memory => Box::new(MemoryCache::new()),
        CacheKind::Disk => Box::new(DiskCache::new(options)?),
    })
}

/// Reads every `<si>` of a shared strings part into `cache`
pub(crate) fn load_shared_strings<R: BufRead>(
    xml: &mut TagParser<R>,
    cache: &mut dyn SharedStringCache,
) -> Result<usize, Error> {
    let mut index = 0;
    while let Some(ev) = xml.next_event()? {
        match ev {
            TagEvent::Start(e) if e.name == "si" => {
                let value = read_string(xml, "si")?;
                cache.put(index, value)?;
                index += 1;
            }
            TagEvent::End(n) if n == "sst" => break,
            _ => (),
        }
    }
    cache.finish_loading()?;
    Ok(index)
}

/// Reads a simple or rich text string up to the `closing` element.
///
/// Text of every `<t>` is concatenated, phonetic runs (`<rPh>`) are ignored.
pub(crate) fn read_string<R: BufRead>(
    xml: &mut TagParser<R>,
    closing: &str,
) -> Result<String, Error> {
    let mut value = String::new();
    let mut in_t = false;
    let mut phonetic = 0usize;
    while let Some(ev) = xml.next_event()? {
        match ev {
            TagEvent::Start(e) if e.name == "rPh" => phonetic += 1,
            TagEvent::Start(e) if e.name == "t" => in_t = true,
            TagEvent::Characters(t) if in_t && phonetic == 0 => value.push_str(&t),
            TagEvent::End(n) if n == "t" => in_t = false,
            TagEvent::End(n) if n == "rPh" => phonetic = phonetic.saturating_sub(1),
            TagEvent::End(n) if n == closing => break,
            _ => (),
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, CacheKind::Memory)]
    #[case(4_999_999, CacheKind::Memory)]
    #[case(5_000_000, CacheKind::Disk)]
    #[case(u64::MAX, CacheKind::Disk)]
    fn threshold_boundary(#[case] size: u64, #[case] expected: CacheKind) {
        assert_eq!(select_cache(size, &CacheOptions::default()), expected);
    }

    #[test]
    fn forced_modes() {
        let mut options = CacheOptions {
            mode: CacheMode::Disk,
            ..CacheOptions::default()
        };
        assert_eq!(select_cache(0, &options), CacheKind::Disk);
        options.mode = CacheMode::Memory;
        assert_eq!(select_cache(u64::MAX, &options), CacheKind::Memory);
    }

    #[test]
    fn rich_and_phonetic() {
        let data = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<x:sst xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
    <x:si><x:t>String 1</x:t></x:si>
    <x:si>
        <x:r><x:rPr><x:sz val="11"/></x:rPr><x:t>Str</x:t></x:r>
        <x:r><x:t>ing 2</x:t></x:r>
    </x:si>
    <x:si><x:t>東京</x:t><x:rPh sb="0" eb="2"><x:t>トウキョウ</x:t></x:rPh></x:si>
    <x:si><x:t xml:space="preserve"> a &amp; b </x:t></x:si>
</x:sst>"#;
        for kind in [CacheKind::Memory, CacheKind::Disk] {
            let mut cache = new_cache(kind, &CacheOptions::default()).unwrap();
            let n = load_shared_strings(&mut TagParser::new(data.as_bytes()), cache.as_mut())
                .unwrap();
            assert_eq!(n, 4);
            assert_eq!(cache.get(0).unwrap(), "String 1");
            assert_eq!(cache.get(1).unwrap(), "String 2");
            assert_eq!(cache.get(2).unwrap(), "東京");
            assert_eq!(cache.get(3).unwrap(), " a & b ");
        }
    }
}
