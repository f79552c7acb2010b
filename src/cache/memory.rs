// SPDX-License-Identifier: MIT
//
// Copyright 2016-2025, Johann Tuffe.

use std::collections::HashMap;

use super::SharedStringCache;
use crate::errors::{Error, SharedKind};

/// Unbounded in memory shared string table
#[derive(Debug, Default)]
pub struct MemoryCache {
    strings: HashMap<usize, String>,
}

impl MemoryCache {
    /// Creates an empty cache
    pub fn new() -> Self {
        MemoryCache::default()
    }
}

impl SharedStringCache for MemoryCache {
    fn put(&mut self, index: usize, value: String) -> Result<(), Error> {
        self.strings.insert(index, value);
        Ok(())
    }

    fn get(&mut self, index: usize) -> Result<&str, Error> {
        self.strings
            .get(&index)
            .map(String::as_str)
            .ok_or(Error::UnresolvedSharedReference {
                kind: SharedKind::String,
                index,
            })
    }

    fn clear(&mut self) {
        self.strings.clear();
    }

    fn len(&self) -> usize {
        self.strings.len()
    }
}
