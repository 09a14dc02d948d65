//! Runtime side: load one or more database images and look pipelines up by name.
//!
//! Every image is validated end to end before anything is registered, then
//! copied into an owned word-aligned buffer. The index maps names to
//! `(image, offset, len)` handles, never to raw pointers, so lookups hand out
//! [`PipelineView`]s borrowed from the database itself.

use crate::consts::IMAGE_HEADER_SIZE;
use crate::errors::{PipeDbError, Result};
use crate::image::ImageReader;
use crate::record::PipelineView;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RecordHandle {
    image: usize,
    offset: usize,
    len: usize,
}

struct LoadedImage {
    words: Vec<u32>,
    len: usize,
}

impl LoadedImage {
    fn copy_of(bytes: &[u8]) -> Self {
        let mut words = vec![0u32; bytes.len().div_ceil(4)];
        bytemuck::cast_slice_mut::<u32, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
        Self { words, len: bytes.len() }
    }

    fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u32, u8>(&self.words)[..self.len]
    }
}

/// Name-indexed collection of loaded pipeline records.
#[derive(Default)]
pub struct PipelineDb {
    images: Vec<LoadedImage>,
    index: HashMap<String, RecordHandle>,
}

impl PipelineDb {
    pub fn new() -> Self { Self::default() }

    /// Load one image from memory. Returns the number of records it held.
    ///
    /// A name already present (from an earlier image or earlier in the same
    /// image) is replaced by the later record. On error nothing changes.
    pub fn load(&mut self, bytes: &[u8]) -> Result<usize> {
        let reader = ImageReader::new(bytes)?;
        let entries = reader.entries()?;

        let image = self.images.len();
        self.images.push(LoadedImage::copy_of(reader.as_bytes()));

        let count = entries.len();
        for e in entries {
            let handle = RecordHandle { image, offset: e.offset, len: e.len };
            if let Some(prev) = self.index.insert(e.name, handle) {
                debug!(image, offset = e.offset, prev_image = prev.image, prev_offset = prev.offset, "pipeline replaced");
            }
        }
        info!(image, records = count, bytes = reader.as_bytes().len(), "database image loaded");
        Ok(count)
    }

    /// Map `path` read-only and load it.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let f = File::open(path)?;
        if (f.metadata()?.len() as usize) < IMAGE_HEADER_SIZE {
            return Err(PipeDbError::corrupt(format!("{} is too small to be a database", path.display())));
        }
        let mmap = unsafe { Mmap::map(&f)? };
        self.load(&mmap)
    }

    pub fn get(&self, name: &str) -> Option<PipelineView<'_>> {
        let h = self.index.get(name)?;
        self.view(*h)
    }

    /// Like [`PipelineDb::get`], but absence is an error.
    pub fn find(&self, name: &str) -> Result<PipelineView<'_>> {
        self.get(name).ok_or_else(|| PipeDbError::NameNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool { self.index.contains_key(name) }

    /// Distinct names registered.
    pub fn len(&self) -> usize { self.index.len() }
    pub fn is_empty(&self) -> bool { self.index.is_empty() }

    pub fn image_count(&self) -> usize { self.images.len() }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.index.keys().map(String::as_str)
    }

    /// Every reachable record, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PipelineView<'_>)> + '_ {
        self.index.iter().filter_map(|(name, h)| Some((name.as_str(), self.view(*h)?)))
    }

    /// Drop every image and the index.
    pub fn clear(&mut self) {
        self.index.clear();
        self.images.clear();
    }

    fn view(&self, h: RecordHandle) -> Option<PipelineView<'_>> {
        let bytes = self.images.get(h.image)?.bytes().get(h.offset..h.offset + h.len)?;
        PipelineView::new(bytes).ok()
    }
}
