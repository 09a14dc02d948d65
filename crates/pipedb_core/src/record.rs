//! Pipeline record: fixed 192-byte header followed by concatenated stage bytecode.
//!
//! Records are encoded and decoded field by field (see `consts` for the table);
//! nothing is overlaid on raw memory. A record under construction lives in an
//! [`Arena`] and is driven by a [`RecordWriter`], which holds the arena's
//! cursor exclusively until the record is finished.

use crate::arena::{Arena, Span};
use crate::consts::*;
use crate::errors::{PipeDbError, Result};
use crate::utils::{get_u32, put_u32, read_fixed_str, write_fixed_str};
use crate::vk::{self, StageKind};
use std::borrow::Cow;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageDesc {
    pub kind: u32,
    /// Relative to the start of the record's trailing data.
    pub offset: u32,
    pub size: u32,
}

impl StageDesc {
    pub fn stage_kind(&self) -> Option<StageKind> { StageKind::from_raw(self.kind) }
}

/// Fixed-function state carried by a record, as raw Vulkan values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderState {
    pub polygon_mode: u32,
    pub cull_mode: u32,
    pub topology: u32,
    pub depth_op: u32,
    pub depth_test: bool,
    pub depth_write: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            polygon_mode: vk::DEFAULT_POLYGON_MODE,
            cull_mode: vk::DEFAULT_CULL_MODE,
            topology: vk::DEFAULT_TOPOLOGY,
            depth_op: vk::DEFAULT_DEPTH_OP,
            depth_test: false,
            depth_write: false,
        }
    }
}

/// Decoded record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRecord {
    pub total_size: u32,
    pub name: [u8; NAME_LEN],
    pub renderpass: [u8; RENDERPASS_LEN],
    pub vertex_input: [u8; VERTEX_INPUT_LEN],
    pub state: RenderState,
    pub stage_count: u8,
    pub stages: [StageDesc; MAX_STAGES],
}

impl Default for PipelineRecord {
    fn default() -> Self {
        let mut rec = Self {
            total_size: RECORD_HEADER_SIZE as u32,
            name: [0; NAME_LEN],
            renderpass: [0; RENDERPASS_LEN],
            vertex_input: [0; VERTEX_INPUT_LEN],
            state: RenderState::default(),
            stage_count: 0,
            stages: [StageDesc::default(); MAX_STAGES],
        };
        rec.set_name("null");
        rec.set_renderpass("null");
        rec.set_vertex_input("null");
        rec
    }
}

impl PipelineRecord {
    pub fn name(&self) -> Cow<'_, str> { read_fixed_str(&self.name) }
    pub fn renderpass_name(&self) -> Cow<'_, str> { read_fixed_str(&self.renderpass) }
    pub fn vertex_input_name(&self) -> Cow<'_, str> { read_fixed_str(&self.vertex_input) }

    /// Returns `true` if `name` had to be truncated.
    pub fn set_name(&mut self, name: &str) -> bool { write_fixed_str(&mut self.name, name) }
    pub fn set_renderpass(&mut self, name: &str) -> bool { write_fixed_str(&mut self.renderpass, name) }
    pub fn set_vertex_input(&mut self, name: &str) -> bool { write_fixed_str(&mut self.vertex_input, name) }

    pub fn stages(&self) -> &[StageDesc] { &self.stages[..self.stage_count as usize] }

    /// Length of the trailing bytecode region.
    pub fn data_len(&self) -> usize { self.total_size as usize - RECORD_HEADER_SIZE }

    /// Write the fixed header into `out[..RECORD_HEADER_SIZE]`.
    pub fn encode_header(&self, out: &mut [u8]) {
        let out = &mut out[..RECORD_HEADER_SIZE];
        put_u32(out, REC_OFF_TOTAL_SIZE, self.total_size);
        out[REC_OFF_NAME..REC_OFF_NAME + NAME_LEN].copy_from_slice(&self.name);
        out[REC_OFF_RENDERPASS..REC_OFF_RENDERPASS + RENDERPASS_LEN].copy_from_slice(&self.renderpass);
        out[REC_OFF_VERTEX_INPUT..REC_OFF_VERTEX_INPUT + VERTEX_INPUT_LEN].copy_from_slice(&self.vertex_input);
        put_u32(out, REC_OFF_POLYGON_MODE, self.state.polygon_mode);
        put_u32(out, REC_OFF_CULL_MODE, self.state.cull_mode);
        put_u32(out, REC_OFF_TOPOLOGY, self.state.topology);
        put_u32(out, REC_OFF_DEPTH_OP, self.state.depth_op);
        out[REC_OFF_DEPTH_TEST] = self.state.depth_test as u8;
        out[REC_OFF_DEPTH_WRITE] = self.state.depth_write as u8;
        out[REC_OFF_STAGE_COUNT] = self.stage_count;
        out[REC_OFF_RESERVED] = 0;
        for (i, s) in self.stages.iter().enumerate() {
            let base = REC_OFF_STAGES + i * STAGE_DESC_SIZE;
            put_u32(out, base, s.kind);
            put_u32(out, base + 4, s.offset);
            put_u32(out, base + 8, s.size);
        }
    }

    /// Decode and validate a header. `bytes` only needs to cover the header.
    pub fn decode_header(bytes: &[u8]) -> Result<Self> {
        check_header(bytes)?;
        let mut rec = Self {
            total_size: get_u32(bytes, REC_OFF_TOTAL_SIZE),
            name: [0; NAME_LEN],
            renderpass: [0; RENDERPASS_LEN],
            vertex_input: [0; VERTEX_INPUT_LEN],
            state: RenderState {
                polygon_mode: get_u32(bytes, REC_OFF_POLYGON_MODE),
                cull_mode: get_u32(bytes, REC_OFF_CULL_MODE),
                topology: get_u32(bytes, REC_OFF_TOPOLOGY),
                depth_op: get_u32(bytes, REC_OFF_DEPTH_OP),
                depth_test: bytes[REC_OFF_DEPTH_TEST] != 0,
                depth_write: bytes[REC_OFF_DEPTH_WRITE] != 0,
            },
            stage_count: bytes[REC_OFF_STAGE_COUNT],
            stages: [StageDesc::default(); MAX_STAGES],
        };
        rec.name.copy_from_slice(&bytes[REC_OFF_NAME..REC_OFF_NAME + NAME_LEN]);
        rec.renderpass.copy_from_slice(&bytes[REC_OFF_RENDERPASS..REC_OFF_RENDERPASS + RENDERPASS_LEN]);
        rec.vertex_input.copy_from_slice(&bytes[REC_OFF_VERTEX_INPUT..REC_OFF_VERTEX_INPUT + VERTEX_INPUT_LEN]);
        for (i, s) in rec.stages.iter_mut().enumerate() {
            *s = read_stage(bytes, i);
        }
        Ok(rec)
    }
}

fn read_stage(bytes: &[u8], i: usize) -> StageDesc {
    let base = REC_OFF_STAGES + i * STAGE_DESC_SIZE;
    StageDesc {
        kind: get_u32(bytes, base),
        offset: get_u32(bytes, base + 4),
        size: get_u32(bytes, base + 8),
    }
}

/// Structural checks shared by `decode_header` and `PipelineView::new`.
fn check_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(PipeDbError::corrupt(format!("record header truncated ({} bytes)", bytes.len())));
    }
    let total = get_u32(bytes, REC_OFF_TOTAL_SIZE) as usize;
    if total < RECORD_HEADER_SIZE || total % WORD_SIZE != 0 {
        return Err(PipeDbError::corrupt(format!("bad record size {total}")));
    }
    let count = bytes[REC_OFF_STAGE_COUNT] as usize;
    if count > MAX_STAGES {
        return Err(PipeDbError::corrupt(format!("stage count {count} > {MAX_STAGES}")));
    }
    let data_len = (total - RECORD_HEADER_SIZE) as u64;
    for i in 0..count {
        let s = read_stage(bytes, i);
        if s.offset as usize % WORD_SIZE != 0 || s.size as usize % WORD_SIZE != 0 {
            return Err(PipeDbError::corrupt(format!("stage {i} not word aligned")));
        }
        if s.offset as u64 + s.size as u64 > data_len {
            return Err(PipeDbError::corrupt(format!("stage {i} out of bounds")));
        }
    }
    Ok(())
}

/// In-progress record inside an arena.
///
/// Holding the writer borrows the arena mutably, so nothing else can allocate
/// between two stages of the same record. Dropping a writer without calling
/// [`RecordWriter::finish`] rolls the arena back to where the record began.
pub struct RecordWriter<'a> {
    arena: &'a mut Arena,
    start: usize,
    header: PipelineRecord,
    finished: bool,
}

impl<'a> RecordWriter<'a> {
    pub fn begin(arena: &'a mut Arena) -> Result<Self> {
        let span = arena.calloc(RECORD_HEADER_SIZE)?;
        let mut w = Self { arena, start: span.offset, header: PipelineRecord::default(), finished: false };
        w.sync_header();
        Ok(w)
    }

    pub fn header(&self) -> &PipelineRecord { &self.header }

    pub fn state_mut(&mut self) -> &mut RenderState { &mut self.header.state }

    pub fn set_name(&mut self, name: &str) -> bool { self.header.set_name(name) }
    pub fn set_renderpass(&mut self, name: &str) -> bool { self.header.set_renderpass(name) }
    pub fn set_vertex_input(&mut self, name: &str) -> bool { self.header.set_vertex_input(name) }

    pub fn stage_count(&self) -> usize { self.header.stage_count as usize }

    /// Append one stage's bytecode directly behind the record's current end.
    pub fn append_stage(&mut self, kind: StageKind, words: &[u32]) -> Result<StageDesc> {
        let idx = self.stage_count();
        if idx >= MAX_STAGES {
            return Err(PipeDbError::StageLimitExceeded { limit: MAX_STAGES });
        }
        let bytes: &[u8] = bytemuck::cast_slice(words);
        let total = self.header.total_size as usize;
        let new_total = u32::try_from(total + bytes.len()).map_err(|_| PipeDbError::OutOfSpace {
            requested: bytes.len(),
            remaining: u32::MAX as usize - total,
        })?;

        let expected = self.start + total;
        let span = self.arena.copy_bytes(bytes)?;
        if span.offset != expected {
            self.arena.rewind_to(span.offset);
            return Err(PipeDbError::NonContiguous { expected, actual: span.offset });
        }

        let desc = StageDesc {
            kind: kind.as_raw(),
            offset: (total - RECORD_HEADER_SIZE) as u32,
            size: bytes.len() as u32,
        };
        self.header.stages[idx] = desc;
        self.header.stage_count += 1;
        self.header.total_size = new_total;
        self.sync_header();
        Ok(desc)
    }

    pub fn finish(mut self) -> Span {
        self.sync_header();
        self.finished = true;
        Span { offset: self.start, len: self.header.total_size as usize }
    }

    fn sync_header(&mut self) {
        let span = Span { offset: self.start, len: RECORD_HEADER_SIZE };
        self.header.encode_header(self.arena.bytes_mut(span));
    }
}

impl Drop for RecordWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.arena.rewind_to(self.start);
        }
    }
}

/// Read-only view over one encoded record. Fields are read straight from
/// the underlying bytes; bytecode is never copied.
#[derive(Debug, Clone, Copy)]
pub struct PipelineView<'a> {
    bytes: &'a [u8],
}

impl<'a> PipelineView<'a> {
    /// `bytes` must hold exactly one record.
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        check_header(bytes)?;
        let total = get_u32(bytes, REC_OFF_TOTAL_SIZE) as usize;
        if total != bytes.len() {
            return Err(PipeDbError::corrupt(format!("record size {total} != buffer {}", bytes.len())));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &'a [u8] { self.bytes }
    pub fn total_size(&self) -> u32 { get_u32(self.bytes, REC_OFF_TOTAL_SIZE) }

    pub fn name(&self) -> Cow<'a, str> { read_fixed_str(self.name_bytes()) }
    /// Raw name field up to its first NUL.
    pub fn name_bytes(&self) -> &'a [u8] {
        let field = &self.bytes[REC_OFF_NAME..REC_OFF_NAME + NAME_LEN];
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        &field[..end]
    }
    pub fn renderpass_name(&self) -> Cow<'a, str> {
        read_fixed_str(&self.bytes[REC_OFF_RENDERPASS..REC_OFF_RENDERPASS + RENDERPASS_LEN])
    }
    pub fn vertex_input_name(&self) -> Cow<'a, str> {
        read_fixed_str(&self.bytes[REC_OFF_VERTEX_INPUT..REC_OFF_VERTEX_INPUT + VERTEX_INPUT_LEN])
    }

    pub fn state(&self) -> RenderState {
        RenderState {
            polygon_mode: get_u32(self.bytes, REC_OFF_POLYGON_MODE),
            cull_mode: get_u32(self.bytes, REC_OFF_CULL_MODE),
            topology: get_u32(self.bytes, REC_OFF_TOPOLOGY),
            depth_op: get_u32(self.bytes, REC_OFF_DEPTH_OP),
            depth_test: self.bytes[REC_OFF_DEPTH_TEST] != 0,
            depth_write: self.bytes[REC_OFF_DEPTH_WRITE] != 0,
        }
    }

    pub fn stage_count(&self) -> usize { self.bytes[REC_OFF_STAGE_COUNT] as usize }

    pub fn stage(&self, i: usize) -> Option<StageDesc> {
        (i < self.stage_count()).then(|| read_stage(self.bytes, i))
    }

    pub fn stages(&self) -> impl Iterator<Item = StageDesc> + 'a {
        let view = *self;
        (0..view.stage_count()).map(move |i| read_stage(view.bytes, i))
    }

    /// Trailing bytecode region.
    pub fn data(&self) -> &'a [u8] { &self.bytes[RECORD_HEADER_SIZE..] }

    pub fn stage_bytes(&self, i: usize) -> Option<&'a [u8]> {
        let s = self.stage(i)?;
        let start = s.offset as usize;
        Some(&self.data()[start..start + s.size as usize])
    }

    /// Stage bytecode as words. `None` if out of range or the backing
    /// storage is not 4-byte aligned.
    pub fn stage_words(&self, i: usize) -> Option<&'a [u32]> {
        bytemuck::try_cast_slice(self.stage_bytes(i)?).ok()
    }

    pub fn to_record(&self) -> PipelineRecord {
        // validated in `new`
        PipelineRecord::decode_header(self.bytes).unwrap_or_default()
    }
}
