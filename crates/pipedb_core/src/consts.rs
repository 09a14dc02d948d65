// crates/pipedb_core/src/consts.rs

//! Byte layout of a database image. All integers are native-endian.
//!
//! Image header (8 bytes):
//!   total_size[4]   = header + all records
//!   record_count[4]
//!
//! Pipeline record (192-byte header + trailing bytecode):
//!   total_size[4]      @0
//!   name[44]           @4    NUL-terminated
//!   renderpass[32]     @48   NUL-terminated
//!   vertex_input[32]   @80   NUL-terminated
//!   polygon_mode[4]    @112
//!   cull_mode[4]       @116
//!   topology[4]        @120
//!   depth_op[4]        @124
//!   depth_test[1]      @128
//!   depth_write[1]     @129
//!   stage_count[1]     @130
//!   reserved[1]        @131  always 0
//!   stages[5 * 12]     @132  { kind[4], offset[4], size[4] }
//!   data[]             @192  offsets in `stages` are relative to here

pub const IMAGE_HEADER_SIZE: usize = 8;
pub const IMG_OFF_TOTAL_SIZE: usize = 0;
pub const IMG_OFF_RECORD_COUNT: usize = 4;

pub const NAME_LEN: usize = 44;
pub const RENDERPASS_LEN: usize = 32;
pub const VERTEX_INPUT_LEN: usize = 32;

pub const MAX_STAGES: usize = 5;
pub const STAGE_DESC_SIZE: usize = 12;

pub const REC_OFF_TOTAL_SIZE: usize = 0;
pub const REC_OFF_NAME: usize = 4;
pub const REC_OFF_RENDERPASS: usize = REC_OFF_NAME + NAME_LEN;
pub const REC_OFF_VERTEX_INPUT: usize = REC_OFF_RENDERPASS + RENDERPASS_LEN;
pub const REC_OFF_POLYGON_MODE: usize = REC_OFF_VERTEX_INPUT + VERTEX_INPUT_LEN;
pub const REC_OFF_CULL_MODE: usize = REC_OFF_POLYGON_MODE + 4;
pub const REC_OFF_TOPOLOGY: usize = REC_OFF_CULL_MODE + 4;
pub const REC_OFF_DEPTH_OP: usize = REC_OFF_TOPOLOGY + 4;
pub const REC_OFF_DEPTH_TEST: usize = REC_OFF_DEPTH_OP + 4;
pub const REC_OFF_DEPTH_WRITE: usize = REC_OFF_DEPTH_TEST + 1;
pub const REC_OFF_STAGE_COUNT: usize = REC_OFF_DEPTH_WRITE + 1;
pub const REC_OFF_RESERVED: usize = REC_OFF_STAGE_COUNT + 1;
pub const REC_OFF_STAGES: usize = REC_OFF_RESERVED + 1;

pub const RECORD_HEADER_SIZE: usize = REC_OFF_STAGES + MAX_STAGES * STAGE_DESC_SIZE;

/// Bytecode is a sequence of 32-bit words.
pub const WORD_SIZE: usize = 4;

const _: () = { assert!(RECORD_HEADER_SIZE == 192); };
const _: () = { assert!(REC_OFF_STAGES % WORD_SIZE == 0); };
const _: () = { assert!(IMAGE_HEADER_SIZE % WORD_SIZE == 0); };
