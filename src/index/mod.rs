//! Index blocks: the eagerly-parsed lookup table and the lazily-resolved
//! groups header

mod groups;
mod lut;

pub use groups::{GroupSpan, GroupsIndex, encode_block};
pub use lut::{LUT_RECORD_SIZE, Lut};
