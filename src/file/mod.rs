//! On-disk file layer: header, memory-mapped reader

mod header;
mod reader;

pub use header::{FORMAT_VERSION, FileHeader, HEADER_SIZE, RFORMAT_IMAGE};
pub use reader::{Entry, FetchOptions, FilterOptions, IidFile, RegionOptions};
