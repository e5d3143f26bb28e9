pub mod buffer;
pub(crate) mod imagej;
pub mod metadata;
pub mod preview;
pub mod reader;
pub mod writer;

pub use buffer::BufferReader;
pub use metadata::{load_metadata, parse_metadata};
pub use preview::{max_projection, save_projection};
pub use reader::read_volume;
pub use writer::{
    allocate, allocate_with, incomplete_marker, write, write_array, write_with, WriterOptions,
};
