//! Bitstream and byte stream reading functionality.
pub mod bitreader;
pub mod byteio;
