//! Crate for providing support for various Quram formats.
extern crate qav_core;

#[allow(clippy::needless_range_loop)]
mod codecs;
pub use crate::codecs::quram_register_all_decoders;
mod demuxers;
pub use crate::demuxers::quram_register_all_demuxers;
