//! Core functionality of QAV intended to be used by both crates implementing format support and users.
#[cfg(feature="decoders")]
#[allow(clippy::too_many_arguments)]
pub mod codecs;

#[cfg(feature="demuxers")]
pub mod demuxers;

#[allow(clippy::unreadable_literal)]
pub mod detect;
pub mod formats;
pub mod frame;
#[allow(clippy::identity_op)]
pub mod io;
pub mod refs;
pub mod register;
