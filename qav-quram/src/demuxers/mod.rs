use qav_core::demuxers::*;

#[allow(unused_macros)]
macro_rules! validate {
    ($a:expr) => { if !$a { println!("check failed at {}:{}", file!(), line!()); return Err(DemuxerError::InvalidData); } };
}

#[cfg(feature="demuxer_qmage")]
mod qmage;

const QURAM_DEMUXERS: &[&dyn DemuxerCreator] = &[
#[cfg(feature="demuxer_qmage")]
    &qmage::QmageDemuxerCreator {},
];

/// Registers all available demuxers provided by this crate.
pub fn quram_register_all_demuxers(rd: &mut RegisteredDemuxers) {
    for demuxer in QURAM_DEMUXERS.iter() {
        rd.add_demuxer(*demuxer);
    }
}
