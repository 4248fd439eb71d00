use qav_core::codecs::*;

macro_rules! validate {
    ($a:expr) => { if !$a { println!("check failed at {}:{}", file!(), line!()); return Err(DecoderError::InvalidData); } };
}

#[cfg(feature="decoder_qmage")]
mod qmagedata;
#[cfg(feature="decoder_qmage")]
pub mod qmage;

const QURAM_CODECS: &[DecoderInfo] = &[
#[cfg(feature="decoder_qmage")]
    DecoderInfo { name: "qmage", get_decoder: qmage::get_decoder },
];

/// Registers all available codecs provided by this crate.
pub fn quram_register_all_decoders(rd: &mut RegisteredDecoders) {
    for decoder in QURAM_CODECS.iter() {
        rd.add_decoder(*decoder);
    }
}
