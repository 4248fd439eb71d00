//! Container format detection.
//!
//! Usually user does not know the container format of the opened file.
//! That is why format detection functionality is needed.
//! This module contains the set of rules to detect container not merely by
//! file extension but also by its content if possible.
//!
//! # Examples
//!
//! ```no_run
//! use qav_core::detect::detect_format;
//! use std::fs::File;
//! use qav_core::io::byteio::*;
//!
//! let name = "mediafile.qmg";
//! let mut file = File::open(name).unwrap();
//! let mut filereader = FileReader::new_read(&mut file);
//! let mut br = ByteReader::new(&mut filereader);
//! let result = detect_format(name, &mut br);
//! if let Some((name, score)) = result {
//!     println!("detected format {} with score {:?}", name, score);
//! }
//! ```
use std::io::SeekFrom;
use crate::io::byteio::ByteReader;

/// Format detection score.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum DetectionScore {
    /// Format is not detected.
    No,
    /// Format matched by file extension or by a weak marker.
    ExtensionMatches,
    /// Format matches by unambiguous markers inside the file.
    MagicMatches,
}

impl DetectionScore {
    /// Checks whether the current detection score is less than the one it is compared against.
    pub fn less(self, other: DetectionScore) -> bool {
        (self as i32) < (other as i32)
    }
}

#[allow(dead_code)]
enum Arg {
    Byte(u8),
    U16BE(u16),
    U16LE(u16),
    U32BE(u32),
    U32LE(u32),
}

impl Arg {
    fn val(&self) -> u64 {
        match *self {
            Arg::Byte(b)  => u64::from(b),
            Arg::U16BE(v) => u64::from(v),
            Arg::U16LE(v) => u64::from(v),
            Arg::U32BE(v) => u64::from(v),
            Arg::U32LE(v) => u64::from(v),
        }
    }
    fn read_val(&self, src: &mut ByteReader) -> Option<u64> {
        match *self {
            Arg::Byte(_)  => src.peek_byte().ok().map(u64::from),
            Arg::U16BE(_) => src.peek_u16be().ok().map(u64::from),
            Arg::U16LE(_) => src.peek_u16le().ok().map(u64::from),
            Arg::U32BE(_) => {
                let mut buf = [0; 4];
                src.peek_buf(&mut buf).ok()?;
                Some(u64::from(u32::from_be_bytes(buf)))
            }
            Arg::U32LE(_) => src.peek_u32le().ok().map(u64::from),
        }
    }
    fn eq(&self, src: &mut ByteReader) -> bool {
        match self.read_val(src) {
            Some(val) => val == self.val(),
            None => false,
        }
    }
    fn ge(&self, src: &mut ByteReader) -> bool {
        match self.read_val(src) {
            Some(val) => val >= self.val(),
            None => false,
        }
    }
}

#[allow(dead_code)]
enum CC<'a> {
    Or(&'a CC<'a>, &'a CC<'a>),
    Eq(Arg),
    Ge(Arg),
    Str(&'static [u8]),
}

impl<'a> CC<'a> {
    fn eval(&self, src: &mut ByteReader) -> bool {
        match *self {
            CC::Or(a, b)    => a.eval(src) || b.eval(src),
            CC::Eq(ref arg) => arg.eq(src),
            CC::Ge(ref arg) => arg.ge(src),
            CC::Str(string) => {
                let mut val: Vec<u8> = vec![0; string.len()];
                if src.peek_buf(val.as_mut_slice()).is_err() { return false; }
                val == string
            }
        }
    }
}

struct CheckItem<'a> {
    offs: u32,
    cond: &'a CC<'a>,
}

#[allow(dead_code)]
struct DetectConditions<'a> {
    demux_name: &'static str,
    extensions: &'static str,
    conditions: &'a [CheckItem<'a>],
    /// The score a successful marker check yields. Formats with magic too
    /// short to be unambiguous should report an intermediate score here.
    score:      DetectionScore,
}

const DETECTORS: &[DetectConditions] = &[
    DetectConditions {
        demux_name: "qmage",
        extensions: ".qmg",
        conditions: &[CheckItem{offs: 0, cond: &CC::Eq(Arg::U16BE(0x514D)) },
                      CheckItem{offs: 6, cond: &CC::Ge(Arg::U16LE(1)) },
                      CheckItem{offs: 8, cond: &CC::Ge(Arg::U16LE(1)) },
                     ],
        score: DetectionScore::ExtensionMatches,
    },
];

/// Tries to detect container format.
///
/// This function tries to determine container format using both file
/// extension and checking against container specific markers inside.
/// In case of success the function returns short container name and the
/// detection score. Result should have the highest detection score among
/// tested.
pub fn detect_format(name: &str, src: &mut ByteReader) -> Option<(&'static str, DetectionScore)> {
    let mut result = None;
    let lname = name.to_lowercase();
    for detector in DETECTORS {
        let mut score = DetectionScore::No;
        if !name.is_empty() {
            for ext in detector.extensions.split(',') {
                if lname.ends_with(ext) {
                    score = DetectionScore::ExtensionMatches;
                    break;
                }
            }
        }
        let mut passed = !detector.conditions.is_empty();
        for ck in detector.conditions {
            if src.seek(SeekFrom::Start(u64::from(ck.offs))).is_err() {
                passed = false;
                break;
            }
            if !ck.cond.eval(src) {
                passed = false;
                break;
            }
        }
        if passed && score.less(detector.score) {
            score = detector.score;
        }
        if score == DetectionScore::MagicMatches {
            return Some((detector.demux_name, score));
        }
        match result {
            None if score != DetectionScore::No => {
                result = Some((detector.demux_name, score));
            }
            Some((_, oldscore)) if oldscore.less(score) => {
                result = Some((detector.demux_name, score));
            }
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::byteio::*;

    #[test]
    fn test_qmage_detect() {
        let hdr: [u8; 12] = [0x51, 0x4D, 0x0B, 0x00, 0x00, 0x01, 0x20, 0x00, 0x10, 0x00, 0x00, 0x00];
        let mut mr = MemoryReader::new_read(&hdr);
        let mut br = ByteReader::new(&mut mr);
        let (name, score) = detect_format("test.qmg", &mut br).unwrap();
        assert_eq!(name, "qmage");
        assert_eq!(score, DetectionScore::ExtensionMatches);
    }

    #[test]
    fn test_qmage_detect_no_magic() {
        let hdr: [u8; 12] = [0; 12];
        let mut mr = MemoryReader::new_read(&hdr);
        let mut br = ByteReader::new(&mut mr);
        assert!(detect_format("test.bin", &mut br).is_none());
    }

    #[test]
    fn test_qmage_detect_zero_dims() {
        let hdr: [u8; 12] = [0x51, 0x4D, 0x0B, 0x00, 0x00, 0x01, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00];
        let mut mr = MemoryReader::new_read(&hdr);
        let mut br = ByteReader::new(&mut mr);
        assert!(detect_format("test.bin", &mut br).is_none());
    }
}
