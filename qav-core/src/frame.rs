//! Packets and decoded frames functionality.
use std::fmt;
pub use std::sync::Arc;
pub use crate::formats::*;
pub use crate::refs::*;

/// Video stream information.
#[allow(dead_code)]
#[derive(Clone,Copy,PartialEq)]
pub struct NAVideoInfo {
    /// Picture width.
    pub width:   usize,
    /// Picture height.
    pub height:  usize,
    /// Picture is stored downside up.
    pub flipped: bool,
    /// Picture pixel format.
    pub format:  NAPixelFormaton,
    /// Declared bits per sample.
    pub bits:    u8,
}

impl NAVideoInfo {
    /// Constructs a new `NAVideoInfo` instance.
    pub fn new(w: usize, h: usize, flip: bool, fmt: NAPixelFormaton) -> Self {
        let bits = fmt.get_total_depth();
        NAVideoInfo { width: w, height: h, flipped: flip, format: fmt, bits }
    }
    /// Returns picture width.
    pub fn get_width(&self)  -> usize { self.width }
    /// Returns picture height.
    pub fn get_height(&self) -> usize { self.height }
    /// Returns picture orientation.
    pub fn is_flipped(&self) -> bool { self.flipped }
    /// Returns picture pixel format.
    pub fn get_format(&self) -> NAPixelFormaton { self.format }
}

impl fmt::Display for NAVideoInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A list of possible stream information types.
#[derive(Clone,Copy,PartialEq)]
pub enum NACodecTypeInfo {
    /// No codec present.
    None,
    /// Video codec information.
    Video(NAVideoInfo),
}

impl NACodecTypeInfo {
    /// Returns video stream information.
    pub fn get_video_info(&self) -> Option<NAVideoInfo> {
        match *self {
            NACodecTypeInfo::Video(vinfo) => Some(vinfo),
            _ => None,
        }
    }
    /// Reports whether the current stream is video stream.
    pub fn is_video(&self) -> bool {
        matches!(*self, NACodecTypeInfo::Video(_))
    }
}

impl fmt::Display for NACodecTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ret = match *self {
            NACodecTypeInfo::None       => "".to_string(),
            NACodecTypeInfo::Video(fmt) => format!("{}", fmt),
        };
        write!(f, "{}", ret)
    }
}

/// Decoded video frame.
///
/// Frames are stored in native type (16-bit elements for packed RGB565)
/// inside a single buffer with the line stride possibly exceeding the
/// picture width; the off-row elements are padding and carry no pixels.
#[derive(Clone)]
pub struct NAVideoBuffer<T> {
    info:    NAVideoInfo,
    data:    NABufferRef<Vec<T>>,
    offs:    Vec<usize>,
    strides: Vec<usize>,
}

impl<T: Clone> NAVideoBuffer<T> {
    /// Returns the component offset (0 for all unavailable offsets).
    pub fn get_offset(&self, idx: usize) -> usize {
        if idx >= self.offs.len() { 0 }
        else { self.offs[idx] }
    }
    /// Returns picture info.
    pub fn get_info(&self) -> NAVideoInfo { self.info }
    /// Returns an immutable reference to the data.
    pub fn get_data(&self) -> &Vec<T> { self.data.as_ref() }
    /// Returns a mutable reference to the data.
    pub fn get_data_mut(&mut self) -> Option<&mut Vec<T>> { self.data.as_mut() }
    /// Creates a copy of current `NAVideoBuffer`.
    pub fn copy_buffer(&mut self) -> Self {
        let mut data: Vec<T> = Vec::with_capacity(self.data.len());
        data.clone_from(self.data.as_ref());
        let mut offs: Vec<usize> = Vec::with_capacity(self.offs.len());
        offs.clone_from(&self.offs);
        let mut strides: Vec<usize> = Vec::with_capacity(self.strides.len());
        strides.clone_from(&self.strides);
        NAVideoBuffer { info: self.info, data: NABufferRef::new(data), offs, strides }
    }
    /// Returns stride (distance between subsequent lines) for the requested component.
    pub fn get_stride(&self, idx: usize) -> usize {
        if idx >= self.strides.len() { return 0; }
        self.strides[idx]
    }
    /// Returns requested component dimensions.
    pub fn get_dimensions(&self, idx: usize) -> (usize, usize) {
        get_plane_size(&self.info, idx)
    }
    /// Converts current instance into buffer reference.
    pub fn into_ref(self) -> NABufferRef<Self> {
        NABufferRef::new(self)
    }
}

/// A specialised type for reference-counted `NAVideoBuffer`.
pub type NAVideoBufferRef<T> = NABufferRef<NAVideoBuffer<T>>;

/// A list of possible decoded frame types.
#[derive(Clone)]
pub enum NABufferType {
    /// 16-bit video buffer (i.e. every packed pixel fits into 16 bits).
    Video16(NAVideoBufferRef<u16>),
    /// No data present.
    None,
}

impl NABufferType {
    /// Returns information for video frames.
    pub fn get_video_info(&self) -> Option<NAVideoInfo> {
        match *self {
            NABufferType::Video16(ref vb) => Some(vb.get_info()),
            _ => None,
        }
    }
    /// Returns reference to 16-bit video buffer.
    pub fn get_vbuf16(&self) -> Option<NAVideoBufferRef<u16>> {
        match *self {
            NABufferType::Video16(ref vb) => Some(vb.clone()),
            _ => None,
        }
    }
}

/// A list of possible frame allocator errors.
#[derive(Debug,Clone,Copy,PartialEq)]
pub enum AllocatorError {
    /// Requested picture dimensions are too large.
    TooLargeDimensions,
    /// Invalid input format.
    FormatError,
}

/// Constructs a new video buffer with requested format.
///
/// `align` is power of two alignment for image. E.g. the value of 2 means
/// that frame dimensions will be padded to be multiple of four.
pub fn alloc_video_buffer(vinfo: NAVideoInfo, align: u8) -> Result<NABufferType, AllocatorError> {
    let fmt = &vinfo.format;

    for i in 0..fmt.get_num_comp() {
        if fmt.get_chromaton(i).is_none() { return Err(AllocatorError::FormatError); }
    }

    let align_mod = ((1 << align) as usize) - 1;
    let width  = (vinfo.width  + align_mod) & !align_mod;
    let height = (vinfo.height + align_mod) & !align_mod;
    let mut all_packed = true;
    for i in 0..fmt.get_num_comp() {
        if let Some(chr) = fmt.get_chromaton(i) {
            if !chr.is_packed() { all_packed = false; }
        }
    }
    if !all_packed || fmt.is_paletted() || fmt.get_elem_size() != 2 {
        return Err(AllocatorError::FormatError);
    }

    let new_size = width.checked_mul(height);
    if new_size.is_none() { return Err(AllocatorError::TooLargeDimensions); }
    let data: Vec<u16> = vec![0; new_size.unwrap()];
    let strides = vec![width];
    let buf: NAVideoBuffer<u16> = NAVideoBuffer { data: NABufferRef::new(data), info: vinfo, offs: Vec::new(), strides };
    Ok(NABufferType::Video16(buf.into_ref()))
}

fn get_plane_size(info: &NAVideoInfo, idx: usize) -> (usize, usize) {
    let chromaton = info.get_format().get_chromaton(idx);
    if chromaton.is_none() { return (0, 0); }
    let (hs, vs) = chromaton.unwrap().get_subsampling();
    let w = (info.get_width()  + ((1 << hs) - 1)) >> hs;
    let h = (info.get_height() + ((1 << vs) - 1)) >> vs;
    (w, h)
}

/// Information about codec contained in a stream.
#[allow(dead_code)]
#[derive(Clone)]
pub struct NACodecInfo {
    name:       &'static str,
    properties: NACodecTypeInfo,
    extradata:  Option<Arc<Vec<u8>>>,
}

/// A specialised type for reference-counted `NACodecInfo`.
pub type NACodecInfoRef = Arc<NACodecInfo>;

impl NACodecInfo {
    /// Constructs a new instance of `NACodecInfo`.
    pub fn new(name: &'static str, p: NACodecTypeInfo, edata: Option<Vec<u8>>) -> Self {
        NACodecInfo { name, properties: p, extradata: edata.map(Arc::new) }
    }
    /// Constructs a new reference-counted instance of `NACodecInfo`.
    pub fn new_ref(name: &'static str, p: NACodecTypeInfo, edata: Option<Arc<Vec<u8>>>) -> Self {
        NACodecInfo { name, properties: p, extradata: edata }
    }
    /// Converts current instance into a reference-counted one.
    pub fn into_ref(self) -> NACodecInfoRef { Arc::new(self) }
    /// Returns codec information.
    pub fn get_properties(&self) -> NACodecTypeInfo { self.properties }
    /// Returns additional initialisation data required by the codec.
    pub fn get_extradata(&self) -> Option<Arc<Vec<u8>>> {
        self.extradata.clone()
    }
    /// Returns codec name.
    pub fn get_name(&self) -> &'static str { self.name }
    /// Reports whether it is a video codec.
    pub fn is_video(&self) -> bool {
        matches!(self.properties, NACodecTypeInfo::Video(_))
    }
    /// Constructs a new empty reference-counted instance of `NACodecInfo`.
    pub fn new_dummy() -> Arc<Self> {
        Arc::new(DUMMY_CODEC_INFO)
    }
}

impl Default for NACodecInfo {
    fn default() -> Self { DUMMY_CODEC_INFO }
}

impl fmt::Display for NACodecInfo {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let edata = match self.extradata {
            None => "no extradata".to_string(),
            Some(ref v) => format!("{} byte(s) of extradata", v.len()),
        };
        write!(f, "{}: {} {}", self.name, self.properties, edata)
    }
}

/// Default empty codec information.
pub const DUMMY_CODEC_INFO: NACodecInfo = NACodecInfo {
                                name: "none",
                                properties: NACodecTypeInfo::None,
                                extradata: None };

/// A list of recognized frame types.
#[derive(Debug,Clone,Copy,PartialEq)]
#[allow(dead_code)]
pub enum FrameType {
    /// Intra frame type.
    I,
    /// Inter frame type.
    P,
    /// Skip frame.
    ///
    /// When such frame is encountered then last frame should be used again if it is needed.
    Skip,
    /// Some other frame type.
    Other,
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            FrameType::I => write!(f, "I"),
            FrameType::P => write!(f, "P"),
            FrameType::Skip => write!(f, "skip"),
            FrameType::Other => write!(f, "x"),
        }
    }
}

/// Timestamp information.
#[derive(Debug,Clone,Copy,PartialEq)]
pub struct NATimeInfo {
    /// Presentation timestamp.
    pub pts:      Option<u64>,
    /// Decode timestamp.
    pub dts:      Option<u64>,
    /// Duration (in timebase units).
    pub duration: Option<u64>,
    /// Timebase numerator.
    pub tb_num:   u32,
    /// Timebase denominator.
    pub tb_den:   u32,
}

impl NATimeInfo {
    /// Constructs a new `NATimeInfo` instance.
    pub fn new(pts: Option<u64>, dts: Option<u64>, duration: Option<u64>, tb_num: u32, tb_den: u32) -> Self {
        NATimeInfo { pts, dts, duration, tb_num, tb_den }
    }
    /// Returns presentation timestamp.
    pub fn get_pts(&self) -> Option<u64> { self.pts }
    /// Returns decoding timestamp.
    pub fn get_dts(&self) -> Option<u64> { self.dts }
    /// Returns duration.
    pub fn get_duration(&self) -> Option<u64> { self.duration }

    /// Converts time in milliseconds into timestamp.
    pub fn time_to_ts(time: u64, base: u64, tb_num: u32, tb_den: u32) -> u64 {
        let tb_num = u64::from(tb_num);
        let tb_den = u64::from(tb_den);
        let int = time / base;
        let frac = time % base;
        int * tb_den / tb_num + frac * tb_den / (tb_num * base)
    }
    /// Converts timestamp into time in milliseconds.
    pub fn ts_to_time(ts: u64, base: u64, tb_num: u32, tb_den: u32) -> u64 {
        let tb_num = u64::from(tb_num);
        let tb_den = u64::from(tb_den);
        let int = ts / tb_den;
        let frac = ts % tb_den;
        int * base * tb_num + frac * base * tb_num / tb_den
    }
}

/// A list of possible stream types.
#[derive(Debug,Clone,Copy,PartialEq)]
#[allow(dead_code)]
pub enum StreamType {
    /// Video stream.
    Video,
    /// Stream with generic data.
    Data,
    /// Unknown stream type.
    None,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StreamType::Video => write!(f, "Video"),
            StreamType::Data  => write!(f, "Data"),
            StreamType::None  => write!(f, "-"),
        }
    }
}

/// Stream information.
#[derive(Clone)]
pub struct NAStream {
    media_type: StreamType,
    id:         u32,
    num:        usize,
    info:       NACodecInfoRef,
    tb_num:     u32,
    tb_den:     u32,
    duration:   u64,
}

/// A specialised reference-counted `NAStream` type.
pub type NAStreamRef = Arc<NAStream>;

impl NAStream {
    /// Constructs a new `NAStream` instance.
    pub fn new(mt: StreamType, id: u32, info: NACodecInfo, tb_num: u32, tb_den: u32) -> Self {
        NAStream { media_type: mt, id, num: 0, info: info.into_ref(), tb_num, tb_den, duration: 0 }
    }
    /// Returns stream type.
    pub fn get_media_type(&self) -> StreamType { self.media_type }
    /// Returns stream ID.
    pub fn get_id(&self) -> u32 { self.id }
    /// Returns stream number assigned by demuxer.
    pub fn get_num(&self) -> usize { self.num }
    /// Sets stream number.
    pub fn set_num(&mut self, num: usize) { self.num = num; }
    /// Returns codec information.
    pub fn get_info(&self) -> NACodecInfoRef { self.info.clone() }
    /// Returns stream timebase.
    pub fn get_timebase(&self) -> (u32, u32) { (self.tb_num, self.tb_den) }
    /// Returns stream duration (in timebase units, zero if unknown).
    pub fn get_duration(&self) -> u64 { self.duration }
    /// Sets stream duration.
    pub fn set_duration(&mut self, duration: u64) { self.duration = duration; }
    /// Converts current instance into a reference-counted one.
    pub fn into_ref(self) -> NAStreamRef { Arc::new(self) }
}

impl fmt::Display for NAStream {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}#{} - {})", self.media_type, self.id, self.info.get_properties())
    }
}

/// Packet with compressed data.
#[allow(dead_code)]
pub struct NAPacket {
    stream:   NAStreamRef,
    ts:       NATimeInfo,
    buffer:   NABufferRef<Vec<u8>>,
    keyframe: bool,
}

impl NAPacket {
    /// Constructs a new `NAPacket` instance.
    pub fn new(stream: NAStreamRef, ts: NATimeInfo, kf: bool, vec: Vec<u8>) -> Self {
        NAPacket { stream, ts, keyframe: kf, buffer: NABufferRef::new(vec) }
    }
    /// Returns information about the stream packet belongs to.
    pub fn get_stream(&self) -> NAStreamRef { self.stream.clone() }
    /// Returns packet timestamp.
    pub fn get_time_information(&self) -> NATimeInfo { self.ts }
    /// Returns packet presentation timestamp.
    pub fn get_pts(&self) -> Option<u64> { self.ts.get_pts() }
    /// Reports whether this is a keyframe packet.
    pub fn is_keyframe(&self) -> bool { self.keyframe }
    /// Returns a reference to packet data.
    pub fn get_buffer(&self) -> NABufferRef<Vec<u8>> { self.buffer.clone() }
}

impl fmt::Display for NAPacket {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ostr = format!("[pkt for {} size {}", self.stream, self.buffer.len());
        if let Some(pts) = self.ts.pts { ostr = format!("{} pts {}", ostr, pts); }
        if self.keyframe { ostr = format!("{} kf", ostr); }
        ostr += "]";
        write!(f, "{}", ostr)
    }
}

/// Decoded frame information.
#[allow(dead_code)]
pub struct NAFrame {
    ts:     NATimeInfo,
    buffer: NABufferType,
    info:   NACodecInfoRef,
    ftype:  FrameType,
    key:    bool,
}

/// A specialised type for reference-counted `NAFrame`.
pub type NAFrameRef = Arc<NAFrame>;

impl NAFrame {
    /// Constructs a new `NAFrame` instance.
    pub fn new(ts: NATimeInfo, ftype: FrameType, keyframe: bool, info: NACodecInfoRef, buffer: NABufferType) -> Self {
        NAFrame { ts, ftype, key: keyframe, info, buffer }
    }
    /// Constructs a new instance of `NAFrame` taking timestamp from the packet.
    pub fn new_from_pkt(pkt: &NAPacket, info: NACodecInfoRef, buf: NABufferType) -> Self {
        NAFrame::new(pkt.ts, FrameType::Other, pkt.keyframe, info, buf)
    }
    /// Returns frame timestamp.
    pub fn get_time_information(&self) -> NATimeInfo { self.ts }
    /// Returns frame type.
    pub fn get_frame_type(&self) -> FrameType { self.ftype }
    /// Reports whether the frame is a keyframe.
    pub fn is_keyframe(&self) -> bool { self.key }
    /// Sets new frame type.
    pub fn set_frame_type(&mut self, ftype: FrameType) { self.ftype = ftype; }
    /// Sets keyframe flag.
    pub fn set_keyframe(&mut self, key: bool) { self.key = key; }
    /// Returns frame data.
    pub fn get_buffer(&self) -> NABufferType { self.buffer.clone() }
    /// Converts current instance into a reference-counted one.
    pub fn into_ref(self) -> NAFrameRef { Arc::new(self) }
}

impl fmt::Display for NAFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ostr = format!("frame type {}", self.ftype);
        if let Some(pts) = self.ts.pts { ostr = format!("{} pts {}", ostr, pts); }
        if self.key { ostr = format!("{} kf", ostr); }
        write!(f, "[{}]", ostr)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_alloc_rgb565() {
        let vinfo = NAVideoInfo::new(6, 3, false, RGB565_FORMAT);
        let buf = alloc_video_buffer(vinfo, 2).unwrap();
        let vbuf = buf.get_vbuf16().unwrap();
        assert_eq!(vbuf.get_stride(0), 8);
        assert_eq!(vbuf.get_offset(0), 0);
        assert_eq!(vbuf.get_data().len(), 32);
        assert_eq!(vbuf.get_dimensions(0), (6, 3));

        let vinfo = NAVideoInfo::new(4, 4, false, RGB565_FORMAT);
        let buf = alloc_video_buffer(vinfo, 2).unwrap();
        let vbuf = buf.get_vbuf16().unwrap();
        assert_eq!(vbuf.get_stride(0), 4);
        assert_eq!(vbuf.get_data().len(), 16);
    }
}
