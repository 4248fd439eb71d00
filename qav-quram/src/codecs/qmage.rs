use qav_core::codecs::*;
use qav_core::io::bitreader::*;
use qav_core::io::byteio::*;
use super::qmagedata::*;

const QMAGE_MAGIC: u16 = 0x514D;
const QVERSION_LEGACY: u8 = 0xB;
const QCODEC_W2_PASS: u8 = 1;

#[allow(dead_code)]
#[derive(Clone,Copy,Debug,Default,PartialEq)]
struct QmageHeader {
    qversion:             u8,
    raw_type:             u8,
    transparency:         bool,

    qp:                   u8,
    not_comp:             bool,
    use_chroma_key:       bool,
    mode:                 bool,

    encoder_mode:         u8,
    is_dynamic_table:     bool,
    alpha_depth:          u8,
    depth:                u8,
    use_extra_exception:  bool,

    width:                usize,
    height:               usize,

    near_lossless:        bool,

    android_support:      bool,
    is_gray_type:         bool,
    use_index_color:      bool,
    pre_multiplied:       bool,
    not_alpha_comp:       bool,
    is_opaque:            bool,
    nine_patched:         bool,

    alpha_position:       u32,
    alpha_encoder_mode:   u8,

    total_frame_number:   u16,
    current_frame_number: u16,
    animation_delay_time: u16,
    animation_no_repeat:  u8,

    header_size:          usize,

    color_count:          u32,
}

impl QmageHeader {
    fn parse(src: &[u8]) -> DecoderResult<Self> {
        if src.len() < 12 {
            return Err(DecoderError::ShortData);
        }
        let mut mr = MemoryReader::new_read(src);
        let mut br = ByteReader::new(&mut mr);
        let mut hdr = Self::default();

        validate!(br.read_u16be()? == QMAGE_MAGIC);

        hdr.qversion = br.read_byte()?;
        if hdr.qversion < QVERSION_LEGACY {
            return Err(DecoderError::NotImplemented);
        }

        hdr.raw_type = br.read_byte()?;
        hdr.transparency = match hdr.raw_type {
                0     => false, // RGB565
                3 | 6 => true,  // RGBA5658, RGBA
                _     => return Err(DecoderError::NotImplemented),
            };

        let flags4 = br.read_byte()?;
        hdr.qp             = flags4 & 0x1F;
        hdr.not_comp       = (flags4 & 0x20) != 0;
        hdr.use_chroma_key = (flags4 & 0x40) != 0;
        hdr.mode           = (flags4 & 0x80) != 0;

        let flags5 = br.read_byte()?;
        if hdr.qversion == QVERSION_LEGACY {
            hdr.encoder_mode = flags5 & 0x7;
        } else {
            hdr.encoder_mode = flags5 & 0xF;
            hdr.is_dynamic_table = (flags5 & 0x10) != 0;
        }
        hdr.alpha_depth         = if (flags5 & 0x20) != 0 { 2 } else { 1 };
        hdr.depth               = if (flags5 & 0x40) != 0 { 2 } else { 1 };
        hdr.use_extra_exception = (flags5 & 0x80) != 0;

        hdr.width  = usize::from(br.read_u16le()?);
        hdr.height = usize::from(br.read_u16le()?);
        validate!(hdr.width > 0 && hdr.height > 0);

        let flags10 = br.read_byte()?;
        hdr.near_lossless = (flags10 & 0x40) != 0;

        let flags11 = br.read_byte()?;
        // android_support and is_gray_type share a flag bit
        hdr.android_support = (flags11 & 0x04) != 0;
        hdr.is_gray_type    = (flags11 & 0x04) != 0;
        hdr.use_index_color = (flags11 & 0x08) != 0;
        hdr.pre_multiplied  = (flags11 & 0x10) != 0;
        hdr.is_opaque       = (flags11 & 0x20) != 0;
        hdr.not_alpha_comp  = (flags11 & 0x40) != 0;
        hdr.nine_patched    = (flags11 & 0x80) != 0;

        if hdr.qversion == QVERSION_LEGACY {
            if hdr.transparency || hdr.mode {
                hdr.alpha_position = br.read_u32le()?;
            }
            hdr.alpha_encoder_mode = hdr.encoder_mode;
        } else {
            hdr.alpha_position = u32::from(br.read_u16le()?);
            let flags14 = br.read_byte()?;
            hdr.alpha_encoder_mode = flags14 & 0xF;
            br.read_skip(1)?;
        }

        if hdr.mode {
            hdr.total_frame_number   = br.read_u16le()?;
            hdr.current_frame_number = br.read_u16le()?;
            hdr.animation_delay_time = br.read_u16le()?;
            hdr.animation_no_repeat  = br.read_byte()?;
            br.read_skip(1)?;
        } else {
            hdr.total_frame_number   = 1;
            hdr.current_frame_number = 1;
        }

        // non-keyframes carry a pre-scaled alpha pointer
        if hdr.qversion > QVERSION_LEGACY && (!hdr.mode || hdr.current_frame_number <= 1) {
            hdr.alpha_position *= 4;
        }

        hdr.header_size = if hdr.mode {
                24
            } else if hdr.transparency {
                16
            } else {
                12
            };

        if hdr.use_index_color {
            if hdr.nine_patched {
                br.read_skip(4)?;
            }
            hdr.color_count = br.read_u32le()?;
        }

        Ok(hdr)
    }
}

fn get_pixel(src: &[u16], off: usize, stride: usize, w: usize, h: usize, x: isize, y: isize) -> u16 {
    if x >= 0 && (x as usize) < w && y >= 0 && (y as usize) < h {
        src[off + (y as usize) * stride + (x as usize)]
    } else {
        0
    }
}

fn copy_edge(dst: &mut [u16], off: usize, stride: usize, bw: usize, bh: usize) {
    for j in 0..bh {
        let v = dst[off + j * stride - 1];
        for i in 0..bw {
            dst[off + j * stride + i] = v;
        }
    }
}

fn copy_block(dst: &mut [u16], mut doff: usize, dstride: usize,
              src: &[u16], mut soff: usize, sstride: usize, bw: usize, bh: usize) {
    for _ in 0..bh {
        dst[doff..][..bw].copy_from_slice(&src[soff..][..bw]);
        doff += dstride;
        soff += sstride;
    }
}

fn read_intra_pixel(gb1: &mut BitReader, gb2: &mut BitReader, gb3: &mut ByteReader,
                    ori_delta: &[u16], refpix: u16) -> DecoderResult<u16> {
    let nb_bits = gb2.read(3)? as u8;
    if nb_bits == 7 {
        Ok(gb3.read_u16le()?)
    } else {
        let idx = gb1.read(nb_bits + 1)? as usize;
        Ok(refpix.wrapping_add(ori_delta[idx + (2usize << nb_bits) - 2]))
    }
}

fn decode_pixel(gb1: &mut BitReader, gb2: &mut ByteReader,
                ori_delta: &[u16], refpix: u16) -> DecoderResult<u16> {
    if gb1.read_bool()? {
        Ok(refpix)
    } else {
        let nb_bits = gb1.read(3)? as u8;
        if nb_bits == 7 {
            Ok(gb2.read_u16le()?)
        } else {
            let idx = gb1.read(nb_bits + 1)? as usize;
            Ok(refpix.wrapping_add(ori_delta[idx + (2usize << nb_bits) - 2]))
        }
    }
}

fn decode_a9ll(hdr: &QmageHeader, src: &[u8], buf: &mut NAVideoBufferRef<u16>) -> DecoderResult<()> {
    let size = src.len();
    let hsize = hdr.header_size;
    validate!(size >= hsize + 8);
    validate!((hdr.width & 3) == 0 && (hdr.height & 3) == 0);

    let gb1_start = read_u32le(&src[hsize..])? as usize;
    let gb3_start = read_u32le(&src[hsize + 4..])? as usize;
    validate!(gb1_start >= hsize + 8 && gb1_start <= size);
    validate!(gb3_start >= hsize + 8 && gb3_start <= size);

    let mut gb1 = BitReader::new(&src[hsize + 8..gb1_start], gb1_start - hsize - 8);
    let mut gb2 = BitReader::new(&src[gb1_start..], size - gb1_start);
    let mut mr3 = MemoryReader::new_read(&src[gb3_start..]);
    let mut gb3 = ByteReader::new(&mut mr3);

    let mut dyn_delta = [0u16; 512];
    let ori_delta: &[u16] = if hdr.is_dynamic_table {
            let mut sign = [0u8; 512];
            for el in sign.iter_mut() {
                *el = gb3.read_byte()?;
            }
            for (el, &sgn) in dyn_delta.iter_mut().zip(sign.iter()) {
                let val = gb3.read_u16le()?;
                *el = if sgn != 0 { val } else { val.wrapping_neg() };
            }
            // indexing starts from the second element
            &dyn_delta[1..]
        } else {
            &QMAGE_ORI_DELTA[usize::from(hdr.qversion != QVERSION_LEGACY)]
        };

    let (w, h) = (hdr.width, hdr.height);
    let off = buf.get_offset(0);
    let stride = buf.get_stride(0);
    let data = buf.get_data_mut().unwrap();
    let dst = data.as_mut_slice();

    for y in (0..h).step_by(4) {
        for x in (0..w).step_by(4) {
            let mode = gb1.read(2)? as usize;
            if mode < 3 {
                let cbp = gb3.read_u16le()?;
                let (dx, dy) = QMAGE_DIR[mode];
                for j in 0..4 {
                    for i in 0..4 {
                        let k = j * 4 + i;
                        if x + i >= w || y + j >= h { continue; }
                        let refpix = get_pixel(dst, off, stride, w, h,
                                               (x + i) as isize + dx, (y + j) as isize + dy);
                        let v = if (cbp >> k) & 1 != 0 {
                                refpix
                            } else {
                                read_intra_pixel(&mut gb1, &mut gb2, &mut gb3, ori_delta, refpix)?
                            };
                        dst[off + (y + j) * stride + x + i] = v;
                    }
                }
            } else if x > 0 {
                copy_edge(dst, off + y * stride + x, stride, (w - x).min(4), (h - y).min(4));
            }
        }
    }
    Ok(())
}

struct InterContext {
    width:   usize,
    height:  usize,
    doff:    usize,
    dstride: usize,
    roff:    usize,
    rstride: usize,
    qp:      u8,
}

impl InterContext {
    fn decode_block2(&self, gb1: &mut BitReader, gb2: &mut ByteReader, dst: &mut [u16],
                     ori_delta: &[u16], x: usize, y: usize) -> DecoderResult<()> {
        let mode = gb1.read(2)? as usize;
        if self.qp != 0 && !gb1.read_bool()? {
            return Err(DecoderError::NotImplemented);
        }
        if mode < 3 {
            let (dx, dy) = QMAGE_DIR[mode];
            for j in 0..4 {
                for i in 0..4 {
                    let refpix = get_pixel(dst, self.doff, self.dstride, self.width, self.height,
                                           (x + i) as isize + dx, (y + j) as isize + dy);
                    let v = decode_pixel(gb1, gb2, ori_delta, refpix)?;
                    dst[self.doff + (y + j) * self.dstride + x + i] = v;
                }
            }
        } else if x > 0 {
            copy_edge(dst, self.doff + y * self.dstride + x, self.dstride, 4, 4);
        }
        Ok(())
    }

    fn decode_block3(&self, gb1: &mut BitReader, gb2: &mut ByteReader,
                     dst: &mut [u16], refs: &[u16], ori_delta: &[u16],
                     x: usize, y: usize, mv_x: i32, mv_y: i32) -> DecoderResult<()> {
        let mode = gb1.read(3)? as usize;
        if self.qp != 0 && !gb1.read_bool()? {
            return Err(DecoderError::NotImplemented);
        }
        match mode {
            0..=2 => {
                let (dx, dy) = QMAGE_DIR[mode];
                for j in 0..4 {
                    for i in 0..4 {
                        let refpix = get_pixel(dst, self.doff, self.dstride, self.width, self.height,
                                               (x + i) as isize + dx, (y + j) as isize + dy);
                        let v = decode_pixel(gb1, gb2, ori_delta, refpix)?;
                        dst[self.doff + (y + j) * self.dstride + x + i] = v;
                    }
                }
            }
            3 => {
                if x > 0 {
                    copy_edge(dst, self.doff + y * self.dstride + x, self.dstride, 4, 4);
                }
            }
            4 => {
                for j in 0..4 {
                    for i in 0..4 {
                        let refpix = get_pixel(refs, self.roff, self.rstride, self.width, self.height,
                                               (x + i) as isize, (y + j) as isize);
                        let v = decode_pixel(gb1, gb2, ori_delta, refpix)?;
                        dst[self.doff + (y + j) * self.dstride + x + i] = v;
                    }
                }
            }
            5 => {
                copy_block(dst, self.doff + y * self.dstride + x, self.dstride,
                           refs, self.roff + y * self.rstride + x, self.rstride, 4, 4);
            }
            6 => {
                for j in 0..4 {
                    for i in 0..4 {
                        let refpix = get_pixel(refs, self.roff, self.rstride, self.width, self.height,
                                               (x + i) as isize + mv_x as isize,
                                               (y + j) as isize + mv_y as isize);
                        let v = decode_pixel(gb1, gb2, ori_delta, refpix)?;
                        dst[self.doff + (y + j) * self.dstride + x + i] = v;
                    }
                }
            }
            _ => {
                let sx = x as i32 + mv_x;
                let sy = y as i32 + mv_y;
                if sx < 0 || sx + 4 > self.width as i32 || sy < 0 || sy + 4 > self.height as i32 {
                    println!("offscreen mv");
                    return Ok(());
                }
                copy_block(dst, self.doff + y * self.dstride + x, self.dstride,
                           refs, self.roff + (sy as usize) * self.rstride + (sx as usize),
                           self.rstride, 4, 4);
            }
        }
        Ok(())
    }

    fn decode_mb(&self, gb1: &mut BitReader, gb2: &mut ByteReader,
                 dst: &mut [u16], refs: &[u16], ori_delta: &[u16],
                 x: usize, y: usize) -> DecoderResult<()> {
        if gb1.read_bool()? {
            if gb1.read_bool()? {
                copy_block(dst, self.doff + y * self.dstride + x, self.dstride,
                           refs, self.roff + y * self.rstride + x, self.rstride, 16, 16);
                return Ok(());
            }
            let mut mv_x = 0i32;
            let mut mv_y = 0i32;
            if !gb1.read_bool()? {
                mv_x = gb1.read(8)? as i32 - 0x7F;
                mv_y = gb1.read(7)? as i32 - 0x3F;
                let sx = x as i32 + mv_x;
                let sy = y as i32 + mv_y;
                if sx < 0 || sx + 16 > self.width as i32 || sy < 0 || sy + 16 > self.height as i32 {
                    println!("offscreen mv");
                    return Err(DecoderError::InvalidData);
                }
                if gb1.read_bool()? {
                    copy_block(dst, self.doff + y * self.dstride + x, self.dstride,
                               refs, self.roff + (sy as usize) * self.rstride + (sx as usize),
                               self.rstride, 16, 16);
                    return Ok(());
                }
            }
            for j in (0..16).step_by(4) {
                for i in (0..16).step_by(4) {
                    self.decode_block3(gb1, gb2, dst, refs, ori_delta, x + i, y + j, mv_x, mv_y)?;
                }
            }
        } else {
            for j in (0..16).step_by(4) {
                for i in (0..16).step_by(4) {
                    self.decode_block2(gb1, gb2, dst, ori_delta, x + i, y + j)?;
                }
            }
        }
        Ok(())
    }

    fn decode_mb_edge(&self, gb1: &mut BitReader, gb2: &mut ByteReader,
                      dst: &mut [u16], ori_delta: &[u16],
                      xpos: usize, ypos: usize) -> DecoderResult<()> {
        if gb1.read_bool()? {
            return Err(DecoderError::NotImplemented);
        }
        for y in (ypos..(ypos + 16).min(self.height)).step_by(4) {
            for x in (xpos..(xpos + 16).min(self.width)).step_by(4) {
                if x + 4 <= self.width && y + 4 <= self.height {
                    let mode = gb1.read(2)? as usize;
                    if mode < 3 {
                        let (dx, dy) = QMAGE_DIR[mode];
                        for j in 0..4 {
                            for i in 0..4 {
                                if x + i >= self.width || y + j >= self.height { continue; }
                                let refpix = get_pixel(dst, self.doff, self.dstride,
                                                       self.width, self.height,
                                                       (x + i) as isize + dx, (y + j) as isize + dy);
                                let v = decode_pixel(gb1, gb2, ori_delta, refpix)?;
                                dst[self.doff + (y + j) * self.dstride + x + i] = v;
                            }
                        }
                    } else if x > 0 {
                        copy_edge(dst, self.doff + y * self.dstride + x, self.dstride,
                                  (self.width - x).min(4), (self.height - y).min(4));
                    }
                } else {
                    // cells straddling the picture edge carry raw pixels
                    for j in 0..4 {
                        for i in 0..4 {
                            if x + i < self.width && y + j < self.height {
                                dst[self.doff + (y + j) * self.dstride + x + i] = gb2.read_u16le()?;
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn decode_a9ll_ani(hdr: &QmageHeader, src: &[u8], buf: &mut NAVideoBufferRef<u16>,
                   ref_buf: &NAVideoBufferRef<u16>) -> DecoderResult<()> {
    let size = src.len();
    let hsize = hdr.header_size;
    validate!(size >= hsize + 8);
    validate!((hdr.width & 3) == 0 && (hdr.height & 3) == 0);

    let gb1_start = read_u32le(&src[hsize..])? as usize;
    validate!(gb1_start >= hsize + 8 && gb1_start <= size);

    let mut gb1 = BitReader::new(&src[hsize + 8..gb1_start], gb1_start - hsize - 8);
    let mut mr2 = MemoryReader::new_read(&src[gb1_start..]);
    let mut gb2 = ByteReader::new(&mut mr2);

    let ori_delta: &[u16] = &QMAGE_ORI_DELTA[usize::from(hdr.qversion != QVERSION_LEGACY)];

    let ctx = InterContext {
            width:   hdr.width,
            height:  hdr.height,
            doff:    buf.get_offset(0),
            dstride: buf.get_stride(0),
            roff:    ref_buf.get_offset(0),
            rstride: ref_buf.get_stride(0),
            qp:      hdr.qp,
        };
    let rdata = ref_buf.get_data();
    let refs = rdata.as_slice();
    let data = buf.get_data_mut().unwrap();
    let dst = data.as_mut_slice();

    for y in (0..ctx.height).step_by(16) {
        for x in (0..ctx.width).step_by(16) {
            if ctx.width - x >= 16 && ctx.height - y >= 16 {
                ctx.decode_mb(&mut gb1, &mut gb2, dst, refs, ori_delta, x, y)?;
            } else {
                ctx.decode_mb_edge(&mut gb1, &mut gb2, dst, ori_delta, x, y)?;
            }
        }
    }
    Ok(())
}

fn read_value(br: &mut ByteReader) -> DecoderResult<usize> {
    let mut val = 0;
    while br.peek_byte()? == 0xFF {
        br.read_skip(1)?;
        val += 0xFF;
    }
    Ok(val + usize::from(br.read_byte()?))
}

fn decode_w2_aligned(w: usize, h: usize, data: &[u8],
                     gb1: &mut ByteReader, gb2: &mut ByteReader, gb3: &mut ByteReader,
                     dst: &mut [u16]) -> DecoderResult<()> {
    let size = data.len();
    let dim = w * h;
    let mut counter = 0;
    while counter < dim {
        let idx = read_value(gb1)?;
        if idx == 0 {
            let val = gb3.read_u32le()?;
            dst[counter]     = val as u16;
            dst[counter + 1] = (val >> 16) as u16;
            counter += 2;
        } else {
            let idx = idx - 1;
            validate!(idx * 4 + 4 <= size - 16);
            let val = read_u32le(&data[16 + idx * 4..])?;
            let run = read_value(gb2)? + 1;
            let p0 = val as u16;
            let p1 = (val >> 16) as u16;
            for i in 0..run.min((dim - counter) / 2) {
                dst[counter + i * 2]     = p0;
                dst[counter + i * 2 + 1] = p1;
            }
            counter += run * 2;
        }
    }
    Ok(())
}

fn decode_w2_unaligned(w: usize, h: usize, data: &[u8],
                       gb1: &mut ByteReader, gb2: &mut ByteReader, gb3: &mut ByteReader,
                       dst: &mut [u16], off: usize, stride: usize) -> DecoderResult<()> {
    let size = data.len();
    let mut x = 0;
    let mut y = 0;
    macro_rules! put_pixel {
        ($v: expr) => {
            dst[off + y * stride + x] = $v;
            x += 1;
            if x >= w {
                x = 0;
                y += 1;
                if y >= h {
                    return Ok(());
                }
            }
        };
    }
    loop {
        let idx = read_value(gb1)?;
        if idx == 0 {
            let v1 = gb3.read_u16le()?;
            let v2 = gb3.read_u16le()?;
            put_pixel!(v1);
            put_pixel!(v2);
        } else {
            let idx = idx - 1;
            validate!(idx * 4 + 4 <= size - 16);
            let v1 = read_u16le(&data[16 + idx * 4..])?;
            let v2 = read_u16le(&data[16 + idx * 4 + 2..])?;
            let run = read_value(gb2)? + 1;
            for _ in 0..run {
                put_pixel!(v1);
                put_pixel!(v2);
            }
        }
    }
}

fn decode_w2_pass_depth1(hdr: &QmageHeader, data: &[u8], buf: &mut NAVideoBufferRef<u16>) -> DecoderResult<()> {
    let size = data.len();
    validate!(size >= 16);

    let cnt_table = read_u32le(data)? as usize;
    let size_idx  = read_u32le(&data[4..])? as usize;
    let size_run  = read_u32le(&data[8..])? as usize;

    let start1 = 16 + cnt_table * 4;
    let start2 = start1 + size_idx;
    let start3 = start2 + size_run;
    validate!(start1 < size && start2 < size && start3 <= size);

    let mut mr1 = MemoryReader::new_read(&data[start1..]);
    let mut gb1 = ByteReader::new(&mut mr1);
    let mut mr2 = MemoryReader::new_read(&data[start2..]);
    let mut gb2 = ByteReader::new(&mut mr2);
    let mut mr3 = MemoryReader::new_read(&data[start3..]);
    let mut gb3 = ByteReader::new(&mut mr3);

    let (w, h) = (hdr.width, hdr.height);
    let off = buf.get_offset(0);
    let stride = buf.get_stride(0);
    let bdata = buf.get_data_mut().unwrap();
    let dst = bdata.as_mut_slice();

    if stride == w {
        decode_w2_aligned(w, h, data, &mut gb1, &mut gb2, &mut gb3, &mut dst[off..])
    } else {
        decode_w2_unaligned(w, h, data, &mut gb1, &mut gb2, &mut gb3, dst, off, stride)
    }
}

fn rd16(src: &[u8], pos: usize) -> u16 {
    u16::from(src[pos]) | (u16::from(src[pos + 1]) << 8)
}

fn wr16(dst: &mut [u8], pos: usize, val: u16) {
    dst[pos]     = val as u8;
    dst[pos + 1] = (val >> 8) as u8;
}

fn strip_refresh(gb1: &mut BitReader, gb2: &mut ByteReader, gb3: &mut ByteReader,
                 rel: &mut usize) -> DecoderResult<()> {
    if !gb1.read_bool()? {
        *rel = if gb1.read_bool()? {
                usize::from(gb2.read_byte()?)
            } else {
                usize::from(gb3.read_u16le()?)
            };
    }
    Ok(())
}

fn strip_first(gb1: &mut BitReader, gb2: &mut ByteReader, gb3: &mut ByteReader,
               rel: &mut usize, dst: &mut [u8]) -> DecoderResult<()> {
    let head = gb3.read_u32le()?;
    dst[0..4].copy_from_slice(&head.to_le_bytes());
    let mut d_pos = 4;
    for i in 0..6 {
        if (i & 1) == 0 {
            strip_refresh(gb1, gb2, gb3, rel)?;
        }
        let v = if !gb1.read_bool()? {
                if !gb1.read_bool()? {
                    validate!(d_pos >= *rel * 2);
                    rd16(dst, d_pos - *rel * 2) ^ QMAGE_DIFF[usize::from(gb2.read_byte()?)]
                } else {
                    gb3.read_u16le()?
                }
            } else {
                validate!(d_pos >= *rel * 2);
                rd16(dst, d_pos - *rel * 2)
            };
        wr16(dst, d_pos, v);
        d_pos += 2;
    }
    Ok(())
}

fn strip_masked(gb1: &mut BitReader, gb2: &mut ByteReader, gb3: &mut ByteReader,
                rel: &mut usize, dst: &mut [u8], mut d_pos: usize) -> DecoderResult<()> {
    let mask = gb2.read_byte()?;
    for i in 0..8 {
        if (i & 1) == 0 {
            strip_refresh(gb1, gb2, gb3, rel)?;
        }
        let v = if (mask & (1u8 << (7 - i))) == 0 {
                if !gb1.read_bool()? {
                    validate!(d_pos >= *rel * 2);
                    rd16(dst, d_pos - *rel * 2) ^ QMAGE_DIFF[usize::from(gb2.read_byte()?)]
                } else {
                    gb3.read_u16le()?
                }
            } else {
                validate!(d_pos >= *rel * 2);
                rd16(dst, d_pos - *rel * 2)
            };
        wr16(dst, d_pos, v);
        d_pos += 2;
    }
    Ok(())
}

fn decode_w2_pass_depth2(hdr: &QmageHeader, data: &[u8], buf: &mut NAVideoBufferRef<u16>) -> DecoderResult<()> {
    let size = data.len();
    validate!(size >= 12);

    let bsize = read_u32le(data)? as usize;
    validate!(bsize >= 16);
    let len1 = read_u32le(&data[4..])? as usize;
    let len2 = read_u32le(&data[8..])? as usize;
    validate!(12 + len1 + len2 <= size);

    let mut bdata = vec![0u8; bsize];
    let mut gb1 = BitReader::new(&data[12..12 + len1], len1);
    let mut mr2 = MemoryReader::new_read(&data[12 + len1..12 + len1 + len2]);
    let mut gb2 = ByteReader::new(&mut mr2);
    let mut mr3 = MemoryReader::new_read(&data[12 + len1 + len2..]);
    let mut gb3 = ByteReader::new(&mut mr3);

    let mut rel = 1;
    strip_first(&mut gb1, &mut gb2, &mut gb3, &mut rel, &mut bdata)?;

    let mut d_pos = 16;
    while d_pos < (bsize & !15) {
        if !gb1.read_bool()? {
            if !gb1.read_bool()? {
                gb3.read_buf(&mut bdata[d_pos..d_pos + 16])?;
            } else {
                validate!(d_pos >= rel * 2);
                for j in 0..8 {
                    let v = rd16(&bdata, d_pos - rel * 2 + j * 2);
                    wr16(&mut bdata, d_pos + j * 2, v);
                }
            }
        } else {
            strip_masked(&mut gb1, &mut gb2, &mut gb3, &mut rel, &mut bdata, d_pos)?;
        }
        d_pos += 16;
    }
    if (bsize & 15) != 0 {
        gb2.read_buf(&mut bdata[d_pos..bsize])?;
    }

    decode_w2_pass_depth1(hdr, &bdata, buf)
}

struct QmageDecoder {
    info:       NACodecInfoRef,
    last_frame: Option<NAVideoBufferRef<u16>>,
}

impl QmageDecoder {
    fn new() -> Self {
        Self { info: NACodecInfoRef::default(), last_frame: None }
    }
}

impl NADecoder for QmageDecoder {
    fn init(&mut self, info: NACodecInfoRef) -> DecoderResult<()> {
        if let NACodecTypeInfo::Video(vinfo) = info.get_properties() {
            let myinfo = NACodecTypeInfo::Video(NAVideoInfo::new(vinfo.get_width(), vinfo.get_height(), false, RGB565_FORMAT));
            self.info = NACodecInfo::new_ref(info.get_name(), myinfo, info.get_extradata()).into_ref();
            Ok(())
        } else {
            Err(DecoderError::InvalidData)
        }
    }
    fn decode(&mut self, pkt: &NAPacket) -> DecoderResult<NAFrameRef> {
        let src = pkt.get_buffer();
        let hdr = QmageHeader::parse(&src)?;
        if hdr.use_extra_exception {
            return Err(DecoderError::NotImplemented);
        }

        let myvinfo = NAVideoInfo::new(hdr.width, hdr.height, false, RGB565_FORMAT);
        let bufinfo = alloc_video_buffer(myvinfo, 2)?;
        let mut buf = bufinfo.get_vbuf16().unwrap();

        let is_intra = if hdr.mode {
                if hdr.current_frame_number == 1 {
                    decode_a9ll(&hdr, &src, &mut buf)?;
                    true
                } else {
                    let ref_buf = match self.last_frame {
                            Some(ref frm) => frm.clone(),
                            None => return Err(DecoderError::MissingReference),
                        };
                    let rinfo = ref_buf.get_info();
                    validate!(rinfo.get_width() == hdr.width && rinfo.get_height() == hdr.height);
                    decode_a9ll_ani(&hdr, &src, &mut buf, &ref_buf)?;
                    false
                }
            } else {
                if hdr.use_index_color || hdr.encoder_mode != QCODEC_W2_PASS {
                    return Err(DecoderError::NotImplemented);
                }
                let payload = &src[hdr.header_size..];
                match hdr.depth {
                    1 => decode_w2_pass_depth1(&hdr, payload, &mut buf)?,
                    2 => decode_w2_pass_depth2(&hdr, payload, &mut buf)?,
                    _ => return Err(DecoderError::InvalidData),
                }
                true
            };

        self.last_frame = Some(buf.clone());

        let mut frm = NAFrame::new_from_pkt(pkt, self.info.clone(), bufinfo);
        frm.set_keyframe(is_intra);
        frm.set_frame_type(if is_intra { FrameType::I } else { FrameType::P });
        Ok(frm.into_ref())
    }
    fn flush(&mut self) {
        self.last_frame = None;
    }
}

pub fn get_decoder() -> Box<dyn NADecoder> {
    Box::new(QmageDecoder::new())
}

#[cfg(test)]
mod test {
    use super::*;

    struct BitWriter {
        data:  Vec<u8>,
        avail: u8,
    }

    impl BitWriter {
        fn new() -> Self { Self { data: Vec::new(), avail: 0 } }
        fn put_bit(&mut self, bit: bool) {
            if self.avail == 0 {
                self.data.push(0);
                self.avail = 8;
            }
            if bit {
                let last = self.data.last_mut().unwrap();
                *last |= 1 << (self.avail - 1);
            }
            self.avail -= 1;
        }
        fn put_bits(&mut self, val: u32, len: u8) {
            for i in (0..len).rev() {
                self.put_bit(((val >> i) & 1) != 0);
            }
        }
        fn into_bytes(self) -> Vec<u8> { self.data }
    }

    fn video_stream(width: usize, height: usize) -> NAStreamRef {
        let vinfo = NAVideoInfo::new(width, height, false, RGB565_FORMAT);
        let info = NACodecInfo::new("qmage", NACodecTypeInfo::Video(vinfo), None);
        NAStream::new(StreamType::Video, 0, info, 1, 15).into_ref()
    }

    fn make_packet(width: usize, height: usize, data: Vec<u8>) -> NAPacket {
        let ts = NATimeInfo::new(Some(0), None, None, 1, 15);
        NAPacket::new(video_stream(width, height), ts, true, data)
    }

    fn new_decoder(width: usize, height: usize) -> QmageDecoder {
        let mut dec = QmageDecoder::new();
        let vinfo = NAVideoInfo::new(width, height, false, RGB565_FORMAT);
        let info = NACodecInfo::new("qmage", NACodecTypeInfo::Video(vinfo), None).into_ref();
        dec.init(info).unwrap();
        dec
    }

    fn still_header(raw_type: u8, flags5: u8, width: u16, height: u16) -> Vec<u8> {
        let mut hdr = vec![0x51, 0x4D, 0x0B, raw_type, 0x00, flags5];
        hdr.extend_from_slice(&width.to_le_bytes());
        hdr.extend_from_slice(&height.to_le_bytes());
        hdr.push(0x00);
        hdr.push(0x00);
        hdr
    }

    fn anim_header(qversion: u8, flags5: u8, width: u16, height: u16, total: u16, current: u16) -> Vec<u8> {
        let mut hdr = vec![0x51, 0x4D, qversion, 0x03, 0x80, flags5];
        hdr.extend_from_slice(&width.to_le_bytes());
        hdr.extend_from_slice(&height.to_le_bytes());
        hdr.push(0x00);
        hdr.push(0x00);
        if qversion == 0x0B {
            hdr.extend_from_slice(&0x20u32.to_le_bytes());
        } else {
            hdr.extend_from_slice(&0u16.to_le_bytes());
            hdr.push(0x00);
            hdr.push(0x00);
        }
        hdr.extend_from_slice(&total.to_le_bytes());
        hdr.extend_from_slice(&current.to_le_bytes());
        hdr.extend_from_slice(&0u16.to_le_bytes());
        hdr.push(0x00);
        hdr.push(0x00);
        hdr
    }

    fn stripes_frame() -> NAVideoBufferRef<u16> {
        let vinfo = NAVideoInfo::new(16, 16, false, RGB565_FORMAT);
        let mut buf = alloc_video_buffer(vinfo, 2).unwrap().get_vbuf16().unwrap();
        let stride = buf.get_stride(0);
        let data = buf.get_data_mut().unwrap();
        for y in 0..16 {
            let val = if y < 8 { 0xF800 } else { 0x07E0 };
            for x in 0..16 {
                data[y * stride + x] = val;
            }
        }
        buf
    }

    #[test]
    fn test_qmage_header_reparse() {
        let hdr_bytes = anim_header(0x0B, 0x00, 8, 4, 2, 1);
        let hdr1 = QmageHeader::parse(&hdr_bytes).unwrap();
        let hdr2 = QmageHeader::parse(&hdr_bytes).unwrap();
        assert_eq!(hdr1, hdr2);
        assert_eq!(hdr1.header_size, 24);
        assert!(hdr1.transparency);
        assert!(hdr1.mode);
        assert_eq!(hdr1.alpha_position, 0x20);
        assert_eq!(hdr1.total_frame_number, 2);
    }

    #[test]
    fn test_qmage_bad_magic() {
        let mut dec = new_decoder(4, 4);
        let pkt = make_packet(4, 4, vec![0; 12]);
        assert!(matches!(dec.decode(&pkt), Err(DecoderError::InvalidData)));
    }

    #[test]
    fn test_qmage_short_header() {
        let mut dec = new_decoder(4, 4);
        let pkt = make_packet(4, 4, vec![0x51, 0x4D, 0x0B, 0x00]);
        assert!(matches!(dec.decode(&pkt), Err(DecoderError::ShortData)));
    }

    #[test]
    fn test_qmage_still_unknown_encoder() {
        let data = still_header(0x00, 0x02, 4, 4);
        let mut dec = new_decoder(4, 4);
        assert!(matches!(dec.decode(&make_packet(4, 4, data)), Err(DecoderError::NotImplemented)));
    }

    #[test]
    fn test_qmage_w2_depth1_zero() {
        let mut data = still_header(0x00, 0x01, 4, 4);
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&[0; 32]);
        let mut dec = new_decoder(4, 4);
        let frm = dec.decode(&make_packet(4, 4, data)).unwrap();
        assert!(frm.is_keyframe());
        assert_eq!(frm.get_frame_type(), FrameType::I);
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        assert!(buf.get_data().iter().all(|&px| px == 0));
    }

    #[test]
    fn test_qmage_w2_depth1_run() {
        let mut data = still_header(0x00, 0x01, 4, 4);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0xF800_F800u32.to_le_bytes());
        data.push(0x01);
        data.extend_from_slice(&[0; 7]);
        data.push(0x00);
        for _ in 0..7 {
            data.extend_from_slice(&0x07E0_07E0u32.to_le_bytes());
        }
        let mut dec = new_decoder(4, 4);
        let frm = dec.decode(&make_packet(4, 4, data)).unwrap();
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        let pixels = buf.get_data();
        assert!(pixels[..2].iter().all(|&px| px == 0xF800));
        assert!(pixels[2..16].iter().all(|&px| px == 0x07E0));
    }

    #[test]
    fn test_qmage_w2_depth1_dict_range() {
        let mut data = still_header(0x00, 0x01, 4, 4);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0xF800_F800u32.to_le_bytes());
        data.push(0x05);
        data.push(0x00);
        let mut dec = new_decoder(4, 4);
        assert!(matches!(dec.decode(&make_packet(4, 4, data)), Err(DecoderError::InvalidData)));
    }

    #[test]
    fn test_qmage_w2_depth1_unaligned() {
        let mut data = still_header(0x00, 0x01, 6, 2);
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&0x1234_5678u32.to_le_bytes());
        data.push(0x01);
        data.push(0x05);
        let mut dec = new_decoder(6, 2);
        let frm = dec.decode(&make_packet(6, 2, data)).unwrap();
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        assert_eq!(buf.get_stride(0), 8);
        let pixels = buf.get_data();
        for y in 0..2 {
            for x in 0..6 {
                let expected = if x % 2 == 0 { 0x5678 } else { 0x1234 };
                assert_eq!(pixels[y * 8 + x], expected);
            }
        }
        assert_eq!(pixels[6], 0);
        assert_eq!(pixels[7], 0);
    }

    #[test]
    fn test_qmage_w2_depth2_strips() {
        let mut bw = BitWriter::new();
        for i in 0..6 {
            if (i & 1) == 0 {
                bw.put_bit(true);
            }
            bw.put_bits(0b01, 2);
        }
        bw.put_bits(0b00, 2);
        bw.put_bits(0b00, 2);
        let gb1 = bw.into_bytes();
        assert_eq!(gb1.len(), 3);

        let mut gb3 = Vec::new();
        gb3.extend_from_slice(&0u32.to_le_bytes());
        gb3.extend_from_slice(&4u16.to_le_bytes());
        gb3.extend_from_slice(&0u16.to_le_bytes());
        gb3.extend_from_slice(&0u16.to_le_bytes());
        gb3.extend_from_slice(&0u16.to_le_bytes());
        gb3.extend_from_slice(&0u16.to_le_bytes());
        gb3.extend_from_slice(&0u16.to_le_bytes());
        gb3.extend_from_slice(&[0; 4]);
        for px in 0..6u16 {
            gb3.extend_from_slice(&(0x0A00 + px).to_le_bytes());
        }
        for px in 6..8u16 {
            gb3.extend_from_slice(&(0x0A00 + px).to_le_bytes());
        }
        gb3.extend_from_slice(&[0; 12]);
        assert_eq!(gb3.len(), 48);

        let mut data = still_header(0x00, 0x41, 4, 2);
        data.extend_from_slice(&48u32.to_le_bytes());
        data.extend_from_slice(&(gb1.len() as u32).to_le_bytes());
        data.extend_from_slice(&0u32.to_le_bytes());
        data.extend_from_slice(&gb1);
        data.extend_from_slice(&gb3);

        let mut dec = new_decoder(4, 2);
        let frm = dec.decode(&make_packet(4, 2, data)).unwrap();
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        let pixels = buf.get_data();
        for px in 0..8 {
            assert_eq!(pixels[px], 0x0A00 + (px as u16));
        }
    }

    #[test]
    fn test_qmage_a9ll_intra_copy_edge() {
        let mut data = anim_header(0x0B, 0x00, 8, 4, 2, 1);
        assert_eq!(data.len(), 24);
        data.extend_from_slice(&33u32.to_le_bytes());
        data.extend_from_slice(&33u32.to_le_bytes());
        data.push(0xF0);
        let mut dec = new_decoder(8, 4);
        let frm = dec.decode(&make_packet(8, 4, data)).unwrap();
        assert!(frm.is_keyframe());
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        assert!(buf.get_data().iter().all(|&px| px == 0));
    }

    #[test]
    fn test_qmage_a9ll_intra_bad_offsets() {
        let mut data = anim_header(0x0B, 0x00, 8, 4, 2, 1);
        data.extend_from_slice(&16u32.to_le_bytes());
        data.extend_from_slice(&64u32.to_le_bytes());
        data.push(0xF0);
        let mut dec = new_decoder(8, 4);
        assert!(matches!(dec.decode(&make_packet(8, 4, data)), Err(DecoderError::InvalidData)));
    }

    #[test]
    fn test_qmage_a9ll_intra_dynamic_table() {
        let mut data = anim_header(0x0C, 0x10, 4, 4, 1, 1);
        assert_eq!(data.len(), 24);
        data.extend_from_slice(&33u32.to_le_bytes());
        data.extend_from_slice(&34u32.to_le_bytes());
        data.push(0x00);
        data.push(0x00);
        for _ in 0..512 {
            data.push(0x01);
        }
        for i in 0..512u16 {
            data.extend_from_slice(&(100 + i).to_le_bytes());
        }
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        let mut dec = new_decoder(4, 4);
        let frm = dec.decode(&make_packet(4, 4, data)).unwrap();
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        let pixels = buf.get_data();
        assert!(pixels[..4].iter().all(|&px| px == 101));
        assert!(pixels[4..].iter().all(|&px| px == 0));
    }

    #[test]
    fn test_qmage_a9ll_inter_copy() {
        let mut data = anim_header(0x0B, 0x00, 16, 16, 2, 2);
        data.extend_from_slice(&33u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.push(0xC0);
        let mut dec = new_decoder(16, 16);
        dec.last_frame = Some(stripes_frame());
        let frm = dec.decode(&make_packet(16, 16, data)).unwrap();
        assert!(!frm.is_keyframe());
        assert_eq!(frm.get_frame_type(), FrameType::P);
        let buf = frm.get_buffer().get_vbuf16().unwrap();
        let stride = buf.get_stride(0);
        let pixels = buf.get_data();
        for y in 0..16 {
            let expected = if y < 8 { 0xF800 } else { 0x07E0 };
            for x in 0..16 {
                assert_eq!(pixels[y * stride + x], expected);
            }
        }
    }

    #[test]
    fn test_qmage_a9ll_inter_missing_reference() {
        let mut data = anim_header(0x0B, 0x00, 16, 16, 2, 2);
        data.extend_from_slice(&33u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.push(0xC0);
        let mut dec = new_decoder(16, 16);
        assert!(matches!(dec.decode(&make_packet(16, 16, data)), Err(DecoderError::MissingReference)));
    }

    #[test]
    fn test_qmage_a9ll_inter_offscreen_mv() {
        let mut bw = BitWriter::new();
        bw.put_bits(0b100, 3);
        bw.put_bits(0, 8);
        bw.put_bits(0, 7);
        let gb1 = bw.into_bytes();
        assert_eq!(gb1.len(), 3);
        let mut data = anim_header(0x0B, 0x00, 16, 16, 2, 2);
        data.extend_from_slice(&35u32.to_le_bytes());
        data.extend_from_slice(&[0; 4]);
        data.extend_from_slice(&gb1);
        let mut dec = new_decoder(16, 16);
        dec.last_frame = Some(stripes_frame());
        assert!(matches!(dec.decode(&make_packet(16, 16, data)), Err(DecoderError::InvalidData)));
    }

    #[test]
    fn test_qmage_read_value() {
        let data = [0xFF, 0xFF, 0x05, 0x00];
        let mut mr = MemoryReader::new_read(&data);
        let mut br = ByteReader::new(&mut mr);
        assert_eq!(read_value(&mut br).unwrap(), 0xFF + 0xFF + 5);
        assert_eq!(read_value(&mut br).unwrap(), 0);
        assert!(read_value(&mut br).is_err());
    }

    #[test]
    fn test_qmage_delta_indices() {
        for nb_bits in 0..7u8 {
            for idx in 0..(1usize << (nb_bits + 1)) {
                let pos = idx + (2usize << nb_bits) - 2;
                assert!(pos < QMAGE_ORI_DELTA[0].len());
                assert!(pos < QMAGE_ORI_DELTA[1].len());
            }
        }
    }
}
