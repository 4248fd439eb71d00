use qav_core::frame::*;
use qav_core::demuxers::*;
use qav_core::io::bitreader::*;
use std::io::SeekFrom;

const QMAGE_MAGIC: u16 = 0x514D;
const QVERSION_LEGACY: u8 = 0xB;

struct QmageFrameInfo {
    mode:                 bool,
    current_frame_number: u16,
    total_frame_number:   u16,
    width:                usize,
    height:               usize,
    pkt_size:             usize,
}

struct QmageDemuxer<'a> {
    src:    &'a mut ByteReader<'a>,
    vid_id: usize,
    fno:    u64,
}

impl<'a> QmageDemuxer<'a> {
    fn new(io: &'a mut ByteReader<'a>) -> Self {
        Self {
            src:    io,
            vid_id: 0,
            fno:    0,
        }
    }

    // The keyframe alpha sub-bitstream carries no length field, so its byte
    // size has to be determined by walking the whole sub-bitstream.
    fn parse_alpha_size(&mut self, width: usize, height: usize) -> DemuxerResult<usize> {
        if (width & 7) != 0 || (height & 3) != 0 {
            return Err(DemuxerError::NotImplemented);
        }
        let start = self.src.tell();
        let len1 = self.src.read_u32le()? as usize;
        let len2 = self.src.read_u32le()? as usize;
        validate!(len1 >= 8 && len2 >= 8 && len1 <= len2);
        let len1 = len1 - 8;
        let len2 = len2 - 8;
        let mut data = vec![0; len2];
        self.src.read_buf(data.as_mut_slice())?;
        let mut gb1 = BitReader::new(&data[..len1], len1);
        let mut gb2 = BitReader::new(&data[len1..], len2 - len1);

        for _y in (0..height).step_by(4) {
            for _x in (0..width).step_by(8) {
                let mode = gb1.read(2)?;
                if mode < 3 {
                    let cbp = self.src.read_u16le()?;
                    for k in 0..16 {
                        if (cbp & (1 << k)) == 0 {
                            let nb_bits = gb2.read(3)?;
                            if nb_bits == 7 {
                                self.src.read_skip(2)?;
                            } else {
                                gb1.skip(nb_bits + 1)?;
                            }
                        }
                    }
                }
            }
        }

        Ok((((self.src.tell() + 3) & !3) - start) as usize)
    }

    fn read_frame_header(&mut self) -> DemuxerResult<QmageFrameInfo> {
        let start = self.src.tell();
        if self.src.peek_u16be().is_err() {
            return Err(DemuxerError::EOF);
        }
        validate!(self.src.read_u16be()? == QMAGE_MAGIC);

        let qversion = self.src.read_byte()?;
        if qversion < QVERSION_LEGACY {
            return Err(DemuxerError::NotImplemented);
        }

        let raw_type = self.src.read_byte()?;
        let transparency = match raw_type {
                0     => false, // RGB565
                3 | 6 => true,  // RGBA5658, RGBA
                _     => return Err(DemuxerError::NotImplemented),
            };

        let mode = (self.src.read_byte()? & 0x80) != 0;
        self.src.read_skip(1)?;
        let width  = usize::from(self.src.read_u16le()?);
        let height = usize::from(self.src.read_u16le()?);
        validate!(width > 0 && height > 0);
        self.src.read_skip(2)?;

        let mut alpha_position;
        if qversion == QVERSION_LEGACY {
            alpha_position = if transparency || mode {
                    self.src.read_u32le()? as usize
                } else {
                    0
                };
        } else {
            alpha_position = usize::from(self.src.read_u16le()?);
            self.src.read_skip(2)?;
        }

        let header_size;
        let total_frame_number;
        let current_frame_number;
        if mode {
            total_frame_number   = self.src.read_u16le()?;
            current_frame_number = self.src.read_u16le()?;
            self.src.read_skip(4)?;
            header_size = 24;
        } else {
            total_frame_number   = 1;
            current_frame_number = 1;
            header_size = if transparency { 16 } else { 12 };
        }

        if qversion > QVERSION_LEGACY && (!mode || current_frame_number <= 1) {
            alpha_position *= 4;
        }

        let pkt_size = if mode {
                validate!(alpha_position > header_size);
                if transparency {
                    self.src.seek(SeekFrom::Current((alpha_position - header_size) as i64))?;
                    let alpha_size = if current_frame_number == 1 {
                            self.parse_alpha_size(width, height)?
                        } else {
                            let asize = self.src.read_u32le()? as usize;
                            validate!(asize >= 4);
                            asize
                        };
                    alpha_position + alpha_size
                } else {
                    alpha_position
                }
            } else {
                (self.src.size() - start as i64) as usize
            };

        Ok(QmageFrameInfo { mode, current_frame_number, total_frame_number, width, height, pkt_size })
    }
}

impl<'a> DemuxCore<'a> for QmageDemuxer<'a> {
    fn open(&mut self, strmgr: &mut StreamManager, _seek_idx: &mut SeekIndex) -> DemuxerResult<()> {
        let hdr = self.read_frame_header()?;

        let vhdr = NAVideoInfo::new(hdr.width, hdr.height, false, RGB565_FORMAT);
        let vinfo = NACodecInfo::new("qmage", NACodecTypeInfo::Video(vhdr), None);
        let mut stream = NAStream::new(StreamType::Video, 0, vinfo, 1, 15);
        stream.set_duration(u64::from(hdr.total_frame_number));
        self.vid_id = strmgr.add_stream(stream).unwrap();

        self.src.seek(SeekFrom::Start(0))?;
        self.fno = 0;
        Ok(())
    }

    fn get_frame(&mut self, strmgr: &mut StreamManager) -> DemuxerResult<NAPacket> {
        let pos = self.src.tell();
        let hdr = self.read_frame_header()?;
        self.src.seek(SeekFrom::Start(pos))?;

        let stream = strmgr.get_stream(self.vid_id).unwrap();
        let (tb_num, tb_den) = stream.get_timebase();
        let ts = NATimeInfo::new(Some(self.fno), None, None, tb_num, tb_den);
        let keyframe = !hdr.mode || hdr.current_frame_number == 1;
        let pkt = self.src.read_packet(stream, ts, keyframe, hdr.pkt_size)?;
        self.fno += 1;
        Ok(pkt)
    }

    fn seek(&mut self, _time: u64, _seek_idx: &SeekIndex) -> DemuxerResult<()> {
        Err(DemuxerError::NotImplemented)
    }
}

pub struct QmageDemuxerCreator { }

impl DemuxerCreator for QmageDemuxerCreator {
    fn new_demuxer<'a>(&self, br: &'a mut ByteReader<'a>) -> Box<dyn DemuxCore<'a> + 'a> {
        Box::new(QmageDemuxer::new(br))
    }
    fn get_name(&self) -> &'static str { "qmage" }
}

#[cfg(test)]
mod test {
    use super::*;

    fn alpha_block() -> Vec<u8> {
        // one 8x4 band encoded with the edge mode, no coded block patterns
        let mut blk = Vec::new();
        blk.extend_from_slice(&9u32.to_le_bytes());
        blk.extend_from_slice(&9u32.to_le_bytes());
        blk.push(0xC0);
        blk
    }

    fn anim_frame_header(width: u16, height: u16, total: u16, current: u16, alpha_position: u32) -> Vec<u8> {
        let mut hdr = vec![0x51, 0x4D, 0x0B, 0x03, 0x80, 0x00];
        hdr.extend_from_slice(&width.to_le_bytes());
        hdr.extend_from_slice(&height.to_le_bytes());
        hdr.push(0x00);
        hdr.push(0x00);
        hdr.extend_from_slice(&alpha_position.to_le_bytes());
        hdr.extend_from_slice(&total.to_le_bytes());
        hdr.extend_from_slice(&current.to_le_bytes());
        hdr.extend_from_slice(&0u16.to_le_bytes());
        hdr.push(0x00);
        hdr.push(0x00);
        hdr
    }

    fn anim_file() -> Vec<u8> {
        let mut file = Vec::new();
        // keyframe: both pixel cells use the edge mode, alpha block at 36
        file.extend_from_slice(&anim_frame_header(8, 4, 2, 1, 36));
        file.extend_from_slice(&33u32.to_le_bytes());
        file.extend_from_slice(&33u32.to_le_bytes());
        file.push(0xF0);
        file.extend_from_slice(&[0; 3]);
        file.extend_from_slice(&alpha_block());
        file.extend_from_slice(&[0; 3]);
        assert_eq!(file.len(), 48);
        // inter frame: both edge cells use the edge mode, stored alpha size at 36
        file.extend_from_slice(&anim_frame_header(8, 4, 2, 2, 36));
        file.extend_from_slice(&33u32.to_le_bytes());
        file.extend_from_slice(&[0; 4]);
        file.push(0x78);
        file.extend_from_slice(&[0; 3]);
        file.extend_from_slice(&4u32.to_le_bytes());
        assert_eq!(file.len(), 88);
        file
    }

    #[test]
    fn test_qmage_alpha_scan() {
        let data = alpha_block();
        let mut sizes = Vec::new();
        for _ in 0..2 {
            let mut mr = MemoryReader::new_read(&data);
            let mut br = ByteReader::new(&mut mr);
            let mut dmx = QmageDemuxer::new(&mut br);
            sizes.push(dmx.parse_alpha_size(8, 4).unwrap());
        }
        assert_eq!(sizes[0], 12);
        assert_eq!(sizes[0], sizes[1]);
    }

    #[test]
    fn test_qmage_alpha_scan_cbp() {
        // one coded cell, all pattern bits set: no extra reads
        let mut data = Vec::new();
        data.extend_from_slice(&9u32.to_le_bytes());
        data.extend_from_slice(&9u32.to_le_bytes());
        data.push(0x00);
        data.extend_from_slice(&0xFFFFu16.to_le_bytes());
        let mut mr = MemoryReader::new_read(&data);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        assert_eq!(dmx.parse_alpha_size(8, 4).unwrap(), 12);

        // one coded cell with one clear bit escaping to a stored pixel
        let mut data = Vec::new();
        data.extend_from_slice(&9u32.to_le_bytes());
        data.extend_from_slice(&10u32.to_le_bytes());
        data.push(0x00);
        data.push(0xE0);
        data.extend_from_slice(&0xFFFEu16.to_le_bytes());
        data.extend_from_slice(&[0; 2]);
        let mut mr = MemoryReader::new_read(&data);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        assert_eq!(dmx.parse_alpha_size(8, 4).unwrap(), 16);
    }

    #[test]
    fn test_qmage_alpha_scan_unaligned() {
        let data = alpha_block();
        let mut mr = MemoryReader::new_read(&data);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        assert!(matches!(dmx.parse_alpha_size(10, 4), Err(DemuxerError::NotImplemented)));
    }

    #[test]
    fn test_qmage_demux_still() {
        let mut file = vec![0x51, 0x4D, 0x0B, 0x00, 0x00, 0x01, 0x04, 0x00, 0x04, 0x00, 0x00, 0x00];
        file.extend_from_slice(&[0; 18]);
        let mut mr = MemoryReader::new_read(&file);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        let mut sm = StreamManager::new();
        let mut si = SeekIndex::new();
        dmx.open(&mut sm, &mut si).unwrap();

        let stream = sm.get_stream(0).unwrap();
        let vinfo = stream.get_info().get_properties().get_video_info().unwrap();
        assert_eq!((vinfo.get_width(), vinfo.get_height()), (4, 4));
        assert_eq!(stream.get_duration(), 1);

        let pkt = dmx.get_frame(&mut sm).unwrap();
        assert_eq!(pkt.get_buffer().len(), 30);
        assert!(pkt.is_keyframe());
        assert!(matches!(dmx.get_frame(&mut sm), Err(DemuxerError::EOF)));
    }

    #[test]
    fn test_qmage_demux_animation() {
        let file = anim_file();
        let mut mr = MemoryReader::new_read(&file);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        let mut sm = StreamManager::new();
        let mut si = SeekIndex::new();
        dmx.open(&mut sm, &mut si).unwrap();

        let stream = sm.get_stream(0).unwrap();
        assert_eq!(stream.get_duration(), 2);

        let pkt1 = dmx.get_frame(&mut sm).unwrap();
        assert_eq!(pkt1.get_buffer().len(), 48);
        assert!(pkt1.is_keyframe());
        assert_eq!(pkt1.get_pts(), Some(0));

        let pkt2 = dmx.get_frame(&mut sm).unwrap();
        assert_eq!(pkt2.get_buffer().len(), 40);
        assert!(!pkt2.is_keyframe());
        assert_eq!(pkt2.get_pts(), Some(1));

        assert!(matches!(dmx.get_frame(&mut sm), Err(DemuxerError::EOF)));
    }

    #[cfg(feature="decoder_qmage")]
    #[test]
    fn test_qmage_demux_decode() {
        use qav_core::codecs::*;
        use crate::codecs::qmage;

        let file = anim_file();
        let mut mr = MemoryReader::new_read(&file);
        let mut br = ByteReader::new(&mut mr);
        let mut dmx = QmageDemuxer::new(&mut br);
        let mut sm = StreamManager::new();
        let mut si = SeekIndex::new();
        dmx.open(&mut sm, &mut si).unwrap();

        let stream = sm.get_stream(0).unwrap();
        let mut dec = qmage::get_decoder();
        dec.init(stream.get_info()).unwrap();

        let pkt1 = dmx.get_frame(&mut sm).unwrap();
        let frm1 = dec.decode(&pkt1).unwrap();
        assert!(frm1.is_keyframe());
        let buf1 = frm1.get_buffer().get_vbuf16().unwrap();
        assert!(buf1.get_data().iter().all(|&px| px == 0));

        let pkt2 = dmx.get_frame(&mut sm).unwrap();
        let frm2 = dec.decode(&pkt2).unwrap();
        assert!(!frm2.is_keyframe());
        let buf2 = frm2.get_buffer().get_vbuf16().unwrap();
        assert_eq!(buf1.get_data(), buf2.get_data());
    }

    #[test]
    fn test_qmage_register() {
        let mut dmx_reg = RegisteredDemuxers::new();
        crate::demuxers::quram_register_all_demuxers(&mut dmx_reg);
        assert!(dmx_reg.find_demuxer("qmage").is_some());
    }
}
