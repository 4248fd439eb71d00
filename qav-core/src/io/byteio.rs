//! Byte stream reading functionality.
use std::fs::File;
use std::io::SeekFrom;
use std::io::prelude::*;

#[derive(Debug,Clone,Copy,PartialEq)]
pub enum ByteIOError {
    EOF,
    WrongRange,
    NotImplemented,
    ReadError,
    SeekError,
}

pub type ByteIOResult<T> = Result<T, ByteIOError>;

/// Common interface for byte sources.
pub trait ByteIO {
    fn read_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize>;
    fn peek_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize>;
    fn read_byte(&mut self) -> ByteIOResult<u8>;
    fn peek_byte(&mut self) -> ByteIOResult<u8>;
    fn tell(&mut self) -> u64;
    fn seek(&mut self, pos: SeekFrom) -> ByteIOResult<u64>;
    fn is_eof(&self) -> bool;
    fn is_seekable(&mut self) -> bool;
    fn size(&mut self) -> i64;
}

macro_rules! read_int {
    ($name: ident, $type: ty, $size: expr, $which: ident) => {
        /// Reads an integer from the start of the provided slice.
        pub fn $name(src: &[u8]) -> ByteIOResult<$type> {
            if src.len() < $size { return Err(ByteIOError::ReadError); }
            let mut buf = [0; $size];
            buf.copy_from_slice(&src[..$size]);
            Ok(<$type>::$which(buf))
        }
    };
}

read_int!(read_u16be, u16, 2, from_be_bytes);
read_int!(read_u16le, u16, 2, from_le_bytes);
read_int!(read_u32be, u32, 4, from_be_bytes);
read_int!(read_u32le, u32, 4, from_le_bytes);

/// Bounds-checked reader on top of a byte source.
pub struct ByteReader<'a> {
    io: &'a mut dyn ByteIO,
}

impl<'a> ByteReader<'a> {
    pub fn new(io: &'a mut dyn ByteIO) -> Self { ByteReader { io } }

    pub fn read_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        self.io.read_buf(buf)
    }

    pub fn peek_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        self.io.peek_buf(buf)
    }

    pub fn read_byte(&mut self) -> ByteIOResult<u8> {
        self.io.read_byte()
    }

    pub fn peek_byte(&mut self) -> ByteIOResult<u8> {
        self.io.peek_byte()
    }

    pub fn read_u16be(&mut self) -> ByteIOResult<u16> {
        let mut buf = [0; 2];
        self.read_buf(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn peek_u16be(&mut self) -> ByteIOResult<u16> {
        let mut buf = [0; 2];
        self.peek_buf(&mut buf)?;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u16le(&mut self) -> ByteIOResult<u16> {
        let mut buf = [0; 2];
        self.read_buf(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn peek_u16le(&mut self) -> ByteIOResult<u16> {
        let mut buf = [0; 2];
        self.peek_buf(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32be(&mut self) -> ByteIOResult<u32> {
        let mut buf = [0; 4];
        self.read_buf(&mut buf)?;
        Ok(u32::from_be_bytes(buf))
    }

    pub fn read_u32le(&mut self) -> ByteIOResult<u32> {
        let mut buf = [0; 4];
        self.read_buf(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn peek_u32le(&mut self) -> ByteIOResult<u32> {
        let mut buf = [0; 4];
        self.peek_buf(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_skip(&mut self, len: usize) -> ByteIOResult<()> {
        if self.io.is_seekable() {
            self.io.seek(SeekFrom::Current(len as i64))?;
        } else {
            let mut buf = [0; 16];
            let mut left = len;
            while left >= buf.len() {
                self.io.read_buf(&mut buf)?;
                left -= buf.len();
            }
            if left > 0 {
                self.io.read_buf(&mut buf[..left])?;
            }
        }
        Ok(())
    }

    pub fn tell(&mut self) -> u64 {
        self.io.tell()
    }

    pub fn seek(&mut self, pos: SeekFrom) -> ByteIOResult<u64> {
        self.io.seek(pos)
    }

    pub fn is_eof(&self) -> bool {
        self.io.is_eof()
    }

    pub fn size(&mut self) -> i64 {
        self.io.size()
    }

    pub fn left(&mut self) -> i64 {
        let size = self.io.size();
        if size == -1 { return -1 }
        size - (self.io.tell() as i64)
    }
}

/// Byte source over a memory slice.
pub struct MemoryReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> MemoryReader<'a> {
    pub fn new_read(buf: &'a [u8]) -> Self {
        MemoryReader { buf, pos: 0 }
    }

    fn real_seek(&mut self, pos: i64) -> ByteIOResult<u64> {
        if pos < 0 || (pos as usize) > self.buf.len() {
            return Err(ByteIOError::WrongRange);
        }
        self.pos = pos as usize;
        Ok(pos as u64)
    }
}

impl<'a> ByteIO for MemoryReader<'a> {
    fn read_byte(&mut self) -> ByteIOResult<u8> {
        if self.is_eof() { return Err(ByteIOError::EOF); }
        let res = self.buf[self.pos];
        self.pos += 1;
        Ok(res)
    }

    fn peek_byte(&mut self) -> ByteIOResult<u8> {
        if self.is_eof() { return Err(ByteIOError::EOF); }
        Ok(self.buf[self.pos])
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        let read_size = self.peek_buf(buf)?;
        self.pos += read_size;
        Ok(read_size)
    }

    fn peek_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        if self.pos + buf.len() > self.buf.len() { return Err(ByteIOError::EOF); }
        buf.copy_from_slice(&self.buf[self.pos..][..buf.len()]);
        Ok(buf.len())
    }

    fn tell(&mut self) -> u64 {
        self.pos as u64
    }

    fn seek(&mut self, pos: SeekFrom) -> ByteIOResult<u64> {
        let cur_pos  = self.pos       as i64;
        let cur_size = self.buf.len() as i64;
        match pos {
            SeekFrom::Start(x)   => self.real_seek(x as i64),
            SeekFrom::Current(x) => self.real_seek(cur_pos + x),
            SeekFrom::End(x)     => self.real_seek(cur_size + x),
        }
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn is_seekable(&mut self) -> bool {
        true
    }

    fn size(&mut self) -> i64 {
        self.buf.len() as i64
    }
}

/// Byte source over a file.
pub struct FileReader<'a> {
    file: &'a File,
    eof:  bool,
}

impl<'a> FileReader<'a> {
    pub fn new_read(file: &'a mut File) -> Self {
        FileReader { file, eof: false }
    }
}

impl<'a> ByteIO for FileReader<'a> {
    fn read_byte(&mut self) -> ByteIOResult<u8> {
        let mut byte: [u8; 1] = [0];
        let sz = self.file.read(&mut byte).map_err(|_| ByteIOError::ReadError)?;
        if sz == 0 { self.eof = true; return Err(ByteIOError::EOF); }
        Ok(byte[0])
    }

    fn peek_byte(&mut self) -> ByteIOResult<u8> {
        let res = self.read_byte()?;
        self.seek(SeekFrom::Current(-1))?;
        Ok(res)
    }

    fn read_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        let sz = self.file.read(buf).map_err(|_| ByteIOError::ReadError)?;
        if sz < buf.len() { self.eof = true; return Err(ByteIOError::EOF); }
        Ok(sz)
    }

    fn peek_buf(&mut self, buf: &mut [u8]) -> ByteIOResult<usize> {
        let size = self.read_buf(buf)?;
        self.seek(SeekFrom::Current(-(size as i64)))?;
        Ok(size)
    }

    fn tell(&mut self) -> u64 {
        self.file.seek(SeekFrom::Current(0)).unwrap()
    }

    fn seek(&mut self, pos: SeekFrom) -> ByteIOResult<u64> {
        self.file.seek(pos).map_err(|_| ByteIOError::SeekError)
    }

    fn is_eof(&self) -> bool {
        self.eof
    }

    fn is_seekable(&mut self) -> bool {
        true
    }

    fn size(&mut self) -> i64 {
        if let Ok(metadata) = self.file.metadata() {
            metadata.len() as i64
        } else {
            -1
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_read() {
        let buf: [u8; 16] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16];
        let mut mr = MemoryReader::new_read(&buf);
        let mut reader = ByteReader::new(&mut mr);
        assert_eq!(reader.read_byte().unwrap(),  0x01u8);
        assert_eq!(reader.read_u16le().unwrap(), 0x0302u16);
        assert_eq!(reader.read_u16be().unwrap(), 0x0405u16);
        assert_eq!(reader.read_u32le().unwrap(), 0x09080706u32);
        assert_eq!(reader.peek_byte().unwrap(),  0x0Au8);
        reader.read_skip(2).unwrap();
        assert_eq!(reader.tell(), 11);
        assert_eq!(reader.left(), 5);
        assert_eq!(reader.read_u32be().unwrap(), 0x0C0D0E0Fu32);
        assert!(reader.read_u16le().is_err());
    }

    #[test]
    fn test_slice_read() {
        let buf: [u8; 4] = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(read_u16be(&buf).unwrap(), 0x1234);
        assert_eq!(read_u16le(&buf).unwrap(), 0x3412);
        assert_eq!(read_u32be(&buf).unwrap(), 0x12345678);
        assert_eq!(read_u32le(&buf).unwrap(), 0x78563412);
        assert!(read_u32le(&buf[2..]).is_err());
    }
}
