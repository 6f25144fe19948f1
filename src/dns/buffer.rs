//! buffers for use when writing and reading dns packets

use derive_more::{Display, Error};

/// Largest datagram accepted over legacy UDP (RFC 1035 section 4.2.1)
pub const MAX_UDP_PAYLOAD: usize = 512;

/// Longest label allowed in a domain name
pub const MAX_LABEL_LEN: usize = 0x3F;

#[derive(Debug, Display, Error)]
pub enum BufferError {
    #[display(fmt = "read or write past the end of the buffer")]
    EndOfBuffer,
    #[display(fmt = "message larger than {} bytes", MAX_UDP_PAYLOAD)]
    TooLarge,
    #[display(fmt = "label exceeds {} bytes", MAX_LABEL_LEN)]
    LabelTooLong,
    #[display(fmt = "empty label in domain name")]
    EmptyLabel,
    #[display(fmt = "label contains a dot")]
    DotInLabel,
    #[display(fmt = "label length byte uses a reserved type")]
    ReservedLabelType,
    #[display(fmt = "compression pointer targets an offset outside the message")]
    PointerOutOfRange,
    #[display(fmt = "compression pointers do not terminate")]
    PointerLoop,
}

type Result<T> = std::result::Result<T, BufferError>;

/// Cursor based access to a dns message
///
/// Implementors supply raw byte access and positioning; the integer and name
/// codecs are shared. All multi-byte values are big-endian.
pub trait PacketBuffer {
    fn read(&mut self) -> Result<u8>;
    fn get(&self, pos: usize) -> Result<u8>;
    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]>;
    fn write(&mut self, val: u8) -> Result<()>;
    fn set(&mut self, pos: usize, val: u8) -> Result<()>;
    fn pos(&self) -> usize;
    fn seek(&mut self, pos: usize) -> Result<()>;
    fn step(&mut self, steps: usize) -> Result<()>;

    /// Number of bytes that make up the message
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write_u8(&mut self, val: u8) -> Result<()> {
        self.write(val)
    }

    fn write_u16(&mut self, val: u16) -> Result<()> {
        self.write((val >> 8) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> Result<()> {
        self.write(((val >> 24) & 0xFF) as u8)?;
        self.write(((val >> 16) & 0xFF) as u8)?;
        self.write(((val >> 8) & 0xFF) as u8)?;
        self.write((val & 0xFF) as u8)?;

        Ok(())
    }

    /// Writes `qname` as a sequence of length prefixed labels
    ///
    /// A single trailing dot is accepted and the empty name (or ".") is the
    /// root. Names are written uncompressed and with their case preserved.
    fn write_qname(&mut self, qname: &str) -> Result<()> {
        let name = qname.strip_suffix('.').unwrap_or(qname);

        if !name.is_empty() {
            for label in name.split('.') {
                let len = label.len();
                if len == 0 {
                    return Err(BufferError::EmptyLabel);
                }
                if len > MAX_LABEL_LEN {
                    return Err(BufferError::LabelTooLong);
                }

                self.write_u8(len as u8)?;
                for b in label.as_bytes() {
                    self.write_u8(*b)?;
                }
            }
        }

        self.write_u8(0)?;

        Ok(())
    }

    fn set_u16(&mut self, pos: usize, val: u16) -> Result<()> {
        self.set(pos, (val >> 8) as u8)?;
        self.set(pos + 1, (val & 0xFF) as u8)?;

        Ok(())
    }

    fn read_u16(&mut self) -> Result<u16> {
        let res = ((self.read()? as u16) << 8) | (self.read()? as u16);

        Ok(res)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let res = ((self.read()? as u32) << 24)
            | ((self.read()? as u32) << 16)
            | ((self.read()? as u32) << 8)
            | (self.read()? as u32);

        Ok(res)
    }

    /// Reads a possibly compressed domain name into `outstr`
    ///
    /// The cursor ends up directly after the terminating zero label, or two
    /// bytes past the first compression pointer, however long the name that
    /// pointer leads to. Pointer chasing is an explicit loop; the number of
    /// jumps is capped by the message length so a pointer cycle is reported
    /// instead of spinning.
    fn read_qname(&mut self, outstr: &mut String) -> Result<()> {
        let mut pos = self.pos();
        let mut jumped = false;
        let mut jumps_left = self.len();

        let mut delim = "";
        loop {
            let len = self.get(pos)?;

            match len & 0xC0 {
                0xC0 => {
                    if jumps_left == 0 {
                        return Err(BufferError::PointerLoop);
                    }
                    jumps_left -= 1;

                    let b2 = self.get(pos + 1)? as usize;
                    let offset = (((len as usize) ^ 0xC0) << 8) | b2;
                    if offset >= self.len() {
                        return Err(BufferError::PointerOutOfRange);
                    }

                    if !jumped {
                        self.seek(pos + 2)?;
                        jumped = true;
                    }

                    pos = offset;
                }
                0x00 => {
                    pos += 1;

                    if len == 0 {
                        break;
                    }

                    outstr.push_str(delim);
                    let label = self.get_range(pos, len as usize)?;
                    if label.contains(&b'.') {
                        return Err(BufferError::DotInLabel);
                    }
                    outstr.push_str(&String::from_utf8_lossy(label));
                    delim = ".";

                    pos += len as usize;
                }
                _ => return Err(BufferError::ReservedLabelType),
            }
        }

        if !jumped {
            self.seek(pos)?;
        }

        Ok(())
    }
}

/// Growable buffer used when building outgoing messages
#[derive(Default)]
pub struct VectorPacketBuffer {
    pub buffer: Vec<u8>,
    pub pos: usize,
}

impl VectorPacketBuffer {
    pub fn new() -> VectorPacketBuffer {
        VectorPacketBuffer {
            buffer: Vec::new(),
            pos: 0,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }
}

impl PacketBuffer for VectorPacketBuffer {
    fn read(&mut self) -> Result<u8> {
        let res = self.get(self.pos)?;
        self.pos += 1;

        Ok(res)
    }

    fn get(&self, pos: usize) -> Result<u8> {
        self.buffer.get(pos).copied().ok_or(BufferError::EndOfBuffer)
    }

    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]> {
        self.buffer
            .get(start..start + len)
            .ok_or(BufferError::EndOfBuffer)
    }

    fn write(&mut self, val: u8) -> Result<()> {
        self.buffer.push(val);
        self.pos += 1;

        Ok(())
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<()> {
        match self.buffer.get_mut(pos) {
            Some(slot) => {
                *slot = val;
                Ok(())
            }
            None => Err(BufferError::EndOfBuffer),
        }
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = pos;

        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        self.pos += steps;

        Ok(())
    }

    fn len(&self) -> usize {
        self.buffer.len()
    }
}

/// Fixed size buffer holding a single UDP datagram
///
/// Only the first `len` bytes are part of the message; reads beyond them
/// fail even though the backing array is larger.
pub struct BytePacketBuffer {
    pub buf: [u8; MAX_UDP_PAYLOAD],
    pub pos: usize,
    pub len: usize,
}

impl BytePacketBuffer {
    /// This gives us a fresh buffer for holding the packet contents, and a
    /// field for keeping track of where we are.
    pub fn new() -> BytePacketBuffer {
        BytePacketBuffer {
            buf: [0; MAX_UDP_PAYLOAD],
            pos: 0,
            len: 0,
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<BytePacketBuffer> {
        if data.len() > MAX_UDP_PAYLOAD {
            return Err(BufferError::TooLarge);
        }

        let mut buffer = BytePacketBuffer::new();
        buffer.buf[..data.len()].copy_from_slice(data);
        buffer.len = data.len();

        Ok(buffer)
    }
}

impl Default for BytePacketBuffer {
    fn default() -> Self {
        BytePacketBuffer::new()
    }
}

impl PacketBuffer for BytePacketBuffer {
    fn read(&mut self) -> Result<u8> {
        let res = self.get(self.pos)?;
        self.pos += 1;

        Ok(res)
    }

    fn get(&self, pos: usize) -> Result<u8> {
        if pos >= self.len {
            return Err(BufferError::EndOfBuffer);
        }

        Ok(self.buf[pos])
    }

    fn get_range(&self, start: usize, len: usize) -> Result<&[u8]> {
        if start + len > self.len {
            return Err(BufferError::EndOfBuffer);
        }

        Ok(&self.buf[start..start + len])
    }

    fn write(&mut self, val: u8) -> Result<()> {
        if self.pos >= MAX_UDP_PAYLOAD {
            return Err(BufferError::EndOfBuffer);
        }

        self.buf[self.pos] = val;
        self.pos += 1;
        if self.pos > self.len {
            self.len = self.pos;
        }

        Ok(())
    }

    fn set(&mut self, pos: usize, val: u8) -> Result<()> {
        if pos >= self.len {
            return Err(BufferError::EndOfBuffer);
        }

        self.buf[pos] = val;

        Ok(())
    }

    fn pos(&self) -> usize {
        self.pos
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        self.pos = pos;

        Ok(())
    }

    fn step(&mut self, steps: usize) -> Result<()> {
        self.pos += steps;

        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }
}
