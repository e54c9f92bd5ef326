//! Request frame and response builder over one shared buffer.
//!
//! The kernel hands us a whole request per read and expects a whole reply
//! per write. Both live in the same fixed allocation: the reply payload is
//! built where the request payload used to be. A request is therefore
//! decoded into an owned [`Request`] first, and only then can a
//! [`ResponseBuilder`] borrow the buffer mutably.

use crate::abi::{
    ForgetIn, IN_HEADER_SIZE, InHeader, MAX_REQUEST_SIZE, Opcode, WireDecode, WireEncode,
    extract_name,
};
use crate::error::FrameError;
use crate::request::{Operation, Request};

pub struct RequestFrame {
    buf: Box<[u8]>,
    len: usize,
}

impl RequestFrame {
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; MAX_REQUEST_SIZE].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes of the last frame read into the buffer.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The whole buffer, for reading the next frame from the device.
    pub fn read_buffer(&mut self) -> &mut [u8] {
        self.len = 0;
        &mut self.buf
    }

    /// Records that `n` bytes were read and checks the framing.
    ///
    /// A frame is valid when it holds at least a header and the header's
    /// declared length equals the number of bytes actually read.
    pub fn validate(&mut self, n: usize) -> Result<InHeader, FrameError> {
        self.len = n.min(self.buf.len());
        let header = self.decode_header()?;
        if header.len as usize != self.len {
            return Err(FrameError::LengthMismatch {
                declared: header.len,
                actual: self.len,
            });
        }
        Ok(header)
    }

    pub fn decode_header(&self) -> Result<InHeader, FrameError> {
        InHeader::from_bytes(&self.buf[..self.len]).ok_or(FrameError::TooShort { len: self.len })
    }

    fn payload_bytes(&self) -> &[u8] {
        self.buf.get(IN_HEADER_SIZE..self.len).unwrap_or(&[])
    }

    /// Decodes the payload as `T`. The opcode alone decides which `T` is
    /// right; nothing in the payload says so.
    pub fn payload<T: WireDecode>(&self) -> Result<T, FrameError> {
        let header = self.decode_header()?;
        let data = self.payload_bytes();
        T::from_bytes(data).ok_or(FrameError::TruncatedPayload {
            opcode: header.opcode,
            len: data.len(),
            needed: T::MIN_SIZE,
        })
    }

    /// Copies everything a handler needs out of the buffer.
    pub fn decode(&self) -> Result<Request, FrameError> {
        let header = self.decode_header()?;

        let operation = match Opcode::try_from(header.opcode) {
            Ok(Opcode::Lookup) => Operation::Lookup {
                name: extract_name(self.payload_bytes()),
            },
            Ok(Opcode::Forget) => {
                // Notifications are never answered, so a short one is not worth an error.
                Operation::Forget(ForgetIn::from_bytes(self.payload_bytes()).unwrap_or_default())
            }
            Ok(Opcode::Getattr) => Operation::Getattr,
            Ok(Opcode::Open) => Operation::Open(self.payload()?),
            Ok(Opcode::Read) => Operation::Read(self.payload()?),
            Ok(Opcode::Release) => Operation::Release(self.payload()?),
            Ok(Opcode::Flush) => Operation::Flush,
            Ok(Opcode::Init) => Operation::Init(self.payload()?),
            Ok(Opcode::Interrupt) => Operation::Interrupt,
            Ok(Opcode::Destroy) => Operation::Destroy,
            Ok(Opcode::BatchForget) => Operation::BatchForget,
            Err(opcode) => Operation::Unsupported(opcode),
        };

        Ok(Request { header, operation })
    }

    /// Starts building a reply in place of the request payload.
    pub fn response(&mut self) -> ResponseBuilder<'_> {
        ResponseBuilder::new(&mut self.buf[IN_HEADER_SIZE..])
    }

    #[cfg(test)]
    pub(crate) fn load(&mut self, bytes: &[u8]) -> Result<InHeader, FrameError> {
        let n = bytes.len().min(self.buf.len());
        self.buf[..n].copy_from_slice(&bytes[..n]);
        self.validate(n)
    }
}

impl Default for RequestFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a reply payload in the request frame's buffer.
pub struct ResponseBuilder<'a> {
    buf: &'a mut [u8],
    size: usize,
}

impl<'a> ResponseBuilder<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, size: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Zero-fills the first `size` bytes and makes that the reply size.
    pub fn reset(&mut self, size: usize) {
        let size = size.min(self.buf.len());
        self.buf[..size].fill(0);
        self.size = size;
    }

    /// [`reset`](Self::reset) to the natural size of `T`.
    pub fn reset_for<T: WireEncode>(&mut self) {
        self.reset(T::SIZE);
    }

    /// Overrides the reply size, e.g. once the length of read data is known.
    pub fn set_size(&mut self, size: usize) {
        self.size = size.min(self.buf.len());
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Writes a reply struct at the start of the buffer. Only the first
    /// [`size`](Self::size) bytes go out on the wire.
    pub fn write<T: WireEncode>(&mut self, value: &T) {
        if let Some(dst) = self.buf.get_mut(..T::SIZE) {
            value.write_to(dst);
        }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.buf
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.size]
    }
}
