//! FUSE kernel ABI types.
//!
//! Mirrors the subset of Linux `include/uapi/linux/fuse.h` this filesystem
//! speaks. All integers travel in native byte order, since the peer is the
//! kernel on the same machine.

use nix::errno::Errno;

pub const FUSE_KERNEL_VERSION: u32 = 7;

/// Oldest minor with a stable `fuse_init_out` (kernel 2.6.16).
pub const FUSE_MIN_MINOR_VERSION: u32 = 6;

/// Highest minor we advertise. BATCH_FORGET arrives with 7.16 and is not
/// worth supporting for a handful of flat nodes.
pub const FUSE_MAX_MINOR_VERSION: u32 = 15;

pub const ROOT_NODE_ID: u64 = 1;

/// Largest data payload of a single write request.
pub const MAX_WRITE: u32 = 256 * 1024;

/// Largest data payload of a single read reply.
pub const MAX_READ: u32 = 128 * 1024;

/// `sizeof(struct fuse_write_in)`, the largest fixed request payload.
pub const WRITE_IN_SIZE: usize = 40;

/// Largest frame the kernel can send: a write carrying `MAX_WRITE` bytes.
pub const MAX_REQUEST_SIZE: usize = IN_HEADER_SIZE
    + WRITE_IN_SIZE
    + (if MAX_WRITE > MAX_READ { MAX_WRITE } else { MAX_READ }) as usize;

pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

// FUSE init flags
pub const FUSE_ATOMIC_O_TRUNC: u32 = 1 << 3;
pub const FUSE_BIG_WRITES: u32 = 1 << 5;

/// Opcodes this filesystem recognizes. Anything else is answered with ENOSYS.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Lookup = 1,
    Forget = 2,
    Getattr = 3,
    Open = 14,
    Read = 15,
    Release = 18,
    Flush = 25,
    Init = 26,
    Interrupt = 36,
    Destroy = 38,
    BatchForget = 42,
}

impl TryFrom<u32> for Opcode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Lookup),
            2 => Ok(Self::Forget),
            3 => Ok(Self::Getattr),
            14 => Ok(Self::Open),
            15 => Ok(Self::Read),
            18 => Ok(Self::Release),
            25 => Ok(Self::Flush),
            26 => Ok(Self::Init),
            36 => Ok(Self::Interrupt),
            38 => Ok(Self::Destroy),
            42 => Ok(Self::BatchForget),
            other => Err(other),
        }
    }
}

/// A request payload that can be decoded from the bytes following the header.
pub trait WireDecode: Sized {
    /// Bytes needed to decode the fields this type carries.
    const MIN_SIZE: usize;

    fn from_bytes(data: &[u8]) -> Option<Self>;
}

/// A reply payload with a fixed natural size.
pub trait WireEncode {
    const SIZE: usize;

    /// Writes the struct into `buf`, which must hold at least `SIZE` bytes.
    fn write_to(&self, buf: &mut [u8]);
}

fn u32_at(data: &[u8], at: usize) -> Option<u32> {
    Some(u32::from_ne_bytes(data.get(at..at + 4)?.try_into().ok()?))
}

fn u64_at(data: &[u8], at: usize) -> Option<u64> {
    Some(u64::from_ne_bytes(data.get(at..at + 8)?.try_into().ok()?))
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_ne_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_ne_bytes());
}

/// FUSE request header (40 bytes).
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct InHeader {
    pub len: u32,
    pub opcode: u32,
    pub unique: u64,
    pub nodeid: u64,
    pub uid: u32,
    pub gid: u32,
    pub pid: u32,
    pub padding: u32,
}

pub const IN_HEADER_SIZE: usize = std::mem::size_of::<InHeader>();

impl WireDecode for InHeader {
    const MIN_SIZE: usize = IN_HEADER_SIZE;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < IN_HEADER_SIZE {
            return None;
        }
        Some(Self {
            len: u32_at(data, 0)?,
            opcode: u32_at(data, 4)?,
            unique: u64_at(data, 8)?,
            nodeid: u64_at(data, 16)?,
            uid: u32_at(data, 24)?,
            gid: u32_at(data, 28)?,
            pid: u32_at(data, 32)?,
            padding: u32_at(data, 36)?,
        })
    }
}

impl InHeader {
    pub fn to_bytes(self) -> [u8; IN_HEADER_SIZE] {
        let mut buf = [0u8; IN_HEADER_SIZE];
        put_u32(&mut buf, 0, self.len);
        put_u32(&mut buf, 4, self.opcode);
        put_u64(&mut buf, 8, self.unique);
        put_u64(&mut buf, 16, self.nodeid);
        put_u32(&mut buf, 24, self.uid);
        put_u32(&mut buf, 28, self.gid);
        put_u32(&mut buf, 32, self.pid);
        put_u32(&mut buf, 36, self.padding);
        buf
    }
}

/// FUSE reply header (16 bytes).
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct OutHeader {
    pub len: u32,
    pub error: i32,
    pub unique: u64,
}

pub const OUT_HEADER_SIZE: usize = std::mem::size_of::<OutHeader>();

impl OutHeader {
    /// Header for the reply to request `unique`. Error replies never carry a
    /// payload, whatever `payload_len` says.
    pub fn for_result(unique: u64, result: Result<(), Errno>, payload_len: usize) -> Self {
        match result {
            Ok(()) => Self {
                len: (OUT_HEADER_SIZE + payload_len) as u32,
                error: 0,
                unique,
            },
            Err(errno) => Self {
                len: OUT_HEADER_SIZE as u32,
                error: -(errno as i32),
                unique,
            },
        }
    }

    pub fn to_bytes(self) -> [u8; OUT_HEADER_SIZE] {
        let mut buf = [0u8; OUT_HEADER_SIZE];
        put_u32(&mut buf, 0, self.len);
        put_u32(&mut buf, 4, self.error as u32);
        put_u64(&mut buf, 8, self.unique);
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            len: u32_at(data, 0)?,
            error: u32_at(data, 4)? as i32,
            unique: u64_at(data, 8)?,
        })
    }
}

/// File attributes. Minors before 7.9 stop before `blksize`.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct Attr {
    pub ino: u64,
    pub size: u64,
    pub blocks: u64,
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub atimensec: u32,
    pub mtimensec: u32,
    pub ctimensec: u32,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u32,
    pub blksize: u32,
    pub padding: u32,
}

pub const ATTR_SIZE: usize = std::mem::size_of::<Attr>();

impl WireEncode for Attr {
    const SIZE: usize = ATTR_SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        put_u64(buf, 0, self.ino);
        put_u64(buf, 8, self.size);
        put_u64(buf, 16, self.blocks);
        put_u64(buf, 24, self.atime);
        put_u64(buf, 32, self.mtime);
        put_u64(buf, 40, self.ctime);
        put_u32(buf, 48, self.atimensec);
        put_u32(buf, 52, self.mtimensec);
        put_u32(buf, 56, self.ctimensec);
        put_u32(buf, 60, self.mode);
        put_u32(buf, 64, self.nlink);
        put_u32(buf, 68, self.uid);
        put_u32(buf, 72, self.gid);
        put_u32(buf, 76, self.rdev);
        put_u32(buf, 80, self.blksize);
        put_u32(buf, 84, self.padding);
    }
}

/// Lookup reply.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct EntryOut {
    pub nodeid: u64,
    pub generation: u64,
    pub entry_valid: u64,
    pub attr_valid: u64,
    pub entry_valid_nsec: u32,
    pub attr_valid_nsec: u32,
    pub attr: Attr,
}

pub const ENTRY_OUT_SIZE: usize = std::mem::size_of::<EntryOut>();

impl WireEncode for EntryOut {
    const SIZE: usize = ENTRY_OUT_SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        put_u64(buf, 0, self.nodeid);
        put_u64(buf, 8, self.generation);
        put_u64(buf, 16, self.entry_valid);
        put_u64(buf, 24, self.attr_valid);
        put_u32(buf, 32, self.entry_valid_nsec);
        put_u32(buf, 36, self.attr_valid_nsec);
        self.attr.write_to(&mut buf[40..40 + ATTR_SIZE]);
    }
}

/// Getattr reply.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug)]
pub struct AttrOut {
    pub attr_valid: u64,
    pub attr_valid_nsec: u32,
    pub dummy: u32,
    pub attr: Attr,
}

pub const ATTR_OUT_SIZE: usize = std::mem::size_of::<AttrOut>();

impl WireEncode for AttrOut {
    const SIZE: usize = ATTR_OUT_SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        put_u64(buf, 0, self.attr_valid);
        put_u32(buf, 8, self.attr_valid_nsec);
        put_u32(buf, 12, self.dummy);
        self.attr.write_to(&mut buf[16..16 + ATTR_SIZE]);
    }
}

/// Init request.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct InitIn {
    pub major: u32,
    pub minor: u32,
    pub max_readahead: u32,
    pub flags: u32,
}

impl WireDecode for InitIn {
    const MIN_SIZE: usize = 16;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::MIN_SIZE {
            return None;
        }
        Some(Self {
            major: u32_at(data, 0)?,
            minor: u32_at(data, 4)?,
            max_readahead: u32_at(data, 8)?,
            flags: u32_at(data, 12)?,
        })
    }
}

/// Init reply as of 7.23. Older minors receive a prefix of it.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct InitOut {
    pub major: u32,
    pub minor: u32,
    pub max_readahead: u32,
    pub flags: u32,
    pub max_background: u16,
    pub congestion_threshold: u16,
    pub max_write: u32,
    pub time_gran: u32,
    pub unused: [u32; 9],
}

pub const INIT_OUT_SIZE: usize = std::mem::size_of::<InitOut>();

impl WireEncode for InitOut {
    const SIZE: usize = INIT_OUT_SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        put_u32(buf, 0, self.major);
        put_u32(buf, 4, self.minor);
        put_u32(buf, 8, self.max_readahead);
        put_u32(buf, 12, self.flags);
        buf[16..18].copy_from_slice(&self.max_background.to_ne_bytes());
        buf[18..20].copy_from_slice(&self.congestion_threshold.to_ne_bytes());
        put_u32(buf, 20, self.max_write);
        put_u32(buf, 24, self.time_gran);
        // unused[9] stays zero
        buf[28..INIT_OUT_SIZE].fill(0);
    }
}

impl InitOut {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            major: u32_at(data, 0)?,
            minor: u32_at(data, 4)?,
            max_readahead: u32_at(data, 8)?,
            flags: u32_at(data, 12)?,
            max_background: u16::from_ne_bytes(data.get(16..18)?.try_into().ok()?),
            congestion_threshold: u16::from_ne_bytes(data.get(18..20)?.try_into().ok()?),
            max_write: u32_at(data, 20)?,
            time_gran: u32_at(data, 24).unwrap_or(0),
            unused: [0; 9],
        })
    }
}

/// Forget notification.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct ForgetIn {
    pub nlookup: u64,
}

impl WireDecode for ForgetIn {
    const MIN_SIZE: usize = 8;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            nlookup: u64_at(data, 0)?,
        })
    }
}

/// Open request.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct OpenIn {
    pub flags: u32,
    pub unused: u32,
}

impl WireDecode for OpenIn {
    const MIN_SIZE: usize = 8;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            flags: u32_at(data, 0)?,
            unused: u32_at(data, 4)?,
        })
    }
}

/// Open reply.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct OpenOut {
    pub fh: u64,
    pub open_flags: u32,
    pub padding: u32,
}

pub const OPEN_OUT_SIZE: usize = std::mem::size_of::<OpenOut>();

impl WireEncode for OpenOut {
    const SIZE: usize = OPEN_OUT_SIZE;

    fn write_to(&self, buf: &mut [u8]) {
        put_u64(buf, 0, self.fh);
        put_u32(buf, 8, self.open_flags);
        put_u32(buf, 12, self.padding);
    }
}

/// Read request. Minors before 7.9 end after `size`, so only the first
/// 20 bytes are required.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct ReadIn {
    pub fh: u64,
    pub offset: u64,
    pub size: u32,
    pub read_flags: u32,
    pub lock_owner: u64,
    pub flags: u32,
    pub padding: u32,
}

pub const READ_IN_SIZE: usize = std::mem::size_of::<ReadIn>();

impl WireDecode for ReadIn {
    const MIN_SIZE: usize = 20;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            fh: u64_at(data, 0)?,
            offset: u64_at(data, 8)?,
            size: u32_at(data, 16)?,
            read_flags: u32_at(data, 20).unwrap_or(0),
            lock_owner: u64_at(data, 24).unwrap_or(0),
            flags: u32_at(data, 32).unwrap_or(0),
            padding: u32_at(data, 36).unwrap_or(0),
        })
    }
}

impl ReadIn {
    pub fn to_bytes(self) -> [u8; READ_IN_SIZE] {
        let mut buf = [0u8; READ_IN_SIZE];
        put_u64(&mut buf, 0, self.fh);
        put_u64(&mut buf, 8, self.offset);
        put_u32(&mut buf, 16, self.size);
        put_u32(&mut buf, 20, self.read_flags);
        put_u64(&mut buf, 24, self.lock_owner);
        put_u32(&mut buf, 32, self.flags);
        put_u32(&mut buf, 36, self.padding);
        buf
    }
}

/// Release request. Only the handle is needed.
#[repr(C)]
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub struct ReleaseIn {
    pub fh: u64,
    pub flags: u32,
    pub release_flags: u32,
    pub lock_owner: u64,
}

impl WireDecode for ReleaseIn {
    const MIN_SIZE: usize = 8;

    fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            fh: u64_at(data, 0)?,
            flags: u32_at(data, 8).unwrap_or(0),
            release_flags: u32_at(data, 12).unwrap_or(0),
            lock_owner: u64_at(data, 16).unwrap_or(0),
        })
    }
}

/// Extract a NUL-terminated name. A missing terminator takes the whole slice.
pub fn extract_name(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes_match_kernel() {
        assert_eq!(IN_HEADER_SIZE, 40);
        assert_eq!(OUT_HEADER_SIZE, 16);
        assert_eq!(ATTR_SIZE, 88);
        assert_eq!(ENTRY_OUT_SIZE, 128);
        assert_eq!(ATTR_OUT_SIZE, 104);
        assert_eq!(INIT_OUT_SIZE, 64);
        assert_eq!(OPEN_OUT_SIZE, 16);
        assert_eq!(READ_IN_SIZE, WRITE_IN_SIZE);
    }

    #[test]
    fn max_request_size_fits_largest_write() {
        assert_eq!(MAX_REQUEST_SIZE, 40 + 40 + 256 * 1024);
    }

    #[test]
    fn parse_in_header() {
        let header = InHeader {
            len: 100,
            opcode: 26,
            unique: 12345,
            nodeid: 1,
            ..Default::default()
        };
        let parsed = InHeader::from_bytes(&header.to_bytes()).unwrap();
        assert_eq!(parsed.len, 100);
        assert_eq!(parsed.opcode, 26);
        assert_eq!(parsed.unique, 12345);
        assert_eq!(parsed.nodeid, 1);
    }

    #[test]
    fn short_header_rejected() {
        assert!(InHeader::from_bytes(&[0u8; 39]).is_none());
    }

    #[test]
    fn serialize_out_header() {
        let header = OutHeader {
            len: 16,
            error: -2,
            unique: 12345,
        };
        let bytes = header.to_bytes();
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), 16);
        assert_eq!(i32::from_ne_bytes(bytes[4..8].try_into().unwrap()), -2);
        assert_eq!(u64::from_ne_bytes(bytes[8..16].try_into().unwrap()), 12345);
    }

    #[test]
    fn legacy_read_in_decodes() {
        let mut data = [0u8; 24];
        data[0..8].copy_from_slice(&7u64.to_ne_bytes());
        data[8..16].copy_from_slice(&4096u64.to_ne_bytes());
        data[16..20].copy_from_slice(&512u32.to_ne_bytes());

        let read_in = ReadIn::from_bytes(&data).unwrap();
        assert_eq!(read_in.fh, 7);
        assert_eq!(read_in.offset, 4096);
        assert_eq!(read_in.size, 512);
        assert_eq!(read_in.lock_owner, 0);

        assert!(ReadIn::from_bytes(&data[..19]).is_none());
    }

    #[test]
    fn opcode_round_trip() {
        assert_eq!(Opcode::try_from(26), Ok(Opcode::Init));
        assert_eq!(Opcode::try_from(Opcode::Read as u32), Ok(Opcode::Read));
        assert_eq!(Opcode::try_from(16), Err(16));
    }

    #[test]
    fn extract_name_stops_at_nul() {
        assert_eq!(extract_name(b"42\0garbage"), "42");
        assert_eq!(extract_name(b"17"), "17");
        assert_eq!(extract_name(b"\0"), "");
    }
}
