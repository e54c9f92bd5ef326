//! Per-opcode request handling.
//!
//! Handlers receive the request already copied out of the frame, so they are
//! free to overwrite the shared buffer through the [`ResponseBuilder`].

use nix::errno::Errno;

use crate::abi::{
    Attr, AttrOut, EntryOut, FUSE_ATOMIC_O_TRUNC, FUSE_BIG_WRITES, InitIn, InitOut, MAX_READ,
    MAX_WRITE, OpenOut, ROOT_NODE_ID, ReadIn, ReleaseIn, S_IFDIR, S_IFREG,
};
use crate::config::{EngineConfig, ForgetPolicy};
use crate::error::Result;
use crate::frame::ResponseBuilder;
use crate::handle::{Handle, HandleTable};
use crate::provider::FileProvider;
use crate::request::{Operation, Request};
use crate::session::SessionEnd;
use crate::version::{ProtocolVersion, ReplySizes, reply_sizes};

/// Whether the session keeps going after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Stop(SessionEnd),
}

/// What the session should do with one dispatched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// `None` for notifications, which are never answered.
    pub reply: Option<std::result::Result<(), Errno>>,
    pub control: Control,
}

impl Outcome {
    fn reply(result: std::result::Result<(), Errno>) -> Self {
        Self {
            reply: Some(result),
            control: Control::Continue,
        }
    }

    fn silent() -> Self {
        Self {
            reply: None,
            control: Control::Continue,
        }
    }
}

pub struct ProtocolEngine<P> {
    provider: P,
    handles: HandleTable,
    config: EngineConfig,
    version: Option<ProtocolVersion>,
}

impl<P: FileProvider> ProtocolEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            provider,
            handles: HandleTable::with_capacity(config.max_handles),
            config,
            version: None,
        })
    }

    /// The version agreed on at INIT, if INIT has happened.
    pub fn version(&self) -> Option<ProtocolVersion> {
        self.version
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    pub fn dispatch(&mut self, request: &Request, out: &mut ResponseBuilder<'_>) -> Outcome {
        let header = &request.header;
        tracing::debug!(
            op = request.operation.name(),
            unique = header.unique,
            nodeid = header.nodeid,
            "request"
        );

        match &request.operation {
            Operation::Lookup { name } => Outcome::reply(self.lookup(header.nodeid, name, out)),
            Operation::Init(init_in) => self.init(*init_in, out),
            Operation::Getattr => Outcome::reply(self.getattr(header.nodeid, out)),
            Operation::Open(_) => Outcome::reply(self.open(header.nodeid, out)),
            Operation::Read(read_in) => Outcome::reply(self.read(read_in, out)),
            Operation::Release(release_in) => Outcome::reply(self.release(release_in, out)),
            Operation::Flush => {
                out.reset(0);
                Outcome::reply(Ok(()))
            }
            Operation::Forget(_) | Operation::BatchForget => self.forget(header.nodeid),
            Operation::Interrupt => Outcome::silent(),
            Operation::Destroy => {
                tracing::info!(open_handles = self.handles.len(), "FUSE session destroyed");
                out.reset(0);
                Outcome {
                    reply: Some(Ok(())),
                    control: Control::Stop(SessionEnd::Stopped),
                }
            }
            Operation::Unsupported(opcode) => {
                tracing::debug!(
                    "NOTIMPL op={} unique={:#x} nid={:#x}",
                    opcode,
                    header.unique,
                    header.nodeid
                );
                Outcome::reply(Err(Errno::ENOSYS))
            }
        }
    }

    fn sizes(&self) -> ReplySizes {
        self.version.unwrap_or(ProtocolVersion::CURRENT).reply_sizes()
    }

    fn attr_timeout(&self) -> u64 {
        self.config.attr_timeout_secs
    }

    fn lookup(
        &self,
        parent: u64,
        name: &str,
        out: &mut ResponseBuilder<'_>,
    ) -> std::result::Result<(), Errno> {
        if parent != ROOT_NODE_ID {
            return Err(Errno::ENOENT);
        }

        let node = parse_node_id(name).ok_or(Errno::ENOENT)?;
        let size = self.provider.size_of(node).map_err(|e| {
            tracing::debug!(node, error = %e, "lookup failed");
            Errno::ENOENT
        })?;

        out.reset(self.sizes().entry_out);
        out.write(&EntryOut {
            nodeid: node,
            generation: 0,
            entry_valid: self.attr_timeout(),
            attr_valid: self.attr_timeout(),
            entry_valid_nsec: 0,
            attr_valid_nsec: 0,
            attr: file_attr(node, size),
        });
        Ok(())
    }

    fn init(&mut self, init_in: InitIn, out: &mut ResponseBuilder<'_>) -> Outcome {
        let Some(version) = ProtocolVersion::negotiate(init_in.major, init_in.minor) else {
            tracing::error!(
                "FUSE kernel version mismatch: kernel version {}.{}, expected at least {}.6",
                init_in.major,
                init_in.minor,
                ProtocolVersion::CURRENT.major
            );
            return Outcome {
                reply: Some(Err(Errno::EPROTO)),
                control: Control::Stop(SessionEnd::NegotiationFailed {
                    major: init_in.major,
                    minor: init_in.minor,
                }),
            };
        };

        // The kernel's own minor decides which init_out layout it expects.
        out.reset(reply_sizes(init_in.minor).init_out);
        out.write(&InitOut {
            major: version.major,
            minor: version.minor,
            max_readahead: init_in.max_readahead,
            flags: FUSE_ATOMIC_O_TRUNC | FUSE_BIG_WRITES,
            max_background: self.config.max_background,
            congestion_threshold: self.config.congestion_threshold,
            max_write: MAX_WRITE,
            time_gran: 0,
            unused: [0; 9],
        });

        tracing::info!(
            kernel_major = init_in.major,
            kernel_minor = init_in.minor,
            negotiated = %version,
            "FUSE session initialized"
        );
        self.version = Some(version);
        Outcome::reply(Ok(()))
    }

    fn getattr(&self, nodeid: u64, out: &mut ResponseBuilder<'_>) -> std::result::Result<(), Errno> {
        let attr = if nodeid == ROOT_NODE_ID {
            root_attr()
        } else {
            let size = self.provider.size_of(nodeid).map_err(|e| {
                tracing::debug!(node = nodeid, error = %e, "getattr failed");
                Errno::ENOENT
            })?;
            file_attr(nodeid, size)
        };

        out.reset(self.sizes().attr_out);
        out.write(&AttrOut {
            attr_valid: self.attr_timeout(),
            attr_valid_nsec: 0,
            dummy: 0,
            attr,
        });
        Ok(())
    }

    fn open(&mut self, nodeid: u64, out: &mut ResponseBuilder<'_>) -> std::result::Result<(), Errno> {
        let fh = self.handles.try_open(nodeid).map_err(|e| {
            tracing::warn!(node = nodeid, "{e}");
            Errno::EMFILE
        })?;

        out.reset_for::<OpenOut>();
        out.write(&OpenOut {
            fh: u64::from(fh),
            open_flags: 0,
            padding: 0,
        });
        Ok(())
    }

    fn read(&self, read_in: &ReadIn, out: &mut ResponseBuilder<'_>) -> std::result::Result<(), Errno> {
        if read_in.size > MAX_READ {
            return Err(Errno::EINVAL);
        }

        let node = Handle::try_from(read_in.fh)
            .ok()
            .and_then(|fh| self.handles.lookup(fh))
            .ok_or(Errno::EBADF)?;

        let file_size = self.provider.size_of(node).map_err(|e| {
            tracing::warn!(node, error = %e, "size query for read failed");
            Errno::EIO
        })?;

        // Reads past the end come back short rather than failing.
        let len = u64::from(read_in.size).min(file_size.saturating_sub(read_in.offset)) as usize;

        out.reset(0);
        if len == 0 {
            return Ok(());
        }

        let bytes = self
            .provider
            .read_range(node, read_in.offset, len as u32)
            .map_err(|e| {
                tracing::warn!(node, offset = read_in.offset, len, error = %e, "read failed");
                Errno::EIO
            })?;
        if bytes.len() != len {
            tracing::warn!(node, expected = len, got = bytes.len(), "short read from provider");
            return Err(Errno::EIO);
        }

        out.data_mut()
            .get_mut(..len)
            .ok_or(Errno::EIO)?
            .copy_from_slice(&bytes);
        out.set_size(len);
        Ok(())
    }

    fn release(
        &mut self,
        release_in: &ReleaseIn,
        out: &mut ResponseBuilder<'_>,
    ) -> std::result::Result<(), Errno> {
        if let Ok(fh) = Handle::try_from(release_in.fh) {
            self.handles.close(fh);
        }
        out.reset(0);
        Ok(())
    }

    fn forget(&self, nodeid: u64) -> Outcome {
        match self.config.forget {
            ForgetPolicy::Ignore => Outcome::silent(),
            ForgetPolicy::EndSession => {
                tracing::info!(node = nodeid, "FORGET received, ending session");
                Outcome {
                    reply: None,
                    control: Control::Stop(SessionEnd::Stopped),
                }
            }
        }
    }
}

/// Parses a child name as a node id. Only plain positive decimal numbers
/// name nodes, and the root id is never a child.
///
/// Stricter than C `atoi`: `"+42"`, `" 42"` and `"42abc"` are rejected, and
/// `"1"` cannot alias the root directory as a file.
fn parse_node_id(name: &str) -> Option<u64> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse::<u64>()
        .ok()
        .filter(|&n| n != 0 && n != ROOT_NODE_ID)
}

fn file_attr(node: u64, size: u64) -> Attr {
    Attr {
        ino: node,
        size,
        blocks: size.div_ceil(512),
        mode: S_IFREG | 0o777,
        nlink: 1,
        ..Default::default()
    }
}

fn root_attr() -> Attr {
    Attr {
        ino: ROOT_NODE_ID,
        size: 0,
        mode: S_IFDIR | 0o777,
        nlink: 2,
        ..Default::default()
    }
}
