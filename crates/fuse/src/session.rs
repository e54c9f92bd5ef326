//! The blocking request loop over a FUSE device descriptor.

use std::fmt;
use std::io::IoSlice;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

use nix::errno::Errno;
use nix::sys::uio::writev;
use nix::unistd::read;

use crate::abi::{OUT_HEADER_SIZE, OutHeader};
use crate::config::EngineConfig;
use crate::engine::{Control, ProtocolEngine};
use crate::error::Result;
use crate::frame::RequestFrame;
use crate::provider::FileProvider;

/// Why a session stopped serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The kernel asked us to stop.
    Stopped,
    /// The device was unmounted, closed, or became unusable.
    DeviceLost,
    /// The kernel speaks a protocol we cannot serve.
    NegotiationFailed { major: u32, minor: u32 },
}

impl SessionEnd {
    /// Only a stop requested by the kernel counts as clean.
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped by kernel"),
            Self::DeviceLost => write!(f, "device lost"),
            Self::NegotiationFailed { major, minor } => {
                write!(f, "unsupported kernel protocol {major}.{minor}")
            }
        }
    }
}

/// An open FUSE device (or anything else that delivers one request per read).
#[derive(Debug)]
pub struct FuseDevice {
    fd: OwnedFd,
}

impl FuseDevice {
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Reads one whole frame, retrying reads interrupted by a signal.
    pub fn read_frame(&self, buf: &mut [u8]) -> nix::Result<usize> {
        loop {
            match read(self.fd.as_raw_fd(), buf) {
                Err(Errno::EINTR) => continue,
                result => return result,
            }
        }
    }

    /// Writes header and payload as one frame.
    pub fn write_reply(&self, header: &OutHeader, payload: &[u8]) -> nix::Result<usize> {
        let header = header.to_bytes();
        if payload.is_empty() {
            writev(&self.fd, &[IoSlice::new(&header)])
        } else {
            writev(&self.fd, &[IoSlice::new(&header), IoSlice::new(payload)])
        }
    }
}

impl AsFd for FuseDevice {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<OwnedFd> for FuseDevice {
    fn from(fd: OwnedFd) -> Self {
        Self::new(fd)
    }
}

pub struct Session<P> {
    device: FuseDevice,
    engine: ProtocolEngine<P>,
    frame: RequestFrame,
}

impl<P: FileProvider> Session<P> {
    pub fn new(device: FuseDevice, provider: P, config: EngineConfig) -> Result<Self> {
        Ok(Self {
            device,
            engine: ProtocolEngine::new(provider, config)?,
            frame: RequestFrame::new(),
        })
    }

    /// Serves requests one at a time until the session ends.
    pub fn run(&mut self) -> SessionEnd {
        tracing::debug!(fd = self.device.as_fd().as_raw_fd(), "FUSE session started");
        loop {
            if let Control::Stop(end) = self.step() {
                match end {
                    SessionEnd::NegotiationFailed { .. } => {
                        tracing::error!("FUSE session ended: {end}")
                    }
                    _ => tracing::info!("FUSE session ended: {end}"),
                }
                return end;
            }
        }
    }

    /// Reads, dispatches and answers a single frame.
    fn step(&mut self) -> Control {
        let n = match self.device.read_frame(self.frame.read_buffer()) {
            Ok(0) => return Control::Stop(SessionEnd::DeviceLost),
            Ok(n) => n,
            Err(Errno::ENODEV) | Err(Errno::EBADF) => return Control::Stop(SessionEnd::DeviceLost),
            Err(e) => {
                tracing::warn!("failed to read FUSE request: {e}");
                return Control::Continue;
            }
        };

        let header = match self.frame.validate(n) {
            Ok(header) => header,
            Err(e) => {
                tracing::warn!("dropping malformed FUSE frame: {e}");
                return Control::Continue;
            }
        };

        let request = match self.frame.decode() {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(unique = header.unique, "rejecting FUSE request: {e}");
                let reply = OutHeader::for_result(header.unique, Err(Errno::EINVAL), 0);
                send_reply(&self.device, &reply, &[]);
                return Control::Continue;
            }
        };

        let mut out = self.frame.response();
        let outcome = self.engine.dispatch(&request, &mut out);
        debug_assert_eq!(outcome.reply.is_some(), request.operation.expects_reply());

        if let Some(result) = outcome.reply {
            let reply = OutHeader::for_result(request.header.unique, result, out.size());
            let payload: &[u8] = match result {
                Ok(()) => out.payload(),
                Err(_) => &[],
            };
            debug_assert_eq!(reply.len as usize, OUT_HEADER_SIZE + payload.len());
            send_reply(&self.device, &reply, payload);
        }

        outcome.control
    }
}

fn send_reply(device: &FuseDevice, header: &OutHeader, payload: &[u8]) {
    match device.write_reply(header, payload) {
        Ok(_) => {}
        // The request was interrupted and the kernel no longer wants the reply.
        Err(Errno::ENOENT) => {
            tracing::debug!(unique = header.unique, "reply to interrupted request dropped")
        }
        Err(e) => tracing::warn!(unique = header.unique, "failed to write FUSE reply: {e}"),
    }
}

/// Serves `fd` with `provider` until the session ends.
pub fn serve<P: FileProvider>(
    fd: OwnedFd,
    provider: P,
    config: EngineConfig,
) -> Result<SessionEnd> {
    let mut session = Session::new(FuseDevice::new(fd), provider, config)?;
    Ok(session.run())
}
