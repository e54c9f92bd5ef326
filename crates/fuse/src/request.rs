//! Decoded requests.

use crate::abi::{ForgetIn, InHeader, InitIn, OpenIn, ReadIn, ReleaseIn};

/// A request copied out of the shared frame buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub header: InHeader,
    pub operation: Operation,
}

/// Every operation the engine distinguishes, each with its own payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Lookup { name: String },
    Forget(ForgetIn),
    Getattr,
    Open(OpenIn),
    Read(ReadIn),
    Release(ReleaseIn),
    Flush,
    Init(InitIn),
    Interrupt,
    Destroy,
    BatchForget,
    Unsupported(u32),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lookup { .. } => "LOOKUP",
            Self::Forget(_) => "FORGET",
            Self::Getattr => "GETATTR",
            Self::Open(_) => "OPEN",
            Self::Read(_) => "READ",
            Self::Release(_) => "RELEASE",
            Self::Flush => "FLUSH",
            Self::Init(_) => "INIT",
            Self::Interrupt => "INTERRUPT",
            Self::Destroy => "DESTROY",
            Self::BatchForget => "BATCH_FORGET",
            Self::Unsupported(_) => "UNSUPPORTED",
        }
    }

    /// Notifications carry no reply.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, Self::Forget(_) | Self::BatchForget | Self::Interrupt)
    }
}
