//! A read-only FUSE filesystem served straight off the kernel wire protocol.
//!
//! The filesystem is a single root directory whose children are named by
//! decimal node ids. Sizes and contents come from a [`FileProvider`]; the
//! directory itself cannot be listed, so callers must already know the ids
//! they want to open.
//!
//! ```no_run
//! use std::os::fd::OwnedFd;
//!
//! use appfuse::{EngineConfig, MemoryProvider, serve};
//!
//! # fn device() -> OwnedFd { unimplemented!() }
//! let provider = MemoryProvider::new().with_file(42, b"hello".to_vec());
//! let end = serve(device(), provider, EngineConfig::default())?;
//! println!("session ended: {end}");
//! # Ok::<(), appfuse::Error>(())
//! ```

pub mod abi;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handle;
pub mod provider;
pub mod request;
pub mod session;
pub mod version;

pub use config::{EngineConfig, ForgetPolicy};
pub use engine::{Control, Outcome, ProtocolEngine};
pub use error::{Error, FrameError, Result};
pub use frame::{RequestFrame, ResponseBuilder};
pub use handle::{Handle, HandleTable};
pub use provider::{FileProvider, MemoryProvider, ProviderError};
pub use request::{Operation, Request};
pub use session::{FuseDevice, Session, SessionEnd, serve};
pub use version::ProtocolVersion;
