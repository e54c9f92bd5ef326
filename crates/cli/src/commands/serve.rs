//! The `serve` command - answers FUSE requests on an inherited descriptor.

use std::os::fd::{BorrowedFd, OwnedFd, RawFd};
use std::path::PathBuf;

use anyhow::Context;
use appfuse::{EngineConfig, ForgetPolicy, SessionEnd};
use clap::Args;
use nix::fcntl::{FcntlArg, fcntl};

use crate::config::FileConfig;
use crate::provider::DirectoryProvider;

#[derive(Args)]
pub struct ServeArgs {
    /// Inherited descriptor of the opened FUSE device
    #[arg(long, value_parser = parse_fd)]
    fd: RawFd,

    /// Directory holding one file per node id
    #[arg(long)]
    root: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Maximum number of simultaneously open files
    #[arg(long, value_parser = parse_max_handles)]
    max_handles: Option<usize>,

    /// Seconds the kernel may cache entries and attributes
    #[arg(long)]
    attr_timeout: Option<u64>,

    /// Stop serving when the kernel sends FORGET
    #[arg(long)]
    end_on_forget: bool,
}

fn parse_fd(s: &str) -> Result<RawFd, String> {
    let fd: RawFd = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid descriptor"))?;
    if fd < 0 {
        return Err("descriptor cannot be negative".to_string());
    }
    Ok(fd)
}

fn parse_max_handles(s: &str) -> Result<usize, String> {
    let max: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;
    if max == 0 {
        return Err("max-handles must be at least 1".to_string());
    }
    Ok(max)
}

/// Everything `serve` needs once flags and the config file are merged.
#[derive(Debug)]
struct Settings {
    root: PathBuf,
    engine: EngineConfig,
}

impl ServeArgs {
    /// Command-line flags override the config file.
    fn resolve(&self, file: FileConfig) -> anyhow::Result<Settings> {
        let root = self
            .root
            .clone()
            .or(file.root)
            .ok_or_else(|| anyhow::anyhow!("--root is required (or set `root` in the config file)"))?;

        let mut engine = file.engine;
        if let Some(max_handles) = self.max_handles {
            engine.max_handles = max_handles;
        }
        if let Some(secs) = self.attr_timeout {
            engine.attr_timeout_secs = secs;
        }
        if self.end_on_forget {
            engine.forget = ForgetPolicy::EndSession;
        }
        engine.validate()?;

        Ok(Settings { root, engine })
    }
}

/// Unmounting is the normal way a session goes away, so only a failed
/// negotiation is reported as an error.
fn exit_code(end: SessionEnd) -> i32 {
    match end {
        SessionEnd::Stopped | SessionEnd::DeviceLost => 0,
        SessionEnd::NegotiationFailed { .. } => 1,
    }
}

/// Takes a private duplicate of an inherited descriptor.
fn adopt_fd(fd: RawFd) -> anyhow::Result<OwnedFd> {
    fcntl(fd, FcntlArg::F_GETFD).with_context(|| format!("descriptor {fd} is not open"))?;

    // SAFETY: F_GETFD just confirmed `fd` is open, and the borrow ends
    // before this function returns.
    let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
    borrowed
        .try_clone_to_owned()
        .with_context(|| format!("failed to duplicate descriptor {fd}"))
}

pub async fn run(args: ServeArgs) -> anyhow::Result<i32> {
    let file_config = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    crate::init_logging(file_config.log.as_deref());

    let settings = args.resolve(file_config)?;
    let provider = DirectoryProvider::new(&settings.root)
        .with_context(|| format!("cannot serve {}", settings.root.display()))?;
    let device = adopt_fd(args.fd)?;

    tracing::info!(
        fd = args.fd,
        root = %settings.root.display(),
        max_handles = settings.engine.max_handles,
        "serving FUSE requests"
    );

    let session =
        tokio::task::spawn_blocking(move || appfuse::serve(device, provider, settings.engine));

    tokio::select! {
        result = session => {
            let end = result.context("FUSE session thread panicked")??;
            Ok(exit_code(end))
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
            Ok(0)
        }
    }
}
