//! Protocol version negotiation and version-dependent reply sizes.

use std::fmt;

use crate::abi::{
    ATTR_OUT_SIZE, ENTRY_OUT_SIZE, FUSE_KERNEL_VERSION, FUSE_MAX_MINOR_VERSION,
    FUSE_MIN_MINOR_VERSION, INIT_OUT_SIZE,
};

/// `FUSE_COMPAT_22_INIT_OUT_SIZE`: the init reply layout of 7.6 through 7.22.
pub const COMPAT_22_INIT_OUT_SIZE: usize = 24;

/// `FUSE_COMPAT_ENTRY_OUT_SIZE`: entry reply before `fuse_attr` grew in 7.9.
pub const COMPAT_ENTRY_OUT_SIZE: usize = 120;

/// `FUSE_COMPAT_ATTR_OUT_SIZE`: attr reply before 7.9.
pub const COMPAT_ATTR_OUT_SIZE: usize = 96;

/// Reply payload sizes for one range of minor versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySizes {
    pub init_out: usize,
    pub entry_out: usize,
    pub attr_out: usize,
}

/// Minor version ranges, each starting at `first_minor` and running until the
/// next row. Rows are sorted by `first_minor`.
const REPLY_SIZES: &[(u32, ReplySizes)] = &[
    (
        6,
        ReplySizes {
            init_out: COMPAT_22_INIT_OUT_SIZE,
            entry_out: COMPAT_ENTRY_OUT_SIZE,
            attr_out: COMPAT_ATTR_OUT_SIZE,
        },
    ),
    (
        9,
        ReplySizes {
            init_out: COMPAT_22_INIT_OUT_SIZE,
            entry_out: ENTRY_OUT_SIZE,
            attr_out: ATTR_OUT_SIZE,
        },
    ),
    (
        23,
        ReplySizes {
            init_out: INIT_OUT_SIZE,
            entry_out: ENTRY_OUT_SIZE,
            attr_out: ATTR_OUT_SIZE,
        },
    ),
];

/// Looks up the reply sizes a peer speaking `minor` expects.
pub fn reply_sizes(minor: u32) -> ReplySizes {
    REPLY_SIZES
        .iter()
        .rev()
        .find(|(first, _)| minor >= *first)
        .map(|(_, sizes)| *sizes)
        .unwrap_or(REPLY_SIZES[0].1)
}

/// A negotiated protocol version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    /// Assumed until INIT completes.
    pub const CURRENT: Self = Self {
        major: FUSE_KERNEL_VERSION,
        minor: FUSE_MAX_MINOR_VERSION,
    };

    /// Negotiates against the version the kernel offers.
    ///
    /// The major must match exactly and the minor must be at least 7.6. The
    /// result's minor is clamped to the highest minor this engine implements.
    pub fn negotiate(major: u32, minor: u32) -> Option<Self> {
        if major != FUSE_KERNEL_VERSION || minor < FUSE_MIN_MINOR_VERSION {
            return None;
        }
        Some(Self {
            major: FUSE_KERNEL_VERSION,
            minor: minor.min(FUSE_MAX_MINOR_VERSION),
        })
    }

    pub fn reply_sizes(self) -> ReplySizes {
        reply_sizes(self.minor)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_rows_sorted() {
        assert!(REPLY_SIZES.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(REPLY_SIZES[0].0, FUSE_MIN_MINOR_VERSION);
    }

    #[test]
    fn init_out_size_by_minor() {
        assert_eq!(reply_sizes(6).init_out, 24);
        assert_eq!(reply_sizes(22).init_out, 24);
        assert_eq!(reply_sizes(23).init_out, 64);
        assert_eq!(reply_sizes(31).init_out, 64);
    }

    #[test]
    fn attr_sizes_grow_at_minor_nine() {
        assert_eq!(reply_sizes(8).entry_out, 120);
        assert_eq!(reply_sizes(8).attr_out, 96);
        assert_eq!(reply_sizes(9).entry_out, 128);
        assert_eq!(reply_sizes(9).attr_out, 104);
    }

    #[test]
    fn negotiate_clamps_minor() {
        let v = ProtocolVersion::negotiate(7, 31).unwrap();
        assert_eq!(v, ProtocolVersion { major: 7, minor: 15 });

        let v = ProtocolVersion::negotiate(7, 8).unwrap();
        assert_eq!(v.minor, 8);
        assert_eq!(v.to_string(), "7.8");
    }

    #[test]
    fn negotiate_rejects_incompatible() {
        assert!(ProtocolVersion::negotiate(6, 31).is_none());
        assert!(ProtocolVersion::negotiate(8, 0).is_none());
        assert!(ProtocolVersion::negotiate(7, 5).is_none());
    }
}
