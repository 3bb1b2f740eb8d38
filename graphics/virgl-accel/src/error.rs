//! Error types for acceleration operations

use crate::context::PixmapId;

/// Result type for acceleration operations
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Host round trips that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    ResourceCreate,
    Map,
    Mmap,
    TransferPut,
    TransferGet,
    Wait,
    Execbuffer,
    GemClose,
    Flink,
    DirtyFb,
}

impl core::fmt::Display for Verb {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Verb::ResourceCreate => "RESOURCE_CREATE",
            Verb::Map => "MAP",
            Verb::Mmap => "mmap",
            Verb::TransferPut => "TRANSFER_TO_HOST",
            Verb::TransferGet => "TRANSFER_FROM_HOST",
            Verb::Wait => "WAIT",
            Verb::Execbuffer => "EXECBUFFER",
            Verb::GemClose => "GEM_CLOSE",
            Verb::Flink => "GEM_FLINK",
            Verb::DirtyFb => "DIRTYFB",
        };
        f.write_str(name)
    }
}

/// Acceleration error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Zero or overflowing width/height
    #[error("invalid surface dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
    /// Bits per pixel outside {8, 16, 24, 32}
    #[error("unsupported bits per pixel: {0}")]
    UnsupportedDepth(u32),
    /// Pixmap exceeds the configured maximum dimension
    #[error("pixmap {width}x{height} exceeds the maximum of {max}")]
    PixmapTooLarge { width: u32, height: u32, max: u32 },
    /// A host round trip failed
    #[error("{verb} failed: {source}")]
    Transport {
        verb: Verb,
        #[source]
        source: nix::Error,
    },
    /// A single command does not fit an empty encoder buffer
    #[error("command of {words} words exceeds encoder capacity of {capacity} words")]
    CommandTooLarge { words: usize, capacity: usize },
    /// The device does not currently own the display
    #[error("display is not active")]
    Inactive,
    /// No surface is attached to the pixmap
    #[error("unknown pixmap {0:?}")]
    UnknownPixmap(PixmapId),
    /// The operation needs a host resource and the surface has none
    #[error("surface is not host backed")]
    NotHostBacked,
    /// `copy` was called without a successful `prepare_copy`
    #[error("no copy source prepared")]
    NoCopySource,
    /// The DRM device node could not be opened
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// A configuration file could not be read
    #[error("failed to read configuration {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Malformed or inconsistent configuration
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn transport(verb: Verb, source: nix::Error) -> Self {
        Error::Transport { verb, source }
    }

    /// Whether the failure came from the host side
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

