//! External collaborators: downloads, unpacking, and the Go toolchain.

pub mod download;
pub mod go;
pub mod unpack;

pub use download::{DownloadBody, DownloadError, Downloader, HttpDownloader, stream_to_file};
pub use go::{CommandGoToolchain, GoError, GoToolchain};
pub use unpack::{ArchiveFormat, ArchiveUnpacker, UnpackError, Unpacker};
