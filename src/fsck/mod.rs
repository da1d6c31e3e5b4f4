pub mod addrs;
pub mod dirs;
#[allow(clippy::module_inception)]
pub mod fsck;
pub mod fsck_backend;
pub mod fsck_types;
pub mod mock;
pub mod scan;
pub mod usage;

pub use fsck::{check_file, check_image, run_fsck, Stage};
pub use fsck_backend::FsckBackend;
pub use fsck_types::{AddrKind, ErrorClass, FsckError, FsckSummary, InodeType};
