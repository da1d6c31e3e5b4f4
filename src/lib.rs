mod dir;
mod fs;
mod image;
pub mod fsck;

pub use crate::dir::DirEntry;
pub use crate::image::{Image, ImageFile};
pub use crate::fs::{
    DirEntryDisk,
    Geometry,
    InodeDisk,
    SuperblockDisk,
    BSIZE,
    DIRSIZ,
    NDIRECT,
    NINDIRECT,
    ROOT_INO,
    T_DEV,
    T_DIR,
    T_FILE,
    T_FREE,
};
