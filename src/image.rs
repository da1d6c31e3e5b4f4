use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use log::debug;
use zerocopy::FromBytes;

use crate::fs::{Geometry, InodeDisk, SuperblockDisk, BSIZE, SUPERBLOCK_BLOCK};
use crate::fsck::fsck_backend::FsckBackend;
use crate::fsck::fsck_types::{FsckError, Result};

/// Vistas tipadas sobre una imagen completa en memoria.
///
/// No copia nada: superblock, inodos y bloques se devuelven como referencias
/// al buffer original.
#[derive(Debug, Clone, Copy)]
pub struct Image<'a> {
    bytes: &'a [u8],
    superblock: &'a SuperblockDisk,
    geometry: Geometry,
}

impl<'a> Image<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self> {
        // el bloque de arranque y el superblock deben estar completos
        let min_len = (SUPERBLOCK_BLOCK as usize + 1) * BSIZE;
        if bytes.len() < min_len {
            return Err(FsckError::ImageTooSmall {
                needed: min_len as u64,
                actual: bytes.len() as u64,
            });
        }

        let sb_start = SUPERBLOCK_BLOCK as usize * BSIZE;
        let sb_end = sb_start + mem::size_of::<SuperblockDisk>();
        let raw = &bytes[sb_start..sb_end];
        let superblock =
            SuperblockDisk::ref_from_bytes(raw).map_err(|_| FsckError::ImageTooSmall {
                needed: min_len as u64,
                actual: bytes.len() as u64,
            })?;

        let geometry = Geometry::from_superblock(superblock);
        validate_geometry(&geometry)?;

        if (bytes.len() as u64) < geometry.image_bytes() {
            return Err(FsckError::ImageTooSmall {
                needed: geometry.image_bytes(),
                actual: bytes.len() as u64,
            });
        }

        debug!(
            "imagen: {} bloques, {} inodos, bitmap en {}, datos desde {}",
            geometry.size, geometry.ninodes, geometry.bitmap_start, geometry.data_start
        );

        Ok(Self {
            bytes,
            superblock,
            geometry,
        })
    }

    pub fn superblock(&self) -> &'a SuperblockDisk {
        self.superblock
    }
}

fn validate_geometry(geo: &Geometry) -> Result<()> {
    if geo.data_start >= geo.size {
        return Err(FsckError::CorruptSuperblock(
            "la región de datos empieza después del final de la imagen",
        ));
    }
    if geo.nblocks > geo.size - geo.data_start {
        return Err(FsckError::CorruptSuperblock(
            "nblocks excede los bloques disponibles tras el bitmap",
        ));
    }
    Ok(())
}

impl FsckBackend for Image<'_> {
    fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    fn inode(&self, inum: u32) -> Option<&InodeDisk> {
        if inum >= self.geometry.ninodes {
            return None;
        }
        let start = self.geometry.inode_offset(inum);
        let raw = self.bytes.get(start..start + mem::size_of::<InodeDisk>())?;
        InodeDisk::ref_from_bytes(raw).ok()
    }

    fn block(&self, addr: u32) -> Option<&[u8]> {
        if addr >= self.geometry.size {
            return None;
        }
        let start = addr as usize * BSIZE;
        self.bytes.get(start..start + BSIZE)
    }

    fn marked_used(&self, addr: u32) -> bool {
        let byte = self.geometry.bitmap_start as usize * BSIZE + addr as usize / 8;
        self.bytes
            .get(byte)
            .map_or(false, |b| (b >> (addr % 8)) & 1 == 1)
    }
}

/// Imagen cargada desde un archivo. El buffer se libera al salir de alcance,
/// incluso si la verificación termina con error.
#[derive(Debug)]
pub struct ImageFile {
    path: PathBuf,
    bytes: Vec<u8>,
}

impl ImageFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).map_err(|source| FsckError::Io {
            path: path.clone(),
            source,
        })?;
        debug!("leídos {} bytes de {:?}", bytes.len(), path);
        Ok(Self { path, bytes })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn image(&self) -> Result<Image<'_>> {
        Image::new(&self.bytes)
    }
}
