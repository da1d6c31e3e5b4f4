use std::mem;

use zerocopy::byteorder::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

// -----------------------------------------------------------------------------
// Constantes del formato en disco
// -----------------------------------------------------------------------------

pub const BSIZE: usize = 512;
pub const NDIRECT: usize = 12;
pub const NINDIRECT: usize = BSIZE / mem::size_of::<u32>();
pub const DIRSIZ: usize = 14;

/// Inodo del directorio raíz. El inodo 0 nunca se usa.
pub const ROOT_INO: u32 = 1;

pub const SUPERBLOCK_BLOCK: u32 = 1;
pub const INODE_TABLE_START: u32 = 2;

/// Inodos por bloque.
pub const IPB: usize = BSIZE / mem::size_of::<InodeDisk>();
/// Bits de bitmap por bloque.
pub const BPB: usize = BSIZE * 8;
/// Entradas de directorio por bloque.
pub const DPB: usize = BSIZE / mem::size_of::<DirEntryDisk>();

pub const T_FREE: u16 = 0;
pub const T_DIR: u16 = 1;
pub const T_FILE: u16 = 2;
pub const T_DEV: u16 = 3;

// -------------------- Estructuras en disco --------------------

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct SuperblockDisk {
    /// Tamaño total de la imagen en bloques
    pub size: U32,
    /// Cantidad de bloques de datos
    pub nblocks: U32,
    /// Cantidad de inodos
    pub ninodes: U32,
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct InodeDisk {
    pub file_type: U16,
    pub major: U16,
    pub minor: U16,
    pub nlink: U16,
    pub size: U32,
    /// `NDIRECT` direcciones directas seguidas del puntero indirecto.
    pub addrs: [U32; NDIRECT + 1],
}

impl InodeDisk {
    /// Crea un inodo vacío del tipo indicado.
    pub fn new(file_type: u16, nlink: u16) -> Self {
        Self {
            file_type: U16::new(file_type),
            nlink: U16::new(nlink),
            ..Self::default()
        }
    }

    pub fn direct(&self) -> [u32; NDIRECT] {
        let mut out = [0u32; NDIRECT];
        for (slot, addr) in out.iter_mut().zip(&self.addrs[..NDIRECT]) {
            *slot = addr.get();
        }
        out
    }

    pub fn indirect(&self) -> u32 {
        self.addrs[NDIRECT].get()
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct DirEntryDisk {
    pub inum: U16,
    pub name: [u8; DIRSIZ],
}

// -----------------------------------------------------------------------------
// Layout derivado del superblock
// -----------------------------------------------------------------------------

/// Regiones de la imagen calculadas a partir del superblock.
///
/// `[0]` arranque, `[1]` superblock, luego la tabla de inodos, el bitmap
/// (un bit por bloque de la imagen) y por último los bloques de datos.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub size: u32,
    pub nblocks: u32,
    pub ninodes: u32,
    pub inode_blocks: u32,
    pub bitmap_start: u32,
    pub bitmap_blocks: u32,
    pub data_start: u32,
}

impl Geometry {
    pub fn from_counts(size: u32, nblocks: u32, ninodes: u32) -> Self {
        // ninodes / IPB y size / BPB nunca se acercan a u32::MAX
        let inode_blocks = ninodes / IPB as u32 + 1;
        let bitmap_start = INODE_TABLE_START + inode_blocks;
        let bitmap_blocks = size / BPB as u32 + 1;
        let data_start = bitmap_start + bitmap_blocks;
        Self {
            size,
            nblocks,
            ninodes,
            inode_blocks,
            bitmap_start,
            bitmap_blocks,
            data_start,
        }
    }

    pub fn from_superblock(sb: &SuperblockDisk) -> Self {
        Self::from_counts(sb.size.get(), sb.nblocks.get(), sb.ninodes.get())
    }

    /// `true` si `addr` cae dentro de `[data_start, size)`.
    pub fn is_data_block(&self, addr: u32) -> bool {
        addr >= self.data_start && addr < self.size
    }

    pub fn image_bytes(&self) -> u64 {
        self.size as u64 * BSIZE as u64
    }

    /// Desplazamiento en bytes del inodo `inum` dentro de la imagen.
    pub fn inode_offset(&self, inum: u32) -> usize {
        INODE_TABLE_START as usize * BSIZE + inum as usize * mem::size_of::<InodeDisk>()
    }
}
