/*Recorrido de la tabla de inodos y resolución de las direcciones de
bloque que reclama cada inodo (directas, puntero indirecto y las que
guarda el bloque indirecto). Validación de direcciones, conteo de uso y
directorios usan exactamente esta misma secuencia. */

use super::fsck_backend::FsckBackend;
use super::fsck_types::{AddrKind, FsckError, InodeType, Result};
use crate::fs::NDIRECT;

/// Un inodo ya decodificado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeEntry {
    pub inum: u32,
    pub kind: InodeType,
    pub nlink: u16,
    pub direct: [u32; NDIRECT],
    pub indirect: u32,
}

/// Una dirección reclamada por un inodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRef {
    pub addr: u32,
    pub kind: AddrKind,
}

/// Decodifica el inodo `inum`.
pub fn decode<B: FsckBackend>(backend: &B, inum: u32) -> Result<InodeEntry> {
    let raw = backend.inode(inum).ok_or(FsckError::CorruptSuperblock(
        "la tabla de inodos excede la imagen",
    ))?;
    let raw_type = raw.file_type.get();
    let kind = InodeType::from_raw(raw_type).ok_or(FsckError::InvalidInodeType {
        inum,
        raw: raw_type,
    })?;
    Ok(InodeEntry {
        inum,
        kind,
        nlink: raw.nlink.get(),
        direct: raw.direct(),
        indirect: raw.indirect(),
    })
}

/// Recorre los `ninodes` inodos en orden. Es perezoso y se puede volver a
/// llamar tantas veces como haga falta; un tipo desconocido produce
/// `InvalidInodeType`.
pub fn scan<B: FsckBackend>(backend: &B) -> impl Iterator<Item = Result<InodeEntry>> + '_ {
    (0..backend.geometry().ninodes).map(move |inum| decode(backend, inum))
}

/// Igual que [`scan`], pero sólo los inodos en uso.
pub fn in_use<B: FsckBackend>(backend: &B) -> impl Iterator<Item = Result<InodeEntry>> + '_ {
    scan(backend).filter(|entry| entry.as_ref().map_or(true, |e| e.kind.in_use()))
}

/// Direcciones no nulas del bloque indirecto `addr`. Sólo se lee el bloque si
/// `addr` está dentro de la región de datos.
pub fn indirect_addrs<B: FsckBackend>(backend: &B, addr: u32) -> impl Iterator<Item = u32> + '_ {
    let block = if addr != 0 && backend.geometry().is_data_block(addr) {
        backend.block(addr)
    } else {
        None
    };

    block
        .into_iter()
        .flat_map(|b| b.chunks_exact(4))
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .filter(|&a| a != 0)
}

/// Todas las direcciones que reclama `entry`: primero las directas, luego el
/// puntero indirecto y por último las que contiene el bloque indirecto.
pub fn block_refs<'b, B: FsckBackend>(
    backend: &'b B,
    entry: &InodeEntry,
) -> impl Iterator<Item = BlockRef> + 'b {
    let direct = entry
        .direct
        .into_iter()
        .filter(|&a| a != 0)
        .map(|addr| BlockRef {
            addr,
            kind: AddrKind::Direct,
        });

    let pointer = (entry.indirect != 0).then_some(BlockRef {
        addr: entry.indirect,
        kind: AddrKind::Indirect,
    });

    let referenced = indirect_addrs(backend, entry.indirect).map(|addr| BlockRef {
        addr,
        kind: AddrKind::IndirectReferenced,
    });

    direct.chain(pointer).chain(referenced)
}

/// Bloques de datos del inodo (sin el bloque indirecto). El booleano indica
/// si es el primer bloque directo, donde viven "." y "..".
pub fn data_blocks<'b, B: FsckBackend>(
    backend: &'b B,
    entry: &InodeEntry,
) -> impl Iterator<Item = (u32, bool)> + 'b {
    let direct = entry
        .direct
        .into_iter()
        .enumerate()
        .filter(|&(_, a)| a != 0)
        .map(|(slot, addr)| (addr, slot == 0));
    let referenced = indirect_addrs(backend, entry.indirect).map(|addr| (addr, false));

    direct.chain(referenced)
}
