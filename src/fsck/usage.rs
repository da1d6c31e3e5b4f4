/*Conteo de uso por bloque y las verificaciones que dependen de él:
unicidad (ningún bloque pertenece a dos dueños) y conciliación con el
bitmap en ambos sentidos. Requiere direcciones ya validadas. */

use log::trace;

use super::fsck_backend::FsckBackend;
use super::fsck_types::{AddrKind, FsckError, Result};
use super::scan::{block_refs, in_use};

/// Cantidad de referencias a cada bloque de la imagen, construida en una
/// sola pasada y descartada al terminar la ejecución.
#[derive(Debug, Clone)]
pub struct BlockUsage {
    counts: Vec<u32>,
}

impl BlockUsage {
    pub fn count<B: FsckBackend>(backend: &B) -> Result<Self> {
        let geo = backend.geometry();
        let mut counts = vec![0u32; geo.size as usize];

        for entry in in_use(backend) {
            let entry = entry?;
            for r in block_refs(backend, &entry) {
                let slot = counts.get_mut(r.addr as usize).ok_or(FsckError::BadAddress {
                    inum: entry.inum,
                    addr: r.addr,
                    kind: r.kind,
                })?;
                *slot += 1;
            }
        }
        Ok(Self { counts })
    }

    pub fn get(&self, addr: u32) -> u32 {
        self.counts.get(addr as usize).copied().unwrap_or(0)
    }

    /// Bloques con al menos una referencia.
    pub fn blocks_in_use(&self) -> u32 {
        self.counts.iter().filter(|&&c| c > 0).count() as u32
    }
}

fn check_unique<B: FsckBackend>(backend: &B, usage: &BlockUsage, kinds: &[AddrKind]) -> Result<()> {
    for entry in in_use(backend) {
        let entry = entry?;
        for r in block_refs(backend, &entry).filter(|r| kinds.contains(&r.kind)) {
            if usage.get(r.addr) > 1 {
                return Err(FsckError::DuplicateBlockUse {
                    inum: entry.inum,
                    addr: r.addr,
                });
            }
        }
    }
    Ok(())
}

/// Cada bloque alcanzado por una entrada directa, o usado como bloque
/// indirecto, tiene un único dueño.
pub fn check_unique_direct<B: FsckBackend>(backend: &B, usage: &BlockUsage) -> Result<()> {
    check_unique(backend, usage, &[AddrKind::Direct, AddrKind::Indirect])
}

/// La misma regla para los bloques alcanzados a través de un bloque
/// indirecto.
pub fn check_unique_indirect<B: FsckBackend>(backend: &B, usage: &BlockUsage) -> Result<()> {
    check_unique(backend, usage, &[AddrKind::IndirectReferenced])
}

/// Todo bloque de datos referenciado está marcado en el bitmap.
pub fn check_bitmap_complete<B: FsckBackend>(backend: &B, usage: &BlockUsage) -> Result<()> {
    let geo = backend.geometry();
    for addr in geo.data_start..geo.size {
        if usage.get(addr) > 0 && !backend.marked_used(addr) {
            return Err(FsckError::AddressNotMarkedUsed(addr));
        }
    }
    Ok(())
}

/// Todo bloque de datos marcado en el bitmap está referenciado.
pub fn check_bitmap_tight<B: FsckBackend>(backend: &B, usage: &BlockUsage) -> Result<()> {
    let geo = backend.geometry();
    for addr in geo.data_start..geo.size {
        if backend.marked_used(addr) && usage.get(addr) == 0 {
            return Err(FsckError::MarkedUsedButUnreferenced(addr));
        }
        trace!("bloque {addr}: {} referencias", usage.get(addr));
    }
    Ok(())
}
