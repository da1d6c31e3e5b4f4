/*Validación de direcciones: toda dirección no nula de un inodo en uso
debe caer en [data_start, size). Tiene que pasar antes de que cualquier
otra verificación use esas direcciones como punteros a bloques. */

use log::trace;

use super::fsck_backend::FsckBackend;
use super::fsck_types::{AddrKind, FsckError, Result};
use super::scan::{block_refs, in_use};

fn check_refs<B: FsckBackend>(backend: &B, kinds: &[AddrKind]) -> Result<()> {
    let geo = *backend.geometry();
    for entry in in_use(backend) {
        let entry = entry?;
        // el puntero indirecto precede a su contenido: si es inválido se
        // reporta antes de leer el bloque
        for r in block_refs(backend, &entry).filter(|r| kinds.contains(&r.kind)) {
            if !geo.is_data_block(r.addr) {
                return Err(FsckError::BadAddress {
                    inum: entry.inum,
                    addr: r.addr,
                    kind: r.kind,
                });
            }
        }
        trace!("inodo {}: direcciones {:?} válidas", entry.inum, kinds);
    }
    Ok(())
}

/// Direcciones directas de todos los inodos en uso.
pub fn check_direct_addrs<B: FsckBackend>(backend: &B) -> Result<()> {
    check_refs(backend, &[AddrKind::Direct])
}

/// Puntero indirecto y direcciones dentro del bloque indirecto.
pub fn check_indirect_addrs<B: FsckBackend>(backend: &B) -> Result<()> {
    check_refs(
        backend,
        &[AddrKind::Indirect, AddrKind::IndirectReferenced],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{NDIRECT, ROOT_INO};
    use crate::fsck::mock::MockImage;
    use crate::image::Image;

    #[test]
    fn valid_addresses_pass() {
        let mut mock = MockImage::formatted(128, 16);
        mock.add_file(ROOT_INO, "big", NDIRECT + 4);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        check_direct_addrs(&image).unwrap();
        check_indirect_addrs(&image).unwrap();
    }

    #[test]
    fn direct_address_past_end() {
        let mut mock = MockImage::formatted(64, 16);
        let f = mock.add_file(ROOT_INO, "f", 1);
        mock.inode_mut(f).addrs[3].set(64);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        let err = check_direct_addrs(&image).unwrap_err();
        assert!(matches!(
            err,
            FsckError::BadAddress { inum, addr: 64, kind: AddrKind::Direct } if inum == f
        ));
    }

    #[test]
    fn direct_address_in_metadata_region() {
        let mut mock = MockImage::formatted(64, 16);
        let f = mock.add_file(ROOT_INO, "f", 1);
        let bitmap = mock.geometry().bitmap_start;
        mock.inode_mut(f).addrs[0].set(bitmap);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        assert!(matches!(
            check_direct_addrs(&image),
            Err(FsckError::BadAddress { kind: AddrKind::Direct, .. })
        ));
    }

    #[test]
    fn free_inodes_are_ignored() {
        let mut mock = MockImage::formatted(64, 16);
        mock.inode_mut(7).addrs[0].set(9999);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        check_direct_addrs(&image).unwrap();
    }

    #[test]
    fn bad_indirect_pointer() {
        let mut mock = MockImage::formatted(64, 16);
        let f = mock.add_file(ROOT_INO, "f", 1);
        mock.inode_mut(f).addrs[NDIRECT].set(1);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        check_direct_addrs(&image).unwrap();
        assert!(matches!(
            check_indirect_addrs(&image),
            Err(FsckError::BadAddress { addr: 1, kind: AddrKind::Indirect, .. })
        ));
    }

    #[test]
    fn bad_address_inside_indirect_block() {
        let mut mock = MockImage::formatted(128, 16);
        let f = mock.add_file(ROOT_INO, "f", NDIRECT + 2);
        let pointer = mock.inode_mut(f).indirect();
        mock.block_mut(pointer)[4..8].copy_from_slice(&500u32.to_le_bytes());
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        assert!(matches!(
            check_indirect_addrs(&image),
            Err(FsckError::BadAddress {
                addr: 500,
                kind: AddrKind::IndirectReferenced,
                ..
            })
        ));
    }
}
