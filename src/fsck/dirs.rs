/*Verificaciones del grafo de directorios: formato de "." y "..",
existencia de la raíz, conteo de referencias recalculado desde las
entradas, y enlaces padre/hijo. Salvo el formato (que sólo lee el primer
bloque de cada directorio) todo esto corre con direcciones ya validadas. */

use std::collections::VecDeque;

use log::trace;

use super::fsck_backend::FsckBackend;
use super::fsck_types::{AddrKind, FsckError, InodeType, Result};
use super::scan::{data_blocks, decode, in_use, scan, InodeEntry};
use crate::dir::{self, DirEntry};
use crate::fs::ROOT_INO;

/// Primeras dos entradas del primer bloque del directorio. Lee el bloque
/// sólo si su dirección está en la región de datos.
fn leading_entries<'b, B: FsckBackend>(
    backend: &'b B,
    dir: &InodeEntry,
) -> Result<Option<(DirEntry<'b>, DirEntry<'b>)>> {
    let first = dir.direct[0];
    if first == 0 {
        return Ok(None);
    }
    let bad_address = FsckError::BadAddress {
        inum: dir.inum,
        addr: first,
        kind: AddrKind::Direct,
    };
    if !backend.geometry().is_data_block(first) {
        return Err(bad_address);
    }
    let block = backend.block(first).ok_or(bad_address)?;

    let mut entries = dir::entries(block);
    Ok(entries.next().zip(entries.next()))
}

/// Entradas reales del directorio: sin "." y ".." del primer bloque y sin
/// ranuras libres.
fn child_entries<'b, B: FsckBackend>(
    backend: &'b B,
    dir: &InodeEntry,
) -> impl Iterator<Item = DirEntry<'b>> + 'b {
    data_blocks(backend, dir)
        .filter_map(move |(addr, first)| backend.block(addr).map(|b| (b, first)))
        .flat_map(|(block, first)| dir::entries(block).skip(if first { 2 } else { 0 }))
        .filter(|e| e.inum != 0)
}

/// "." debe ser la primera entrada y apuntar al propio directorio; ".."
/// debe ser la segunda.
pub fn check_directory_format<B: FsckBackend>(backend: &B) -> Result<()> {
    for entry in scan(backend) {
        let entry = entry?;
        if entry.kind != InodeType::Dir {
            continue;
        }
        match leading_entries(backend, &entry)? {
            Some((dot, dotdot)) if dot.is_dot() && dot.inum == entry.inum && dotdot.is_dotdot() => {
                trace!("directorio {}: padre {}", entry.inum, dotdot.inum)
            }
            _ => return Err(FsckError::BadDirectoryFormat(entry.inum)),
        }
    }
    Ok(())
}

/// La raíz existe, es un directorio y es su propio padre.
pub fn check_root<B: FsckBackend>(backend: &B) -> Result<()> {
    if ROOT_INO >= backend.geometry().ninodes {
        return Err(FsckError::RootMissing);
    }
    let root = decode(backend, ROOT_INO)?;
    if root.kind != InodeType::Dir {
        return Err(FsckError::RootMissing);
    }
    match leading_entries(backend, &root) {
        Ok(Some((dot, dotdot))) if dot.inum == ROOT_INO && dotdot.inum == ROOT_INO => Ok(()),
        _ => Err(FsckError::RootMissing),
    }
}

/// Referencias a cada inodo recalculadas desde las entradas de directorio,
/// independiente del `nlink` en disco. La raíz arranca con 1 por ser su
/// propio padre.
#[derive(Debug, Clone)]
pub struct LinkCounts {
    counts: Vec<u32>,
}

impl LinkCounts {
    pub fn recompute<B: FsckBackend>(backend: &B) -> Result<Self> {
        let mut counts = vec![0u32; backend.geometry().ninodes as usize];
        if let Some(root) = counts.get_mut(ROOT_INO as usize) {
            *root = 1;
        }

        for dir in in_use(backend) {
            let dir = dir?;
            if dir.kind != InodeType::Dir {
                continue;
            }
            for e in child_entries(backend, &dir) {
                let slot = counts
                    .get_mut(e.inum as usize)
                    .ok_or(FsckError::BadDirectoryEntry {
                        dir: dir.inum,
                        inum: e.inum,
                    })?;
                *slot += 1;
            }
        }
        Ok(Self { counts })
    }

    pub fn get(&self, inum: u32) -> u32 {
        self.counts.get(inum as usize).copied().unwrap_or(0)
    }
}

/// Cruza las referencias recalculadas con el tipo y el `nlink` de cada
/// inodo.
pub fn check_references<B: FsckBackend>(backend: &B, links: &LinkCounts) -> Result<()> {
    for entry in scan(backend) {
        let entry = entry?;
        let inum = entry.inum;
        let refs = links.get(inum);

        if entry.kind.in_use() && refs == 0 {
            return Err(FsckError::UnreferencedInUseInode(inum));
        }
        if entry.kind == InodeType::Free && refs > 0 {
            return Err(FsckError::ReferencedFreeInode(inum));
        }
        if entry.kind == InodeType::Dir && refs > 1 {
            return Err(FsckError::DirectoryLinkedMultipleTimes(inum));
        }
        if entry.kind == InodeType::File && refs != u32::from(entry.nlink) {
            return Err(FsckError::LinkCountMismatch {
                inum,
                recomputed: refs,
                stored: u32::from(entry.nlink),
            });
        }
    }
    Ok(())
}

/// El ".." de cada directorio (salvo la raíz) nombra a un directorio que
/// a su vez lo contiene.
pub fn check_parent_links<B: FsckBackend>(backend: &B) -> Result<()> {
    let ninodes = backend.geometry().ninodes;
    for dir in in_use(backend) {
        let dir = dir?;
        if dir.kind != InodeType::Dir || dir.inum == ROOT_INO {
            continue;
        }
        let parent = match leading_entries(backend, &dir)? {
            Some((_, dotdot)) => dotdot.inum,
            None => return Err(FsckError::BadDirectoryFormat(dir.inum)),
        };
        let mismatch = FsckError::ParentMismatch {
            dir: dir.inum,
            parent,
        };
        if parent >= ninodes {
            return Err(mismatch);
        }
        let parent_entry = decode(backend, parent)?;
        if parent_entry.kind != InodeType::Dir
            || !child_entries(backend, &parent_entry).any(|e| e.inum == dir.inum)
        {
            return Err(mismatch);
        }
    }
    Ok(())
}

/// Todo inodo en uso es alcanzable desde la raíz.
pub fn check_reachable<B: FsckBackend>(backend: &B) -> Result<()> {
    let mut seen = vec![false; backend.geometry().ninodes as usize];
    let mut queue = VecDeque::new();
    if let Some(root) = seen.get_mut(ROOT_INO as usize) {
        *root = true;
        queue.push_back(ROOT_INO);
    }

    while let Some(inum) = queue.pop_front() {
        let dir = decode(backend, inum)?;
        if dir.kind != InodeType::Dir {
            continue;
        }
        for e in child_entries(backend, &dir) {
            if let Some(visited) = seen.get_mut(e.inum as usize) {
                if !*visited {
                    *visited = true;
                    queue.push_back(e.inum);
                }
            }
        }
    }

    for entry in in_use(backend) {
        let entry = entry?;
        if !seen[entry.inum as usize] {
            return Err(FsckError::UnreachableInode(entry.inum));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsck::mock::MockImage;
    use crate::image::Image;

    fn run_all(bytes: &[u8]) -> Result<()> {
        let image = Image::new(bytes)?;
        check_directory_format(&image)?;
        check_root(&image)?;
        let links = LinkCounts::recompute(&image)?;
        check_references(&image, &links)?;
        check_parent_links(&image)?;
        check_reachable(&image)
    }

    fn tree() -> (MockImage, u32, u32) {
        let mut mock = MockImage::formatted(128, 32);
        let docs = mock.add_dir(ROOT_INO, "docs");
        let f = mock.add_file(docs, "notes", 2);
        mock.link(ROOT_INO, "notes-link", f);
        mock.add_device(ROOT_INO, "console");
        (mock, docs, f)
    }

    #[test]
    fn well_formed_tree_passes() {
        let (mock, _, f) = tree();
        let bytes = mock.build();
        run_all(&bytes).unwrap();

        let image = Image::new(&bytes).unwrap();
        let links = LinkCounts::recompute(&image).unwrap();
        assert_eq!(links.get(ROOT_INO), 1);
        assert_eq!(links.get(f), 2);
    }

    #[test]
    fn missing_dot_entry() {
        let (mut mock, docs, _) = tree();
        let block = mock.inode_mut(docs).direct()[0];
        mock.write_entry(block, 0, docs, "x");
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::BadDirectoryFormat(d)) if d == docs));
    }

    #[test]
    fn dot_pointing_elsewhere() {
        let (mut mock, docs, _) = tree();
        let block = mock.inode_mut(docs).direct()[0];
        mock.write_entry(block, 0, ROOT_INO, ".");
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::BadDirectoryFormat(d)) if d == docs));
    }

    #[test]
    fn second_entry_not_dotdot() {
        let (mut mock, docs, _) = tree();
        let block = mock.inode_mut(docs).direct()[0];
        mock.write_entry(block, 1, ROOT_INO, "up");
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::BadDirectoryFormat(d)) if d == docs));
    }

    #[test]
    fn directory_without_blocks() {
        let (mut mock, docs, _) = tree();
        mock.inode_mut(docs).addrs[0].set(0);
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::BadDirectoryFormat(d)) if d == docs));
    }

    #[test]
    fn directory_first_block_out_of_range_is_not_read() {
        let (mut mock, docs, _) = tree();
        mock.inode_mut(docs).addrs[0].set(5000);
        let bytes = mock.build();
        assert!(matches!(
            run_all(&bytes),
            Err(FsckError::BadAddress { addr: 5000, kind: AddrKind::Direct, .. })
        ));
    }

    #[test]
    fn root_not_a_directory() {
        let mut mock = MockImage::formatted(64, 16);
        mock.inode_mut(ROOT_INO).file_type.set(crate::fs::T_FILE);
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::RootMissing)));
    }

    #[test]
    fn root_parent_is_not_itself() {
        let (mut mock, docs, _) = tree();
        let block = mock.inode_mut(ROOT_INO).direct()[0];
        mock.write_entry(block, 1, docs, "..");
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::RootMissing)));
    }

    #[test]
    fn orphan_in_use_inode() {
        let mut mock = MockImage::formatted(64, 16);
        mock.inode_mut(5).file_type.set(crate::fs::T_FILE);
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::UnreferencedInUseInode(5))));
    }

    #[test]
    fn entry_to_free_inode() {
        let mut mock = MockImage::formatted(64, 16);
        let f = mock.add_file(ROOT_INO, "f", 0);
        mock.inode_mut(f).file_type.set(crate::fs::T_FREE);
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::ReferencedFreeInode(i)) if i == f));
    }

    #[test]
    fn directory_hard_linked_twice() {
        let (mut mock, docs, _) = tree();
        mock.link(ROOT_INO, "docs-again", docs);
        let bytes = mock.build();
        assert!(matches!(
            run_all(&bytes),
            Err(FsckError::DirectoryLinkedMultipleTimes(d)) if d == docs
        ));
    }

    #[test]
    fn stale_link_count() {
        let (mut mock, _, f) = tree();
        mock.inode_mut(f).nlink.set(1);
        let bytes = mock.build();
        assert!(matches!(
            run_all(&bytes),
            Err(FsckError::LinkCountMismatch { inum, recomputed: 2, stored: 1 }) if inum == f
        ));
    }

    #[test]
    fn entry_beyond_inode_table() {
        let (mut mock, docs, _) = tree();
        let block = mock.inode_mut(docs).direct()[0];
        mock.write_entry(block, 5, 999, "ghost");
        let bytes = mock.build();
        assert!(matches!(
            run_all(&bytes),
            Err(FsckError::BadDirectoryEntry { dir, inum: 999 }) if dir == docs
        ));
    }

    #[test]
    fn dotdot_names_wrong_parent() {
        let mut mock = MockImage::formatted(128, 32);
        let a = mock.add_dir(ROOT_INO, "a");
        let b = mock.add_dir(ROOT_INO, "b");
        let c = mock.add_dir(a, "c");
        let block = mock.inode_mut(c).direct()[0];
        mock.write_entry(block, 1, b, "..");
        let bytes = mock.build();
        assert!(matches!(
            run_all(&bytes),
            Err(FsckError::ParentMismatch { dir, parent }) if dir == c && parent == b
        ));
    }

    #[test]
    fn detached_directory_cycle() {
        let mut mock = MockImage::formatted(128, 32);
        let a = mock.add_dir(ROOT_INO, "a");
        let b = mock.add_dir(a, "b");
        // "a" se saca de la raíz y se cuelga de "b": a <-> b sin camino a la raíz
        let root_block = mock.inode_mut(ROOT_INO).direct()[0];
        mock.write_entry(root_block, 2, 0, "");
        let a_block = mock.inode_mut(a).direct()[0];
        mock.write_entry(a_block, 1, b, "..");
        mock.link(b, "a", a);
        let bytes = mock.build();
        assert!(matches!(run_all(&bytes), Err(FsckError::UnreachableInode(i)) if i == a));
    }
}
