// src/dir.rs
use zerocopy::FromBytes;

use crate::fs::{DirEntryDisk, BSIZE, DIRSIZ};

/// Vista de una entrada de directorio dentro de un bloque de datos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirEntry<'a> {
    /// Posición de la entrada dentro de su bloque
    pub slot: usize,
    pub inum: u32,
    pub name: &'a [u8],
}

impl DirEntry<'_> {
    pub fn is_dot(&self) -> bool {
        self.name == b"."
    }

    pub fn is_dotdot(&self) -> bool {
        self.name == b".."
    }

    /// Nombre legible para mensajes (los bytes no UTF-8 se reemplazan).
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(self.name).into_owned()
    }
}

impl DirEntryDisk {
    /// Nombre sin el relleno de NULs.
    pub fn name_bytes(&self) -> &[u8] {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(DIRSIZ);
        &self.name[..len]
    }

    /// Construye una entrada en disco. Los nombres más largos que `DIRSIZ`
    /// se truncan.
    pub fn with_name(inum: u16, name: &str) -> Self {
        let mut entry = Self::default();
        entry.inum.set(inum);
        let bytes = name.as_bytes();
        let len = bytes.len().min(DIRSIZ);
        entry.name[..len].copy_from_slice(&bytes[..len]);
        entry
    }
}

/// Decodifica todas las entradas (incluidas las libres) de un bloque de
/// directorio. Un bloque de tamaño incorrecto no produce entradas.
pub fn entries(block: &[u8]) -> impl Iterator<Item = DirEntry<'_>> {
    let table = if block.len() == BSIZE {
        <[DirEntryDisk]>::ref_from_bytes(block).ok()
    } else {
        None
    };

    table
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(slot, raw)| DirEntry {
            slot,
            inum: u32::from(raw.inum.get()),
            name: raw.name_bytes(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::DPB;
    use zerocopy::IntoBytes;

    fn block_with(entries: &[DirEntryDisk]) -> Vec<u8> {
        let mut block = vec![0u8; BSIZE];
        for (i, e) in entries.iter().enumerate() {
            let off = i * std::mem::size_of::<DirEntryDisk>();
            block[off..off + 16].copy_from_slice(e.as_bytes());
        }
        block
    }

    #[test]
    fn decodes_dot_entries_and_names() {
        let block = block_with(&[
            DirEntryDisk::with_name(1, "."),
            DirEntryDisk::with_name(1, ".."),
            DirEntryDisk::with_name(5, "README"),
        ]);
        let all: Vec<_> = entries(&block).collect();
        assert_eq!(all.len(), DPB);
        assert!(all[0].is_dot());
        assert!(all[1].is_dotdot());
        assert_eq!(all[2].inum, 5);
        assert_eq!(all[2].display_name(), "README");
        assert_eq!(all[3].inum, 0);
    }

    #[test]
    fn full_length_name_has_no_terminator() {
        let e = DirEntryDisk::with_name(2, "abcdefghijklmnopq");
        assert_eq!(e.name_bytes(), b"abcdefghijklmn");
    }

    #[test]
    fn short_block_yields_nothing() {
        assert_eq!(entries(&[0u8; 10]).count(), 0);
    }
}
