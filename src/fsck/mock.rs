/*Constructor de imágenes en memoria para probar el fsck.
Calcula el layout igual que el formato real (superblock, tabla de inodos,
bitmap, datos), crea el directorio raíz y permite agregar directorios,
archivos y enlaces. También expone ganchos de bajo nivel para fabricar
imágenes corruptas. Nunca toca un archivo existente: sólo produce bytes. */

use zerocopy::IntoBytes;

use crate::fs::{
    DirEntryDisk, Geometry, InodeDisk, SuperblockDisk, BSIZE, DPB, NDIRECT, NINDIRECT, ROOT_INO,
    SUPERBLOCK_BLOCK, T_DEV, T_DIR, T_FILE, T_FREE,
};

const DIRENT_SIZE: usize = std::mem::size_of::<DirEntryDisk>();

#[derive(Debug, Clone)]
pub struct MockImage {
    geometry: Geometry,
    bytes: Vec<u8>,
    inodes: Vec<InodeDisk>,
    next_block: u32,
}

impl MockImage {
    /// Imagen vacía: sin raíz, con los bloques de metadatos marcados en el
    /// bitmap y todos los bloques de datos libres.
    ///
    /// # Panics
    /// Si `size` no deja espacio para al menos un bloque de datos.
    pub fn new(size: u32, ninodes: u32) -> Self {
        let data_start = Geometry::from_counts(size, 0, ninodes).data_start;
        assert!(
            data_start < size,
            "no hay espacio para bloques de datos: size={size}, data_start={data_start}"
        );
        let geometry = Geometry::from_counts(size, size - data_start, ninodes);

        let mut mock = Self {
            geometry,
            bytes: vec![0u8; geometry.image_bytes() as usize],
            inodes: vec![InodeDisk::default(); ninodes as usize],
            next_block: data_start,
        };
        for b in 0..data_start {
            mock.set_bitmap(b, true);
        }
        mock
    }

    /// Imagen recién formateada: igual que [`new`](Self::new) más el
    /// directorio raíz con "." y ".." apuntando a sí mismo.
    pub fn formatted(size: u32, ninodes: u32) -> Self {
        let mut mock = Self::new(size, ninodes);
        mock.inodes[ROOT_INO as usize] = InodeDisk::new(T_DIR, 1);
        let block = mock.push_block(ROOT_INO);
        mock.write_entry(block, 0, ROOT_INO, ".");
        mock.write_entry(block, 1, ROOT_INO, "..");
        mock
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    // ---------------- Ganchos de bajo nivel ----------------

    pub fn inode_mut(&mut self, inum: u32) -> &mut InodeDisk {
        &mut self.inodes[inum as usize]
    }

    pub fn set_bitmap(&mut self, addr: u32, used: bool) {
        let byte = self.geometry.bitmap_start as usize * BSIZE + addr as usize / 8;
        let mask = 1u8 << (addr % 8);
        if used {
            self.bytes[byte] |= mask;
        } else {
            self.bytes[byte] &= !mask;
        }
    }

    pub fn block_mut(&mut self, addr: u32) -> &mut [u8] {
        let start = addr as usize * BSIZE;
        &mut self.bytes[start..start + BSIZE]
    }

    /// Escribe la entrada `slot` del bloque de directorio `block`.
    pub fn write_entry(&mut self, block: u32, slot: usize, inum: u32, name: &str) {
        let entry = DirEntryDisk::with_name(inum as u16, name);
        let off = slot * DIRENT_SIZE;
        self.block_mut(block)[off..off + DIRENT_SIZE].copy_from_slice(entry.as_bytes());
    }

    /// Reserva el siguiente bloque de datos libre y lo marca en el bitmap.
    pub fn alloc_block(&mut self) -> u32 {
        let addr = self.next_block;
        assert!(addr < self.geometry.size, "imagen sin bloques libres");
        self.next_block += 1;
        self.set_bitmap(addr, true);
        addr
    }

    /// Agrega un bloque de datos al inodo: primero en las entradas directas,
    /// después dentro del bloque indirecto (que se reserva al necesitarlo).
    pub fn push_block(&mut self, inum: u32) -> u32 {
        let addr = self.alloc_block();
        let inode = self.inodes[inum as usize];

        if let Some(slot) = inode.addrs[..NDIRECT].iter().position(|a| a.get() == 0) {
            self.inodes[inum as usize].addrs[slot].set(addr);
        } else {
            let mut indirect = inode.indirect();
            if indirect == 0 {
                indirect = self.alloc_block();
                self.inodes[inum as usize].addrs[NDIRECT].set(indirect);
            }
            let slot = (0..NINDIRECT)
                .find(|&i| self.indirect_slot(indirect, i) == 0)
                .expect("bloque indirecto lleno");
            let off = slot * 4;
            self.block_mut(indirect)[off..off + 4].copy_from_slice(&addr.to_le_bytes());
        }

        let size = self.inodes[inum as usize].size.get();
        self.inodes[inum as usize].size.set(size + BSIZE as u32);
        addr
    }

    // ---------------- Operaciones de alto nivel ----------------

    pub fn add_dir(&mut self, parent: u32, name: &str) -> u32 {
        let inum = self.alloc_inode(T_DIR);
        self.inodes[inum as usize].nlink.set(1);
        let block = self.push_block(inum);
        self.write_entry(block, 0, inum, ".");
        self.write_entry(block, 1, parent, "..");
        self.append_entry(parent, inum, name);
        inum
    }

    /// Crea un archivo con `nblocks` bloques de datos y lo enlaza en `parent`.
    pub fn add_file(&mut self, parent: u32, name: &str, nblocks: usize) -> u32 {
        let inum = self.alloc_inode(T_FILE);
        for _ in 0..nblocks {
            self.push_block(inum);
        }
        self.link(parent, name, inum);
        inum
    }

    pub fn add_device(&mut self, parent: u32, name: &str) -> u32 {
        let inum = self.alloc_inode(T_DEV);
        self.link(parent, name, inum);
        inum
    }

    /// Agrega la entrada `name -> inum` en `dir` y actualiza `nlink` del
    /// destino.
    pub fn link(&mut self, dir: u32, name: &str, inum: u32) {
        self.append_entry(dir, inum, name);
        let nlink = self.inodes[inum as usize].nlink.get();
        self.inodes[inum as usize].nlink.set(nlink + 1);
    }

    /// Serializa la imagen completa.
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = self.bytes.clone();

        let sb = SuperblockDisk {
            size: self.geometry.size.into(),
            nblocks: self.geometry.nblocks.into(),
            ninodes: self.geometry.ninodes.into(),
        };
        let sb_start = SUPERBLOCK_BLOCK as usize * BSIZE;
        bytes[sb_start..sb_start + sb.as_bytes().len()].copy_from_slice(sb.as_bytes());

        let table = self.inodes.as_bytes();
        let start = self.geometry.inode_offset(0);
        bytes[start..start + table.len()].copy_from_slice(table);
        bytes
    }

    // ---------------- Auxiliares ----------------

    fn alloc_inode(&mut self, file_type: u16) -> u32 {
        let inum = (ROOT_INO as usize + 1..self.inodes.len())
            .find(|&i| self.inodes[i].file_type.get() == T_FREE)
            .expect("no quedan inodos libres") as u32;
        self.inodes[inum as usize] = InodeDisk::new(file_type, 0);
        inum
    }

    fn indirect_slot(&self, indirect: u32, slot: usize) -> u32 {
        let off = indirect as usize * BSIZE + slot * 4;
        let b = &self.bytes[off..off + 4];
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn data_blocks_of(&self, inum: u32) -> Vec<u32> {
        let inode = &self.inodes[inum as usize];
        let mut blocks: Vec<u32> = inode.direct().into_iter().filter(|&a| a != 0).collect();
        let indirect = inode.indirect();
        if indirect != 0 {
            blocks.extend(
                (0..NINDIRECT)
                    .map(|i| self.indirect_slot(indirect, i))
                    .filter(|&a| a != 0),
            );
        }
        blocks
    }

    fn entry_inum(&self, block: u32, slot: usize) -> u16 {
        let off = block as usize * BSIZE + slot * DIRENT_SIZE;
        u16::from_le_bytes([self.bytes[off], self.bytes[off + 1]])
    }

    fn append_entry(&mut self, dir: u32, inum: u32, name: &str) {
        let first = self.inodes[dir as usize].direct()[0];
        let free = self.data_blocks_of(dir).into_iter().find_map(|block| {
            let start = if block == first { 2 } else { 0 };
            (start..DPB)
                .find(|&slot| self.entry_inum(block, slot) == 0)
                .map(|slot| (block, slot))
        });

        let (block, slot) = match free {
            Some(found) => found,
            None => (self.push_block(dir), 0),
        };
        self.write_entry(block, slot, inum, name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsck::fsck_backend::FsckBackend;
    use crate::image::Image;

    #[test]
    fn formatted_image_has_root() {
        let mock = MockImage::formatted(64, 16);
        let bytes = mock.build();
        let image = Image::new(&bytes).unwrap();
        let root = image.inode(ROOT_INO).unwrap();
        assert_eq!(root.file_type.get(), T_DIR);
        let first = root.direct()[0];
        assert_eq!(first, image.geometry().data_start);
        assert!(image.marked_used(first));
        assert!(!image.marked_used(first + 1));
    }

    #[test]
    fn directories_spill_into_new_blocks() {
        let mut mock = MockImage::formatted(128, 64);
        for i in 0..DPB {
            mock.add_device(ROOT_INO, &format!("d{i}"));
        }
        let root = mock.inodes[ROOT_INO as usize];
        assert_ne!(root.direct()[1], 0);
        assert_eq!(mock.entry_inum(root.direct()[1], 0), DPB as u16);
    }

    #[test]
    fn link_bumps_nlink() {
        let mut mock = MockImage::formatted(64, 16);
        let f = mock.add_file(ROOT_INO, "a", 1);
        mock.link(ROOT_INO, "b", f);
        assert_eq!(mock.inodes[f as usize].nlink.get(), 2);
    }
}
