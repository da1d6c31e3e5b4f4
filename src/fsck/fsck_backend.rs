/*Interfaz que usan las verificaciones para leer la imagen.
Todas las lecturas están acotadas: una dirección fuera de la imagen
devuelve None en lugar de leer memoria ajena. */

use crate::fs::{Geometry, InodeDisk};

pub trait FsckBackend {
    fn geometry(&self) -> &Geometry;

    /// Inodo `inum`, o `None` si `inum >= ninodes`.
    fn inode(&self, inum: u32) -> Option<&InodeDisk>;

    /// Bloque completo `addr`, o `None` si `addr >= size`.
    fn block(&self, addr: u32) -> Option<&[u8]>;

    /// Bit del bitmap para el bloque `addr`.
    fn marked_used(&self, addr: u32) -> bool;
}
