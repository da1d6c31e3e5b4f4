/*Tipos compartidos por todas las verificaciones del fsck:
la taxonomía de errores (un error por ejecución, el primero encontrado),
el tipo de inodo decodificado y el resumen que se devuelve si todo está bien. */

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::fs::{T_DEV, T_DIR, T_FILE, T_FREE};

/// Cómo se llegó a una dirección de bloque desde un inodo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrKind {
    /// Una de las `NDIRECT` entradas del inodo
    Direct,
    /// El puntero indirecto en sí
    Indirect,
    /// Una dirección guardada dentro del bloque indirecto
    IndirectReferenced,
}

impl fmt::Display for AddrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddrKind::Direct => write!(f, "directa"),
            AddrKind::Indirect => write!(f, "indirecta"),
            AddrKind::IndirectReferenced => write!(f, "referenciada por bloque indirecto"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Free,
    Dir,
    File,
    Device,
}

impl InodeType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            T_FREE => Some(InodeType::Free),
            T_DIR => Some(InodeType::Dir),
            T_FILE => Some(InodeType::File),
            T_DEV => Some(InodeType::Device),
            _ => None,
        }
    }

    pub fn in_use(self) -> bool {
        self != InodeType::Free
    }
}

/// Categorías de falla; ninguna es recuperable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Io,
    Format,
    Address,
    Reference,
}

#[derive(Debug, Error)]
pub enum FsckError {
    // ---------------- Io ----------------
    #[error("no se pudo leer la imagen {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("imagen demasiado pequeña: se esperaban {needed} bytes, hay {actual}")]
    ImageTooSmall { needed: u64, actual: u64 },

    // ---------------- Format ----------------
    #[error("superblock inconsistente: {0}")]
    CorruptSuperblock(&'static str),

    #[error("inodo {inum} tiene un tipo inválido ({raw})")]
    InvalidInodeType { inum: u32, raw: u16 },

    #[error("directorio {0} mal formado: faltan \".\" o \"..\" al inicio")]
    BadDirectoryFormat(u32),

    #[error("directorio {dir} tiene una entrada hacia el inodo inexistente {inum}")]
    BadDirectoryEntry { dir: u32, inum: u32 },

    #[error("el directorio raíz no existe")]
    RootMissing,

    // ---------------- Address ----------------
    #[error("inodo {inum}: dirección {kind} fuera de rango ({addr})")]
    BadAddress { inum: u32, addr: u32, kind: AddrKind },

    // ---------------- Reference ----------------
    #[error("bloque {addr} usado más de una vez (detectado en inodo {inum})")]
    DuplicateBlockUse { inum: u32, addr: u32 },

    #[error("bloque {0} usado por un inodo pero marcado libre en el bitmap")]
    AddressNotMarkedUsed(u32),

    #[error("el bitmap marca el bloque {0} como usado, pero ningún inodo lo usa")]
    MarkedUsedButUnreferenced(u32),

    #[error("inodo {0} marcado en uso pero no aparece en ningún directorio")]
    UnreferencedInUseInode(u32),

    #[error("inodo {0} referenciado desde un directorio pero marcado libre")]
    ReferencedFreeInode(u32),

    #[error("directorio {0} aparece más de una vez en el sistema de archivos")]
    DirectoryLinkedMultipleTimes(u32),

    #[error("inodo {inum}: cuenta de enlaces incorrecta (calculada {recomputed}, en disco {stored})")]
    LinkCountMismatch {
        inum: u32,
        recomputed: u32,
        stored: u32,
    },

    #[error("directorio {dir}: \"..\" apunta a {parent}, que no lo contiene")]
    ParentMismatch { dir: u32, parent: u32 },

    #[error("inodo {0} no es alcanzable desde el directorio raíz")]
    UnreachableInode(u32),
}

impl FsckError {
    pub fn class(&self) -> ErrorClass {
        use FsckError::*;
        match self {
            Io { .. } | ImageTooSmall { .. } => ErrorClass::Io,
            CorruptSuperblock(_)
            | InvalidInodeType { .. }
            | BadDirectoryFormat(_)
            | BadDirectoryEntry { .. }
            | RootMissing => ErrorClass::Format,
            BadAddress { .. } => ErrorClass::Address,
            DuplicateBlockUse { .. }
            | AddressNotMarkedUsed(_)
            | MarkedUsedButUnreferenced(_)
            | UnreferencedInUseInode(_)
            | ReferencedFreeInode(_)
            | DirectoryLinkedMultipleTimes(_)
            | LinkCountMismatch { .. }
            | ParentMismatch { .. }
            | UnreachableInode(_) => ErrorClass::Reference,
        }
    }
}

pub type Result<T, E = FsckError> = std::result::Result<T, E>;

/// Lo que se reporta cuando la imagen pasa todas las verificaciones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsckSummary {
    pub directories: u32,
    pub files: u32,
    pub devices: u32,
    pub blocks_in_use: u32,
}

impl FsckSummary {
    pub fn inodes_in_use(&self) -> u32 {
        self.directories + self.files + self.devices
    }
}

impl fmt::Display for FsckSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} inodos en uso ({} directorios, {} archivos, {} dispositivos), {} bloques de datos en uso",
            self.inodes_in_use(),
            self.directories,
            self.files,
            self.devices,
            self.blocks_in_use
        )
    }
}
