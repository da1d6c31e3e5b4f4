/*EL ARCHIVO PRINCIPAL DE FSCK. Ejecuta las verificaciones en un orden
fijo y se detiene en la primera falla. El orden es una dependencia, no una
casualidad:

  1. tipos de inodo            (todo lo demás decodifica inodos)
  2. formato de directorios    (lee sólo el primer bloque de cada directorio)
  3. raíz                      (usa el formato ya verificado)
  4. direcciones directas      \
  5. direcciones indirectas    / antes de usar cualquier dirección como puntero
  6. conteo de uso de bloques
  7. unicidad directa          \
  8. unicidad indirecta         | usan el conteo
  9. bitmap completo            |
 10. bitmap ajustado           /
 11. referencias recalculadas contra tipo y nlink
 12. enlaces padre/hijo
 13. alcanzabilidad desde la raíz */

use std::fmt;
use std::path::Path;

use log::debug;

use super::addrs::{check_direct_addrs, check_indirect_addrs};
use super::dirs::{
    check_directory_format, check_parent_links, check_reachable, check_references, check_root,
    LinkCounts,
};
use super::fsck_backend::FsckBackend;
use super::fsck_types::{FsckSummary, InodeType, Result};
use super::scan::scan;
use super::usage::{
    check_bitmap_complete, check_bitmap_tight, check_unique_direct, check_unique_indirect,
    BlockUsage,
};
use crate::image::{Image, ImageFile};

/// Etapas del fsck, en el orden en que corren.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    InodeTypes,
    DirectoryFormat,
    Root,
    DirectAddrs,
    IndirectAddrs,
    BlockUsage,
    UniqueDirect,
    UniqueIndirect,
    BitmapComplete,
    BitmapTight,
    References,
    ParentLinks,
    Reachability,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::InodeTypes => "tipos de inodo",
            Stage::DirectoryFormat => "formato de directorios",
            Stage::Root => "directorio raíz",
            Stage::DirectAddrs => "direcciones directas",
            Stage::IndirectAddrs => "direcciones indirectas",
            Stage::BlockUsage => "uso de bloques",
            Stage::UniqueDirect => "unicidad de bloques directos",
            Stage::UniqueIndirect => "unicidad de bloques indirectos",
            Stage::BitmapComplete => "bloques usados en bitmap",
            Stage::BitmapTight => "bitmap sin bloques huérfanos",
            Stage::References => "referencias de inodos",
            Stage::ParentLinks => "enlaces padre/hijo",
            Stage::Reachability => "alcanzabilidad",
        };
        f.write_str(name)
    }
}

fn stage(s: Stage) {
    debug!("etapa: {s}");
}

/// Tipo válido para cada inodo.
pub fn check_inode_types<B: FsckBackend>(backend: &B) -> Result<()> {
    for entry in scan(backend) {
        entry?;
    }
    Ok(())
}

pub fn run_fsck<B: FsckBackend>(backend: &B) -> Result<FsckSummary> {
    // --- Estructura: tipos, directorios, raíz ---
    stage(Stage::InodeTypes);
    check_inode_types(backend)?;
    stage(Stage::DirectoryFormat);
    check_directory_format(backend)?;
    stage(Stage::Root);
    check_root(backend)?;

    // --- Direcciones ---
    stage(Stage::DirectAddrs);
    check_direct_addrs(backend)?;
    stage(Stage::IndirectAddrs);
    check_indirect_addrs(backend)?;

    // --- Uso de bloques y bitmap ---
    stage(Stage::BlockUsage);
    let usage = BlockUsage::count(backend)?;
    stage(Stage::UniqueDirect);
    check_unique_direct(backend, &usage)?;
    stage(Stage::UniqueIndirect);
    check_unique_indirect(backend, &usage)?;
    stage(Stage::BitmapComplete);
    check_bitmap_complete(backend, &usage)?;
    stage(Stage::BitmapTight);
    check_bitmap_tight(backend, &usage)?;

    // --- Grafo de directorios ---
    stage(Stage::References);
    let links = LinkCounts::recompute(backend)?;
    check_references(backend, &links)?;
    stage(Stage::ParentLinks);
    check_parent_links(backend)?;
    stage(Stage::Reachability);
    check_reachable(backend)?;

    let mut summary = FsckSummary {
        blocks_in_use: usage.blocks_in_use(),
        ..FsckSummary::default()
    };
    for entry in scan(backend) {
        match entry?.kind {
            InodeType::Dir => summary.directories += 1,
            InodeType::File => summary.files += 1,
            InodeType::Device => summary.devices += 1,
            InodeType::Free => {}
        }
    }
    debug!("fsck sin errores: {summary}");
    Ok(summary)
}

/// Verifica una imagen ya cargada en memoria.
pub fn check_image(bytes: &[u8]) -> Result<FsckSummary> {
    run_fsck(&Image::new(bytes)?)
}

/// Lee la imagen desde disco y la verifica. El buffer se libera al volver,
/// haya o no error.
pub fn check_file(path: impl AsRef<Path>) -> Result<FsckSummary> {
    let file = ImageFile::open(path)?;
    let image = file.image()?;
    run_fsck(&image)
}
