use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use colored::*;
use log::info;

use vsfs::fsck;

fn run() -> Result<()> {
    // Esperamos exactamente un argumento: la imagen a verificar
    let mut args = env::args().skip(1);
    let image = args
        .next()
        .map(PathBuf::from)
        .context("Uso: fsck_vsfs <imagen>")?;

    if args.next().is_some() {
        return Err(anyhow!("Uso: fsck_vsfs <imagen> (solo un argumento)"));
    }

    let summary = fsck::check_file(&image)
        .with_context(|| format!("fsck falló sobre {:?}", image))?;

    info!("{:?}: {}", image, summary);
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), err);
            ExitCode::from(1)
        }
    }
}
