//! Empaquetado de los archivos base (`ENVIAR_ARQUIVOS_BASE`).
//!
//! Los archivos se comprimen en un ZIP en memoria con la entrada
//! `<directorio padre>/<nombre>` y el resultado se codifica en base64.


use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};
use crate::command::domain::PackagingError;
use crate::config::base_files::{MESSAGE_FILE, SERVICE_FILE};


/// Resuelve las rutas de los archivos base bajo `root`.
///
/// Falla con [`PackagingError::MissingFile`] si alguno no existe.
pub fn locate_base_files(root: &Path) -> Result<Vec<PathBuf>, PackagingError> {
    [MESSAGE_FILE, SERVICE_FILE]
        .iter()
        .map(|relative| {
            let path = root.join(relative);
            if path.is_file() {
                Ok(path)
            } else {
                error!("Error: archivo base {} no encontrado", path.display());
                Err(PackagingError::MissingFile(path.display().to_string()))
            }
        })
        .collect()
}


/// Comprime los archivos y devuelve el ZIP codificado en base64.
pub fn zip_and_encode(files: &[PathBuf]) -> Result<String, PackagingError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for file in files {
        let bytes = std::fs::read(file)?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(entry_name(file), options)?;
        writer.write_all(&bytes)?;
    }

    let cursor = writer.finish()?;
    Ok(STANDARD.encode(cursor.into_inner()))
}


fn entry_name(file: &Path) -> String {
    let name = file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    match file.parent().and_then(Path::file_name) {
        Some(parent) => format!("{}/{}", parent.to_string_lossy(), name),
        None => name.into_owned(),
    }
}
