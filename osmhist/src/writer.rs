//! Écriture d'un journal filtré (JSON lines, compressé si le chemin finit par `.bz2`)

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bzip2::write::BzEncoder;
use bzip2::Compression;

use crate::types::Primitive;
use crate::OsmHistError;

enum Sink {
    Plain(BufWriter<File>),
    Bzip2(BzEncoder<BufWriter<File>>),
}

/// Écrivain de journal, relisible par [`crate::open`]
pub struct ChangelogWriter {
    path: PathBuf,
    sink: Sink,
    written: usize,
}

impl ChangelogWriter {
    pub fn create(path: &Path) -> Result<Self, OsmHistError> {
        let file = BufWriter::new(File::create(path)?);
        let compressed = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("bz2"));

        let sink = if compressed {
            Sink::Bzip2(BzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };

        Ok(Self {
            path: path.to_path_buf(),
            sink,
            written: 0,
        })
    }

    pub fn write(&mut self, primitive: &Primitive) -> Result<(), OsmHistError> {
        let out: &mut dyn Write = match &mut self.sink {
            Sink::Plain(w) => w,
            Sink::Bzip2(w) => w,
        };

        serde_json::to_writer(&mut *out, primitive).map_err(|e| OsmHistError::Encode {
            kind: primitive.kind().as_str(),
            id: primitive.meta().id,
            reason: e.to_string(),
        })?;
        out.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    /// Nombre de primitives écrites
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Vide les tampons et termine le flux compressé
    pub fn finish(self) -> Result<usize, OsmHistError> {
        match self.sink {
            Sink::Plain(mut w) => w.flush()?,
            Sink::Bzip2(w) => w.finish()?.flush()?,
        }
        Ok(self.written)
    }
}
