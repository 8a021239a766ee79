//! Lecture des journaux filtrés (une primitive JSON par ligne, bzip2 optionnel)

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;

use crate::types::Primitive;
use crate::OsmHistError;

/// Décodeur ligne à ligne
pub struct JsonlDecoder {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    buffer: Vec<u8>,
    offset: u64,
    corrupt: usize,
    finished: bool,
}

impl JsonlDecoder {
    pub fn open(path: &Path, compressed: bool) -> Result<Self, OsmHistError> {
        let file = File::open(path)?;
        let reader: Box<dyn BufRead + Send> = if compressed {
            Box::new(BufReader::new(BzDecoder::new(file)))
        } else {
            Box::new(BufReader::new(file))
        };

        Ok(Self {
            path: path.to_path_buf(),
            reader,
            buffer: Vec::with_capacity(512),
            offset: 0,
            corrupt: 0,
            finished: false,
        })
    }

    /// Nombre de lignes ignorées car mal formées
    pub fn corrupt_records(&self) -> usize {
        self.corrupt
    }
}

impl Iterator for JsonlDecoder {
    type Item = Result<Primitive, OsmHistError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.buffer.clear();
            let read = match self.reader.read_until(b'\n', &mut self.buffer) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    return Some(Err(OsmHistError::stream(&self.path, e.to_string())));
                }
            };

            let start = self.offset;
            self.offset += read as u64;

            if self.buffer.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return match serde_json::from_slice::<Primitive>(&self.buffer) {
                Ok(primitive) => Some(Ok(primitive)),
                Err(e) => {
                    self.corrupt += 1;
                    Some(Err(OsmHistError::decode(start, e.to_string())))
                }
            };
        }
        None
    }
}
