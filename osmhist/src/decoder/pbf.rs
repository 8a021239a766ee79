//! Lecture des fichiers PBF (.osm.pbf / .osh.pbf), bloc par bloc
//!
//! Chaque blob est décodé puis converti en primitives possédées, restituées
//! dans l'ordre physique du fichier. Un blob corrompu est signalé puis ignoré;
//! une erreur de lecture d'en-tête termine le flux.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::DateTime;
use osmpbf::{BlobDecode, BlobReader, DenseNodeInfo, Element, Info, PrimitiveBlock, RelMemberType};
use tracing::{debug, warn};

use crate::types::{ElementKind, Member, Meta, Node, Primitive, Relation, Tags, Way};
use crate::OsmHistError;

/// Décodeur PBF paresseux
pub struct PbfDecoder {
    path: PathBuf,
    blobs: BlobReader<BufReader<File>>,
    pending: VecDeque<Primitive>,
    corrupt: usize,
    finished: bool,
}

impl PbfDecoder {
    pub fn open(path: &Path) -> Result<Self, OsmHistError> {
        let blobs = BlobReader::seekable_from_path(path)
            .map_err(|e| OsmHistError::stream(path, e.to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            blobs,
            pending: VecDeque::new(),
            corrupt: 0,
            finished: false,
        })
    }

    /// Nombre de blobs ignorés car illisibles
    pub fn corrupt_records(&self) -> usize {
        self.corrupt
    }
}

impl Iterator for PbfDecoder {
    type Item = Result<Primitive, OsmHistError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(primitive) = self.pending.pop_front() {
                return Some(Ok(primitive));
            }
            if self.finished {
                return None;
            }

            let blob = match self.blobs.next() {
                None => {
                    self.finished = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.finished = true;
                    warn!(path = %self.path.display(), error = %e, "PBF stream ended abnormally");
                    return Some(Err(OsmHistError::stream(&self.path, e.to_string())));
                }
                Some(Ok(blob)) => blob,
            };

            let offset = blob.offset().map(|o| o.0).unwrap_or(0);
            match blob.decode() {
                Ok(BlobDecode::OsmData(block)) => collect_block(&block, &mut self.pending),
                Ok(BlobDecode::OsmHeader(_)) => {}
                Ok(BlobDecode::Unknown(kind)) => {
                    debug!(offset, kind, "Skipping unknown blob type");
                }
                Err(e) => {
                    self.corrupt += 1;
                    return Some(Err(OsmHistError::decode(offset, e.to_string())));
                }
            }
        }
    }
}

/// Convertit un bloc décodé en primitives possédées
fn collect_block(block: &PrimitiveBlock, out: &mut VecDeque<Primitive>) {
    for element in block.elements() {
        let primitive = match element {
            Element::Node(node) => Primitive::Point(Node {
                meta: info_meta(node.id(), &node.info()),
                tags: collect_tags(node.tags()),
                lon: node.lon(),
                lat: node.lat(),
            }),
            Element::DenseNode(node) => Primitive::Point(Node {
                meta: node
                    .info()
                    .map(|info| dense_meta(node.id(), info))
                    .unwrap_or_else(|| Meta::new(node.id(), 0)),
                tags: collect_tags(node.tags()),
                lon: node.lon(),
                lat: node.lat(),
            }),
            Element::Way(way) => Primitive::Way(Way {
                meta: info_meta(way.id(), &way.info()),
                tags: collect_tags(way.tags()),
                node_refs: way.refs().collect(),
            }),
            Element::Relation(relation) => Primitive::Relation(Relation {
                meta: info_meta(relation.id(), &relation.info()),
                tags: collect_tags(relation.tags()),
                members: relation
                    .members()
                    .map(|m| Member {
                        member_type: match m.member_type {
                            RelMemberType::Node => ElementKind::Node,
                            RelMemberType::Way => ElementKind::Way,
                            RelMemberType::Relation => ElementKind::Relation,
                        },
                        member_id: m.member_id,
                        role: m.role().unwrap_or_default().to_string(),
                    })
                    .collect(),
            }),
        };
        out.push_back(primitive);
    }
}

fn collect_tags<'a>(tags: impl Iterator<Item = (&'a str, &'a str)>) -> Tags {
    tags.map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

fn info_meta(id: i64, info: &Info) -> Meta {
    Meta {
        id,
        version: info.version().unwrap_or(0),
        timestamp: info
            .milli_timestamp()
            .and_then(DateTime::from_timestamp_millis),
        author_id: info.uid().map(i64::from),
        change_group_id: info.changeset().unwrap_or(0),
        visible: info.visible(),
    }
}

fn dense_meta(id: i64, info: &DenseNodeInfo) -> Meta {
    Meta {
        id,
        version: info.version(),
        timestamp: DateTime::from_timestamp_millis(info.milli_timestamp()),
        author_id: Some(i64::from(info.uid())),
        change_group_id: info.changeset(),
        visible: info.visible(),
    }
}
