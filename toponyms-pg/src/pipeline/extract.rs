//! Extraction d'un journal filtré par emprise et période
//!
//! Pour les périodes `pre-cutoff`, date personnalisée et `full`, une seule
//! passe suffit: les nœuds retenus précèdent les chemins qui les référencent.
//!
//! La période `post-cutoff` fait deux passes. La première construit le cache
//! et note les chemins et relations retenus ainsi que les nœuds dont ces
//! chemins ont besoin. La seconde écrit les versions retenues et, pour ces
//! nœuds de support, leur dernière version antérieure à la coupure, afin que
//! le journal reste relisible seul.
//!
//! Une extraction interrompue ne laisse pas de journal partiel.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use osmhist::{ChangelogWriter, CoordinateCache, ElementKind, Node, OsmHistError, Primitive};
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::filter::{Period, ScopeFilter, TemporalMode};
use crate::report::ExtractReport;

/// Chemin du journal extrait: `<region>-<période>.osh.jsonl[.bz2]`
pub fn output_path(output_dir: &Path, region: &str, period: &Period, compress: bool) -> PathBuf {
    let suffix = if compress { ".bz2" } else { "" };
    output_dir.join(format!("{}-{}.osh.jsonl{}", region, period.label(), suffix))
}

/// Extrait les versions retenues de `input` vers un journal dans `output_dir`
pub fn extract(
    input: &Path,
    config: &PipelineConfig,
    period: Period,
    output_dir: &Path,
    compress: bool,
) -> Result<ExtractReport> {
    let start = Instant::now();
    let mode = period.temporal_mode(config.cutoff)?;
    let filter = ScopeFilter::from_config(config, mode);

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory: {}", output_dir.display()))?;
    let output = output_path(output_dir, &config.region, &period, compress);

    info!(
        input = %input.display(),
        output = %output.display(),
        period = %period.label(),
        "Starting extraction"
    );

    let writer = ChangelogWriter::create(&output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;

    let mut report = ExtractReport {
        input: input.display().to_string(),
        output: output.display().to_string(),
        period: period.label(),
        ..Default::default()
    };

    match write_extract(input, &filter, mode, writer, &mut report) {
        Ok(extracted) => report.extracted = extracted,
        Err(e) => {
            discard_partial(&output);
            return Err(e);
        }
    }
    report.duration_secs = start.elapsed().as_secs_f64();

    info!(summary = %report.summary(), "Extraction finished");
    Ok(report)
}

/// Écrit puis finalise le journal; retourne le nombre de versions écrites
fn write_extract(
    input: &Path,
    filter: &ScopeFilter,
    mode: TemporalMode,
    mut writer: ChangelogWriter,
    report: &mut ExtractReport,
) -> Result<usize> {
    match mode {
        TemporalMode::After(cutoff) => {
            let scope = scan_post_cutoff(input, filter)?;
            info!(
                accepted = scope.accepted.len(),
                support_nodes = scope.support.len(),
                "First pass complete"
            );
            write_post_cutoff(input, filter, cutoff, &scope, &mut writer, report)?;
        }
        TemporalMode::Full | TemporalMode::Before(_) => {
            write_single_pass(input, filter, &mut writer, report)?;
        }
    }

    debug!(
        output = %writer.path().display(),
        written = writer.written(),
        "Finalizing change log"
    );
    let output = writer.path().to_path_buf();
    writer
        .finish()
        .with_context(|| format!("Failed to finalize output: {}", output.display()))
}

/// Supprime un journal incomplet après une erreur
fn discard_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => warn!(output = %output.display(), "Removed partial change log"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            output = %output.display(),
            error = %e,
            "Failed to remove partial change log"
        ),
    }
}

/// Lit la version suivante; les enregistrements corrompus sont comptés et sautés
fn next_primitive(
    item: Result<Primitive, OsmHistError>,
    corrupt: &mut usize,
) -> Result<Option<Primitive>> {
    match item {
        Ok(primitive) => Ok(Some(primitive)),
        Err(e) if e.is_fatal() => Err(e).context("Decode stage failed"),
        Err(e) => {
            warn!(error = %e, "Skipping corrupt record");
            *corrupt += 1;
            Ok(None)
        }
    }
}

/// Décision pour un nœud visible: entre-t-il dans le cache, est-il retenu ?
fn observe_node(filter: &ScopeFilter, cache: &mut CoordinateCache, node: &Node) -> bool {
    let ts = node.meta.timestamp;
    if filter.bbox().contains(node.lon, node.lat) && filter.admits_geometry(ts) {
        cache.put(node.meta.id, node.lon, node.lat);
    }
    filter.accepts_point(ts, node.lon, node.lat)
}

/// Met à jour le cache et décide si la version est retenue
fn observe(filter: &ScopeFilter, cache: &mut CoordinateCache, primitive: &Primitive) -> bool {
    match primitive {
        Primitive::Point(node) => {
            if !node.meta.visible {
                cache.evict(node.meta.id);
                return false;
            }
            observe_node(filter, cache, node)
        }
        Primitive::Way(way) => {
            if !way.meta.visible {
                return false;
            }
            let centroid = cache.resolve_way(&way.node_refs).centroid();
            if let Some(c) = centroid {
                cache.put_way_centroid(way.meta.id, c);
            }
            filter.accepts_way(way.meta.timestamp, centroid)
        }
        Primitive::Relation(relation) => {
            if !relation.meta.visible {
                return false;
            }
            let centroid = cache.member_centroid(&relation.members);
            filter.accepts_relation(relation.meta.timestamp, centroid, &relation.tags)
        }
    }
}

fn write_single_pass(
    input: &Path,
    filter: &ScopeFilter,
    writer: &mut ChangelogWriter,
    report: &mut ExtractReport,
) -> Result<()> {
    let decoder = osmhist::open(input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;
    let mut cache = CoordinateCache::new();

    for item in decoder {
        let Some(primitive) = next_primitive(item, &mut report.corrupt)? else {
            continue;
        };
        report.processed += 1;

        if observe(filter, &mut cache, &primitive) {
            writer.write(&primitive)?;
        }
    }
    Ok(())
}

/// Résultat de la première passe `post-cutoff`
#[derive(Debug, Default)]
struct PostCutoffScope {
    /// Chemins et relations retenus (nature, id, version)
    accepted: HashSet<(ElementKind, i64, i32)>,
    /// Nœuds référencés par les chemins retenus
    support: HashSet<i64>,
}

fn scan_post_cutoff(input: &Path, filter: &ScopeFilter) -> Result<PostCutoffScope> {
    let decoder = osmhist::open(input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;
    let mut cache = CoordinateCache::new();
    let mut scope = PostCutoffScope::default();
    let mut corrupt = 0;

    for item in decoder {
        let Some(primitive) = next_primitive(item, &mut corrupt)? else {
            continue;
        };
        if !observe(filter, &mut cache, &primitive) {
            continue;
        }
        let meta = primitive.meta();
        match &primitive {
            Primitive::Point(_) => {}
            Primitive::Way(way) => {
                scope.support.extend(way.node_refs.iter().copied());
                scope.accepted.insert((ElementKind::Way, meta.id, meta.version));
            }
            Primitive::Relation(_) => {
                scope.accepted.insert((ElementKind::Relation, meta.id, meta.version));
            }
        }
    }
    Ok(scope)
}

fn write_post_cutoff(
    input: &Path,
    filter: &ScopeFilter,
    cutoff: DateTime<Utc>,
    scope: &PostCutoffScope,
    writer: &mut ChangelogWriter,
    report: &mut ExtractReport,
) -> Result<()> {
    let decoder = osmhist::open(input)
        .with_context(|| format!("Failed to open input: {}", input.display()))?;
    // Dernière version antérieure à la coupure du nœud de support courant
    let mut pending: Option<Node> = None;

    for item in decoder {
        let Some(primitive) = next_primitive(item, &mut report.corrupt)? else {
            continue;
        };
        report.processed += 1;

        let Primitive::Point(node) = &primitive else {
            flush_support(&mut pending, writer, report)?;
            let meta = primitive.meta();
            if scope.accepted.contains(&(primitive.kind(), meta.id, meta.version)) {
                writer.write(&primitive)?;
            }
            continue;
        };

        let accepted =
            node.meta.visible && filter.accepts_point(node.meta.timestamp, node.lon, node.lat);
        if accepted || pending.as_ref().map_or(false, |p| p.meta.id != node.meta.id) {
            flush_support(&mut pending, writer, report)?;
        }

        if accepted {
            writer.write(&primitive)?;
        } else if scope.support.contains(&node.meta.id)
            && node.meta.timestamp.map_or(false, |ts| ts <= cutoff)
        {
            pending = node.meta.visible.then(|| node.clone());
        }
    }

    flush_support(&mut pending, writer, report)
}

fn flush_support(
    pending: &mut Option<Node>,
    writer: &mut ChangelogWriter,
    report: &mut ExtractReport,
) -> Result<()> {
    if let Some(node) = pending.take() {
        debug!(node = node.meta.id, version = node.meta.version, "Writing support node");
        writer.write(&Primitive::Point(node))?;
        report.support_nodes += 1;
    }
    Ok(())
}
