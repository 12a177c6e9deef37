//! Which catalog sources of a scan are worth fitting.

use crate::config::SelectionConfig;
use crate::error::{Result, SamplerError};
use crate::pipeline::Catalog;
use crate::scan::ScanData;

/// Keeps sources hit by more than `min_ranges` ranges and, unless clusters are allowed, with a
/// positive catalog amplitude in the first component. Returns the reduced scan and the
/// catalog indices of the kept sources.
pub fn select_sources<S: ScanData>(
    scan: &S,
    catalog: &Catalog,
    cfg: &SelectionConfig,
) -> Result<(S, Vec<usize>)> {
    if catalog.n_src() != scan.n_src() {
        return Err(SamplerError::ShapeMismatch {
            what: "select_sources catalog",
            expected: scan.n_src(),
            got: catalog.n_src(),
        });
    }
    let keep: Vec<usize> = (0..scan.n_src())
        .filter(|&si| scan.source_ranges(si).len() > cfg.min_ranges)
        .filter(|&si| cfg.allow_clusters || catalog.amp[[si, 0]] > 0.0)
        .collect();
    if keep.is_empty() {
        return Err(SamplerError::insufficient(scan.id(), "too few sources"));
    }
    log::debug!(
        "{}: kept {} of {} sources",
        scan.id(),
        keep.len(),
        scan.n_src()
    );
    let reduced = scan.select_sources(&keep)?;
    Ok((reduced, keep))
}
