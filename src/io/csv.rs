/*!
# CSV input and output

Per scan, [`save_scan_output`] writes a directory `<root>/<scan id>/` holding

- `samples.csv`: one row per recorded sample, with a `step` column followed by the columns of
  [`Chain::parameter_names`],
- `sources.csv`: one row per fitted source with its catalog index, the S/N of every component
  and whether that component was sampled as strong.

[`load_catalog`] reads the source catalog the other way round.
*/

use csv::{Reader, Writer};
use ndarray::Array2;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::config::DEGREE;
use crate::error::{Result, SamplerError};
use crate::pipeline::{Catalog, ScanOutput};
use crate::sampler::Chain;

/// File holding the recorded samples of a scan.
pub const SAMPLES_FILE: &str = "samples.csv";
/// File holding the per-source significance of a scan.
pub const SOURCES_FILE: &str = "sources.csv";

/**
Saves a chain as a CSV file.

The header is `step` followed by [`Chain::parameter_names`]; each subsequent row is one
recorded sample.

# Examples

```rust
use ndarray::{Array2, Array3};
use ptsrc_mcmc::io::csv::save_chain;
use ptsrc_mcmc::sampler::Chain;

let chain = Chain {
    pos_rel: Array2::zeros((2, 2)),
    beam_rel: Array2::ones((2, 3)),
    amp: Array3::from_elem((2, 1, 1), 4.0),
    acceptance: 0.3,
};
let dir = tempfile::tempdir()?;
save_chain(&chain, dir.path().join("samples.csv"))?;
# Ok::<(), Box<dyn std::error::Error>>(())
```
*/
pub fn save_chain<P: AsRef<Path>>(chain: &Chain, path: P) -> Result<()> {
    write_atomic(path.as_ref(), |wtr| {
        let mut header = vec!["step".to_string()];
        header.extend(chain.parameter_names());
        wtr.write_record(&header)?;

        for (step, row) in chain.flat_samples().outer_iter().enumerate() {
            let mut record = vec![step.to_string()];
            record.extend(row.iter().map(|v| v.to_string()));
            wtr.write_record(&record)?;
        }
        Ok(())
    })
}

/// Saves the catalog index, per-component S/N and strong flags of the fitted sources.
pub fn save_sources<P: AsRef<Path>>(output: &ScanOutput, path: P) -> Result<()> {
    let n_comp = output.significance.ncols();
    write_atomic(path.as_ref(), |wtr| {
        let mut header = vec!["source".to_string()];
        header.extend((0..n_comp).map(|c| format!("sn_{c}")));
        header.extend((0..n_comp).map(|c| format!("strong_{c}")));
        wtr.write_record(&header)?;

        for (i, &src) in output.sources.iter().enumerate() {
            let mut record = vec![src.to_string()];
            record.extend(output.significance.row(i).iter().map(|v| v.sqrt().to_string()));
            record.extend(
                output
                    .strong
                    .row(i)
                    .iter()
                    .map(|&s| u8::from(s).to_string()),
            );
            wtr.write_record(&record)?;
        }
        Ok(())
    })
}

/// `path` with `.tmp` appended.
fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Fills `<path>.tmp` and renames it onto `path`, so `path` only ever holds a complete file.
fn write_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut Writer<File>) -> Result<()>,
{
    let tmp = tmp_path(path);
    let written = Writer::from_path(&tmp)
        .map_err(SamplerError::from)
        .and_then(|mut wtr| {
            fill(&mut wtr)?;
            wtr.flush()?;
            Ok(())
        })
        .and_then(|()| std::fs::rename(&tmp, path).map_err(SamplerError::from));
    if written.is_err() {
        // may not exist if creation failed
        std::fs::remove_file(&tmp).ok();
    }
    written
}

/// The directory the results of scan `id` go to.
pub fn output_dir<P: AsRef<Path>>(root: P, id: &str) -> PathBuf {
    root.as_ref().join(id)
}

/// Whether `root` already holds the samples of scan `id`.
pub fn output_exists<P: AsRef<Path>>(root: P, id: &str) -> bool {
    output_dir(root, id).join(SAMPLES_FILE).is_file()
}

/// Writes `samples.csv` and `sources.csv` under `<root>/<id>/`, creating directories as
/// needed. Returns the scan's directory. On failure the scan's directory is removed.
pub fn save_scan_output<P: AsRef<Path>>(root: P, output: &ScanOutput) -> Result<PathBuf> {
    let dir = output_dir(root, &output.id);
    std::fs::create_dir_all(&dir)?;
    let written = save_sources(output, dir.join(SOURCES_FILE))
        .and_then(|()| save_chain(&output.chain, dir.join(SAMPLES_FILE)));
    if let Err(e) = written {
        if let Err(rm) = std::fs::remove_dir_all(&dir) {
            log::warn!("{}: cannot remove incomplete output: {rm}", dir.display());
        }
        return Err(e);
    }
    Ok(dir)
}

/**
Reads a source catalog.

The file has a header row and one row per source: right ascension and declination in
degrees, followed by one or more amplitude columns. Positions are converted to radians.
*/
pub fn load_catalog<P: AsRef<Path>>(path: P) -> Result<Catalog> {
    let mut rdr = Reader::from_path(path)?;
    let n_cols = rdr.headers()?.len();
    if n_cols < 3 {
        return Err(SamplerError::Config(format!(
            "catalog needs ra, dec and at least one amplitude column, got {n_cols} columns"
        )));
    }
    let mut values = Vec::new();
    let mut n_rows = 0;
    for record in rdr.records() {
        let record = record?;
        for field in record.iter() {
            let v: f64 = field.trim().parse().map_err(|e| {
                SamplerError::Config(format!(
                    "catalog row {}: cannot parse '{field}': {e}",
                    n_rows + 1
                ))
            })?;
            values.push(v);
        }
        n_rows += 1;
    }
    let got = values.len();
    let table = Array2::from_shape_vec((n_rows, n_cols), values).map_err(|_| {
        SamplerError::ShapeMismatch {
            what: "load_catalog rows",
            expected: n_rows * n_cols,
            got,
        }
    })?;
    let pos = table.slice(ndarray::s![.., ..2]).mapv(|v| v * DEGREE);
    let amp = table.slice(ndarray::s![.., 2..]).to_owned();
    Catalog::new(pos, amp)
}
