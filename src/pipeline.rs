use anyhow::{anyhow, Result};
use tracing::{info, instrument};

use crate::{
    config::Config,
    extract::{run_extract, ExtractStats},
    load::{run_load, LoadStats},
};

/// Rebuild the bundle from the raw dump: a fresh extract, then a load of its output.
#[instrument(level = "info", skip(cfg))]
pub fn run(cfg: &Config) -> Result<(ExtractStats, LoadStats)> {
    if cfg.extract.output != cfg.load.input {
        return Err(anyhow!(
            "extract output {} is not the load input {}",
            cfg.extract.output.display(),
            cfg.load.input.display()
        ));
    }

    let mut extract = cfg.extract.clone();
    extract.fresh = true;
    let extracted = run_extract(&extract)?;
    if extracted.rows_kept == 0 {
        return Err(anyhow!(
            "no rows matched {:?}; nothing to load",
            extract.countries
        ));
    }

    let loaded = run_load(&cfg.load)?;
    info!(
        kept = extracted.rows_kept,
        inserted = loaded.inserted,
        "pipeline finished"
    );
    Ok((extracted, loaded))
}
