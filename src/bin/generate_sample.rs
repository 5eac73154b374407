use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rusty_psd::data::model::{FrequencySeries, TimeSegment};
use rusty_psd::store::{write_parquet_store, StoreEntry};

const DETECTOR: &str = "H1";
const DELTA_F: f64 = 0.25;
const N_BINS: usize = 8193;
const STORE_LOW_FREQUENCY_CUTOFF: f64 = 15.0;
const GPS_START: f64 = 1_272_790_000.0;
const ENTRY_DURATION: f64 = 512.0;
/// Overall noise level of each consecutive stretch of data.
const LEVELS: [f64; 4] = [1.0, 1.18, 0.87, 1.06];

/// Rough detector-like noise curve: seismic wall, thermal bucket, shot noise.
fn design_psd(f: f64) -> f64 {
    let x = f.max(1.0) / 215.0;
    let shot = 111.0 * (1.0 - x * x + 0.5 * x.powi(4)) / (1.0 + 0.5 * x * x);
    1e-49 * (x.powf(-4.14) - 5.0 * x.powi(-2) + shot).abs().max(1e-3)
}

fn write_asd_table(path: &Path, psd: &FrequencySeries) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut out = BufWriter::new(file);
    writeln!(out, "# frequency [Hz]  ASD [strain/sqrt(Hz)]")?;
    for (k, f) in psd.sample_frequencies().enumerate().skip(1) {
        writeln!(out, "{f:.6e} {:.6e}", psd[k].sqrt())?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let entries = LEVELS
        .iter()
        .enumerate()
        .map(|(i, level)| -> Result<StoreEntry> {
            let data = (0..N_BINS)
                .map(|k| level * design_psd(k as f64 * DELTA_F))
                .collect();
            let start = GPS_START + i as f64 * ENTRY_DURATION;
            Ok(StoreEntry {
                segment: TimeSegment::new(start, start + ENTRY_DURATION),
                psd: FrequencySeries::new(data, DELTA_F)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let store_path = Path::new("sample_psds.parquet");
    write_parquet_store(store_path, DETECTOR, STORE_LOW_FREQUENCY_CUTOFF, &entries)
        .context("writing PSD store")?;
    log::info!(
        "Wrote {} {DETECTOR} PSDs ({N_BINS} bins at {DELTA_F} Hz) to {}",
        entries.len(),
        store_path.display()
    );

    let asd_path = Path::new("sample_asd.txt");
    write_asd_table(asd_path, &entries[0].psd)?;
    log::info!("Wrote ASD table to {}", asd_path.display());

    Ok(())
}
