use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use flate2::read::GzDecoder;
use roxmltree::{Document, Node, ParsingOptions};

use crate::error::{PsdError, Result};

use super::model::{FrequencySeries, RawSpectrumSample};
use super::resample::{from_arrays, from_sample};

/// Name of the `LIGO_LW` element that holds the PSDs in a PSD XML document.
pub const DEFAULT_XML_ROOT: &str = "psd";

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Read a two-column ASCII file holding a one-sided ASD (or PSD when
/// `is_asd_file` is false) and interpolate it onto `length` bins spaced by
/// `delta_f`, zero below `low_freq_cutoff`.
///
/// Fails if the file contains negative, infinite or NaN values.
pub fn from_txt(
    path: &Path,
    length: usize,
    delta_f: f64,
    low_freq_cutoff: f64,
    is_asd_file: bool,
) -> Result<FrequencySeries> {
    let mut sample = read_txt(path)?;
    if is_asd_file {
        sample = sample.into_power();
    }
    from_sample(&sample, length, delta_f, low_freq_cutoff)
}

/// Read one PSD out of a LIGO_LW PSD XML document (optionally gzipped) and
/// interpolate it onto `length` bins spaced by `delta_f`.
///
/// `ifo` selects the instrument; without it the document must hold exactly
/// one PSD.
pub fn from_xml(
    path: &Path,
    length: usize,
    delta_f: f64,
    low_freq_cutoff: f64,
    ifo: Option<&str>,
    root_name: Option<&str>,
) -> Result<FrequencySeries> {
    let psds = read_psd_xml(path, root_name)?;
    let available = || psds.keys().cloned().collect::<Vec<_>>();

    let series = match ifo {
        Some(ifo) => psds.get(ifo).ok_or_else(|| PsdError::UnknownInstrument {
            instrument: ifo.to_string(),
            available: available(),
        })?,
        None => match psds.values().next() {
            Some(series) if psds.len() == 1 => series,
            _ => {
                return Err(PsdError::AmbiguousInstrument {
                    available: available(),
                })
            }
        },
    };

    let freq_data: Vec<f64> = series.sample_frequencies().collect();
    from_arrays(&freq_data, series.data(), length, delta_f, low_freq_cutoff)
}

// ---------------------------------------------------------------------------
// ASCII tables
// ---------------------------------------------------------------------------

/// Load a two-column (frequency, value) table from disk.
pub fn read_txt(path: &Path) -> Result<RawSpectrumSample> {
    let text = read_maybe_gzipped(path)?;
    parse_txt(&text, &path.display().to_string())
}

/// Parse a numeric table whose columns are separated by whitespace or
/// commas. Text from `#` to the end of a line is a comment. Only the first
/// two columns are used, but every value in the table must be finite and
/// non-negative.
pub fn parse_txt(text: &str, source_name: &str) -> Result<RawSpectrumSample> {
    let invalid = |reason: String| PsdError::InvalidData {
        source_name: source_name.to_string(),
        reason,
    };

    // `#` starts a comment anywhere on a line. Runs of blanks collapse to
    // single empty fields, which are skipped below.
    let normalised: String = text
        .lines()
        .map(|line| line.split_once('#').map_or(line, |(data, _)| data))
        .map(|line| line.replace(['\t', ','], " ") + "\n")
        .collect();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(b' ')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(normalised.as_bytes());

    let mut freq_data = Vec::new();
    let mut noise_data = Vec::new();
    for (row_no, result) in reader.records().enumerate() {
        let record = result?;
        let values = record
            .iter()
            .filter(|field| !field.is_empty())
            .map(|field| {
                field
                    .parse::<f64>()
                    .map_err(|_| invalid(format!("row {row_no}: '{field}' is not a number")))
            })
            .collect::<Result<Vec<f64>>>()?;
        if values.is_empty() {
            continue;
        }
        if values.len() < 2 {
            return Err(invalid(format!(
                "row {row_no}: expected two columns, got {}",
                values.len()
            )));
        }
        if let Some(v) = values.iter().find(|v| !(v.is_finite() && **v >= 0.0)) {
            return Err(invalid(format!("row {row_no}: value {v} is negative or not finite")));
        }
        freq_data.push(values[0]);
        noise_data.push(values[1]);
    }

    if freq_data.is_empty() {
        return Err(invalid("no data rows".into()));
    }
    RawSpectrumSample::new(freq_data, noise_data).map_err(|e| invalid(e.to_string()))
}

// ---------------------------------------------------------------------------
// LIGO_LW PSD XML documents
// ---------------------------------------------------------------------------

/// Load every PSD of a LIGO_LW document, keyed by instrument.
pub fn read_psd_xml(
    path: &Path,
    root_name: Option<&str>,
) -> Result<BTreeMap<String, FrequencySeries>> {
    let text = read_maybe_gzipped(path)?;
    parse_psd_xml(&text, root_name)
}

/// Parse the `REAL8FrequencySeries` blocks of a LIGO_LW document.
///
/// With `root_name`, only the `LIGO_LW` element carrying that `Name` is
/// searched.
pub fn parse_psd_xml(
    text: &str,
    root_name: Option<&str>,
) -> Result<BTreeMap<String, FrequencySeries>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options)?;

    let root = match root_name {
        Some(name) => doc
            .descendants()
            .find(|n| n.has_tag_name("LIGO_LW") && n.attribute("Name") == Some(name))
            .ok_or_else(|| xml_error(format!("no LIGO_LW element named '{name}'")))?,
        None => doc.root_element(),
    };

    let mut psds = BTreeMap::new();
    for series in root
        .descendants()
        .filter(|n| {
            n.has_tag_name("LIGO_LW") && n.attribute("Name") == Some("REAL8FrequencySeries")
        })
    {
        let instrument = series
            .children()
            .find(|n| {
                n.has_tag_name("Param")
                    && strip_type_suffix(n.attribute("Name")) == Some("instrument")
            })
            .and_then(|n| n.text())
            .map(str::trim)
            .ok_or_else(|| xml_error("frequency series without an instrument Param".into()))?;

        let array = child_element(series, "Array")?;
        let dims: Vec<Node> = array.children().filter(|n| n.has_tag_name("Dim")).collect();
        let delta_f = dims
            .first()
            .and_then(|dim| dim.attribute("Scale"))
            .ok_or_else(|| xml_error(format!("{instrument}: missing frequency Dim scale")))?
            .trim()
            .parse::<f64>()
            .map_err(|_| xml_error(format!("{instrument}: frequency scale is not a number")))?;
        let columns = match dims.get(1).and_then(|dim| dim.text()) {
            Some(text) => text
                .trim()
                .parse::<usize>()
                .map_err(|_| xml_error(format!("{instrument}: column count is not an integer")))?,
            None => 1,
        };
        if columns == 0 {
            return Err(xml_error(format!("{instrument}: zero columns")));
        }

        let stream = child_element(array, "Stream")?;
        let delimiter = stream.attribute("Delimiter").unwrap_or(",");
        let tokens = stream
            .text()
            .unwrap_or("")
            .split(|c: char| c.is_whitespace() || delimiter.contains(c))
            .filter(|tok| !tok.is_empty())
            .map(|tok| {
                tok.parse::<f64>()
                    .map_err(|_| xml_error(format!("{instrument}: '{tok}' is not a number")))
            })
            .collect::<Result<Vec<f64>>>()?;
        if tokens.len() % columns != 0 {
            return Err(xml_error(format!(
                "{instrument}: {} values do not fill {columns} columns",
                tokens.len()
            )));
        }
        let data: Vec<f64> = tokens.chunks(columns).map(|row| row[columns - 1]).collect();

        log::debug!("{instrument}: {} bins at {delta_f} Hz", data.len());
        psds.insert(instrument.to_string(), FrequencySeries::new(data, delta_f)?);
    }

    Ok(psds)
}

// -- XML helpers --

fn xml_error(reason: String) -> PsdError {
    PsdError::InvalidData {
        source_name: "PSD XML document".into(),
        reason,
    }
}

/// `"instrument:param"` → `"instrument"`.
fn strip_type_suffix(name: Option<&str>) -> Option<&str> {
    name.map(|n| n.split(':').next().unwrap_or(n))
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Result<Node<'a, 'input>> {
    node.children()
        .find(|n| n.has_tag_name(tag))
        .ok_or_else(|| xml_error(format!("missing <{tag}> element")))
}

// ---------------------------------------------------------------------------
// File access
// ---------------------------------------------------------------------------

/// Read a text file, gunzipping it first when the name ends in `.gz`.
fn read_maybe_gzipped(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut text = String::new();
    let gzipped = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gz"));
    if gzipped {
        GzDecoder::new(file).read_to_string(&mut text)?;
    } else {
        file.read_to_string(&mut text)?;
    }
    Ok(text)
}
