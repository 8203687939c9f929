use std::path::Path;

use anyhow::{bail, Context, Result};
use arrow::array::{Array, ArrayRef, Float32Array, Float64Array, Int32Array, Int64Array};
use ndarray::{Array1, Array2};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde::Deserialize;

use super::model::{Model, Observation, ParameterGrid, Spectrum};

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a spectrum from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.txt` / `.dat` / `.asad` / none – whitespace-separated columns, the
///   wavelength first and one column per flux row
/// * `.json`    – `{ "wavelength": [...], "flux": [[...], ...] }`
/// * `.csv`     – a `wavelength` column plus one column per flux row
/// * `.parquet` – same layout as CSV, numeric columns
pub fn load_file(path: &Path) -> Result<Spectrum> {
    Ok(load_tabulated(path)?.spectrum)
}

/// Load an observation with the default reddening grid.
pub fn load_observation(path: &Path) -> Result<Observation> {
    Ok(Observation::new(load_file(path)?))
}

/// Load model spectra. A leading `#` line of numbers in a text file gives
/// the age of every row; otherwise ages come from `age`.
pub fn load_model(path: &Path, age: ParameterGrid) -> Result<Model> {
    let Tabulated { spectrum, header } = load_tabulated(path)?;
    let model = Model::new(spectrum, age);
    match header {
        Some(ages) => model
            .with_ages(Array1::from_vec(ages))
            .with_context(|| format!("age header of {}", path.display())),
        None => Ok(model),
    }
}

/// Write a spectrum in the text layout read by [`load_file`].
pub fn write_text(path: &Path, spectrum: &Spectrum) -> Result<()> {
    std::fs::write(path, spectrum.to_string())
        .with_context(|| format!("writing {}", path.display()))
}

/// Write model spectra as text with a `#` line holding the ages.
pub fn write_model_text(path: &Path, model: &Model) -> Result<()> {
    let ages: Vec<String> = model.ages().iter().map(|a| a.to_string()).collect();
    let text = format!("# {}\n{}", ages.join(" "), model.spectrum);
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))
}

struct Tabulated {
    spectrum: Spectrum,
    header: Option<Vec<f64>>,
}

fn load_tabulated(path: &Path) -> Result<Tabulated> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let loaded = match ext.as_str() {
        "parquet" | "pq" => load_parquet(path).map(without_header),
        "json" => load_json(path).map(without_header),
        "csv" => load_csv(path).map(without_header),
        "txt" | "dat" | "asad" | "" => load_text(path),
        other => bail!("Unsupported file extension: .{other}"),
    }
    .with_context(|| format!("loading {}", path.display()))?;

    log::debug!(
        "Loaded {} flux rows over {} wavelengths from {}",
        loaded.spectrum.num_rows(),
        loaded.spectrum.num_wavelengths(),
        path.display()
    );

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Tabulated {
        spectrum: loaded.spectrum.with_name(name),
        header: loaded.header,
    })
}

fn without_header(spectrum: Spectrum) -> Tabulated {
    Tabulated {
        spectrum,
        header: None,
    }
}

/// Assemble a spectrum from a wavelength column and per-row flux columns.
fn from_columns(wavelength: Vec<f64>, flux_rows: Vec<Vec<f64>>) -> Result<Spectrum> {
    let ncols = wavelength.len();
    for (i, row) in flux_rows.iter().enumerate() {
        if row.len() != ncols {
            bail!(
                "flux row {i} has {} values but wavelength has {ncols}",
                row.len()
            );
        }
    }
    let flux = Array2::from_shape_fn((flux_rows.len(), ncols), |(i, j)| flux_rows[i][j]);
    Spectrum::new(Array1::from_vec(wavelength), flux).context("invalid spectrum")
}

// ---------------------------------------------------------------------------
// Text matrix loader
// ---------------------------------------------------------------------------

/// Text layout, one line per wavelength:
///
/// ```text
/// # 6.60 6.65 6.70
/// 3500.0  0.91  0.88  0.84
/// 3502.0  0.92  0.87  0.85
/// ```
///
/// Blank lines and `#` comments are skipped. The first `#` line before the
/// data that parses fully as numbers is kept as the header, even when text
/// comments come ahead of it. `#` lines after the first data line are plain
/// comments.
fn load_text(path: &Path) -> Result<Tabulated> {
    let text = std::fs::read_to_string(path).context("reading text file")?;

    let mut header = None;
    let mut wavelength = Vec::new();
    let mut flux_rows: Vec<Vec<f64>> = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            if header.is_none() && wavelength.is_empty() {
                header = parse_header(comment);
            }
            continue;
        }

        let values = line
            .split_whitespace()
            .enumerate()
            .map(|(j, tok)| {
                tok.parse::<f64>().with_context(|| {
                    format!("Line {}, column {j}: '{tok}' is not a number", line_no + 1)
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if wavelength.is_empty() {
            if values.len() < 2 {
                bail!("Line {}: expected a wavelength and at least one flux value", line_no + 1);
            }
            flux_rows = vec![Vec::new(); values.len() - 1];
        } else if values.len() != flux_rows.len() + 1 {
            bail!(
                "Line {}: expected {} columns, found {}",
                line_no + 1,
                flux_rows.len() + 1,
                values.len()
            );
        }

        wavelength.push(values[0]);
        for (row, value) in flux_rows.iter_mut().zip(&values[1..]) {
            row.push(*value);
        }
    }

    if wavelength.is_empty() {
        bail!("no data lines");
    }

    Ok(Tabulated {
        spectrum: from_columns(wavelength, flux_rows)?,
        header,
    })
}

fn parse_header(comment: &str) -> Option<Vec<f64>> {
    let values: Vec<f64> = comment
        .split_whitespace()
        .map(|tok| tok.parse::<f64>())
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    (!values.is_empty()).then_some(values)
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct JsonSpectrum {
    wavelength: Vec<f64>,
    flux: Vec<Vec<f64>>,
}

fn load_json(path: &Path) -> Result<Spectrum> {
    let text = std::fs::read_to_string(path).context("reading JSON file")?;
    let parsed: JsonSpectrum = serde_json::from_str(&text).context("parsing JSON")?;
    from_columns(parsed.wavelength, parsed.flux)
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row, a `wavelength` column, and one column per flux
/// row (the header names are not used otherwise).
fn load_csv(path: &Path) -> Result<Spectrum> {
    let mut reader = csv::Reader::from_path(path).context("opening CSV")?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let wl_idx = headers
        .iter()
        .position(|h| h == "wavelength")
        .context("CSV missing 'wavelength' column")?;

    let mut wavelength = Vec::new();
    let mut flux_rows: Vec<Vec<f64>> = vec![Vec::new(); headers.len() - 1];

    for (row_no, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("CSV row {row_no}"))?;
        let mut flux_iter = flux_rows.iter_mut();
        for (col_idx, cell) in record.iter().enumerate() {
            let value = cell.trim().parse::<f64>().with_context(|| {
                format!("CSV row {row_no}, column '{}': '{cell}' is not a number", headers[col_idx])
            })?;
            if col_idx == wl_idx {
                wavelength.push(value);
            } else if let Some(row) = flux_iter.next() {
                row.push(value);
            }
        }
    }

    from_columns(wavelength, flux_rows)
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with a `wavelength` column and one numeric column per
/// flux row (Float64, Float32, Int64 or Int32).
fn load_parquet(path: &Path) -> Result<Spectrum> {
    let file = std::fs::File::open(path).context("opening parquet file")?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).context("reading parquet metadata")?;
    let reader = builder.build().context("building parquet reader")?;

    let mut wavelength = Vec::new();
    let mut flux_rows: Vec<Vec<f64>> = Vec::new();

    for batch_result in reader {
        let batch = batch_result.context("reading parquet record batch")?;
        let schema = batch.schema();

        let wl_idx = schema
            .index_of("wavelength")
            .map_err(|_| anyhow::anyhow!("Parquet file missing 'wavelength' column"))?;

        if flux_rows.is_empty() {
            flux_rows = vec![Vec::new(); schema.fields().len() - 1];
        }

        wavelength.extend(extract_f64_column(batch.column(wl_idx)).context("column 'wavelength'")?);

        let flux_cols = schema
            .fields()
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != wl_idx);
        for ((col_idx, field), row) in flux_cols.zip(flux_rows.iter_mut()) {
            let values = extract_f64_column(batch.column(col_idx))
                .with_context(|| format!("column '{}'", field.name()))?;
            row.extend(values);
        }
    }

    from_columns(wavelength, flux_rows)
}

/// Read a numeric Arrow column as `f64`, rejecting nulls.
fn extract_f64_column(col: &ArrayRef) -> Result<Vec<f64>> {
    if col.null_count() > 0 {
        bail!("null values in numeric column");
    }
    let any = col.as_any();
    if let Some(arr) = any.downcast_ref::<Float64Array>() {
        Ok(arr.values().to_vec())
    } else if let Some(arr) = any.downcast_ref::<Float32Array>() {
        Ok(arr.values().iter().map(|&v| v as f64).collect())
    } else if let Some(arr) = any.downcast_ref::<Int64Array>() {
        Ok(arr.values().iter().map(|&v| v as f64).collect())
    } else if let Some(arr) = any.downcast_ref::<Int32Array>() {
        Ok(arr.values().iter().map(|&v| v as f64).collect())
    } else {
        bail!("Column type is {:?}, expected a numeric type", col.data_type())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};
    use arrow::record_batch::RecordBatch;
    use ndarray::array;
    use parquet::arrow::ArrowWriter;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_text_matrix() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "obs.txt",
            "# reduced spectrum\n3500 1.0 2.0\n\n3502 1.5 2.5\n3504 2.0 3.0\n",
        );
        let spectrum = load_file(&path).unwrap();
        assert_eq!(spectrum.wavelength(), &array![3500.0, 3502.0, 3504.0]);
        assert_eq!(spectrum.flux(), &array![[1.0, 1.5, 2.0], [2.0, 2.5, 3.0]]);
        assert_eq!(spectrum.wavelength_step(), 2.0);
        assert_eq!(spectrum.name(), Some("obs.txt"));
    }

    #[test]
    fn text_rejects_ragged_and_non_numeric_lines() {
        let dir = TempDir::new().unwrap();
        let ragged = write(&dir, "ragged.txt", "1 2 3\n2 3\n");
        let err = load_file(&ragged).unwrap_err();
        assert!(format!("{err:#}").contains("expected 3 columns"));

        let bad = write(&dir, "bad.dat", "1 2\n2 x\n");
        let err = load_file(&bad).unwrap_err();
        assert!(format!("{err:#}").contains("'x' is not a number"));

        let single = write(&dir, "single.txt", "1 2\n");
        assert!(load_file(&single).is_err());
    }

    #[test]
    fn model_header_supplies_ages() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "model.txt", "# 6.6 7.0\n1 0.5 0.6\n2 0.7 0.8\n");
        let model = load_model(&path, Model::DEFAULT_AGE).unwrap();
        assert_eq!(model.ages(), array![6.6, 7.0]);

        let mismatched = write(&dir, "model2.txt", "# 6.6\n1 0.5 0.6\n2 0.7 0.8\n");
        assert!(load_model(&mismatched, Model::DEFAULT_AGE).is_err());
    }

    #[test]
    fn ages_header_may_follow_text_comments() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "titled.txt",
            "# solar metallicity\n# 6.6 7.0\n# 9.9 9.9\n1 0.5 0.6\n# 8.0 8.5\n2 0.7 0.8\n",
        );
        let model = load_model(&path, Model::DEFAULT_AGE).unwrap();
        assert_eq!(model.ages(), array![6.6, 7.0]);
        assert_eq!(model.spectrum.num_wavelengths(), 2);

        let late = write(&dir, "late.txt", "1 0.5 0.6\n# 8.0 8.5\n2 0.7 0.8\n");
        let model = load_model(&late, ParameterGrid::new(8.0, 0.25)).unwrap();
        assert_eq!(model.ages(), array![8.0, 8.25]);
    }

    #[test]
    fn model_text_round_trip() {
        let dir = TempDir::new().unwrap();
        let spectrum = Spectrum::new(array![1.0, 2.0, 3.0], array![[0.5, 0.25, 0.125]]).unwrap();
        let model = Model::new(spectrum, ParameterGrid::new(8.0, 0.5));
        let path = dir.path().join("model.asad");
        write_model_text(&path, &model).unwrap();

        let loaded = load_model(&path, Model::DEFAULT_AGE).unwrap();
        assert_eq!(loaded.ages(), array![8.0]);
        assert_eq!(loaded.spectrum.flux(), model.spectrum.flux());
    }

    #[test]
    fn loads_json() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            "obs.json",
            r#"{"wavelength": [1.0, 2.0], "flux": [[3.0, 4.0], [5.0, 6.0]]}"#,
        );
        let spectrum = load_file(&path).unwrap();
        assert_eq!(spectrum.flux(), &array![[3.0, 4.0], [5.0, 6.0]]);

        let ragged = write(&dir, "ragged.json", r#"{"wavelength": [1.0, 2.0], "flux": [[3.0]]}"#);
        assert!(load_file(&ragged).is_err());
    }

    #[test]
    fn loads_csv() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "obs.csv", "age_a,wavelength,age_b\n1.0,10,2.0\n1.5,20,2.5\n");
        let spectrum = load_file(&path).unwrap();
        assert_eq!(spectrum.wavelength(), &array![10.0, 20.0]);
        assert_eq!(spectrum.flux(), &array![[1.0, 1.5], [2.0, 2.5]]);

        let missing = write(&dir, "missing.csv", "a,b\n1,2\n");
        assert!(load_file(&missing).is_err());
    }

    #[test]
    fn loads_parquet() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.parquet");

        let schema = Arc::new(Schema::new(vec![
            Field::new("wavelength", DataType::Float64, false),
            Field::new("age_6.60", DataType::Float32, false),
            Field::new("age_6.65", DataType::Float64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Float64Array::from(vec![4000.0, 4001.0, 4002.0])),
                Arc::new(Float32Array::from(vec![1.0f32, 2.0, 3.0])),
                Arc::new(Float64Array::from(vec![0.5, 0.25, 0.125])),
            ],
        )
        .unwrap();
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = ArrowWriter::try_new(file, schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let spectrum = load_file(&path).unwrap();
        assert_eq!(spectrum.wavelength(), &array![4000.0, 4001.0, 4002.0]);
        assert_eq!(spectrum.flux(), &array![[1.0, 2.0, 3.0], [0.5, 0.25, 0.125]]);
    }

    #[test]
    fn rejects_unknown_extension() {
        let err = load_file(Path::new("spectrum.fits")).unwrap_err();
        assert!(err.to_string().contains("Unsupported file extension"));
    }
}
