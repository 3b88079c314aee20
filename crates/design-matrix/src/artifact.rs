//! Design artifacts on disk: parameter YAML, missing-stimulus CSV and the
//! design matrix CSV.
//!
//! The design CSV has the header `listener,sentence,snr,talker,filename`.
//! It is rendered fully in memory before anything touches the file system,
//! so a failed run never leaves a partial table behind.

use std::path::Path;

use anyhow::{Context, Result, bail};
use counterbalance_kernel::{DesignMatrix, DesignParams, MissingStimulus, SnrFormat, Trial};

/// Load design parameters from a YAML file.
pub fn load_params(path: impl AsRef<Path>) -> Result<DesignParams> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read parameter file {}", path.display()))?;
    let params = DesignParams::from_yaml(&text)
        .with_context(|| format!("Failed to parse parameter file {}", path.display()))?;
    Ok(params)
}

/// Load missing-stimulus records (`talker,sentence` header).
pub fn load_missing(path: impl AsRef<Path>) -> Result<Vec<MissingStimulus>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open missing-stimulus file {}", path.display()))?;

    let mut missing = Vec::new();
    for (line, record) in reader.deserialize::<MissingStimulus>().enumerate() {
        let record = record.with_context(|| {
            format!("Bad missing-stimulus record {} in {}", line + 1, path.display())
        })?;
        missing.push(record);
    }
    Ok(missing)
}

/// Render a design matrix as CSV bytes.
pub fn render_design_csv(matrix: &DesignMatrix) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for trial in matrix.trials() {
        writer.serialize(trial)?;
    }
    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush design CSV: {}", e))
}

/// Write a design matrix to `path` in a single write.
pub fn write_design_csv(matrix: &DesignMatrix, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let bytes = render_design_csv(matrix)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write design matrix {}", path.display()))?;
    Ok(())
}

/// Read a design matrix back from CSV.
pub fn read_design_csv(path: impl AsRef<Path>) -> Result<DesignMatrix> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open design matrix {}", path.display()))?;

    let mut trials = Vec::new();
    for (line, record) in reader.deserialize::<Trial>().enumerate() {
        let trial = record
            .with_context(|| format!("Bad design row {} in {}", line + 1, path.display()))?;
        trials.push(trial);
    }
    if trials.is_empty() {
        bail!("Design matrix {} has no trials", path.display());
    }

    let snr_format = infer_snr_format(&trials);
    Ok(DesignMatrix::new(trials, snr_format))
}

/// Decimal when any SNR carries a fractional part, integer otherwise.
pub fn infer_snr_format(trials: &[Trial]) -> SnrFormat {
    if trials.iter().any(|t| t.snr.contains('.')) {
        SnrFormat::Decimal
    } else {
        SnrFormat::Integer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterbalance_kernel::assign::assign_all;

    fn params() -> DesignParams {
        DesignParams {
            snrs: vec![-1.0, 0.0, 1.0],
            talkers: vec!["X".to_string(), "Y".to_string()],
            sentences: ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect(),
            n_listeners: 2,
            block_len: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_header_and_rows() {
        let m = assign_all(&params());
        let text = String::from_utf8(render_design_csv(&m).unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "listener,sentence,snr,talker,filename");
        assert_eq!(lines[1], "0,a,-1.0,X,X_a_-1.0.wav");
        assert_eq!(lines.len(), 9);
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("design-matrix.csv");
        let m = assign_all(&params());

        write_design_csv(&m, &path).unwrap();
        let back = read_design_csv(&path).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn test_integer_format_inferred() {
        let p = DesignParams {
            snr_format: SnrFormat::Integer,
            ..params()
        };
        let m = assign_all(&p);
        assert_eq!(infer_snr_format(m.trials()), SnrFormat::Integer);
    }

    #[test]
    fn test_load_missing_trims_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        std::fs::write(&path, "talker,sentence\nNWF002 , 01-07\nNWM003,02-10\n").unwrap();

        let missing = load_missing(&path).unwrap();
        assert_eq!(
            missing,
            vec![
                MissingStimulus::new("NWF002", "01-07"),
                MissingStimulus::new("NWM003", "02-10"),
            ]
        );
    }

    #[test]
    fn test_load_missing_rejects_bad_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.csv");
        std::fs::write(&path, "speaker,item\nX,a\n").unwrap();
        assert!(load_missing(&path).is_err());
    }

    #[test]
    fn test_load_params_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("params.yaml");
        std::fs::write(&path, "snrs: [1]\n").unwrap();
        let err = format!("{:#}", load_params(&path).unwrap_err());
        assert!(err.contains("params.yaml"), "{}", err);
    }
}
