use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use crate::domain::optimization::hyperparameter::{Dna, HyperparameterSpace};

/// Append-only CSV writer for one optimization study (spec §6:
/// `storage/optimize/csv/{study_name}.csv`, header
/// `<hp1>;<hp2>;…;score`, `;`-separated, `nan` for an unscored row).
/// One writer per coordinator; workers never write it directly.
pub struct StudyWriter {
    path: PathBuf,
    header_names: Vec<String>,
}

impl StudyWriter {
    pub fn new(output_dir: impl AsRef<Path>, study_name: &str, space: &HyperparameterSpace) -> Self {
        let path = output_dir.as_ref().join(format!("{study_name}.csv"));
        let header_names = space.params().iter().map(|p| p.name.clone()).collect();
        Self { path, header_names }
    }

    /// Appends one `(dna, score)` row, writing the header first if the
    /// file is new. Columns hold the *decoded* hyperparameter values
    /// (matching the original Python `parameter_dict` rows, not the raw
    /// gene indices) so the CSV is directly readable by a human or a
    /// reporting consumer. `score` of `NaN` (rejected hyperparameters, a
    /// faulted simulation, or an expired per-task timeout) is written as
    /// `nan` literally, matching the wire format. A `dna` that fails to
    /// decode against this study's space (stale/foreign DNA) is skipped
    /// with a logged warning rather than corrupting the row shape.
    pub fn append(&self, space: &HyperparameterSpace, dna: &Dna, score: f64) {
        let file_exists = self.path.exists();
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(error = %e, path = %self.path.display(), "failed to create study output directory");
                return;
            }
        }

        let values = match space.decode(dna) {
            Ok(values) => values,
            Err(e) => {
                tracing::warn!(error = %e, dna = %dna.encode(), "dropping study row for undecodable dna");
                return;
            }
        };

        let file = OpenOptions::new().create(true).append(true).open(&self.path);
        match file {
            Ok(f) => {
                let mut wtr = csv::WriterBuilder::new()
                    .delimiter(b';')
                    .has_headers(false)
                    .from_writer(f);

                if !file_exists {
                    let mut headers = self.header_names.clone();
                    headers.push("score".to_string());
                    if let Err(e) = wtr.write_record(&headers) {
                        tracing::error!(error = %e, "failed to write study CSV headers");
                    }
                }

                let mut record: Vec<String> = values.into_iter().map(|(_, v)| v.to_string()).collect();
                record.push(if score.is_nan() { "nan".to_string() } else { score.to_string() });
                if let Err(e) = wtr.write_record(&record) {
                    tracing::error!(error = %e, "failed to write study CSV row");
                }
                if let Err(e) = wtr.flush() {
                    tracing::error!(error = %e, "failed to flush study CSV writer");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, path = %self.path.display(), "failed to open study CSV file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::optimization::hyperparameter::Hyperparameter;

    #[test]
    fn append_writes_header_once_then_rows() {
        let dir = tempdir();
        let space = HyperparameterSpace::new(vec![Hyperparameter::new("fast_sma", vec![10.0, 20.0])]).unwrap();
        let writer = StudyWriter::new(&dir, "demo_study", &space);

        writer.append(&space, &Dna::from_genes(vec![0]), 0.42);
        writer.append(&space, &Dna::from_genes(vec![1]), f64::NAN);

        let contents = std::fs::read_to_string(dir.join("demo_study.csv")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next().unwrap(), "fast_sma;score");
        assert_eq!(lines.next().unwrap(), "10;0.42");
        assert_eq!(lines.next().unwrap(), "20;nan");

        std::fs::remove_dir_all(&dir).ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("backtest_core_study_test_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
