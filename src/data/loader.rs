//! CSV loading and saving of jet datasets
//!
//! One jet per row, no header:
//! `label, pt_0, y_0, phi_0, pid_0, pt_1, y_1, phi_1, pid_1, ...`
//!
//! Rows may have different lengths; short rows are padded with zero
//! particles up to the longest row in the file.

use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};
use tracing::{debug, info};

use super::jet::{Jet, Label, Particle, PARTICLE_FEATURES};
use crate::error::{Error, Result};

/// Reads and writes jet datasets
pub struct JetLoader;

impl JetLoader {
    /// Load up to `max_jets` jets from a CSV file
    pub fn load_csv<P: AsRef<Path>>(path: P, max_jets: Option<usize>) -> Result<Vec<Jet>> {
        let path = path.as_ref();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut jets = Vec::new();
        let mut max_slots = 0usize;

        for (row, record) in reader.records().enumerate() {
            if max_jets.is_some_and(|limit| jets.len() >= limit) {
                break;
            }
            let line = row + 1;
            let record = record?;
            let fields: Vec<&str> = record.iter().collect();
            // Trailing commas are allowed, gaps inside a row are not
            let used = fields
                .iter()
                .rposition(|field| !field.is_empty())
                .map_or(0, |last| last + 1);
            let values = fields[..used]
                .iter()
                .enumerate()
                .map(|(column, field)| {
                    if field.is_empty() {
                        return Err(Error::InvalidData {
                            line,
                            message: format!("empty field in column {}", column + 1),
                        });
                    }
                    field.parse::<f64>().map_err(|e| Error::InvalidData {
                        line,
                        message: format!("'{}' is not a number: {}", field, e),
                    })
                })
                .collect::<Result<Vec<f64>>>()?;

            let jet = Self::parse_row(&values, line)?;
            max_slots = max_slots.max(jet.len());
            jets.push(jet);
        }

        let jets: Vec<Jet> = jets.into_iter().map(|j| j.padded_to(max_slots)).collect();
        info!(
            "Loaded {} jets with {} particle slots from {}",
            jets.len(),
            max_slots,
            path.display()
        );
        Ok(jets)
    }

    /// Parse one row (label followed by flattened particles)
    pub fn parse_row(values: &[f64], line: usize) -> Result<Jet> {
        let (&label_value, features) = values.split_first().ok_or(Error::InvalidData {
            line,
            message: "empty row".to_string(),
        })?;

        let label = Label::from_value(label_value).ok_or_else(|| Error::InvalidData {
            line,
            message: format!("label must be 0 or 1, got {}", label_value),
        })?;

        if features.len() % PARTICLE_FEATURES != 0 {
            return Err(Error::InvalidData {
                line,
                message: format!(
                    "{} feature values is not a multiple of {}",
                    features.len(),
                    PARTICLE_FEATURES
                ),
            });
        }

        let particles = features
            .chunks_exact(PARTICLE_FEATURES)
            .map(|c| Particle::new(c[0], c[1], c[2], c[3]))
            .collect();

        Ok(Jet::new(particles, label))
    }

    /// Write jets in the same layout `load_csv` reads
    pub fn save_csv<P: AsRef<Path>>(path: P, jets: &[Jet]) -> Result<()> {
        let path = path.as_ref();
        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        for jet in jets {
            let mut row = Vec::with_capacity(1 + jet.len() * PARTICLE_FEATURES);
            row.push(jet.label.index().to_string());
            for particle in &jet.particles {
                row.extend(particle.to_array().iter().map(|v| v.to_string()));
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        debug!("Wrote {} jets to {}", jets.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_row() {
        let jet = JetLoader::parse_row(&[1.0, 10.0, 0.1, 0.2, 211.0, 0.0, 0.0, 0.0, 0.0], 1).unwrap();
        assert_eq!(jet.label, Label::Quark);
        assert_eq!(jet.len(), 2);
        assert_eq!(jet.multiplicity(1e-8), 1);
    }

    #[test]
    fn test_parse_row_rejects_partial_particle() {
        let err = JetLoader::parse_row(&[0.0, 1.0, 2.0, 3.0], 7).unwrap_err();
        match err {
            Error::InvalidData { line, .. } => assert_eq!(line, 7),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_row_rejects_bad_label() {
        assert!(JetLoader::parse_row(&[2.0, 1.0, 2.0, 3.0, 4.0], 1).is_err());
        assert!(JetLoader::parse_row(&[], 1).is_err());
    }

    #[test]
    fn test_ragged_rows_are_padded() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1, 10.0, 0.1, 0.2, 211.0").unwrap();
        writeln!(file, "0, 5.0, 0.1, 0.2, 22.0, 4.0, -0.1, 0.3, 130.0").unwrap();
        writeln!(file, "0, 3.0, 0.0, 0.0, 22.0").unwrap();

        let jets = JetLoader::load_csv(file.path(), None).unwrap();
        assert_eq!(jets.len(), 3);
        assert!(jets.iter().all(|j| j.len() == 2));
        assert_eq!(jets[0].multiplicity(1e-8), 1);

        let limited = JetLoader::load_csv(file.path(), Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
    }

    #[test]
    fn test_trailing_empty_fields_are_ignored() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1, 10.0, 0.1, 0.2, 211.0,,").unwrap();
        writeln!(file, "0, 5.0, 0.1, 0.2, 22.0, 4.0, -0.1, 0.3, 130.0").unwrap();

        let jets = JetLoader::load_csv(file.path(), None).unwrap();
        assert_eq!(jets.len(), 2);
        assert_eq!(jets[0].multiplicity(1e-8), 1);
        assert_eq!(jets[0].particles[0], Particle::new(10.0, 0.1, 0.2, 211.0));
    }

    #[test]
    fn test_interior_empty_field_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "1, 10.0, 0.1, 0.2, 211.0").unwrap();
        // Four values remain after the gap, so dropping it would still parse
        writeln!(file, "0, 5.0, , 0.1, 0.2, 22.0").unwrap();

        match JetLoader::load_csv(file.path(), None).unwrap_err() {
            Error::InvalidData { line, message } => {
                assert_eq!(line, 2);
                assert!(message.contains("column 3"), "{message}");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_then_load() {
        let jets = vec![
            Jet::new(vec![Particle::new(12.5, 0.25, -1.5, -211.0)], Label::Gluon),
            Jet::new(vec![Particle::new(7.0, 0.5, 0.5, 22.0)], Label::Quark),
        ];
        let file = NamedTempFile::new().unwrap();
        JetLoader::save_csv(file.path(), &jets).unwrap();

        let loaded = JetLoader::load_csv(file.path(), None).unwrap();
        assert_eq!(loaded, jets);
    }
}
