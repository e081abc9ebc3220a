use crate::config::SerializerConfig;
use log::debug;
use thiserror::Error;

/// Largest cell code the vision grid may contain (hazard).
const MAX_CELL_CODE: f64 = 3.0;
/// Printable ASCII domain character codes are clamped into.
const PRINTABLE_MIN: u32 = 32;
const PRINTABLE_MAX: u32 = 126;

/// Fixed-length numeric encoding of an observation.
pub type FeatureVector = Vec<f64>;

#[derive(Error, Debug, PartialEq)]
pub enum SerializeError {
    #[error("Vision row {row} has {found} cells, expected {expected} (grid must be rectangular)")]
    RaggedVision {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Vision cell ({row}, {col}) holds code {code}, expected 0..=3")]
    InvalidCellCode { row: usize, col: usize, code: u8 },
    #[error("{segment} segment has {found} values but capacity is {capacity}")]
    CapacityExceeded {
        segment: &'static str,
        found: usize,
        capacity: usize,
    },
}

/// A single heterogeneous observation made by an agent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub vision: Vec<Vec<u8>>,
    pub text: String,
    pub scalars: Vec<f64>,
}

/// Flattens observations into feature vectors of constant length.
#[derive(Debug, Clone)]
pub struct InputSerializer {
    vision_capacity: usize,
    text_capacity: usize,
    scalar_capacity: usize,
}

impl InputSerializer {
    pub fn new(vision_capacity: usize, text_capacity: usize, scalar_capacity: usize) -> Self {
        Self {
            vision_capacity,
            text_capacity,
            scalar_capacity,
        }
    }

    pub fn from_config(config: &SerializerConfig) -> Self {
        Self::new(
            config.vision_capacity,
            config.text_capacity,
            config.scalar_capacity,
        )
    }

    /// Length of every vector produced by this serializer.
    pub fn feature_len(&self) -> usize {
        self.vision_capacity + self.text_capacity + self.scalar_capacity
    }

    /// Serializes the three observation channels, padding short segments with
    /// zeros and truncating long ones. Never fails.
    pub fn serialize(&self, vision: &[Vec<u8>], text: &str, scalars: &[f64]) -> FeatureVector {
        let mut features = Vec::with_capacity(self.feature_len());

        let vision_cells = vision.iter().flatten().map(|&c| c as f64 / MAX_CELL_CODE);
        Self::fill_segment(&mut features, vision_cells, self.vision_capacity, "vision");

        let text_codes = text.chars().map(normalize_char);
        Self::fill_segment(&mut features, text_codes, self.text_capacity, "text");

        // Scalars are assumed to live in [0, 1] already and are not re-clamped.
        Self::fill_segment(
            &mut features,
            scalars.iter().copied(),
            self.scalar_capacity,
            "scalars",
        );

        features
    }

    pub fn serialize_observation(&self, observation: &Observation) -> FeatureVector {
        self.serialize(&observation.vision, &observation.text, &observation.scalars)
    }

    /// Like [`serialize`](Self::serialize) but rejects input that would be
    /// silently truncated or that is not a well-formed vision grid.
    pub fn serialize_strict(
        &self,
        vision: &[Vec<u8>],
        text: &str,
        scalars: &[f64],
    ) -> Result<FeatureVector, SerializeError> {
        if let Some(first) = vision.first() {
            let expected = first.len();
            for (row, cells) in vision.iter().enumerate() {
                if cells.len() != expected {
                    return Err(SerializeError::RaggedVision {
                        row,
                        expected,
                        found: cells.len(),
                    });
                }
                if let Some((col, &code)) = cells
                    .iter()
                    .enumerate()
                    .find(|(_, c)| **c as f64 > MAX_CELL_CODE)
                {
                    return Err(SerializeError::InvalidCellCode { row, col, code });
                }
            }
        }

        let checks = [
            ("vision", vision.iter().map(Vec::len).sum::<usize>(), self.vision_capacity),
            ("text", text.chars().count(), self.text_capacity),
            ("scalars", scalars.len(), self.scalar_capacity),
        ];
        for (segment, found, capacity) in checks {
            if found > capacity {
                return Err(SerializeError::CapacityExceeded {
                    segment,
                    found,
                    capacity,
                });
            }
        }

        Ok(self.serialize(vision, text, scalars))
    }

    fn fill_segment(
        features: &mut FeatureVector,
        values: impl Iterator<Item = f64>,
        capacity: usize,
        segment: &str,
    ) {
        let start = features.len();
        let mut dropped = 0usize;
        for value in values {
            if features.len() - start < capacity {
                features.push(value);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(
                "Truncated {} trailing value(s) from {} segment (capacity {})",
                dropped, segment, capacity
            );
        }
        features.resize(start + capacity, 0.0);
    }
}

fn normalize_char(c: char) -> f64 {
    let code = (c as u32).clamp(PRINTABLE_MIN, PRINTABLE_MAX);
    (code - PRINTABLE_MIN) as f64 / (PRINTABLE_MAX - PRINTABLE_MIN) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn serializer() -> InputSerializer {
        InputSerializer::new(4, 3, 2)
    }

    #[test]
    fn test_length_is_constant_for_any_shape() {
        let s = serializer();
        let inputs: Vec<(Vec<Vec<u8>>, &str, Vec<f64>)> = vec![
            (vec![], "", vec![]),
            (vec![vec![1]], "a", vec![0.5]),
            (vec![vec![1, 2, 3]; 5], "a very long message", vec![0.1; 10]),
            (vec![vec![0, 1], vec![2]], "hi", vec![]),
        ];
        for (vision, text, scalars) in inputs {
            assert_eq!(s.serialize(&vision, text, &scalars).len(), s.feature_len());
        }
    }

    #[test]
    fn test_empty_inputs_yield_zero_vector() {
        let features = serializer().serialize(&[], "", &[]);
        assert!(features.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_vision_normalized_row_major() {
        let features = serializer().serialize(&[vec![0, 3], vec![1, 2]], "", &[]);
        assert_eq!(&features[..4], &[0.0, 1.0, 1.0 / 3.0, 2.0 / 3.0]);
    }

    #[test]
    fn test_text_clamped_to_printable_ascii() {
        let features = serializer().serialize(&[], " ~\u{7}", &[]);
        assert_eq!(features[4], 0.0);
        assert_eq!(features[5], 1.0);
        // control characters clamp up to the space character
        assert_eq!(features[6], 0.0);

        let unicode = serializer().serialize(&[], "é", &[]);
        assert_eq!(unicode[4], 1.0);
    }

    #[test]
    fn test_scalars_pass_through_unclamped() {
        let features = serializer().serialize(&[], "", &[1.5, -0.25]);
        assert_eq!(&features[7..], &[1.5, -0.25]);
    }

    #[test]
    fn test_truncation_keeps_leading_values() {
        let features = serializer().serialize(&[vec![3, 3, 3, 3, 0, 0]], "abcdef", &[0.1, 0.2, 0.3]);
        assert_eq!(&features[..4], &[1.0; 4]);
        assert_eq!(features[4], normalize_char('a'));
        assert_eq!(features[6], normalize_char('c'));
        assert_eq!(&features[7..], &[0.1, 0.2]);
    }

    #[test]
    fn test_strict_rejects_ragged_vision() {
        let result = serializer().serialize_strict(&[vec![0, 1], vec![2]], "", &[]);
        assert_eq!(
            result,
            Err(SerializeError::RaggedVision {
                row: 1,
                expected: 2,
                found: 1
            })
        );
    }

    #[test]
    fn test_strict_rejects_unknown_cell_code() {
        let result = serializer().serialize_strict(&[vec![0, 7]], "", &[]);
        assert_eq!(
            result,
            Err(SerializeError::InvalidCellCode {
                row: 0,
                col: 1,
                code: 7
            })
        );
    }

    #[test]
    fn test_strict_rejects_overflow_and_accepts_fitting_input() {
        let s = serializer();
        assert!(matches!(
            s.serialize_strict(&[], "toolong", &[]),
            Err(SerializeError::CapacityExceeded { segment: "text", .. })
        ));
        let ok = s.serialize_strict(&[vec![1, 2]], "ab", &[0.5]).unwrap();
        assert_eq!(ok, s.serialize(&[vec![1, 2]], "ab", &[0.5]));
    }
}
