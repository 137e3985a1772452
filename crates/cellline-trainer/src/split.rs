//! Seeded train/holdout split.

use cellline_core::model::{seeded_rng, shuffle};
use cellline_core::{CelllineError, Dataset, Result};
use tracing::info;

/// Default fraction of rows used for training.
pub const DEFAULT_TRAIN_RATIO: f64 = 0.7;

/// Row indices of the two partitions, in shuffled order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub holdout: Vec<usize>,
}

/// Shuffles `0..n` with `seed` and cuts at `round(n * ratio)`.
///
/// # Errors
///
/// `CelllineError::Configuration` unless `0 < ratio < 1`.
/// `CelllineError::Data` if either partition would be empty.
pub fn split_indices(n: usize, ratio: f64, seed: u64) -> Result<SplitIndices> {
    if !(ratio > 0.0 && ratio < 1.0) {
        return Err(CelllineError::Configuration(format!(
            "train ratio must lie strictly between 0 and 1, got {ratio}"
        )));
    }
    let train_size = (n as f64 * ratio).round() as usize;
    if train_size == 0 || train_size >= n {
        return Err(CelllineError::Data(format!(
            "{n} rows cannot be split into non-empty train and holdout partitions at ratio {ratio}"
        )));
    }

    let mut order: Vec<usize> = (0..n).collect();
    shuffle(&mut order, &mut seeded_rng(seed));
    let holdout = order.split_off(train_size);
    Ok(SplitIndices {
        train: order,
        holdout,
    })
}

/// The two partitions of a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Dataset,
    pub holdout: Dataset,
}

/// Splits `data` reproducibly; see [`split_indices`].
///
/// # Errors
///
/// As [`split_indices`].
pub fn split(data: &Dataset, ratio: f64, seed: u64) -> Result<Split> {
    let indices = split_indices(data.len(), ratio, seed)?;
    info!(
        train = indices.train.len(),
        holdout = indices.holdout.len(),
        seed,
        "split dataset"
    );
    Ok(Split {
        train: data.subset(&indices.train),
        holdout: data.subset(&indices.holdout),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellline_core::{Attributes, EncodedInstance};

    fn dataset(rows: usize) -> Dataset {
        let attributes = Attributes {
            cardinalities: vec![4, 4, 4],
            num_classes: 3,
        };
        let instances = (0..rows)
            .map(|i| EncodedInstance {
                features: vec![i % 4, (i + 1) % 4, (i + 2) % 4],
                label: Some(1 + i % 2),
            })
            .collect();
        Dataset::new(attributes, instances).unwrap()
    }

    #[test]
    fn ten_rows_split_seven_three() {
        let parts = split(&dataset(10), 0.7, 42).unwrap();
        assert_eq!(parts.train.len(), 7);
        assert_eq!(parts.holdout.len(), 3);
    }

    #[test]
    fn same_seed_same_partitions() {
        let a = split_indices(50, 0.7, 42).unwrap();
        let b = split_indices(50, 0.7, 42).unwrap();
        assert_eq!(a, b);

        let c = split_indices(50, 0.7, 7).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn partitions_cover_every_row_once() {
        let parts = split_indices(23, 0.7, 42).unwrap();
        let mut all: Vec<usize> = parts.train.iter().chain(&parts.holdout).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
        assert_eq!(parts.train.len(), 16);
    }

    #[test]
    fn ratio_must_be_strictly_inside_unit_interval() {
        for ratio in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(matches!(
                split_indices(10, ratio, 42),
                Err(CelllineError::Configuration(_))
            ));
        }
    }

    #[test]
    fn tiny_dataset_is_data_error() {
        assert!(matches!(
            split_indices(1, 0.7, 42),
            Err(CelllineError::Data(_))
        ));
    }
}
