//! Stratified, seeded train/test split

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{validate_ratio, Result};

/// Row indices of each side, ascending
#[derive(Debug, Clone, PartialEq)]
pub struct DataSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Split row indices so each label keeps its share on both sides
///
/// Each class sends `round(len * test_ratio)` rows to the test side, but always
/// keeps at least one row for training.
pub fn stratified_split(labels: &[u8], test_ratio: f64, seed: u64) -> Result<DataSplit> {
    validate_ratio("test_ratio", test_ratio)?;

    let mut class0: Vec<usize> = Vec::new();
    let mut class1: Vec<usize> = Vec::new();
    for (i, &label) in labels.iter().enumerate() {
        if label == 0 {
            class0.push(i);
        } else {
            class1.push(i);
        }
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    class0.shuffle(&mut rng);
    class1.shuffle(&mut rng);

    let held_out = |len: usize| -> usize {
        let n = (len as f64 * test_ratio).round() as usize;
        n.min(len.saturating_sub(1))
    };
    let test0 = held_out(class0.len());
    let test1 = held_out(class1.len());

    let mut test: Vec<usize> = class0[..test0]
        .iter()
        .chain(class1[..test1].iter())
        .copied()
        .collect();
    let mut train: Vec<usize> = class0[test0..]
        .iter()
        .chain(class1[test1..].iter())
        .copied()
        .collect();
    test.sort_unstable();
    train.sort_unstable();

    Ok(DataSplit { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize, positive_every: usize) -> Vec<u8> {
        (0..n).map(|i| u8::from(i % positive_every == 0)).collect()
    }

    #[test]
    fn test_stratified_proportions() {
        let y = labels(100, 5);
        let split = stratified_split(&y, 0.2, 42).unwrap();

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_pos = split.test.iter().filter(|&&i| y[i] == 1).count();
        assert_eq!(test_pos, 4);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let y = labels(37, 3);
        let split = stratified_split(&y, 0.3, 7).unwrap();

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let y = labels(50, 4);
        assert_eq!(
            stratified_split(&y, 0.2, 1).unwrap(),
            stratified_split(&y, 0.2, 1).unwrap()
        );
        assert_ne!(
            stratified_split(&y, 0.2, 1).unwrap(),
            stratified_split(&y, 0.2, 2).unwrap()
        );
    }

    #[test]
    fn test_single_member_class_stays_in_training() {
        let y = vec![0, 0, 0, 0, 1];
        let split = stratified_split(&y, 0.9, 3).unwrap();
        assert!(split.train.contains(&4));
    }

    #[test]
    fn test_invalid_ratio() {
        assert!(stratified_split(&[0, 1], 0.0, 1).is_err());
    }
}
