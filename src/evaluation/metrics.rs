//! Held-out evaluation metrics
//!
//! Confusion-matrix derived accuracy and per-class precision, recall and F1.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Binary confusion matrix; class 1 is a referral
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_count: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[u8], labels: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&pred, &label) in predictions.iter().zip(labels) {
            match (pred, label) {
                (1, 1) => matrix.tp += 1,
                (1, 0) => matrix.fp += 1,
                (0, 0) => matrix.tn += 1,
                (0, 1) => matrix.fn_count += 1,
                _ => {}
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_count
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    /// Precision, recall, F1 and support of one class
    pub fn class_metrics(&self, class: u8) -> ClassMetrics {
        // for class 0 the roles of positives and negatives swap
        let (hit, false_alarm, miss) = if class == 1 {
            (self.tp, self.fp, self.fn_count)
        } else {
            (self.tn, self.fn_count, self.fp)
        };

        let precision = ratio(hit, hit + false_alarm);
        let recall = ratio(hit, hit + miss);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        ClassMetrics {
            class,
            precision,
            recall,
            f1,
            support: hit + miss,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: u8,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Training-run evaluation, persisted alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub train_size: usize,
    pub test_size: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    /// Accuracy of always predicting the training majority class
    pub baseline_accuracy: f64,
    pub confusion: ConfusionMatrix,
    pub classes: Vec<ClassMetrics>,
}

impl EvaluationReport {
    pub fn evaluate(
        train_labels: &[u8],
        train_predictions: &[u8],
        test_labels: &[u8],
        test_predictions: &[u8],
    ) -> Self {
        let train_accuracy = ConfusionMatrix::from_predictions(train_predictions, train_labels).accuracy();
        let confusion = ConfusionMatrix::from_predictions(test_predictions, test_labels);

        let train_positive = train_labels.iter().filter(|&&y| y == 1).count();
        let majority = u8::from(2 * train_positive > train_labels.len());
        let baseline_hits = test_labels.iter().filter(|&&y| y == majority).count();

        Self {
            train_size: train_labels.len(),
            test_size: test_labels.len(),
            train_accuracy,
            test_accuracy: confusion.accuracy(),
            baseline_accuracy: ratio(baseline_hits, test_labels.len()),
            confusion,
            classes: vec![confusion.class_metrics(0), confusion.class_metrics(1)],
        }
    }

    pub fn beats_baseline(&self) -> bool {
        self.test_accuracy >= self.baseline_accuracy
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "EVALUATION REPORT")?;
        writeln!(f, "{}", "=".repeat(60))?;
        writeln!(f, "Train rows: {}", self.train_size)?;
        writeln!(f, "Test rows: {}", self.test_size)?;
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(f, "Train accuracy: {:.1}%", self.train_accuracy * 100.0)?;
        writeln!(f, "Test accuracy: {:.1}%", self.test_accuracy * 100.0)?;
        writeln!(f, "Majority baseline: {:.1}%", self.baseline_accuracy * 100.0)?;
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(f, "{:>8} {:>10} {:>10} {:>10} {:>8}", "class", "precision", "recall", "f1", "support")?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>8} {:>10.3} {:>10.3} {:>10.3} {:>8}",
                c.class, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f, "{}", "-".repeat(60))?;
        writeln!(
            f,
            "Confusion: tn={} fp={} fn={} tp={}",
            self.confusion.tn, self.confusion.fp, self.confusion.fn_count, self.confusion.tp
        )?;
        write!(f, "{}", "=".repeat(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confusion_counts() {
        let m = ConfusionMatrix::from_predictions(&[1, 1, 0, 0, 1], &[1, 0, 0, 1, 1]);
        assert_eq!(m, ConfusionMatrix { tp: 2, fp: 1, tn: 1, fn_count: 1 });
        assert!((m.accuracy() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_class_metrics() {
        let m = ConfusionMatrix { tp: 2, fp: 1, tn: 1, fn_count: 1 };

        let positive = m.class_metrics(1);
        assert!((positive.precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((positive.recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(positive.support, 3);

        let negative = m.class_metrics(0);
        assert!((negative.precision - 0.5).abs() < 1e-12);
        assert!((negative.recall - 0.5).abs() < 1e-12);
        assert_eq!(negative.support, 2);
    }

    #[test]
    fn test_empty_metrics_are_zero() {
        let m = ConfusionMatrix::default();
        assert_eq!(m.accuracy(), 0.0);
        assert_eq!(m.class_metrics(1).f1, 0.0);
    }

    #[test]
    fn test_report_baseline() {
        let train = [0, 0, 0, 1];
        let test = [0, 0, 0, 0, 1];
        let report = EvaluationReport::evaluate(&train, &train, &test, &[0, 0, 0, 0, 1]);

        assert!((report.baseline_accuracy - 0.8).abs() < 1e-12);
        assert!((report.test_accuracy - 1.0).abs() < 1e-12);
        assert!(report.beats_baseline());
        assert_eq!(report.classes.len(), 2);

        let text = report.to_string();
        assert!(text.contains("Test accuracy: 100.0%"));
        assert!(text.contains("Majority baseline: 80.0%"));
    }
}
