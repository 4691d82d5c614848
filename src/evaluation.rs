use std::collections::BTreeMap;
use std::fmt::Display;
use std::iter::zip;

/// Label-wise performance values.
#[derive(Debug, Default)]
struct LabelMeasure {
    /// Number of correct predictions.
    num_correct: usize,
    /// Number of occurrences of the label in the gold-standard data.
    num_observation: usize,
    /// Number of predictions.
    num_prediction: usize,
    precision: f64,
    /// Per-label accuracy: correct predictions over gold occurrences.
    recall: f64,
    fmeasure: f64,
}

/// Accuracy measures over one corpus: token-level and per-label accuracy,
/// with precision/recall/F1 per label and macro averages.
///
/// Labels are keyed by string so the table is independent of any id
/// assignment; the ordered map keeps reports stable across runs.
#[derive(Debug, Default)]
pub struct Evaluation {
    num_labels: usize,
    tbl: BTreeMap<String, LabelMeasure>,

    /// Number of correctly predicted items.
    item_total_correct: usize,
    /// Total number of items.
    item_total_num: usize,

    /// Number of instances predicted entirely correctly.
    inst_total_correct: usize,
    /// Total number of instances.
    inst_total_num: usize,

    macro_precision: f64,
    macro_recall: f64,
    macro_fmeasure: f64,
}

#[derive(Debug)]
pub struct Estimation {
    pub precision: f64,
    pub recall: f64,
}

impl Evaluation {
    pub fn new(num_labels: usize) -> Self {
        Self {
            num_labels,
            ..Default::default()
        }
    }

    /// Folds one decoded instance into the counts. `reference` and
    /// `prediction` must be aligned.
    pub fn accumulate(&mut self, reference: &[&str], prediction: &[&str]) {
        let mut matched = 0;
        for (r, p) in zip(reference, prediction) {
            self.tbl.entry(r.to_string()).or_default().num_observation += 1;
            self.tbl.entry(p.to_string()).or_default().num_prediction += 1;
            if r == p {
                self.tbl.entry(r.to_string()).or_default().num_correct += 1;
                matched += 1;
            }
            self.item_total_num += 1;
        }
        self.item_total_correct += matched;
        if matched == prediction.len() {
            self.inst_total_correct += 1;
        }
        self.inst_total_num += 1;
    }

    /// Fraction of items labeled correctly.
    pub fn token_accuracy(&self) -> f64 {
        if self.item_total_num > 0 {
            self.item_total_correct as f64 / self.item_total_num as f64
        } else {
            0.0
        }
    }

    /// Fraction of instances labeled entirely correctly.
    pub fn sequence_accuracy(&self) -> f64 {
        if self.inst_total_num > 0 {
            self.inst_total_correct as f64 / self.inst_total_num as f64
        } else {
            0.0
        }
    }

    /// Per-label accuracy (recall) for one label, if it was observed.
    pub fn label_accuracy(&self, label: &str) -> Option<f64> {
        self.tbl
            .get(label)
            .filter(|lev| lev.num_observation > 0)
            .map(|lev| lev.num_correct as f64 / lev.num_observation as f64)
    }

    /// Computes the per-label and macro-averaged measures.
    pub fn evaluate(&mut self) -> Estimation {
        self.macro_precision = 0.0;
        self.macro_recall = 0.0;
        self.macro_fmeasure = 0.0;
        for lev in self.tbl.values_mut() {
            lev.precision = 0.0;
            lev.recall = 0.0;
            lev.fmeasure = 0.0;
            if lev.num_prediction > 0 {
                lev.precision = lev.num_correct as f64 / lev.num_prediction as f64;
            }
            if lev.num_observation > 0 {
                lev.recall = lev.num_correct as f64 / lev.num_observation as f64;
            }
            if lev.precision + lev.recall > 0.0 {
                lev.fmeasure = lev.precision * lev.recall * 2.0 / (lev.precision + lev.recall);
            }
            if lev.num_observation > 0 {
                self.macro_precision += lev.precision;
                self.macro_recall += lev.recall;
                self.macro_fmeasure += lev.fmeasure;
            }
        }
        if self.num_labels > 0 {
            self.macro_precision /= self.num_labels as f64;
            self.macro_recall /= self.num_labels as f64;
            self.macro_fmeasure /= self.num_labels as f64;
        }
        Estimation {
            precision: self.macro_precision,
            recall: self.macro_recall,
        }
    }
}

impl Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Performance by label (#match, #model, #ref) (precision, recall, F1):"
        )?;
        for (label, lev) in &self.tbl {
            if lev.num_observation == 0 {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) (******, ******, ******)",
                    label, lev.num_correct, lev.num_prediction, lev.num_observation
                )?;
            } else {
                writeln!(
                    f,
                    "\t{}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})",
                    label,
                    lev.num_correct,
                    lev.num_prediction,
                    lev.num_observation,
                    lev.precision,
                    lev.recall,
                    lev.fmeasure
                )?;
            }
        }
        writeln!(
            f,
            "Macro-average precision, recall, F1: ({:.4}, {:.4}, {:.4})",
            self.macro_precision, self.macro_recall, self.macro_fmeasure
        )?;
        writeln!(
            f,
            "Token accuracy: {}/{} => {:.4}",
            self.item_total_correct,
            self.item_total_num,
            self.token_accuracy()
        )?;
        writeln!(
            f,
            "Sequence accuracy: {}/{} => {:.4}",
            self.inst_total_correct,
            self.inst_total_num,
            self.sequence_accuracy()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_sequence_accuracy() {
        let mut ev = Evaluation::new(2);
        ev.accumulate(&["P", "P", "Q"], &["P", "Q", "Q"]);
        ev.accumulate(&["Q", "Q"], &["Q", "Q"]);
        assert!((ev.token_accuracy() - 4.0 / 5.0).abs() < 1e-12);
        assert!((ev.sequence_accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn per_label_accuracy() {
        let mut ev = Evaluation::new(2);
        ev.accumulate(&["P", "P", "Q", "Q"], &["P", "Q", "Q", "Q"]);
        ev.evaluate();
        assert!((ev.label_accuracy("P").expect("P observed") - 0.5).abs() < 1e-12);
        assert!((ev.label_accuracy("Q").expect("Q observed") - 1.0).abs() < 1e-12);
        assert!(ev.label_accuracy("R").is_none());
    }

    #[test]
    fn macro_averages() {
        let mut ev = Evaluation::new(2);
        ev.accumulate(&["P", "Q"], &["P", "P"]);
        let est = ev.evaluate();
        // P: precision 1/2, recall 1/1; Q: precision 0, recall 0
        assert!((est.precision - 0.25).abs() < 1e-12);
        assert!((est.recall - 0.5).abs() < 1e-12);
    }

    #[test]
    fn empty_evaluation_reports_zero() {
        let mut ev = Evaluation::new(0);
        ev.evaluate();
        assert_eq!(ev.token_accuracy(), 0.0);
        assert_eq!(ev.sequence_accuracy(), 0.0);
    }

    #[test]
    fn report_lists_labels_in_order() {
        let mut ev = Evaluation::new(2);
        ev.accumulate(&["Z", "A"], &["Z", "A"]);
        ev.evaluate();
        let report = ev.to_string();
        let a = report.find("\tA:").expect("A line");
        let z = report.find("\tZ:").expect("Z line");
        assert!(a < z, "{}", report);
    }
}
