//! Classification loss

use ndarray::{Array1, Array2, Axis};

use crate::error::{Error, Result};

/// Row-wise numerically stable softmax
pub fn softmax(logits: &Array2<f64>) -> Array2<f64> {
    let mut out = logits.clone();
    for mut row in out.rows_mut() {
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

/// Mean cross-entropy over the batch and its gradient w.r.t. the logits
pub fn softmax_cross_entropy(logits: &Array2<f64>, labels: &[usize]) -> Result<(f64, Array2<f64>)> {
    let (n, classes) = logits.dim();
    if labels.len() != n {
        return Err(Error::shape(
            format!("{} labels", n),
            format!("{} labels", labels.len()),
        ));
    }
    if n == 0 {
        return Err(Error::EmptyDataset("empty batch".to_string()));
    }
    if let Some(&bad) = labels.iter().find(|&&l| l >= classes) {
        return Err(Error::shape(format!("label < {}", classes), bad.to_string()));
    }

    let probs = softmax(logits);
    let loss = labels
        .iter()
        .enumerate()
        .map(|(i, &y)| -probs[[i, y]].max(1e-15).ln())
        .sum::<f64>()
        / n as f64;

    let mut grad = probs;
    for (i, &y) in labels.iter().enumerate() {
        grad[[i, y]] -= 1.0;
    }
    grad /= n as f64;

    Ok((loss, grad))
}

/// Argmax class per row
pub fn argmax_rows(scores: &Array2<f64>) -> Vec<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
                    if v > best.1 {
                        (i, v)
                    } else {
                        best
                    }
                })
                .0
        })
        .collect()
}

/// Probability of class `class` for every row
pub fn class_probability(logits: &Array2<f64>, class: usize) -> Array1<f64> {
    softmax(logits).column(class).to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let p = softmax(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]);
        for row in p.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
        assert!(p[[0, 2]] > p[[0, 1]]);
        assert_relative_eq!(p[[1, 0]], 1.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_cross_entropy_value_and_gradient() {
        let logits = array![[0.0, 0.0], [2.0, -1.0]];
        let labels = [1, 0];
        let (loss, grad) = softmax_cross_entropy(&logits, &labels).unwrap();

        let p = 1.0 / (1.0 + (-3.0f64).exp());
        let expected = (2.0f64.ln() - p.ln()) / 2.0;
        assert_relative_eq!(loss, expected, epsilon = 1e-12);

        let h = 1e-6;
        let mut plus = logits.clone();
        plus[[1, 1]] += h;
        let mut minus = logits.clone();
        minus[[1, 1]] -= h;
        let numeric = (softmax_cross_entropy(&plus, &labels).unwrap().0
            - softmax_cross_entropy(&minus, &labels).unwrap().0)
            / (2.0 * h);
        assert_relative_eq!(grad[[1, 1]], numeric, epsilon = 1e-6);
    }

    #[test]
    fn test_cross_entropy_rejects_bad_input() {
        let logits = array![[0.0, 0.0]];
        assert!(softmax_cross_entropy(&logits, &[2]).is_err());
        assert!(softmax_cross_entropy(&logits, &[0, 1]).is_err());
    }

    #[test]
    fn test_argmax_rows() {
        assert_eq!(argmax_rows(&array![[0.1, 0.9], [0.7, 0.3]]), vec![1, 0]);
    }
}
