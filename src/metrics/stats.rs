use crate::metrics::Selection;

fn mean<I: Iterator<Item = f64>>(values: I) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation, zero below two values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let average = mean(values.iter().copied());
    let squares: f64 = values.iter().map(|value| (value - average).powi(2)).sum();
    (squares / (values.len() - 1) as f64).sqrt()
}

impl Selection<'_> {
    /// Mean of `true - guess`.
    pub fn bias(&self) -> f64 {
        mean(self.iter().map(|record| record.error()))
    }

    pub fn abs_bias(&self) -> f64 {
        mean(self.iter().map(|record| record.abs_error()))
    }

    pub fn std_error(&self) -> f64 {
        let errors: Vec<f64> = self.iter().map(|record| record.error()).collect();
        sample_std(&errors)
    }

    pub fn std_abs_error(&self) -> f64 {
        let errors: Vec<f64> = self.iter().map(|record| record.abs_error()).collect();
        sample_std(&errors)
    }

    pub fn fraction_correct(&self) -> f64 {
        mean(self.iter().map(|record| if record.correct { 1.0 } else { 0.0 }))
    }

    /// Mean of `|guess - true| / true` over records with a positive true
    /// distance.
    pub fn mean_percent_error(&self) -> f64 {
        mean(
            self.iter()
                .filter(|record| record.true_distance > 0.0)
                .map(|record| record.abs_error() / record.true_distance),
        )
    }

    pub fn mean_stress(&self) -> f64 {
        mean(self.iter().map(|record| record.average_stress))
    }

    /// Share of true contacts (closer than `cutoff`) guessed as further away.
    pub fn p_miss(&self, cutoff: f64) -> f64 {
        let contacts = self.iter().filter(|record| record.true_distance < cutoff).count();
        let missed = self
            .iter()
            .filter(|record| record.true_distance < cutoff && record.guessed_distance > cutoff)
            .count();
        missed as f64 / contacts.max(1) as f64
    }

    /// Share of non-contacts (further than `cutoff`) guessed as closer.
    pub fn p_false_alarm(&self, cutoff: f64) -> f64 {
        let strangers = self.iter().filter(|record| record.true_distance > cutoff).count();
        let alarms = self
            .iter()
            .filter(|record| record.true_distance > cutoff && record.guessed_distance < cutoff)
            .count();
        alarms as f64 / strangers.max(1) as f64
    }

    /// Normalised detection cost with equal miss and false alarm costs.
    pub fn ndcf(&self, cutoff: f64) -> f64 {
        self.p_miss(cutoff) + self.p_false_alarm(cutoff)
    }

    /// Absolute error at quantile `p` (nearest lower rank).
    pub fn q_error(&self, p: f64) -> f64 {
        let mut errors: Vec<f64> = self.iter().map(|record| record.abs_error()).collect();
        if errors.is_empty() {
            return 0.0;
        }

        errors.sort_by(f64::total_cmp);
        let last = errors.len() - 1;
        let index = if p <= 0.0 {
            0
        } else if p >= 1.0 {
            last
        } else {
            ((errors.len() as f64 * p).floor() as usize).min(last)
        };
        errors[index]
    }
}

#[cfg(test)]
mod tests {
    use crate::metrics::tests::record;
    use crate::metrics::{Part, Selection};

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn empty_selection_is_zero() {
        let selection = Selection::default();
        assert_eq!(selection.bias(), 0.0);
        assert_eq!(selection.std_error(), 0.0);
        assert_eq!(selection.ndcf(6.0), 0.0);
        assert_eq!(selection.q_error(0.5), 0.0);
    }

    #[test]
    fn error_statistics() {
        let records = [
            record(2.0, 3.0, Part::InitialGuess),
            record(4.0, 2.0, Part::InitialGuess),
            record(8.0, 5.0, Part::InitialGuess),
            record(10.0, 12.0, Part::InitialGuess),
        ];
        let selection: Selection = records.iter().collect();

        // errors -1, 2, 3, -2
        assert!(approx(selection.bias(), 0.5));
        assert!(approx(selection.abs_bias(), 2.0));
        assert!(approx(selection.std_error(), (17.0f64 / 3.0).sqrt()));
        assert!(approx(selection.std_abs_error(), (2.0f64 / 3.0).sqrt()));
        assert!(approx(selection.fraction_correct(), 0.75));
        assert!(approx(
            selection.mean_percent_error(),
            (0.5 + 0.5 + 0.375 + 0.2) / 4.0
        ));

        assert_eq!(selection.q_error(0.0), 1.0);
        assert_eq!(selection.q_error(0.5), 2.0);
        assert_eq!(selection.q_error(0.75), 3.0);
        assert_eq!(selection.q_error(1.0), 3.0);
    }

    #[test]
    fn detection_cost() {
        let records = [
            record(2.0, 7.0, Part::InitialGuess),
            record(3.0, 4.0, Part::InitialGuess),
            record(9.0, 5.0, Part::InitialGuess),
            record(12.0, 13.0, Part::InitialGuess),
        ];
        let selection: Selection = records.iter().collect();

        assert!(approx(selection.p_miss(6.0), 0.5));
        assert!(approx(selection.p_false_alarm(6.0), 0.5));
        assert!(approx(selection.ndcf(6.0), 1.0));
        assert!(approx(selection.ndcf(3.0), 1.0));
    }
}
