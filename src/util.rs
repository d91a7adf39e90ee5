//! Small numerical utilities shared by the functional accumulators.
use nalgebra::RealField;

/// A compensated (Neumaier-variant Kahan) floating point accumulator.
///
/// Accumulating element contributions with a naive running sum loses low-order
/// bits once the partial sum dwarfs the individual contributions, which shows
/// up as level-dependent drift when the same functional is evaluated across
/// mesh refinement levels. The compensated sum carries the rounding error of
/// every addition in a separate correction term, so the final value is
/// accurate to within a few ulps independently of the number of terms.
#[derive(Debug, Clone)]
pub struct CompensatedSum<T> {
    sum: T,
    compensation: T,
}

impl<T: RealField> CompensatedSum<T> {
    pub fn new() -> Self {
        Self {
            sum: T::zero(),
            compensation: T::zero(),
        }
    }

    /// Adds a single term to the accumulator.
    pub fn add(&mut self, value: T) {
        let naive = self.sum.clone() + value.clone();
        // The summand with the smaller magnitude is the one that loses digits,
        // so recover its rounding error and bank it in the compensation term.
        if self.sum.clone().abs() >= value.clone().abs() {
            self.compensation += (self.sum.clone() - naive.clone()) + value;
        } else {
            self.compensation += (value - naive.clone()) + self.sum.clone();
        }
        self.sum = naive;
    }

    /// The compensated value of the sum.
    pub fn value(&self) -> T {
        self.sum.clone() + self.compensation.clone()
    }
}

impl<T: RealField> Default for CompensatedSum<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Sums the terms of an iterator with compensated summation.
pub fn sum_compensated<T: RealField>(terms: impl IntoIterator<Item = T>) -> T {
    let mut sum = CompensatedSum::new();
    for term in terms {
        sum.add(term);
    }
    sum.value()
}
