// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Debug;

/// Random source for retry jitter.
///
/// Values come from the operating system's cryptographically secure generator.
#[derive(Clone, Default)]
pub(crate) enum Rnd {
    #[default]
    Real,

    #[cfg(test)]
    Test(std::sync::Arc<dyn Fn() -> Option<f64> + Send + Sync>),
}

impl Debug for Rnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "Real"),
            #[cfg(test)]
            Self::Test(_) => write!(f, "Test"),
        }
    }
}

impl Rnd {
    #[cfg(test)]
    pub fn new_fixed(value: f64) -> Self {
        Self::Test(std::sync::Arc::new(move || Some(value)))
    }

    #[cfg(test)]
    pub fn new_failing() -> Self {
        Self::Test(std::sync::Arc::new(|| None))
    }

    /// Returns a value in `[0, 1]`, or `None` if the random source is unavailable.
    pub fn next_f64(&self) -> Option<f64> {
        match self {
            Self::Real => os_f64(),
            #[cfg(test)]
            Self::Test(generator) => generator(),
        }
    }
}

#[expect(clippy::cast_precision_loss, reason = "only the leading 53 bits are kept, which f64 represents exactly")]
fn os_f64() -> Option<f64> {
    let mut bytes = [0_u8; 8];
    getrandom::getrandom(&mut bytes).ok()?;

    let bits = u64::from_le_bytes(bytes) >> 11;
    Some(bits as f64 / ((1_u64 << 53) - 1) as f64)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn os_values_are_in_unit_range() {
        for _ in 0..1000 {
            let value = Rnd::Real.next_f64().unwrap();
            assert!((0.0..=1.0).contains(&value), "{value}");
        }
    }

    #[test]
    fn fixed_and_failing_sources() {
        assert_eq!(Rnd::new_fixed(0.25).next_f64(), Some(0.25));
        assert_eq!(Rnd::new_failing().next_f64(), None);
        assert_eq!(format!("{:?}", Rnd::new_failing()), "Test");
        assert_eq!(format!("{:?}", Rnd::Real), "Real");
    }
}
