/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 16/10/26
******************************************************************************/

//! Number patterns and display formatting.
//!
//! A "golden" number is one that satisfies an aesthetic rule such as being a
//! round hundred. [`GoldenCriteria`] is a set of built-in rules; a number is
//! golden when it matches any rule in the set. [`GoldenFilter`] additionally
//! accepts an arbitrary caller predicate.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Built-in golden-number rules. Combine with `|`; a number matches the
    /// set when it matches at least one rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct GoldenCriteria: u32 {
        /// Multiples of 100 (`1200`, `45600`).
        const ROUND_HUNDRED = 1 << 0;
        /// Multiples of 1000.
        const ROUND_THOUSAND = 1 << 1;
        /// At least two digits, all identical (`77`, `5555`).
        const REPEATED_DIGITS = 1 << 2;
        /// At least three digits reading the same both ways (`12321`).
        const PALINDROME = 1 << 3;
        /// At least three digits, each one greater than the previous by one (`3456`).
        const ASCENDING_RUN = 1 << 4;
    }
}

impl Default for GoldenCriteria {
    fn default() -> Self {
        Self::ROUND_HUNDRED
    }
}

impl GoldenCriteria {
    /// Returns `true` if `number` satisfies any rule in the set.
    ///
    /// # Examples
    ///
    /// ```
    /// use docnum_rs::numbering::GoldenCriteria;
    ///
    /// assert!(GoldenCriteria::ROUND_HUNDRED.matches(4_500));
    /// assert!(!GoldenCriteria::ROUND_HUNDRED.matches(4_501));
    /// assert!(GoldenCriteria::REPEATED_DIGITS.matches(777));
    /// ```
    #[must_use]
    pub fn matches(&self, number: u64) -> bool {
        if number == 0 {
            return false;
        }
        if self.contains(Self::ROUND_HUNDRED) && number % 100 == 0 {
            return true;
        }
        if self.contains(Self::ROUND_THOUSAND) && number % 1_000 == 0 {
            return true;
        }

        let digits = digits_of(number);
        if self.contains(Self::REPEATED_DIGITS)
            && digits.len() >= 2
            && digits.iter().all(|d| *d == digits[0])
        {
            return true;
        }
        if self.contains(Self::PALINDROME)
            && digits.len() >= 3
            && digits.iter().eq(digits.iter().rev())
        {
            return true;
        }
        self.contains(Self::ASCENDING_RUN)
            && digits.len() >= 3
            && digits.windows(2).all(|w| w[1] == w[0] + 1)
    }
}

fn digits_of(mut number: u64) -> Vec<u8> {
    let mut digits = Vec::with_capacity(20);
    while number > 0 {
        digits.push((number % 10) as u8);
        number /= 10;
    }
    digits.reverse();
    digits
}

/// Predicate type accepted by [`GoldenFilter::custom`].
pub type GoldenPredicate = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// Caller-supplied selection rule for golden allocation.
#[derive(Clone)]
pub enum GoldenFilter {
    /// One or more built-in rules.
    Criteria(GoldenCriteria),
    /// An arbitrary predicate.
    Custom(GoldenPredicate),
}

impl GoldenFilter {
    /// Wraps an arbitrary predicate.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(u64) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    /// Returns `true` if `number` is selected by the filter.
    #[inline]
    #[must_use]
    pub fn matches(&self, number: u64) -> bool {
        match self {
            Self::Criteria(criteria) => criteria.matches(number),
            Self::Custom(predicate) => predicate(number),
        }
    }
}

impl From<GoldenCriteria> for GoldenFilter {
    fn from(value: GoldenCriteria) -> Self {
        Self::Criteria(value)
    }
}

impl fmt::Debug for GoldenFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Criteria(criteria) => f.debug_tuple("Criteria").field(criteria).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Formats a number the way it is printed on documents: `PREFIX-000123`.
///
/// # Examples
///
/// ```
/// use docnum_rs::numbering::format_doc_no;
///
/// assert_eq!(format_doc_no("УТЗ", 6, 42), "УТЗ-000042");
/// assert_eq!(format_doc_no("DOC", 3, 12345), "DOC-12345");
/// ```
#[must_use]
pub fn format_doc_no(prefix: &str, width: usize, number: u64) -> String {
    format!("{prefix}-{number:0width$}")
}
