//! Review ratings and the aggregate shown on a product.

use serde::{Deserialize, Serialize};

/// A star rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Rating(u8);

/// The value is outside 1..=5.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("rating must be between {} and {}", Rating::MIN, Rating::MAX)]
pub struct RatingError;

impl Rating {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// # Errors
    ///
    /// Returns [`RatingError`] if `value` is outside 1..=5.
    pub const fn new(value: u8) -> Result<Self, RatingError> {
        if value >= Self::MIN && value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(RatingError)
        }
    }

    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Rating {
    type Error = RatingError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        u8::try_from(value).map_err(|_| RatingError).and_then(Self::new)
    }
}

impl<'de> Deserialize<'de> for Rating {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Aggregate rating of a product.
///
/// Always recomputed from the full list of ratings rather than updated
/// incrementally, so it cannot drift from the reviews it summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSummary {
    /// Arithmetic mean, `0.0` without reviews.
    pub rating: f64,
    pub num_reviews: u32,
}

impl RatingSummary {
    /// Summarize a set of ratings.
    ///
    /// ```
    /// use merkato_core::{Rating, RatingSummary};
    ///
    /// let ratings = [5, 3, 4].map(|r| Rating::new(r).unwrap());
    /// let summary = RatingSummary::from_ratings(ratings);
    /// assert_eq!(summary.rating, 4.0);
    /// assert_eq!(summary.num_reviews, 3);
    /// ```
    pub fn from_ratings<I>(ratings: I) -> Self
    where
        I: IntoIterator<Item = Rating>,
    {
        let (count, sum) = ratings
            .into_iter()
            .fold((0_u32, 0_u32), |(count, sum), rating| {
                (count + 1, sum + u32::from(rating.get()))
            });

        if count == 0 {
            return Self::default();
        }

        Self {
            rating: f64::from(sum) / f64::from(count),
            num_reviews: count,
        }
    }
}
