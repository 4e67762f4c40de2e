//! Order lifecycle enums.
//!
//! Status strings are the ones clients have always displayed ("Order Placed",
//! "Out for delivery", ...), so they serialize verbatim rather than in a
//! case convention.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Fulfillment status of an order.
///
/// Statuses are ordered: an order only ever moves forward through
/// `OrderPlaced -> Packing -> Shipped -> OutForDelivery -> Delivered`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub enum OrderStatus {
    #[default]
    #[serde(rename = "Order Placed")]
    OrderPlaced,
    #[serde(rename = "Packing")]
    Packing,
    #[serde(rename = "Shipped")]
    Shipped,
    #[serde(rename = "Out for delivery")]
    OutForDelivery,
    #[serde(rename = "Delivered")]
    Delivered,
}

/// Outcome of a permitted status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order already has the requested status.
    Unchanged,
    /// The order moves forward to the requested status.
    Advance,
}

/// Errors from parsing or changing an [`OrderStatus`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StatusError {
    /// The string is not one of the known statuses.
    #[error("unknown order status '{0}'")]
    Unknown(String),
    /// The change would move the order backwards.
    #[error("order cannot move from '{from}' back to '{to}'")]
    Backward {
        /// Current status.
        from: OrderStatus,
        /// Requested status.
        to: OrderStatus,
    },
}

impl OrderStatus {
    /// Every status in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::OrderPlaced,
        Self::Packing,
        Self::Shipped,
        Self::OutForDelivery,
        Self::Delivered,
    ];

    /// Display string, identical to the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderPlaced => "Order Placed",
            Self::Packing => "Packing",
            Self::Shipped => "Shipped",
            Self::OutForDelivery => "Out for delivery",
            Self::Delivered => "Delivered",
        }
    }

    /// Whether items of an order in this status may be reviewed.
    #[must_use]
    pub const fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }

    /// Check a requested change against the forward-only lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`StatusError::Backward`] if `next` precedes `self`.
    pub fn transition_to(self, next: Self) -> Result<Transition, StatusError> {
        match self.cmp(&next) {
            core::cmp::Ordering::Equal => Ok(Transition::Unchanged),
            core::cmp::Ordering::Less => Ok(Transition::Advance),
            core::cmp::Ordering::Greater => Err(StatusError::Backward {
                from: self,
                to: next,
            }),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| StatusError::Unknown(s.to_owned()))
    }
}

/// How an order is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// Cash on delivery.
    #[serde(rename = "COD")]
    Cod,
    Stripe,
    Razorpay,
}

impl PaymentMethod {
    /// Serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cod => "COD",
            Self::Stripe => "Stripe",
            Self::Razorpay => "Razorpay",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "COD" => Ok(Self::Cod),
            "Stripe" => Ok(Self::Stripe),
            "Razorpay" => Ok(Self::Razorpay),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Stores an enum as its display string in a TEXT column.
#[cfg(feature = "postgres")]
macro_rules! text_enum_sqlx {
    ($name:ident) => {
        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                Ok(s.parse::<Self>()?)
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.as_str(), buf)
            }
        }
    };
}

#[cfg(feature = "postgres")]
text_enum_sqlx!(OrderStatus);
#[cfg(feature = "postgres")]
text_enum_sqlx!(PaymentMethod);
