use {
    super::error::PipelineError,
    rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive},
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Amount in minor units (centavos). Everything crossing the gateway or
/// attribution boundary is expressed in this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(0);

    pub fn new(cents: i64) -> Result<Self, PipelineError> {
        if cents < 0 {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    /// Major units (reais) to minor units, rounding half away from zero.
    /// This is the only place a decimal amount becomes an integer.
    pub fn from_major(amount: Decimal) -> Result<Self, PipelineError> {
        let cents = amount
            .checked_mul(Decimal::ONE_HUNDRED)
            .map(|v| v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
            .and_then(|v| v.to_i64())
            .ok_or_else(|| {
                PipelineError::Validation(format!("amount out of range: {amount}"))
            })?;
        Self::new(cents)
    }

    pub fn to_major(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the gateway fee reported to the attribution sink is estimated.
/// The provider's settlement fee is never consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeePolicy {
    basis_points: u32,
}

impl FeePolicy {
    pub const ZERO: FeePolicy = FeePolicy { basis_points: 0 };

    pub fn from_basis_points(basis_points: u32) -> Result<Self, PipelineError> {
        if basis_points > 10_000 {
            return Err(PipelineError::Validation(format!(
                "fee basis points must be <= 10000, got: {basis_points}"
            )));
        }
        Ok(Self { basis_points })
    }

    /// Fee for `total`, rounded half up to the nearest centavo, never above `total`.
    pub fn fee_for(&self, total: MoneyAmount) -> MoneyAmount {
        let scaled = i128::from(total.cents()) * i128::from(self.basis_points);
        let fee = ((scaled + 5_000) / 10_000) as i64;
        MoneyAmount(fee.min(total.cents()))
    }
}
