//! Describing the split of hash power between the two mining pools

use crate::block::Producer;

/// Integer type used to represent hash power, in units of
/// `1 / POWER_TOTAL` of the network.
pub type PowerValue = u32;

/// Hash power of the whole network. The power values of a valid
/// [`PowerSplit`] sum to this total.
pub const POWER_TOTAL: PowerValue = 1000;

/// Determines how hash power is split between the honest and selfish pools
/// during a simulation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PowerSplit {
    /// Both pools get half of the network.
    #[default]
    Equal,
    /// The selfish pool gets the given power, the honest pool the rest.
    Selfish(PowerValue),
    /// Both power values given explicitly.
    Values { honest: PowerValue, selfish: PowerValue },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PowerSplitError {
    #[error("power values sum to {0}, not {POWER_TOTAL}")]
    BadSplitSum(PowerValue),
    #[error("power value {0} exceeds the network total {POWER_TOTAL}")]
    BadPowerValue(PowerValue),
    #[error("the honest pool needs non-zero power for the chain to advance")]
    NoHonestPower,
}

impl PowerSplit {
    /// Returns true if this [`PowerSplit`] describes a valid split.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Checks that this [`PowerSplit`] describes a valid split of
    /// [`POWER_TOTAL`].
    pub fn validate(&self) -> Result<(), PowerSplitError> {
        use PowerSplitError::*;

        let honest = match *self {
            Self::Equal => return Ok(()),
            Self::Selfish(power) => {
                if power > POWER_TOTAL {
                    return Err(BadPowerValue(power));
                }
                POWER_TOTAL - power
            }
            Self::Values { honest, selfish } => {
                if let Some(&val) =
                    [honest, selfish].iter().find(|&&x| x > POWER_TOTAL)
                {
                    return Err(BadPowerValue(val));
                }
                if honest + selfish != POWER_TOTAL {
                    return Err(BadSplitSum(honest + selfish));
                }
                honest
            }
        };

        if honest == 0 {
            return Err(NoHonestPower);
        }

        Ok(())
    }

    /// Returns the power of `producer`. Assumes the split is valid.
    pub fn power_of(&self, producer: Producer) -> PowerValue {
        let (honest, selfish) = self.values();
        match producer {
            Producer::Honest => honest,
            Producer::Selfish => selfish,
        }
    }

    /// Returns the `(honest, selfish)` power values. Assumes the split is
    /// valid.
    pub fn values(&self) -> (PowerValue, PowerValue) {
        match *self {
            Self::Equal => (POWER_TOTAL / 2, POWER_TOTAL - POWER_TOTAL / 2),
            Self::Selfish(power) => (POWER_TOTAL.saturating_sub(power), power),
            Self::Values { honest, selfish } => (honest, selfish),
        }
    }

    /// Fraction of the network held by `producer`.
    pub fn fraction_of(&self, producer: Producer) -> f64 {
        self.power_of(producer) as f64 / POWER_TOTAL as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_split() {
        assert_eq!(PowerSplit::Equal.values(), (500, 500));
        assert!(PowerSplit::Equal.is_valid());
    }

    #[test]
    fn selfish_split_gives_rest_to_honest() {
        let split = PowerSplit::Selfish(350);

        assert_eq!(split.power_of(Producer::Honest), 650);
        assert_eq!(split.power_of(Producer::Selfish), 350);
        assert_eq!(split.fraction_of(Producer::Selfish), 0.35);
        assert!(split.is_valid());
    }

    #[test]
    fn invalid_splits() {
        use PowerSplitError::*;

        assert_eq!(
            PowerSplit::Values { honest: 600, selfish: 300 }.validate(),
            Err(BadSplitSum(900))
        );
        assert_eq!(
            PowerSplit::Values { honest: 1001, selfish: 0 }.validate(),
            Err(BadPowerValue(1001))
        );
        assert_eq!(
            PowerSplit::Selfish(1200).validate(),
            Err(BadPowerValue(1200))
        );
        assert_eq!(PowerSplit::Selfish(1000).validate(), Err(NoHonestPower));
    }
}
