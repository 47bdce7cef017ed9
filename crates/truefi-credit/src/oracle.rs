//! Time-averaged base rate oracle
//!
//! Samples a spot lending rate at most once per cooldown and keeps a running
//! integral of `rate * seconds` in a circular buffer. Averages over the last
//! `n` samples are the integral difference divided by the elapsed time.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use truefi_common::math::{self, BASIS_POINTS};
use truefi_common::{
    Address, ArithmeticError, Clock, EventBus, PriceOracle, ProtocolEvent, Result, TrueFiError,
    DAY,
};

/// Default buffer capacity: one year of daily samples plus the seed
pub const MAX_BUFFER_SIZE: usize = 366;

/// Oracle parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub buffer_size: usize,
    /// Minimum seconds between samples
    pub cooldown_time: u64,
    /// Spot-rate value that stands for 100% (10000 when the feed reports bp)
    pub spot_rate_scale: u128,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            buffer_size: MAX_BUFFER_SIZE,
            cooldown_time: DAY,
            spot_rate_scale: BASIS_POINTS,
        }
    }
}

impl OracleSettings {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < 2 {
            return Err(TrueFiError::InvalidArgument(format!(
                "oracle buffer size {} is below 2",
                self.buffer_size
            )));
        }
        if self.spot_rate_scale == 0 {
            return Err(TrueFiError::InvalidArgument("spot rate scale is zero".to_string()));
        }
        Ok(())
    }
}

/// Source of a pool's secured (base) rate
pub trait BaseRateOracle: Send + Sync {
    /// Average rate over the last week, in bp
    fn weekly_apy(&self) -> Result<u128>;
}

/// One buffer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSample {
    pub running_total: u128,
    pub timestamp: u64,
}

#[derive(Debug)]
struct RateBuffer {
    samples: Vec<RateSample>,
    curr_index: usize,
    /// Samples ever written, seed included
    recorded: u64,
}

/// Windowed average over periodic spot-rate samples
pub struct TimeAveragedRateOracle {
    asset: Address,
    spot: Arc<dyn PriceOracle>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    settings: OracleSettings,
    buffer: RwLock<RateBuffer>,
}

impl TimeAveragedRateOracle {
    /// Create the oracle and write the seed sample `(0, now)`
    pub fn new(
        asset: Address,
        spot: Arc<dyn PriceOracle>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
        settings: OracleSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let mut samples = vec![
            RateSample {
                running_total: 0,
                timestamp: 0,
            };
            settings.buffer_size
        ];
        samples[0].timestamp = clock.now();

        Ok(Self {
            asset,
            spot,
            clock,
            events,
            settings,
            buffer: RwLock::new(RateBuffer {
                samples,
                curr_index: 0,
                recorded: 1,
            }),
        })
    }

    pub fn asset(&self) -> Address {
        self.asset
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    pub fn buffer_size(&self) -> usize {
        self.settings.buffer_size
    }

    pub fn is_off_cooldown(&self) -> bool {
        let buffer = self.buffer.read();
        let last = buffer.samples[buffer.curr_index].timestamp;
        self.clock.now() >= last.saturating_add(self.settings.cooldown_time)
    }

    /// Record a new sample from the spot feed
    #[instrument(skip(self), fields(asset = %self.asset.short()))]
    pub fn update(&self) -> Result<()> {
        let now = self.clock.now();
        let mut buffer = self.buffer.write();

        let prev = buffer.samples[buffer.curr_index];
        let ready_at = prev.timestamp.saturating_add(self.settings.cooldown_time);
        // the seed sample alone never blocks the first update
        if buffer.recorded > 1 && now < ready_at {
            return Err(TrueFiError::CooldownActive { ready_at, now });
        }

        let spot_rate = self.spot.spot_rate(&self.asset)?;
        let elapsed = now.saturating_sub(prev.timestamp) as u128;
        let running_total = math::add(
            prev.running_total,
            spot_rate.checked_mul(elapsed).ok_or(ArithmeticError::Overflow)?,
        )?;

        let next = (buffer.curr_index + 1) % self.settings.buffer_size;
        buffer.samples[next] = RateSample {
            running_total,
            timestamp: now,
        };
        buffer.curr_index = next;
        buffer.recorded += 1;
        drop(buffer);

        debug!(spot_rate, running_total, index = next, "rate sample recorded");
        self.events.publish(ProtocolEvent::RateOracleUpdated {
            asset: self.asset,
            index: next,
            running_total,
            timestamp: now,
        });
        Ok(())
    }

    /// Average rate over the last `number_of_values` samples, in bp
    pub fn calculate_average_apy(&self, number_of_values: usize) -> Result<u128> {
        if number_of_values == 0 || number_of_values >= self.settings.buffer_size {
            return Err(TrueFiError::InvalidArgument(format!(
                "number of values must be in 1..{}, got {}",
                self.settings.buffer_size, number_of_values
            )));
        }

        let buffer = self.buffer.read();
        let required = number_of_values as u64 + 1;
        if buffer.recorded < required {
            return Err(TrueFiError::NotReady {
                required,
                recorded: buffer.recorded,
            });
        }

        let size = self.settings.buffer_size;
        let curr = buffer.samples[buffer.curr_index];
        let past = buffer.samples[(buffer.curr_index + size - number_of_values) % size];

        let total_diff = math::sub(curr.running_total, past.running_total)?;
        let time_diff = (curr.timestamp - past.timestamp) as u128;
        if time_diff == 0 {
            return Err(ArithmeticError::DivisionByZero.into());
        }

        let denominator = time_diff
            .checked_mul(self.settings.spot_rate_scale)
            .ok_or(ArithmeticError::Overflow)?;
        Ok(math::mul_div(total_diff, BASIS_POINTS, denominator)?)
    }

    pub fn weekly_apy(&self) -> Result<u128> {
        self.calculate_average_apy(7)
    }

    pub fn monthly_apy(&self) -> Result<u128> {
        self.calculate_average_apy(30)
    }

    pub fn yearly_apy(&self) -> Result<u128> {
        self.calculate_average_apy(365)
    }

    /// Buffer contents in slot order
    pub fn buffer(&self) -> (Vec<RateSample>, usize) {
        let buffer = self.buffer.read();
        (buffer.samples.clone(), buffer.curr_index)
    }

    pub fn recorded(&self) -> u64 {
        self.buffer.read().recorded
    }
}

impl BaseRateOracle for TimeAveragedRateOracle {
    fn weekly_apy(&self) -> Result<u128> {
        TimeAveragedRateOracle::weekly_apy(self)
    }
}
