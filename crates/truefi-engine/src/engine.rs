//! Engine wiring
//!
//! [`Engine::bootstrap`] builds every protocol service around one clock and
//! one event bus. The lending agency is the lender and liquidator of every
//! loan the factory creates and the only locker on the borrowing mutex.

use std::sync::Arc;

use tracing::info;

use truefi_common::{
    Address, Clock, CreditOracle, EventBus, LiquidityPool, PriceOracle, Result, RewardDistributor,
    StakingVault, TokenLedger,
};
use truefi_credit::{BaseRateOracle, CollateralAsset, CreditModel, TimeAveragedRateOracle};
use truefi_lending::{FeeSwapper, LendingAgency, LendingCollaborators, LendingRoles};
use truefi_loans::{BorrowingMutex, LoanFactory, PoolRegistry};
use truefi_rating::{RatingAgency, RatingCollaborators};

use crate::config::EngineConfig;

/// Accounts holding protocol roles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineAccounts {
    /// Administrator of every service
    pub owner: Address,
    pub liquidator: Address,
    pub recovery: Address,
    pub stakers: Address,
}

impl EngineAccounts {
    pub fn from_owner(owner: Address) -> Self {
        Self {
            owner,
            liquidator: owner,
            recovery: Address::derive(&owner, 1),
            stakers: Address::derive(&owner, 2),
        }
    }
}

/// Outside world the engine runs against
pub struct EngineCollaborators {
    pub clock: Arc<dyn Clock>,
    pub stake_token: Arc<dyn TokenLedger>,
    /// Price oracle id of the stake token
    pub stake_asset: Address,
    pub reward_token: Arc<dyn TokenLedger>,
    pub distributor: Arc<dyn RewardDistributor>,
    pub price_oracle: Arc<dyn PriceOracle>,
    pub credit_oracle: Arc<dyn CreditOracle>,
    pub staking: Arc<dyn StakingVault>,
    pub swapper: Arc<dyn FeeSwapper>,
}

pub struct Engine {
    pub config: EngineConfig,
    pub accounts: EngineAccounts,
    pub clock: Arc<dyn Clock>,
    pub events: Arc<EventBus>,
    pub pools: Arc<PoolRegistry>,
    pub factory: Arc<LoanFactory>,
    pub mutex: Arc<BorrowingMutex>,
    pub credit_model: Arc<CreditModel>,
    pub rating: Arc<RatingAgency>,
    pub lending: Arc<LendingAgency>,
    price_oracle: Arc<dyn PriceOracle>,
}

impl Engine {
    pub fn factory_address() -> Address {
        Address::from_label("truefi/loan-factory")
    }

    pub fn rating_address() -> Address {
        Address::from_label("truefi/rating-agency")
    }

    /// Account pools must let borrow and that funds every loan
    pub fn lending_address() -> Address {
        Address::from_label("truefi/lending-agency")
    }

    pub fn bootstrap(
        config: EngineConfig,
        accounts: EngineAccounts,
        collaborators: EngineCollaborators,
    ) -> Result<Self> {
        config.validate()?;

        let owner = accounts.owner;
        let clock = collaborators.clock;
        let events = Arc::new(EventBus::new(clock.clone()));
        let lending_address = Self::lending_address();

        let pools = Arc::new(PoolRegistry::new(owner, events.clone()));
        let factory = Arc::new(LoanFactory::new(
            Self::factory_address(),
            lending_address,
            lending_address,
            config.loans.clone(),
            pools.clone(),
            clock.clone(),
            events.clone(),
        )?);

        let mutex = Arc::new(BorrowingMutex::new(owner, events.clone()));
        mutex.allow_locker(&owner, lending_address, true)?;

        let credit_model = Arc::new(CreditModel::new(
            owner,
            config.credit.clone(),
            collaborators.price_oracle.clone(),
            CollateralAsset {
                address: collaborators.stake_asset,
                decimals: collaborators.stake_token.decimals(),
            },
            events.clone(),
        )?);

        let rating = Arc::new(RatingAgency::new(
            Self::rating_address(),
            owner,
            config.rating.clone(),
            RatingCollaborators {
                factory: factory.clone(),
                stake_token: collaborators.stake_token,
                stake_asset: collaborators.stake_asset,
                reward_token: collaborators.reward_token,
                distributor: collaborators.distributor,
                price_oracle: collaborators.price_oracle.clone(),
            },
            clock.clone(),
            events.clone(),
        )?);

        let lending = Arc::new(LendingAgency::new(
            lending_address,
            LendingRoles {
                owner,
                liquidator: accounts.liquidator,
                recovery: accounts.recovery,
                stakers: accounts.stakers,
            },
            config.lending.clone(),
            LendingCollaborators {
                factory: factory.clone(),
                pools: pools.clone(),
                rating: rating.clone(),
                credit_model: credit_model.clone(),
                credit_oracle: collaborators.credit_oracle,
                staking: collaborators.staking,
                mutex: mutex.clone(),
                swapper: collaborators.swapper,
            },
            clock.clone(),
            events.clone(),
        )?);

        info!(
            owner = %owner.short(),
            lending = %lending_address.short(),
            version = truefi_common::VERSION,
            "engine bootstrapped"
        );
        Ok(Self {
            config,
            accounts,
            clock,
            events,
            pools,
            factory,
            mutex,
            credit_model,
            rating,
            lending,
            price_oracle: collaborators.price_oracle,
        })
    }

    /// Time-averaged oracle over the spot rate of `asset`, with the configured settings
    pub fn rate_oracle(&self, asset: Address) -> Result<Arc<TimeAveragedRateOracle>> {
        Ok(Arc::new(TimeAveragedRateOracle::new(
            asset,
            self.price_oracle.clone(),
            self.clock.clone(),
            self.events.clone(),
            self.config.oracle.clone(),
        )?))
    }

    /// Register a pool together with the oracle supplying its secured rate
    pub fn add_pool(&self, pool: Arc<dyn LiquidityPool>, base_rate: Arc<dyn BaseRateOracle>) -> Result<()> {
        let owner = self.accounts.owner;
        self.credit_model
            .set_base_rate_oracle(&owner, pool.address(), base_rate)?;
        self.pools.register(&owner, pool)
    }
}
