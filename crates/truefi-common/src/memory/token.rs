//! InMemoryToken - balance/allowance ledger
//!
//! Each call takes a single write lock, so a transfer either fully applies
//! or leaves every balance untouched. Frozen accounts can neither send nor
//! receive.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{Result, TrueFiError};
use crate::interfaces::TokenLedger;
use crate::types::address::Address;

#[derive(Debug, Default)]
struct TokenState {
    balances: HashMap<Address, u128>,
    allowances: HashMap<(Address, Address), u128>,
    minters: HashSet<Address>,
    frozen: HashSet<Address>,
    total_supply: u128,
}

impl TokenState {
    fn balance(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn ensure_not_frozen(&self, account: &Address) -> Result<()> {
        if self.frozen.contains(account) {
            return Err(TrueFiError::Collaborator(format!("account {} is frozen", account)));
        }
        Ok(())
    }

    fn move_balance(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        self.ensure_not_frozen(from)?;
        self.ensure_not_frozen(to)?;

        let available = self.balance(from);
        if available < amount {
            return Err(TrueFiError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        if from != to {
            self.balances.insert(*from, available - amount);
            let received = self.balance(to).checked_add(amount).ok_or_else(|| {
                TrueFiError::Arithmetic(crate::error::ArithmeticError::Overflow)
            })?;
            self.balances.insert(*to, received);
        }
        Ok(())
    }
}

/// Fungible token held entirely in memory
#[derive(Debug)]
pub struct InMemoryToken {
    symbol: String,
    decimals: u8,
    state: RwLock<TokenState>,
}

impl InMemoryToken {
    pub fn new(symbol: &str, decimals: u8) -> Self {
        Self {
            symbol: symbol.to_string(),
            decimals,
            state: RwLock::new(TokenState::default()),
        }
    }

    /// Grant minting rights at construction
    pub fn with_minter(self, minter: Address) -> Self {
        self.state.write().minters.insert(minter);
        self
    }

    pub fn add_minter(&self, minter: Address) {
        self.state.write().minters.insert(minter);
    }

    /// Freeze or thaw an account
    pub fn set_frozen(&self, account: Address, frozen: bool) {
        let mut state = self.state.write();
        if frozen {
            state.frozen.insert(account);
        } else {
            state.frozen.remove(&account);
        }
    }

    pub fn is_frozen(&self, account: &Address) -> bool {
        self.state.read().frozen.contains(account)
    }
}

impl TokenLedger for InMemoryToken {
    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn total_supply(&self) -> u128 {
        self.state.read().total_supply
    }

    fn balance_of(&self, account: &Address) -> u128 {
        self.state.read().balance(account)
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> u128 {
        self.state
            .read()
            .allowances
            .get(&(*owner, *spender))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        self.state.write().move_balance(from, to, amount)?;
        debug!(token = %self.symbol, from = %from.short(), to = %to.short(), amount, "transfer");
        Ok(())
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()> {
        let mut state = self.state.write();

        let approved = if spender == from {
            u128::MAX
        } else {
            state.allowances.get(&(*from, *spender)).copied().unwrap_or(0)
        };
        if approved < amount {
            return Err(TrueFiError::InsufficientAllowance {
                required: amount,
                approved,
            });
        }

        state.move_balance(from, to, amount)?;
        if spender != from && approved != u128::MAX {
            state.allowances.insert((*from, *spender), approved - amount);
        }

        debug!(token = %self.symbol, spender = %spender.short(), from = %from.short(), to = %to.short(), amount, "transfer_from");
        Ok(())
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: u128) -> Result<()> {
        if spender.is_zero() {
            return Err(TrueFiError::InvalidArgument("cannot approve the zero address".to_string()));
        }
        self.state.write().allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    fn mint(&self, caller: &Address, to: &Address, amount: u128) -> Result<()> {
        let mut state = self.state.write();
        if !state.minters.contains(caller) {
            return Err(TrueFiError::unauthorized(caller, "minter"));
        }
        state.ensure_not_frozen(to)?;

        let supply = state
            .total_supply
            .checked_add(amount)
            .ok_or(TrueFiError::Arithmetic(crate::error::ArithmeticError::Overflow))?;
        let balance = state.balance(to) + amount;
        state.total_supply = supply;
        state.balances.insert(*to, balance);

        debug!(token = %self.symbol, to = %to.short(), amount, "mint");
        Ok(())
    }

    fn burn(&self, holder: &Address, amount: u128) -> Result<()> {
        let mut state = self.state.write();
        let available = state.balance(holder);
        if available < amount {
            return Err(TrueFiError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        state.balances.insert(*holder, available - amount);
        state.total_supply -= amount;

        debug!(token = %self.symbol, holder = %holder.short(), amount, "burn");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> (InMemoryToken, Address) {
        let minter = Address::from_label("minter");
        (InMemoryToken::new("TUSD", 18).with_minter(minter), minter)
    }

    #[test]
    fn test_mint_and_transfer() {
        let (token, minter) = token();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");

        token.mint(&minter, &alice, 100).unwrap();
        token.transfer(&alice, &bob, 30).unwrap();

        assert_eq!(token.balance_of(&alice), 70);
        assert_eq!(token.balance_of(&bob), 30);
        assert_eq!(token.total_supply(), 100);
    }

    #[test]
    fn test_mint_requires_minter() {
        let (token, _) = token();
        let alice = Address::from_label("alice");
        let err = token.mint(&alice, &alice, 1).unwrap_err();
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_insufficient_balance() {
        let (token, minter) = token();
        let alice = Address::from_label("alice");
        token.mint(&minter, &alice, 10).unwrap();

        let result = token.transfer(&alice, &minter, 11);
        assert!(matches!(result, Err(TrueFiError::InsufficientBalance { .. })));
        assert_eq!(token.balance_of(&alice), 10);
    }

    #[test]
    fn test_transfer_from_spends_allowance() {
        let (token, minter) = token();
        let alice = Address::from_label("alice");
        let spender = Address::from_label("spender");
        token.mint(&minter, &alice, 100).unwrap();

        assert!(matches!(
            token.transfer_from(&spender, &alice, &spender, 10),
            Err(TrueFiError::InsufficientAllowance { .. })
        ));

        token.approve(&alice, &spender, 40).unwrap();
        token.transfer_from(&spender, &alice, &spender, 25).unwrap();
        assert_eq!(token.allowance(&alice, &spender), 15);
        assert_eq!(token.balance_of(&spender), 25);
    }

    #[test]
    fn test_frozen_account_cannot_move_funds() {
        let (token, minter) = token();
        let alice = Address::from_label("alice");
        let bob = Address::from_label("bob");
        token.mint(&minter, &alice, 100).unwrap();

        token.set_frozen(bob, true);
        assert_eq!(token.transfer(&alice, &bob, 1).unwrap_err().code(), "COLLABORATOR_FAILURE");

        token.set_frozen(bob, false);
        token.transfer(&alice, &bob, 1).unwrap();
        assert_eq!(token.balance_of(&bob), 1);
    }

    #[test]
    fn test_burn_reduces_supply() {
        let (token, minter) = token();
        let alice = Address::from_label("alice");
        token.mint(&minter, &alice, 100).unwrap();
        token.burn(&alice, 40).unwrap();
        assert_eq!(token.total_supply(), 60);
        assert!(token.burn(&alice, 61).is_err());
    }
}
