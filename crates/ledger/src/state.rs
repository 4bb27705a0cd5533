//! Account and token state with atomic transaction application.

use aegen_types::{
    AccountState, Address, BlockHeight, Hash, LedgerError, LedgerSnapshot, Receipt, TokenId,
    TokenInfo, TokenSpec, Transaction,
};
use std::collections::BTreeMap;
use tracing::debug;

/// The full ledger: native balances, nonces and fungible tokens.
///
/// Every mutation is deterministic given the pre-state and its inputs;
/// replaying the same ordered transaction sequence from genesis always
/// reproduces the same state and the same state root. BTreeMaps keep
/// iteration (and therefore hashing) order canonical.
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    accounts: BTreeMap<Address, AccountState>,
    tokens: BTreeMap<TokenId, TokenInfo>,
    token_balances: BTreeMap<(TokenId, Address), u64>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════════

    pub fn balance_of(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.balance)
    }

    /// Next-expected nonce for `address` (0 for unseen accounts).
    pub fn nonce_of(&self, address: &Address) -> u64 {
        self.accounts.get(address).map_or(0, |a| a.nonce)
    }

    pub fn token_balance_of(&self, token: &TokenId, address: &Address) -> u64 {
        self.token_balances
            .get(&(token.clone(), address.clone()))
            .copied()
            .unwrap_or(0)
    }

    pub fn token_info(&self, token: &TokenId) -> Option<&TokenInfo> {
        self.tokens.get(token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &TokenInfo> {
        self.tokens.values()
    }

    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutations
    // ═══════════════════════════════════════════════════════════════════════

    /// Credit `amount` to `address` unconditionally.
    ///
    /// Only used for genesis allocation; everything after genesis moves
    /// value through [`apply`](Self::apply).
    pub fn credit(&mut self, address: &Address, amount: u64) {
        let account = self.accounts.entry(address.clone()).or_default();
        account.balance = account.balance.saturating_add(amount);
    }

    /// Apply one transaction atomically.
    ///
    /// Validates the nonce and balance first; on any failure nothing is
    /// mutated. On success all four mutations happen together: the sender
    /// is debited `amount + fee`, the receiver credited `amount`, the
    /// proposer credited `fee`, and the sender's nonce incremented by one.
    pub fn apply(
        &mut self,
        tx: &Transaction,
        proposer: &Address,
        height: BlockHeight,
    ) -> Result<Receipt, LedgerError> {
        let expected = self.nonce_of(&tx.sender);
        if tx.nonce != expected {
            return Err(LedgerError::InvalidNonce {
                sender: tx.sender.clone(),
                got: tx.nonce,
                expected,
            });
        }

        let fee = tx.fee();
        let required = tx.amount.saturating_add(fee);
        let available = self.balance_of(&tx.sender);
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                sender: tx.sender.clone(),
                required,
                available,
            });
        }

        // Preconditions hold; mutate all-or-nothing from here.
        {
            let sender = self.accounts.entry(tx.sender.clone()).or_default();
            sender.balance -= required;
            sender.nonce += 1;
        }
        {
            let receiver = self.accounts.entry(tx.receiver.clone()).or_default();
            receiver.balance = receiver.balance.saturating_add(tx.amount);
        }
        if fee > 0 {
            let coinbase = self.accounts.entry(proposer.clone()).or_default();
            coinbase.balance = coinbase.balance.saturating_add(fee);
        }

        debug!(
            tx = %tx.hash(),
            sender = %tx.sender,
            receiver = %tx.receiver,
            amount = tx.amount,
            fee,
            "applied transaction"
        );

        Ok(Receipt::success(tx.hash(), height, tx.gas_limit))
    }

    /// Create a fungible token, crediting the initial supply to its creator.
    ///
    /// A `(creator, symbol)` pair maps to exactly one token; reapplication
    /// fails with `TokenAlreadyExists`.
    pub fn create_token(
        &mut self,
        spec: &TokenSpec,
        created_at: u64,
    ) -> Result<TokenId, LedgerError> {
        let id = TokenId::derive(&spec.creator, &spec.symbol);
        if self.tokens.contains_key(&id) {
            return Err(LedgerError::TokenAlreadyExists {
                creator: spec.creator.clone(),
                symbol: spec.symbol.clone(),
            });
        }

        let info = TokenInfo {
            id: id.clone(),
            name: spec.name.clone(),
            symbol: spec.symbol.clone(),
            precision: spec.precision,
            total_supply: spec.initial_supply,
            creator: spec.creator.clone(),
            created_at,
        };
        self.tokens.insert(id.clone(), info);
        if spec.initial_supply > 0 {
            self.token_balances
                .insert((id.clone(), spec.creator.clone()), spec.initial_supply);
        }

        debug!(token = %id, symbol = %spec.symbol, supply = spec.initial_supply, "created token");
        Ok(id)
    }

    /// Move token balance between accounts. Never touches `total_supply`.
    pub fn transfer_token(
        &mut self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: u64,
    ) -> Result<(), LedgerError> {
        if !self.tokens.contains_key(token) {
            return Err(LedgerError::UnknownToken(token.clone()));
        }

        let available = self.token_balance_of(token, from);
        if available < amount {
            return Err(LedgerError::InsufficientTokenBalance {
                token: token.clone(),
                account: from.clone(),
                required: amount,
                available,
            });
        }

        *self
            .token_balances
            .entry((token.clone(), from.clone()))
            .or_default() -= amount;
        *self
            .token_balances
            .entry((token.clone(), to.clone()))
            .or_default() += amount;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Commitments & snapshots
    // ═══════════════════════════════════════════════════════════════════════

    /// Commitment over the full ledger state.
    ///
    /// Hashes the canonical snapshot encoding; identical state always
    /// yields an identical root regardless of mutation history.
    pub fn state_root(&self) -> Hash {
        let snapshot = self.snapshot();
        let encoded = bincode::serialize(&snapshot)
            .unwrap_or_else(|_| unreachable!("snapshot encoding is infallible for map types"));
        Hash::of(&encoded)
    }

    /// Serializable copy of the full state, for persistence and recovery.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            accounts: self.accounts.clone(),
            tokens: self.tokens.clone(),
            token_balances: self.token_balances.clone(),
        }
    }

    /// Rebuild a ledger from a persisted snapshot.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self {
            accounts: snapshot.accounts,
            tokens: snapshot.tokens,
            token_balances: snapshot.token_balances,
        }
    }

    /// Sum of all native balances, used by conservation checks.
    pub fn total_native_supply(&self) -> u64 {
        self.accounts.values().map(|a| a.balance).sum()
    }

    /// Sum of all account balances for one token.
    pub fn token_circulating(&self, token: &TokenId) -> u64 {
        self.token_balances
            .iter()
            .filter(|((t, _), _)| t == token)
            .map(|(_, balance)| *balance)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegen_types::test_utils::test_transfer;

    fn funded(pairs: &[(&str, u64)]) -> LedgerState {
        let mut ledger = LedgerState::new();
        for (name, amount) in pairs {
            ledger.credit(&Address::from(*name), *amount);
        }
        ledger
    }

    fn proposer() -> Address {
        Address::from("v0")
    }

    #[test]
    fn genesis_transfer_scenario() {
        // alice = 100000, bob = 0; alice sends 500 at nonce 0 with zero fee.
        let mut ledger = funded(&[("alice", 100_000)]);
        let tx = test_transfer("alice", "bob", 500, 0);
        let receipt = ledger.apply(&tx, &proposer(), BlockHeight(1)).unwrap();

        assert!(receipt.is_success());
        assert_eq!(ledger.balance_of(&Address::from("alice")), 99_500);
        assert_eq!(ledger.balance_of(&Address::from("bob")), 500);
        assert_eq!(ledger.nonce_of(&Address::from("alice")), 1);
    }

    #[test]
    fn invalid_nonce_mutates_nothing() {
        let mut ledger = funded(&[("alice", 1_000)]);
        let root_before = ledger.state_root();

        let tx = test_transfer("alice", "bob", 10, 5);
        let err = ledger.apply(&tx, &proposer(), BlockHeight(1)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidNonce { expected: 0, got: 5, .. }));

        assert_eq!(ledger.balance_of(&Address::from("alice")), 1_000);
        assert_eq!(ledger.nonce_of(&Address::from("alice")), 0);
        assert_eq!(ledger.state_root(), root_before);
    }

    #[test]
    fn insufficient_funds_counts_fee() {
        let mut ledger = funded(&[("alice", 100)]);
        let tx = std::sync::Arc::new(
            aegen_types::Transaction::new(Address::from("alice"), Address::from("bob"), 100, 0)
                .with_gas(10, 1),
        );
        let err = ledger.apply(&tx, &proposer(), BlockHeight(1)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientFunds { required: 110, available: 100, .. }
        ));
    }

    #[test]
    fn fee_goes_to_proposer() {
        let mut ledger = funded(&[("alice", 1_000)]);
        let tx = std::sync::Arc::new(
            aegen_types::Transaction::new(Address::from("alice"), Address::from("bob"), 100, 0)
                .with_gas(50, 2),
        );
        ledger.apply(&tx, &proposer(), BlockHeight(1)).unwrap();

        assert_eq!(ledger.balance_of(&Address::from("alice")), 800);
        assert_eq!(ledger.balance_of(&Address::from("bob")), 100);
        assert_eq!(ledger.balance_of(&proposer()), 100);
    }

    #[test]
    fn native_supply_is_conserved() {
        let mut ledger = funded(&[("alice", 5_000), ("bob", 5_000)]);
        let before = ledger.total_native_supply();

        let txs = [
            test_transfer("alice", "bob", 100, 0),
            test_transfer("bob", "carol", 2_000, 0),
            test_transfer("alice", "carol", 1, 1),
        ];
        for tx in &txs {
            ledger.apply(tx, &proposer(), BlockHeight(1)).unwrap();
        }
        assert_eq!(ledger.total_native_supply(), before);
    }

    #[test]
    fn token_create_transfer_and_supply_invariant() {
        let mut ledger = LedgerState::new();
        let spec = TokenSpec {
            name: "Test Token".into(),
            symbol: "TST".into(),
            precision: 12,
            initial_supply: 1_000_000,
            creator: Address::from("alice"),
        };
        let id = ledger.create_token(&spec, 0).unwrap();

        assert_eq!(ledger.token_balance_of(&id, &Address::from("alice")), 1_000_000);
        ledger
            .transfer_token(&id, &Address::from("alice"), &Address::from("bob"), 100)
            .unwrap();

        assert_eq!(ledger.token_balance_of(&id, &Address::from("alice")), 999_900);
        assert_eq!(ledger.token_balance_of(&id, &Address::from("bob")), 100);
        assert_eq!(ledger.token_info(&id).unwrap().total_supply, 1_000_000);
        assert_eq!(ledger.token_circulating(&id), 1_000_000);
    }

    #[test]
    fn duplicate_token_rejected() {
        let mut ledger = LedgerState::new();
        let spec = TokenSpec {
            name: "Test Token".into(),
            symbol: "TST".into(),
            precision: 12,
            initial_supply: 10,
            creator: Address::from("alice"),
        };
        ledger.create_token(&spec, 0).unwrap();
        let err = ledger.create_token(&spec, 1).unwrap_err();
        assert!(matches!(err, LedgerError::TokenAlreadyExists { .. }));

        // Same symbol under a different creator is a distinct token.
        let other = TokenSpec {
            creator: Address::from("bob"),
            ..spec
        };
        ledger.create_token(&other, 1).unwrap();
    }

    #[test]
    fn token_transfer_errors() {
        let mut ledger = LedgerState::new();
        let missing = TokenId::from("token.none");
        let err = ledger
            .transfer_token(&missing, &Address::from("a"), &Address::from("b"), 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::UnknownToken(_)));

        let spec = TokenSpec {
            name: "T".into(),
            symbol: "T".into(),
            precision: 0,
            initial_supply: 5,
            creator: Address::from("alice"),
        };
        let id = ledger.create_token(&spec, 0).unwrap();
        let err = ledger
            .transfer_token(&id, &Address::from("alice"), &Address::from("bob"), 6)
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientTokenBalance { required: 6, available: 5, .. }
        ));
    }

    #[test]
    fn replay_reproduces_state_root() {
        let build = || {
            let mut ledger = funded(&[("alice", 100_000)]);
            for nonce in 0..10 {
                let tx = test_transfer("alice", "bob", 100 + nonce, nonce);
                ledger.apply(&tx, &proposer(), BlockHeight(1)).unwrap();
            }
            ledger
                .create_token(
                    &TokenSpec {
                        name: "Test Token".into(),
                        symbol: "TST".into(),
                        precision: 12,
                        initial_supply: 42,
                        creator: Address::from("bob"),
                    },
                    7,
                )
                .unwrap();
            ledger
        };
        assert_eq!(build().state_root(), build().state_root());
    }

    #[test]
    fn snapshot_round_trip_preserves_root() {
        let mut ledger = funded(&[("alice", 77)]);
        ledger
            .apply(&test_transfer("alice", "bob", 7, 0), &proposer(), BlockHeight(1))
            .unwrap();

        let restored = LedgerState::from_snapshot(ledger.snapshot());
        assert_eq!(restored.state_root(), ledger.state_root());
        assert_eq!(restored.nonce_of(&Address::from("alice")), 1);
    }
}
