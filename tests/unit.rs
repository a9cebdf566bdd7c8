//! Unit tests for lending-sdk
//!
//! These tests cover instruction building (account order, payloads, local
//! validation), the balance engine state machine and the protocol counters.

use lending_sdk::{
    constants::{MAX_TOKEN_BALANCES, TOKEN_2022_PROGRAM_ID},
    engine::{BalanceEngine, EngineParams},
    error::{AdminError, BankError, ErrorDomain, LendingError, ProtocolError, UserError},
    health::{BankSet, WeightKind},
    ix::{InstructionBuilder, LendingInstruction, LiquidateParams, TokenProgram, TransferParams},
    pda,
    state::{
        AccountRecord, Admin, Bank, BankStatus, Direction, Pool, Position, PriceFeed, TokenGroupAdmin, User,
    },
    tags,
};
use solana_program::{instruction::AccountMeta, program_error::ProgramError, pubkey::Pubkey, system_program};

// --- Fixtures ---

const USDC_BANK: u8 = 0;
const SOL_BANK: u8 = 1;

fn make_bank(bank_id: u8, decimals: u8, price: i64, expo: i32, status: BankStatus) -> Bank {
    let mut bank = Bank::new(&Pubkey::new_unique(), 0, bank_id, 255, decimals);
    bank.set_status(status);
    bank.set_price(PriceFeed::new(price, expo, 1_700_000_000));
    bank
}

/// $1.00 with expo -8.
fn usdc() -> Bank {
    make_bank(USDC_BANK, 6, 100_000_000, -8, BankStatus::Active)
}

/// SOL-like bank at `usd` dollars.
fn sol(usd: i64) -> Bank {
    make_bank(SOL_BANK, 9, usd * 100_000_000, -8, BankStatus::Active)
}

fn new_user() -> User {
    User::new(&Pubkey::new_unique(), 0, 0, 254)
}

fn unchecked_engine() -> BalanceEngine {
    BalanceEngine::new(EngineParams { health_checks: false, ..EngineParams::default() })
}

fn transfer(wallet: Pubkey, bank_id: u8, amount: u64, health_bank_ids: Vec<u8>) -> TransferParams {
    TransferParams {
        wallet,
        user_id: 0,
        pool_id: 0,
        bank_id,
        amount,
        user_token_account: Pubkey::new_unique(),
        health_bank_ids,
        mint: None,
    }
}

fn meta_keys(metas: &[AccountMeta]) -> Vec<Pubkey> {
    metas.iter().map(|m| m.pubkey).collect()
}

// --- Builder ---

#[test]
fn test_deposit_account_order() {
    let program_id = Pubkey::new_unique();
    let builder = InstructionBuilder::new(program_id);
    let wallet = Pubkey::new_unique();
    let params = transfer(wallet, 2, 1_000_000, vec![5, 1]);
    let ix = builder.deposit(&params).unwrap();

    let bank = pda::find_bank_address(0, 2, &program_id).0;
    let vault = pda::find_token_vault_address(&bank, &program_id).0;
    let user = pda::find_user_address(0, 0, &wallet, &program_id).0;

    assert_eq!(ix.program_id, program_id);
    assert_eq!(
        meta_keys(&ix.accounts),
        vec![
            wallet,
            params.user_token_account,
            vault,
            user,
            bank,
            spl_token::ID,
            pda::find_bank_address(0, 5, &program_id).0,
            pda::find_bank_address(0, 1, &program_id).0,
        ]
    );
    assert!(ix.accounts[0].is_signer && ix.accounts[0].is_writable);
    assert!(ix.accounts[1..5].iter().all(|m| m.is_writable && !m.is_signer));
    assert!(ix.accounts[5..].iter().all(|m| !m.is_writable && !m.is_signer));

    let mut expected = tags::IX_DEPOSIT.to_vec();
    expected.extend_from_slice(&1_000_000u64.to_le_bytes());
    assert_eq!(ix.data, expected);
}

#[test]
fn test_withdraw_payload_and_mint_last() {
    let builder = InstructionBuilder::default().with_token_program(TokenProgram::Token2022);
    let mint = Pubkey::new_unique();
    let mut params = transfer(Pubkey::new_unique(), 0, 42, vec![3]);
    params.mint = Some(mint);
    let ix = builder.withdraw(&params).unwrap();

    assert_eq!(ix.program_id, lending_sdk::ID);
    assert_eq!(ix.accounts[5].pubkey, TOKEN_2022_PROGRAM_ID);
    assert_eq!(ix.accounts.last().unwrap().pubkey, mint);
    assert_eq!(ix.accounts.len(), 8);
    assert_eq!(&ix.data[..8], &tags::IX_WITHDRAW);
    assert_eq!(LendingInstruction::unpack(&ix.data).unwrap(), LendingInstruction::Withdraw { amount: 42 });
}

#[test]
fn test_token_2022_requires_mint() {
    let builder = InstructionBuilder::default().with_token_program(TokenProgram::Token2022);
    let params = transfer(Pubkey::new_unique(), 0, 1, vec![]);
    assert_eq!(builder.deposit(&params), Err(LendingError::MissingMint));
    assert_eq!(builder.withdraw(&params), Err(LendingError::MissingMint));

    // The legacy token program has no such requirement.
    assert!(InstructionBuilder::default().deposit(&params).is_ok());
}

#[test]
fn test_liquidate_injects_liability_token_program() {
    let program_id = Pubkey::new_unique();
    let builder = InstructionBuilder::new(program_id);
    let liability_mint = Pubkey::new_unique();
    let params = LiquidateParams {
        liquidator: Pubkey::new_unique(),
        user_account: Pubkey::new_unique(),
        pool_id: 0,
        collateral_bank_id: SOL_BANK,
        liability_bank_id: USDC_BANK,
        liability_amount: 300_000,
        liquidator_collateral_token: Pubkey::new_unique(),
        liquidator_liability_token: Pubkey::new_unique(),
        collateral_token_program: TokenProgram::Token,
        liability_token_program: TokenProgram::Token2022,
        health_bank_ids: vec![USDC_BANK, SOL_BANK, 4],
        collateral_mint: None,
        liability_mint: Some(liability_mint),
    };
    let ix = builder.liquidate(&params).unwrap();

    let collateral_bank = pda::find_bank_address(0, SOL_BANK, &program_id).0;
    let liability_bank = pda::find_bank_address(0, USDC_BANK, &program_id).0;
    assert_eq!(
        meta_keys(&ix.accounts),
        vec![
            params.liquidator,
            params.liquidator_collateral_token,
            params.liquidator_liability_token,
            params.user_account,
            collateral_bank,
            liability_bank,
            pda::find_token_vault_address(&collateral_bank, &program_id).0,
            pda::find_token_vault_address(&liability_bank, &program_id).0,
            spl_token::ID,
            TOKEN_2022_PROGRAM_ID,
            liability_bank,
            collateral_bank,
            pda::find_bank_address(0, 4, &program_id).0,
            liability_mint,
        ]
    );
    assert!(ix.accounts[0].is_signer);
    assert_eq!(
        LendingInstruction::unpack(&ix.data).unwrap(),
        LendingInstruction::Liquidate { liability_amount: 300_000 }
    );

    let same_program = LiquidateParams {
        liability_token_program: TokenProgram::Token,
        liability_mint: None,
        ..params.clone()
    };
    let ix = builder.liquidate(&same_program).unwrap();
    assert_eq!(ix.accounts.len(), 12);
    assert_eq!(ix.accounts[9].pubkey, liability_bank);

    let missing = LiquidateParams { liability_mint: None, ..params };
    assert_eq!(builder.liquidate(&missing), Err(LendingError::MissingMint));
}

#[test]
fn test_update_bank_status_validates_enum() {
    let builder = InstructionBuilder::default();
    let authority = Pubkey::new_unique();
    assert_eq!(
        builder.update_bank_status(&authority, 3, 0, 0),
        Err(LendingError::InvalidBankStatus(3))
    );
    let ix = builder.update_bank_status(&authority, BankStatus::ReduceOnly as u8, 0, 1).unwrap();
    assert_eq!(ix.data, [&tags::IX_UPDATE_BANK_STATUS[..], &[2u8][..]].concat());
    assert_eq!(ix.accounts[1].pubkey, authority);
    assert!(ix.accounts[1].is_signer && !ix.accounts[1].is_writable);
    assert!(ix.accounts[2].is_writable);

    let mint = Pubkey::new_unique();
    assert_eq!(
        builder.update_token_config_status(&authority, &mint, 0, 9),
        Err(LendingError::InvalidBankStatus(9))
    );
    assert!(builder.update_token_config_status(&authority, &mint, 0, 1).is_ok());
}

#[test]
fn test_admin_instructions() {
    let program_id = Pubkey::new_unique();
    let builder = InstructionBuilder::new(program_id);
    let authority = Pubkey::new_unique();
    let admin = pda::find_admin_address(&program_id).0;

    let ix = builder.initialize(&authority);
    assert_eq!(meta_keys(&ix.accounts), vec![admin, authority, system_program::id()]);
    assert_eq!(ix.data, tags::IX_INITIALIZE.to_vec());

    let new_authority = Pubkey::new_unique();
    let ix = builder.update_authority(&authority, &new_authority);
    assert_eq!(meta_keys(&ix.accounts), vec![admin, authority, new_authority]);

    let ix = builder.initialize_pool(&authority, 3);
    assert_eq!(ix.accounts[1].pubkey, pda::find_pool_address(3, &program_id).0);
    assert_eq!(ix.data, tags::IX_INITIALIZE_POOL.to_vec());

    let mint = Pubkey::new_unique();
    let ix = builder.initialize_bank(&authority, &mint, 3, 7);
    let bank = pda::find_bank_address(3, 7, &program_id).0;
    assert_eq!(ix.accounts.len(), 8);
    assert_eq!(ix.accounts[2].pubkey, bank);
    assert_eq!(ix.accounts[3].pubkey, mint);
    assert_eq!(ix.accounts[4].pubkey, pda::find_token_vault_address(&bank, &program_id).0);
    assert_eq!(ix.accounts[6].pubkey, spl_token::ID);
    assert_eq!(ix.data, [&tags::IX_INITIALIZE_BANK[..], &[3u8][..]].concat());

    let ix = builder.initialize_token_group(&authority);
    assert_eq!(meta_keys(&ix.accounts), vec![admin, authority]);

    let ix = builder.initialize_token_config(&authority, &mint, 2);
    let config = pda::find_token_config_address(&mint, 2, &program_id).0;
    assert_eq!(ix.accounts[1].pubkey, config);
    assert_eq!(ix.accounts[3].pubkey, pda::find_token_vault_address(&config, &program_id).0);
    assert_eq!(ix.data, [&tags::IX_INITIALIZE_TOKEN_CONFIG[..], &[2u8][..]].concat());
}

#[test]
fn test_initialize_user_payload() {
    let program_id = Pubkey::new_unique();
    let wallet = Pubkey::new_unique();
    let ix = InstructionBuilder::new(program_id).initialize_user(&wallet, 1, 0x0203);
    assert_eq!(ix.accounts[0].pubkey, pda::find_user_address(1, 0x0203, &wallet, &program_id).0);
    assert!(ix.accounts[1].is_signer);
    let mut expected = tags::IX_INITIALIZE_USER.to_vec();
    expected.extend_from_slice(&[1, 0x03, 0x02]);
    assert_eq!(ix.data, expected);
}

#[test]
fn test_update_price_payload() {
    let feed = PriceFeed {
        price: 15_025,
        conf: 3,
        ema_price: 15_000,
        ema_conf: 2,
        exponent: -2,
        _padding: [0; 4],
        publish_time: 99,
    };
    let ix = InstructionBuilder::default().update_price(&Pubkey::new_unique(), 0, 1, &feed);
    assert_eq!(ix.data.len(), 8 + 8 * 5 + 4);
    assert_eq!(
        LendingInstruction::unpack(&ix.data).unwrap(),
        LendingInstruction::UpdatePrice { price_feed: feed }
    );
}

#[test]
fn test_unpack_rejects_garbage() {
    assert_eq!(LendingInstruction::unpack(&[1, 2, 3]), Err(LendingError::InvalidInstructionData));
    assert_eq!(LendingInstruction::unpack(&[0; 16]), Err(LendingError::InvalidInstructionData));
    // Truncated amount.
    let mut data = tags::IX_DEPOSIT.to_vec();
    data.extend_from_slice(&[1, 2, 3]);
    assert_eq!(LendingInstruction::unpack(&data), Err(LendingError::InvalidInstructionData));
    // Trailing bytes.
    let mut data = LendingInstruction::Deposit { amount: 5 }.pack();
    data.push(0);
    assert_eq!(LendingInstruction::unpack(&data), Err(LendingError::InvalidInstructionData));
}

#[test]
fn test_token_program_ids() {
    assert_eq!(TokenProgram::from_id(&spl_token::ID), Some(TokenProgram::Token));
    assert_eq!(TokenProgram::from_id(&TOKEN_2022_PROGRAM_ID), Some(TokenProgram::Token2022));
    assert_eq!(TokenProgram::from_id(&Pubkey::new_unique()), None);
    assert!(!TokenProgram::Token.requires_mint());
}

// --- Engine ---

#[test]
fn test_deposit_withdraw_duality() {
    let engine = unchecked_engine();
    let bank = usdc();
    let banks = BankSet::new(0);
    let mut user = new_user();

    engine.deposit(&mut user, &bank, 1_000_000).unwrap();
    engine.withdraw(&mut user, &bank, 1_500_000, &banks).unwrap();
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Liability(500_000));

    let change = engine.deposit(&mut user, &bank, 500_000).unwrap();
    assert_eq!(change.before, Position::Liability(500_000));
    assert_eq!(change.after, Position::Collateral(0));

    engine.withdraw(&mut user, &bank, 500_000, &banks).unwrap();
    engine.deposit(&mut user, &bank, 500_001).unwrap();
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Collateral(1));
}

#[test]
fn test_exact_repayment_never_flips_to_collateral() {
    for owed in [1u64, 7, 500_000, i64::MAX as u64] {
        let after = Position::Liability(owed).after_deposit(owed).unwrap();
        assert_eq!(after, Position::Collateral(0));
        assert!(after.is_closed());
    }
    assert_eq!(Position::Collateral(10).after_withdrawal(10).unwrap(), Position::CLOSED);
}

#[test]
fn test_closed_slot_stays_bound() {
    let engine = unchecked_engine();
    let mut user = new_user();
    let sol = sol(100);
    engine.deposit(&mut user, &sol, 10).unwrap();
    engine.withdraw(&mut user, &sol, 10, &BankSet::new(0)).unwrap();
    assert_eq!(user.find_slot(SOL_BANK), Some(0));
    assert_eq!(user.slots_in_use(), 1);
    assert!(user.open_bank_ids().is_empty());

    // A closed bank-0 slot is indistinguishable from a placeholder.
    let usdc = usdc();
    engine.deposit(&mut user, &usdc, 10).unwrap();
    assert_eq!(user.slots_in_use(), 2);
    engine.withdraw(&mut user, &usdc, 10, &BankSet::new(0)).unwrap();
    assert_eq!(user.slots_in_use(), 1);
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::CLOSED);
}

#[test]
fn test_status_gating() {
    let engine = unchecked_engine();
    let banks = BankSet::new(0);
    let mut user = new_user();

    let mut bank = usdc();
    engine.deposit(&mut user, &bank, 100).unwrap();

    bank.set_status(BankStatus::ReduceOnly);
    assert_eq!(engine.deposit(&mut user, &bank, 1), Err(LendingError::BankInactive));
    engine.withdraw(&mut user, &bank, 50, &banks).unwrap();

    bank.set_status(BankStatus::Inactive);
    let snapshot = user;
    assert_eq!(engine.deposit(&mut user, &bank, 1), Err(LendingError::BankInactive));
    assert_eq!(
        engine.withdraw(&mut user, &bank, 1, &banks),
        Err(LendingError::BankNotAvailableForWithdrawal)
    );
    assert_eq!(user, snapshot);
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Collateral(50));
}

#[test]
fn test_pool_mismatch() {
    let engine = BalanceEngine::default();
    let mut user = User::new(&Pubkey::new_unique(), 0, 1, 0);
    assert_eq!(
        engine.deposit(&mut user, &usdc(), 1),
        Err(LendingError::PoolMismatch { expected: 1, found: 0 })
    );
    let mut set = BankSet::new(1);
    assert!(set.insert(usdc()).is_err());
}

#[test]
fn test_capacity() {
    let engine = unchecked_engine();
    let mut user = new_user();
    for id in 0..MAX_TOKEN_BALANCES as u8 {
        let bank = make_bank(id, 6, 100_000_000, -8, BankStatus::Active);
        engine.deposit(&mut user, &bank, 1 + id as u64).unwrap();
    }
    let snapshot = user;
    let bank = make_bank(16, 6, 100_000_000, -8, BankStatus::Active);
    assert_eq!(engine.deposit(&mut user, &bank, 5), Err(LendingError::MaxTokenTypes));
    assert_eq!(user, snapshot);

    // Existing banks still update in place.
    let bank = make_bank(3, 6, 100_000_000, -8, BankStatus::Active);
    engine.deposit(&mut user, &bank, 10).unwrap();
    assert_eq!(user.position(3).unwrap(), Position::Collateral(14));
}

#[test]
fn test_balance_overflow_leaves_slot_untouched() {
    let mut user = new_user();
    user.update_balance(0, i64::MAX as u64, Direction::Deposit).unwrap();
    let snapshot = user;
    assert_eq!(user.update_balance(0, 1, Direction::Deposit), Err(LendingError::Overflow));
    assert_eq!(user.update_balance(1, u64::MAX, Direction::Withdrawal), Err(LendingError::Overflow));
    assert_eq!(user, snapshot);
}

#[test]
fn test_withdraw_health_check() {
    let engine = BalanceEngine::default();
    let usdc = usdc();
    let sol = sol(100).with_weights(80, 90, 100, 100);
    let banks = BankSet::from_banks(0, [usdc, sol]).unwrap();
    let mut user = new_user();

    // 0.01 SOL at $100 -> $1.00, initial weight 80% -> $0.80 borrowable.
    engine.deposit(&mut user, &sol, 10_000_000).unwrap();
    engine.withdraw(&mut user, &usdc, 800_000, &banks).unwrap();
    let snapshot = user;
    assert_eq!(engine.withdraw(&mut user, &usdc, 1, &banks), Err(LendingError::Undercollateralized));
    assert_eq!(user, snapshot);

    // Without the collateral bank the position cannot be priced.
    let partial = BankSet::from_banks(0, [usdc]).unwrap();
    assert_eq!(
        engine.withdraw(&mut user, &usdc, 1, &partial),
        Err(LendingError::MissingRequiredBank(SOL_BANK))
    );
}

#[test]
fn test_health_weights() {
    let usdc = usdc().with_weights(100, 100, 110, 105);
    let sol = sol(100).with_weights(80, 90, 100, 100);
    let banks = BankSet::from_banks(0, [usdc, sol, sol]).unwrap();
    assert_eq!(banks.len(), 2);
    assert_eq!(banks.bank_ids(), vec![USDC_BANK, SOL_BANK]);

    let mut user = new_user();
    user.update_balance(SOL_BANK, 10_000_000, Direction::Deposit).unwrap();
    user.update_balance(USDC_BANK, 500_000, Direction::Withdrawal).unwrap();
    assert_eq!(user.open_bank_ids(), vec![SOL_BANK, USDC_BANK]);
    assert!(banks.require(&user.open_bank_ids()).is_ok());

    let initial = banks.evaluate(&user, WeightKind::Initial).unwrap();
    assert_eq!(initial.collateral, 800_000);
    assert_eq!(initial.liability, 550_000);
    let maintenance = banks.evaluate(&user, WeightKind::Maintenance).unwrap();
    assert_eq!(maintenance.collateral, 900_000);
    assert_eq!(maintenance.liability, 525_000);
    assert!(maintenance.is_healthy());
    assert_eq!(maintenance.net_value(), Some(375_000));
}

#[test]
fn test_scenario() {
    let engine = unchecked_engine();
    let bank = usdc();
    let mut user = new_user();
    let banks = BankSet::new(0);

    engine.deposit(&mut user, &bank, 1_000_000).unwrap();
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Collateral(1_000_000));
    engine.withdraw(&mut user, &bank, 1_500_000, &banks).unwrap();
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Liability(500_000));
    engine.deposit(&mut user, &bank, 500_000).unwrap();
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Collateral(0));

    // With health checks on, borrowing past the only collateral is refused.
    let checked = BalanceEngine::default();
    let mut user = new_user();
    checked.deposit(&mut user, &bank, 1_000_000).unwrap();
    let set = BankSet::from_banks(0, [bank]).unwrap();
    assert_eq!(checked.withdraw(&mut user, &bank, 1_500_000, &set), Err(LendingError::Undercollateralized));
}

#[test]
fn test_liquidation_scenario() {
    let engine = BalanceEngine::default();
    let usdc = usdc();
    let mut sol = sol(200);
    let mut user = new_user();
    let liquidator = new_user();
    let liquidator_before = liquidator;

    // $2.00 of SOL backs $1.20 of USDC debt.
    engine.deposit(&mut user, &sol, 10_000_000).unwrap();
    let banks = BankSet::from_banks(0, [usdc, sol]).unwrap();
    engine.withdraw(&mut user, &usdc, 1_200_000, &banks).unwrap();

    assert_eq!(
        engine.liquidate(&mut user, &sol, &usdc, 300_000, &banks),
        Err(LendingError::PositionHealthy)
    );

    // SOL halves; collateral is now worth $1.00.
    sol.set_price(PriceFeed::new(100 * 100_000_000, -8, 1_700_000_100));
    let banks = BankSet::from_banks(0, [usdc, sol]).unwrap();
    let outcome = engine.liquidate(&mut user, &sol, &usdc, 300_000, &banks).unwrap();

    // 300_000 * 100 / 95 = 315_789 micro-USD -> 3_157_890 lamports at $100.
    assert_eq!(outcome.seized_amount, 3_157_890);
    assert_eq!(outcome.repaid.before, Position::Liability(1_200_000));
    assert_eq!(outcome.repaid.after, Position::Liability(900_000));
    assert_eq!(outcome.seized.after, Position::Collateral(10_000_000 - 3_157_890));
    assert_eq!(user.position(USDC_BANK).unwrap(), Position::Liability(900_000));
    assert_eq!(user.position(SOL_BANK).unwrap(), Position::Collateral(6_842_110));
    assert!(!outcome.health_before.is_healthy());
    assert_eq!(outcome.health_after.collateral, 684_211);
    assert_eq!(outcome.health_after.liability, 900_000);
    // Still short after one partial liquidation; reported, not rejected.
    assert!(!outcome.health_after.is_healthy());
    assert_eq!(liquidator, liquidator_before);
}

#[test]
fn test_liquidation_rejections() {
    let engine = BalanceEngine::default();
    let usdc = usdc();
    let sol = sol(100);
    let banks = BankSet::from_banks(0, [usdc, sol]).unwrap();

    let mut user = new_user();
    user.update_balance(SOL_BANK, 1_000_000, Direction::Deposit).unwrap();
    user.update_balance(USDC_BANK, 1_000_000, Direction::Withdrawal).unwrap();
    let snapshot = user;

    // Repaying $0.20 seizes ~0.0021 SOL, more than the 0.001 SOL held.
    assert_eq!(
        engine.liquidate(&mut user, &sol, &usdc, 200_000, &banks),
        Err(LendingError::InsufficientCollateral)
    );
    assert_eq!(
        engine.liquidate(&mut user, &usdc, &sol, 1, &banks),
        Err(LendingError::NoLiabilityPosition)
    );
    assert_eq!(
        engine.liquidate(&mut user, &usdc, &usdc, 1, &banks),
        Err(LendingError::InvalidLiquidationPair)
    );
    let mut inactive = sol;
    inactive.set_status(BankStatus::Inactive);
    assert_eq!(
        engine.liquidate(&mut user, &inactive, &usdc, 1, &banks),
        Err(LendingError::BankInactive)
    );
    let mut inactive_liability = usdc;
    inactive_liability.set_status(BankStatus::Inactive);
    assert_eq!(
        engine.liquidate(&mut user, &sol, &inactive_liability, 1, &banks),
        Err(LendingError::BankNotAvailableForWithdrawal)
    );
    assert_eq!(user, snapshot);
}

#[test]
fn test_liquidation_reduce_only_banks() {
    let engine = BalanceEngine::default();
    let usdc = usdc();
    let sol = sol(100);
    let banks = BankSet::from_banks(0, [usdc, sol]).unwrap();

    let mut user = new_user();
    user.update_balance(SOL_BANK, 10_000_000, Direction::Deposit).unwrap();
    user.update_balance(USDC_BANK, 1_200_000, Direction::Withdrawal).unwrap();
    let snapshot = user;

    // Collateral can only be seized from an active bank.
    let mut reduce_only_sol = sol;
    reduce_only_sol.set_status(BankStatus::ReduceOnly);
    assert_eq!(
        engine.liquidate(&mut user, &reduce_only_sol, &usdc, 100_000, &banks),
        Err(LendingError::BankInactive)
    );
    assert_eq!(user, snapshot);

    // Debt in a reduce-only bank can still be repaid.
    let mut reduce_only_usdc = usdc;
    reduce_only_usdc.set_status(BankStatus::ReduceOnly);
    let outcome = engine.liquidate(&mut user, &sol, &reduce_only_usdc, 100_000, &banks).unwrap();
    assert_eq!(outcome.repaid.after, Position::Liability(1_100_000));
}

#[test]
fn test_operation_banks_override_bank_set() {
    let engine = BalanceEngine::default();
    let usdc = usdc();
    let mut sol = sol(200);
    let mut user = new_user();
    engine.deposit(&mut user, &sol, 10_000_000).unwrap();
    let stale = BankSet::from_banks(0, [usdc, sol]).unwrap();
    engine.withdraw(&mut user, &usdc, 1_200_000, &stale).unwrap();

    // The set still prices SOL at $200; the bank passed in is at $100.
    sol.set_price(PriceFeed::new(100 * 100_000_000, -8, 1_700_000_100));
    let snapshot = user;
    let outcome = engine.liquidate(&mut user, &sol, &usdc, 300_000, &stale).unwrap();
    assert_eq!(outcome.seized_amount, 3_157_890);
    assert_eq!(outcome.health_before.collateral, 1_000_000);

    // Same for withdrawals: the fresh price leaves no borrowing room.
    let mut user = snapshot;
    assert_eq!(engine.withdraw(&mut user, &sol, 1, &stale), Err(LendingError::Undercollateralized));
    assert_eq!(user, snapshot);

    let mut set = stale.clone();
    set.upsert(sol).unwrap();
    assert_eq!(set.len(), 2);
    assert!(set.upsert(make_bank(2, 6, 1, 0, BankStatus::Active)).is_ok());
    assert_eq!(set.len(), 3);
}

// --- Counters ---

#[test]
fn test_counter_overflow() {
    let mut admin = Admin::new(&Pubkey::new_unique());
    for expected in 0..255u8 {
        assert_eq!(admin.register_pool().unwrap(), expected);
    }
    assert_eq!(admin.pool_count, 255);
    assert_eq!(admin.register_pool(), Err(LendingError::CounterOverflow));
    assert_eq!(admin.pool_count, 255);

    let mut group_admin = TokenGroupAdmin::new(&Pubkey::new_unique());
    group_admin.token_group_count = 255;
    assert_eq!(group_admin.register_token_group(), Err(LendingError::CounterOverflow));
    assert_eq!(group_admin.token_group_count, 255);

    let mut pool = Pool { bank_count: 254 };
    assert_eq!(pool.register_bank().unwrap(), 254);
    assert_eq!(pool.register_bank(), Err(LendingError::CounterOverflow));
    assert_eq!(pool.bank_count, 255);
}

#[test]
fn test_admin_record_round_trip_after_transitions() {
    let mut admin = Admin::new(&Pubkey::new_unique());
    admin.register_pool().unwrap();
    let new_authority = Pubkey::new_unique();
    admin.set_authority(&new_authority);
    let decoded = Admin::decode(&admin.encode()).unwrap();
    assert_eq!(decoded.authority(), new_authority);
    assert_eq!(decoded.pool_count, 1);

    let mut group_admin = TokenGroupAdmin::new(&new_authority);
    group_admin.register_token_group().unwrap();
    group_admin.register_token_group().unwrap();
    let decoded = TokenGroupAdmin::decode(&group_admin.encode()).unwrap();
    assert_eq!(decoded.token_group_count, 2);
}

// --- Errors ---

#[test]
fn test_protocol_error_codes() {
    // Every error enum numbers from 6000.
    assert_eq!(ProtocolError::from_code(ErrorDomain::Bank, 6001), Some(ProtocolError::Bank(BankError::BankInactive)));
    assert_eq!(
        ProtocolError::from_code(ErrorDomain::User, 6001),
        Some(ProtocolError::User(UserError::InvalidAuthority))
    );
    assert_eq!(
        ProtocolError::from_code(ErrorDomain::User, 6006),
        Some(ProtocolError::User(UserError::InsufficientCollateral))
    );
    assert_eq!(ProtocolError::from_code(ErrorDomain::User, 6012), None);
    assert_eq!(ProtocolError::from_code(ErrorDomain::Admin, 5999), None);

    let e = ProtocolError::Bank(BankError::BankNotAvailableForWithdrawal);
    assert_eq!((e.domain(), e.code()), (ErrorDomain::Bank, 6002));
    assert!(!e.is_retryable());
}

#[test]
fn test_protocol_errors_decode_per_instruction() {
    let admin_ix = LendingInstruction::InitializePool;
    assert_eq!(admin_ix.decode_error(6000), vec![ProtocolError::Admin(AdminError::Unauthorized)]);
    assert_eq!(
        ProtocolError::from_program_error(admin_ix.error_domains(), &ProgramError::Custom(6003)),
        Some(ProtocolError::Admin(AdminError::Overflow))
    );

    let user_ix = LendingInstruction::InitializeUser { pool_id: 0, user_id: 0 };
    assert_eq!(user_ix.decode_error(6000), vec![ProtocolError::User(UserError::AlreadyInitialized)]);

    // A deposit can fail in either the bank or the user enum.
    let deposit = LendingInstruction::Deposit { amount: 1 };
    assert_eq!(
        deposit.decode_error(6001),
        vec![ProtocolError::Bank(BankError::BankInactive), ProtocolError::User(UserError::InvalidAuthority)]
    );
    assert_eq!(ProtocolError::from_program_error(deposit.error_domains(), &ProgramError::Custom(6001)), None);
    // Only the user enum reaches 6003.
    assert_eq!(
        ProtocolError::from_program_error(deposit.error_domains(), &ProgramError::Custom(6003)),
        Some(ProtocolError::User(UserError::MaxTokenTypes))
    );

    let withdraw = LendingInstruction::Withdraw { amount: 1 };
    assert_eq!(withdraw.decode_error(6005).len(), 2);
    assert_eq!(ProtocolError::from_program_error(withdraw.error_domains(), &ProgramError::InvalidArgument), None);
}

#[test]
fn test_lending_error_into_program_error() {
    let e: ProgramError = LendingError::MaxTokenTypes.into();
    assert_eq!(e, ProgramError::Custom(LendingError::MaxTokenTypes.code()));
    assert_ne!(LendingError::Overflow.code(), LendingError::InvalidPrice.code());
}
