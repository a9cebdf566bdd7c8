//! Lending SDK: deterministic account addresses, fixed-layout account codec,
//! instruction builders and the client-side balance engine for the
//! pool/bank lending protocol.

#![deny(unsafe_code)]

pub mod tags;

solana_program::declare_id!("HKViZ7i7fEpfqcpCpDWAfmZpuVZ6WSRXST85nf1w227q");

// 1. mod constants
pub mod constants {
    use core::mem::size_of;
    use solana_program::pubkey::Pubkey;
    use crate::state::{Admin, Bank, Pool, TokenConfig, User};
    use crate::tags::DISCRIMINATOR_LEN;

    pub const ADMIN_SEED: &[u8] = b"admin";
    pub const POOL_SEED: &[u8] = b"pool";
    pub const BANK_SEED: &[u8] = b"bank";
    pub const TOKEN_ACCOUNT_SEED: &[u8] = b"token_account";
    pub const TOKEN_CONFIG_SEED: &[u8] = b"token_config";
    pub const USER_SEED: &[u8] = b"user";

    pub const MAX_TOKEN_BALANCES: usize = 16;

    /// USD values are fixed point with this many decimals.
    pub const USD_DECIMALS: u32 = 6;
    /// Collateral seized on liquidation is `repaid_usd * 100 / discount`.
    pub const LIQUIDATION_DISCOUNT_PCT: u8 = 95;
    pub const WEIGHT_DENOMINATOR: u128 = 100;

    pub const ADMIN_LEN: usize = DISCRIMINATOR_LEN + size_of::<Admin>();
    pub const POOL_LEN: usize = DISCRIMINATOR_LEN + size_of::<Pool>();
    pub const BANK_LEN: usize = DISCRIMINATOR_LEN + size_of::<Bank>();
    pub const TOKEN_CONFIG_LEN: usize = DISCRIMINATOR_LEN + size_of::<TokenConfig>();
    pub const USER_LEN: usize = DISCRIMINATOR_LEN + size_of::<User>();

    pub const TOKEN_2022_PROGRAM_ID: Pubkey = spl_token_2022::ID;
}

// 2. mod error
pub mod error {
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use solana_program::program_error::ProgramError;
    use thiserror::Error;

    /// Failures detected locally, before anything is submitted.
    #[derive(Clone, Debug, Eq, PartialEq, Error)]
    pub enum LendingError {
        #[error("malformed {kind} account: {reason}")]
        MalformedAccount { kind: &'static str, reason: &'static str },
        #[error("invalid instruction data")]
        InvalidInstructionData,
        #[error("invalid bank status value {0}")]
        InvalidBankStatus(u8),
        #[error("invalid balance type value {0}")]
        InvalidBalanceType(u8),
        #[error("token program requires the mint account")]
        MissingMint,
        #[error("seeds and bump do not produce a valid program address")]
        InvalidSeeds,
        #[error("math overflow")]
        Overflow,
        #[error("price must be positive")]
        InvalidPrice,
        #[error("counter overflow")]
        CounterOverflow,
        #[error("all token balance slots are in use")]
        MaxTokenTypes,
        #[error("bank is not active for deposits")]
        BankInactive,
        #[error("bank is not available for withdrawals")]
        BankNotAvailableForWithdrawal,
        #[error("pool mismatch: expected {expected}, found {found}")]
        PoolMismatch { expected: u8, found: u8 },
        #[error("bank {0} is required for health evaluation")]
        MissingRequiredBank(u8),
        #[error("position would be undercollateralized")]
        Undercollateralized,
        #[error("position is healthy and cannot be liquidated")]
        PositionHealthy,
        #[error("no liability position for the liability bank")]
        NoLiabilityPosition,
        #[error("insufficient collateral")]
        InsufficientCollateral,
        #[error("collateral and liability banks must differ")]
        InvalidLiquidationPair,
    }

    impl LendingError {
        pub fn code(&self) -> u32 {
            match self {
                LendingError::MalformedAccount { .. } => 0,
                LendingError::InvalidInstructionData => 1,
                LendingError::InvalidBankStatus(_) => 2,
                LendingError::InvalidBalanceType(_) => 3,
                LendingError::MissingMint => 4,
                LendingError::InvalidSeeds => 5,
                LendingError::Overflow => 6,
                LendingError::InvalidPrice => 7,
                LendingError::CounterOverflow => 8,
                LendingError::MaxTokenTypes => 9,
                LendingError::BankInactive => 10,
                LendingError::BankNotAvailableForWithdrawal => 11,
                LendingError::PoolMismatch { .. } => 12,
                LendingError::MissingRequiredBank(_) => 13,
                LendingError::Undercollateralized => 14,
                LendingError::PositionHealthy => 15,
                LendingError::NoLiabilityPosition => 16,
                LendingError::InsufficientCollateral => 17,
                LendingError::InvalidLiquidationPair => 18,
            }
        }
    }

    impl From<LendingError> for ProgramError {
        fn from(e: LendingError) -> Self {
            ProgramError::Custom(e.code())
        }
    }

    pub(crate) fn malformed(kind: &'static str, reason: &'static str) -> LendingError {
        LendingError::MalformedAccount { kind, reason }
    }

    /// Error enum a program code is looked up in. Each enum numbers its
    /// variants from 6000, so a code only has meaning within its domain.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum ErrorDomain {
        Admin,
        Bank,
        User,
        Health,
        Oracle,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Error)]
    #[repr(u32)]
    pub enum AdminError {
        #[error("operation not authorized")]
        Unauthorized = 6000,
        #[error("invalid group id")]
        InvalidGroupId = 6001,
        #[error("invalid input")]
        InvalidInput = 6002,
        #[error("numeric overflow")]
        Overflow = 6003,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Error)]
    #[repr(u32)]
    pub enum BankError {
        #[error("bank not found")]
        BankNotFound = 6000,
        #[error("bank is inactive for deposits")]
        BankInactive = 6001,
        #[error("bank is not available for withdrawals")]
        BankNotAvailableForWithdrawal = 6002,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Error)]
    #[repr(u32)]
    pub enum UserError {
        #[error("account already initialized")]
        AlreadyInitialized = 6000,
        #[error("invalid authority provided")]
        InvalidAuthority = 6001,
        #[error("balance update overflow")]
        BalanceUpdateOverflow = 6002,
        #[error("max token types exceeded")]
        MaxTokenTypes = 6003,
        #[error("pool not found")]
        PoolNotFound = 6004,
        #[error("invalid collateral balance")]
        InvalidCollateralBalance = 6005,
        #[error("insufficient collateral")]
        InsufficientCollateral = 6006,
    }

    /// Raised while the program prices a user's positions.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Error)]
    #[repr(u32)]
    pub enum HealthError {
        #[error("missing required banks")]
        MissingRequiredBanks = 6000,
        #[error("bank not found")]
        BankNotFound = 6001,
        #[error("collateral value overflow")]
        CollateralOverflow = 6002,
        #[error("liability value overflow")]
        LiabilityOverflow = 6003,
        #[error("net value overflow")]
        NetValueOverflow = 6004,
        #[error("weight overflow")]
        WeightOverflow = 6005,
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive, Error)]
    #[repr(u32)]
    pub enum OracleError {
        #[error("math overflow")]
        MathOverflow = 6000,
    }

    /// Numeric codes returned by the lending program after submission,
    /// qualified by the error enum that produced them.
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Error)]
    pub enum ProtocolError {
        #[error(transparent)]
        Admin(AdminError),
        #[error(transparent)]
        Bank(BankError),
        #[error(transparent)]
        User(UserError),
        #[error(transparent)]
        Health(HealthError),
        #[error(transparent)]
        Oracle(OracleError),
    }

    impl ProtocolError {
        pub fn from_code(domain: ErrorDomain, code: u32) -> Option<Self> {
            match domain {
                ErrorDomain::Admin => AdminError::from_u32(code).map(ProtocolError::Admin),
                ErrorDomain::Bank => BankError::from_u32(code).map(ProtocolError::Bank),
                ErrorDomain::User => UserError::from_u32(code).map(ProtocolError::User),
                ErrorDomain::Health => HealthError::from_u32(code).map(ProtocolError::Health),
                ErrorDomain::Oracle => OracleError::from_u32(code).map(ProtocolError::Oracle),
            }
        }

        /// Every reading of `code` across `domains`, in domain order. An
        /// instruction that can fail in several enums yields several
        /// candidates for the same code.
        pub fn candidates(domains: &[ErrorDomain], code: u32) -> Vec<Self> {
            domains.iter().filter_map(|d| Self::from_code(*d, code)).collect()
        }

        /// Decodes a custom program error, provided exactly one domain
        /// explains it.
        pub fn from_program_error(domains: &[ErrorDomain], e: &ProgramError) -> Option<Self> {
            match e {
                ProgramError::Custom(code) => match Self::candidates(domains, *code).as_slice() {
                    [only] => Some(*only),
                    _ => None,
                },
                _ => None,
            }
        }

        pub fn domain(&self) -> ErrorDomain {
            match self {
                ProtocolError::Admin(_) => ErrorDomain::Admin,
                ProtocolError::Bank(_) => ErrorDomain::Bank,
                ProtocolError::User(_) => ErrorDomain::User,
                ProtocolError::Health(_) => ErrorDomain::Health,
                ProtocolError::Oracle(_) => ErrorDomain::Oracle,
            }
        }

        pub fn code(&self) -> u32 {
            match self {
                ProtocolError::Admin(e) => *e as u32,
                ProtocolError::Bank(e) => *e as u32,
                ProtocolError::User(e) => *e as u32,
                ProtocolError::Health(e) => *e as u32,
                ProtocolError::Oracle(e) => *e as u32,
            }
        }

        /// Program rejections are final; only transport failures are retried,
        /// and those never reach this type.
        pub fn is_retryable(&self) -> bool {
            false
        }
    }
}

// 3. mod pda
pub mod pda {
    use solana_program::pubkey::Pubkey;
    use crate::constants::{
        ADMIN_SEED, BANK_SEED, POOL_SEED, TOKEN_ACCOUNT_SEED, TOKEN_CONFIG_SEED, USER_SEED,
    };
    use crate::error::LendingError;

    /// Seed sets for every derivable protocol account.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum AddressSeeds {
        Admin,
        Pool { pool_id: u8 },
        Bank { pool_id: u8, bank_id: u8 },
        /// Bank keyed by mint instead of pool position.
        MintBank { mint: Pubkey, group_id: u8 },
        /// Token vault owned by a bank or token config.
        TokenVault { owner: Pubkey },
        TokenConfig { mint: Pubkey, group_id: u8 },
        User { pool_id: u8, user_id: u16, wallet: Pubkey },
    }

    impl AddressSeeds {
        pub fn seeds(&self) -> Vec<Vec<u8>> {
            match self {
                AddressSeeds::Admin => vec![ADMIN_SEED.to_vec()],
                AddressSeeds::Pool { pool_id } => vec![POOL_SEED.to_vec(), vec![*pool_id]],
                AddressSeeds::Bank { pool_id, bank_id } => {
                    vec![BANK_SEED.to_vec(), vec![*pool_id], vec![*bank_id]]
                }
                AddressSeeds::MintBank { mint, group_id } => {
                    vec![BANK_SEED.to_vec(), mint.to_bytes().to_vec(), vec![*group_id]]
                }
                AddressSeeds::TokenVault { owner } => {
                    vec![TOKEN_ACCOUNT_SEED.to_vec(), owner.to_bytes().to_vec()]
                }
                AddressSeeds::TokenConfig { mint, group_id } => {
                    vec![TOKEN_CONFIG_SEED.to_vec(), mint.to_bytes().to_vec(), vec![*group_id]]
                }
                AddressSeeds::User { pool_id, user_id, wallet } => vec![
                    USER_SEED.to_vec(),
                    vec![*pool_id],
                    user_id.to_le_bytes().to_vec(),
                    wallet.to_bytes().to_vec(),
                ],
            }
        }

        /// Canonical address and bump.
        pub fn find(&self, program_id: &Pubkey) -> (Pubkey, u8) {
            let seeds = self.seeds();
            let refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
            Pubkey::find_program_address(&refs, program_id)
        }

        /// Rebuilds the address from a stored bump.
        pub fn create(&self, bump: u8, program_id: &Pubkey) -> Result<Pubkey, LendingError> {
            let mut seeds = self.seeds();
            seeds.push(vec![bump]);
            let refs: Vec<&[u8]> = seeds.iter().map(Vec::as_slice).collect();
            Pubkey::create_program_address(&refs, program_id).map_err(|_| LendingError::InvalidSeeds)
        }

        pub fn verify(&self, address: &Pubkey, bump: u8, program_id: &Pubkey) -> bool {
            matches!(self.create(bump, program_id), Ok(derived) if derived == *address)
        }
    }

    pub fn find_admin_address(program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::Admin.find(program_id)
    }

    pub fn find_pool_address(pool_id: u8, program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::Pool { pool_id }.find(program_id)
    }

    pub fn find_bank_address(pool_id: u8, bank_id: u8, program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::Bank { pool_id, bank_id }.find(program_id)
    }

    pub fn find_mint_bank_address(mint: &Pubkey, group_id: u8, program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::MintBank { mint: *mint, group_id }.find(program_id)
    }

    pub fn find_token_vault_address(owner: &Pubkey, program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::TokenVault { owner: *owner }.find(program_id)
    }

    pub fn find_token_config_address(mint: &Pubkey, group_id: u8, program_id: &Pubkey) -> (Pubkey, u8) {
        AddressSeeds::TokenConfig { mint: *mint, group_id }.find(program_id)
    }

    pub fn find_user_address(
        pool_id: u8,
        user_id: u16,
        wallet: &Pubkey,
        program_id: &Pubkey,
    ) -> (Pubkey, u8) {
        AddressSeeds::User { pool_id, user_id, wallet: *wallet }.find(program_id)
    }
}

// 4. mod state
pub mod state {
    use arrayref::array_ref;
    use bytemuck::{Pod, Zeroable};
    use core::mem::size_of;
    use num_derive::FromPrimitive;
    use num_traits::FromPrimitive;
    use solana_program::{msg, pubkey::Pubkey};
    use crate::constants::MAX_TOKEN_BALANCES;
    use crate::error::{malformed, LendingError};
    use crate::tags::{self, DISCRIMINATOR_LEN};

    /// Fixed-layout account record prefixed by an 8-byte discriminator.
    pub trait AccountRecord: Pod {
        const DISCRIMINATOR: [u8; 8];
        const KIND: &'static str;
        const LEN: usize = DISCRIMINATOR_LEN + size_of::<Self>();

        /// Field-level checks run after the raw bytes are copied in.
        fn validate(&self) -> Result<(), LendingError> {
            Ok(())
        }

        fn decode(data: &[u8]) -> Result<Self, LendingError> {
            if data.len() != Self::LEN {
                return Err(malformed(Self::KIND, "unexpected account length"));
            }
            if array_ref![data, 0, 8] != &Self::DISCRIMINATOR {
                return Err(malformed(Self::KIND, "discriminator mismatch"));
            }
            let mut record = Self::zeroed();
            bytemuck::bytes_of_mut(&mut record).copy_from_slice(&data[DISCRIMINATOR_LEN..]);
            record.validate()?;
            Ok(record)
        }

        fn encode(&self) -> Vec<u8> {
            let mut out = Vec::with_capacity(Self::LEN);
            out.extend_from_slice(&Self::DISCRIMINATOR);
            out.extend_from_slice(bytemuck::bytes_of(self));
            out
        }

        fn encode_into(&self, data: &mut [u8]) -> Result<(), LendingError> {
            if data.len() != Self::LEN {
                return Err(malformed(Self::KIND, "unexpected account length"));
            }
            data[..DISCRIMINATOR_LEN].copy_from_slice(&Self::DISCRIMINATOR);
            data[DISCRIMINATOR_LEN..].copy_from_slice(bytemuck::bytes_of(self));
            Ok(())
        }
    }

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive)]
    #[repr(u8)]
    pub enum BankStatus {
        /// Bank cannot be used
        #[default]
        Inactive = 0,
        Active = 1,
        /// Withdrawals and repayments only
        ReduceOnly = 2,
    }

    pub type TokenConfigStatus = BankStatus;

    impl TryFrom<u8> for BankStatus {
        type Error = LendingError;

        fn try_from(value: u8) -> Result<Self, Self::Error> {
            <Self as FromPrimitive>::from_u8(value).ok_or(LendingError::InvalidBankStatus(value))
        }
    }

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive)]
    #[repr(u8)]
    pub enum BalanceType {
        #[default]
        Collateral = 0,
        Liability = 1,
    }

    impl TryFrom<u8> for BalanceType {
        type Error = LendingError;

        fn try_from(value: u8) -> Result<Self, Self::Error> {
            <Self as FromPrimitive>::from_u8(value).ok_or(LendingError::InvalidBalanceType(value))
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Direction {
        Deposit,
        Withdrawal,
    }

    /// A user's position in one bank. The magnitude is never negative.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum Position {
        Collateral(u64),
        Liability(u64),
    }

    impl Default for Position {
        fn default() -> Self {
            Position::CLOSED
        }
    }

    impl Position {
        pub const CLOSED: Position = Position::Collateral(0);

        pub fn amount(&self) -> u64 {
            match self {
                Position::Collateral(a) | Position::Liability(a) => *a,
            }
        }

        pub fn balance_type(&self) -> BalanceType {
            match self {
                Position::Collateral(_) => BalanceType::Collateral,
                Position::Liability(_) => BalanceType::Liability,
            }
        }

        pub fn is_closed(&self) -> bool {
            self.amount() == 0
        }

        /// Collateral positive, liability negative.
        pub fn signed(&self) -> i128 {
            match self {
                Position::Collateral(a) => *a as i128,
                Position::Liability(a) => -(*a as i128),
            }
        }

        /// Zero liabilities are stored as closed collateral.
        pub fn normalized(self) -> Position {
            match self {
                Position::Liability(0) => Position::CLOSED,
                p => p,
            }
        }

        pub fn after_deposit(self, amount: u64) -> Result<Position, LendingError> {
            let next = match self {
                Position::Collateral(b) => {
                    Position::Collateral(b.checked_add(amount).ok_or(LendingError::Overflow)?)
                }
                Position::Liability(b) if amount < b => Position::Liability(b - amount),
                Position::Liability(b) => Position::Collateral(amount - b),
            };
            Ok(next.normalized())
        }

        pub fn after_withdrawal(self, amount: u64) -> Result<Position, LendingError> {
            let next = match self {
                Position::Liability(b) => {
                    Position::Liability(b.checked_add(amount).ok_or(LendingError::Overflow)?)
                }
                Position::Collateral(b) if amount <= b => Position::Collateral(b - amount),
                Position::Collateral(b) => Position::Liability(amount - b),
            };
            Ok(next.normalized())
        }

        pub fn apply(self, amount: u64, direction: Direction) -> Result<Position, LendingError> {
            match direction {
                Direction::Deposit => self.after_deposit(amount),
                Direction::Withdrawal => self.after_withdrawal(amount),
            }
        }
    }

    /// One applied slot transition.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct BalanceChange {
        pub bank_id: u8,
        pub slot: usize,
        pub before: Position,
        pub after: Position,
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct Admin {
        pub authority: [u8; 32],
        pub pool_count: u8,
    }

    impl AccountRecord for Admin {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_ADMIN;
        const KIND: &'static str = "admin";
    }

    impl Admin {
        pub fn new(authority: &Pubkey) -> Self {
            Self { authority: authority.to_bytes(), pool_count: 0 }
        }

        pub fn authority(&self) -> Pubkey {
            Pubkey::new_from_array(self.authority)
        }

        pub fn set_authority(&mut self, authority: &Pubkey) {
            msg!("Admin authority updated from {} to {}", self.authority(), authority);
            self.authority = authority.to_bytes();
        }

        /// Assigns the next pool id. The counter is untouched on overflow.
        pub fn register_pool(&mut self) -> Result<u8, LendingError> {
            let pool_id = self.pool_count;
            self.pool_count = pool_id.checked_add(1).ok_or(LendingError::CounterOverflow)?;
            msg!("Pool {} registered, pool count {}", pool_id, self.pool_count);
            Ok(pool_id)
        }
    }

    /// Admin record of token-group deployments. Same tag and size as
    /// `Admin`; the counter byte holds the number of token groups.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct TokenGroupAdmin {
        pub authority: [u8; 32],
        pub token_group_count: u8,
    }

    impl AccountRecord for TokenGroupAdmin {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_ADMIN;
        const KIND: &'static str = "admin";
    }

    impl TokenGroupAdmin {
        pub fn new(authority: &Pubkey) -> Self {
            Self { authority: authority.to_bytes(), token_group_count: 0 }
        }

        pub fn authority(&self) -> Pubkey {
            Pubkey::new_from_array(self.authority)
        }

        pub fn set_authority(&mut self, authority: &Pubkey) {
            self.authority = authority.to_bytes();
        }

        pub fn register_token_group(&mut self) -> Result<u8, LendingError> {
            let group_id = self.token_group_count;
            self.token_group_count = group_id.checked_add(1).ok_or(LendingError::CounterOverflow)?;
            msg!("Token group {} registered, group count {}", group_id, self.token_group_count);
            Ok(group_id)
        }
    }

    /// Keyed by its pool id through the address seeds; the record itself
    /// only counts banks.
    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct Pool {
        pub bank_count: u8,
    }

    impl AccountRecord for Pool {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_POOL;
        const KIND: &'static str = "pool";
    }

    impl Pool {
        pub fn register_bank(&mut self) -> Result<u8, LendingError> {
            let bank_id = self.bank_count;
            self.bank_count = bank_id.checked_add(1).ok_or(LendingError::CounterOverflow)?;
            msg!("Bank {} registered, bank count {}", bank_id, self.bank_count);
            Ok(bank_id)
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct PriceFeed {
        pub price: i64,
        pub conf: i64,
        pub ema_price: i64,
        pub ema_conf: i64,
        /// Signed power of ten applied to `price`.
        pub exponent: i32,
        pub _padding: [u8; 4],
        pub publish_time: i64,
    }

    impl PriceFeed {
        pub fn new(price: i64, exponent: i32, publish_time: i64) -> Self {
            Self { price, ema_price: price, exponent, publish_time, ..Self::default() }
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct Bank {
        pub mint: [u8; 32],
        pub pool_id: u8,
        pub bank_id: u8,
        pub bump: u8,
        pub status: u8,
        pub decimals: u8,
        /// Percent weights used by health evaluation.
        pub initial_asset_weight: u8,
        pub maintenance_asset_weight: u8,
        pub initial_liability_weight: u8,
        pub maintenance_liability_weight: u8,
        pub _padding: [u8; 7],
        pub price_message: PriceFeed,
    }

    impl AccountRecord for Bank {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_BANK;
        const KIND: &'static str = "bank";

        fn validate(&self) -> Result<(), LendingError> {
            BankStatus::try_from(self.status).map_err(|_| malformed(Self::KIND, "invalid status"))?;
            Ok(())
        }
    }

    impl Bank {
        /// New banks start inactive with neutral (100%) weights.
        pub fn new(mint: &Pubkey, pool_id: u8, bank_id: u8, bump: u8, decimals: u8) -> Self {
            Self {
                mint: mint.to_bytes(),
                pool_id,
                bank_id,
                bump,
                decimals,
                initial_asset_weight: 100,
                maintenance_asset_weight: 100,
                initial_liability_weight: 100,
                maintenance_liability_weight: 100,
                ..Self::default()
            }
        }

        pub fn with_weights(
            mut self,
            initial_asset: u8,
            maintenance_asset: u8,
            initial_liability: u8,
            maintenance_liability: u8,
        ) -> Self {
            self.initial_asset_weight = initial_asset;
            self.maintenance_asset_weight = maintenance_asset;
            self.initial_liability_weight = initial_liability;
            self.maintenance_liability_weight = maintenance_liability;
            self
        }

        pub fn mint(&self) -> Pubkey {
            Pubkey::new_from_array(self.mint)
        }

        pub fn status(&self) -> Result<BankStatus, LendingError> {
            BankStatus::try_from(self.status)
        }

        pub fn set_status(&mut self, status: BankStatus) {
            msg!("Bank {} status {} -> {}", self.bank_id, self.status, status as u8);
            self.status = status as u8;
        }

        pub fn set_price(&mut self, price: PriceFeed) {
            self.price_message = PriceFeed { _padding: [0; 4], ..price };
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct TokenConfig {
        pub mint: [u8; 32],
        pub group_id: u8,
        pub bump: u8,
        pub status: u8,
    }

    impl AccountRecord for TokenConfig {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_TOKEN_CONFIG;
        const KIND: &'static str = "token_config";

        fn validate(&self) -> Result<(), LendingError> {
            BankStatus::try_from(self.status).map_err(|_| malformed(Self::KIND, "invalid status"))?;
            Ok(())
        }
    }

    impl TokenConfig {
        pub fn new(mint: &Pubkey, group_id: u8, bump: u8) -> Self {
            Self { mint: mint.to_bytes(), group_id, bump, status: BankStatus::Inactive as u8 }
        }

        pub fn mint(&self) -> Pubkey {
            Pubkey::new_from_array(self.mint)
        }

        pub fn status(&self) -> Result<TokenConfigStatus, LendingError> {
            BankStatus::try_from(self.status)
        }

        pub fn set_status(&mut self, status: TokenConfigStatus) {
            self.status = status as u8;
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct TokenBalance {
        /// Native token units, never negative.
        pub balance: i64,
        pub bank_id: u8,
        pub balance_type: u8,
        pub _padding: [u8; 6],
    }

    impl TokenBalance {
        /// Placeholder slots hold bank 0 with a zero balance.
        pub fn is_free(&self) -> bool {
            self.bank_id == 0 && self.balance == 0
        }

        pub fn position(&self) -> Result<Position, LendingError> {
            if self.balance < 0 {
                return Err(malformed(User::KIND, "negative token balance"));
            }
            let amount = self.balance as u64;
            Ok(match BalanceType::try_from(self.balance_type)? {
                BalanceType::Collateral => Position::Collateral(amount),
                BalanceType::Liability => Position::Liability(amount),
            })
        }

        fn store(&mut self, bank_id: u8, position: Position) -> Result<(), LendingError> {
            self.balance = i64::try_from(position.amount()).map_err(|_| LendingError::Overflow)?;
            self.bank_id = bank_id;
            self.balance_type = position.balance_type() as u8;
            Ok(())
        }

        /// Ordering applied after a new slot is claimed: open bank 0 first,
        /// then banks by id, placeholders last.
        fn sort_key(&self) -> (u8, u8) {
            match (self.bank_id, self.balance) {
                (0, 0) => (2, 0),
                (0, _) => (0, 0),
                (id, _) => (1, id),
            }
        }
    }

    #[repr(C)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Pod, Zeroable)]
    pub struct User {
        pub authority: [u8; 32],
        pub id: u16,
        pub pool_id: u8,
        pub bump: u8,
        pub _padding: [u8; 4],
        pub token_balances: [TokenBalance; MAX_TOKEN_BALANCES],
    }

    impl AccountRecord for User {
        const DISCRIMINATOR: [u8; 8] = tags::ACCOUNT_USER;
        const KIND: &'static str = "user";

        fn validate(&self) -> Result<(), LendingError> {
            for slot in self.token_balances.iter() {
                slot.position().map_err(|_| malformed(Self::KIND, "invalid token balance"))?;
            }
            Ok(())
        }
    }

    impl User {
        pub fn new(authority: &Pubkey, id: u16, pool_id: u8, bump: u8) -> Self {
            Self { authority: authority.to_bytes(), id, pool_id, bump, ..Self::default() }
        }

        pub fn authority(&self) -> Pubkey {
            Pubkey::new_from_array(self.authority)
        }

        /// First slot carrying `bank_id`. For bank 0 this may be a
        /// placeholder, which reads as a closed position.
        pub fn find_slot(&self, bank_id: u8) -> Option<usize> {
            self.token_balances.iter().position(|b| b.bank_id == bank_id)
        }

        /// Position held in `bank_id`; banks never touched read as closed.
        pub fn position(&self, bank_id: u8) -> Result<Position, LendingError> {
            match self.find_slot(bank_id) {
                Some(slot) => self.token_balances[slot].position(),
                None => Ok(Position::CLOSED),
            }
        }

        pub fn slots_in_use(&self) -> usize {
            self.token_balances.iter().filter(|b| !b.is_free()).count()
        }

        /// Bank ids with a non-zero position, in slot order. These are the
        /// banks a health check has to price.
        pub fn open_bank_ids(&self) -> Vec<u8> {
            self.token_balances
                .iter()
                .filter(|b| b.balance != 0)
                .map(|b| b.bank_id)
                .collect()
        }

        /// Applies one transition to the slot holding `bank_id`. On first
        /// touch the first placeholder is claimed and the slots are re-sorted.
        /// Nothing is written on error.
        pub fn update_balance(
            &mut self,
            bank_id: u8,
            amount: u64,
            direction: Direction,
        ) -> Result<BalanceChange, LendingError> {
            let (slot, claimed) = match self.find_slot(bank_id) {
                Some(slot) => (slot, false),
                None => {
                    let slot = self
                        .token_balances
                        .iter()
                        .position(TokenBalance::is_free)
                        .ok_or(LendingError::MaxTokenTypes)?;
                    (slot, true)
                }
            };
            let before = if claimed {
                Position::CLOSED
            } else {
                self.token_balances[slot].position()?
            };
            let after = before.apply(amount, direction)?;
            self.token_balances[slot].store(bank_id, after)?;

            let slot = if claimed {
                self.token_balances.sort_by_key(TokenBalance::sort_key);
                self.find_slot(bank_id).unwrap_or(slot)
            } else {
                slot
            };
            msg!("Bank {} slot {}: {:?} -> {:?}", bank_id, slot, before, after);
            Ok(BalanceChange { bank_id, slot, before, after })
        }
    }
}

// 5. mod oracle
pub mod oracle {
    use crate::constants::USD_DECIMALS;
    use crate::error::LendingError;
    use crate::state::{Bank, PriceFeed};

    fn pow10(exp: u32) -> Option<u128> {
        10u128.checked_pow(exp)
    }

    /// `value * 10^scale`, flooring when `scale` is negative.
    fn scale_by_pow10(value: u128, scale: i64) -> Result<u128, LendingError> {
        if value == 0 {
            return Ok(0);
        }
        if scale >= 0 {
            let exp = u32::try_from(scale).map_err(|_| LendingError::Overflow)?;
            let mul = pow10(exp).ok_or(LendingError::Overflow)?;
            value.checked_mul(mul).ok_or(LendingError::Overflow)
        } else {
            let exp = u32::try_from(scale.unsigned_abs()).map_err(|_| LendingError::Overflow)?;
            Ok(match pow10(exp) {
                Some(div) => value / div,
                None => 0,
            })
        }
    }

    /// USD value of `amount` native units at 6 decimals:
    /// `floor(amount * price * 10^(exponent + 6) / 10^decimals)`.
    pub fn calculate_usd_value(amount: u64, decimals: u8, feed: &PriceFeed) -> Result<u64, LendingError> {
        if feed.price <= 0 {
            return Err(LendingError::InvalidPrice);
        }
        let base = (amount as u128)
            .checked_mul(feed.price as u128)
            .ok_or(LendingError::Overflow)?;
        let scale = feed.exponent as i64 + USD_DECIMALS as i64 - decimals as i64;
        let value = scale_by_pow10(base, scale)?;
        u64::try_from(value).map_err(|_| LendingError::Overflow)
    }

    /// Native units worth `usd_value` (6 decimals), rounded down.
    pub fn token_amount_for_usd_value(
        usd_value: u64,
        decimals: u8,
        feed: &PriceFeed,
    ) -> Result<u64, LendingError> {
        if feed.price <= 0 {
            return Err(LendingError::InvalidPrice);
        }
        let price = feed.price as u128;
        let scale = decimals as i64 - feed.exponent as i64 - USD_DECIMALS as i64;
        let amount = if scale >= 0 {
            scale_by_pow10(usd_value as u128, scale)? / price
        } else {
            let exp = u32::try_from(scale.unsigned_abs()).map_err(|_| LendingError::Overflow)?;
            match pow10(exp).and_then(|div| price.checked_mul(div)) {
                Some(denominator) => usd_value as u128 / denominator,
                None => 0,
            }
        };
        u64::try_from(amount).map_err(|_| LendingError::Overflow)
    }

    impl PriceFeed {
        /// Builds a feed from a Pyth price and its EMA. Both must share the
        /// same exponent.
        pub fn from_pyth(
            price: &pyth_sdk_solana::Price,
            ema: &pyth_sdk_solana::Price,
        ) -> Result<Self, LendingError> {
            if price.price <= 0 || price.expo != ema.expo {
                return Err(LendingError::InvalidPrice);
            }
            Ok(PriceFeed {
                price: price.price,
                conf: i64::try_from(price.conf).map_err(|_| LendingError::Overflow)?,
                ema_price: ema.price,
                ema_conf: i64::try_from(ema.conf).map_err(|_| LendingError::Overflow)?,
                exponent: price.expo,
                _padding: [0; 4],
                publish_time: price.publish_time,
            })
        }
    }

    impl Bank {
        pub fn usd_value(&self, amount: u64) -> Result<u64, LendingError> {
            calculate_usd_value(amount, self.decimals, &self.price_message)
        }

        pub fn token_amount_for_usd(&self, usd_value: u64) -> Result<u64, LendingError> {
            token_amount_for_usd_value(usd_value, self.decimals, &self.price_message)
        }
    }
}

// 6. mod health
pub mod health {
    use crate::constants::WEIGHT_DENOMINATOR;
    use crate::error::LendingError;
    use crate::state::{BalanceType, Bank, User};

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum WeightKind {
        /// Gate for opening or growing exposure.
        Initial,
        /// Liquidation threshold.
        Maintenance,
    }

    impl Bank {
        pub fn weight(&self, kind: WeightKind, balance_type: BalanceType) -> u8 {
            match (kind, balance_type) {
                (WeightKind::Initial, BalanceType::Collateral) => self.initial_asset_weight,
                (WeightKind::Maintenance, BalanceType::Collateral) => self.maintenance_asset_weight,
                (WeightKind::Initial, BalanceType::Liability) => self.initial_liability_weight,
                (WeightKind::Maintenance, BalanceType::Liability) => self.maintenance_liability_weight,
            }
        }
    }

    /// Weighted USD totals (6 decimals) across a user's open positions.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Health {
        pub collateral: u128,
        pub liability: u128,
    }

    impl Health {
        pub fn is_healthy(&self) -> bool {
            self.collateral >= self.liability
        }

        pub fn shortfall(&self) -> u128 {
            self.liability.saturating_sub(self.collateral)
        }

        pub fn net_value(&self) -> Option<u128> {
            self.collateral.checked_sub(self.liability)
        }
    }

    /// Banks supplied alongside an operation so every open position can be
    /// priced. All banks belong to one pool; duplicates are ignored.
    #[derive(Clone, Debug, Default)]
    pub struct BankSet {
        pool_id: u8,
        banks: Vec<Bank>,
    }

    impl BankSet {
        pub fn new(pool_id: u8) -> Self {
            Self { pool_id, banks: Vec::new() }
        }

        pub fn from_banks<I>(pool_id: u8, banks: I) -> Result<Self, LendingError>
        where
            I: IntoIterator<Item = Bank>,
        {
            let mut set = Self::new(pool_id);
            for bank in banks {
                set.insert(bank)?;
            }
            Ok(set)
        }

        pub fn pool_id(&self) -> u8 {
            self.pool_id
        }

        /// Returns `false` if a bank with the same id is already present.
        pub fn insert(&mut self, bank: Bank) -> Result<bool, LendingError> {
            if bank.pool_id != self.pool_id {
                return Err(LendingError::PoolMismatch { expected: self.pool_id, found: bank.pool_id });
            }
            if self.get(bank.bank_id).is_some() {
                return Ok(false);
            }
            self.banks.push(bank);
            Ok(true)
        }

        /// Inserts `bank`, replacing any entry with the same id.
        pub fn upsert(&mut self, bank: Bank) -> Result<(), LendingError> {
            if bank.pool_id != self.pool_id {
                return Err(LendingError::PoolMismatch { expected: self.pool_id, found: bank.pool_id });
            }
            match self.banks.iter_mut().find(|b| b.bank_id == bank.bank_id) {
                Some(existing) => *existing = bank,
                None => self.banks.push(bank),
            }
            Ok(())
        }

        pub fn get(&self, bank_id: u8) -> Option<&Bank> {
            self.banks.iter().find(|b| b.bank_id == bank_id)
        }

        pub fn bank_ids(&self) -> Vec<u8> {
            self.banks.iter().map(|b| b.bank_id).collect()
        }

        pub fn len(&self) -> usize {
            self.banks.len()
        }

        pub fn is_empty(&self) -> bool {
            self.banks.is_empty()
        }

        pub fn require(&self, bank_ids: &[u8]) -> Result<(), LendingError> {
            match bank_ids.iter().find(|id| self.get(**id).is_none()) {
                Some(id) => Err(LendingError::MissingRequiredBank(*id)),
                None => Ok(()),
            }
        }

        pub fn evaluate(&self, user: &User, kind: WeightKind) -> Result<Health, LendingError> {
            let mut health = Health::default();
            for slot in user.token_balances.iter().filter(|b| b.balance != 0) {
                let position = slot.position()?;
                if position.is_closed() {
                    continue;
                }
                let bank = self
                    .get(slot.bank_id)
                    .ok_or(LendingError::MissingRequiredBank(slot.bank_id))?;
                let usd = bank.usd_value(position.amount())? as u128;
                let balance_type = position.balance_type();
                let weighted = usd
                    .checked_mul(bank.weight(kind, balance_type) as u128)
                    .ok_or(LendingError::Overflow)?
                    / WEIGHT_DENOMINATOR;
                let total = match balance_type {
                    BalanceType::Collateral => &mut health.collateral,
                    BalanceType::Liability => &mut health.liability,
                };
                *total = total.checked_add(weighted).ok_or(LendingError::Overflow)?;
            }
            Ok(health)
        }
    }
}

// 7. mod engine
pub mod engine {
    use solana_program::msg;
    use crate::constants::LIQUIDATION_DISCOUNT_PCT;
    use crate::error::LendingError;
    use crate::health::{BankSet, Health, WeightKind};
    use crate::state::{BalanceChange, Bank, BankStatus, Direction, Position, User};

    /// With the defaults a withdrawal may not leave the user below initial
    /// health, so borrowing against a single bank's own deposit (for example
    /// withdrawing 1,500,000 after depositing 1,000,000) is rejected. Turn
    /// `health_checks` off to replay raw slot transitions.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct EngineParams {
        /// Run the initial-weight health check after withdrawals.
        pub health_checks: bool,
        pub liquidation_discount_pct: u8,
    }

    impl Default for EngineParams {
        fn default() -> Self {
            Self { health_checks: true, liquidation_discount_pct: LIQUIDATION_DISCOUNT_PCT }
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct LiquidationOutcome {
        pub repaid: BalanceChange,
        pub seized: BalanceChange,
        pub seized_amount: u64,
        pub health_before: Health,
        /// Reported only. The program runs its own post-liquidation check and
        /// its answer is authoritative.
        pub health_after: Health,
    }

    /// Mirrors the program's balance bookkeeping on a decoded `User` snapshot.
    /// Every operation either applies fully or leaves the user untouched.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct BalanceEngine {
        params: EngineParams,
    }

    fn check_pool(user: &User, bank: &Bank) -> Result<(), LendingError> {
        if user.pool_id != bank.pool_id {
            return Err(LendingError::PoolMismatch { expected: user.pool_id, found: bank.pool_id });
        }
        Ok(())
    }

    /// The operation's own banks take precedence over copies in `banks`.
    fn with_banks(banks: &BankSet, operation_banks: &[&Bank]) -> Result<BankSet, LendingError> {
        let mut set = banks.clone();
        for bank in operation_banks {
            set.upsert(**bank)?;
        }
        Ok(set)
    }

    impl BalanceEngine {
        pub fn new(params: EngineParams) -> Self {
            Self { params }
        }

        pub fn params(&self) -> &EngineParams {
            &self.params
        }

        pub fn deposit(&self, user: &mut User, bank: &Bank, amount: u64) -> Result<BalanceChange, LendingError> {
            check_pool(user, bank)?;
            if bank.status()? != BankStatus::Active {
                return Err(LendingError::BankInactive);
            }
            user.update_balance(bank.bank_id, amount, Direction::Deposit)
        }

        /// `banks` must cover every open position the user holds besides
        /// `bank` itself when health checks are on.
        pub fn withdraw(
            &self,
            user: &mut User,
            bank: &Bank,
            amount: u64,
            banks: &BankSet,
        ) -> Result<BalanceChange, LendingError> {
            check_pool(user, bank)?;
            if bank.status()? == BankStatus::Inactive {
                return Err(LendingError::BankNotAvailableForWithdrawal);
            }
            let mut next = *user;
            let change = next.update_balance(bank.bank_id, amount, Direction::Withdrawal)?;
            if self.params.health_checks {
                let health = with_banks(banks, &[bank])?.evaluate(&next, WeightKind::Initial)?;
                if !health.is_healthy() {
                    msg!("Withdrawal rejected: shortfall {}", health.shortfall());
                    return Err(LendingError::Undercollateralized);
                }
            }
            *user = next;
            Ok(change)
        }

        /// Repays `repay_amount` of the user's liability on behalf of a
        /// liquidator and removes the discounted equivalent in collateral.
        ///
        /// The collateral bank must be active; the liability bank may be
        /// reduce-only. Post-liquidation health is evaluated and returned in
        /// the outcome but never gates the result.
        pub fn liquidate(
            &self,
            user: &mut User,
            collateral_bank: &Bank,
            liability_bank: &Bank,
            repay_amount: u64,
            banks: &BankSet,
        ) -> Result<LiquidationOutcome, LendingError> {
            check_pool(user, collateral_bank)?;
            check_pool(user, liability_bank)?;
            if collateral_bank.bank_id == liability_bank.bank_id {
                return Err(LendingError::InvalidLiquidationPair);
            }
            if collateral_bank.status()? != BankStatus::Active {
                return Err(LendingError::BankInactive);
            }
            if liability_bank.status()? == BankStatus::Inactive {
                return Err(LendingError::BankNotAvailableForWithdrawal);
            }

            let set = with_banks(banks, &[collateral_bank, liability_bank])?;
            let health_before = set.evaluate(user, WeightKind::Maintenance)?;
            if health_before.is_healthy() {
                return Err(LendingError::PositionHealthy);
            }

            match user.position(liability_bank.bank_id)? {
                Position::Liability(owed) if owed > 0 => {}
                _ => return Err(LendingError::NoLiabilityPosition),
            }

            let repaid_usd = liability_bank.usd_value(repay_amount)? as u128;
            let seize_usd = repaid_usd
                .checked_mul(100)
                .ok_or(LendingError::Overflow)?
                .checked_div(self.params.liquidation_discount_pct as u128)
                .ok_or(LendingError::Overflow)?;
            let seize_usd = u64::try_from(seize_usd).map_err(|_| LendingError::Overflow)?;
            let seized_amount = collateral_bank.token_amount_for_usd(seize_usd)?;

            match user.position(collateral_bank.bank_id)? {
                Position::Collateral(held) if held >= seized_amount => {}
                _ => return Err(LendingError::InsufficientCollateral),
            }

            let mut next = *user;
            let repaid = next.update_balance(liability_bank.bank_id, repay_amount, Direction::Deposit)?;
            let seized = next.update_balance(collateral_bank.bank_id, seized_amount, Direction::Withdrawal)?;
            let health_after = set.evaluate(&next, WeightKind::Maintenance)?;
            *user = next;

            msg!(
                "Liquidation: repaid {} in bank {}, seized {} from bank {}",
                repay_amount,
                liability_bank.bank_id,
                seized_amount,
                collateral_bank.bank_id
            );
            Ok(LiquidationOutcome { repaid, seized, seized_amount, health_before, health_after })
        }
    }
}

// 8. mod ix
pub mod ix {
    use arrayref::array_ref;
    use solana_program::{
        instruction::{AccountMeta, Instruction},
        pubkey::Pubkey,
        system_program,
    };
    use crate::constants::TOKEN_2022_PROGRAM_ID;
    use crate::error::{ErrorDomain, LendingError, ProtocolError};
    use crate::pda;
    use crate::state::{BankStatus, PriceFeed};
    use crate::tags;

    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub enum TokenProgram {
        #[default]
        Token,
        Token2022,
    }

    impl TokenProgram {
        pub fn id(&self) -> Pubkey {
            match self {
                TokenProgram::Token => spl_token::ID,
                TokenProgram::Token2022 => TOKEN_2022_PROGRAM_ID,
            }
        }

        /// Token-2022 transfers go through `transfer_checked`, which needs
        /// the mint account.
        pub fn requires_mint(&self) -> bool {
            matches!(self, TokenProgram::Token2022)
        }

        pub fn from_id(id: &Pubkey) -> Option<Self> {
            if *id == spl_token::ID {
                Some(TokenProgram::Token)
            } else if *id == TOKEN_2022_PROGRAM_ID {
                Some(TokenProgram::Token2022)
            } else {
                None
            }
        }
    }

    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub enum LendingInstruction {
        Initialize,
        UpdateAuthority,
        InitializePool,
        InitializeBank { pool_id: u8 },
        UpdateBankStatus { new_status: u8 },
        UpdatePrice { price_feed: PriceFeed },
        InitializeTokenGroup,
        InitializeTokenConfig { group_id: u8 },
        UpdateTokenConfigStatus { new_status: u8 },
        InitializeUser { pool_id: u8, user_id: u16 },
        Deposit { amount: u64 },
        Withdraw { amount: u64 },
        Liquidate { liability_amount: u64 },
    }

    impl LendingInstruction {
        /// Error enums the program can fail with while executing this
        /// instruction.
        pub fn error_domains(&self) -> &'static [ErrorDomain] {
            match self {
                LendingInstruction::Initialize
                | LendingInstruction::UpdateAuthority
                | LendingInstruction::InitializePool
                | LendingInstruction::InitializeBank { .. }
                | LendingInstruction::UpdateBankStatus { .. }
                | LendingInstruction::UpdatePrice { .. }
                | LendingInstruction::InitializeTokenGroup
                | LendingInstruction::InitializeTokenConfig { .. }
                | LendingInstruction::UpdateTokenConfigStatus { .. } => &[ErrorDomain::Admin],
                LendingInstruction::InitializeUser { .. } => &[ErrorDomain::User],
                LendingInstruction::Deposit { .. } => &[ErrorDomain::Bank, ErrorDomain::User],
                LendingInstruction::Withdraw { .. } | LendingInstruction::Liquidate { .. } => &[
                    ErrorDomain::Bank,
                    ErrorDomain::User,
                    ErrorDomain::Health,
                    ErrorDomain::Oracle,
                ],
            }
        }

        /// Possible meanings of a custom error code returned for this
        /// instruction.
        pub fn decode_error(&self, code: u32) -> Vec<ProtocolError> {
            ProtocolError::candidates(self.error_domains(), code)
        }

        pub fn pack(&self) -> Vec<u8> {
            let mut data = Vec::with_capacity(tags::DISCRIMINATOR_LEN + 48);
            match self {
                LendingInstruction::Initialize => data.extend_from_slice(&tags::IX_INITIALIZE),
                LendingInstruction::UpdateAuthority => data.extend_from_slice(&tags::IX_UPDATE_AUTHORITY),
                LendingInstruction::InitializePool => data.extend_from_slice(&tags::IX_INITIALIZE_POOL),
                LendingInstruction::InitializeBank { pool_id } => {
                    data.extend_from_slice(&tags::IX_INITIALIZE_BANK);
                    data.push(*pool_id);
                }
                LendingInstruction::UpdateBankStatus { new_status } => {
                    data.extend_from_slice(&tags::IX_UPDATE_BANK_STATUS);
                    data.push(*new_status);
                }
                LendingInstruction::UpdatePrice { price_feed } => {
                    data.extend_from_slice(&tags::IX_UPDATE_PRICE);
                    data.extend_from_slice(&price_feed.price.to_le_bytes());
                    data.extend_from_slice(&price_feed.conf.to_le_bytes());
                    data.extend_from_slice(&price_feed.ema_price.to_le_bytes());
                    data.extend_from_slice(&price_feed.ema_conf.to_le_bytes());
                    data.extend_from_slice(&price_feed.exponent.to_le_bytes());
                    data.extend_from_slice(&price_feed.publish_time.to_le_bytes());
                }
                LendingInstruction::InitializeTokenGroup => {
                    data.extend_from_slice(&tags::IX_INITIALIZE_TOKEN_GROUP)
                }
                LendingInstruction::InitializeTokenConfig { group_id } => {
                    data.extend_from_slice(&tags::IX_INITIALIZE_TOKEN_CONFIG);
                    data.push(*group_id);
                }
                LendingInstruction::UpdateTokenConfigStatus { new_status } => {
                    data.extend_from_slice(&tags::IX_UPDATE_TOKEN_CONFIG);
                    data.push(*new_status);
                }
                LendingInstruction::InitializeUser { pool_id, user_id } => {
                    data.extend_from_slice(&tags::IX_INITIALIZE_USER);
                    data.push(*pool_id);
                    data.extend_from_slice(&user_id.to_le_bytes());
                }
                LendingInstruction::Deposit { amount } => {
                    data.extend_from_slice(&tags::IX_DEPOSIT);
                    data.extend_from_slice(&amount.to_le_bytes());
                }
                LendingInstruction::Withdraw { amount } => {
                    data.extend_from_slice(&tags::IX_WITHDRAW);
                    data.extend_from_slice(&amount.to_le_bytes());
                }
                LendingInstruction::Liquidate { liability_amount } => {
                    data.extend_from_slice(&tags::IX_LIQUIDATE);
                    data.extend_from_slice(&liability_amount.to_le_bytes());
                }
            }
            data
        }

        pub fn unpack(input: &[u8]) -> Result<Self, LendingError> {
            if input.len() < tags::DISCRIMINATOR_LEN {
                return Err(LendingError::InvalidInstructionData);
            }
            let (tag, mut rest) = input.split_at(tags::DISCRIMINATOR_LEN);
            let ix = match *array_ref![tag, 0, 8] {
                tags::IX_INITIALIZE => LendingInstruction::Initialize,
                tags::IX_UPDATE_AUTHORITY => LendingInstruction::UpdateAuthority,
                tags::IX_INITIALIZE_POOL => LendingInstruction::InitializePool,
                tags::IX_INITIALIZE_BANK => LendingInstruction::InitializeBank {
                    pool_id: read_u8(&mut rest)?,
                },
                tags::IX_UPDATE_BANK_STATUS => LendingInstruction::UpdateBankStatus {
                    new_status: read_u8(&mut rest)?,
                },
                tags::IX_UPDATE_PRICE => {
                    let price = read_i64(&mut rest)?;
                    let conf = read_i64(&mut rest)?;
                    let ema_price = read_i64(&mut rest)?;
                    let ema_conf = read_i64(&mut rest)?;
                    let exponent = read_i32(&mut rest)?;
                    let publish_time = read_i64(&mut rest)?;
                    LendingInstruction::UpdatePrice {
                        price_feed: PriceFeed {
                            price,
                            conf,
                            ema_price,
                            ema_conf,
                            exponent,
                            _padding: [0; 4],
                            publish_time,
                        },
                    }
                }
                tags::IX_INITIALIZE_TOKEN_GROUP => LendingInstruction::InitializeTokenGroup,
                tags::IX_INITIALIZE_TOKEN_CONFIG => LendingInstruction::InitializeTokenConfig {
                    group_id: read_u8(&mut rest)?,
                },
                tags::IX_UPDATE_TOKEN_CONFIG => LendingInstruction::UpdateTokenConfigStatus {
                    new_status: read_u8(&mut rest)?,
                },
                tags::IX_INITIALIZE_USER => {
                    let pool_id = read_u8(&mut rest)?;
                    let user_id = read_u16(&mut rest)?;
                    LendingInstruction::InitializeUser { pool_id, user_id }
                }
                tags::IX_DEPOSIT => LendingInstruction::Deposit { amount: read_u64(&mut rest)? },
                tags::IX_WITHDRAW => LendingInstruction::Withdraw { amount: read_u64(&mut rest)? },
                tags::IX_LIQUIDATE => LendingInstruction::Liquidate {
                    liability_amount: read_u64(&mut rest)?,
                },
                _ => return Err(LendingError::InvalidInstructionData),
            };
            if !rest.is_empty() {
                return Err(LendingError::InvalidInstructionData);
            }
            Ok(ix)
        }
    }

    fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], LendingError> {
        if input.len() < n {
            return Err(LendingError::InvalidInstructionData);
        }
        let (bytes, rest) = input.split_at(n);
        *input = rest;
        Ok(bytes)
    }

    fn read_u8(input: &mut &[u8]) -> Result<u8, LendingError> {
        Ok(take(input, 1)?[0])
    }

    fn read_u16(input: &mut &[u8]) -> Result<u16, LendingError> {
        let bytes = take(input, 2)?;
        Ok(u16::from_le_bytes(*array_ref![bytes, 0, 2]))
    }

    fn read_i32(input: &mut &[u8]) -> Result<i32, LendingError> {
        let bytes = take(input, 4)?;
        Ok(i32::from_le_bytes(*array_ref![bytes, 0, 4]))
    }

    fn read_u64(input: &mut &[u8]) -> Result<u64, LendingError> {
        let bytes = take(input, 8)?;
        Ok(u64::from_le_bytes(*array_ref![bytes, 0, 8]))
    }

    fn read_i64(input: &mut &[u8]) -> Result<i64, LendingError> {
        let bytes = take(input, 8)?;
        Ok(i64::from_le_bytes(*array_ref![bytes, 0, 8]))
    }

    /// Arguments shared by deposit and withdraw.
    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct TransferParams {
        pub wallet: Pubkey,
        pub user_id: u16,
        pub pool_id: u8,
        pub bank_id: u8,
        pub amount: u64,
        pub user_token_account: Pubkey,
        /// Banks of the user's other open positions, appended in this order.
        pub health_bank_ids: Vec<u8>,
        pub mint: Option<Pubkey>,
    }

    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct LiquidateParams {
        pub liquidator: Pubkey,
        /// The unhealthy user's account address.
        pub user_account: Pubkey,
        pub pool_id: u8,
        pub collateral_bank_id: u8,
        pub liability_bank_id: u8,
        pub liability_amount: u64,
        pub liquidator_collateral_token: Pubkey,
        pub liquidator_liability_token: Pubkey,
        pub collateral_token_program: TokenProgram,
        pub liability_token_program: TokenProgram,
        pub health_bank_ids: Vec<u8>,
        pub collateral_mint: Option<Pubkey>,
        pub liability_mint: Option<Pubkey>,
    }

    /// Builds lending program instructions. Program id and token program are
    /// plain values with defaults; nothing is cached between calls.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct InstructionBuilder {
        pub program_id: Pubkey,
        pub token_program: TokenProgram,
    }

    impl Default for InstructionBuilder {
        fn default() -> Self {
            Self { program_id: crate::ID, token_program: TokenProgram::Token }
        }
    }

    impl InstructionBuilder {
        pub fn new(program_id: Pubkey) -> Self {
            Self { program_id, ..Self::default() }
        }

        pub fn with_program_id(mut self, program_id: Pubkey) -> Self {
            self.program_id = program_id;
            self
        }

        pub fn with_token_program(mut self, token_program: TokenProgram) -> Self {
            self.token_program = token_program;
            self
        }

        fn build(&self, accounts: Vec<AccountMeta>, ix: LendingInstruction) -> Instruction {
            Instruction { program_id: self.program_id, accounts, data: ix.pack() }
        }

        fn admin(&self) -> Pubkey {
            pda::find_admin_address(&self.program_id).0
        }

        fn bank(&self, pool_id: u8, bank_id: u8) -> Pubkey {
            pda::find_bank_address(pool_id, bank_id, &self.program_id).0
        }

        fn bank_metas(&self, pool_id: u8, bank_ids: &[u8]) -> Vec<AccountMeta> {
            bank_ids
                .iter()
                .map(|id| AccountMeta::new_readonly(self.bank(pool_id, *id), false))
                .collect()
        }

        pub fn initialize(&self, authority: &Pubkey) -> Instruction {
            let accounts = vec![
                AccountMeta::new(self.admin(), false),
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ];
            self.build(accounts, LendingInstruction::Initialize)
        }

        pub fn update_authority(&self, authority: &Pubkey, new_authority: &Pubkey) -> Instruction {
            let accounts = vec![
                AccountMeta::new(self.admin(), false),
                AccountMeta::new_readonly(*authority, true),
                AccountMeta::new_readonly(*new_authority, false),
            ];
            self.build(accounts, LendingInstruction::UpdateAuthority)
        }

        /// `pool_id` must be the admin's current `pool_count`.
        pub fn initialize_pool(&self, authority: &Pubkey, pool_id: u8) -> Instruction {
            let pool = pda::find_pool_address(pool_id, &self.program_id).0;
            let accounts = vec![
                AccountMeta::new(self.admin(), false),
                AccountMeta::new(pool, false),
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(system_program::id(), false),
            ];
            self.build(accounts, LendingInstruction::InitializePool)
        }

        /// `bank_id` must be the pool's current `bank_count`.
        pub fn initialize_bank(&self, authority: &Pubkey, mint: &Pubkey, pool_id: u8, bank_id: u8) -> Instruction {
            let pool = pda::find_pool_address(pool_id, &self.program_id).0;
            let bank = self.bank(pool_id, bank_id);
            let vault = pda::find_token_vault_address(&bank, &self.program_id).0;
            let accounts = vec![
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new(pool, false),
                AccountMeta::new(bank, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(self.token_program.id(), false),
                AccountMeta::new_readonly(system_program::id(), false),
            ];
            self.build(accounts, LendingInstruction::InitializeBank { pool_id })
        }

        pub fn update_bank_status(
            &self,
            authority: &Pubkey,
            new_status: u8,
            pool_id: u8,
            bank_id: u8,
        ) -> Result<Instruction, LendingError> {
            BankStatus::try_from(new_status)?;
            let accounts = vec![
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new_readonly(*authority, true),
                AccountMeta::new(self.bank(pool_id, bank_id), false),
            ];
            Ok(self.build(accounts, LendingInstruction::UpdateBankStatus { new_status }))
        }

        pub fn update_price(&self, authority: &Pubkey, pool_id: u8, bank_id: u8, price_feed: &PriceFeed) -> Instruction {
            let accounts = vec![
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new(self.bank(pool_id, bank_id), false),
                AccountMeta::new_readonly(*authority, true),
            ];
            self.build(accounts, LendingInstruction::UpdatePrice { price_feed: *price_feed })
        }

        pub fn initialize_token_group(&self, authority: &Pubkey) -> Instruction {
            let accounts = vec![
                AccountMeta::new(self.admin(), false),
                AccountMeta::new_readonly(*authority, true),
            ];
            self.build(accounts, LendingInstruction::InitializeTokenGroup)
        }

        pub fn initialize_token_config(&self, authority: &Pubkey, mint: &Pubkey, group_id: u8) -> Instruction {
            let config = pda::find_token_config_address(mint, group_id, &self.program_id).0;
            let vault = pda::find_token_vault_address(&config, &self.program_id).0;
            let accounts = vec![
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new(config, false),
                AccountMeta::new_readonly(*mint, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(*authority, true),
                AccountMeta::new_readonly(self.token_program.id(), false),
                AccountMeta::new_readonly(system_program::id(), false),
            ];
            self.build(accounts, LendingInstruction::InitializeTokenConfig { group_id })
        }

        pub fn update_token_config_status(
            &self,
            authority: &Pubkey,
            mint: &Pubkey,
            group_id: u8,
            new_status: u8,
        ) -> Result<Instruction, LendingError> {
            BankStatus::try_from(new_status)?;
            let config = pda::find_token_config_address(mint, group_id, &self.program_id).0;
            let accounts = vec![
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new_readonly(*authority, true),
                AccountMeta::new(config, false),
            ];
            Ok(self.build(accounts, LendingInstruction::UpdateTokenConfigStatus { new_status }))
        }

        pub fn initialize_user(&self, wallet: &Pubkey, pool_id: u8, user_id: u16) -> Instruction {
            let user = pda::find_user_address(pool_id, user_id, wallet, &self.program_id).0;
            let accounts = vec![
                AccountMeta::new(user, false),
                AccountMeta::new(*wallet, true),
                AccountMeta::new_readonly(self.admin(), false),
                AccountMeta::new_readonly(system_program::id(), false),
            ];
            self.build(accounts, LendingInstruction::InitializeUser { pool_id, user_id })
        }

        fn transfer_accounts(&self, p: &TransferParams) -> Result<Vec<AccountMeta>, LendingError> {
            if self.token_program.requires_mint() && p.mint.is_none() {
                return Err(LendingError::MissingMint);
            }
            let bank = self.bank(p.pool_id, p.bank_id);
            let vault = pda::find_token_vault_address(&bank, &self.program_id).0;
            let user = pda::find_user_address(p.pool_id, p.user_id, &p.wallet, &self.program_id).0;
            let mut accounts = vec![
                AccountMeta::new(p.wallet, true),
                AccountMeta::new(p.user_token_account, false),
                AccountMeta::new(vault, false),
                AccountMeta::new(user, false),
                AccountMeta::new(bank, false),
                AccountMeta::new_readonly(self.token_program.id(), false),
            ];
            accounts.extend(self.bank_metas(p.pool_id, &p.health_bank_ids));
            if let Some(mint) = p.mint {
                accounts.push(AccountMeta::new_readonly(mint, false));
            }
            Ok(accounts)
        }

        pub fn deposit(&self, params: &TransferParams) -> Result<Instruction, LendingError> {
            let accounts = self.transfer_accounts(params)?;
            Ok(self.build(accounts, LendingInstruction::Deposit { amount: params.amount }))
        }

        pub fn withdraw(&self, params: &TransferParams) -> Result<Instruction, LendingError> {
            let accounts = self.transfer_accounts(params)?;
            Ok(self.build(accounts, LendingInstruction::Withdraw { amount: params.amount }))
        }

        /// Accounts: primary metas, then the liability token program when it
        /// differs from the collateral one, then health banks, then mints.
        pub fn liquidate(&self, p: &LiquidateParams) -> Result<Instruction, LendingError> {
            if p.collateral_token_program.requires_mint() && p.collateral_mint.is_none() {
                return Err(LendingError::MissingMint);
            }
            if p.liability_token_program.requires_mint() && p.liability_mint.is_none() {
                return Err(LendingError::MissingMint);
            }
            let collateral_bank = self.bank(p.pool_id, p.collateral_bank_id);
            let liability_bank = self.bank(p.pool_id, p.liability_bank_id);
            let collateral_vault = pda::find_token_vault_address(&collateral_bank, &self.program_id).0;
            let liability_vault = pda::find_token_vault_address(&liability_bank, &self.program_id).0;

            let mut accounts = vec![
                AccountMeta::new(p.liquidator, true),
                AccountMeta::new(p.liquidator_collateral_token, false),
                AccountMeta::new(p.liquidator_liability_token, false),
                AccountMeta::new(p.user_account, false),
                AccountMeta::new(collateral_bank, false),
                AccountMeta::new(liability_bank, false),
                AccountMeta::new(collateral_vault, false),
                AccountMeta::new(liability_vault, false),
                AccountMeta::new_readonly(p.collateral_token_program.id(), false),
            ];
            if p.liability_token_program != p.collateral_token_program {
                accounts.push(AccountMeta::new_readonly(p.liability_token_program.id(), false));
            }
            accounts.extend(self.bank_metas(p.pool_id, &p.health_bank_ids));
            for mint in [p.collateral_mint, p.liability_mint].into_iter().flatten() {
                accounts.push(AccountMeta::new_readonly(mint, false));
            }
            Ok(self.build(accounts, LendingInstruction::Liquidate { liability_amount: p.liability_amount }))
        }
    }
}
