//! Discriminator constants for lending protocol accounts and instructions.
//!
//! Every account record and instruction payload starts with one of these
//! 8-byte tags: the first 8 bytes of `sha256("account:<Name>")` or
//! `sha256("global:<snake_name>")`. Clients, indexers and verifiers MUST use
//! these exact values.

pub const DISCRIMINATOR_LEN: usize = 8;

// Accounts
pub const ACCOUNT_ADMIN: [u8; 8] = [244, 158, 220, 65, 8, 73, 4, 65];
pub const ACCOUNT_POOL: [u8; 8] = [241, 154, 109, 4, 17, 177, 109, 188];
pub const ACCOUNT_BANK: [u8; 8] = [142, 49, 166, 242, 50, 66, 97, 188];
pub const ACCOUNT_USER: [u8; 8] = [159, 117, 95, 227, 239, 151, 58, 236];
pub const ACCOUNT_TOKEN_CONFIG: [u8; 8] = [92, 73, 255, 43, 107, 51, 117, 101];

// Protocol (admin) instructions
pub const IX_INITIALIZE: [u8; 8] = [175, 175, 109, 31, 13, 152, 155, 237];
pub const IX_UPDATE_AUTHORITY: [u8; 8] = [32, 46, 64, 28, 149, 75, 243, 88];
pub const IX_INITIALIZE_POOL: [u8; 8] = [95, 180, 10, 172, 84, 174, 232, 40];
pub const IX_INITIALIZE_BANK: [u8; 8] = [217, 55, 77, 45, 245, 197, 75, 140];
pub const IX_UPDATE_BANK_STATUS: [u8; 8] = [75, 255, 49, 191, 115, 239, 30, 148];
pub const IX_UPDATE_PRICE: [u8; 8] = [61, 34, 117, 155, 75, 34, 123, 208];
pub const IX_INITIALIZE_TOKEN_GROUP: [u8; 8] = [87, 246, 48, 126, 123, 0, 229, 62];
pub const IX_INITIALIZE_TOKEN_CONFIG: [u8; 8] = [60, 14, 114, 86, 25, 84, 93, 149];
pub const IX_UPDATE_TOKEN_CONFIG: [u8; 8] = [231, 122, 181, 79, 255, 79, 144, 167];

// User instructions
pub const IX_INITIALIZE_USER: [u8; 8] = [111, 17, 185, 250, 60, 122, 38, 254];
pub const IX_DEPOSIT: [u8; 8] = [242, 35, 198, 137, 82, 225, 242, 182];
pub const IX_WITHDRAW: [u8; 8] = [183, 18, 70, 156, 148, 109, 161, 34];
pub const IX_LIQUIDATE: [u8; 8] = [223, 179, 226, 125, 48, 46, 39, 74];

/// Every instruction tag, in declaration order.
pub const ALL_INSTRUCTION_TAGS: [[u8; 8]; 13] = [
    IX_INITIALIZE,
    IX_UPDATE_AUTHORITY,
    IX_INITIALIZE_POOL,
    IX_INITIALIZE_BANK,
    IX_UPDATE_BANK_STATUS,
    IX_UPDATE_PRICE,
    IX_INITIALIZE_TOKEN_GROUP,
    IX_INITIALIZE_TOKEN_CONFIG,
    IX_UPDATE_TOKEN_CONFIG,
    IX_INITIALIZE_USER,
    IX_DEPOSIT,
    IX_WITHDRAW,
    IX_LIQUIDATE,
];
