// Copyright (c) 2026 The Keywarden Project

//! Static coin table served in chunks via `GetCoinTable`.

/// Maximum entries returned per `GetCoinTable` request
pub const COIN_CHUNK_SIZE: usize = 6;

/// Coin metadata entry
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CoinInfo {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
    pub bip44_index: u32,
}

const fn coin(name: &'static str, symbol: &'static str, decimals: u8, bip44_index: u32) -> CoinInfo {
    CoinInfo {
        name,
        symbol,
        decimals,
        bip44_index,
    }
}

/// Supported coins, fixed at build time
pub const COINS: [CoinInfo; 9] = [
    coin("Bitcoin", "BTC", 8, 0),
    coin("Testnet", "TEST", 8, 1),
    coin("Litecoin", "LTC", 8, 2),
    coin("Dogecoin", "DOGE", 8, 3),
    coin("Dash", "DASH", 8, 5),
    coin("Namecoin", "NMC", 8, 7),
    coin("Zcash", "ZEC", 8, 133),
    coin("Ethereum", "ETH", 18, 60),
    coin("EthereumClassic", "ETC", 18, 61),
];

/// Resolve a requested table range.
///
/// `start`/`end` must be supplied both-or-neither; a missing range returns
/// the empty slice (callers get only table metadata). Bounds: `start < len`,
/// `end <= len`, `start <= end`, and the span must fit in one chunk.
pub fn coin_range(start: Option<usize>, end: Option<usize>) -> Result<&'static [CoinInfo], ()> {
    match (start, end) {
        (None, None) => Ok(&[]),
        (Some(start), Some(end)) => {
            if COINS.len() <= start
                || COINS.len() < end
                || end < start
                || COIN_CHUNK_SIZE < end - start
            {
                return Err(());
            }
            Ok(&COINS[start..end])
        }
        _ => Err(()),
    }
}
