pub mod binance;
pub mod cryptonator;
pub mod util;

pub use binance::BinanceProvider;
pub use cryptonator::CryptonatorProvider;
