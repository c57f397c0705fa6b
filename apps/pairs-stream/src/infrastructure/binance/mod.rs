//! Binance Trade Stream Adapter
//!
//! - **messages**: Wire format of `<symbol>@trade` events
//! - **codec**: JSON → `Tick` decoding
//! - **connector**: `tokio-tungstenite` implementation of the feed ports

pub mod codec;
pub mod connector;
pub mod messages;

pub use codec::{CodecError, TradeCodec};
pub use connector::{DEFAULT_BASE_URL, WebSocketConnector};
pub use messages::{Decimal, TradeMessage};
