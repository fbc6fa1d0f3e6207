//! Turn-key trading behaviors.
//!
//! The policies drive a [`ResBuf`](mfs_core::models::ResBuf) owned by their
//! host facility: [`BuyPolicy`] keeps it stocked through the exchange,
//! [`SellPolicy`] offers its contents out. A facility wires them into its
//! [`Trader`](crate::trader::Trader) implementation and forwards the
//! exchange callbacks.

mod buy;
pub use buy::*;

mod sell;
pub use sell::*;
