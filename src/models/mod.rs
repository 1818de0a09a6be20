// SPDX-FileCopyrightText: 2025 Joost van der Laan <joost@fashionunited.com>
//
// SPDX-License-Identifier: AGPL-3.0-only

// Re-export model modules
mod coin_info;
mod market_cap;
mod price_history;
pub mod series;
mod trading_volumes;

pub use coin_info::*;
pub use market_cap::*;
pub use price_history::*;
pub use trading_volumes::*;
