//! Domain records shared by the scheduler, providers and stores.

pub mod bar;
pub mod bar_size;
pub mod instrument;
pub mod request;
pub mod session;

pub use bar::Bar;
pub use instrument::{Instrument, SecType};
pub use request::{BarRequest, HistoricalRequest, RequestKey, RequestKind, SeriesKey, WhatToShow};
pub use session::{IndicatorKind, IndicatorSpec, Session, TradeStrategy};
