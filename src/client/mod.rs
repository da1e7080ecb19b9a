//! Remote market-information clients

pub mod gamma;

pub use gamma::{EventTiming, ExistenceCheck, GammaClient, MarketResolution};
