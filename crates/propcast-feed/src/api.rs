//! Transport traits consumed by the source manager.
//!
//! The concrete exchange clients implement these; tests substitute mocks.

use propcast_core::{
    Candle1m, FundingRatePoint, FundingSnapshot, OpenInterestSnapshot, PriceTick,
};
use propcast_exchange::{
    ExchangeClientRest, ExchangeClientWs, RestError, StreamError, StreamEvent,
};

/// Request/response market data source.
#[allow(async_fn_in_trait)]
pub trait MarketApi {
    async fn get_price(&self, symbol: &str) -> Result<PriceTick, RestError>;
    async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Candle1m>, RestError>;
    async fn get_premium_index(&self, symbol: &str) -> Result<FundingSnapshot, RestError>;
    async fn get_funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRatePoint>, RestError>;
    async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterestSnapshot, RestError>;
    async fn get_server_time(&self) -> Result<i64, RestError>;
}

impl MarketApi for ExchangeClientRest {
    async fn get_price(&self, symbol: &str) -> Result<PriceTick, RestError> {
        ExchangeClientRest::get_price(self, symbol).await
    }

    async fn get_klines(&self, symbol: &str, limit: usize) -> Result<Vec<Candle1m>, RestError> {
        ExchangeClientRest::get_klines(self, symbol, limit).await
    }

    async fn get_premium_index(&self, symbol: &str) -> Result<FundingSnapshot, RestError> {
        ExchangeClientRest::get_premium_index(self, symbol).await
    }

    async fn get_funding_history(
        &self,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<FundingRatePoint>, RestError> {
        ExchangeClientRest::get_funding_history(self, symbol, limit).await
    }

    async fn get_open_interest(&self, symbol: &str) -> Result<OpenInterestSnapshot, RestError> {
        ExchangeClientRest::get_open_interest(self, symbol).await
    }

    async fn get_server_time(&self) -> Result<i64, RestError> {
        ExchangeClientRest::get_server_time(self).await
    }
}

/// Streaming market data source.
#[allow(async_fn_in_trait)]
pub trait StreamApi {
    async fn start(&mut self) -> Result<(), StreamError>;
    fn is_connected(&self) -> bool;
    fn try_next(&mut self) -> Option<Result<StreamEvent, StreamError>>;
    async fn close(&mut self);
}

impl StreamApi for ExchangeClientWs {
    async fn start(&mut self) -> Result<(), StreamError> {
        ExchangeClientWs::start(self).await
    }

    fn is_connected(&self) -> bool {
        ExchangeClientWs::is_connected(self)
    }

    fn try_next(&mut self) -> Option<Result<StreamEvent, StreamError>> {
        ExchangeClientWs::try_next(self)
    }

    async fn close(&mut self) {
        ExchangeClientWs::close(self).await;
    }
}
