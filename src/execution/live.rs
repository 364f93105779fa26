use crate::error::EngineError;
use crate::execution::clob_client::ClobClient;
use crate::execution::order_builder::OrderBuilder;
use crate::models::market::Side;
use crate::models::order::{OrderIntent, OrderSide, OrderType};
use crate::models::position::Position;
use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::{info, warn};

/// Estimated mid price used to validate a market order's cost before the
/// venue tells us the real fill price.
const MARKET_ORDER_ESTIMATED_MID: f64 = 0.50;
/// Conservative taker fee assumed for a market order's pre-trade risk check.
const MARKET_ORDER_CONSERVATIVE_FEE: f64 = 0.015;

/// How many times to poll a freshly submitted order before giving up on a
/// confirmed MATCHED status and falling back to the signed amount.
const CONFIRM_ATTEMPTS: u32 = 5;
const CONFIRM_INTERVAL: Duration = Duration::from_millis(500);

/// Live execution against the real CLOB: build a FOK market order, submit
/// it, then poll until the venue reports MATCHED (or exhaust the
/// confirmation budget and trust the signed amount).
pub struct LiveExecutor<'a> {
    pub clob_client: &'a ClobClient,
    pub order_builder: &'a OrderBuilder,
}

impl<'a> LiveExecutor<'a> {
    pub fn new(clob_client: &'a ClobClient, order_builder: &'a OrderBuilder) -> Self {
        Self { clob_client, order_builder }
    }

    pub async fn buy(
        &self,
        market_slug: &str,
        question: &str,
        token_id: &str,
        side: Side,
        amount_usd: f64,
        worst_price: f64,
        end_time: DateTime<Utc>,
        strike_price: f64,
    ) -> Result<Position, EngineError> {
        let (signed, raw_spend, raw_shares) = self
            .order_builder
            .build_market_order(token_id, OrderSide::Buy, amount_usd, worst_price)
            .await
            .map_err(|e| EngineError::RiskRejected(format!("order build failed: {e}")))?;

        let result = self
            .clob_client
            .post_order(signed, OrderType::FOK, false)
            .await
            .map_err(|e| EngineError::RiskRejected(format!("order submit failed: {e}")))?;

        if result.order_id.is_empty() {
            return Err(EngineError::RiskRejected(format!(
                "order rejected: {}",
                result.error_msg.unwrap_or_default()
            )));
        }

        let mut confirmed_shares = raw_shares;
        for attempt in 0..CONFIRM_ATTEMPTS {
            match self.clob_client.get_order(&result.order_id).await {
                Ok((status, size_matched)) if status == "MATCHED" => {
                    confirmed_shares = size_matched;
                    break;
                }
                Ok((status, _)) if status == "LIVE" || status == "DELAYED" => {
                    if attempt + 1 == CONFIRM_ATTEMPTS {
                        warn!(order_id = %result.order_id, "confirmation budget exhausted, trusting signed amount");
                    }
                }
                Ok((status, _)) => {
                    warn!(order_id = %result.order_id, status = %status, "order not filled");
                    return Err(EngineError::RiskRejected(format!(
                        "order {} in unexpected state {status}",
                        result.order_id
                    )));
                }
                Err(e) => {
                    warn!(order_id = %result.order_id, error = %e, "confirmation poll failed");
                }
            }
            tokio::time::sleep(CONFIRM_INTERVAL).await;
        }

        info!(
            slug = market_slug,
            shares = confirmed_shares,
            spend = raw_spend,
            "live market buy confirmed"
        );

        let entry_price = if confirmed_shares > 0.0 {
            raw_spend / confirmed_shares
        } else {
            worst_price
        };

        Ok(Position {
            market_slug: market_slug.to_string(),
            question: question.to_string(),
            side,
            entry_price: Decimal::from_f64(entry_price).unwrap_or(Decimal::ZERO),
            amount: Decimal::from_f64(raw_spend).unwrap_or(Decimal::ZERO),
            entry_time: Utc::now(),
            end_time,
            token_id: token_id.to_string(),
            strike_price,
        })
    }

    /// Place a resting GTC limit order. Unlike `buy`, this does not wait for
    /// a fill: the order is submitted maker-side and tracked in the client's
    /// active-order set until it fills or is cancelled.
    pub async fn limit_buy(
        &self,
        token_id: &str,
        market_side: Side,
        price: f64,
        size_shares: f64,
        expiration: Option<u64>,
    ) -> Result<String, EngineError> {
        let intent = OrderIntent {
            token_id: token_id.to_string(),
            market_side,
            order_side: OrderSide::Buy,
            price: Decimal::from_f64(price).unwrap_or_default(),
            size: Decimal::from_f64(size_shares).unwrap_or_default(),
            order_type: OrderType::GTC,
            post_only: true,
            expiration,
            strategy_tag: "limit".to_string(),
        };

        let signed = self
            .order_builder
            .build(&intent)
            .await
            .map_err(|e| EngineError::RiskRejected(format!("order build failed: {e}")))?;

        let result = self
            .clob_client
            .post_order(signed, OrderType::GTC, true)
            .await
            .map_err(|e| EngineError::RiskRejected(format!("order submit failed: {e}")))?;

        if result.order_id.is_empty() {
            return Err(EngineError::RiskRejected(format!(
                "limit order rejected: {}",
                result.error_msg.unwrap_or_default()
            )));
        }

        info!(order_id = %result.order_id, token_id, price, "limit order placed");
        Ok(result.order_id)
    }

    /// Cancel a single resting order.
    pub async fn cancel(&self, order_id: &str) -> Result<(), EngineError> {
        self.clob_client
            .cancel_order(order_id)
            .await
            .map_err(|e| EngineError::RiskRejected(format!("cancel failed: {e}")))
    }

    /// Cancel every resting order this client has open.
    pub async fn cancel_all(&self) -> Result<(), EngineError> {
        self.clob_client
            .cancel_all()
            .await
            .map_err(|e| EngineError::RiskRejected(format!("cancel-all failed: {e}")))
    }
}

/// The `(price, fee_rate)` pair risk validation should use for each order
/// type, per the venue's maker/taker split: a resting limit order pays no
/// fee, a market order is checked against a conservative mid-price estimate.
pub fn risk_check_inputs(order_type: OrderType, limit_price: f64) -> (f64, f64) {
    match order_type {
        OrderType::GTC | OrderType::GTD => (limit_price, 0.0),
        OrderType::FOK | OrderType::FAK => (MARKET_ORDER_ESTIMATED_MID, MARKET_ORDER_CONSERVATIVE_FEE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_orders_validate_at_zero_fee() {
        let (price, fee) = risk_check_inputs(OrderType::GTC, 0.42);
        assert_eq!(price, 0.42);
        assert_eq!(fee, 0.0);
    }

    #[test]
    fn market_orders_validate_at_conservative_mid_and_fee() {
        let (price, fee) = risk_check_inputs(OrderType::FOK, 0.42);
        assert_eq!(price, MARKET_ORDER_ESTIMATED_MID);
        assert_eq!(fee, MARKET_ORDER_CONSERVATIVE_FEE);
    }
}
