use crate::config::{OracleConfig, PolymarketConfig};
use crate::error::EngineError;
use crate::models::market::{parse_slug_timestamp, Market, OutcomePrices, TokenPair, SLUG_PREFIX};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration as StdDuration;
use tracing::{debug, info, warn};

/// Markets whose slug timestamp is this far in the past are treated as stale
/// retrieval-pack noise, not a tradeable interval — mirrors the one-hour
/// staleness floor used upstream for slug discovery.
const SLUG_STALENESS_SECS: i64 = 3600;

/// Gamma's `/events` tag for the 15-minute BTC up/down family.
const TAG_SLUG: &str = "15M";

#[derive(Debug, Deserialize)]
struct GammaEvent {
    #[serde(default)]
    markets: Vec<GammaMarket>,
}

#[derive(Debug, Deserialize)]
struct GammaMarket {
    slug: String,
    #[serde(default)]
    condition_id: Option<String>,
    question: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "clobTokenIds", default)]
    clob_token_ids: Option<String>,
    #[serde(default)]
    outcomes: Option<String>,
    #[serde(rename = "outcomePrices", default)]
    outcome_prices: Option<String>,
    #[serde(rename = "startDate", default)]
    start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    end_date: Option<String>,
    #[serde(rename = "bestBid", default)]
    best_bid: Option<f64>,
    #[serde(rename = "bestAsk", default)]
    best_ask: Option<f64>,
    #[serde(default)]
    liquidity: Option<f64>,
    #[serde(rename = "acceptingOrders", default)]
    accepting_orders: Option<bool>,
}

/// Discovers the current tradeable BTC 15-minute up/down market from the
/// Gamma API and resolves its strike price.
pub struct MarketDiscovery {
    http: reqwest::Client,
    gamma_host: String,
    binance_klines_url: String,
}

impl MarketDiscovery {
    pub fn new(polymarket: &PolymarketConfig, oracle: &OracleConfig) -> Self {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .tcp_keepalive(Some(StdDuration::from_secs(30)))
            .timeout(StdDuration::from_secs(10))
            .build()
            .expect("failed to build discovery HTTP client");

        Self {
            http,
            gamma_host: polymarket.gamma_api_host.clone(),
            binance_klines_url: oracle.binance_klines_url.clone(),
        }
    }

    /// Fetch every currently tradeable 15-minute BTC up/down market, sorted
    /// by `end_time` ascending (soonest-expiring candidate first). Returns
    /// an empty `Vec` rather than a synthetic placeholder when nothing
    /// qualifies.
    pub async fn discover_current(&self) -> Result<Vec<Market>, EngineError> {
        let url = format!("{}/events?tag_slug={TAG_SLUG}&closed=false", self.gamma_host);
        let events: Vec<GammaEvent> = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::TransientFetch {
                source_name: "gamma_events".into(),
                detail: e.to_string(),
            })?
            .json()
            .await
            .map_err(|e| EngineError::TransientFetch {
                source_name: "gamma_events".into(),
                detail: e.to_string(),
            })?;

        let now = Utc::now().timestamp();

        // Every event returned by this query already carries the 15-minute
        // tag (it's the filter in the request URL). Prefer markets whose
        // slug matches the canonical `btc-updown-15m-{unix_ts}` pattern; if
        // none match at all, fall back to any market whose question/
        // description mentions BTC/Bitcoin rather than dropping the batch.
        let all_markets: Vec<GammaMarket> = events.into_iter().flat_map(|e| e.markets).collect();

        let mut slugs: Vec<String> = all_markets
            .iter()
            .filter_map(|m| {
                let ts = parse_slug_timestamp(&m.slug)? as i64;
                if ts < now - SLUG_STALENESS_SECS {
                    debug!(slug = %m.slug, "skipping stale slug");
                    return None;
                }
                Some(m.slug.clone())
            })
            .collect();

        if slugs.is_empty() {
            slugs = all_markets
                .iter()
                .filter(|m| Self::mentions_bitcoin(&m.question) || Self::mentions_bitcoin(&m.description))
                .map(|m| m.slug.clone())
                .collect();
        }

        if slugs.is_empty() {
            debug!("no current btc-updown-15m market found in gamma response");
            return Ok(Vec::new());
        }

        let mut candidates = Vec::new();
        for raw in all_markets.into_iter().filter(|m| slugs.contains(&m.slug)) {
            match self.build_market(raw).await {
                Ok(market) => candidates.push(market),
                Err(e) => debug!(error = %e, "skipping candidate market that failed to build"),
            }
        }

        candidates.sort_by_key(|m| m.end_time);
        Ok(candidates)
    }

    async fn build_market(&self, raw: GammaMarket) -> Result<Market, EngineError> {
        let token_ids: Vec<String> = raw
            .clob_token_ids
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .ok_or_else(|| EngineError::MalformedMarket(format!("{}: missing clobTokenIds", raw.slug)))?;

        let outcomes: Vec<String> = raw
            .outcomes
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| vec!["Up".to_string(), "Down".to_string()]);

        let prices: Vec<f64> = raw
            .outcome_prices
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .map(|v| v.iter().filter_map(|p| p.parse::<f64>().ok()).collect::<Vec<f64>>())
            .unwrap_or_default();

        if token_ids.len() < 2 || prices.len() < 2 {
            return Err(EngineError::MalformedMarket(format!(
                "{}: null or incomplete outcome prices/tokens",
                raw.slug
            )));
        }

        let up_index = Self::up_index(&outcomes);
        let down_index = 1 - up_index;

        let tokens = TokenPair {
            up: token_ids[up_index].clone(),
            down: token_ids[down_index].clone(),
        };
        let outcome_prices = OutcomePrices {
            up: prices[up_index],
            down: prices[down_index],
        };

        let sum = outcome_prices.up + outcome_prices.down;
        if !(0.95..=1.05).contains(&sum) {
            return Err(EngineError::MalformedMarket(format!(
                "{}: outcome prices sum to {sum}, outside [0.95, 1.05]",
                raw.slug
            )));
        }
        if tokens.up == tokens.down {
            return Err(EngineError::MalformedMarket(format!(
                "{}: up and down tokens are identical",
                raw.slug
            )));
        }

        let start_time = Self::parse_timestamp(raw.start_date.as_deref())
            .ok_or_else(|| EngineError::MalformedMarket(format!("{}: missing startDate", raw.slug)))?;
        let end_time = Self::parse_timestamp(raw.end_date.as_deref())
            .ok_or_else(|| EngineError::MalformedMarket(format!("{}: missing endDate", raw.slug)))?;

        if end_time <= Utc::now() {
            return Err(EngineError::MalformedMarket(format!("{}: already past end_time", raw.slug)));
        }

        let strike_price = Self::parse_strike_from_text(&raw.description)
            .or_else(|| Self::parse_strike_from_text(&raw.question));

        let strike_price = match strike_price {
            Some(k) => Some(k),
            None => self.resolve_strike_from_klines(start_time).await,
        };

        Ok(Market {
            slug: raw.slug,
            condition_id: raw.condition_id,
            question: raw.question,
            description: raw.description,
            strike_price,
            start_time,
            end_time,
            tokens,
            outcome_prices,
            best_bid: raw.best_bid.unwrap_or(0.0),
            best_ask: raw.best_ask.unwrap_or(1.0),
            liquidity: raw.liquidity.unwrap_or(0.0),
            accepting_orders: raw.accepting_orders.unwrap_or(false),
        })
    }

    fn mentions_bitcoin(text: &str) -> bool {
        let lower = text.to_lowercase();
        lower.contains("btc") || lower.contains("bitcoin")
    }

    fn up_index(outcomes: &[String]) -> usize {
        for (i, label) in outcomes.iter().enumerate() {
            let lower = label.to_lowercase();
            if lower == "yes" || lower == "up" || lower == "long" {
                return i;
            }
            if lower == "no" || lower == "down" || lower == "short" {
                return 1 - i;
            }
        }
        0
    }

    fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
        let raw = raw?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Hand-rolled `$90,000`-style strike extraction from market prose.
    /// No regex/once_cell in the reference corpus for this; a manual scan
    /// over `$`-prefixed digit runs mirrors it closely enough.
    ///
    /// `pub(crate)` so persisted snapshots missing `strike_price` can
    /// backfill it from the stored question text.
    pub(crate) fn parse_strike_from_text(text: &str) -> Option<f64> {
        let bytes = text.as_bytes();
        for (i, &b) in bytes.iter().enumerate() {
            if b != b'$' {
                continue;
            }
            let mut j = i + 1;
            let mut digits = String::new();
            while j < bytes.len() && (bytes[j].is_ascii_digit() || bytes[j] == b',' || bytes[j] == b'.') {
                if bytes[j] != b',' {
                    digits.push(bytes[j] as char);
                }
                j += 1;
            }
            if digits.len() >= 4 {
                if let Ok(value) = digits.parse::<f64>() {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Fallback strike resolution: the Binance 1-minute candle open at the
    /// market's start time.
    async fn resolve_strike_from_klines(&self, start_time: DateTime<Utc>) -> Option<f64> {
        let start_ms = start_time.timestamp_millis();
        let url = format!(
            "{}?symbol=BTCUSDT&interval=1m&startTime={start_ms}&limit=1",
            self.binance_klines_url
        );

        let resp = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "klines strike fallback request failed");
                return None;
            }
        };

        let klines: Vec<Vec<serde_json::Value>> = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "klines strike fallback parse failed");
                return None;
            }
        };

        klines
            .first()
            .and_then(|candle| candle.get(1))
            .and_then(|open| open.as_str())
            .and_then(|s| s.parse::<f64>().ok())
    }

    pub fn slug_for_interval(unix_ts: u64) -> String {
        format!("{SLUG_PREFIX}{unix_ts}")
    }

    /// Seconds remaining until a market closes, floored at zero.
    pub fn seconds_remaining(end_time: DateTime<Utc>) -> i64 {
        (end_time - Utc::now()).num_seconds().max(0)
    }
}

/// Convenience used by the klines fallback and tests: the 15-minute interval
/// start containing a given unix timestamp.
pub fn interval_start(unix_ts: i64) -> i64 {
    const INTERVAL_SECS: i64 = 15 * 60;
    unix_ts - (unix_ts.rem_euclid(INTERVAL_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strike_parses_dollar_amount() {
        let text = "Will the price of Bitcoin be above $90,250 at 3:15pm ET?";
        assert_eq!(MarketDiscovery::parse_strike_from_text(text), Some(90_250.0));
    }

    #[test]
    fn strike_returns_none_without_dollar_sign() {
        let text = "Will BTC go up in the next 15 minutes?";
        assert_eq!(MarketDiscovery::parse_strike_from_text(text), None);
    }

    #[test]
    fn up_index_matches_yes_no_labels() {
        let outcomes = vec!["Yes".to_string(), "No".to_string()];
        assert_eq!(MarketDiscovery::up_index(&outcomes), 0);
        let outcomes = vec!["Down".to_string(), "Up".to_string()];
        assert_eq!(MarketDiscovery::up_index(&outcomes), 1);
    }

    #[test]
    fn interval_start_floors_to_15_minutes() {
        assert_eq!(interval_start(1_770_933_901), 1_770_933_900);
    }
}
