/*
[INPUT]:  Mocked Binance REST endpoints
[OUTPUT]: Test results for symbol resolution, history paging, quotes and clock
[POS]:    Integration tests - datafeed REST operations
[UPDATE]: When datafeed REST behavior changes
*/

mod common;

use chartfeed_adapter::ChartfeedError;
use chartfeed_datafeed::QuoteResult;
use common::{datafeed_for, exchange_info, kline_rows, setup_mock_server};
use rust_decimal_macros::dec;
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_on_ready_loads_symbols_once() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(exchange_info()))
        .expect(1)
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    let config = assert_ok!(datafeed.on_ready().await);
    assert!(config.supports_time);
    assert!(config.supported_resolutions.contains(&"1D".to_string()));

    // Second call within the freshness window is served from the cache
    assert_ok!(datafeed.on_ready().await);

    let btc = assert_ok!(datafeed.resolve_symbol("BINANCE:btcusdt"));
    assert_eq!(btc.name, "BTCUSDT");
    assert_eq!(btc.description, "BTC / USDT");
    assert_eq!(btc.exchange, "Binance");
    assert_eq!(btc.session, "24x7");
    assert_eq!(btc.timezone, "UTC");
    assert_eq!(btc.minmov, 1);
    assert_eq!(btc.pricescale, 100);
    assert_eq!(btc.currency_code, "USDT");

    let shib = assert_ok!(datafeed.resolve_symbol("SHIBUSDT"));
    assert_eq!(shib.pricescale, 100_000_000);
}

#[tokio::test]
async fn test_unknown_symbol_is_not_found() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(exchange_info()))
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    assert_ok!(datafeed.on_ready().await);

    match datafeed.resolve_symbol("BINANCE:DOGEUSDT") {
        Err(ChartfeedError::InvalidResponse(message)) => assert_eq!(message, "not found"),
        other => panic!("expected not found, got {other:?}"),
    }
}

#[tokio::test]
async fn test_on_ready_surfaces_http_errors() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/exchangeInfo"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    let err = datafeed.on_ready().await.expect_err("503 must fail");
    assert_eq!(err.status(), Some(503));
}

#[tokio::test]
async fn test_get_bars_pages_until_short_page() {
    let server = setup_mock_server().await;
    let from_secs = 1_700_000_000i64;
    let to_secs = from_secs + 600 * 60;
    let first_open = from_secs * 1000;
    let second_start = first_open + 499 * 60_000 + 1;

    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("symbol", "BTCUSDT"))
        .and(query_param("interval", "1m"))
        .and(query_param("limit", "500"))
        .and(query_param("startTime", first_open.to_string()))
        .and(query_param("endTime", (to_secs * 1000).to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_rows(first_open, 500)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("startTime", second_start.to_string()))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(kline_rows(first_open + 500 * 60_000, 3)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    let result = assert_ok!(datafeed.get_bars("btcusdt", "1", from_secs, to_secs).await);

    assert!(!result.no_data);
    assert_eq!(result.bars.len(), 503);
    assert_eq!(result.bars[0].time, first_open);
    assert_eq!(result.bars[0].close, dec!(105.0));
    assert_eq!(result.bars[502].time, first_open + 502 * 60_000);
    assert!(result.bars.windows(2).all(|pair| pair[0].time < pair[1].time));
}

#[tokio::test]
async fn test_get_bars_without_history_reports_no_data() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/klines"))
        .and(query_param("interval", "1d"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    let result = assert_ok!(datafeed.get_bars("BTCUSDT", "1D", 0, 86_400).await);
    assert!(result.no_data);
    assert!(result.bars.is_empty());
}

#[tokio::test]
async fn test_get_bars_rejects_unknown_resolution() {
    let server = setup_mock_server().await;
    let (datafeed, _connections) = datafeed_for(&server.uri());

    let err = datafeed
        .get_bars("BTCUSDT", "7", 0, 60)
        .await
        .expect_err("resolution 7 is not supported");
    assert!(matches!(err, ChartfeedError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_get_quotes_marks_missing_symbols() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/ticker/24hr"))
        .and(query_param("symbols", r#"["BTCUSDT","NOPEUSDT"]"#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "symbol": "BTCUSDT",
                "priceChange": "-94.99999800",
                "priceChangePercent": "-95.960",
                "weightedAvgPrice": "0.29628482",
                "prevClosePrice": "0.10002000",
                "lastPrice": "4.00000200",
                "lastQty": "200.00000000",
                "bidPrice": "4.00000000",
                "bidQty": "100.00000000",
                "askPrice": "4.00000200",
                "askQty": "100.00000000",
                "openPrice": "99.00000000",
                "highPrice": "100.00000000",
                "lowPrice": "0.10000000",
                "volume": "8913.30000000",
                "quoteVolume": "15.30000000",
                "openTime": 1499783499040i64,
                "closeTime": 1499869899040i64,
                "firstId": 28385,
                "lastId": 28460,
                "count": 76
            }
        ])))
        .expect(2)
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    let symbols = vec!["btcusdt".to_string(), "NOPEUSDT".to_string()];
    let quotes = assert_ok!(datafeed.get_quotes(&symbols).await);

    assert_eq!(quotes.len(), 2);
    match &quotes[0] {
        QuoteResult::Ok { name, values } => {
            assert_eq!(name, "btcusdt");
            assert_eq!(values.lp, dec!(4.00000200));
            assert_eq!(values.spread, dec!(0.00000200));
            assert_eq!(values.prev_close_price, Some(dec!(0.10002000)));
            assert_eq!(values.exchange, "Binance");
        }
        other => panic!("expected quote, got {other:?}"),
    }
    assert_eq!(quotes[1], QuoteResult::Error { name: "NOPEUSDT".to_string() });

    // Quotes bypass the cache
    assert_ok!(datafeed.get_quotes(&symbols).await);
    assert!(assert_ok!(datafeed.get_quotes(&[]).await).is_empty());
}

#[tokio::test]
async fn test_server_time_in_seconds() {
    let server = setup_mock_server().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/time"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "serverTime": 1_700_000_123_456i64 })),
        )
        .mount(&server)
        .await;

    let (datafeed, _connections) = datafeed_for(&server.uri());
    assert_eq!(assert_ok!(datafeed.get_server_time().await), 1_700_000_123);
}
