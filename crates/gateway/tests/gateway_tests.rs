use chrono::NaiveDate;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syncgate_brokers_common::*;
use syncgate_core::*;
use syncgate_gateway::*;

fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.timeouts.snapshot_settle_ms = 0;
    config.timeouts.open_orders_ms = 200;
    config.timeouts.next_order_id_ms = 500;
    config
}

fn harness_with(
    config: GatewayConfig,
    responder: impl Fn(&OutboundRequest) -> Vec<InboundMessage> + Send + Sync + 'static,
) -> (Gateway, Arc<SimulatedBroker>) {
    harness_on(SimulatedBrokerConfig::default(), config, responder)
}

fn harness_on(
    broker_config: SimulatedBrokerConfig,
    config: GatewayConfig,
    responder: impl Fn(&OutboundRequest) -> Vec<InboundMessage> + Send + Sync + 'static,
) -> (Gateway, Arc<SimulatedBroker>) {
    let (session, dispatcher) = new_session(&config);
    let broker = SimulatedBroker::new(broker_config, dispatcher, responder);
    broker.connect();
    broker.flush();
    let transport: Arc<dyn Transport> = broker.clone();
    (Gateway::new(session, transport, config), broker)
}

fn scripted() -> (Gateway, Arc<SimulatedBroker>) {
    let script = MarketScript::new("DU123");
    harness_with(test_config(), move |request| script.respond(request))
}

/// Scripted broker that holds every push for `latency`.
fn slow_scripted(latency: Duration) -> (Gateway, Arc<SimulatedBroker>) {
    let mut config = test_config();
    config.timeouts.open_orders_ms = 2_000;
    config.timeouts.next_order_id_ms = 2_000;
    let script = MarketScript::new("DU123");
    harness_on(
        SimulatedBrokerConfig { latency, ..SimulatedBrokerConfig::default() },
        config,
        move |request| script.respond(request),
    )
}

fn silent() -> (Gateway, Arc<SimulatedBroker>) {
    harness_with(test_config(), |_| Vec::new())
}

#[test]
fn test_calls_fail_fast_when_not_connected() {
    let config = test_config();
    let (session, dispatcher) = new_session(&config);
    let broker = SimulatedBroker::silent(SimulatedBrokerConfig::default(), dispatcher);
    let gateway = Gateway::new(session, broker.clone(), config);

    assert_eq!(
        gateway.price_history("IBM", "20240105", "1 M", "daily", None),
        Err(GatewayError::NotConnected)
    );
    assert_eq!(gateway.open_orders(None), Err(GatewayError::NotConnected));
    assert_eq!(gateway.place_order("IBM", 100, OrderStyle::Market), Err(GatewayError::NotConnected));
    assert!(broker.sent().is_empty());
}

#[test]
fn test_invalid_arguments_rejected_before_sending() {
    let (gateway, broker) = scripted();

    assert!(matches!(
        gateway.price_history("IBM", "2024-01-05", "1 M", "daily", None),
        Err(GatewayError::InvalidArgument(_))
    ));
    assert!(matches!(
        gateway.price_history("IBM", "20240105", "1 fortnight", "daily", None),
        Err(GatewayError::InvalidArgument(_))
    ));
    assert!(matches!(
        gateway.price_history("", "20240105", "1 M", "daily", None),
        Err(GatewayError::InvalidArgument(_))
    ));
    assert!(matches!(
        gateway.place_order("IBM", 0, OrderStyle::Market),
        Err(GatewayError::InvalidArgument(_))
    ));
    assert!(matches!(
        gateway.place_order("IBM", 10, OrderStyle::ComboMarket),
        Err(GatewayError::InvalidArgument(_))
    ));
    assert!(broker.sent().is_empty());
}

#[test]
fn test_price_history_collects_bars_in_order() {
    let (gateway, broker) = scripted();

    let bars = gateway.price_history("IBM", "20240105", "3 D", "daily", None).unwrap();

    assert_eq!(bars.len(), 3);
    assert!(bars.iter().all(|bar| bar.symbol == "IBM"));
    assert_eq!(bars[0].time, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap().and_hms_opt(0, 0, 0).unwrap());
    assert_eq!(bars[2].close, dec!(66.3));
    assert!(bars.windows(2).all(|pair| pair[0].time < pair[1].time));
    assert!(gateway.session().pending().is_empty());

    match &broker.sent()[0] {
        OutboundRequest::HistoricalData { end, duration, bar_size, what_to_show, use_rth, .. } => {
            assert_eq!(end, "20240105 23:59:59");
            assert_eq!(duration, "3 D");
            assert_eq!(bar_size, "1 day");
            assert_eq!(*what_to_show, WhatToShow::Trades);
            assert!(!use_rth);
        }
        other => panic!("unexpected request {other:?}"),
    }
}

#[test]
fn test_stock_price_history_runs_symbols_in_turn() {
    let (gateway, broker) = scripted();

    let bars = gateway
        .stock_price_history(&["IBM", "AAPL"], "20240105 16:00:00", "2 D", "minute", None)
        .unwrap();

    assert_eq!(bars.len(), 4);
    assert_eq!(bars[0].symbol, "IBM");
    assert_eq!(bars[3].symbol, "AAPL");
    assert_eq!(bars[3].time, NaiveDate::from_ymd_opt(2024, 1, 5).unwrap().and_hms_opt(16, 0, 0).unwrap());
    assert_eq!(broker.sent_count("req_historical_data"), 2);
    assert_eq!(gateway.stock_price_history(&[], "20240105", "1 D", "daily", None), Ok(Vec::new()));
}

#[test]
fn test_timeout_releases_slot_and_late_push_is_dropped() {
    let (gateway, broker) = silent();

    let result = gateway.price_history("IBM", "20240105", "1 M", "daily", Some(Duration::from_millis(100)));
    assert_eq!(
        result,
        Err(GatewayError::Timeout { operation: "price_history", waited: Duration::from_millis(100) })
    );
    assert!(gateway.session().pending().is_empty());

    broker.push(InboundMessage::HistoricalData {
        req_id: 1,
        bar: RawBar {
            date: "20240105".to_string(),
            open: dec!(1),
            high: dec!(1),
            low: dec!(1),
            close: dec!(1),
            volume: dec!(1),
        },
    });
    broker.push(InboundMessage::HistoricalDataEnd { req_id: 1 });
    broker.flush();
    assert!(gateway.session().pending().is_empty());
}

#[test]
fn test_broker_error_carries_code() {
    let (gateway, _broker) = scripted();

    let err = gateway.all_contract_details("ZZZZ", None).unwrap_err();
    assert_eq!(err.broker_code(), Some(200));
    assert!(gateway.session().pending().is_empty());

    // The gateway stays usable after a failed call.
    assert!(gateway.contract_details("IBM", None).unwrap().is_some());
    assert!(gateway.contract_details("IBM", Some(Duration::MAX)).unwrap().is_some());
}

#[test]
fn test_contract_details_none_when_nothing_matches() {
    let (gateway, _broker) = harness_with(test_config(), |request| match request {
        OutboundRequest::ContractDetails { req_id, .. } => {
            vec![InboundMessage::ContractDetailsEnd { req_id: req_id.to_wire() }]
        }
        _ => Vec::new(),
    });

    assert_eq!(gateway.contract_details("IBM", None), Ok(None));
    assert_eq!(gateway.full_contract("IBM", None), Ok(None));
}

#[test]
fn test_full_contract_is_resolved() {
    let (gateway, _broker) = scripted();
    let contract = gateway.full_contract("IBM", None).unwrap().unwrap();
    assert_eq!(contract.symbol, "IBM");
    assert_eq!(contract.contract_id, Some(10_216));
}

#[test]
fn test_open_orders_empty_is_not_a_timeout() {
    let (gateway, _broker) = scripted();
    assert_eq!(gateway.open_orders(None), Ok(Vec::new()));

    let (gateway, _broker) = silent();
    assert!(gateway.open_orders(Some(Duration::from_millis(50))).unwrap_err().is_timeout());
}

#[test]
fn test_overlapping_open_orders_share_one_refresh() {
    let (gateway, broker) = slow_scripted(Duration::from_millis(200));

    thread::scope(|scope| {
        let first = scope.spawn(|| gateway.open_orders(None));
        thread::sleep(Duration::from_millis(50));
        let second = scope.spawn(|| gateway.open_orders(None));
        assert_eq!(first.join().unwrap(), Ok(Vec::new()));
        assert_eq!(second.join().unwrap(), Ok(Vec::new()));
    });
    assert_eq!(broker.sent_count("req_all_open_orders"), 1);
    assert!(gateway.session().pending().is_empty());
}

#[test]
fn test_place_order_seeds_ids_once() {
    let (gateway, broker) = scripted();

    assert_eq!(gateway.place_order("IBM", 100, OrderStyle::Market), Ok(1));
    assert_eq!(gateway.place_order("IBM", -50, OrderStyle::limit(dec!(150.25)).unwrap()), Ok(2));
    assert_eq!(broker.sent_count("req_ids"), 1);
    assert_eq!(broker.sent_count("place_order"), 2);
}

#[test]
fn test_overlapping_orders_share_id_request() {
    let (gateway, broker) = slow_scripted(Duration::from_millis(200));

    let mut ids = thread::scope(|scope| {
        let first = scope.spawn(|| gateway.place_order("IBM", 100, OrderStyle::Market));
        thread::sleep(Duration::from_millis(50));
        let second = scope.spawn(|| gateway.place_order("AAPL", -20, OrderStyle::Market));
        vec![first.join().unwrap().unwrap(), second.join().unwrap().unwrap()]
    });
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(broker.sent_count("req_ids"), 1);
    assert_eq!(broker.sent_count("place_order"), 2);

    match &broker.sent()[2] {
        OutboundRequest::PlaceOrder { order, .. } => {
            assert_eq!(order.action, OrderAction::Sell);
            assert_eq!(order.total_quantity, dec!(50));
            assert_eq!(order.limit_price, Some(dec!(150.25)));
        }
        other => panic!("unexpected request {other:?}"),
    }

    broker.flush();
    let record = gateway.session().orders().get(1).unwrap();
    assert_eq!(record.status, "Submitted");
    assert!(record.details.is_some());

    let open = gateway.open_orders(None).unwrap();
    assert_eq!(open.iter().map(|o| o.order_id).collect::<Vec<_>>(), vec![1, 2]);

    gateway.cancel_order(1).unwrap();
    broker.flush();
    assert_eq!(gateway.session().orders().get(1).unwrap().status, "Cancelled");
    assert_eq!(gateway.open_orders(None).unwrap().len(), 1);
}

#[test]
fn test_modify_order_resends_given_id() {
    let (gateway, broker) = scripted();

    let id = gateway.place_order("IBM", 100, OrderStyle::limit(dec!(10)).unwrap()).unwrap();
    let modified = gateway.modify_order(id, "IBM", 100, OrderStyle::limit(dec!(11)).unwrap()).unwrap();

    assert_eq!(modified, id);
    match broker.sent().last() {
        Some(OutboundRequest::PlaceOrder { order, .. }) => {
            assert_eq!(order.order_id, id);
            assert_eq!(order.limit_price, Some(dec!(11)));
        }
        other => panic!("unexpected request {other:?}"),
    }
}

#[test]
fn test_ratios_and_dividends_cancel_their_line() {
    let (gateway, broker) = scripted();

    let ratios = gateway.financial_ratios("IBM", None).unwrap();
    assert_eq!(ratios.decimal("BETA"), Some(dec!(0.90979)));
    assert_eq!(ratios.currency(), Some("USD"));

    let dividends = gateway.dividends("IBM", None).unwrap();
    assert_eq!(dividends.next_date, NaiveDate::from_ymd_opt(2013, 2, 19));
    assert_eq!(dividends.next_amount, Some(dec!(0.23)));

    assert_eq!(broker.sent_count("cancel_mkt_data"), 2);
    assert!(gateway.session().pending().is_empty());
}

#[test]
fn test_ratios_timeout_still_cancels_line() {
    let (gateway, broker) = silent();
    let err = gateway.financial_ratios("IBM", Some(Duration::from_millis(50))).unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(broker.sent_count("cancel_mkt_data"), 1);
}

#[test]
fn test_fundamental_report_returns_xml() {
    let (gateway, _broker) = scripted();
    let xml = gateway.fundamental_report("IBM", ReportKind::FinancialSummary, None).unwrap();
    assert!(xml.contains(r#"symbol="IBM""#));
}

#[test]
fn test_tick_snapshot_gathers_fields() {
    let (gateway, _broker) = scripted();
    let ticks = gateway.tick_snapshot("IBM", None).unwrap();

    assert_eq!(ticks.last, Some(dec!(66)));
    assert_eq!(ticks.bid, Some(dec!(65.99)));
    assert_eq!(ticks.volume, Some(dec!(1250000)));
    assert_eq!(ticks.last_timestamp, Some(1_700_000_000));
}

#[test]
fn test_tick_stream_until_cancelled() {
    let (gateway, broker) = scripted();

    let stream = gateway.subscribe_ticks("IBM").unwrap();
    broker.flush();
    assert_eq!(stream.latest().ask, Some(dec!(66.01)));
    assert_eq!(gateway.session().pending().len(), 1);

    gateway.cancel_ticks(stream.id()).unwrap();
    assert!(gateway.session().pending().is_empty());
    assert_eq!(broker.sent_count("cancel_mkt_data"), 1);
}

#[test]
fn test_realtime_bars_stream() {
    let (gateway, broker) = scripted();

    let stream = gateway.subscribe_realtime_bars("IBM", WhatToShow::Midpoint).unwrap();
    broker.flush();
    assert!(broker.sent().iter().any(|request| matches!(
        request,
        OutboundRequest::RealtimeBars { bar_seconds: 5, use_rth: true, .. }
    )));
    assert_eq!(stream.latest().map(|bar| bar.close), Some(dec!(66)));
    assert_eq!(stream.drain().len(), 1);
    assert!(stream.bars().is_empty());

    gateway.cancel_realtime_bars(stream.id()).unwrap();
    assert!(gateway.session().pending().is_empty());
}

#[test]
fn test_depth_rows_validated_and_ladder_filled() {
    let (gateway, broker) = scripted();

    for rows in [0, LADDER_DEPTH + 1] {
        assert!(matches!(gateway.subscribe_depth("IBM", rows), Err(GatewayError::InvalidArgument(_))));
    }
    assert_eq!(broker.sent_count("req_mkt_depth"), 0);

    let depth = gateway.subscribe_depth("IBM", 3).unwrap();
    broker.flush();
    assert_eq!(
        depth.ladder().slot(BookSide::Bid, 0),
        Some(DepthSlot::Level { price: dec!(65.99), size: dec!(100) })
    );
    assert_eq!(
        depth.ladder().slot(BookSide::Ask, 2),
        Some(DepthSlot::Level { price: dec!(66.03), size: dec!(300) })
    );
    assert_eq!(depth.ladder().slot(BookSide::Ask, 3), Some(DepthSlot::Empty));

    gateway.cancel_depth(depth.id()).unwrap();
    assert!(gateway.depth_ladder(depth.id()).is_none());
}

#[test]
fn test_start_downloads_account() {
    let (gateway, broker) = scripted();

    gateway.start().unwrap();
    broker.flush();

    let portfolio = gateway.portfolio().unwrap();
    assert_eq!(portfolio.account().account_id(), Some("DU123"));
    assert_eq!(portfolio.portfolio_value(), dec!(105000));
    assert_eq!(portfolio.positions_value(), dec!(15100));
    assert_eq!(portfolio.cash(), dec!(89900));
    assert_eq!(portfolio.pnl(), dec!(5000));
    assert_eq!(portfolio.returns(), dec!(1.05));
    assert_eq!(portfolio.position("IBM").map(|p| p.amount), Some(dec!(100)));
    assert_eq!(broker.sent_count("req_ids"), 1);
    assert_eq!(broker.sent_count("req_account_updates"), 1);

    gateway.shutdown();
    assert_eq!(broker.sent_count("req_account_updates"), 2);
    assert!(!broker.is_open());
}

#[test]
fn test_account_tracking_disabled_by_zero_cash() {
    let mut config = test_config();
    config.starting_cash = dec!(0);
    let script = MarketScript::new("DU123");
    let (gateway, broker) = harness_with(config, move |request| script.respond(request));

    gateway.start().unwrap();
    assert!(gateway.portfolio().is_none());
    assert_eq!(broker.sent_count("req_account_updates"), 0);
}

#[test]
fn test_disconnect_fails_new_calls() {
    let (gateway, broker) = scripted();
    broker.disconnect("socket reset");
    broker.flush();

    assert!(!gateway.is_connected());
    assert_eq!(gateway.tick_snapshot("IBM", None), Err(GatewayError::NotConnected));
}

#[test]
fn test_concurrent_calls_get_their_own_results() {
    let (gateway, _broker) = scripted();
    let symbols = ["IBM", "AAPL", "MSFT", "ORCL"];

    thread::scope(|scope| {
        let handles: Vec<_> = symbols
            .iter()
            .map(|symbol| {
                let gateway = &gateway;
                scope.spawn(move || (symbol, gateway.price_history(*symbol, "20240105", "5 D", "daily", None)))
            })
            .collect();
        for handle in handles {
            let (symbol, bars) = handle.join().unwrap();
            let bars = bars.unwrap();
            assert_eq!(bars.len(), 5);
            assert!(bars.iter().all(|bar| bar.symbol == *symbol));
        }
    });
    assert!(gateway.session().pending().is_empty());
}
