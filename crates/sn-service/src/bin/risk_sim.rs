//! Synthetic-feed simulation driving the risk service end to end.
//!
//! Registers a pair of instruments and an account, replays a short price
//! and fill sequence through the feed channel, then queries portfolio risk
//! and a sizing decision.

use std::sync::Arc;

use chrono::{Duration, Utc};
use crossbeam_channel::unbounded;
use rust_decimal::Decimal;

use sn_service::{FeedConfig, FeedHandle, RiskService, RiskServiceConfig};
use sn_types::{
    Direction, FeedEvent, FillEvent, Instrument, PriceUpdate, RiskLimits, SizingRequest, Symbol,
};

fn main() -> anyhow::Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let (alert_tx, alert_rx) = unbounded();
    let service = Arc::new(RiskService::with_alerts(
        RiskServiceConfig::default(),
        alert_tx,
    ));

    service.register_instrument(Instrument::equity("AAPL"))?;
    service.register_instrument(Instrument::equity("MSFT"))?;
    service.register_account(
        "alpha",
        RiskLimits {
            capital: Decimal::from(250_000),
            max_gross_exposure: Decimal::from(75_000),
            max_var: Decimal::from(7_500),
            max_position_qty: Decimal::from(5_000),
            ..RiskLimits::default()
        },
    );

    let feed = FeedHandle::spawn(service.clone(), FeedConfig::default());
    let base = Utc::now() - Duration::seconds(120);

    // A short zig-zag tape so the EWMA volatility has something to chew on.
    let aapl_tape = [150, 151, 149, 152, 151, 153];
    let msft_tape = [400, 398, 402, 401, 404, 403];
    for (i, (aapl, msft)) in aapl_tape.iter().zip(msft_tape.iter()).enumerate() {
        let t = base + Duration::seconds(10 * i as i64);
        feed.send(FeedEvent::Price(PriceUpdate {
            symbol: Symbol::new("AAPL"),
            price: Decimal::from(*aapl),
            timestamp: t,
        }))?;
        feed.send(FeedEvent::Price(PriceUpdate {
            symbol: Symbol::new("MSFT"),
            price: Decimal::from(*msft),
            timestamp: t,
        }))?;
    }

    feed.send(FeedEvent::Fill(FillEvent {
        account: "alpha".into(),
        symbol: Symbol::new("AAPL"),
        quantity: Decimal::from(300),
        price: Decimal::from(151),
        timestamp: base + Duration::seconds(35),
    }))?;
    feed.send(FeedEvent::Fill(FillEvent {
        account: "alpha".into(),
        symbol: Symbol::new("MSFT"),
        quantity: Decimal::from(-50),
        price: Decimal::from(401),
        timestamp: base + Duration::seconds(45),
    }))?;

    let stats = feed.close();
    println!("feed drained: {stats:?}");

    let snapshot = service.portfolio_risk("alpha")?;
    println!(
        "portfolio risk seq={} gross={} net={} var={} margin={}",
        snapshot.sequence,
        snapshot.gross_exposure,
        snapshot.net_exposure,
        snapshot.var,
        snapshot.margin_utilization,
    );
    for pr in &snapshot.positions {
        println!(
            "  {} qty={} mark={} notional={} upl={} var_c={}",
            pr.symbol, pr.quantity, pr.mark_price, pr.notional, pr.unrealized_pnl,
            pr.var_contribution,
        );
    }

    let request = SizingRequest::new(
        "alpha",
        Symbol::new("AAPL"),
        Direction::Buy,
        Decimal::from(500),
    );
    let outcome = service.position_size(&request)?;
    println!("sizing buy 500 AAPL → {outcome:?}");

    for alert in alert_rx.try_iter() {
        println!("alert [{:?}] {}", alert.severity, alert.message);
    }

    Ok(())
}
