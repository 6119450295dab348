use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use syncgate_brokers_bridge::{BridgeConfig, BridgeTransport};
use syncgate_brokers_common::{MarketScript, SimulatedBroker, SimulatedBrokerConfig};
use syncgate_core::*;
use syncgate_gateway::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "syncgate")]
#[command(about = "Blocking broker gateway: quotes, history, fundamentals, orders and account state")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// TOML file with [gateway] and [bridge] sections
    #[arg(short, long, env = "SYNCGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Bridge host (overrides the config file)
    #[arg(long, env = "SYNCGATE_HOST")]
    host: Option<String>,

    /// Bridge port (overrides the config file)
    #[arg(long, env = "SYNCGATE_PORT")]
    port: Option<u16>,

    /// Client id presented to the broker (overrides the config file)
    #[arg(long, env = "SYNCGATE_CLIENT_ID")]
    client_id: Option<ClientId>,

    /// Run against the built-in scripted market instead of a bridge
    #[arg(long)]
    simulated: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// One-off quote snapshot
    Snapshot {
        symbol: String,
    },

    /// Historical trade bars for one or more stocks
    History {
        #[arg(required = true)]
        symbols: Vec<String>,

        /// End of the window, YYYYMMDD or "YYYYMMDD HH:MM:SS"
        #[arg(short, long)]
        end: String,

        /// Window length, e.g. "1 M" or "10 D"
        #[arg(short, long, default_value = "1 M")]
        duration: String,

        /// daily, minute, second or "5 seconds"
        #[arg(short, long, default_value = "daily")]
        frequency: String,
    },

    /// Contract details lookup
    Contract {
        symbol: String,
    },

    /// Raw fundamental report XML
    Report {
        symbol: String,

        /// statements, ownership, estimates, overview or summary
        #[arg(short, long, default_value = "summary")]
        kind: ReportKind,
    },

    /// Financial ratios from the generic tick feed
    Ratios {
        symbol: String,
    },

    /// Dividend summary from the generic tick feed
    Dividends {
        symbol: String,
    },

    /// Currently open orders
    OpenOrders,

    /// Account values and positions
    Account {
        /// How long to wait for the account download on a live bridge
        #[arg(long, default_value = "2000")]
        wait_ms: u64,
    },

    /// Market depth ladder
    Depth {
        symbol: String,

        #[arg(short, long, default_value = "5")]
        rows: usize,

        /// How long to collect depth updates on a live bridge
        #[arg(long, default_value = "2000")]
        wait_ms: u64,
    },

    /// Place an order; a negative amount sells
    Order {
        symbol: String,

        #[arg(allow_negative_numbers = true)]
        amount: i64,

        #[arg(long)]
        limit: Option<Decimal>,

        #[arg(long)]
        stop: Option<Decimal>,
    },

    /// Cancel an order by id
    Cancel {
        order_id: OrderId,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    gateway: GatewayConfig,
    bridge: BridgeConfig,
}

/// A connected gateway plus the simulated broker behind it, if any.
struct Connection {
    gateway: Gateway,
    simulated: Option<Arc<SimulatedBroker>>,
}

impl Connection {
    /// Let pushes arrive: drain the simulated queue, or wait on a live bridge.
    fn settle(&self, wait: Duration) {
        match &self.simulated {
            Some(broker) => broker.flush(),
            None => thread::sleep(wait),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            toml::from_str::<FileConfig>(&raw)
                .with_context(|| format!("Invalid config {}", path.display()))?
        }
        None => FileConfig::default(),
    };
    if let Some(host) = cli.host.clone() {
        config.bridge.host = host;
    }
    if let Some(port) = cli.port {
        config.bridge.port = port;
    }
    if let Some(client_id) = cli.client_id {
        config.gateway.client_id = client_id;
    }

    let conn = connect(&config, cli.simulated)?;
    let result = run(&conn, cli.command);
    conn.gateway.shutdown();
    result
}

fn connect(config: &FileConfig, simulated: bool) -> Result<Connection> {
    let (session, dispatcher) = new_session(&config.gateway);

    if simulated {
        let account = config.gateway.account_id.clone().unwrap_or_else(|| "DU0000000".to_string());
        let script = MarketScript::new(&account);
        let broker = SimulatedBroker::new(SimulatedBrokerConfig::default(), dispatcher, move |request| {
            script.respond(request)
        });
        broker.connect();
        broker.flush();
        tracing::info!(account = %account, "Using simulated broker");
        let transport: Arc<dyn Transport> = broker.clone();
        return Ok(Connection {
            gateway: Gateway::new(session, transport, config.gateway.clone()),
            simulated: Some(broker),
        });
    }

    let transport = BridgeTransport::connect(&config.bridge, config.gateway.client_id, dispatcher)
        .with_context(|| format!("Failed to connect to bridge at {}", config.bridge.address()))?;
    Ok(Connection {
        gateway: Gateway::new(session, transport, config.gateway.clone()),
        simulated: None,
    })
}

fn run(conn: &Connection, command: Commands) -> Result<()> {
    let gateway = &conn.gateway;
    let sep = "=".repeat(60);

    match command {
        Commands::Snapshot { symbol } => {
            let ticks = gateway.tick_snapshot(symbol.as_str(), None)?;
            println!("\n{sep}");
            println!("  SNAPSHOT {}", symbol);
            println!("{sep}");
            for field in [
                TickField::Bid,
                TickField::BidSize,
                TickField::Ask,
                TickField::AskSize,
                TickField::Last,
                TickField::LastSize,
                TickField::High,
                TickField::Low,
                TickField::Close,
                TickField::Volume,
            ] {
                println!("  {:<16} {}", format!("{:?}:", field), show(ticks.get(field)));
            }
            if let Some(ts) = ticks.last_timestamp {
                println!("  {:<16} {}", "LastTimestamp:", ts);
            }
            println!("{sep}\n");
        }
        Commands::History { symbols, end, duration, frequency } => {
            let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
            let bars = gateway.stock_price_history(&symbols, &end, &duration, &frequency, None)?;
            tracing::info!(bars = bars.len(), "Loaded historical data");
            println!("{:<8} {:<20} {:>10} {:>10} {:>10} {:>10} {:>12}", "SYMBOL", "TIME", "OPEN", "HIGH", "LOW", "CLOSE", "VOLUME");
            for bar in bars {
                println!(
                    "{:<8} {:<20} {:>10} {:>10} {:>10} {:>10} {:>12}",
                    bar.symbol,
                    bar.time.format("%Y-%m-%d %H:%M:%S"),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                );
            }
        }
        Commands::Contract { symbol } => match gateway.contract_details(symbol.as_str(), None)? {
            Some(details) => {
                println!("\n{sep}");
                println!("  CONTRACT {}", symbol);
                println!("{sep}");
                println!("  Contract Id:     {}", show(details.summary.contract_id));
                println!("  Long Name:       {}", details.long_name);
                println!("  Exchange:        {}", details.summary.exchange);
                println!("  Currency:        {}", details.summary.currency);
                println!("  Min Tick:        {}", details.min_tick);
                println!("  Industry:        {}", details.industry);
                println!("  Category:        {}", details.category);
                println!("  Time Zone:       {}", details.time_zone_id);
                println!("{sep}\n");
            }
            None => println!("No contract matches {}", symbol),
        },
        Commands::Report { symbol, kind } => {
            println!("{}", gateway.fundamental_report(symbol.as_str(), kind, None)?);
        }
        Commands::Ratios { symbol } => {
            let ratios = gateway.financial_ratios(symbol.as_str(), None)?;
            println!("Financial ratios for {} ({} fields):", symbol, ratios.len());
            for (key, value) in ratios.iter() {
                println!("  {:<16} {}", key, value);
            }
        }
        Commands::Dividends { symbol } => {
            let dividends = gateway.dividends(symbol.as_str(), None)?;
            println!("Dividends for {}:", symbol);
            println!("  Past 12M:        {}", show(dividends.past_12m));
            println!("  Next 12M:        {}", show(dividends.next_12m));
            println!("  Next Date:       {}", show(dividends.next_date));
            println!("  Next Amount:     {}", show(dividends.next_amount));
        }
        Commands::OpenOrders => {
            let orders = gateway.open_orders(None)?;
            if orders.is_empty() {
                println!("No open orders");
            }
            for order in orders {
                println!(
                    "  #{:<6} {:<8} {:?} {} {:?} limit={} stop={} [{}]",
                    order.order_id,
                    order.contract.display_symbol(),
                    order.action,
                    order.total_quantity,
                    order.order_type,
                    show(order.limit_price),
                    show(order.aux_price),
                    order.status
                );
            }
        }
        Commands::Account { wait_ms } => {
            gateway.start()?;
            conn.settle(Duration::from_millis(wait_ms));
            let portfolio = gateway
                .portfolio()
                .context("Account tracking is disabled (starting_cash is zero)")?;
            println!("\n{sep}");
            println!("  ACCOUNT {}", portfolio.account().account_id().unwrap_or("-"));
            println!("{sep}");
            println!("  Portfolio Value: {:.2}", portfolio.portfolio_value());
            println!("  Positions Value: {:.2}", portfolio.positions_value());
            println!("  Cash:            {:.2}", portfolio.cash());
            println!("  Leverage:        {:.4}", portfolio.leverage());
            println!("  Starting Cash:   {:.2}", portfolio.starting_cash());
            println!("  P&L:             {:.2}", portfolio.pnl());
            println!("  Returns:         {:.4}", portfolio.returns());
            println!("  Positions:       {}", portfolio.position_count());
            for position in portfolio.positions() {
                println!(
                    "    {:<8} {:>8} @ {:<10} last {:<10} upnl {:.2}",
                    position.symbol,
                    position.amount,
                    position.cost_basis,
                    position.last_sale_price,
                    position.unrealized_pnl
                );
            }
            println!("{sep}\n");
        }
        Commands::Depth { symbol, rows, wait_ms } => {
            let subscription = gateway.subscribe_depth(symbol.as_str(), rows)?;
            conn.settle(Duration::from_millis(wait_ms));
            let book = subscription.ladder().snapshot();
            gateway.cancel_depth(subscription.id())?;
            println!("{:>4} {:>12} {:>10} | {:>10} {:>12}", "POS", "BID SIZE", "BID", "ASK", "ASK SIZE");
            for (position, (bid, ask)) in book.bids.iter().zip(book.asks.iter()).take(rows).enumerate() {
                let (bid_price, bid_size) = level(bid);
                let (ask_price, ask_size) = level(ask);
                println!("{:>4} {:>12} {:>10} | {:>10} {:>12}", position, bid_size, bid_price, ask_price, ask_size);
            }
        }
        Commands::Order { symbol, amount, limit, stop } => {
            let style = match (limit, stop) {
                (None, None) => OrderStyle::Market,
                (Some(limit), None) => OrderStyle::limit(limit)?,
                (None, Some(stop)) => OrderStyle::stop(stop)?,
                (Some(limit), Some(stop)) => OrderStyle::stop_limit(limit, stop)?,
            };
            let order_id = gateway.place_order(symbol.as_str(), amount, style)?;
            println!("Placed order #{} for {} {}", order_id, amount, symbol);
        }
        Commands::Cancel { order_id } => {
            gateway.cancel_order(order_id)?;
            println!("Cancel requested for order #{}", order_id);
        }
    }

    Ok(())
}

fn show<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

fn level(slot: &DepthSlot) -> (String, String) {
    match slot {
        DepthSlot::Level { price, size } => (price.to_string(), size.to_string()),
        DepthSlot::Empty => ("-".to_string(), "-".to_string()),
    }
}
