//! Status command implementation

use crate::config::Config;
use crate::risk::LedgerSnapshot;
use crate::store::{JsonFileStore, TradeStore};
use crate::trade::{Trade, TradeMode};
use clap::Args;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Only show one mode (`paper` or `real`)
    #[arg(short, long)]
    pub mode: Option<String>,
}

impl StatusArgs {
    fn modes(&self) -> anyhow::Result<Vec<TradeMode>> {
        match self.mode.as_deref() {
            None => Ok(vec![TradeMode::Paper, TradeMode::Real]),
            Some("paper") => Ok(vec![TradeMode::Paper]),
            Some("real") => Ok(vec![TradeMode::Real]),
            Some(other) => anyhow::bail!("unknown mode {other}, expected paper or real"),
        }
    }

    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let modes = self.modes()?;
        let store = JsonFileStore::open(&config.persistence.dir).await?;
        let open = store.load_open_trades().await?;

        println!("trailguard status ({})", config.persistence.dir.display());
        for mode in modes {
            let snapshot = store.load_ledger_snapshot(mode).await?;
            print!("{}", render_ledger(mode, snapshot.as_ref()));
            for trade in open.iter().filter(|t| t.mode == mode) {
                println!("    {}", render_trade(trade));
            }
        }
        Ok(())
    }
}

fn render_ledger(mode: TradeMode, snapshot: Option<&LedgerSnapshot>) -> String {
    match snapshot {
        None => format!("  {mode}: no ledger yet\n"),
        Some(s) => {
            let mut out = format!(
                "  {mode}: balance={} committed={} risked_today={} pnl={}\n",
                s.total_balance, s.committed, s.risked_today, s.realized_pnl
            );
            if mode == TradeMode::Real {
                out.push_str(&format!(
                    "    real trades opened={} closed={}\n",
                    s.real_trades_opened, s.real_trades_closed
                ));
            }
            out
        }
    }
}

fn render_trade(trade: &Trade) -> String {
    let fmt = |v: Option<rust_decimal::Decimal>| v.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
    format!(
        "{} {} {:?} {} qty={} entry={} stop={} tp={}{}",
        trade.id,
        trade.symbol,
        trade.side,
        trade.status,
        trade.quantity,
        fmt(trade.entry_price),
        fmt(trade.stop_price()),
        fmt(trade.take_profit_price),
        if trade.needs_review { " NEEDS REVIEW" } else { "" }
    )
}
