use crate::models::*;
use chrono::{Datelike, TimeZone, Utc};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;
/// Reported when there is gross profit and no gross loss.
pub const PROFIT_FACTOR_CAP: f64 = 999.0;

/// Trade and curve statistics for one completed run, already rounded for output.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub win_rate: f64,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub avg_trade_duration: f64,
    pub best_trade: f64,
    pub worst_trade: f64,
    pub expectancy: f64,
    pub monthly_returns: Vec<MonthlyReturn>,
}

pub struct PerformanceCalculator;

impl PerformanceCalculator {
    pub fn calculate_performance(
        trades: &[Trade],
        initial_capital: f64,
        final_equity: f64,
        first_bar_time: i64,
        last_bar_time: i64,
        equity_curve: &[EquityPoint],
    ) -> PerformanceSummary {
        // A zero-pnl trade counts as a loss.
        let (wins, losses): (Vec<&Trade>, Vec<&Trade>) =
            trades.iter().partition(|trade| trade.pnl > 0.0);

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            wins.len() as f64 / total_trades as f64 * 100.0
        } else {
            0.0
        };

        let avg_win = Self::average(wins.iter().map(|t| t.pnl_pct));
        let avg_loss = Self::average(losses.iter().map(|t| t.pnl_pct));
        let gross_profit: f64 = wins.iter().map(|t| t.pnl).sum();
        let gross_loss: f64 = losses.iter().map(|t| t.pnl).sum::<f64>().abs();

        let expectancy = if total_trades > 0 {
            let ratio = win_rate / 100.0;
            ratio * avg_win + (1.0 - ratio) * avg_loss
        } else {
            0.0
        };

        let best_trade = trades
            .iter()
            .map(|t| t.pnl_pct)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .unwrap_or(0.0);
        let worst_trade = trades
            .iter()
            .map(|t| t.pnl_pct)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .unwrap_or(0.0);

        let total_return = (final_equity - initial_capital) / initial_capital * 100.0;
        let days = (last_bar_time - first_bar_time) as f64 / MILLIS_PER_DAY;
        let returns = Self::period_returns(equity_curve);

        PerformanceSummary {
            total_return: round_to(total_return, 2),
            annualized_return: round_to(
                Self::calculate_annualized_return(initial_capital, final_equity, days),
                2,
            ),
            sharpe_ratio: round_to(Self::calculate_sharpe_ratio(&returns), 3),
            sortino_ratio: round_to(Self::calculate_sortino_ratio(&returns), 3),
            win_rate: round_to(win_rate, 2),
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            profit_factor: round_to(Self::calculate_profit_factor(gross_profit, gross_loss), 3),
            avg_win: round_to(avg_win, 2),
            avg_loss: round_to(avg_loss, 2),
            avg_trade_duration: round_to(Self::average(trades.iter().map(|t| t.bars as f64)), 2),
            best_trade: round_to(best_trade, 2),
            worst_trade: round_to(worst_trade, 2),
            expectancy: round_to(expectancy, 2),
            monthly_returns: Self::monthly_returns(trades),
        }
    }

    /// Compound annual growth in percent over `days`; 0 when the span is empty.
    pub fn calculate_annualized_return(initial_capital: f64, final_equity: f64, days: f64) -> f64 {
        if days <= 0.0 || initial_capital <= 0.0 {
            return 0.0;
        }
        let growth = (final_equity / initial_capital).powf(365.0 / days) - 1.0;
        if growth.is_finite() {
            growth * 100.0
        } else {
            0.0
        }
    }

    /// Bar-over-bar fractional equity changes.
    pub fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
        equity_curve
            .windows(2)
            .map(|window| {
                let prev_value = window[0].equity;
                let curr_value = window[1].equity;
                if prev_value > 0.0 {
                    (curr_value - prev_value) / prev_value
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn calculate_sharpe_ratio(returns: &[f64]) -> f64 {
        if returns.is_empty() {
            return 0.0;
        }

        let mean_return = returns.mean();
        let std_dev = returns.population_std_dev();

        if !std_dev.is_finite() || std_dev == 0.0 {
            return 0.0;
        }

        let sharpe = mean_return / std_dev * TRADING_DAYS_PER_YEAR.sqrt();
        if sharpe.is_finite() {
            sharpe
        } else {
            0.0
        }
    }

    /// Same numerator as Sharpe; the denominator is the root mean square of the negative returns.
    pub fn calculate_sortino_ratio(returns: &[f64]) -> f64 {
        let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
        if downside.is_empty() {
            return 0.0;
        }

        let mean_return = returns.mean();
        let downside_deviation = downside.quadratic_mean();

        if !downside_deviation.is_finite() || downside_deviation == 0.0 {
            return 0.0;
        }

        let sortino = mean_return / downside_deviation * TRADING_DAYS_PER_YEAR.sqrt();
        if sortino.is_finite() {
            sortino
        } else {
            0.0
        }
    }

    pub fn calculate_profit_factor(gross_profit: f64, gross_loss: f64) -> f64 {
        if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        }
    }

    /// Sums trade `pnlPct` by the UTC month of the exit, oldest month first.
    pub fn monthly_returns(trades: &[Trade]) -> Vec<MonthlyReturn> {
        let mut buckets: BTreeMap<String, f64> = BTreeMap::new();
        for trade in trades {
            let Some(exit) = Utc.timestamp_millis_opt(trade.exit_time).single() else {
                continue;
            };
            let key = format!("{:04}-{:02}", exit.year(), exit.month());
            *buckets.entry(key).or_insert(0.0) += trade.pnl_pct;
        }

        buckets
            .into_iter()
            .map(|(month, total)| MonthlyReturn {
                month,
                return_pct: round_to(total, 2),
            })
            .collect()
    }

    fn average<I: Iterator<Item = f64>>(values: I) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;

        for value in values {
            if value.is_finite() {
                sum += value;
                count += 1;
            }
        }

        if count == 0 {
            0.0
        } else {
            sum / count as f64
        }
    }
}
