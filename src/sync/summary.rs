use std::sync::Arc;

use tracing::{error, info, warn};

use crate::{
    exchange::ExchangeError,
    market::{Code, CurrencyConverter, OrderbookSnapshot, Pair, PairFormat, TickerPrice},
};

use super::sinks::StatsSink;

/// Rendering rule for monetary fields, derived from the pair's quote
/// currency and the configured fiat display currency.
enum PriceStyle<'a> {
    /// Quote is fiat but differs from the display currency: convert and show
    /// both.
    Convert(&'a Code),
    /// Quote is the display currency itself.
    DisplayFiat,
    /// Non-fiat quote: raw 8-decimal precision.
    Raw,
}

/// Formats human-readable ticker and order book summaries. Printing is
/// best-effort: conversion and sink failures are logged, never propagated.
pub(super) struct SummaryPrinter {
    fiat_display_currency: Code,
    pair_format: PairFormat,
    converter: Arc<dyn CurrencyConverter>,
    stats: Option<Arc<dyn StatsSink>>,
}

impl SummaryPrinter {
    pub fn new(
        fiat_display_currency: Code,
        pair_format: PairFormat,
        converter: Arc<dyn CurrencyConverter>,
        stats: Option<Arc<dyn StatsSink>>,
    ) -> Self {
        Self {
            fiat_display_currency,
            pair_format,
            converter,
            stats,
        }
    }

    pub fn format_currency(&self, pair: &Pair) -> String {
        self.pair_format.format(pair)
    }

    pub fn print_ticker_summary(
        &self,
        result: &Result<TickerPrice, ExchangeError>,
        protocol: &str,
    ) {
        let ticker = match result {
            Ok(ticker) => ticker,
            Err(err @ ExchangeError::NotYetImplemented) => {
                warn!("failed to get {protocol} ticker: {err}");
                return;
            }
            Err(err) => {
                error!("failed to get {protocol} ticker: {err}");
                return;
            }
        };

        if let Some(stats) = &self.stats {
            // Not all tickers populate volume; a rejection is not actionable
            let _ = stats.add(
                &ticker.exchange,
                &ticker.pair,
                ticker.asset,
                ticker.last,
                ticker.volume,
            );
        }

        let style = self.price_style(ticker.pair.quote());
        info!(
            "{} {} {} {} TICKER: Last {} Ask {} Bid {} High {} Low {} Volume {:.8}",
            ticker.exchange,
            protocol,
            self.format_currency(&ticker.pair),
            ticker.asset.as_str().to_uppercase(),
            self.format_price(&style, ticker.last),
            self.format_price(&style, ticker.ask),
            self.format_price(&style, ticker.bid),
            self.format_price(&style, ticker.high),
            self.format_price(&style, ticker.low),
            ticker.volume,
        );
    }

    pub fn print_orderbook_summary(
        &self,
        result: &Result<OrderbookSnapshot, ExchangeError>,
        protocol: &str,
    ) {
        let book = match result {
            Ok(book) => book,
            Err(err @ ExchangeError::NotYetImplemented) => {
                warn!("failed to get {protocol} orderbook: {err}");
                return;
            }
            Err(err) => {
                error!("failed to get {protocol} orderbook: {err}");
                return;
            }
        };

        let (bids_amount, bids_value) = book.total_bids();
        let (asks_amount, asks_value) = book.total_asks();

        let style = self.price_style(book.pair.quote());
        let (bid_value_result, ask_value_result) = match &style {
            PriceStyle::Convert(_) => {
                let format_positive = |value: f64| {
                    if value > 0.0 {
                        self.format_price(&style, value)
                    } else {
                        String::new()
                    }
                };
                (format_positive(bids_value), format_positive(asks_value))
            }
            PriceStyle::DisplayFiat => (
                self.format_price(&style, bids_value),
                self.format_price(&style, asks_value),
            ),
            PriceStyle::Raw => (bids_value.to_string(), asks_value.to_string()),
        };

        info!(
            "{} {} {} {} ORDERBOOK: Bids len: {} Amount: {} {} Total value: {} \
             Asks len: {} Amount: {} {} Total value: {}",
            book.exchange,
            protocol,
            self.format_currency(&book.pair),
            book.asset.as_str().to_uppercase(),
            book.bids.len(),
            bids_amount,
            book.pair.base(),
            bid_value_result,
            book.asks.len(),
            asks_amount,
            book.pair.base(),
            ask_value_result,
        );
    }

    fn price_style<'a>(&self, quote: &'a Code) -> PriceStyle<'a> {
        if !quote.is_fiat() {
            PriceStyle::Raw
        } else if *quote == self.fiat_display_currency {
            PriceStyle::DisplayFiat
        } else {
            PriceStyle::Convert(quote)
        }
    }

    fn format_price(&self, style: &PriceStyle<'_>, amount: f64) -> String {
        match style {
            PriceStyle::Convert(orig) => self.format_converted(amount, orig),
            PriceStyle::DisplayFiat => {
                format!(
                    "{}{amount:.8}",
                    self.symbol_or_empty(&self.fiat_display_currency)
                )
            }
            PriceStyle::Raw => format!("{amount:.8}"),
        }
    }

    /// Renders `SYMd converted CURd (SYMo amount CURo)`. A failed conversion
    /// degrades to zero so the original value stays visible.
    fn format_converted(&self, amount: f64, orig: &Code) -> String {
        let mut converted = 0.0;
        if amount > 0.0 {
            match self
                .converter
                .convert_fiat(amount, orig, &self.fiat_display_currency)
            {
                Ok(value) => converted = value,
                Err(err) => error!("failed to convert currency: {err}"),
            }
        }

        let display_symbol = self.symbol_or_empty(&self.fiat_display_currency);
        let orig_symbol = self.symbol_or_empty(orig);

        format!(
            "{display_symbol}{converted:.2} {} ({orig_symbol}{amount:.2} {orig})",
            self.fiat_display_currency,
        )
    }

    fn symbol_or_empty(&self, code: &Code) -> String {
        match self.converter.symbol(code) {
            Ok(symbol) => symbol,
            Err(err) => {
                error!("failed to get currency symbol: {err}");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::market::ConversionError;

    use super::*;

    struct FixedRateConverter;

    impl CurrencyConverter for FixedRateConverter {
        fn convert_fiat(&self, amount: f64, _: &Code, _: &Code) -> Result<f64, ConversionError> {
            Ok(amount * 2.0)
        }

        fn symbol(&self, code: &Code) -> Result<String, ConversionError> {
            match code.as_str() {
                "USD" => Ok("$".to_string()),
                "EUR" => Ok("€".to_string()),
                other => Err(ConversionError::SymbolUnavailable(Code::new(other))),
            }
        }
    }

    fn printer() -> SummaryPrinter {
        SummaryPrinter::new(
            Code::new("USD"),
            PairFormat::default(),
            Arc::new(FixedRateConverter),
            None,
        )
    }

    #[test]
    fn converted_format_shows_both_currencies() {
        let printer = printer();
        let rendered = printer.format_converted(10.0, &Code::new("EUR"));
        assert_eq!(rendered, "$20.00 USD (€10.00 EUR)");
    }

    #[test]
    fn converted_format_skips_conversion_for_zero() {
        let printer = printer();
        let rendered = printer.format_converted(0.0, &Code::new("EUR"));
        assert_eq!(rendered, "$0.00 USD (€0.00 EUR)");
    }

    #[test]
    fn display_fiat_uses_eight_decimals() {
        let printer = printer();
        let usd = Code::new("USD");
        let style = printer.price_style(&usd);
        assert_eq!(printer.format_price(&style, 1.5), "$1.50000000");
    }

    #[test]
    fn non_fiat_quote_renders_raw() {
        let printer = printer();
        let btc = Code::new("BTC");
        let style = printer.price_style(&btc);
        assert_eq!(printer.format_price(&style, 0.25), "0.25000000");
    }

    #[test]
    fn unknown_symbol_degrades_to_empty() {
        let printer = printer();
        let rendered = printer.format_converted(3.0, &Code::new("GBP"));
        assert_eq!(rendered, "$6.00 USD (3.00 GBP)");
    }
}
