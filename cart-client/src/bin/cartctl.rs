//! cartctl - drive the cart engine against a live backend

use anyhow::{Context, bail};
use cart_client::api::Navigator;
use cart_client::logger::init_logger_with;
use cart_client::{CartEngine, CartView, CheckoutOutcome, ClientConfig, LineKey, PaymentMethod};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "cartctl", about = "Cart and checkout client", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the cart with everything selected
    Show,
    /// Set the quantity of a line ("P1:no-size", "P2:S1")
    SetQty { key: LineKey, quantity: u32 },
    /// Remove a line by its row id
    Remove { line_id: String },
    /// Check out the given lines (all purchasable lines if none given)
    Checkout {
        #[arg(short, long, default_value = "COD", value_parser = parse_method)]
        method: PaymentMethod,
        #[arg(short, long = "key")]
        keys: Vec<LineKey>,
        #[arg(short, long)]
        address: Option<String>,
        /// Shop voucher as SHOP_ID=CODE (repeatable)
        #[arg(short, long = "voucher", value_parser = parse_voucher)]
        vouchers: Vec<(String, String)>,
    },
}

fn parse_method(s: &str) -> Result<PaymentMethod, String> {
    serde_json::from_value(serde_json::Value::String(s.to_uppercase()))
        .map_err(|_| format!("unknown payment method: {s} (COD, VNPAY, CARD, MOMO)"))
}

fn parse_voucher(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((shop, code)) if !shop.is_empty() && !code.is_empty() => {
            Ok((shop.to_string(), code.to_string()))
        }
        _ => Err(format!("expected SHOP_ID=CODE, got {s}")),
    }
}

/// Prints the payment URL instead of opening a browser
struct PrintNavigator;

impl Navigator for PrintNavigator {
    fn redirect(&self, url: &str) {
        println!("Open to pay: {url}");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignore if missing)
    let _ = dotenv::dotenv();
    let cli = Cli::parse();
    init_logger_with(Some(&cli.log_level), cli.json_logs);

    let config = ClientConfig::from_env();
    tracing::info!(base_url = %config.base_url, "cartctl starting");
    let engine = CartEngine::remote(config, Arc::new(PrintNavigator))
        .context("failed to build HTTP client")?;

    match cli.command {
        Command::Show => {
            engine.mount(None).await;
            engine.toggle_all(true);
            engine.shipping_quote().await;
            print_view(&engine.view());
        }
        Command::SetQty { key, quantity } => {
            engine.mount(None).await;
            let outcome = engine.change_quantity(&key, quantity)?;
            tracing::info!(?outcome, "Quantity requested");
            wait_idle(&engine).await;
            print_view(&engine.view());
        }
        Command::Remove { line_id } => {
            engine.mount(None).await;
            engine.remove(&line_id).await?;
            print_view(&engine.view());
        }
        Command::Checkout {
            method,
            keys,
            address,
            vouchers,
        } => {
            engine.mount(None).await;
            if keys.is_empty() {
                engine.toggle_all(true);
            }
            for key in &keys {
                if !engine.toggle_one(key, true) {
                    bail!("line {key} is not in the cart or cannot be bought");
                }
            }
            if let Some(id) = &address
                && !engine.select_address(id)
            {
                bail!("unknown address {id}");
            }
            for (shop, code) in &vouchers {
                engine
                    .apply_voucher(shop, code)
                    .await
                    .with_context(|| format!("voucher {code} for shop {shop}"))?;
            }
            engine.set_payment_method(method);
            engine.shipping_quote().await;
            print_view(&engine.view());

            match engine.checkout().await? {
                CheckoutOutcome::OrderAccepted(receipt) => {
                    println!("Order accepted: {} ({:?})", receipt.message, receipt.status)
                }
                CheckoutOutcome::Redirected { url } => println!("Redirected to {url}"),
                CheckoutOutcome::NeedsAddress(prompt) => {
                    println!("An address is needed first: {prompt:?}")
                }
                CheckoutOutcome::AlreadyInProgress => println!("Checkout already running"),
            }
        }
    }

    engine.dispose();
    Ok(())
}

async fn wait_idle(engine: &CartEngine) {
    while !engine.view().pending.is_empty() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn print_view(view: &CartView) {
    for shop in &view.shops {
        let mark = if shop.checked { "x" } else { " " };
        println!("[{mark}] {}", shop.shop_name.as_deref().unwrap_or(&shop.shop_id));
        for line in view.lines.iter().filter(|l| shop.keys.contains(&l.key())) {
            let mark = if view.selection.contains(&line.key()) { "x" } else { " " };
            let flash = if line.is_flash_sale { " flash" } else { "" };
            println!(
                "  [{mark}] {:<24} {:>4} x {:>12} = {:>12}  (stock {}, row {}{flash})",
                line.key(),
                line.quantity,
                line.unit_price,
                line.line_total(),
                line.available_stock,
                line.id,
            );
        }
        if let Some(voucher) = &shop.voucher {
            println!("  voucher {}: -{}", voucher.code, voucher.discount);
        }
    }
    println!(
        "selected: {} items, subtotal {}",
        view.selected_quantity, view.selected_subtotal
    );
    match (view.calculating, view.shipping_fee) {
        (true, _) => println!("shipping: calculating..."),
        (false, Some(fee)) => println!("shipping: {fee}"),
        (false, None) => println!("shipping: unavailable"),
    }
    if !view.voucher_discount.is_zero() {
        println!("vouchers: -{}", view.voucher_discount);
    }
    if let Some(address) = &view.chosen_address {
        println!("address: {address}");
    }
    println!("payment: {}", view.payment_method);
}
