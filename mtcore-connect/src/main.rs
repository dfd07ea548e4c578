//! Connectivity check.
//!
//! 1. Restore keys and the DC table from `mtcore-connect.bin`, if present
//! 2. Connect to the main DC, negotiating an auth key when there is none
//! 3. Call `help.getConfig` wrapped in `initConnection`
//! 4. Refresh the DC table the way a client does at startup and save it
//!
//! # Run
//! ```text
//! MTCORE_API_ID=12345 RUST_LOG=mtcore_net=debug cargo run -p mtcore-connect
//! ```
//!
//! Test servers are used unless `MTCORE_PRODUCTION=1` is set.

use std::sync::Arc;
use std::time::Duration;

use mtcore::tl::{enums, functions};
use mtcore::{AccountContext, BinaryFileStore, ConnectionConfig, DcType, Session};

const STATE_FILE: &str = "mtcore-connect.bin";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("mtcore_net=info")).init();

    if let Err(e) = run().await {
        eprintln!("\n✗ {e}");
        std::process::exit(1);
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let api_id = match std::env::var("MTCORE_API_ID") {
        Ok(v) => v.parse()?,
        Err(_) => 0,
    };
    let config = ConnectionConfig {
        test_mode: !env_flag("MTCORE_PRODUCTION"),
        use_ipv6: env_flag("MTCORE_IPV6"),
        api_id,
        request_timeout: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    println!("Test servers: {}", config.test_mode);

    let account = Arc::new(AccountContext::with_store(config, BinaryFileStore::new(STATE_FILE))?);
    let main_dc = account.main_dc();
    println!("Main DC {main_dc}, key cached: {}", account.key(main_dc).is_some());

    // ── help.getConfig on the main DC ─────────────────────────────────────────
    let session = Session::connect(account.clone(), main_dc, DcType::Regular);
    let request = account.config().wrap_init(functions::help::GetConfig {});
    let answer = session.invoke(&request).await;
    session.shutdown().await;

    let enums::Config::Config(cfg) = answer?;
    println!("✓ Config from DC {}: {} options, expires {}", cfg.this_dc, cfg.dc_options.len(), cfg.expires);
    for option in cfg.dc_options.iter().take(8) {
        let enums::DcOption::DcOption(opt) = option;
        let tags = [(opt.ipv6, "ipv6"), (opt.media_only, "media"), (opt.cdn, "cdn"), (opt.r#static, "static")];
        let tags: Vec<&str> = tags.iter().filter(|(on, _)| *on).map(|(_, name)| *name).collect();
        println!("    DC{} {}:{} {}", opt.id, opt.ip_address, opt.port, tags.join(","));
    }

    // ── Refresh and persist the DC table ──────────────────────────────────────
    match mtcore::refresh_config(&account).await {
        Some(cfg) => println!("✓ DC table refreshed (this_dc = {})", cfg.this_dc),
        None => println!("⚠ DC table left as it was"),
    }
    println!("✓ State saved to {STATE_FILE}");
    Ok(())
}
