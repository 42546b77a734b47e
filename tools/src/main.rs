//! gate-runner: command-line driver for the authorization gate.
//!
//! Usage:
//!   gate-runner migrate
//!   gate-runner seed --customer c-1 [--tier standard] [--pep] [--category high_net_worth]
//!   gate-runner authorize --customer c-1 --amount 120.50 [--action transfer]
//!               [--txn-type transfer] [--new-payee] [--counterparty NAME]
//!               [--country GB] [--device D-1] [--txn-id T-1] [--record]
//!   gate-runner verify-challenge --challenge sca-... --code 123456
//!   gate-runner set-pin --customer c-1 --pin 1234
//!   gate-runner verify-pin --customer c-1 --pin 1234
//!   gate-runner rate --customer c-1
//!
//! Common flags: --db gate.db  --data-dir ./data
//! Every command prints one JSON document on stdout.

use anyhow::{bail, Context, Result};
use riskgate_core::{
    clock::{Clock, SystemClock},
    config::GateConfig,
    error::GateResult,
    gate::{AuthorizationGate, AuthorizationRequest, GateDecision},
    pin_verification::{PinHashScheme, PinResponse, PinService},
    risk_rating_engine::RiskAssessor,
    rng::OsCodeSource,
    step_up_challenge::{ChallengeResponse, CodeDelivery, StepUpService},
    store::{CustomerRecord, GateStore, TransactionRecord},
    types::Direction,
};
use serde_json::json;
use std::env;

/// Stand-in for the SMS/email channel: writes the code to stderr so an
/// operator can complete the challenge by hand.
struct TerminalDelivery;

impl CodeDelivery for TerminalDelivery {
    fn deliver(&self, customer_id: &str, challenge_id: &str, action: &str, code: &str) -> GateResult<()> {
        eprintln!("[delivery] to {customer_id}: code {code} for {action} ({challenge_id})");
        Ok(())
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        bail!("usage: gate-runner <migrate|seed|authorize|verify-challenge|set-pin|verify-pin|rate> [flags]");
    };
    let db = flag(&args, "--db").unwrap_or("gate.db");
    let data_dir = flag(&args, "--data-dir").unwrap_or("./data");

    let store = GateStore::open(db)?;
    store.migrate()?;
    if command == "migrate" {
        return print(&json!({ "migrated": db }));
    }

    let config = GateConfig::load(data_dir)?;
    let clock = SystemClock;

    match command {
        "seed" => seed(&store, &clock, &args),
        "authorize" => authorize(&store, &clock, &config, &args),
        "verify-challenge" => {
            let challenge_id = required(&args, "--challenge")?;
            let code = required(&args, "--code")?;
            let service = StepUpService::new(&store, &clock, &OsCodeSource, &TerminalDelivery, &store);
            print(&ChallengeResponse::from_result(service.verify(challenge_id, code)))
        }
        "set-pin" | "verify-pin" => {
            let customer_id = required(&args, "--customer")?;
            let pin = required(&args, "--pin")?;
            let scheme = PinHashScheme::from_config(&config.pin);
            let service = PinService::new(&store, &clock, &store, &scheme);
            if command == "set-pin" {
                let response = match service.set_pin(customer_id, pin) {
                    Ok(()) => json!({ "success": true }),
                    Err(e) => json!({ "success": false, "error": e.user_message() }),
                };
                print(&response)
            } else {
                print(&PinResponse::from_result(service.verify_pin(customer_id, pin)))
            }
        }
        "rate" => {
            let customer_id = required(&args, "--customer")?;
            let rating = RiskAssessor::new(&store, &clock, &store).assess_customer(customer_id)?;
            print(&rating)
        }
        other => bail!("unknown command: {other}"),
    }
}

fn seed(store: &GateStore, clock: &dyn Clock, args: &[String]) -> Result<()> {
    let customer_id = required(args, "--customer")?;
    let now = clock.now_ts();
    let record = CustomerRecord {
        customer_id: customer_id.to_string(),
        kyc_tier: flag(args, "--tier").map(str::to_string),
        is_pep: args.iter().any(|a| a == "--pep"),
        category: flag(args, "--category").unwrap_or("individual").to_string(),
        identity_verified: !args.iter().any(|a| a == "--unverified"),
        address_verified: !args.iter().any(|a| a == "--unverified"),
        opened_at: now,
    };
    store.insert_customer(&record)?;
    let account_id = format!("acc-{customer_id}");
    store.insert_account(&account_id, customer_id, now)?;
    log::info!("seeded customer={customer_id} account={account_id}");
    print(&json!({ "customer": record, "account_id": account_id }))
}

fn authorize(store: &GateStore, clock: &dyn Clock, config: &GateConfig, args: &[String]) -> Result<()> {
    let customer_id = required(args, "--customer")?;
    let amount: f64 = required(args, "--amount")?
        .parse()
        .context("--amount must be a number")?;

    let mut request = AuthorizationRequest::transfer(customer_id, amount);
    request.action = flag(args, "--action").map(str::to_string);
    request.transaction_id = flag(args, "--txn-id").map(str::to_string);
    request.counterparty = flag(args, "--counterparty").map(str::to_string);
    request.country = flag(args, "--country").map(str::to_string);
    request.device_id = flag(args, "--device").map(str::to_string);
    request.is_new_payee = args.iter().any(|a| a == "--new-payee");
    if let Some(t) = flag(args, "--txn-type") {
        request.txn_type = t.to_string();
    }

    let gate = AuthorizationGate::new(config, store, clock, &OsCodeSource, &TerminalDelivery, store);
    let decision = gate.authorize(&request)?;

    // Record the debit only once it cleared the gate without a pending step-up.
    if args.iter().any(|a| a == "--record") && decision.is_approved() && decision.challenge().is_none() {
        let Some(account_id) = store.account_ids_for_customer(customer_id)?.into_iter().next() else {
            bail!("customer {customer_id} has no account to record against");
        };
        let transaction_id = request
            .transaction_id
            .clone()
            .unwrap_or_else(|| format!("txn-{}", clock.now_ts()));
        store.insert_transaction(&TransactionRecord {
            transaction_id,
            account_id,
            amount,
            direction: Direction::Debit,
            status: "completed".into(),
            txn_type: request.txn_type.clone(),
            counterparty: request.counterparty.clone(),
            device_id: request.device_id.clone(),
            created_at: clock.now_ts(),
        })?;
    }

    if let GateDecision::RejectedByLimits { limits } = &decision {
        log::info!("authorize: rejected ({})", limits.reason.as_deref().unwrap_or("-"));
    }
    print(&decision)
}

fn print<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == name)
        .map(|w| w[1].as_str())
}

fn required<'a>(args: &'a [String], name: &str) -> Result<&'a str> {
    flag(args, name).with_context(|| format!("missing required flag {name}"))
}
