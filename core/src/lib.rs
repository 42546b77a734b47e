//! riskgate-core: the transaction risk and step-up authorization gate.
//!
//! Every component takes its collaborators explicitly: a `GateStore`
//! connection, a `Clock`, an `AuditSink`, and the `GateConfig` snapshot
//! loaded by the caller. Nothing is global.

pub mod aml_monitor;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod fraud_case;
pub mod fraud_scoring_engine;
pub mod gate;
pub mod limit_enforcement;
pub mod pin_verification;
pub mod risk_rating_engine;
pub mod rng;
pub mod step_up_challenge;
pub mod store;
pub mod types;
