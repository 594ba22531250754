//! Scenario tests for reconciliation passes.

mod reconcile_scenarios;
mod support;
