#![allow(dead_code)]

//! Shared fixtures: scripted accrual oracles and Luhn-valid order numbers.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use loyalty_core::accrual::{AccrualOracle, AccrualOutcome};
use loyalty_core::persistence::MemoryStore;
use loyalty_core::reconciliation::{AccrualWorker, WorkerConfig};
use loyalty_core::services::LoyaltyServices;
use loyalty_core::validation::luhn_valid;

/// `payload` followed by its Luhn check digit
pub fn luhn_number(payload: u64) -> String {
    (0..10)
        .map(|d| format!("{payload}{d}"))
        .find(|candidate| luhn_valid(candidate))
        .unwrap()
}

/// `count` distinct valid order numbers
pub fn order_numbers(count: usize) -> Vec<String> {
    (0..count as u64).map(|i| luhn_number(1_000 + i)).collect()
}

/// Oracle answering from per-order scripts, then from a fallback
pub struct ScriptedOracle {
    scripts: Mutex<HashMap<String, VecDeque<AccrualOutcome>>>,
    fallback: AccrualOutcome,
    latency: Duration,
    calls: Mutex<Vec<(String, Instant)>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(fallback: AccrualOutcome) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            fallback,
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn script(self, number: &str, outcomes: Vec<AccrualOutcome>) -> Self {
        self.scripts
            .lock()
            .insert(number.to_string(), outcomes.into());
        self
    }

    pub fn calls_for(&self, number: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(n, _)| n == number)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccrualOracle for ScriptedOracle {
    async fn query(&self, order_number: &str) -> AccrualOutcome {
        self.calls
            .lock()
            .push((order_number.to_string(), Instant::now()));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.scripts
            .lock()
            .get_mut(order_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn processed(accrual: i64) -> AccrualOutcome {
    AccrualOutcome::Resolved {
        status: loyalty_core::OrderStatus::Processed,
        accrual: Some(accrual),
    }
}

/// Store, services and a worker over `oracle`
pub fn harness(
    oracle: Arc<ScriptedOracle>,
    config: WorkerConfig,
) -> (MemoryStore, LoyaltyServices, AccrualWorker) {
    let store = MemoryStore::new();
    let services = LoyaltyServices::in_memory(store.clone());
    let worker = AccrualWorker::new(
        services.orders.clone(),
        Some(oracle as Arc<dyn AccrualOracle>),
        config,
    );
    (store, services, worker)
}
