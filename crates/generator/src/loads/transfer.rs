//! Payment load: each account pays a fixed amount to a receiver.

use super::{LoadDescriptor, TransactionData};
use crate::error::GeneratorError;
use async_trait::async_trait;
use fleetload_types::AccountId;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How receivers are picked.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum SelectionMode {
    #[default]
    Random,

    /// Cycle through the receiver list.
    RoundRobin,

    /// Skewed toward the head of the list, for contention.
    Zipf { exponent: f64 },
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "random" => Ok(SelectionMode::Random),
            "round-robin" | "roundrobin" => Ok(SelectionMode::RoundRobin),
            "zipf" => Ok(SelectionMode::Zipf { exponent: 1.5 }),
            s if s.starts_with("zipf:") => {
                let exponent: f64 = s[5..]
                    .parse()
                    .map_err(|_| format!("invalid zipf exponent: {}", &s[5..]))?;
                Ok(SelectionMode::Zipf { exponent })
            }
            _ => Err(format!("unknown selection mode: {s}")),
        }
    }
}

fn default_amount() -> u64 {
    1_000_000_000
}

#[derive(Debug, Deserialize)]
struct TransferLoadData {
    receivers: Vec<AccountId>,
    #[serde(default = "default_amount")]
    amount: u64,
    #[serde(default)]
    fee: Option<u64>,
    #[serde(default)]
    selection: Option<String>,
}

/// Generates payment transactions.
///
/// Job data: `{"receivers": [...], "amount": ...?, "fee": ...?, "selection": ...?}`.
#[derive(Debug)]
pub struct TransferLoad {
    receivers: Vec<AccountId>,
    amount: u64,
    fee: Option<u64>,
    selection_mode: SelectionMode,
    next: AtomicUsize,
}

impl TransferLoad {
    /// Create a payment load. `receivers` must not be empty.
    pub fn new(receivers: Vec<AccountId>) -> Result<Self, GeneratorError> {
        if receivers.is_empty() {
            return Err(GeneratorError::InvalidLoad(
                "transfer: receiver list is empty".to_string(),
            ));
        }
        Ok(Self {
            receivers,
            amount: default_amount(),
            fee: None,
            selection_mode: SelectionMode::default(),
            next: AtomicUsize::new(0),
        })
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_fee(mut self, fee: u64) -> Self {
        self.fee = Some(fee);
        self
    }

    pub fn with_selection_mode(mut self, mode: SelectionMode) -> Self {
        self.selection_mode = mode;
        self
    }

    /// Parse the job data.
    pub fn from_data(data: &Value) -> Result<Self, GeneratorError> {
        let data: TransferLoadData = serde_json::from_value(data.clone())
            .map_err(|e| GeneratorError::InvalidLoad(format!("transfer: {e}")))?;
        let mode = match data.selection {
            Some(s) => s
                .parse()
                .map_err(|e| GeneratorError::InvalidLoad(format!("transfer: {e}")))?,
            None => SelectionMode::default(),
        };
        let load = Self::new(data.receivers)?
            .with_amount(data.amount)
            .with_selection_mode(mode);
        Ok(match data.fee {
            Some(fee) => load.with_fee(fee),
            None => load,
        })
    }

    /// Pick a receiver other than `sender` when the list allows it.
    fn select_receiver(&self, sender: &AccountId) -> &AccountId {
        let n = self.receivers.len();
        let mut rng = rand::thread_rng();
        for _ in 0..n.max(4) {
            let idx = match self.selection_mode {
                SelectionMode::Random => rng.gen_range(0..n),
                SelectionMode::RoundRobin => self.next.fetch_add(1, Ordering::Relaxed) % n,
                SelectionMode::Zipf { exponent } => zipf_index(n, exponent, &mut rng),
            };
            if &self.receivers[idx] != sender {
                return &self.receivers[idx];
            }
        }
        &self.receivers[0]
    }
}

/// Draw an index in `0..n` with probability proportional to
/// `1 / (index + 1)^exponent`, so index 0 is the most likely.
fn zipf_index<R: Rng + ?Sized>(n: usize, exponent: f64, rng: &mut R) -> usize {
    let exponent = exponent.max(0.0);
    let weight = |k: usize| 1.0 / ((k + 1) as f64).powf(exponent);
    let total: f64 = (0..n).map(weight).sum();
    let mut target = rng.gen::<f64>() * total;
    for k in 0..n {
        target -= weight(k);
        if target < 0.0 {
            return k;
        }
    }
    n - 1
}

#[async_trait]
impl LoadDescriptor for TransferLoad {
    async fn setup_transaction(
        &self,
        _account: &AccountId,
    ) -> Result<Option<TransactionData>, GeneratorError> {
        Ok(None)
    }

    async fn transaction(&self, account: &AccountId) -> Result<TransactionData, GeneratorError> {
        let receiver = self.select_receiver(account);
        let data = TransactionData::new(json!({
            "kind": "payment",
            "from": account,
            "to": receiver,
            "amount": self.amount.to_string(),
        }));
        Ok(match self.fee {
            Some(fee) => data.with_fee(fee),
            None => data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn accounts(names: &[&str]) -> Vec<AccountId> {
        names.iter().map(|n| AccountId::from(*n)).collect()
    }

    #[test]
    fn test_parse_selection_mode() {
        assert_eq!("random".parse(), Ok(SelectionMode::Random));
        assert_eq!("Round-Robin".parse(), Ok(SelectionMode::RoundRobin));
        assert_eq!(
            "zipf:2".parse(),
            Ok(SelectionMode::Zipf { exponent: 2.0 })
        );
        assert!("zipf:x".parse::<SelectionMode>().is_err());
        assert!("sideways".parse::<SelectionMode>().is_err());
    }

    #[test]
    fn test_zipf_favours_the_head() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 10];
        for _ in 0..10_000 {
            counts[zipf_index(10, 1.0, &mut rng)] += 1;
        }
        // Expected shares are about 34% for index 0, 17% for 1 and 3.4% for 9.
        assert!(counts[0] > 3_000, "{counts:?}");
        assert!(counts[0] > counts[1] && counts[1] > counts[9], "{counts:?}");
        assert!(counts[9] > 0, "{counts:?}");
        assert_eq!(zipf_index(1, 2.0, &mut rng), 0);
    }

    #[test]
    fn test_empty_receivers_rejected() {
        let err = TransferLoad::from_data(&json!({"receivers": []})).unwrap_err();
        assert!(matches!(err, GeneratorError::InvalidLoad(_)));
    }

    #[tokio::test]
    async fn test_round_robin_skips_sender() {
        let load = TransferLoad::new(accounts(&["a", "b", "c"]))
            .unwrap()
            .with_selection_mode(SelectionMode::RoundRobin)
            .with_amount(5);

        let sender = AccountId::from("a");
        let mut seen = Vec::new();
        for _ in 0..4 {
            let data = load.transaction(&sender).await.unwrap();
            assert_eq!(data.body["from"], "a");
            assert_eq!(data.body["amount"], "5");
            seen.push(data.body["to"].as_str().unwrap().to_string());
        }
        assert_eq!(seen, ["b", "c", "b", "c"]);
    }

    #[tokio::test]
    async fn test_from_data() {
        let load = TransferLoad::from_data(&json!({
            "receivers": ["r1"],
            "fee": 10,
            "selection": "zipf"
        }))
        .unwrap();
        let data = load.transaction(&AccountId::from("s")).await.unwrap();
        assert_eq!(data.body["to"], "r1");
        assert_eq!(data.fee, Some(10));
    }
}
