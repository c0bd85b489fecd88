//! The load generator engine.
//!
//! A [`LoadGenerator`] owns one endpoint pool and the per-fee-payer
//! sequence numbers of one worker. It runs the workflow phases:
//!
//! - **generate**: author (and optionally set up) a template for an identity
//! - **send**: sign and submit template instances with fresh nonces
//! - **wait**: poll the network until every submitted transaction is included
//!
//! Each phase reads and writes through the template and record stores, so
//! phases can also run in separate processes.

use crate::config::{GeneratorConfig, SendConfig, StopPolicy, WaitConfig};
use crate::endpoints::EndpointPool;
use crate::error::GeneratorError;
use crate::loads::LoadDescriptor;
use crate::network::{with_timeout, Network, TransactionAuthor};
use crate::report::{SendReport, WaitReport};
use crate::store::{RecordStore, TemplateStore};
use fleetload_types::{
    AccountId, Identity, InclusionStatus, NetworkError, SubmissionHandle, TransactionTemplate,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives generation, submission and inclusion tracking for one worker.
pub struct LoadGenerator {
    network: Arc<dyn Network>,
    author: Arc<dyn TransactionAuthor>,
    endpoints: EndpointPool,
    config: GeneratorConfig,
    /// Next sequence number per fee payer.
    nonces: HashMap<AccountId, u64>,
}

impl LoadGenerator {
    pub fn new(
        network: Arc<dyn Network>,
        author: Arc<dyn TransactionAuthor>,
        endpoints: EndpointPool,
        config: GeneratorConfig,
    ) -> Self {
        Self {
            network,
            author,
            endpoints,
            config,
            nonces: HashMap::new(),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn endpoints(&self) -> &EndpointPool {
        &self.endpoints
    }

    /// Next sequence number the engine will use for `fee_payer`, if known.
    pub fn tracked_nonce(&self, fee_payer: &AccountId) -> Option<u64> {
        self.nonces.get(fee_payer).copied()
    }

    /// Author the template of `load` for `identity` and store it.
    ///
    /// A setup transaction, if the load has one, is submitted and awaited
    /// first.
    pub async fn generate(
        &mut self,
        load: &dyn LoadDescriptor,
        store: &mut dyn TemplateStore,
        identity: &Identity,
    ) -> Result<TransactionTemplate, GeneratorError> {
        let account = with_timeout(
            self.config.request_timeout,
            "account_id",
            self.network.account_id(self.endpoints.current(), identity),
        )
        .await?;
        info!(%account, "generating transaction template");

        if let Some(data) = load.setup_transaction(&account).await? {
            let setup = self
                .author
                .create_template(self.endpoints.current(), identity, data)
                .await?;
            let (handle, _) = self.submit_with_retry(&setup, None).await?;
            info!(hash = %handle, "setup transaction sent, waiting for inclusion");
            let wait = self.config.setup_wait.clone();
            self.wait(&handle, &wait).await?;
            info!(hash = %handle, "setup transaction included");
        }

        let data = load.transaction(&account).await?;
        let template = self
            .author
            .create_template(self.endpoints.current(), identity, data)
            .await?;
        store.set_transaction(template.clone()).await?;
        debug!(fee_payer = %template.fee_payer(), "template stored");
        Ok(template)
    }

    /// Sequence number the network expects next, counting pending
    /// transactions.
    pub async fn fetch_nonce(&self, fee_payer: &AccountId) -> Result<u64, NetworkError> {
        let state = with_timeout(
            self.config.request_timeout,
            "get_account",
            self.network.get_account(self.endpoints.current(), fee_payer),
        )
        .await?;
        debug!(%fee_payer, nonce = state.inferred_nonce, "fetched nonce");
        Ok(state.inferred_nonce)
    }

    /// Sign and submit one instance of `template`.
    ///
    /// Uses `nonce` if given, else the tracked nonce of the fee payer, else
    /// the network's. A sequence conflict is retried once with a re-fetched
    /// nonce. Returns the handle and the fee payer's next nonce.
    pub async fn send(
        &mut self,
        template: &TransactionTemplate,
        validity: Option<Duration>,
        nonce: Option<u64>,
    ) -> Result<(SubmissionHandle, u64), GeneratorError> {
        let fee_payer = template.fee_payer().clone();
        let mut nonce = match nonce.or_else(|| self.tracked_nonce(&fee_payer)) {
            Some(nonce) => nonce,
            None => self.fetch_nonce(&fee_payer).await?,
        };
        let mut is_retry = false;

        loop {
            match self.submit_once(template, nonce, validity).await {
                Ok(handle) => {
                    self.nonces.insert(fee_payer, nonce + 1);
                    return Ok((handle, nonce + 1));
                }
                Err(cause) if cause.is_sequence_conflict() => {
                    if is_retry {
                        return Err(GeneratorError::SequenceConflict {
                            fee_payer,
                            nonce,
                            cause,
                        });
                    }
                    warn!(%fee_payer, nonce, error = %cause, "sequence conflict, refreshing nonce");
                    nonce = self.fetch_nonce(&fee_payer).await?;
                    is_retry = true;
                }
                Err(cause) => return Err(cause.into()),
            }
        }
    }

    async fn submit_once(
        &self,
        template: &TransactionTemplate,
        nonce: u64,
        validity: Option<Duration>,
    ) -> Result<SubmissionHandle, NetworkError> {
        let endpoint = self.endpoints.current();
        let timeout = self.config.request_timeout;
        let signed = with_timeout(
            timeout,
            "sign",
            self.network.sign(endpoint, template, nonce, validity),
        )
        .await?;
        with_timeout(timeout, "submit", self.network.submit(endpoint, &signed)).await
    }

    /// [`send`](Self::send), retrying retryable transport failures on the
    /// next endpoint up to `submit_retries` times.
    pub async fn submit_with_retry(
        &mut self,
        template: &TransactionTemplate,
        nonce: Option<u64>,
    ) -> Result<(SubmissionHandle, u64), GeneratorError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let cause = match self.send(template, None, nonce).await {
                Ok(sent) => return Ok(sent),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            if attempts > self.config.submit_retries {
                return Err(GeneratorError::RetriesExhausted {
                    attempts,
                    cause: Box::new(cause),
                });
            }
            warn!(attempt = attempts, error = %cause, "submission failed, trying next endpoint");
            if let Err(e) = self.endpoints.advance() {
                debug!(error = %e, "no endpoint left to retry on");
                return Err(GeneratorError::RetriesExhausted {
                    attempts,
                    cause: Box::new(cause),
                });
            }
        }
    }

    /// Send template instances until `config`'s stopping condition holds or
    /// `cancel` fires, recording every accepted submission.
    ///
    /// The record store is committed on every exit path.
    pub async fn send_all(
        &mut self,
        templates: &mut dyn TemplateStore,
        records: &mut dyn RecordStore,
        config: &SendConfig,
        cancel: &CancellationToken,
    ) -> Result<SendReport, GeneratorError> {
        let start = Instant::now();
        let mut report = SendReport::new();
        let result = self
            .run_ticks(templates, records, config, cancel, start, &mut report)
            .await;
        report.elapsed = start.elapsed();

        let committed = records.commit().await;
        result?;
        committed?;

        info!(
            sent = report.sent,
            failed = report.failed,
            ticks = report.ticks,
            elapsed = ?report.elapsed,
            "send finished"
        );
        Ok(report)
    }

    async fn run_ticks(
        &mut self,
        templates: &mut dyn TemplateStore,
        records: &mut dyn RecordStore,
        config: &SendConfig,
        cancel: &CancellationToken,
        start: Instant,
        report: &mut SendReport,
    ) -> Result<(), GeneratorError> {
        let stop = config.stop_policy();
        let mut template = templates.get_transaction(None).await?;
        let mut next_tick = start;
        let mut consecutive_failures = 0;

        loop {
            if cancel.is_cancelled() {
                info!("send cancelled");
                report.cancelled = true;
                return Ok(());
            }
            if stop.is_finished(report.sent, start.elapsed()) {
                return Ok(());
            }

            if report.ticks > 0 {
                if config.rotate_nodes {
                    self.endpoints.advance()?;
                }
                if config.rotate_senders {
                    template = templates.get_transaction(None).await?;
                }
            }
            report.ticks += 1;

            for _ in 0..config.pack_size.max(1) {
                if matches!(stop, StopPolicy::Count(count) if report.sent >= count) {
                    break;
                }
                let started = Instant::now();
                match self.send(&template, config.valid_time, None).await {
                    Ok((handle, _)) => {
                        report.record_success(started.elapsed());
                        consecutive_failures = 0;
                        debug!(hash = %handle, sent = report.sent, "transaction sent");
                        records.add_record(handle).await?;
                    }
                    Err(e) if e.is_retryable() => {
                        report.record_failure();
                        consecutive_failures += 1;
                        if consecutive_failures > self.config.max_consecutive_failures {
                            return Err(GeneratorError::RetriesExhausted {
                                attempts: consecutive_failures,
                                cause: Box::new(e),
                            });
                        }
                        warn!(
                            error = %e,
                            endpoint = %self.endpoints.current(),
                            "submission failed, switching endpoint"
                        );
                        self.endpoints.advance()?;
                    }
                    Err(e) => return Err(e),
                }
            }

            if let Some(interval) = config.interval {
                next_tick += interval;
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("send cancelled");
                        report.cancelled = true;
                        return Ok(());
                    }
                    _ = sleep_until(next_tick) => {}
                }
            }
        }
    }

    /// Wait until `handle` is included.
    ///
    /// Runs one round of status checks plus up to `max_retries` more, moving
    /// to the next endpoint after each failed round.
    pub async fn wait(
        &mut self,
        handle: &SubmissionHandle,
        wait: &WaitConfig,
    ) -> Result<(), GeneratorError> {
        let mut retries = 0;
        loop {
            let cause = match self.poll_inclusion(handle, wait).await {
                Ok(()) => return Ok(()),
                Err(e @ GeneratorError::TransactionFailed { .. }) => return Err(e),
                Err(e) => e,
            };

            let timeout = |retries, cause| GeneratorError::InclusionTimeout {
                hash: handle.hash.clone(),
                retries,
                cause: Box::new(cause),
            };
            if retries >= wait.max_retries {
                return Err(timeout(retries, cause));
            }
            if let Err(e) = self.endpoints.advance() {
                debug!(error = %e, "no endpoint left to poll");
                return Err(timeout(retries, cause));
            }
            retries += 1;
            warn!(hash = %handle, retry = retries, error = %cause, "inclusion not confirmed, retrying");
        }
    }

    /// One round of up to `attempts_per_retry` status checks on the current
    /// endpoint. A retryable transport failure counts as one failed check.
    async fn poll_inclusion(
        &self,
        handle: &SubmissionHandle,
        wait: &WaitConfig,
    ) -> Result<(), GeneratorError> {
        let endpoint = self.endpoints.current();
        let attempts = wait.attempts_per_retry.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            if attempt > 1 {
                sleep(wait.poll_interval).await;
            }
            let status = with_timeout(
                self.config.request_timeout,
                "check_inclusion",
                self.network.check_inclusion(endpoint, handle),
            )
            .await;
            match status {
                Ok(InclusionStatus::Included) => return Ok(()),
                Ok(InclusionStatus::Failed { reason }) => {
                    return Err(GeneratorError::TransactionFailed {
                        hash: handle.hash.clone(),
                        reason,
                    })
                }
                Ok(InclusionStatus::Pending) => last_error = None,
                Err(e) if e.is_retryable() => {
                    debug!(hash = %handle, attempt, error = %e, "status check failed");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(match last_error {
            Some(e) => e.into(),
            None => GeneratorError::StillPending { attempts },
        })
    }

    /// Wait for every record in `records`.
    ///
    /// All records are processed; the first failure in record order is
    /// returned once every outcome is known.
    pub async fn wait_all(
        &mut self,
        records: &dyn RecordStore,
        wait: &WaitConfig,
    ) -> Result<WaitReport, GeneratorError> {
        let handles = records.get_records().await?;
        info!(count = handles.len(), "waiting for transactions");

        let mut report = WaitReport::default();
        let mut first_failure = None;
        for handle in &handles {
            match self.wait(handle, wait).await {
                Ok(()) => {
                    report.included += 1;
                    info!(hash = %handle, "transaction included");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(hash = %handle, error = %e, "transaction not included");
                    first_failure.get_or_insert(e);
                }
            }
        }

        info!(included = report.included, failed = report.failed, "wait finished");
        match first_failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
