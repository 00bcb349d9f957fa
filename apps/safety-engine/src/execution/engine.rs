//! The order execution state machine.
//!
//! Drives one approved trade intent from snapshot freeze to a reconciled
//! terminal outcome:
//!
//! ```text
//! Created → SnapshotFrozen → Submitting → Pending
//!     → {Filled | PartiallyFilled | Cancelled | TimedOut}
//!     → {Reconciled | ManualReview}
//! ```
//!
//! with `Aborted` reachable from any pre-fill stage. Kill switches are
//! checked at three points with distinct semantics: BEFORE submission
//! (abort, no broker call), DURING pending (best-effort cancel, a racing
//! fill still wins), and AFTER a fill (log only, position stays open).

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};
use tokio::time::MissedTickBehavior;

use crate::audit::AuditLog;
use crate::broker::{BackoffCalculator, BrokerAdapter, BrokerOrderStatus};
use crate::config::ExecutionConfig;
use crate::models::{
    AbortReason, AttemptStatus, ExecutionAttempt, ExecutionResult, ExecutionStage, FillDetails,
    FrozenSnapshot, GuardrailCheckResult, KillSwitchCheckpoint, KillSwitchInteraction,
    ReconciliationStatus, TradeIntent,
};
use crate::safety::KillSwitchManager;

use super::reconciliation::ReconciliationService;
use super::timeout::TimeoutController;

/// Outcome of the submission phase.
enum SubmitOutcome {
    /// Broker acknowledged; flow is pending under this order ID.
    Acknowledged(String),
    /// Flow was terminalized during submission; nothing is pending.
    Terminal,
}

/// Owns the per-trade order lifecycle state machine.
///
/// Shared collaborators (kill switches, audit log, broker) are handles;
/// each `execute` call drives one independent flow and many flows run
/// concurrently on the same engine.
pub struct ExecutionEngine<B: BrokerAdapter> {
    broker: Arc<B>,
    kill_switches: Arc<KillSwitchManager>,
    reconciliation: ReconciliationService<B>,
    audit: Arc<AuditLog>,
    config: ExecutionConfig,
}

impl<B: BrokerAdapter> ExecutionEngine<B> {
    /// Create an engine over the given broker and shared safety state.
    #[must_use]
    pub fn new(
        broker: Arc<B>,
        kill_switches: Arc<KillSwitchManager>,
        audit: Arc<AuditLog>,
        config: ExecutionConfig,
    ) -> Self {
        let reconciliation = ReconciliationService::new(
            broker.clone(),
            config.reconciliation_price_epsilon,
            audit.clone(),
        );
        Self {
            broker,
            kill_switches,
            reconciliation,
            audit,
            config,
        }
    }

    /// Execute one approved trade intent to a terminal outcome.
    ///
    /// Never returns an error: internal faults degrade to the most
    /// conservative terminal stage (`Aborted` or `ManualReview`) and every
    /// step is audited.
    pub async fn execute(
        &self,
        approval: &GuardrailCheckResult,
        intent: &TradeIntent,
    ) -> ExecutionResult {
        let snapshot = FrozenSnapshot::freeze(intent);
        let mut result = ExecutionResult::new(snapshot);

        tracing::info!(
            correlation_id = %result.correlation_id,
            symbol = intent.symbol,
            side = %intent.side,
            broker = self.broker.broker_name(),
            "Execution flow created"
        );
        self.audit.append(
            result.correlation_id,
            "flow_created",
            "engine",
            json!({ "symbol": intent.symbol, "approval_id": intent.approval_id }),
        );

        // A non-approval handed in is an upstream wiring fault; fail closed
        // without touching the broker.
        if !approval.is_allowed() {
            self.abort(&mut result, AbortReason::NotApproved, json!({}));
            return result;
        }

        let frozen_at = result.snapshot.frozen_at();
        self.transition(
            &mut result,
            ExecutionStage::SnapshotFrozen,
            json!({ "frozen_at": frozen_at }),
        );

        // BEFORE checkpoint: tripped switch means no broker call at all.
        if self.kill_switch_check(&mut result, KillSwitchCheckpoint::Before) {
            self.abort(&mut result, AbortReason::KillSwitchBefore, json!({}));
            return result;
        }

        // The window is one absolute deadline fixed at submission; retries
        // and the pending monitor all share it.
        let timeout = TimeoutController::start(self.config.execution_window());

        let broker_order_id = match self.submit_with_retries(&mut result, &timeout).await {
            SubmitOutcome::Acknowledged(id) => id,
            SubmitOutcome::Terminal => return result,
        };

        self.monitor_pending(&mut result, &timeout, &broker_order_id)
            .await;

        // AFTER checkpoint: a trip past this point never closes the
        // position; it is logged for operator attention only.
        if result.stage.is_filled() {
            self.kill_switch_check(&mut result, KillSwitchCheckpoint::After);
        }

        // Reconcile once a fill/cancel/timeout outcome is reached. A flow
        // already in ManualReview (e.g. a fill without a price) stays there.
        if matches!(
            result.stage,
            ExecutionStage::Filled
                | ExecutionStage::PartiallyFilled
                | ExecutionStage::Cancelled
                | ExecutionStage::TimedOut
        ) {
            self.reconciliation.reconcile(&mut result).await;
        }
        match result.reconciliation.as_ref().map(|r| r.status) {
            Some(ReconciliationStatus::Match) => {
                self.transition(&mut result, ExecutionStage::Reconciled, json!({}));
            }
            Some(ReconciliationStatus::Mismatch) => {
                self.transition(
                    &mut result,
                    ExecutionStage::ManualReview,
                    json!({ "cause": "reconciliation_mismatch" }),
                );
            }
            // No acknowledged order to compare against; the flow already
            // carries its terminal stage.
            None => {}
        }

        tracing::info!(
            correlation_id = %result.correlation_id,
            stage = %result.stage,
            attempts = result.attempts.len(),
            "Execution flow finished"
        );
        result
    }

    /// Submit the frozen snapshot, retrying transient rejections while the
    /// window and the attempt budget allow. Every retry reuses the same
    /// snapshot: no re-pricing, no re-approval.
    async fn submit_with_retries(
        &self,
        result: &mut ExecutionResult,
        timeout: &TimeoutController,
    ) -> SubmitOutcome {
        let mut backoff = BackoffCalculator::new(&self.config.retry);

        loop {
            // Re-check the switch before each (re)submission; a trip during
            // backoff must prevent the next broker call.
            if self.kill_switch_check(result, KillSwitchCheckpoint::Before) {
                self.abort(result, AbortReason::KillSwitchBefore, json!({}));
                return SubmitOutcome::Terminal;
            }

            let sequence = result.next_attempt_sequence();
            if result.stage != ExecutionStage::Submitting {
                self.transition(
                    result,
                    ExecutionStage::Submitting,
                    json!({ "attempt": sequence }),
                );
            }

            result.attempts.push(ExecutionAttempt {
                sequence,
                submitted_at: Utc::now(),
                broker_order_id: None,
                status: AttemptStatus::InFlight,
                error: None,
            });

            match self.broker.place_order(&result.snapshot).await {
                Ok(ack) => {
                    if let Some(attempt) = result.attempts.last_mut() {
                        attempt.status = AttemptStatus::Acknowledged;
                        attempt.broker_order_id = Some(ack.broker_order_id.clone());
                    }
                    self.transition(
                        result,
                        ExecutionStage::Pending,
                        json!({ "broker_order_id": ack.broker_order_id, "attempt": sequence }),
                    );
                    return SubmitOutcome::Acknowledged(ack.broker_order_id);
                }
                Err(e) => {
                    let retryable = e.is_retryable();
                    if let Some(attempt) = result.attempts.last_mut() {
                        attempt.status = AttemptStatus::Rejected;
                        attempt.error = Some(e.to_string());
                    }
                    tracing::warn!(
                        correlation_id = %result.correlation_id,
                        attempt = sequence,
                        retryable,
                        error = %e,
                        "Order submission failed"
                    );
                    self.audit.append(
                        result.correlation_id,
                        "submission_rejected",
                        "engine",
                        json!({ "attempt": sequence, "retryable": retryable, "error": e.to_string() }),
                    );

                    if !retryable {
                        self.abort(
                            result,
                            AbortReason::BrokerError,
                            json!({ "error": e.to_string() }),
                        );
                        return SubmitOutcome::Terminal;
                    }

                    let Some(delay) = backoff.next_backoff() else {
                        self.abort(
                            result,
                            AbortReason::MaxAttemptsExhausted,
                            json!({ "attempts": result.attempts.len() }),
                        );
                        return SubmitOutcome::Terminal;
                    };
                    if timeout.expired() || delay >= timeout.remaining() {
                        self.abort(
                            result,
                            AbortReason::SubmissionWindowElapsed,
                            json!({ "elapsed_ms": timeout.elapsed().as_millis() as u64 }),
                        );
                        return SubmitOutcome::Terminal;
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Supervise a pending order: race the status poll against kill-switch
    /// changes and the absolute deadline.
    ///
    /// A kill-switch trip requests a best-effort cancel but never stops the
    /// listener - a fill racing the cancel still counts. The deadline marks
    /// the flow `TimedOut` but polling continues through the late-fill grace
    /// window, because a late fill is still valid.
    async fn monitor_pending(
        &self,
        result: &mut ExecutionResult,
        timeout: &TimeoutController,
        broker_order_id: &str,
    ) {
        let mut kill_rx = self.kill_switches.subscribe();
        kill_rx.mark_unchanged();

        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let grace_deadline = timeout.deadline() + self.config.late_fill_grace();
        let mut cancel_requested = false;
        let mut timed_out = false;

        // A trip that landed between the BEFORE checkpoint and this
        // subscription would otherwise be missed.
        if self.kill_switch_check(result, KillSwitchCheckpoint::During) {
            cancel_requested = true;
            self.request_cancel(result, broker_order_id).await;
        }

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    match self.broker.order_status(broker_order_id).await {
                        Ok(view) => match view.status {
                            BrokerOrderStatus::Filled | BrokerOrderStatus::PartiallyFilled => {
                                self.record_fill(result, &view.status, view.fill_price, view.fill_quantity, timed_out);
                                return;
                            }
                            BrokerOrderStatus::Canceled => {
                                self.transition(
                                    result,
                                    ExecutionStage::Cancelled,
                                    json!({
                                        "reason": if cancel_requested { "KILL_SWITCH_DURING" } else { "BROKER_CANCELLED" },
                                    }),
                                );
                                return;
                            }
                            BrokerOrderStatus::Rejected => {
                                self.abort(
                                    result,
                                    AbortReason::BrokerError,
                                    json!({ "cause": "rejected_after_ack" }),
                                );
                                return;
                            }
                            BrokerOrderStatus::Accepted => {}
                        },
                        Err(e) => {
                            // Transient; the poll keeps running until a
                            // deadline resolves the flow.
                            tracing::warn!(
                                correlation_id = %result.correlation_id,
                                error = %e,
                                "Status poll failed"
                            );
                        }
                    }
                }

                changed = kill_rx.changed(), if !cancel_requested => {
                    if changed.is_err() {
                        continue;
                    }
                    if self.kill_switch_check(result, KillSwitchCheckpoint::During) {
                        cancel_requested = true;
                        self.request_cancel(result, broker_order_id).await;
                    }
                }

                () = tokio::time::sleep_until(timeout.deadline()), if !timed_out => {
                    timed_out = true;
                    self.transition(
                        result,
                        ExecutionStage::TimedOut,
                        json!({
                            "elapsed_ms": timeout.elapsed().as_millis() as u64,
                            "listening_for_late_fill": true,
                        }),
                    );
                }

                () = tokio::time::sleep_until(grace_deadline), if timed_out => {
                    // Grace window closed with no terminal broker outcome;
                    // the flow stays TimedOut and goes to reconciliation.
                    self.audit.append(
                        result.correlation_id,
                        "late_fill_grace_elapsed",
                        "engine",
                        json!({ "broker_order_id": broker_order_id }),
                    );
                    return;
                }
            }
        }
    }

    /// Capture a confirmed fill. SL/TP derive from the actual fill price,
    /// never from the snapshot's reference price.
    fn record_fill(
        &self,
        result: &mut ExecutionResult,
        status: &BrokerOrderStatus,
        fill_price: Option<rust_decimal::Decimal>,
        fill_quantity: rust_decimal::Decimal,
        late: bool,
    ) {
        let Some(fill_price) = fill_price else {
            // A fill without a price is not something we can size stops
            // from; force operator review.
            self.transition(
                result,
                ExecutionStage::ManualReview,
                json!({ "cause": "fill_without_price" }),
            );
            return;
        };

        let stop_loss = result.snapshot.stop_loss_for_fill(fill_price);
        let take_profit = result.snapshot.take_profit_for_fill(fill_price);
        result.fill = Some(FillDetails {
            fill_price,
            fill_quantity,
            stop_loss,
            take_profit,
            observed_at: Utc::now(),
            late,
        });

        let stage = if *status == BrokerOrderStatus::Filled {
            ExecutionStage::Filled
        } else {
            ExecutionStage::PartiallyFilled
        };
        if late {
            tracing::warn!(
                correlation_id = %result.correlation_id,
                fill_price = %fill_price,
                "Late fill captured after deadline"
            );
        }
        self.transition(
            result,
            stage,
            json!({
                "fill_price": fill_price,
                "fill_quantity": fill_quantity,
                "stop_loss": stop_loss,
                "take_profit": take_profit,
                "late": late,
            }),
        );
    }

    /// Best-effort cancel after a DURING-checkpoint trip. Losing the race
    /// to a fill is not an error.
    async fn request_cancel(&self, result: &mut ExecutionResult, broker_order_id: &str) {
        match self.broker.cancel_order(broker_order_id).await {
            Ok(()) => {
                self.audit.append(
                    result.correlation_id,
                    "cancel_requested",
                    "engine",
                    json!({ "broker_order_id": broker_order_id, "reason": "KILL_SWITCH_DURING" }),
                );
            }
            Err(e) => {
                tracing::warn!(
                    correlation_id = %result.correlation_id,
                    error = %e,
                    "Cancel request failed; continuing to listen"
                );
                self.audit.append(
                    result.correlation_id,
                    "cancel_request_failed",
                    "engine",
                    json!({ "broker_order_id": broker_order_id, "error": e.to_string() }),
                );
            }
        }
    }

    /// Check the kill switches at a checkpoint, recording an interaction on
    /// trip. Returns true if trading for the flow's symbol is halted.
    fn kill_switch_check(
        &self,
        result: &mut ExecutionResult,
        checkpoint: KillSwitchCheckpoint,
    ) -> bool {
        let halted = self.kill_switches.halts_symbol(result.snapshot.symbol());
        if halted {
            result.kill_switch_interactions.push(KillSwitchInteraction {
                checkpoint,
                observed_at_stage: result.stage,
                observed_at: Utc::now(),
            });
            self.audit.append(
                result.correlation_id,
                "kill_switch_observed",
                "engine",
                json!({ "checkpoint": checkpoint, "stage": result.stage }),
            );
        }
        halted
    }

    fn abort(&self, result: &mut ExecutionResult, reason: AbortReason, mut payload: Value) {
        result.abort_reason = Some(reason);
        if let Some(map) = payload.as_object_mut() {
            map.insert("reason".to_string(), json!(reason.as_str()));
        }
        self.transition(result, ExecutionStage::Aborted, payload);
    }

    fn transition(&self, result: &mut ExecutionResult, new_stage: ExecutionStage, payload: Value) {
        let prior = result.stage;
        result.stage = new_stage;
        tracing::info!(
            correlation_id = %result.correlation_id,
            from = %prior,
            to = %new_stage,
            "Stage transition"
        );
        self.audit.append_transition(
            result.correlation_id,
            "stage_transition",
            Some(prior),
            Some(new_stage),
            "engine",
            payload,
        );
    }
}
