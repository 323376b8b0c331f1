use crate::award;
use crate::bidding::{self, NewBid, RankedBid, RfqFields};
use crate::confirmation::{self, Confirmation};
use crate::demand::{self, DemandUpdate, GroupOrderFields, NewDemand};
use crate::escrow;
use crate::fanout;
use crate::fulfillment::{self, ShipmentDetails};
use crate::lifecycle;
use crate::logistics::{self, LogisticsUpdate};
use crate::models::*;
use crate::reporting::{self, EscrowSummary, LineShortfall, SupplierPerformance};
use crate::status::{LogisticsStatus, SupplierOrderStatus};
use crate::sweeper::{self, SweepReport};
use chrono::{DateTime, Utc};
use septra_catalog::catalog;
use septra_catalog::{NewSku, Sku, SkuUpdate};
use septra_core::clock::Clock;
use septra_core::notify::{dispatch, NotificationSink};
use septra_core::repository::{EntityStore, Record};
use septra_core::supplier::SupplierDirectory;
use septra_core::transaction::Transaction;
use septra_core::{ProcurementError, ProcurementResult};
use septra_shared::models::events::DomainEvent;
use septra_store::app_config::BusinessRules;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Result of a committed operation: the updated record plus the events it
/// emitted, already handed to the notifier.
#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub events: Vec<DomainEvent>,
}

/// Entry point for every state-changing operation.
///
/// Writers are serialised through one gate, each runs inside a
/// [`Transaction`] and nothing is written unless it succeeds. Events are
/// dispatched only after the commit.
pub struct ProcurementEngine {
    store: Arc<dyn EntityStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    suppliers: Arc<dyn SupplierDirectory>,
    rules: BusinessRules,
    write_gate: Mutex<()>,
}

impl ProcurementEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
        suppliers: Arc<dyn SupplierDirectory>,
        rules: BusinessRules,
    ) -> Self {
        Self {
            store,
            clock,
            notifier,
            suppliers,
            rules,
            write_gate: Mutex::new(()),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn begin(&self) -> Transaction {
        Transaction::begin(self.store.clone())
    }

    async fn finish<T>(&self, tx: Transaction, events: Vec<DomainEvent>, value: T) -> ProcurementResult<Outcome<T>> {
        let written = tx.commit().await?;
        debug!("Committed {:?} with {} events", written, events.len());
        dispatch(self.notifier.as_ref(), &events).await;
        Ok(Outcome { value, events })
    }

    fn rejected<T>(operation: &str, result: ProcurementResult<T>) -> ProcurementResult<T> {
        if let Err(e) = &result {
            warn!("{} rejected: {}", operation, e);
        }
        result
    }

    // Catalog

    pub async fn create_sku(&self, input: NewSku, created_by: &str) -> ProcurementResult<Outcome<Sku>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let sku = catalog::create_sku(&mut tx, input, created_by, self.now()).await?;
        self.finish(tx, Vec::new(), sku).await
    }

    pub async fn update_sku(&self, sku_id: Uuid, update: SkuUpdate) -> ProcurementResult<Outcome<Sku>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let sku = catalog::update_sku(&mut tx, sku_id, update, self.now()).await?;
        self.finish(tx, Vec::new(), sku).await
    }

    pub async fn set_sku_active(&self, sku_id: Uuid, active: bool) -> ProcurementResult<Outcome<Sku>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let sku = catalog::set_sku_active(&mut tx, sku_id, active, self.now()).await?;
        self.finish(tx, Vec::new(), sku).await
    }

    /// Delete a SKU that no pending demand and no live group order refers to.
    pub async fn delete_sku(&self, sku_id: Uuid) -> ProcurementResult<Outcome<Sku>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        if tx.fetch::<Demand>().await?.iter().any(|d| d.sku_id == sku_id) {
            return Err(ProcurementError::Validation(format!(
                "SKU {} is referenced by pending demand",
                sku_id
            )));
        }
        let live = tx
            .fetch::<GroupOrder>()
            .await?
            .into_iter()
            .find(|g| !g.status.is_terminal() && g.lines.iter().any(|l| l.sku_id == sku_id));
        if let Some(group_order) = live {
            return Err(ProcurementError::Validation(format!(
                "SKU {} is referenced by group order {} ({})",
                sku_id, group_order.id, group_order.status
            )));
        }
        let sku = catalog::delete_sku(&mut tx, sku_id).await?;
        self.finish(tx, Vec::new(), sku).await
    }

    pub async fn get_sku(&self, sku_id: Uuid) -> ProcurementResult<Sku> {
        self.get::<Sku>(sku_id).await
    }

    pub async fn list_skus(&self, active_only: bool) -> ProcurementResult<Vec<Sku>> {
        catalog::list_skus(&mut self.begin(), active_only).await
    }

    // Demand

    /// Record and submit a demand in one step.
    pub async fn submit_demand(&self, input: NewDemand) -> ProcurementResult<Outcome<Demand>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let now = self.now();
        let draft = demand::record_demand(&mut tx, now, input).await?;
        let submitted = demand::submit_demand(&mut tx, now, draft.id, &mut events).await?;
        self.finish(tx, events, submitted).await
    }

    pub async fn save_draft_demand(&self, input: NewDemand) -> ProcurementResult<Outcome<Demand>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let draft = demand::record_demand(&mut tx, self.now(), input).await?;
        self.finish(tx, Vec::new(), draft).await
    }

    pub async fn update_draft_demand(&self, demand_id: Uuid, update: DemandUpdate) -> ProcurementResult<Outcome<Demand>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let updated = demand::update_demand(&mut tx, self.now(), demand_id, update).await?;
        self.finish(tx, Vec::new(), updated).await
    }

    pub async fn submit_draft_demand(&self, demand_id: Uuid) -> ProcurementResult<Outcome<Demand>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let submitted = demand::submit_demand(&mut tx, self.now(), demand_id, &mut events).await?;
        self.finish(tx, events, submitted).await
    }

    pub async fn withdraw_demand(&self, demand_id: Uuid) -> ProcurementResult<Outcome<Demand>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let removed = demand::withdraw_demand(&mut tx, demand_id).await?;
        self.finish(tx, Vec::new(), removed).await
    }

    pub async fn aggregate_demands(
        &self,
        demand_ids: &[Uuid],
        fields: GroupOrderFields,
    ) -> ProcurementResult<Outcome<GroupOrder>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = demand::aggregate(&mut tx, self.now(), demand_ids, fields, &mut events).await;
        let order = Self::rejected("aggregate_demands", result)?;
        self.finish(tx, events, order).await
    }

    // RFQ and bidding

    pub async fn publish_rfq(&self, group_order_id: Uuid, fields: RfqFields) -> ProcurementResult<Outcome<Rfq>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = bidding::publish_rfq(&mut tx, self.now(), group_order_id, fields, &mut events).await;
        let rfq = Self::rejected("publish_rfq", result)?;
        self.finish(tx, events, rfq).await
    }

    pub async fn submit_bid(&self, input: NewBid) -> ProcurementResult<Outcome<Bid>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = bidding::submit_bid(&mut tx, self.now(), input, &mut events).await;
        let bid = Self::rejected("submit_bid", result)?;
        self.finish(tx, events, bid).await
    }

    pub async fn close_bidding(&self, rfq_id: Uuid) -> ProcurementResult<Outcome<Rfq>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = bidding::close_bidding(&mut tx, self.now(), rfq_id, &mut events).await;
        let rfq = Self::rejected("close_bidding", result)?;
        self.finish(tx, events, rfq).await
    }

    pub async fn cancel_group_order(&self, group_order_id: Uuid) -> ProcurementResult<Outcome<GroupOrder>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = lifecycle::cancel_group_order(&mut tx, self.now(), group_order_id, &mut events).await;
        let order = Self::rejected("cancel_group_order", result)?;
        self.finish(tx, events, order).await
    }

    /// Advisory ranking of the live bids on one RFQ line.
    pub async fn rank_bids(&self, rfq_id: Uuid, sku_id: Uuid) -> ProcurementResult<Vec<RankedBid>> {
        let mut tx = self.begin();
        tx.find::<Rfq>(rfq_id).await?;
        let bids: Vec<Bid> = tx
            .fetch::<Bid>()
            .await?
            .into_iter()
            .filter(|b| b.rfq_id == rfq_id && b.sku_id == sku_id)
            .collect();

        let mut ratings = HashMap::new();
        for bid in &bids {
            if !ratings.contains_key(&bid.supplier_id) {
                if let Some(rating) = self.suppliers.rating(&bid.supplier_id).await {
                    ratings.insert(bid.supplier_id.clone(), rating);
                }
            }
        }
        Ok(bidding::rank(bids, &ratings))
    }

    pub async fn open_rfqs_for_supplier(&self, categories: &[String]) -> ProcurementResult<Vec<Rfq>> {
        bidding::open_rfqs_for_supplier(&mut self.begin(), self.now(), categories).await
    }

    // Award and fan-out

    pub async fn award_bid(&self, bid_id: Uuid) -> ProcurementResult<Outcome<Bid>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = award::award_bid(&mut tx, self.now(), bid_id, &mut events).await;
        let bid = Self::rejected("award_bid", result)?;
        self.finish(tx, events, bid).await
    }

    pub async fn generate_pharmacy_orders(&self, rfq_id: Uuid) -> ProcurementResult<Outcome<Vec<PharmacyOrder>>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = fanout::generate_pharmacy_orders(&mut tx, self.now(), rfq_id, &mut events).await;
        let orders = Self::rejected("generate_pharmacy_orders", result)?;
        self.finish(tx, events, orders).await
    }

    pub async fn generate_supplier_orders(&self, rfq_id: Uuid) -> ProcurementResult<Outcome<Vec<SupplierOrder>>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = fanout::generate_supplier_orders(&mut tx, self.now(), rfq_id, &mut events).await;
        let orders = Self::rejected("generate_supplier_orders", result)?;
        self.finish(tx, events, orders).await
    }

    // Confirmation, fulfilment, escrow, logistics

    pub async fn confirm_pharmacy_order(
        &self,
        order_id: Uuid,
        confirmation: Confirmation,
    ) -> ProcurementResult<Outcome<PharmacyOrder>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result =
            confirmation::confirm_pharmacy_order(&mut tx, self.now(), order_id, confirmation, &mut events).await;
        let order = Self::rejected("confirm_pharmacy_order", result)?;
        self.finish(tx, events, order).await
    }

    pub async fn decline_pharmacy_order(
        &self,
        order_id: Uuid,
        reason: Option<String>,
    ) -> ProcurementResult<Outcome<PharmacyOrder>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = confirmation::decline_pharmacy_order(&mut tx, self.now(), order_id, reason, &mut events).await;
        let order = Self::rejected("decline_pharmacy_order", result)?;
        self.finish(tx, events, order).await
    }

    pub async fn advance_supplier_order(
        &self,
        order_id: Uuid,
        target: SupplierOrderStatus,
        details: ShipmentDetails,
    ) -> ProcurementResult<Outcome<SupplierOrder>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result =
            fulfillment::advance_supplier_order(&mut tx, self.now(), order_id, target, details, &mut events).await;
        let order = Self::rejected("advance_supplier_order", result)?;
        self.finish(tx, events, order).await
    }

    pub async fn release_escrow(&self, escrow_id: Uuid, reason: Option<String>) -> ProcurementResult<Outcome<Escrow>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = escrow::release_escrow(
            &mut tx,
            self.now(),
            escrow_id,
            reason,
            &self.rules.release_reason,
            &mut events,
        )
        .await;
        let escrow = Self::rejected("release_escrow", result)?;
        self.finish(tx, events, escrow).await
    }

    pub async fn refund_escrow(&self, escrow_id: Uuid, reason: Option<String>) -> ProcurementResult<Outcome<Escrow>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = escrow::refund_escrow(
            &mut tx,
            self.now(),
            escrow_id,
            reason,
            &self.rules.refund_reason,
            &mut events,
        )
        .await;
        let escrow = Self::rejected("refund_escrow", result)?;
        self.finish(tx, events, escrow).await
    }

    pub async fn advance_logistics(
        &self,
        entry_id: Uuid,
        target: LogisticsStatus,
        update: LogisticsUpdate,
    ) -> ProcurementResult<Outcome<LogisticsEntry>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let result = logistics::advance_logistics(&mut tx, self.now(), entry_id, target, update, &mut events).await;
        let entry = Self::rejected("advance_logistics", result)?;
        self.finish(tx, events, entry).await
    }

    // Sweeps

    /// Background housekeeping: auto-close expired RFQs (if enabled) and
    /// re-derive every fan-out artifact.
    pub async fn sweep(&self) -> ProcurementResult<Outcome<SweepReport>> {
        let _gate = self.write_gate.lock().await;
        let mut tx = self.begin();
        let mut events = Vec::new();
        let now = self.now();
        let closed_rfqs = if self.rules.auto_close_expired_rfqs {
            sweeper::close_expired_rfqs(&mut tx, now, &mut events).await?
        } else {
            Vec::new()
        };
        let reconciled_rfqs = sweeper::reconcile_derived_records(&mut tx, now, &mut events).await?;
        self.finish(tx, events, SweepReport { closed_rfqs, reconciled_rfqs }).await
    }

    // Queries

    pub async fn get<T: Record>(&self, id: Uuid) -> ProcurementResult<T> {
        self.begin().find::<T>(id).await
    }

    /// Every row of a collection matching `filter`.
    pub async fn list<T: Record>(&self, filter: impl Fn(&T) -> bool) -> ProcurementResult<Vec<T>> {
        Ok(self
            .begin()
            .fetch::<T>()
            .await?
            .into_iter()
            .filter(|row| filter(row))
            .collect())
    }

    pub async fn escrow_summary(&self, rfq_id: Option<Uuid>) -> ProcurementResult<EscrowSummary> {
        let escrows = self.begin().fetch::<Escrow>().await?;
        Ok(reporting::escrow_summary(&escrows, rfq_id))
    }

    pub async fn supplier_performance(&self) -> ProcurementResult<Vec<SupplierPerformance>> {
        let mut tx = self.begin();
        let bids = tx.fetch::<Bid>().await?;
        let group_orders = tx.fetch::<GroupOrder>().await?;
        Ok(reporting::supplier_performance(&bids, &group_orders))
    }

    pub async fn award_shortfalls(&self) -> ProcurementResult<Vec<LineShortfall>> {
        let group_orders = self.begin().fetch::<GroupOrder>().await?;
        Ok(reporting::award_shortfalls(&group_orders))
    }
}
