#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use septra_catalog::NewSku;
use septra_core::clock::{Clock, ManualClock};
use septra_procurement::models::{GroupOrder, PharmacyOrder, Rfq};
use septra_procurement::status::PaymentTerms;
use septra_procurement::{Confirmation, GroupOrderFields, NewBid, NewDemand, ProcurementEngine, RfqFields};
use septra_store::app_config::BusinessRules;
use septra_store::{InboxNotifier, MemoryStore, StaticSupplierDirectory};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub struct Harness {
    pub engine: ProcurementEngine,
    pub clock: Arc<ManualClock>,
    pub inbox: Arc<InboxNotifier>,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
}

pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let inbox = Arc::new(InboxNotifier::new());
        let suppliers = StaticSupplierDirectory::new(HashMap::new())
            .with_rating("sup-x", 4.5)
            .with_rating("sup-y", 3.9);
        let engine = ProcurementEngine::new(
            Arc::new(MemoryStore::new()),
            clock.clone(),
            inbox.clone(),
            Arc::new(suppliers),
            BusinessRules::default(),
        );
        Self { engine, clock, inbox }
    }

    pub async fn sku(&self, code: &str) -> Uuid {
        let input = NewSku {
            code: code.to_string(),
            name: format!("{} tablets", code),
            category: "analgesics".to_string(),
            unit: "box".to_string(),
            ..Default::default()
        };
        self.engine.create_sku(input, "admin").await.unwrap().value.id
    }

    pub async fn demand(&self, pharmacy: &str, sku_id: Uuid, quantity: u32) -> Uuid {
        let input = NewDemand {
            pharmacy_id: pharmacy.to_string(),
            sku_id,
            quantity,
            max_unit_price: None,
            notes: None,
        };
        self.engine.submit_demand(input).await.unwrap().value.id
    }

    pub async fn group(&self, demand_ids: &[Uuid]) -> GroupOrder {
        let fields = GroupOrderFields {
            title: "Spring analgesics".to_string(),
            ..Default::default()
        };
        self.engine.aggregate_demands(demand_ids, fields).await.unwrap().value
    }

    pub async fn publish(&self, group_order_id: Uuid) -> Rfq {
        let fields = RfqFields {
            title: "Spring analgesics RFQ".to_string(),
            bidding_deadline: Some(self.clock.now() + Duration::days(3)),
            ..Default::default()
        };
        self.engine.publish_rfq(group_order_id, fields).await.unwrap().value
    }

    pub fn bid(rfq_id: Uuid, supplier: &str, sku_id: Uuid, price: &str, quantity: u32) -> NewBid {
        NewBid {
            rfq_id,
            supplier_id: supplier.to_string(),
            sku_id,
            unit_price: dec(price),
            quantity,
            lead_time_days: 5,
            min_quantity: None,
            notes: None,
        }
    }

    /// Move the clock past the deadline and close bidding.
    pub async fn close(&self, rfq: &Rfq) {
        self.clock.set(rfq.bidding_deadline + Duration::minutes(1));
        self.engine.close_bidding(rfq.id).await.unwrap();
    }

    pub async fn orders(&self, rfq_id: Uuid) -> Vec<PharmacyOrder> {
        let mut orders = self
            .engine
            .list::<PharmacyOrder>(move |o| o.rfq_id == rfq_id)
            .await
            .unwrap();
        orders.sort_by(|a, b| a.pharmacy_id.cmp(&b.pharmacy_id));
        orders
    }

    pub fn confirmation() -> Confirmation {
        Confirmation {
            payment_terms: PaymentTerms::Net30,
            delivery_address: "12 Harbour Road".to_string(),
        }
    }
}
