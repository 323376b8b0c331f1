mod common;

use chrono::Duration;
use common::{dec, Harness};
use septra_core::clock::Clock;
use septra_core::ProcurementError;
use septra_procurement::models::{Bid, Escrow, GroupOrder, LogisticsEntry, SupplierOrder};
use septra_procurement::status::{
    BidStatus, EscrowStatus, GroupOrderStatus, LineStatus, LogisticsStatus, PharmacyOrderStatus, RfqStatus,
    SupplierOrderStatus,
};
use septra_procurement::{LogisticsUpdate, RfqFields, ShipmentDetails};
use septra_shared::models::events::{Audience, DomainEvent};
use uuid::Uuid;

/// Two pharmacies pool PARA500 and supplier X wins the whole line.
async fn awarded_para500(h: &Harness) -> (Uuid, Uuid) {
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let b = h.demand("ph-b", sku, 50).await;
    let group = h.group(&[a, b]).await;
    let rfq = h.publish(group.id).await;

    let bid = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-x", sku, "1.00", 150))
        .await
        .unwrap()
        .value;
    h.close(&rfq).await;
    h.engine.award_bid(bid.id).await.unwrap();
    (group.id, rfq.id)
}

#[tokio::test]
async fn test_pooled_award_fans_out_to_pharmacies_and_supplier() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let b = h.demand("ph-b", sku, 50).await;

    let group = h.group(&[a, b]).await;
    assert_eq!(group.lines.len(), 1);
    assert_eq!(group.lines[0].total_quantity, 150);
    assert_eq!(group.lines[0].demand_breakdown.len(), 2);
    assert!(h.engine.list::<septra_procurement::models::Demand>(|_| true).await.unwrap().is_empty());

    let rfq = h.publish(group.id).await;
    let mut bid = Harness::bid(rfq.id, "sup-x", sku, "1.00", 150);
    bid.lead_time_days = 3;
    let bid = h.engine.submit_bid(bid).await.unwrap().value;
    h.close(&rfq).await;

    let outcome = h.engine.award_bid(bid.id).await.unwrap();
    assert_eq!(outcome.value.status, BidStatus::Awarded);

    let group = h.engine.get::<GroupOrder>(group.id).await.unwrap();
    let award = group.lines[0].award.as_ref().unwrap();
    assert_eq!(award.unit_price, dec("1.00"));
    assert_eq!(award.quantity, 150);
    assert_eq!(group.total_value, Some(dec("150.00")));
    assert_eq!(group.status, GroupOrderStatus::AwaitingConfirmations);

    let orders = h.orders(rfq.id).await;
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].pharmacy_id, "ph-a");
    assert_eq!(orders[0].total_value, dec("100.00"));
    assert_eq!(orders[1].total_value, dec("50.00"));

    let supplier_orders = h.engine.list::<SupplierOrder>(|o| o.rfq_id == rfq.id).await.unwrap();
    assert_eq!(supplier_orders.len(), 1);
    assert_eq!(supplier_orders[0].supplier_id, "sup-x");
    assert_eq!(supplier_orders[0].total_value, dec("150.00"));

    let issued = h.inbox.for_audience(&Audience::Pharmacy("ph-b".to_string())).await;
    assert!(issued
        .iter()
        .any(|n| matches!(n.event, DomainEvent::PharmacyOrderIssued { .. })));
}

#[tokio::test]
async fn test_regenerating_orders_changes_nothing() {
    let h = Harness::new();
    let (_, rfq_id) = awarded_para500(&h).await;
    let before = h.orders(rfq_id).await;

    let outcome = h.engine.generate_pharmacy_orders(rfq_id).await.unwrap();
    assert!(outcome.events.is_empty());
    assert_eq!(h.orders(rfq_id).await, before);

    let again = h.engine.generate_supplier_orders(rfq_id).await.unwrap();
    assert!(again.events.is_empty());
    assert_eq!(again.value.len(), 1);
}

#[tokio::test]
async fn test_decline_leaves_escrow_and_other_orders_alone() {
    let h = Harness::new();
    let (group_id, rfq_id) = awarded_para500(&h).await;
    let orders = h.orders(rfq_id).await;

    let declined = h
        .engine
        .decline_pharmacy_order(orders[1].id, Some("Over budget".to_string()))
        .await
        .unwrap()
        .value;
    assert_eq!(declined.status, PharmacyOrderStatus::Declined);
    assert!(declined.lines.iter().all(|l| l.status == LineStatus::Declined));
    assert!(h.engine.list::<Escrow>(|_| true).await.unwrap().is_empty());

    let after = h.orders(rfq_id).await;
    assert_eq!(after[0], orders[0]);

    h.engine
        .confirm_pharmacy_order(orders[0].id, Harness::confirmation())
        .await
        .unwrap();
    let escrows = h.engine.list::<Escrow>(|_| true).await.unwrap();
    assert_eq!(escrows.len(), 1);
    assert_eq!(escrows[0].pharmacy_id, "ph-a");
    assert_eq!(escrows[0].amount, dec("100.00"));
    assert_eq!(escrows[0].status, EscrowStatus::Funded);

    let group = h.engine.get::<GroupOrder>(group_id).await.unwrap();
    assert_eq!(group.status, GroupOrderStatus::Scheduled);
}

#[tokio::test]
async fn test_late_bid_is_rejected_and_bid_list_unchanged() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;

    h.engine
        .submit_bid(Harness::bid(rfq.id, "sup-x", sku, "1.00", 100))
        .await
        .unwrap();
    h.clock.set(rfq.bidding_deadline);

    let err = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-y", sku, "0.90", 100))
        .await
        .unwrap_err();
    assert!(matches!(err, ProcurementError::DeadlinePassed { .. }));

    let bids = h.engine.list::<Bid>(|b| b.rfq_id == rfq.id).await.unwrap();
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].supplier_id, "sup-x");
}

#[tokio::test]
async fn test_award_requires_closed_bidding_and_happens_once() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;

    let x = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-x", sku, "1.00", 100))
        .await
        .unwrap()
        .value;
    let y = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-y", sku, "0.95", 100))
        .await
        .unwrap()
        .value;

    let err = h.engine.award_bid(x.id).await.unwrap_err();
    assert!(matches!(err, ProcurementError::InvalidStateTransition { .. }));

    h.close(&rfq).await;
    h.engine.award_bid(y.id).await.unwrap();

    let again = h.engine.award_bid(y.id).await.unwrap_err();
    assert!(matches!(again, ProcurementError::AlreadyAwarded { .. }));

    let rival = h.engine.award_bid(x.id).await.unwrap_err();
    assert!(matches!(rival, ProcurementError::InvalidStateTransition { .. }));

    let bids = h.engine.list::<Bid>(|b| b.rfq_id == rfq.id).await.unwrap();
    let awarded = bids.iter().filter(|b| b.status == BidStatus::Awarded).count();
    let rejected = bids.iter().filter(|b| b.status == BidStatus::Rejected).count();
    assert_eq!((awarded, rejected), (1, 1));

    let rfq = h.engine.get::<septra_procurement::models::Rfq>(rfq.id).await.unwrap();
    assert_eq!(rfq.status, RfqStatus::Awarded);
    assert_eq!(rfq.lines[0].awarded_bid_id, Some(y.id));
}

#[tokio::test]
async fn test_second_rfq_blocked_while_one_is_open() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    h.publish(group.id).await;

    let fields = RfqFields {
        title: "Second round".to_string(),
        bidding_deadline: Some(h.clock.now() + Duration::days(5)),
        ..Default::default()
    };
    let err = h.engine.publish_rfq(group.id, fields).await.unwrap_err();
    assert!(matches!(err, ProcurementError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_full_lifecycle_completes_after_delivery_and_release() {
    let h = Harness::new();
    let (group_id, rfq_id) = awarded_para500(&h).await;
    for order in h.orders(rfq_id).await {
        h.engine
            .confirm_pharmacy_order(order.id, Harness::confirmation())
            .await
            .unwrap();
    }
    assert_eq!(
        h.engine.get::<GroupOrder>(group_id).await.unwrap().status,
        GroupOrderStatus::Scheduled
    );

    let legs = h.engine.list::<LogisticsEntry>(|e| e.rfq_id == rfq_id).await.unwrap();
    assert_eq!(legs.len(), 2);
    assert!(legs.iter().all(|e| e.status == LogisticsStatus::Pending));

    let escrows = h.engine.list::<Escrow>(|e| e.rfq_id == rfq_id).await.unwrap();
    let early = h.engine.release_escrow(escrows[0].id, None).await.unwrap_err();
    assert!(matches!(early, ProcurementError::InvalidStateTransition { .. }));

    let supplier_order = h.engine.list::<SupplierOrder>(|o| o.rfq_id == rfq_id).await.unwrap()[0].clone();
    h.engine
        .advance_supplier_order(supplier_order.id, SupplierOrderStatus::InFulfillment, ShipmentDetails::default())
        .await
        .unwrap();

    let missing_tracking = h
        .engine
        .advance_supplier_order(supplier_order.id, SupplierOrderStatus::Shipped, ShipmentDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(missing_tracking, ProcurementError::Validation(_)));

    let shipment = ShipmentDetails {
        tracking_number: Some("TRK-001".to_string()),
        carrier: Some("MedFreight".to_string()),
        expected_delivery: Some(h.clock.now() + Duration::days(2)),
        notes: None,
    };
    h.engine
        .advance_supplier_order(supplier_order.id, SupplierOrderStatus::Shipped, shipment)
        .await
        .unwrap();
    assert_eq!(
        h.engine.get::<GroupOrder>(group_id).await.unwrap().status,
        GroupOrderStatus::InDelivery
    );

    let legs = h.engine.list::<LogisticsEntry>(|e| e.rfq_id == rfq_id).await.unwrap();
    assert!(legs.iter().all(|e| e.status == LogisticsStatus::PickedUp));
    assert!(legs.iter().all(|e| e.tracking_number.as_deref() == Some("TRK-001")));

    h.engine
        .advance_logistics(legs[0].id, LogisticsStatus::InTransit, LogisticsUpdate::default())
        .await
        .unwrap();
    let backwards = h
        .engine
        .advance_logistics(legs[0].id, LogisticsStatus::PickedUp, LogisticsUpdate::default())
        .await
        .unwrap_err();
    assert!(matches!(backwards, ProcurementError::InvalidStateTransition { .. }));

    h.engine
        .advance_supplier_order(supplier_order.id, SupplierOrderStatus::Delivered, ShipmentDetails::default())
        .await
        .unwrap();
    let legs = h.engine.list::<LogisticsEntry>(|e| e.rfq_id == rfq_id).await.unwrap();
    assert!(legs.iter().all(|e| e.status == LogisticsStatus::Delivered));

    for escrow in &escrows {
        let released = h.engine.release_escrow(escrow.id, None).await.unwrap().value;
        assert_eq!(released.status, EscrowStatus::Released);
        assert_eq!(released.reason.as_deref(), Some("Order completed successfully"));
    }
    let refund = h.engine.refund_escrow(escrows[0].id, None).await.unwrap_err();
    assert!(matches!(refund, ProcurementError::InvalidStateTransition { .. }));

    assert_eq!(
        h.engine.get::<GroupOrder>(group_id).await.unwrap().status,
        GroupOrderStatus::Completed
    );
    let summary = h.engine.escrow_summary(Some(rfq_id)).await.unwrap();
    assert_eq!(summary.released_amount, dec("150.00"));
}

#[tokio::test]
async fn test_partial_award_is_split_and_reported() {
    let h = Harness::new();
    let sku = h.sku("IBU200").await;
    let a = h.demand("ph-a", sku, 100).await;
    let b = h.demand("ph-b", sku, 50).await;
    let group = h.group(&[a, b]).await;
    let rfq = h.publish(group.id).await;

    let bid = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-y", sku, "2.00", 90))
        .await
        .unwrap()
        .value;
    h.close(&rfq).await;
    h.engine.award_bid(bid.id).await.unwrap();

    let orders = h.orders(rfq.id).await;
    let quantities: Vec<u32> = orders.iter().map(|o| o.lines[0].quantity).collect();
    assert_eq!(quantities, vec![60, 30]);

    let shortfalls = h.engine.award_shortfalls().await.unwrap();
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0].unawarded_quantity, 60);
}

#[tokio::test]
async fn test_cancel_closes_rfq_and_rejects_bids() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;
    let bid = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-x", sku, "1.00", 100))
        .await
        .unwrap()
        .value;

    let cancelled = h.engine.cancel_group_order(group.id).await.unwrap().value;
    assert_eq!(cancelled.status, GroupOrderStatus::Cancelled);
    assert_eq!(
        h.engine.get::<septra_procurement::models::Rfq>(rfq.id).await.unwrap().status,
        RfqStatus::Closed
    );
    assert_eq!(h.engine.get::<Bid>(bid.id).await.unwrap().status, BidStatus::Rejected);
}

#[tokio::test]
async fn test_sweep_closes_expired_rfqs_and_is_quiet_second_time() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;

    h.clock.set(rfq.bidding_deadline + Duration::hours(1));
    let first = h.engine.sweep().await.unwrap();
    assert_eq!(first.value.closed_rfqs, vec![rfq.id]);
    assert_eq!(
        h.engine.get::<GroupOrder>(group.id).await.unwrap().status,
        GroupOrderStatus::BiddingClosed
    );

    let second = h.engine.sweep().await.unwrap();
    assert!(second.value.closed_rfqs.is_empty());
    assert!(second.events.is_empty());
}

#[tokio::test]
async fn test_rank_bids_uses_supplier_ratings() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;

    for supplier in ["sup-y", "sup-x"] {
        h.engine
            .submit_bid(Harness::bid(rfq.id, supplier, sku, "1.00", 100))
            .await
            .unwrap();
    }
    let ranked = h.engine.rank_bids(rfq.id, sku).await.unwrap();
    assert_eq!(ranked[0].bid.supplier_id, "sup-x");
    assert_eq!(ranked[0].supplier_rating, Some(4.5));
}

#[tokio::test]
async fn test_republishing_retires_bids_on_the_closed_rfq() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;

    let first = h.publish(group.id).await;
    let stale = h
        .engine
        .submit_bid(Harness::bid(first.id, "sup-x", sku, "1.00", 100))
        .await
        .unwrap()
        .value;
    h.close(&first).await;

    let second = h.publish(group.id).await;
    let group_id = group.id;
    assert_eq!(h.engine.get::<Bid>(stale.id).await.unwrap().status, BidStatus::Rejected);

    let err = h.engine.award_bid(stale.id).await.unwrap_err();
    assert!(matches!(err, ProcurementError::InvalidStateTransition { .. }));

    let rfqs = h
        .engine
        .list::<septra_procurement::models::Rfq>(move |r| r.group_order_id == group_id)
        .await
        .unwrap();
    let active: Vec<_> = rfqs.iter().filter(|r| r.status.is_active()).collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, second.id);
    assert_eq!(
        h.engine.get::<GroupOrder>(group.id).await.unwrap().active_rfq_id,
        Some(second.id)
    );
    assert!(h.engine.get::<GroupOrder>(group.id).await.unwrap().lines[0].award.is_none());

    // The replacement round still awards normally
    let fresh = h
        .engine
        .submit_bid(Harness::bid(second.id, "sup-y", sku, "0.95", 100))
        .await
        .unwrap()
        .value;
    h.close(&second).await;
    h.engine.award_bid(fresh.id).await.unwrap();
    let award = h.engine.get::<GroupOrder>(group.id).await.unwrap().lines[0].award.clone().unwrap();
    assert_eq!(award.rfq_id, second.id);
}

#[tokio::test]
async fn test_later_award_merges_into_confirmed_pharmacy_order() {
    let h = Harness::new();
    let para = h.sku("PARA500").await;
    let ibu = h.sku("IBU200").await;
    let a_para = h.demand("ph-a", para, 100).await;
    let a_ibu = h.demand("ph-a", ibu, 20).await;
    let b_ibu = h.demand("ph-b", ibu, 30).await;
    let group = h.group(&[a_para, a_ibu, b_ibu]).await;
    assert_eq!(group.lines.len(), 2);

    let rfq = h.publish(group.id).await;
    let para_bid = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-x", para, "1.00", 100))
        .await
        .unwrap()
        .value;
    let ibu_bid = h
        .engine
        .submit_bid(Harness::bid(rfq.id, "sup-y", ibu, "1.00", 50))
        .await
        .unwrap()
        .value;
    h.close(&rfq).await;

    h.engine.award_bid(para_bid.id).await.unwrap();
    let first = h.orders(rfq.id).await;
    assert_eq!(first.len(), 1);
    let order_id = first[0].id;
    h.engine
        .confirm_pharmacy_order(order_id, Harness::confirmation())
        .await
        .unwrap();
    let escrow = h.engine.list::<Escrow>(|e| e.pharmacy_id == "ph-a").await.unwrap()[0].clone();
    assert_eq!(escrow.amount, dec("100.00"));

    h.engine.award_bid(ibu_bid.id).await.unwrap();
    let orders = h.orders(rfq.id).await;
    assert_eq!(orders.len(), 2);
    let merged = &orders[0];
    assert_eq!(merged.pharmacy_id, "ph-a");
    assert_eq!(merged.id, order_id);
    assert_eq!(merged.status, PharmacyOrderStatus::Confirmed);
    assert_eq!(merged.lines.len(), 2);
    assert_eq!(merged.total_value, dec("120.00"));
    assert!(merged.check_total().is_ok());
    let new_line = merged.lines.iter().find(|l| l.sku_id == ibu).unwrap();
    assert_eq!(new_line.status, LineStatus::Pending);
    assert_eq!(new_line.quantity, 20);
    let old_line = merged.lines.iter().find(|l| l.sku_id == para).unwrap();
    assert_eq!(old_line.status, LineStatus::Confirmed);

    let regenerated = h.engine.generate_pharmacy_orders(rfq.id).await.unwrap();
    assert!(regenerated.events.is_empty());
    assert_eq!(h.orders(rfq.id).await, orders);

    h.engine
        .confirm_pharmacy_order(order_id, Harness::confirmation())
        .await
        .unwrap();
    let escrows = h.engine.list::<Escrow>(|e| e.pharmacy_id == "ph-a").await.unwrap();
    assert_eq!(escrows.len(), 1);
    assert_eq!(escrows[0].id, escrow.id);
    assert_eq!(escrows[0].amount, dec("120.00"));
    assert_eq!(escrows[0].status, EscrowStatus::Funded);
}

#[tokio::test]
async fn test_supplier_order_cannot_skip_or_rewind() {
    let h = Harness::new();
    let (_, rfq_id) = awarded_para500(&h).await;
    let order = h.engine.list::<SupplierOrder>(|o| o.rfq_id == rfq_id).await.unwrap()[0].clone();
    assert_eq!(order.status, SupplierOrderStatus::Assigned);

    let shipment = ShipmentDetails {
        tracking_number: Some("TRK-002".to_string()),
        carrier: None,
        expected_delivery: Some(h.clock.now() + Duration::days(2)),
        notes: None,
    };
    let skip = h
        .engine
        .advance_supplier_order(order.id, SupplierOrderStatus::Shipped, shipment.clone())
        .await
        .unwrap_err();
    assert!(matches!(skip, ProcurementError::InvalidStateTransition { .. }));
    assert_eq!(h.engine.get::<SupplierOrder>(order.id).await.unwrap(), order);

    h.engine
        .advance_supplier_order(order.id, SupplierOrderStatus::InFulfillment, ShipmentDetails::default())
        .await
        .unwrap();
    h.engine
        .advance_supplier_order(order.id, SupplierOrderStatus::Shipped, shipment)
        .await
        .unwrap();
    let shipped = h.engine.get::<SupplierOrder>(order.id).await.unwrap();

    let rewind = h
        .engine
        .advance_supplier_order(order.id, SupplierOrderStatus::InFulfillment, ShipmentDetails::default())
        .await
        .unwrap_err();
    assert!(matches!(rewind, ProcurementError::InvalidStateTransition { .. }));
    assert_eq!(h.engine.get::<SupplierOrder>(order.id).await.unwrap(), shipped);
}

#[tokio::test]
async fn test_sku_on_a_live_group_order_cannot_be_deleted() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    h.publish(group.id).await;

    let err = h.engine.delete_sku(sku).await.unwrap_err();
    assert!(matches!(err, ProcurementError::Validation(_)));
    assert!(h.engine.get_sku(sku).await.is_ok());

    h.engine.cancel_group_order(group.id).await.unwrap();
    h.engine.delete_sku(sku).await.unwrap();
}

#[tokio::test]
async fn test_close_and_fan_out_report_unknown_rfqs() {
    let h = Harness::new();
    let sku = h.sku("PARA500").await;
    let a = h.demand("ph-a", sku, 100).await;
    let group = h.group(&[a]).await;
    let rfq = h.publish(group.id).await;
    h.close(&rfq).await;

    let again = h.engine.close_bidding(rfq.id).await.unwrap();
    assert_eq!(again.value.status, RfqStatus::Closed);
    assert!(again.events.is_empty());

    let unknown = Uuid::new_v4();
    let err = h.engine.close_bidding(unknown).await.unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound { .. }));
    let err = h.engine.generate_pharmacy_orders(unknown).await.unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound { .. }));
    let err = h.engine.generate_supplier_orders(unknown).await.unwrap_err();
    assert!(matches!(err, ProcurementError::NotFound { .. }));
}
