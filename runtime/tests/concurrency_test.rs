//! Concurrency tests for last-unit scenarios.
//!
//! These tests verify that concurrent checkouts serialize on the stock rows,
//! never oversell, and never charge a buyer who does not get tickets.
//!
//! Run with: `cargo test --test concurrency_test -- --nocapture`

#![allow(clippy::expect_used, clippy::unwrap_used)] // Test code can use unwrap/expect

mod common;

use common::Harness;
use proptest::prelude::*;
use std::time::Duration;
use ticket_checkout_core::CheckoutError;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_unit_has_exactly_one_winner() {
    let h = Harness::builder().gateway_latency(Duration::from_millis(20)).build();
    let event = h.event();
    let general = h.stock(&event, "General", 2_500, 1);
    let (first, first_method) = h.buyer("Grace Hopper");
    let (second, second_method) = h.buyer("Alan Turing");
    h.cart_service.add(first.id, general.clone(), 1).await.unwrap();
    h.cart_service.add(second.id, general.clone(), 1).await.unwrap();

    let a = tokio::spawn({
        let checkout = h.checkout.clone();
        let request = Harness::saved_request(&first, first_method);
        async move { checkout.checkout(request).await }
    });
    let b = tokio::spawn({
        let checkout = h.checkout.clone();
        let request = Harness::saved_request(&second, second_method);
        async move { checkout.checkout(request).await }
    });
    let results = [a.await.unwrap(), b.await.unwrap()];

    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1);
    assert!(results.iter().any(|result| matches!(
        result,
        Err(CheckoutError::InsufficientStock { requested: 1, remaining: 0, .. })
    )));
    assert_eq!(h.remaining(&general), 0);
    assert_eq!(h.gateway.charges_made(), 1);
    assert_eq!(h.gateway.refunds_made(), 0);
    assert_eq!(h.inventory.tickets().len(), 1);
}

/// 30 buyers race for 5 units. Exactly 5 succeed and no one else is charged.
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn five_units_thirty_concurrent_buyers() {
    println!("🧪 Concurrency test: 30 concurrent checkouts for 5 units");

    let h = Harness::builder().gateway_latency(Duration::from_millis(2)).build();
    let event = h.event();
    let general = h.stock(&event, "General", 2_500, 5);

    let mut requests = Vec::new();
    for i in 0..30 {
        let (buyer, method) = h.buyer(&format!("Buyer {i}"));
        h.cart_service.add(buyer.id, general.clone(), 1).await.unwrap();
        requests.push(Harness::saved_request(&buyer, method));
    }

    let handles: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let checkout = h.checkout.clone();
            tokio::spawn(async move { checkout.checkout(request).await })
        })
        .collect();
    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|joined| joined.expect("task panicked"))
        .collect();

    let successes = results.iter().filter(|result| result.is_ok()).count();
    let sold_out = results
        .iter()
        .filter(|result| matches!(result, Err(CheckoutError::InsufficientStock { .. })))
        .count();
    println!("  ✅ Successes: {successes}");
    println!("  ❌ Sold out: {sold_out}");

    assert_eq!(successes, 5);
    assert_eq!(sold_out, 25);
    assert_eq!(h.remaining(&general), 0);
    assert_eq!(h.inventory.tickets().len(), 5);
    assert_eq!(h.gateway.charges_made(), 5);
}

/// Carts touching the same two rows in opposite order must not deadlock.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_carts_do_not_deadlock() {
    let h = Harness::builder().gateway_latency(Duration::from_millis(5)).build();
    let event = h.event();
    let general = h.stock(&event, "General", 2_500, 100);
    let vip = h.stock(&event, "VIP", 10_000, 100);

    let mut handles = Vec::new();
    for i in 0..10 {
        let (buyer, method) = h.buyer(&format!("Buyer {i}"));
        let (first, second) = if i % 2 == 0 {
            (general.clone(), vip.clone())
        } else {
            (vip.clone(), general.clone())
        };
        h.cart_service.add(buyer.id, first, 1).await.unwrap();
        h.cart_service.add(buyer.id, second, 1).await.unwrap();

        let checkout = h.checkout.clone();
        let request = Harness::saved_request(&buyer, method);
        handles.push(tokio::spawn(async move { checkout.checkout(request).await }));
    }

    let results = tokio::time::timeout(Duration::from_secs(10), futures::future::join_all(handles))
        .await
        .expect("checkouts deadlocked");

    for result in results {
        result.expect("task panicked").expect("checkout succeeds");
    }
    assert_eq!(h.remaining(&general), 90);
    assert_eq!(h.remaining(&vip), 90);
    assert_eq!(h.inventory.tickets().len(), 20);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Whatever buyers ask for, remaining plus sold tickets equals the initial stock.
    #[test]
    fn stock_is_conserved(initial in 1u32..20, wants in prop::collection::vec(1u32..6, 1..8)) {
        tokio_test::block_on(async {
            let h = Harness::new();
            let event = h.event();
            let general = h.stock(&event, "General", 1_000, initial);

            let mut expected_remaining = initial;
            for want in &wants {
                let (buyer, method) = h.buyer("Buyer");
                if h.cart_service.add(buyer.id, general.clone(), *want).await.is_err() {
                    prop_assert!(*want > expected_remaining);
                    continue;
                }
                let receipt = h.checkout.checkout(Harness::saved_request(&buyer, method)).await.unwrap();
                prop_assert_eq!(receipt.tickets.len(), *want as usize);
                expected_remaining -= want;
            }

            let sold = u32::try_from(h.inventory.tickets().len()).unwrap();
            prop_assert_eq!(h.remaining(&general), expected_remaining);
            prop_assert_eq!(h.remaining(&general) + sold, initial);
            prop_assert_eq!(h.gateway.charges_made(), h.gateway.payments().len());
            Ok(())
        })?;
    }
}
