use super::{Hub, HubState};
use crate::client::{Client, ClientId};
use bytes::Bytes;
use std::collections::HashSet;
use std::time::Duration;

fn payload(text: &'static str) -> Bytes {
    Bytes::from_static(text.as_bytes())
}

#[tokio::test]
async fn test_hub_register_assigns_identity() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (client, _rx) = Client::new(4);
    let registration = handle.register(client).await.unwrap();
    assert!(registration.id.as_str().starts_with("client-"));
    assert_eq!(handle.clients().await.unwrap(), vec![registration.id.clone()]);
    assert_eq!(handle.client_count(), 1);

    hub.stop().await;
}

#[tokio::test]
async fn test_hub_keeps_supplied_identity() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (client, _rx) = Client::with_id("dashboard-1", 4);
    let registration = handle.register(client).await.unwrap();
    assert_eq!(registration.id, ClientId::from("dashboard-1"));

    hub.stop().await;
}

#[tokio::test]
async fn test_duplicate_identity_gets_fresh_one() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (first, _rx1) = Client::with_id("dup", 4);
    let (second, _rx2) = Client::with_id("dup", 4);
    let a = handle.register(first).await.unwrap();
    let b = handle.register(second).await.unwrap();

    assert_eq!(a.id, ClientId::from("dup"));
    assert_ne!(b.id, a.id);
    assert_eq!(handle.clients().await.unwrap().len(), 2);

    hub.stop().await;
}

#[tokio::test]
async fn test_broadcast_reaches_every_client_in_order() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (c1, mut rx1) = Client::new(8);
    let (c2, mut rx2) = Client::new(8);
    handle.register(c1).await.unwrap();
    handle.register(c2).await.unwrap();

    for text in ["one", "two", "three"] {
        handle.broadcast(payload(text)).await.unwrap();
    }
    handle.clients().await.unwrap();

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(rx.try_recv(), Some(payload("one")));
        assert_eq!(rx.try_recv(), Some(payload("two")));
        assert_eq!(rx.try_recv(), Some(payload("three")));
        assert_eq!(rx.try_recv(), None);
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_undrained_clients_are_all_evicted() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (c1, mut rx1) = Client::new(1);
    let (c2, mut rx2) = Client::new(1);
    handle.register(c1).await.unwrap();
    handle.register(c2).await.unwrap();

    handle.broadcast(payload("hello")).await.unwrap();
    handle.broadcast(payload("world")).await.unwrap();
    assert!(handle.clients().await.unwrap().is_empty());

    for rx in [&mut rx1, &mut rx2] {
        assert_eq!(rx.recv().await, Some(payload("hello")));
        assert_eq!(rx.recv().await, None);
    }

    hub.stop().await;
}

#[tokio::test]
async fn test_only_the_slow_client_is_evicted() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (a, mut rx_a) = Client::with_id("a", 1);
    let (b, mut rx_b) = Client::with_id("b", 1);
    handle.register(a).await.unwrap();
    handle.register(b).await.unwrap();

    handle.broadcast(payload("hello")).await.unwrap();
    assert_eq!(rx_a.recv().await, Some(payload("hello")));

    handle.broadcast(payload("world")).await.unwrap();
    assert_eq!(handle.clients().await.unwrap(), vec![ClientId::from("a")]);

    assert_eq!(rx_a.recv().await, Some(payload("world")));
    assert_eq!(rx_b.recv().await, Some(payload("hello")));
    assert_eq!(rx_b.recv().await, None);
    // later broadcasts never reach the evicted client
    handle.broadcast(payload("again")).await.unwrap();
    handle.clients().await.unwrap();
    assert_eq!(rx_a.try_recv(), Some(payload("again")));
    assert!(rx_b.is_closed());

    hub.stop().await;
}

#[tokio::test]
async fn test_unregister_is_idempotent() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (client, mut rx) = Client::new(4);
    let registration = handle.register(client).await.unwrap();

    handle.unregister(registration.clone()).await;
    handle.unregister(registration).await;
    assert!(handle.clients().await.unwrap().is_empty());
    assert_eq!(rx.recv().await, None);

    // a registration this hub never issued
    let other_hub = Hub::start(4);
    let (other, _other_rx) = Client::with_id("ghost", 4);
    let ghost = other_hub.handle().register(other).await.unwrap();
    let (keeper, _keeper_rx) = Client::new(4);
    let kept = handle.register(keeper).await.unwrap();
    handle.unregister(ghost.clone()).await;
    handle.unregister(ghost).await;
    assert_eq!(handle.clients().await.unwrap(), vec![kept.id]);

    other_hub.stop().await;
    hub.stop().await;
}

#[tokio::test]
async fn test_stale_registration_leaves_new_incarnation_alone() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (old, _old_rx) = Client::with_id("kiosk", 1);
    let stale = handle.register(old).await.unwrap();
    // evict the first incarnation
    handle.broadcast(payload("x")).await.unwrap();
    handle.broadcast(payload("y")).await.unwrap();

    let (new, _new_rx) = Client::with_id("kiosk", 4);
    let fresh = handle.register(new).await.unwrap();
    assert_eq!(fresh.id, stale.id);

    handle.unregister(stale).await;
    assert_eq!(handle.clients().await.unwrap(), vec![fresh.id]);

    hub.stop().await;
}

#[tokio::test]
async fn test_send_to_one() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let (a, mut rx_a) = Client::with_id("a", 1);
    let (b, mut rx_b) = Client::with_id("b", 1);
    handle.register(a).await.unwrap();
    handle.register(b).await.unwrap();

    handle.send_to_one("a".into(), payload("only a")).await.unwrap();
    // miss is not an error
    handle.send_to_one("zzz".into(), payload("nobody")).await.unwrap();
    handle.clients().await.unwrap();
    assert_eq!(rx_a.try_recv(), Some(payload("only a")));
    assert_eq!(rx_b.try_recv(), None);

    handle.send_to_one("b".into(), payload("1")).await.unwrap();
    handle.send_to_one("b".into(), payload("2")).await.unwrap();
    assert_eq!(handle.clients().await.unwrap(), vec![ClientId::from("a")]);
    assert_eq!(rx_b.recv().await, Some(payload("1")));
    assert_eq!(rx_b.recv().await, None);

    hub.stop().await;
}

#[tokio::test]
async fn test_stop_closes_every_outbox() {
    let hub = Hub::start(16);
    let handle = hub.handle();

    let mut receivers = Vec::new();
    for _ in 0..5 {
        let (client, rx) = Client::new(4);
        handle.register(client).await.unwrap();
        receivers.push(rx);
    }
    assert_eq!(hub.state(), HubState::Running);

    // sessions disconnecting while the hub shuts down
    let mut registrations = Vec::new();
    for _ in 0..3 {
        let (client, rx) = Client::new(4);
        registrations.push(handle.register(client).await.unwrap());
        receivers.push(rx);
    }
    let racer = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for registration in registrations {
                handle.unregister(registration).await;
            }
        })
    };

    hub.stop().await;
    racer.await.unwrap();

    assert_eq!(handle.state(), HubState::Stopped);
    assert_eq!(handle.client_count(), 0);
    for rx in &mut receivers {
        assert_eq!(rx.recv().await, None);
    }

    let (late, mut late_rx) = Client::new(4);
    assert!(handle.register(late).await.is_err());
    assert_eq!(late_rx.recv().await, None);
    assert!(handle.broadcast(payload("after")).await.is_err());
}

#[tokio::test]
async fn test_concurrent_register_and_broadcast() {
    const CLIENTS: usize = 50;
    const BROADCASTS: usize = 20;

    let hub = Hub::start(64);
    let handle = hub.handle();

    let mut joins = Vec::new();
    for i in 0..CLIENTS {
        let handle = handle.clone();
        joins.push(tokio::spawn(async move {
            let (client, rx) = Client::new(BROADCASTS + 1);
            let registration = handle.register(client).await.unwrap();
            (i, registration, rx)
        }));
    }
    let broadcaster = {
        let handle = handle.clone();
        tokio::spawn(async move {
            for n in 0..BROADCASTS {
                handle.broadcast(Bytes::from(n.to_string())).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut registered = Vec::new();
    for join in joins {
        registered.push(join.await.unwrap());
    }
    broadcaster.await.unwrap();

    // unregister every even client
    let mut expected = HashSet::new();
    for (i, registration, _rx) in &registered {
        if i % 2 == 0 {
            handle.unregister(registration.clone()).await;
        } else {
            expected.insert(registration.id.clone());
        }
    }

    let remaining: HashSet<ClientId> = handle.clients().await.unwrap().into_iter().collect();
    assert_eq!(remaining, expected);
    assert_eq!(handle.client_count(), CLIENTS / 2);

    hub.stop().await;
}

#[tokio::test]
async fn test_backlog_does_not_delay_stop() {
    let hub = Hub::start(4);
    let handle = hub.handle();
    for _ in 0..4 {
        handle.broadcast(payload("queued")).await.unwrap();
    }
    tokio::time::timeout(Duration::from_secs(1), hub.stop())
        .await
        .expect("stop should not wait on queued broadcasts");
}
