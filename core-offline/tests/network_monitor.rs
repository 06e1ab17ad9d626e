mod common;

use bridge_traits::network::ConnectivitySignal;
use common::ManualConnectivity;
use core_offline::{ConnectionType, NetworkMonitor, NetworkState};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn platform_changes_reach_subscribers() {
    let source = Arc::new(ManualConnectivity::offline());
    let monitor = Arc::new(NetworkMonitor::new(source.clone()));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    monitor.subscribe(move |new, previous| {
        tx.send((*new, *previous)).ok();
    });

    let cancel = CancellationToken::new();
    let pump = monitor.start(cancel.clone());
    source.wait_for_subscriber().await;

    source.push(ConnectivitySignal::new(true, "3g"));
    source.push(ConnectivitySignal::new(true, "3g"));
    source.push(ConnectivitySignal::offline());

    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        (
            NetworkState::online(ConnectionType::Cellular3g),
            NetworkState::offline()
        )
    );
    let second = rx.recv().await.unwrap();
    assert_eq!(second.0, NetworkState::offline());

    // The duplicate "3g" signal produced no notification.
    assert!(tokio::time::timeout(Duration::from_millis(50), rx.recv())
        .await
        .is_err());

    cancel.cancel();
    pump.await.unwrap();
}

#[tokio::test]
async fn refresh_reprobes_the_platform() {
    let source = Arc::new(ManualConnectivity::online());
    let monitor = NetworkMonitor::new(source.clone());
    let transitions = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&transitions);
    monitor.subscribe(move |_, _| *counter.lock().unwrap() += 1);

    source.push(ConnectivitySignal::offline());
    assert!(monitor.is_online());

    assert_eq!(monitor.refresh(), NetworkState::offline());
    assert!(!monitor.is_online());
    assert_eq!(*transitions.lock().unwrap(), 1);
}
