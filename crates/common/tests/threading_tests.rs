use std::sync::mpsc;
use std::time::Duration;

use whowas_common::threading::ThreadRegistry;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn wait_ready(rx: &mpsc::Receiver<()>) {
    rx.recv_timeout(Duration::from_secs(1))
        .expect("thread ready");
}

#[test]
fn active_thread_names_reflect_running_threads() -> TestResult {
    let registry = ThreadRegistry::new();
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel();
    let handle = registry.spawn("active", move || {
        ready_tx.send(()).ok();
        let _ = stop_rx.recv();
    })?;

    wait_ready(&ready_rx);
    assert_eq!(registry.active_thread_names(), vec!["active".to_string()]);

    stop_tx.send(()).ok();
    handle.join().expect("join active");

    assert!(registry.active_thread_names().is_empty());

    Ok(())
}

#[test]
fn listing_is_sorted_across_threads() -> TestResult {
    let registry = ThreadRegistry::new();

    let (stop_b_tx, stop_b_rx) = mpsc::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle_b = registry.spawn("b-worker", move || {
        ready_tx.send(()).ok();
        let _ = stop_b_rx.recv();
    })?;
    wait_ready(&ready_rx);

    let (stop_a_tx, stop_a_rx) = mpsc::channel::<()>();
    let (ready_tx, ready_rx) = mpsc::channel();
    let handle_a = registry.spawn("a-worker", move || {
        ready_tx.send(()).ok();
        let _ = stop_a_rx.recv();
    })?;
    wait_ready(&ready_rx);

    assert_eq!(
        registry.active_thread_names(),
        vec!["a-worker".to_string(), "b-worker".to_string()]
    );

    stop_b_tx.send(()).ok();
    stop_a_tx.send(()).ok();
    handle_b.join().expect("join b-worker");
    handle_a.join().expect("join a-worker");

    Ok(())
}

#[test]
fn drop_without_join_detaches_and_unregisters() -> TestResult {
    let registry = ThreadRegistry::new();
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    {
        let _handle = registry.spawn("detached", move || {
            ready_tx.send(()).ok();
            let _ = stop_rx.recv();
        })?;
        wait_ready(&ready_rx);
    }

    assert!(registry.active_thread_names().is_empty());

    stop_tx.send(()).ok();

    Ok(())
}

#[test]
fn panicked_thread_surfaces_through_join() -> TestResult {
    let registry = ThreadRegistry::new();
    let handle = registry.spawn("panicker", || panic!("boom"))?;
    assert!(handle.join().is_err());
    assert!(registry.active_thread_names().is_empty());

    Ok(())
}

#[test]
fn thread_handle_name_exposes_label() -> TestResult {
    let registry = ThreadRegistry::new();
    let (ready_tx, ready_rx) = mpsc::channel();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let handle = registry.spawn("named", move || {
        ready_tx.send(()).ok();
        let _ = stop_rx.recv();
    })?;

    wait_ready(&ready_rx);
    assert_eq!(handle.name(), "named");

    stop_tx.send(()).ok();
    handle.join().expect("join named");

    Ok(())
}
