//! End-to-end lifecycle scenarios against a real RocksDB store and an
//! in-memory fabric.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fleet_control::{
    ConnectionReport, ControlError, CreateCallback, CreateInstanceRequest, CreateOutcome,
    DeploymentPort, DeploymentStatusReport, FleetManager, FleetService, InstanceActionReport,
    PlayerDirectory,
};
use fleet_core::{InstanceId, UserId};
use fleet_provision::MockProvisioner;
use fleet_store::{Instance, InstanceStatus, RocksStore};
use parking_lot::Mutex;
use tempfile::TempDir;

struct Fleet {
    service: Arc<FleetService<RocksStore>>,
    provisioner: Arc<MockProvisioner>,
    _dir: TempDir,
}

fn fleet() -> Fleet {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());
    let provisioner = Arc::new(MockProvisioner::new());
    let service = Arc::new(FleetService::with_defaults(
        store,
        provisioner.clone(),
        Arc::new(PlayerDirectory::new()),
    ));
    Fleet {
        service,
        provisioner,
        _dir: dir,
    }
}

fn users(names: &[&str]) -> Vec<UserId> {
    names.iter().map(|n| UserId::new(*n).unwrap()).collect()
}

/// Records every outcome the callback receives.
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<AtomicUsize>,
    outcomes: Arc<Mutex<Vec<CreateOutcome>>>,
}

impl Recorder {
    fn callback(&self) -> CreateCallback {
        let recorder = self.clone();
        Box::new(move |outcome| {
            recorder.calls.fetch_add(1, Ordering::SeqCst);
            recorder.outcomes.lock().push(outcome);
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

async fn create(fleet: &Fleet, max_players: i32, names: &[&str], recorder: &Recorder) -> InstanceId {
    let request =
        CreateInstanceRequest::new(max_players, users(names)).with_caller_hint("192.0.2.44");
    fleet
        .service
        .create(request, recorder.callback())
        .await
        .unwrap()
        .instance_id
}

async fn connect(fleet: &Fleet, id: &InstanceId, names: &[&str]) -> Instance {
    fleet
        .service
        .handle_connection_event(ConnectionReport {
            instance_id: id.to_string(),
            connections: names.iter().map(ToString::to_string).collect(),
        })
        .await
        .unwrap()
}

fn action(id: &InstanceId, action: &str) -> InstanceActionReport {
    InstanceActionReport {
        instance_id: id.to_string(),
        action: action.to_string(),
        ..InstanceActionReport::default()
    }
}

fn assert_seat_formula(instance: &Instance) {
    let ledger = &instance.reservation;
    if ledger.max_players >= 0 {
        let expected = ledger.max_players
            - i32::try_from(ledger.reservations.len()).unwrap()
            - i32::try_from(ledger.connections.len()).unwrap();
        assert_eq!(ledger.available_seats, expected);
    } else {
        assert_eq!(ledger.available_seats, -1);
    }
    assert_eq!(
        instance.player_count,
        i32::try_from(ledger.connections.len()).unwrap()
    );
}

#[tokio::test]
async fn full_instance_rejects_join_until_players_connect() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 2, &["a", "b"], &recorder).await;

    let instance = fleet.service.get(&id).await.unwrap();
    assert_eq!(instance.reservation.reservations, users(&["a", "b"]));
    assert!(instance.reservation.connections.is_empty());
    assert_eq!(instance.reservation.available_seats, 0);
    assert_seat_formula(&instance);

    let err = fleet.service.join(&id, &users(&["c"])).await.unwrap_err();
    assert!(matches!(err, ControlError::SeatLimitReached { .. }));
    assert!(err.to_string().contains("capacity exceeded"));
    assert_eq!(fleet.service.get(&id).await.unwrap(), instance);

    let instance = connect(&fleet, &id, &["a", "b"]).await;
    assert!(instance.reservation.reservations.is_empty());
    assert_eq!(instance.reservation.connections, users(&["a", "b"]));
    assert_eq!(instance.player_count, 2);
    assert_eq!(instance.reservation.available_seats, 0);
    assert_seat_formula(&instance);
}

#[tokio::test]
async fn unlimited_instance_accepts_every_join() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, -1, &["a"], &recorder).await;

    for round in 0..20 {
        let joiner = format!("player-{round}");
        let info = fleet.service.join(&id, &users(&[&joiner])).await.unwrap();
        assert_eq!(info.instance.reservation.available_seats, -1);
        assert!(info.session_info.is_none());
    }

    let instance = connect(&fleet, &id, &["a", "x", "y"]).await;
    assert_eq!(instance.reservation.available_seats, -1);
    assert_seat_formula(&instance);
}

#[tokio::test]
async fn duplicate_ids_consume_one_seat_each() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 4, &["a"], &recorder).await;

    let info = fleet
        .service
        .join(&id, &users(&["b", "b", "c", "b"]))
        .await
        .unwrap();
    assert_eq!(info.instance.reservation.reservations, users(&["a", "b", "c"]));
    assert_eq!(info.instance.reservation.available_seats, 1);
    assert_seat_formula(&info.instance);
}

#[tokio::test]
async fn connection_reports_are_idempotent() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 5, &["a", "b", "c"], &recorder).await;

    let once = connect(&fleet, &id, &["b", "d"]).await;
    let twice = connect(&fleet, &id, &["b", "d"]).await;

    assert_eq!(once.reservation.reservations, twice.reservation.reservations);
    assert_eq!(once.reservation.connections, twice.reservation.connections);
    assert_eq!(twice.reservation.reservations, users(&["a", "c"]));
    for connected in &twice.reservation.connections {
        assert!(!twice.reservation.reservations.contains(connected));
    }
    assert_seat_formula(&twice);
}

#[tokio::test]
async fn ready_report_resolves_success_once() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 4, &["a"], &recorder).await;

    let mut report = action(&id, "READY");
    report
        .metadata
        .insert("map".to_string(), serde_json::json!("harbor"));
    let instance = fleet.service.handle_instance_event(report).await.unwrap();
    assert_eq!(instance.status, InstanceStatus::Ready);
    assert_eq!(instance.metadata["map"], "harbor");

    fleet
        .service
        .handle_instance_event(action(&id, "ready"))
        .await
        .unwrap();

    assert_eq!(recorder.calls(), 1);
    match &recorder.outcomes.lock()[0] {
        CreateOutcome::Success(resolved) => {
            assert_eq!(resolved.id, id);
            assert_eq!(resolved.status, InstanceStatus::Ready);
            assert_eq!(resolved.metadata["map"], "harbor");
        }
        other => panic!("unexpected outcome {other:?}"),
    };
}

#[tokio::test]
async fn fabric_error_then_ready_fires_once() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 2, &["a"], &recorder).await;

    let instance = fleet
        .service
        .handle_deployment_event(DeploymentStatusReport {
            request_id: id.to_string(),
            current_status: "Status.ERROR".to_string(),
            error: true,
            error_detail: "no capacity in region".to_string(),
            ..DeploymentStatusReport::default()
        })
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::Error);

    fleet
        .service
        .handle_instance_event(action(&id, "READY"))
        .await
        .unwrap();

    assert_eq!(recorder.calls(), 1);
    assert!(matches!(
        &recorder.outcomes.lock()[0],
        CreateOutcome::Error(message) if message.contains("no capacity in region")
    ));
}

#[tokio::test]
async fn deployment_then_instance_ready() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 2, &["a"], &recorder).await;

    let instance = fleet
        .service
        .handle_deployment_event(DeploymentStatusReport {
            request_id: id.to_string(),
            current_status: "Status.READY".to_string(),
            public_ip: "203.0.113.20".to_string(),
            fqdn: "x1.fabric.example".to_string(),
            ports: HashMap::from([(
                "gameport".to_string(),
                DeploymentPort {
                    external: 30123,
                    ..DeploymentPort::default()
                },
            )]),
            ..DeploymentStatusReport::default()
        })
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::Running);
    assert_eq!(recorder.calls(), 0);

    let instance = fleet
        .service
        .handle_instance_event(action(&id, "READY"))
        .await
        .unwrap();
    assert_eq!(instance.status, InstanceStatus::Ready);
    assert_eq!(instance.connection_info.as_ref().map(|c| c.port), Some(30123));
    assert_eq!(recorder.calls(), 1);
}

#[tokio::test]
async fn list_prefers_emptiest_then_newest() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let busy = create(&fleet, 8, &["a"], &recorder).await;
    let older = create(&fleet, 8, &[], &recorder).await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let newer = create(&fleet, 8, &[], &recorder).await;
    connect(&fleet, &busy, &["a", "b"]).await;

    let page = fleet.service.list("", Some(10), None).await.unwrap();
    let order: Vec<_> = page.items.iter().map(|i| i.id.clone()).collect();
    assert_eq!(order, vec![newer.clone(), older, busy]);
    assert!(page.next_cursor.is_none());

    let first = fleet.service.list("", Some(1), None).await.unwrap();
    assert_eq!(first.items[0].id, newer);
    let cursor = first.next_cursor.expect("more pages");
    let second = fleet.service.list("", Some(1), Some(cursor)).await.unwrap();
    assert_eq!(second.items.len(), 1);
    assert_ne!(second.items[0].id, newer);

    let full = fleet
        .service
        .list("player_count:>=1 status:REQUESTED", None, None)
        .await
        .unwrap();
    assert_eq!(full.items.len(), 1);
}

#[tokio::test]
async fn delete_cleans_up_when_deployment_already_gone() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 2, &["a"], &recorder).await;
    fleet.provisioner.forget_deployment(id.as_str());

    fleet.service.delete(&id).await.unwrap();
    assert!(matches!(
        fleet.service.get(&id).await,
        Err(ControlError::InstanceNotFound(_))
    ));

    // A second delete finds nothing on either side and still succeeds.
    fleet.service.delete(&id).await.unwrap();
    assert_eq!(recorder.calls(), 1);
    assert!(matches!(
        recorder.outcomes.lock().as_slice(),
        [CreateOutcome::Error(_)]
    ));
    assert_eq!(fleet.service.callbacks().pending(), 0);
}

#[tokio::test]
async fn concurrent_resolvers_fire_once() {
    let fleet = fleet();
    let recorder = Recorder::default();
    let id = create(&fleet, 2, &["a"], &recorder).await;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let service = fleet.service.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move {
            if i % 2 == 0 {
                service
                    .handle_instance_event(action(&id, "READY"))
                    .await
                    .map(|_| ())
            } else {
                service
                    .handle_deployment_event(DeploymentStatusReport {
                        request_id: id.to_string(),
                        current_status: "Status.ERROR".to_string(),
                        ..DeploymentStatusReport::default()
                    })
                    .await
                    .map(|_| ())
            }
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(recorder.calls(), 1);
}
